//! Process settings

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Settings {
    /// HTTP listen address, e.g. `0.0.0.0:8080`.
    pub addr: String,
    /// Absolute repositories root directory.
    pub root: PathBuf,
}

/// Accepts the `:8080` shorthand for an all-interfaces bind.
pub fn normalize_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}
