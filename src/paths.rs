//! Repository path safety
//!
//! Every handler that touches disk goes through [`clean_join`]: URL-derived
//! names are normalized component by component and may never escape the
//! configured root. Rejection happens before any filesystem access.

use std::path::{Component, Path, PathBuf};

/// Join `rel` onto `root`, normalizing `.` and `..` components. Returns
/// `None` when the path is empty or would escape the root.
pub fn clean_join(root: &Path, rel: &str) -> Option<PathBuf> {
    let rel = rel.trim_start_matches('/');
    if rel.is_empty() {
        return None;
    }
    let mut clean = PathBuf::new();
    for component in Path::new(rel).components() {
        match component {
            Component::Normal(c) => clean.push(c),
            Component::ParentDir => {
                if !clean.pop() {
                    return None;
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if clean.as_os_str().is_empty() {
        return None;
    }
    Some(root.join(clean))
}
