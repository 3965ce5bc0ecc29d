//! LFS pointer decoding
//!
//! Pointer files are small text blobs of the form:
//!
//! ```text
//! version https://git-lfs.github.com/spec/v1
//! oid sha256:<64 hex chars>
//! size <bytes>
//! ```

use std::io::Read;

use crate::{Error, Result};

/// Pointer files must be smaller than this; anything larger is content.
pub const MAX_POINTER_SIZE: u64 = 1024;

const SPEC_PREFIX: &str = "version https://git-lfs.github.com/spec/v";
// Pre-rename spec URL still seen in old repositories.
const LEGACY_SPEC_PREFIX: &str = "version https://hawser.github.com/spec/v";

/// A decoded LFS pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    pub oid: String,
    pub size: u64,
}

impl Pointer {
    /// Decode a pointer from a reader, consuming at most [`MAX_POINTER_SIZE`]
    /// bytes. Returns [`Error::NotAPointer`] for anything that is not a
    /// well-formed pointer, including oversized input.
    pub fn decode(reader: &mut impl Read) -> Result<Pointer> {
        let mut buf = Vec::with_capacity(256);
        reader
            .by_ref()
            .take(MAX_POINTER_SIZE + 1)
            .read_to_end(&mut buf)?;
        if buf.len() as u64 > MAX_POINTER_SIZE {
            return Err(Error::NotAPointer);
        }
        Self::decode_bytes(&buf)
    }

    /// Decode a pointer from an in-memory blob.
    pub fn decode_bytes(content: &[u8]) -> Result<Pointer> {
        if content.len() as u64 > MAX_POINTER_SIZE {
            return Err(Error::NotAPointer);
        }
        let text = std::str::from_utf8(content).map_err(|_| Error::NotAPointer)?;
        if !text.starts_with(SPEC_PREFIX) && !text.starts_with(LEGACY_SPEC_PREFIX) {
            return Err(Error::NotAPointer);
        }

        let mut oid = None;
        let mut size = None;
        for line in text.lines().skip(1) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix("oid sha256:") {
                oid = Some(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix("size ") {
                size = Some(
                    rest.trim()
                        .parse::<u64>()
                        .map_err(|_| Error::InvalidPointer("invalid size value".into()))?,
                );
            }
        }

        let oid = oid.ok_or_else(|| Error::InvalidPointer("missing oid field".into()))?;
        let size = size.ok_or_else(|| Error::InvalidPointer("missing size field".into()))?;
        if !is_valid_oid(&oid) {
            return Err(Error::InvalidPointer(format!(
                "oid is not 64 hex characters: {oid}"
            )));
        }

        Ok(Pointer { oid, size })
    }
}

/// A valid LFS oid is a lowercase hex sha-256 digest.
pub fn is_valid_oid(oid: &str) -> bool {
    oid.len() == 64
        && oid
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
