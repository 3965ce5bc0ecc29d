//! Pkt-line framing
//!
//! The smart-HTTP discovery stream is a sequence of packets, each prefixed
//! with four lowercase hex digits covering the header itself; "0000" is a
//! flush with no payload. This module provides the reader used to parse a
//! remote's `info/refs` advertisement and the writer used by the stateless
//! bridge's advertise header.

use crate::{Error, Result};

/// Flush packet (marks end of a section).
pub const FLUSH_PKT: &[u8] = b"0000";

/// Format a string as a single pkt-line.
pub fn packet_line(s: &str) -> Vec<u8> {
    let mut pkt = format!("{:04x}", s.len() + 4).into_bytes();
    pkt.extend_from_slice(s.as_bytes());
    pkt
}

/// Reads pkt-line packets out of a byte buffer.
pub struct PktLineReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PktLineReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Read the next packet as text, returning the payload and the declared
    /// length. A zero length signals a flush packet with an empty payload.
    pub fn read_text_packet(&mut self) -> Result<(String, usize)> {
        if self.pos + 4 > self.data.len() {
            return Err(Error::Protocol("truncated pkt-line header".into()));
        }
        let header = &self.data[self.pos..self.pos + 4];
        let header = std::str::from_utf8(header)
            .map_err(|_| Error::Protocol("invalid pkt-line length".into()))?;
        let len = usize::from_str_radix(header, 16)
            .map_err(|_| Error::Protocol("invalid pkt-line length".into()))?;
        self.pos += 4;

        if len == 0 {
            return Ok((String::new(), 0));
        }
        if len < 4 {
            return Err(Error::Protocol("pkt-line length too small".into()));
        }
        if self.pos + len - 4 > self.data.len() {
            return Err(Error::Protocol("pkt-line truncated".into()));
        }
        let payload = &self.data[self.pos..self.pos + len - 4];
        self.pos += len - 4;
        let text = std::str::from_utf8(payload)
            .map_err(|_| Error::Protocol("pkt-line payload is not utf-8".into()))?;
        Ok((text.trim_end_matches('\n').to_string(), len))
    }
}

/// Parse a remote's `info/refs?service=git-upload-pack` response and
/// extract the default branch from the `symref=HEAD:refs/heads/<branch>`
/// capability on the first ref line.
pub fn parse_default_branch(data: &[u8]) -> Result<String> {
    let mut reader = PktLineReader::new(data);

    // Service announcement: "# service=git-upload-pack"
    reader
        .read_text_packet()
        .map_err(|e| Error::Protocol(format!("failed to read service packet: {e}")))?;

    let (_, len) = reader
        .read_text_packet()
        .map_err(|e| Error::Protocol(format!("failed to read flush packet: {e}")))?;
    if len != 0 {
        return Err(Error::Protocol(
            "expected flush packet after service announcement".into(),
        ));
    }

    // First ref line: "<sha> <ref>\0<capabilities>"
    let (first_ref, len) = reader
        .read_text_packet()
        .map_err(|e| Error::Protocol(format!("failed to read first ref packet: {e}")))?;
    if len == 0 {
        return Err(Error::Protocol("empty repository: no refs found".into()));
    }

    let caps = first_ref
        .split_once('\0')
        .map(|(_, caps)| caps)
        .ok_or_else(|| Error::Protocol("no capabilities found in first ref packet".into()))?;

    for cap in caps.split_ascii_whitespace() {
        if let Some(target) = cap.strip_prefix("symref=HEAD:") {
            if let Some(branch) = target.strip_prefix("refs/heads/") {
                return Ok(branch.to_string());
            }
        }
    }

    Err(Error::Protocol(
        "could not determine default branch from symref capability".into(),
    ))
}
