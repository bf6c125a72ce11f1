//! Parser for the fixed-column IEEE OUI registry text export.
//!
//! Only the `(base 16)` lines are of interest:
//!
//! ```text
//! 0050C2     (base 16)		IEEE REGISTRATION AUTHORITY
//! ```
//!
//! After trimming, columns 0..6 hold the prefix as hex digits and the
//! organization name starts at column 22. Every other line (headers, the
//! `(hex)` twin lines, address lines) fails the hex check and is skipped.

use std::io::BufRead;

use crate::error::Result;

/// Shortest line that holds both the prefix and an organization name.
const MIN_LINE_LENGTH: usize = 23;

const PREFIX_LENGTH: usize = 6;

/// Column where the organization name begins.
const ORGANIZATION_COLUMN: usize = 22;

/// One registry assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorEntry {
    /// Lowercase `xx:xx:xx` prefix.
    pub prefix: String,
    pub organization: String,
}

/// Extracts an entry from a registry line, or `None` if the line is not an
/// assignment.
pub fn parse_registry_line(line: &str) -> Option<VendorEntry> {
    let line = line.trim();
    if line.len() < MIN_LINE_LENGTH {
        return None;
    }

    let hex = line.get(..PREFIX_LENGTH)?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let organization = line.get(ORGANIZATION_COLUMN..)?;

    Some(VendorEntry {
        prefix: normalize_prefix(hex),
        organization: organization.to_string(),
    })
}

/// Formats six hex digits as a lowercase colon-separated prefix.
///
/// Callers must pass exactly six ASCII hex digits.
fn normalize_prefix(hex: &str) -> String {
    let hex = hex.to_ascii_lowercase();
    format!("{}:{}:{}", &hex[0..2], &hex[2..4], &hex[4..6])
}

/// Iterator over the entries of a registry, yielding read errors as they occur.
pub struct RegistryEntries<R> {
    reader: R,
    buffer: String,
    lines: usize,
}

impl<R: BufRead> RegistryEntries<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: String::new(),
            lines: 0,
        }
    }

    /// Lines consumed so far.
    pub fn lines(&self) -> usize {
        self.lines
    }
}

impl<R: BufRead> Iterator for RegistryEntries<R> {
    type Item = Result<VendorEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buffer.clear();
            match self.reader.read_line(&mut self.buffer) {
                Ok(0) => return None,
                Ok(_) => {
                    self.lines += 1;
                    if let Some(entry) = parse_registry_line(&self.buffer) {
                        return Some(Ok(entry));
                    }
                }
                Err(error) => return Some(Err(error.into())),
            }
        }
    }
}
