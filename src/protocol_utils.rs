//! Protocol utilities for storage identifier parsing
//!
//! A store identifier names its medium: `file://` for an on-disk file and
//! `mem://` for an in-memory buffer. Identifiers without a protocol are
//! treated as file paths.

/// File-based storage protocol prefix
pub const PROTOCOL_FILE: &str = "file://";

/// Canonical protocol name
pub const PROTOCOL_NAME_FILE: &str = "file";

/// In-memory storage protocol prefix
pub const PROTOCOL_MEM: &str = "mem://";

/// Canonical protocol name
pub const PROTOCOL_NAME_MEM: &str = "mem";

/// Parse a storage identifier to extract the protocol and path
///
/// # Examples
///
/// ```
/// use lobstore::protocol_utils::parse_storage_identifier;
///
/// let (protocol, path) = parse_storage_identifier("file:///tmp/growth.lob");
/// assert_eq!(protocol, "file");
/// assert_eq!(path, "/tmp/growth.lob");
///
/// let (protocol, name) = parse_storage_identifier("mem://scratch");
/// assert_eq!(protocol, "mem");
/// assert_eq!(name, "scratch");
/// ```
pub fn parse_storage_identifier(identifier: &str) -> (&str, &str) {
    if let Some(path) = identifier.strip_prefix(PROTOCOL_FILE) {
        (PROTOCOL_NAME_FILE, path)
    } else if let Some(name) = identifier.strip_prefix(PROTOCOL_MEM) {
        (PROTOCOL_NAME_MEM, name)
    } else {
        (PROTOCOL_NAME_FILE, identifier)
    }
}

/// Builds a `file://` identifier for a path
pub fn file_identifier(path: &std::path::Path) -> String {
    format!("{PROTOCOL_FILE}{}", path.to_string_lossy())
}

/// Appends a suffix to the path part of an identifier, keeping its protocol
pub fn sibling_identifier(identifier: &str, suffix: &str) -> String {
    format!("{identifier}.{suffix}")
}
