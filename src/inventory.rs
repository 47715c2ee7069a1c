//! Address list loading.
//!
//! The inventory is a plain text file with one host per line. Surrounding whitespace is not
//! significant, blank lines are skipped and lines starting with `#` are comments.

use std::path::Path;

use log::debug;

use crate::error::DispatchError;

/// Parses an address list, preserving order.
pub fn parse_addresses(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Reads and parses an address list file.
pub fn load_addresses(path: impl AsRef<Path>) -> Result<Vec<String>, DispatchError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| DispatchError::Inventory {
        path: path.to_path_buf(),
        source,
    })?;
    let hosts = parse_addresses(&text);
    debug!("Loaded {} hosts from {}", hosts.len(), path.display());
    Ok(hosts)
}
