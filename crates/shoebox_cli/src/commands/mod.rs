//! CLI command implementations.

pub mod fsck;
pub mod inspect;
pub mod queue;
pub mod scan;

use shoebox_core::{Config, Database};
use std::path::Path;

/// Opens an existing database; never creates one.
pub fn open_existing(path: &Path) -> Result<Database, Box<dyn std::error::Error>> {
    if !path.join("data.log").exists() {
        return Err(format!("No database found at {}", path.display()).into());
    }
    Ok(Database::open_with_config(path, Config::new().create_if_missing(false))?)
}

/// Renders a key with printable ASCII kept and other bytes as `\xNN`.
pub fn escape_key(key: &[u8]) -> String {
    let mut out = String::with_capacity(key.len());
    for &b in key {
        if b.is_ascii_graphic() && b != b'\\' {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{b:02x}"));
        }
    }
    out
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_binary_bytes() {
        assert_eq!(escape_key(b"p/\x80\x00"), "p/\\x80\\x00");
        assert_eq!(escape_key(b"a\\b"), "a\\x5cb");
    }

    #[test]
    fn missing_database_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_existing(&dir.path().join("nope")).unwrap_err();
        assert!(err.to_string().contains("No database found"));
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(10), "10 bytes");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
