//! Scan command implementation.

use super::{escape_key, open_existing};
use serde::Serialize;
use shoebox_core::DbHandle;
use std::path::Path;

/// One scanned key.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ScannedKey {
    /// Escaped key.
    pub key: String,
    /// Value length in bytes.
    pub value_len: usize,
}

/// Collects up to `limit` keys under `prefix`.
pub fn scan(
    handle: &DbHandle,
    prefix: &[u8],
    limit: Option<usize>,
    reverse: bool,
) -> Result<Vec<ScannedKey>, Box<dyn std::error::Error>> {
    let limit = limit.unwrap_or(usize::MAX);
    let mut out = Vec::new();
    let mut iter = handle.iter();
    if reverse {
        match handle.last_with_prefix(prefix)? {
            Some((last, _)) => iter.seek_for_prev(&last)?,
            None => return Ok(out),
        }
    } else {
        iter.seek(prefix)?;
    }

    while iter.valid() && iter.key().starts_with(prefix) && out.len() < limit {
        out.push(ScannedKey {
            key: escape_key(iter.key()),
            value_len: iter.value().len(),
        });
        if reverse {
            iter.prev()?;
        } else {
            iter.next()?;
        }
    }
    Ok(out)
}

/// Runs the scan command.
pub fn run(
    path: &Path,
    prefix: &str,
    limit: Option<usize>,
    reverse: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_existing(path)?;
    let keys = scan(&db.handle(), prefix.as_bytes(), limit, reverse)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&keys)?);
        }
        _ => {
            for key in &keys {
                println!("{}  ({} bytes)", key.key, key.value_len);
            }
            println!("{} keys", keys.len());
        }
    }
    Ok(())
}
