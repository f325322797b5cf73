//! Inspect command implementation.

use super::{format_size, open_existing};
use serde::Serialize;
use shoebox_core::model::ALL_TABLES;
use shoebox_core::{metadata, Database};
use shoebox_sync::queue::{QUEUE_INDEX_PREFIX, QUEUE_PREFIX};
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// Commit log size in bytes.
    pub log_size: u64,
    /// Last committed sequence number.
    pub committed_seq: u64,
    /// Live keys.
    pub live_keys: usize,
    /// Stored format version.
    pub format_version: Option<u32>,
    /// Next network queue sequence number.
    pub network_queue_seq: u64,
    /// Per-table statistics.
    pub tables: Vec<TableStats>,
    /// Key counts per prefix.
    pub prefixes: Vec<PrefixCount>,
}

/// Statistics for a single content table.
#[derive(Debug, Serialize)]
pub struct TableStats {
    /// Table name.
    pub name: String,
    /// Stored entities.
    pub records: usize,
    /// Next local id to allocate.
    pub next_id: i64,
    /// Repair watermark.
    pub fsck_version: u32,
}

/// Number of keys under a prefix.
#[derive(Debug, Serialize)]
pub struct PrefixCount {
    /// Key prefix.
    pub prefix: String,
    /// Keys under it.
    pub keys: usize,
}

/// Collects the inspection result.
pub fn inspect(db: &Database, path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let handle = db.handle();
    let stats = db.stats()?;

    let mut tables = Vec::new();
    let mut prefixes = Vec::new();
    for spec in ALL_TABLES {
        tables.push(TableStats {
            name: spec.name.to_string(),
            records: handle.count_prefix(spec.primary_prefix)?,
            next_id: metadata::next_id(&handle, spec.name)?,
            fsck_version: metadata::fsck_version(&handle, spec.name)?,
        });
        let owned = std::iter::once(spec.primary_prefix)
            .chain(std::iter::once(spec.server_prefix))
            .chain(spec.index_prefixes.iter().copied());
        for prefix in owned {
            prefixes.push(PrefixCount {
                prefix: prefix.to_string(),
                keys: handle.count_prefix(prefix)?,
            });
        }
    }
    for prefix in [QUEUE_PREFIX, QUEUE_INDEX_PREFIX, metadata::METADATA_PREFIX] {
        prefixes.push(PrefixCount {
            prefix: prefix.to_string(),
            keys: handle.count_prefix(prefix)?,
        });
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        log_size: stats.log_size,
        committed_seq: stats.committed_seq.as_u64(),
        live_keys: stats.live_keys,
        format_version: metadata::format_version(&handle)?,
        network_queue_seq: metadata::network_queue_seq(&handle)?,
        tables,
        prefixes,
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_existing(path)?;
    let result = inspect(&db, path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Shoebox Database Inspection");
    println!("===========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Storage:");
    println!("  Log size:       {}", format_size(result.log_size));
    println!("  Committed seq:  {}", result.committed_seq);
    println!("  Live keys:      {}", result.live_keys);
    match result.format_version {
        Some(version) => println!("  Format version: {version}"),
        None => println!("  Format version: (unset)"),
    }
    println!("  Queue seq:      {}", result.network_queue_seq);
    println!();
    println!("Tables:");
    for table in &result.tables {
        println!(
            "  {:<12} {} records, next id {}, fsck v{}",
            table.name, table.records, table.next_id, table.fsck_version
        );
    }
    println!();
    println!("Prefixes:");
    for prefix in &result.prefixes {
        println!("  {:<6} {}", prefix.prefix, prefix.keys);
    }
}
