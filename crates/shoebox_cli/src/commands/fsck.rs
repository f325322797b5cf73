//! Fsck command implementation.

use super::open_existing;
use shoebox_core::model::Tables;
use shoebox_core::{Database, FsckReport};
use std::path::Path;
use tracing::info;

/// Repairs every table's indexes in one transaction.
pub fn repair(db: &Database, force: bool) -> Result<Vec<FsckReport>, Box<dyn std::error::Error>> {
    let tables = Tables::new();
    let progress: &dyn Fn(&str) = &|message| info!("{message}");
    let reports = db.transaction(|txn| tables.fsck(force, Some(progress), txn))?;
    Ok(reports)
}

/// Runs the fsck command.
pub fn run(path: &Path, force: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_existing(path)?;
    let reports = repair(&db, force)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        _ => {
            println!("Index Check");
            println!("===========");
            for report in &reports {
                if !report.ran {
                    println!("  {:<12} up to date (v{})", report.table, report.version);
                    continue;
                }
                println!(
                    "  {:<12} {} records, {} corrupt, {} repairs (v{})",
                    report.table,
                    report.records,
                    report.corrupt,
                    report.repairs(),
                    report.version
                );
            }
            let total: usize = reports.iter().map(FsckReport::repairs).sum();
            println!();
            println!("Total repairs: {total}");
        }
    }
    Ok(())
}
