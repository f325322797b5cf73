//! Queue command implementation.

use super::open_existing;
use serde::Serialize;
use shoebox_core::Database;
use shoebox_sync::NetworkQueue;
use std::path::Path;

/// One pending network operation.
#[derive(Debug, Serialize)]
pub struct QueueRow {
    /// Priority band.
    pub priority: i32,
    /// Insertion sequence.
    pub sequence: u64,
    /// Operation kind.
    pub kind: String,
    /// Target entity, as `table/id`.
    pub target: Option<String>,
    /// Entities carried by the operation.
    pub local_ids: Vec<i64>,
}

/// Lists pending operations in service order.
pub fn pending(db: &Database) -> Result<Vec<QueueRow>, Box<dyn std::error::Error>> {
    let entries = NetworkQueue::new().entries(&db.handle())?;
    Ok(entries
        .into_iter()
        .map(|entry| QueueRow {
            priority: entry.priority(),
            sequence: entry.sequence(),
            kind: entry.op.kind.to_string(),
            target: entry.op.target.as_ref().map(ToString::to_string),
            local_ids: entry.op.local_ids,
        })
        .collect())
}

/// Runs the queue command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_existing(path)?;
    let rows = pending(&db)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        _ => {
            if rows.is_empty() {
                println!("Network queue is empty");
                return Ok(());
            }
            println!("{:>8} {:>8}  {:<16} {}", "PRIORITY", "SEQ", "KIND", "TARGET");
            for row in &rows {
                let target = match (&row.target, row.local_ids.is_empty()) {
                    (Some(target), _) => target.clone(),
                    (None, false) => format!("{:?}", row.local_ids),
                    (None, true) => "-".to_string(),
                };
                println!("{:>8} {:>8}  {:<16} {}", row.priority, row.sequence, row.kind, target);
            }
            println!("{} pending", rows.len());
        }
    }
    Ok(())
}
