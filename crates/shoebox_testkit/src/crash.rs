//! Log damage that mimics an interrupted write.
//!
//! Use with [`TestDatabase::reopen_after`](crate::TestDatabase::reopen_after):
//!
//! ```rust,ignore
//! let db = db.reopen_after(|log| {
//!     truncate_tail(log, 3).unwrap();
//! });
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Returns the log size in bytes.
pub fn log_len(log: &Path) -> io::Result<u64> {
    Ok(fs::metadata(log)?.len())
}

/// Cuts `bytes` off the end of the log, as if the last write stopped
/// early. Returns the new length.
pub fn truncate_tail(log: &Path, bytes: u64) -> io::Result<u64> {
    let file = OpenOptions::new().write(true).open(log)?;
    let len = file.metadata()?.len().saturating_sub(bytes);
    file.set_len(len)?;
    file.sync_all()?;
    Ok(len)
}

/// Appends bytes that do not form a valid record.
pub fn append_garbage(log: &Path, garbage: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().append(true).open(log)?;
    file.write_all(garbage)?;
    file.sync_all()
}

/// Inverts one byte `from_end` bytes before the end of the log.
pub fn flip_byte_from_end(log: &Path, from_end: usize) -> io::Result<()> {
    let mut data = fs::read(log)?;
    let Some(index) = data.len().checked_sub(from_end + 1) else {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "log shorter than offset"));
    };
    data[index] ^= 0xff;
    fs::write(log, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn damage_helpers_edit_the_file() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("data.log");
        fs::write(&log, [1u8, 2, 3, 4]).unwrap();

        assert_eq!(truncate_tail(&log, 1).unwrap(), 3);
        append_garbage(&log, &[9, 9]).unwrap();
        assert_eq!(log_len(&log).unwrap(), 5);
        flip_byte_from_end(&log, 0).unwrap();
        assert_eq!(fs::read(&log).unwrap(), vec![1, 2, 3, 9, 0xf6]);
        assert!(flip_byte_from_end(&log, 10).is_err());
    }
}
