//! Test fixtures and database helpers.
//!
//! Every fixture can be reopened, which replays its log the same way a
//! process restart would.

use shoebox_core::{Config, Database};
use shoebox_storage::{FaultSwitch, InMemoryBackend};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

enum Backing {
    Memory(InMemoryBackend),
    File(TempDir),
}

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    backing: Backing,
}

impl TestDatabase {
    /// Creates a database over an in-memory log.
    pub fn memory() -> Self {
        Self::memory_with_config(Config::default())
    }

    /// Creates a database over an in-memory log with `config`.
    pub fn memory_with_config(config: Config) -> Self {
        let log = InMemoryBackend::new();
        let db = Database::open_with_backend(config, Box::new(log.clone()))
            .expect("Failed to open in-memory database");
        Self {
            db,
            backing: Backing::Memory(log),
        }
    }

    /// Creates a database in a fresh temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(&temp_dir.path().join("shoebox")).expect("Failed to open file database");
        Self {
            db,
            backing: Backing::File(temp_dir),
        }
    }

    /// Returns the database directory if file-based.
    pub fn path(&self) -> Option<PathBuf> {
        match &self.backing {
            Backing::File(dir) => Some(dir.path().join("shoebox")),
            Backing::Memory(_) => None,
        }
    }

    /// Returns the commit log file if file-based.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.path().map(|path| path.join("data.log"))
    }

    /// Returns the fault switch of an in-memory log.
    pub fn fault_switch(&self) -> Option<FaultSwitch> {
        match &self.backing {
            Backing::Memory(log) => Some(log.fault_switch()),
            Backing::File(_) => None,
        }
    }

    /// Returns the raw log bytes of an in-memory log.
    pub fn log_bytes(&self) -> Option<Vec<u8>> {
        match &self.backing {
            Backing::Memory(log) => Some(log.data()),
            Backing::File(_) => None,
        }
    }

    /// Closes the database and opens it again from its log.
    pub fn reopen(self) -> Self {
        let Self { db, backing } = self;
        let config = db.config().clone();
        drop(db);
        let db = match &backing {
            Backing::Memory(log) => Database::open_with_backend(config, Box::new(log.clone())),
            Backing::File(dir) => Database::open_with_config(&dir.path().join("shoebox"), config),
        }
        .expect("Failed to reopen database");
        Self { db, backing }
    }

    /// Closes the database, lets `damage` edit the log, and reopens.
    pub fn reopen_after(self, damage: impl FnOnce(&Path)) -> Self {
        let log = self.log_path().expect("Only file databases have a log file");
        let Self { db, backing } = self;
        let config = db.config().clone();
        drop(db);
        damage(&log);
        let Backing::File(dir) = &backing else {
            unreachable!("checked above");
        };
        let db = Database::open_with_config(&dir.path().join("shoebox"), config)
            .expect("Failed to reopen database");
        Self { db, backing }
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a temporary file-based database.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &Path) -> R,
{
    let test_db = TestDatabase::file();
    let path = test_db.path().expect("File database should have a path");
    f(&test_db.db, &path)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Key used by [`populated_database`] for entry `i`.
    pub fn populated_key(i: usize) -> Vec<u8> {
        format!("key/{i:05}").into_bytes()
    }

    /// Creates a database with `count` entries, committed one transaction
    /// per entry.
    pub fn populated_database(count: usize) -> TestDatabase {
        let test_db = TestDatabase::memory();
        for i in 0..count {
            test_db
                .db
                .transaction(|txn| txn.put(populated_key(i), format!("value/{i}")))
                .expect("Failed to put entry");
        }
        test_db
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_database_survives_reopen() {
        let test_db = TestDatabase::memory();
        test_db.handle().put(b"k", b"v").unwrap();
        let test_db = test_db.reopen();
        assert_eq!(test_db.handle().get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn file_database_survives_reopen() {
        let test_db = TestDatabase::file();
        assert!(test_db.log_path().is_some());
        test_db.handle().put(b"k", b"v").unwrap();
        let test_db = test_db.reopen();
        assert_eq!(test_db.handle().get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn populated_scenario() {
        let test_db = scenarios::populated_database(10);
        assert_eq!(test_db.handle().count_prefix(b"key/").unwrap(), 10);
    }
}
