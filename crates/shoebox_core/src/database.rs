//! Database facade and recovery.

use crate::config::Config;
#[cfg(feature = "std")]
use crate::dir::DatabaseDir;
use crate::error::{CoreError, CoreResult};
use crate::kv::store::Store;
use crate::kv::{DbHandle, StoreStats};
use crate::metadata::{self, CURRENT_FORMAT_VERSION, FORMAT_VERSION_KEY};
use crate::types::SequenceNumber;
use shoebox_storage::{InMemoryBackend, LogBackend};
use std::fmt;
#[cfg(feature = "std")]
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// The main database handle.
///
/// `Database` opens the commit log, replays it, and hands out
/// [`DbHandle`]s. All handles share one in-memory store; dropping the
/// `Database` while handles are alive keeps the store alive but releases
/// the directory lock.
///
/// # Opening a Database
///
/// ```rust,ignore
/// use shoebox_core::Database;
/// use std::path::Path;
///
/// let db = Database::open(Path::new("shoebox_data"))?;
/// let txn = db.new_transaction()?;
/// txn.put("k", "v")?;
/// txn.commit()?;
/// ```
///
/// # In-Memory Databases
///
/// ```rust,ignore
/// let db = Database::open_in_memory()?;
/// ```
pub struct Database {
    config: Config,
    #[cfg(feature = "std")]
    dir: Option<DatabaseDir>,
    store: Arc<Store>,
}

impl Database {
    /// Opens a database from a directory path with the default
    /// configuration.
    ///
    /// # Errors
    ///
    /// - `DatabaseLocked` if another process has the directory open
    /// - `InvalidFormat` if the stored format is newer than this build
    /// - I/O errors from the directory or log file
    #[cfg(feature = "std")]
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a database from a directory path.
    ///
    /// ```rust,ignore
    /// use shoebox_core::{Config, Database};
    ///
    /// let config = Config::default().sync_on_commit(false);
    /// let db = Database::open_with_config(Path::new("shoebox_data"), config)?;
    /// ```
    #[cfg(feature = "std")]
    pub fn open_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        use shoebox_storage::FileBackend;

        let dir = DatabaseDir::open(path, config.create_if_missing)?;
        if !config.create_if_missing && dir.is_new_database() {
            return Err(CoreError::invalid_format(
                "database does not exist and create_if_missing is false",
            ));
        }

        let backend = FileBackend::open_with_create_dirs(&dir.log_path())?;
        let mut db = Self::open_with_backend(config, Box::new(backend))?;
        debug!(path = %dir.path().display(), "opened database directory");
        db.dir = Some(dir);
        Ok(db)
    }

    /// Opens an ephemeral database. Nothing survives the process.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_with_backend(Config::default(), Box::new(InMemoryBackend::new()))
    }

    /// Opens a database over an arbitrary log backend.
    ///
    /// The log is replayed, a torn tail is truncated, and the persisted
    /// format version is checked.
    pub fn open_with_backend(config: Config, backend: Box<dyn LogBackend>) -> CoreResult<Self> {
        let store = Arc::new(Store::open(backend, config.sync_on_commit)?);
        let db = Self {
            config,
            #[cfg(feature = "std")]
            dir: None,
            store,
        };
        db.check_format()?;
        Ok(db)
    }

    fn check_format(&self) -> CoreResult<()> {
        let handle = self.handle();
        match metadata::format_version(&handle)? {
            None => {
                debug!(version = CURRENT_FORMAT_VERSION, "initializing fresh store");
                handle.put_value(FORMAT_VERSION_KEY, &CURRENT_FORMAT_VERSION)
            }
            Some(version) if version > CURRENT_FORMAT_VERSION => {
                Err(CoreError::invalid_format(format!(
                    "store format {version} is newer than supported {CURRENT_FORMAT_VERSION}"
                )))
            }
            Some(_) => Ok(()),
        }
    }

    /// Returns a direct handle.
    #[must_use]
    pub fn handle(&self) -> DbHandle {
        DbHandle::direct(Arc::clone(&self.store))
    }

    /// Starts a transaction.
    pub fn new_transaction(&self) -> CoreResult<DbHandle> {
        self.handle().new_transaction()
    }

    /// Freezes the current committed state.
    #[must_use]
    pub fn new_snapshot(&self) -> DbHandle {
        self.handle().new_snapshot()
    }

    /// Runs `f` in a transaction, committing if it returns `Ok` and
    /// abandoning otherwise.
    pub fn transaction<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&DbHandle) -> CoreResult<T>,
    {
        let txn = self.new_transaction()?;
        match f(&txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                txn.abandon()?;
                Err(e)
            }
        }
    }

    /// Returns the sequence number of the last committed batch.
    #[must_use]
    pub fn committed_seq(&self) -> SequenceNumber {
        self.store.committed_seq()
    }

    /// Returns the number of live keys, metadata included.
    pub fn key_count(&self) -> CoreResult<usize> {
        Ok(self.store.stats()?.live_keys)
    }

    /// Drops versions no live snapshot can see. Returns how many were
    /// dropped.
    pub fn collect_garbage(&self) -> usize {
        let dropped = self.store.collect_garbage();
        debug!(dropped, "collected garbage");
        dropped
    }

    /// Returns store counters.
    pub fn stats(&self) -> CoreResult<StoreStats> {
        self.store.stats()
    }

    /// Returns the configuration the database was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the directory path, `None` when not opened from a path.
    #[cfg(feature = "std")]
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(DatabaseDir::path)
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("committed_seq", &self.committed_seq())
            .finish_non_exhaustive()
    }
}
