//! Database and dispatcher configuration.

/// Configuration for opening a database and its dispatch queues.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the database directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to fsync the log on every commit (safer but slower).
    /// When false, commits are flushed to the OS only.
    pub sync_on_commit: bool,

    /// Worker threads in the concurrent dispatch pool.
    pub pool_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
            pool_threads: 4,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to fsync the log on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the number of concurrent pool workers (at least one).
    #[must_use]
    pub const fn pool_threads(mut self, threads: usize) -> Self {
        self.pool_threads = if threads == 0 { 1 } else { threads };
        self
    }
}
