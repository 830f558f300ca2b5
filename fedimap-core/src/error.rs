/// Top-level fedimap error type.
///
/// All fallible operations in `fedimap-core` return [`Result<T, FedimapError>`](Result).
/// Each variant wraps a domain-specific error enum, allowing callers to
/// match on the error source without losing type information.
///
/// Per-instance fetch failures are deliberately absent here: they are
/// outcomes recorded against the instance (see [`crate::types::FailureKind`]),
/// not errors that abort a crawl pass.
#[derive(thiserror::Error, Debug)]
pub enum FedimapError {
    /// Error from the instance store (`SQLite` operations, migrations).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Error in configuration parsing or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The outbound HTTP client could not be constructed.
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// The crawl pass itself broke down (not a single instance failing).
    #[error("Crawl error: {0}")]
    Crawl(#[from] CrawlError),
}

/// Errors from the SQLite-backed instance store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Underlying `SQLite` operation failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Schema migration failed (version mismatch or DDL error).
    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Errors in fedimap configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist at the expected path.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),

    /// Reading an auxiliary config file (e.g. the allow-list) failed.
    #[error("IO error reading {path}: {source}")]
    Io {
        /// File that could not be read.
        path: String,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
}

/// Errors setting up the outbound instance client.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// `reqwest` refused the client configuration (TLS backend, etc.).
    #[error("HTTP client build failed: {0}")]
    Build(String),
}

/// Errors that break a crawl pass as a whole.
#[derive(thiserror::Error, Debug)]
pub enum CrawlError {
    /// A worker task panicked or was cancelled.
    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Convenience alias for `Result<T, FedimapError>`.
pub type Result<T> = std::result::Result<T, FedimapError>;
