//! Common types and utilities for the clustering engine

/// Error type for clustering operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Address key that was never assigned an identity
    #[error("Address not found in identity index: {key}")]
    NotFound {
        /// Printable form of the offending address key
        key: String,
    },

    /// Disjoint-set size differs from the identity count
    #[error("Size mismatch: expected {expected} identities, found {actual}")]
    SizeMismatch {
        /// Identity count reported by the index
        expected: u64,
        /// Size of the structure that was handed in
        actual: u64,
    },

    /// Identity counter exhausted the 32-bit identity space
    #[error("Identity space exhausted after {0} addresses")]
    IdentityOverflow(u64),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// RocksDB error
    #[error("RocksDB error: {0}")]
    RocksDB(String),

    /// Ledger reader failed to produce a block
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Persisted cluster array is unreadable
    #[error("Corrupt cluster file: {0}")]
    CorruptClusterFile(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a new not-found error for the given printable key
    pub fn not_found<S: Into<String>>(key: S) -> Self {
        Error::NotFound { key: key.into() }
    }

    /// Create a new size mismatch error
    pub fn size_mismatch(expected: u64, actual: u64) -> Self {
        Error::SizeMismatch { expected, actual }
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Error::Storage(msg.into())
    }

    /// Create a new RocksDB error
    pub fn rocksdb<S: Into<String>>(msg: S) -> Self {
        Error::RocksDB(msg.into())
    }

    /// Create a new ledger error
    pub fn ledger<S: Into<String>>(msg: S) -> Self {
        Error::Ledger(msg.into())
    }

    /// Create a new corrupt cluster file error
    pub fn corrupt_cluster_file<S: Into<String>>(msg: S) -> Self {
        Error::CorruptClusterFile(msg.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// Whether this error means the persistent store failed
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::RocksDB(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(feature = "rocks")]
impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::RocksDB(err.into_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(format!("JSON serialization error: {}", err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(format!("IO error: {}", err))
    }
}
