use thiserror::Error;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_000;

pub type ParcelId = u64;
pub type UserId = u64;
/// Sequence number assigned by the store when a transaction is persisted.
pub type TransactionId = u64;
pub type Timestamp = chrono::DateTime<chrono::Utc>;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    SerializationError(#[from] Box<bincode::ErrorKind>),

    #[error("Invalid transaction: {0}")]
    ValidationError(String),

    #[error("Failed to read config file '{0}': {1}")]
    ConfigReadError(String, std::io::Error),

    #[error("Failed to parse config file '{0}': {1}")]
    ConfigParseError(String, serde_json::Error),
}

pub mod config;
pub mod transaction;
