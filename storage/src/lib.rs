use async_trait::async_trait;
use model::transaction::{Transaction, TransactionHash};
use model::ParcelId;

mod backend;
mod memory;
#[cfg(feature = "rocksdb")]
mod rocks;
mod store;

pub use crate::backend::Backend;
pub use crate::memory::MemoryBackend;
#[cfg(feature = "rocksdb")]
pub use crate::rocks::RocksBackend;
pub use crate::store::Storage;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Transaction hash {0} is already stored")]
    DuplicateHash(TransactionHash),

    #[error("Head of parcel {parcel_id} is {actual:?}, expected {expected:?}")]
    HeadMismatch {
        parcel_id: ParcelId,
        expected: Option<TransactionHash>,
        actual: Option<TransactionHash>,
    },

    #[error("Transaction is older than {head}, the head of parcel {parcel_id}")]
    Backdated { parcel_id: ParcelId, head: TransactionHash },

    #[error("Failed to encode or decode a transaction: {0}")]
    SerializationError(#[from] model::Error),

    #[cfg(feature = "rocksdb")]
    #[error("RocksDB failure: {0}")]
    RocksError(#[from] rocksdb::Error),

    #[error("Corrupted store: {0}")]
    Corrupted(String),

    #[error("Storage task is not running")]
    Closed,
}

/// Where the ledger keeps its transactions. Implementations must make `insert_if_head`
/// atomic with respect to every other write on the same parcel.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Appends a transaction and returns it with its sequence number.
    async fn insert(&self, transaction: Transaction) -> StoreResult<Transaction>;

    /// Appends a transaction only if the head of its parcel is still `expected_head`
    /// (`None` meaning the parcel has no transaction yet) and the transaction is not
    /// older than that head, so that it becomes the new head.
    async fn insert_if_head(
        &self,
        transaction: Transaction,
        expected_head: Option<TransactionHash>,
    ) -> StoreResult<Transaction>;

    /// All transactions of a parcel, newest first.
    async fn find_by_parcel(&self, parcel_id: ParcelId) -> StoreResult<Vec<Transaction>>;

    async fn find_by_hash(&self, hash: &str) -> StoreResult<Option<Transaction>>;

    async fn head(&self, parcel_id: ParcelId) -> StoreResult<Option<Transaction>> {
        Ok(self.find_by_parcel(parcel_id).await?.into_iter().next())
    }
}
