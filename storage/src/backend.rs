use model::transaction::Transaction;
use model::{ParcelId, TransactionId};
use crate::StoreResult;

/// Synchronous key-value side of the store. A backend is owned by a single
/// storage task, so implementations need no locking of their own.
pub trait Backend: Send + 'static {
    /// The highest sequence number written so far, 0 when empty.
    fn last_id(&self) -> TransactionId;

    fn contains(&self, hash: &str) -> StoreResult<bool>;

    /// Persists a transaction under its hash and indexes it by parcel.
    fn write(&mut self, id: TransactionId, transaction: &Transaction) -> StoreResult<()>;

    fn read(&self, hash: &str) -> StoreResult<Option<Transaction>>;

    /// Transactions of a parcel in no particular order.
    fn read_parcel(&self, parcel_id: ParcelId) -> StoreResult<Vec<Transaction>>;
}
