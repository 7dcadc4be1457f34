use model::transaction::TransactionHash;
use model::ParcelId;
use storage::StoreError;

pub type LedgerResult<T> = core::result::Result<T, LedgerError>;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Invalid transaction: {0}")]
    Validation(String),

    #[error("Parcel {0} has no transactions")]
    NotFound(ParcelId),

    #[error("Parcel {parcel_id} moved past {expected} before the append could commit")]
    ConcurrentModification {
        parcel_id: ParcelId,
        expected: TransactionHash,
        actual: Option<TransactionHash>,
    },

    #[error("Transaction of parcel {parcel_id} is dated before its head {head}")]
    Backdated { parcel_id: ParcelId, head: TransactionHash },

    #[error("Parcel {0} already has a genesis transaction")]
    GenesisExists(ParcelId),

    #[error("Storage failure: {0}")]
    Store(#[from] StoreError),
}

impl From<model::Error> for LedgerError {
    fn from(error: model::Error) -> Self {
        match error {
            model::Error::ValidationError(message) => LedgerError::Validation(message),
            other => LedgerError::Store(StoreError::SerializationError(other)),
        }
    }
}
