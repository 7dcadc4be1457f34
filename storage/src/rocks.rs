use std::convert::TryInto;
use std::path::Path;
use log::info;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use model::transaction::Transaction;
use model::{ParcelId, TransactionId};
use crate::{Backend, StoreError, StoreResult};

const SEQUENCE_KEY: &[u8] = b"meta:sequence";

/// RocksDB backend. Key layout:
///  - `tx:<hash>` -> bincode encoded transaction
///  - `parcel:<parcel id>:<sequence>` -> hash, both numbers zero padded to 20 digits
///  - `meta:sequence` -> last sequence number, big endian
pub struct RocksBackend {
    db: DB,
    last_id: TransactionId,
}

impl RocksBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let mut options = Options::default();
        options.create_if_missing(true);
        let db = DB::open(&options, path.as_ref())?;

        let last_id = match db.get(SEQUENCE_KEY)? {
            Some(bytes) => {
                let bytes: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StoreError::Corrupted("sequence number is not 8 bytes".to_string()))?;
                TransactionId::from_be_bytes(bytes)
            }
            None => 0,
        };
        info!("Opened ledger store at {:?} with {} transactions", path.as_ref(), last_id);

        Ok(Self { db, last_id })
    }

    fn transaction_key(hash: &str) -> String {
        format!("tx:{}", hash)
    }

    fn parcel_prefix(parcel_id: ParcelId) -> String {
        format!("parcel:{:020}:", parcel_id)
    }
}

impl Backend for RocksBackend {
    fn last_id(&self) -> TransactionId {
        self.last_id
    }

    fn contains(&self, hash: &str) -> StoreResult<bool> {
        Ok(self.db.get(Self::transaction_key(hash))?.is_some())
    }

    fn write(&mut self, id: TransactionId, transaction: &Transaction) -> StoreResult<()> {
        let mut batch = WriteBatch::default();
        batch.put(Self::transaction_key(transaction.hash()), transaction.to_bytes()?);
        batch.put(
            format!("{}{:020}", Self::parcel_prefix(transaction.parcel_id()), id),
            transaction.hash().as_bytes(),
        );
        batch.put(SEQUENCE_KEY, id.to_be_bytes());
        self.db.write(batch)?;

        self.last_id = self.last_id.max(id);
        Ok(())
    }

    fn read(&self, hash: &str) -> StoreResult<Option<Transaction>> {
        match self.db.get(Self::transaction_key(hash))? {
            Some(bytes) => Ok(Some(Transaction::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn read_parcel(&self, parcel_id: ParcelId) -> StoreResult<Vec<Transaction>> {
        let prefix = Self::parcel_prefix(parcel_id);
        let mut transactions = Vec::new();

        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let hash = String::from_utf8_lossy(&value);
            match self.read(&hash)? {
                Some(transaction) => transactions.push(transaction),
                None => {
                    return Err(StoreError::Corrupted(format!(
                        "parcel {} indexes missing transaction {}",
                        parcel_id, hash
                    )))
                }
            }
        }

        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::transaction::{NewTransaction, INITIAL_REGISTRATION, SALE};

    fn genesis(parcel_id: ParcelId) -> Transaction {
        NewTransaction::new(INITIAL_REGISTRATION)
            .parcel(parcel_id)
            .new_owner(1)
            .seal()
            .unwrap()
    }

    #[test]
    fn reopen_restores_transactions_and_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let first = genesis(1);
        let second = NewTransaction::new(SALE)
            .parcel(1)
            .new_owner(2)
            .previous_owner(1)
            .previous_hash(first.hash())
            .seal()
            .unwrap();
        {
            let mut backend = RocksBackend::open(dir.path()).unwrap();
            backend.write(1, &first.clone().with_id(1)).unwrap();
            backend.write(2, &second.clone().with_id(2)).unwrap();
        }

        let backend = RocksBackend::open(dir.path()).unwrap();

        assert_eq!(backend.last_id(), 2);
        assert!(backend.contains(first.hash()).unwrap());
        assert_eq!(backend.read(second.hash()).unwrap(), Some(second.with_id(2)));
        assert_eq!(backend.read_parcel(1).unwrap().len(), 2);
    }

    #[test]
    fn parcel_scan_stops_at_prefix_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = RocksBackend::open(dir.path()).unwrap();
        backend.write(1, &genesis(1).with_id(1)).unwrap();
        backend.write(2, &genesis(2).with_id(2)).unwrap();
        backend.write(3, &genesis(10).with_id(3)).unwrap();

        let parcel = backend.read_parcel(1).unwrap();

        assert_eq!(parcel.len(), 1);
        assert_eq!(parcel[0].parcel_id(), 1);
        assert!(backend.read_parcel(3).unwrap().is_empty());
    }
}
