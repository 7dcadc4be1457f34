use std::collections::HashMap;
use model::transaction::{Transaction, TransactionHash};
use model::{ParcelId, TransactionId};
use crate::{Backend, StoreResult};

/// Keeps everything in process memory. Lost when the process exits.
#[derive(Default)]
pub struct MemoryBackend {
    transactions: HashMap<TransactionHash, Transaction>,
    parcels: HashMap<ParcelId, Vec<TransactionHash>>,
    last_id: TransactionId,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    fn last_id(&self) -> TransactionId {
        self.last_id
    }

    fn contains(&self, hash: &str) -> StoreResult<bool> {
        Ok(self.transactions.contains_key(hash))
    }

    fn write(&mut self, id: TransactionId, transaction: &Transaction) -> StoreResult<()> {
        let hash = transaction.hash().to_string();
        self.parcels
            .entry(transaction.parcel_id())
            .or_insert_with(Vec::new)
            .push(hash.clone());
        self.transactions.insert(hash, transaction.clone());
        self.last_id = self.last_id.max(id);
        Ok(())
    }

    fn read(&self, hash: &str) -> StoreResult<Option<Transaction>> {
        Ok(self.transactions.get(hash).cloned())
    }

    fn read_parcel(&self, parcel_id: ParcelId) -> StoreResult<Vec<Transaction>> {
        Ok(self
            .parcels
            .get(&parcel_id)
            .map(|hashes| {
                hashes
                    .iter()
                    .filter_map(|h| self.transactions.get(h).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }
}
