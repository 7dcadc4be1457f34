use std::cmp::Ordering;
use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::sync::oneshot;
use model::transaction::{Transaction, TransactionHash};
use model::{ParcelId, TransactionId};
use crate::{Backend, MemoryBackend, StoreError, StoreResult, TransactionStore};

#[derive(Debug)]
enum WriteCondition {
    Always,
    HeadIs(Option<TransactionHash>),
}

enum StoreCommand {
    Insert(Transaction, WriteCondition, oneshot::Sender<StoreResult<Transaction>>),
    FindByParcel(ParcelId, oneshot::Sender<StoreResult<Vec<Transaction>>>),
    FindByHash(TransactionHash, oneshot::Sender<StoreResult<Option<Transaction>>>),
}

/// Handle to the storage task. Cloning is cheap, every clone talks to the same task.
/// The task executes commands one at a time, which is what makes the head check and
/// the write of `insert_if_head` a single step.
#[derive(Clone)]
pub struct Storage {
    channel: Sender<StoreCommand>,
}

impl Storage {
    /// Spawns the storage task on the current tokio runtime.
    pub fn new<B: Backend>(backend: B, capacity: usize) -> Self {
        let (tx, rx) = channel(capacity);
        tokio::spawn(async move {
            StoreTask::new(backend).run(rx).await;
        });
        Self { channel: tx }
    }

    pub fn in_memory(capacity: usize) -> Self {
        Self::new(MemoryBackend::new(), capacity)
    }

    #[cfg(feature = "rocksdb")]
    pub fn open<P: AsRef<std::path::Path>>(path: P, capacity: usize) -> StoreResult<Self> {
        let backend = crate::RocksBackend::open(path)?;
        Ok(Self::new(backend, capacity))
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<StoreResult<T>>) -> StoreCommand,
    ) -> StoreResult<T> {
        let (sender, receiver) = oneshot::channel();
        self.channel
            .send(command(sender))
            .await
            .map_err(|_| StoreError::Closed)?;
        receiver.await.map_err(|_| StoreError::Closed)?
    }
}

#[async_trait]
impl TransactionStore for Storage {
    async fn insert(&self, transaction: Transaction) -> StoreResult<Transaction> {
        self.request(|reply| StoreCommand::Insert(transaction, WriteCondition::Always, reply))
            .await
    }

    async fn insert_if_head(
        &self,
        transaction: Transaction,
        expected_head: Option<TransactionHash>,
    ) -> StoreResult<Transaction> {
        self.request(|reply| {
            StoreCommand::Insert(transaction, WriteCondition::HeadIs(expected_head), reply)
        })
        .await
    }

    async fn find_by_parcel(&self, parcel_id: ParcelId) -> StoreResult<Vec<Transaction>> {
        self.request(|reply| StoreCommand::FindByParcel(parcel_id, reply))
            .await
    }

    async fn find_by_hash(&self, hash: &str) -> StoreResult<Option<Transaction>> {
        self.request(|reply| StoreCommand::FindByHash(hash.to_string(), reply))
            .await
    }
}

struct StoreTask<B> {
    backend: B,
    last_id: TransactionId,
}

impl<B: Backend> StoreTask<B> {
    fn new(backend: B) -> Self {
        let last_id = backend.last_id();
        Self { backend, last_id }
    }

    async fn run(&mut self, mut receiver: Receiver<StoreCommand>) {
        while let Some(command) = receiver.recv().await {
            match command {
                StoreCommand::Insert(transaction, condition, reply) => {
                    let _ = reply.send(self.insert(transaction, condition));
                }
                StoreCommand::FindByParcel(parcel_id, reply) => {
                    let _ = reply.send(self.find_by_parcel(parcel_id));
                }
                StoreCommand::FindByHash(hash, reply) => {
                    let _ = reply.send(self.backend.read(&hash));
                }
            }
        }
        debug!("All storage handles dropped, storage task stops");
    }

    fn insert(&mut self, transaction: Transaction, condition: WriteCondition) -> StoreResult<Transaction> {
        if self.backend.contains(transaction.hash())? {
            return Err(StoreError::DuplicateHash(transaction.hash().to_string()));
        }

        if let WriteCondition::HeadIs(expected) = condition {
            let head = self.find_by_parcel(transaction.parcel_id())?.into_iter().next();
            let actual = head.as_ref().map(|head| head.hash().to_string());
            if actual != expected {
                warn!(
                    "Rejected {:?}: parcel {} moved to head {:?}",
                    transaction,
                    transaction.parcel_id(),
                    actual
                );
                return Err(StoreError::HeadMismatch {
                    parcel_id: transaction.parcel_id(),
                    expected,
                    actual,
                });
            }
            // The new transaction must become the head.
            if let Some(head) = head.filter(|head| transaction.created_at() < head.created_at()) {
                warn!("Rejected {:?}: created before the head {:?}", transaction, head);
                return Err(StoreError::Backdated {
                    parcel_id: transaction.parcel_id(),
                    head: head.hash().to_string(),
                });
            }
        }

        let id = self.last_id + 1;
        let transaction = transaction.with_id(id);
        self.backend.write(id, &transaction)?;
        self.last_id = id;

        debug!("Stored {:?} with id {}", transaction, id);
        Ok(transaction)
    }

    fn find_by_parcel(&self, parcel_id: ParcelId) -> StoreResult<Vec<Transaction>> {
        let mut transactions = self.backend.read_parcel(parcel_id)?;
        sort_newest_first(&mut transactions);
        Ok(transactions)
    }
}

/// Orders by creation time, newest first. Transactions created within the same
/// microsecond are ordered by sequence number, the later write first.
fn sort_newest_first(transactions: &mut [Transaction]) {
    transactions.sort_by(|a, b| newest_first(a, b));
}

fn newest_first(a: &Transaction, b: &Transaction) -> Ordering {
    b.created_at()
        .cmp(&a.created_at())
        .then_with(|| b.id().cmp(&a.id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use model::transaction::{NewTransaction, INITIAL_REGISTRATION, SALE};
    use model::Timestamp;

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_709_287_200 + secs, 0).unwrap()
    }

    fn genesis(parcel_id: ParcelId, created_at: Timestamp) -> Transaction {
        NewTransaction::new(INITIAL_REGISTRATION)
            .parcel(parcel_id)
            .new_owner(1)
            .created_at(created_at)
            .seal()
            .unwrap()
    }

    fn sale(parent: &Transaction, owner: u64, created_at: Timestamp) -> Transaction {
        NewTransaction::new(SALE)
            .parcel(parent.parcel_id())
            .previous_owner(parent.new_owner_id())
            .new_owner(owner)
            .previous_hash(parent.hash())
            .created_at(created_at)
            .seal()
            .unwrap()
    }

    #[tokio::test]
    async fn insert_assigns_increasing_ids() {
        let storage = Storage::in_memory(10);

        let first = storage.insert(genesis(1, at(0))).await.unwrap();
        let second = storage.insert(genesis(2, at(0))).await.unwrap();

        assert_eq!(first.id(), Some(1));
        assert_eq!(second.id(), Some(2));
        assert_eq!(storage.find_by_hash(first.hash()).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn duplicate_hash_is_rejected() {
        let storage = Storage::in_memory(10);
        let tx = genesis(1, at(0));

        storage.insert(tx.clone()).await.unwrap();
        let result = storage.insert(tx.clone()).await;

        assert!(matches!(result, Err(StoreError::DuplicateHash(h)) if h == tx.hash()));
        assert_eq!(storage.find_by_parcel(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn parcel_history_is_newest_first() {
        let storage = Storage::in_memory(10);
        let first = storage.insert(genesis(1, at(0))).await.unwrap();
        let second = storage.insert(sale(&first, 2, at(10))).await.unwrap();
        let third = storage.insert(sale(&second, 3, at(20))).await.unwrap();
        storage.insert(genesis(2, at(30))).await.unwrap();

        let history = storage.find_by_parcel(1).await.unwrap();

        assert_eq!(history, vec![third.clone(), second, first]);
        assert_eq!(storage.head(1).await.unwrap(), Some(third));
        assert!(storage.find_by_parcel(3).await.unwrap().is_empty());
        assert_eq!(storage.head(3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn equal_timestamps_fall_back_to_sequence() {
        let storage = Storage::in_memory(10);
        let first = storage.insert(genesis(1, at(0))).await.unwrap();
        let second = storage.insert(sale(&first, 2, at(0))).await.unwrap();

        let history = storage.find_by_parcel(1).await.unwrap();

        assert_eq!(history, vec![second, first]);
    }

    #[tokio::test]
    async fn insert_if_head_checks_the_current_head() {
        let storage = Storage::in_memory(10);
        let first = genesis(1, at(0));

        let first = storage.insert_if_head(first, None).await.unwrap();
        let second = storage
            .insert_if_head(sale(&first, 2, at(1)), Some(first.hash().to_string()))
            .await
            .unwrap();

        let stale = storage
            .insert_if_head(sale(&first, 3, at(2)), Some(first.hash().to_string()))
            .await;
        match stale {
            Err(StoreError::HeadMismatch { parcel_id, expected, actual }) => {
                assert_eq!(parcel_id, 1);
                assert_eq!(expected.as_deref(), Some(first.hash()));
                assert_eq!(actual.as_deref(), Some(second.hash()));
            }
            other => panic!("Unexpected result {:?}", other),
        }

        let second_root = storage.insert_if_head(genesis(1, at(3)), None).await;
        assert!(matches!(second_root, Err(StoreError::HeadMismatch { expected: None, .. })));
        assert_eq!(storage.find_by_parcel(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn insert_if_head_refuses_a_child_older_than_the_head() {
        let storage = Storage::in_memory(10);
        let root = storage.insert(genesis(1, at(100))).await.unwrap();

        let backdated = storage
            .insert_if_head(sale(&root, 2, at(50)), Some(root.hash().to_string()))
            .await;

        match backdated {
            Err(StoreError::Backdated { parcel_id, head }) => {
                assert_eq!(parcel_id, 1);
                assert_eq!(head, root.hash());
            }
            other => panic!("Unexpected result {:?}", other),
        }
        assert_eq!(storage.find_by_parcel(1).await.unwrap(), vec![root.clone()]);

        let same_instant = storage
            .insert_if_head(sale(&root, 3, at(100)), Some(root.hash().to_string()))
            .await
            .unwrap();
        assert_eq!(storage.head(1).await.unwrap(), Some(same_instant));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_writers_on_one_head_produce_one_winner() {
        let storage = Storage::in_memory(100);
        let root = storage.insert(genesis(1, at(0))).await.unwrap();

        let attempts = (0..8u64).map(|owner| {
            let storage = storage.clone();
            let tx = sale(&root, owner + 10, at(1));
            let expected = Some(root.hash().to_string());
            tokio::spawn(async move { storage.insert_if_head(tx, expected).await })
        });
        let results = futures::future::join_all(attempts).await;

        let winners = results.iter().filter(|r| matches!(r, Ok(Ok(_)))).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Ok(Err(StoreError::HeadMismatch { .. }))))
            .count();
        assert_eq!(winners, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(storage.find_by_parcel(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn ids_continue_after_backend_contents() {
        let mut backend = MemoryBackend::new();
        backend.write(41, &genesis(1, at(0)).with_id(41)).unwrap();
        let storage = Storage::new(backend, 10);

        let next = storage.insert(genesis(2, at(0))).await.unwrap();

        assert_eq!(next.id(), Some(42));
    }

    #[cfg(feature = "rocksdb")]
    #[tokio::test]
    async fn rocksdb_storage_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let first = {
            let storage = Storage::open(dir.path(), 10).unwrap();
            let first = storage.insert(genesis(1, at(0))).await.unwrap();
            storage.insert(sale(&first, 2, at(5))).await.unwrap();
            first
        };
        // Let the previous task release the database lock.
        let mut reopened = Storage::open(dir.path(), 10);
        for _ in 0..100 {
            if reopened.is_ok() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            reopened = Storage::open(dir.path(), 10);
        }
        let storage = reopened.unwrap();

        let history = storage.find_by_parcel(1).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1], first);
        let third = storage.insert(genesis(2, at(9))).await.unwrap();
        assert_eq!(third.id(), Some(3));
    }
}
