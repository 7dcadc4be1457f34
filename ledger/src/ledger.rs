use std::collections::HashSet;
use log::{debug, info, warn};
use model::config::Parameters;
use model::transaction::{NewTransaction, Transaction, TransactionHash, INITIAL_REGISTRATION};
use model::{ParcelId, UserId};
use storage::{StoreError, TransactionStore};
use crate::audit::{AuditReport, ChainStatus};
use crate::error::{LedgerError, LedgerResult};

/// How a sealed transaction is written.
#[derive(Debug)]
enum WriteDiscipline {
    /// Plain append, whatever the parcel looks like.
    Unconditional,
    /// Append only if the named transaction is still the head of the parcel.
    ChainOnto(TransactionHash),
    /// Append only if the parcel has no transaction yet.
    FirstEntry,
}

/// Per-parcel, hash linked ownership history on top of a [`TransactionStore`].
#[derive(Clone)]
pub struct Ledger<S> {
    store: S,
    parameters: Parameters,
}

impl<S: TransactionStore> Ledger<S> {
    pub fn new(store: S, parameters: Parameters) -> Self {
        Self { store, parameters }
    }

    /// Seals and persists a transaction.
    ///
    /// With `reject_forks`, a transaction whose previous hash is a transaction of the same
    /// parcel is only written while that transaction is still the head, otherwise the append
    /// fails with [`LedgerError::ConcurrentModification`]. Such a transaction may not be dated
    /// before that head either ([`LedgerError::Backdated`]). A previous hash that resolves to
    /// nothing is written as is and shows up later as a broken link. With `single_genesis`,
    /// a transaction without previous hash is refused once the parcel has history.
    pub async fn append(&self, request: NewTransaction) -> LedgerResult<Transaction> {
        let transaction = request.seal()?;
        let discipline = self.discipline_for(&transaction).await?;
        self.commit(transaction, discipline).await
    }

    /// Records the first owner of a parcel. Fails if the parcel already has history,
    /// independently of `single_genesis`.
    pub async fn register(&self, parcel_id: ParcelId, owner_id: UserId) -> LedgerResult<Transaction> {
        let transaction = NewTransaction::new(INITIAL_REGISTRATION)
            .parcel(parcel_id)
            .new_owner(owner_id)
            .seal()?;
        self.commit(transaction, WriteDiscipline::FirstEntry).await
    }

    /// Moves a parcel from its current owner to `new_owner_id`, chaining onto the latest
    /// transaction of the parcel.
    pub async fn transfer(
        &self,
        parcel_id: ParcelId,
        transaction_type: &str,
        new_owner_id: UserId,
        price: Option<f64>,
    ) -> LedgerResult<Transaction> {
        let latest = self
            .latest(parcel_id)
            .await?
            .ok_or(LedgerError::NotFound(parcel_id))?;

        let mut request = NewTransaction::new(transaction_type)
            .parcel(parcel_id)
            .previous_owner(latest.new_owner_id())
            .new_owner(new_owner_id)
            .previous_hash(latest.hash());
        if let Some(price) = price {
            request = request.price(price);
        }

        let transaction = request.seal()?;
        let discipline = if self.parameters.reject_forks {
            WriteDiscipline::ChainOnto(latest.hash().to_string())
        } else {
            WriteDiscipline::Unconditional
        };
        self.commit(transaction, discipline).await
    }

    /// The full history of a parcel, newest first. Empty for an unknown parcel.
    pub async fn history(&self, parcel_id: ParcelId) -> LedgerResult<Vec<Transaction>> {
        Ok(self.store.find_by_parcel(parcel_id).await?)
    }

    /// The head of [`Ledger::history`].
    pub async fn latest(&self, parcel_id: ParcelId) -> LedgerResult<Option<Transaction>> {
        Ok(self.store.head(parcel_id).await?)
    }

    /// Checks one link: a genesis is always valid, any other transaction needs its
    /// predecessor to be a stored transaction of the same parcel.
    pub async fn verify_link(&self, transaction: &Transaction) -> LedgerResult<bool> {
        if transaction.is_genesis() {
            return Ok(true);
        }
        Ok(self.predecessor(transaction).await?.is_some())
    }

    /// Follows previous hashes from `transaction` back to a genesis.
    pub async fn verify_chain(&self, transaction: &Transaction) -> LedgerResult<ChainStatus> {
        let mut visited = HashSet::new();
        let mut current = transaction.clone();
        let mut length = 1;

        loop {
            if !visited.insert(current.hash().to_string()) {
                warn!("Chain of parcel {} loops at {:?}", current.parcel_id(), current);
                return Ok(ChainStatus::Cyclic { at: current.hash().to_string() });
            }
            let missing = match current.previous_hash() {
                None => return Ok(ChainStatus::Intact { length }),
                Some(hash) => hash.to_string(),
            };
            match self.predecessor(&current).await? {
                Some(parent) => {
                    current = parent;
                    length += 1;
                }
                None => {
                    debug!("Chain of parcel {} breaks at {:?}", current.parcel_id(), current);
                    return Ok(ChainStatus::Broken { at: current.hash().to_string(), missing });
                }
            }
        }
    }

    /// Inspects the whole history of a parcel for extra roots, forks, broken links and
    /// hashes that do not match their content.
    pub async fn audit(&self, parcel_id: ParcelId) -> LedgerResult<AuditReport> {
        let history = self.history(parcel_id).await?;
        let report = AuditReport::from_history(parcel_id, &history);
        if !report.is_clean() {
            warn!("Audit of parcel {} found problems:\n{}", parcel_id, report);
        }
        Ok(report)
    }

    async fn predecessor(&self, transaction: &Transaction) -> LedgerResult<Option<Transaction>> {
        match transaction.previous_hash() {
            None => Ok(None),
            Some(hash) => Ok(self
                .store
                .find_by_hash(hash)
                .await?
                .filter(|parent| parent.parcel_id() == transaction.parcel_id())),
        }
    }

    async fn discipline_for(&self, transaction: &Transaction) -> LedgerResult<WriteDiscipline> {
        let discipline = match transaction.previous_hash() {
            None if self.parameters.single_genesis => WriteDiscipline::FirstEntry,
            None => WriteDiscipline::Unconditional,
            Some(parent) if self.parameters.reject_forks => {
                // Records are never removed, so a parent found now is still there at commit time.
                match self.predecessor(transaction).await? {
                    Some(_) => WriteDiscipline::ChainOnto(parent.to_string()),
                    None => WriteDiscipline::Unconditional,
                }
            }
            Some(_) => WriteDiscipline::Unconditional,
        };
        Ok(discipline)
    }

    async fn commit(&self, transaction: Transaction, discipline: WriteDiscipline) -> LedgerResult<Transaction> {
        let parcel_id = transaction.parcel_id();
        debug!("Committing {:?} as {:?}", transaction, discipline);

        let result = match &discipline {
            WriteDiscipline::Unconditional => self.store.insert(transaction).await,
            WriteDiscipline::ChainOnto(parent) => {
                self.store.insert_if_head(transaction, Some(parent.clone())).await
            }
            WriteDiscipline::FirstEntry => self.store.insert_if_head(transaction, None).await,
        };

        match result {
            Ok(stored) => {
                info!("Recorded {}", stored);
                Ok(stored)
            }
            Err(StoreError::HeadMismatch { actual, .. }) => match discipline {
                WriteDiscipline::ChainOnto(expected) => Err(LedgerError::ConcurrentModification {
                    parcel_id,
                    expected,
                    actual,
                }),
                _ => Err(LedgerError::GenesisExists(parcel_id)),
            },
            Err(StoreError::Backdated { head, .. }) => Err(LedgerError::Backdated { parcel_id, head }),
            Err(e) => Err(e.into()),
        }
    }
}
