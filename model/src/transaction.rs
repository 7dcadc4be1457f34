use std::fmt;
use chrono::{SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use crate::{Error, ParcelId, Result, Timestamp, TransactionId, UserId};

/// Hex encoded SHA-256 digest of a transaction's content.
pub type TransactionHash = String;

pub const INITIAL_REGISTRATION: &str = "Enregistrement Initial";
pub const SALE: &str = "Vente";
pub const PURCHASE: &str = "Achat";
pub const INHERITANCE: &str = "Héritage";
pub const DONATION: &str = "Donation";

/// Number of hex characters shown when a hash is printed in short form.
const SHORT_HASH_LEN: usize = 8;

/// One ownership event of a parcel. Once sealed the content and its hash never change,
/// the only field filled in later is the `id` handed out by the store.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    id: Option<TransactionId>,
    parcel_id: ParcelId,
    transaction_type: String,
    previous_owner_id: Option<UserId>,
    new_owner_id: UserId,
    price: Option<f64>,
    created_at: Timestamp,
    transaction_hash: TransactionHash,
    previous_hash: Option<TransactionHash>,
    /// Opaque payload, usually JSON text. Not covered by the hash.
    block_data: Option<String>,
}

impl Transaction {
    /// Attaches the store sequence number.
    pub fn with_id(self, id: TransactionId) -> Self {
        Self {
            id: Some(id),
            ..self
        }
    }

    pub fn id(&self) -> Option<TransactionId> {
        self.id
    }

    pub fn parcel_id(&self) -> ParcelId {
        self.parcel_id
    }

    pub fn transaction_type(&self) -> &str {
        &self.transaction_type
    }

    pub fn previous_owner_id(&self) -> Option<UserId> {
        self.previous_owner_id
    }

    pub fn new_owner_id(&self) -> UserId {
        self.new_owner_id
    }

    pub fn price(&self) -> Option<f64> {
        self.price
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn hash(&self) -> &str {
        &self.transaction_hash
    }

    pub fn previous_hash(&self) -> Option<&str> {
        self.previous_hash.as_deref()
    }

    pub fn block_data(&self) -> Option<&str> {
        self.block_data.as_deref()
    }

    /// The first transaction of a parcel has no predecessor.
    pub fn is_genesis(&self) -> bool {
        self.previous_hash.is_none()
    }

    pub fn short_hash(&self) -> &str {
        let end = self.transaction_hash.len().min(SHORT_HASH_LEN);
        &self.transaction_hash[..end]
    }

    /// Derives the hash again from the stored fields.
    pub fn recompute_hash(&self) -> TransactionHash {
        compute_hash(
            self.parcel_id,
            &self.transaction_type,
            self.new_owner_id,
            &self.created_at,
            self.previous_hash(),
        )
    }

    pub fn has_valid_hash(&self) -> bool {
        self.recompute_hash() == self.transaction_hash
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Transaction {}... ({}, parcel {}, owner {})",
            self.short_hash(),
            self.transaction_type,
            self.parcel_id,
            self.new_owner_id
        )
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Transaction {}... [parcel: {}, prev: {}]",
            self.short_hash(),
            self.parcel_id,
            self.previous_hash().map_or("genesis", |h| &h[..h.len().min(SHORT_HASH_LEN)])
        )
    }
}

/// Builder for a transaction that is not sealed yet.
#[derive(Clone, Debug, Default)]
pub struct NewTransaction {
    parcel_id: Option<ParcelId>,
    transaction_type: String,
    previous_owner_id: Option<UserId>,
    new_owner_id: Option<UserId>,
    price: Option<f64>,
    created_at: Option<Timestamp>,
    previous_hash: Option<TransactionHash>,
    block_data: Option<String>,
}

impl NewTransaction {
    pub fn new(transaction_type: impl Into<String>) -> Self {
        Self {
            transaction_type: transaction_type.into(),
            ..Self::default()
        }
    }

    pub fn parcel(mut self, parcel_id: ParcelId) -> Self {
        self.parcel_id = Some(parcel_id);
        self
    }

    pub fn new_owner(mut self, owner_id: UserId) -> Self {
        self.new_owner_id = Some(owner_id);
        self
    }

    pub fn previous_owner(mut self, owner_id: UserId) -> Self {
        self.previous_owner_id = Some(owner_id);
        self
    }

    pub fn price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn previous_hash(mut self, hash: impl Into<TransactionHash>) -> Self {
        self.previous_hash = Some(hash.into());
        self
    }

    pub fn block_data(mut self, data: impl Into<String>) -> Self {
        self.block_data = Some(data.into());
        self
    }

    /// Checks the required fields, stamps the creation time and computes the hash.
    pub fn seal(self) -> Result<Transaction> {
        let parcel_id = self
            .parcel_id
            .ok_or_else(|| Error::ValidationError("parcel_id is required".to_string()))?;
        let new_owner_id = self
            .new_owner_id
            .ok_or_else(|| Error::ValidationError("new_owner_id is required".to_string()))?;
        if self.transaction_type.trim().is_empty() {
            return Err(Error::ValidationError("transaction_type must not be empty".to_string()));
        }

        // The hash encodes microseconds, anything finer would not survive a recomputation.
        let created_at = self.created_at.unwrap_or_else(Utc::now).trunc_subsecs(6);
        let transaction_hash = compute_hash(
            parcel_id,
            &self.transaction_type,
            new_owner_id,
            &created_at,
            self.previous_hash.as_deref(),
        );

        Ok(Transaction {
            id: None,
            parcel_id,
            transaction_type: self.transaction_type,
            previous_owner_id: self.previous_owner_id,
            new_owner_id,
            price: self.price,
            created_at,
            transaction_hash,
            previous_hash: self.previous_hash,
            block_data: self.block_data,
        })
    }
}

/// SHA-256 over `parcel_id`, `transaction_type`, `new_owner_id`, `created_at` and `previous_hash`,
/// in that order. Each field is written as `<byte length>:<text>,` so that adjacent fields
/// can not bleed into each other.
pub fn compute_hash(
    parcel_id: ParcelId,
    transaction_type: &str,
    new_owner_id: UserId,
    created_at: &Timestamp,
    previous_hash: Option<&str>,
) -> TransactionHash {
    let fields = [
        parcel_id.to_string(),
        transaction_type.to_string(),
        new_owner_id.to_string(),
        encode_timestamp(created_at),
        previous_hash.unwrap_or_default().to_string(),
    ];

    let mut hasher = Sha256::new();
    for field in fields.iter() {
        hasher.update(format!("{}:{},", field.len(), field).as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// RFC 3339 in UTC with exactly six fractional digits, e.g. `2024-03-01T10:00:00.000000Z`.
pub fn encode_timestamp(timestamp: &Timestamp) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}
