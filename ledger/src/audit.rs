use std::collections::{HashMap, HashSet};
use std::fmt;
use model::transaction::{Transaction, TransactionHash};
use model::ParcelId;

/// Outcome of walking a chain from one transaction back to its genesis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainStatus {
    /// Every link resolved. `length` counts the transactions walked, genesis included.
    Intact { length: usize },
    /// `at` points to `missing`, which is not a transaction of the same parcel.
    Broken { at: TransactionHash, missing: TransactionHash },
    /// The walk came back to `at`.
    Cyclic { at: TransactionHash },
}

impl ChainStatus {
    pub fn is_intact(&self) -> bool {
        matches!(self, ChainStatus::Intact { .. })
    }
}

/// Integrity summary over the whole history of a parcel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditReport {
    pub parcel_id: ParcelId,
    pub transactions: usize,
    /// Transactions without a previous hash.
    pub roots: Vec<TransactionHash>,
    /// Transactions that more than one transaction chains onto.
    pub forks: Vec<TransactionHash>,
    /// Transactions whose previous hash is not a transaction of this parcel.
    pub broken_links: Vec<TransactionHash>,
    /// Transactions whose stored hash differs from the one derived from their fields.
    pub tampered: Vec<TransactionHash>,
}

impl AuditReport {
    /// Builds the report from a parcel history. The history order is kept in every list.
    pub fn from_history(parcel_id: ParcelId, history: &[Transaction]) -> Self {
        let known: HashSet<&str> = history.iter().map(|tx| tx.hash()).collect();
        let mut children: HashMap<&str, usize> = HashMap::new();
        let mut roots = Vec::new();
        let mut broken_links = Vec::new();
        let mut tampered = Vec::new();

        for tx in history {
            match tx.previous_hash() {
                None => roots.push(tx.hash().to_string()),
                Some(parent) if known.contains(parent) => {
                    *children.entry(parent).or_insert(0) += 1;
                }
                Some(_) => broken_links.push(tx.hash().to_string()),
            }
            if !tx.has_valid_hash() {
                tampered.push(tx.hash().to_string());
            }
        }

        let forks = history
            .iter()
            .filter(|tx| children.get(tx.hash()).map_or(false, |count| *count > 1))
            .map(|tx| tx.hash().to_string())
            .collect();

        Self {
            parcel_id,
            transactions: history.len(),
            roots,
            forks,
            broken_links,
            tampered,
        }
    }

    /// A single root (or no history at all), no forks, no broken links and no tampering.
    pub fn is_clean(&self) -> bool {
        let roots_ok = if self.transactions == 0 {
            self.roots.is_empty()
        } else {
            self.roots.len() == 1
        };
        roots_ok && self.forks.is_empty() && self.broken_links.is_empty() && self.tampered.is_empty()
    }
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "Parcel {}: {} transaction(s), {}",
            self.parcel_id,
            self.transactions,
            if self.is_clean() { "clean" } else { "NOT clean" }
        )?;
        write_hashes(f, "roots", &self.roots)?;
        write_hashes(f, "forks", &self.forks)?;
        write_hashes(f, "broken links", &self.broken_links)?;
        write_hashes(f, "tampered", &self.tampered)
    }
}

fn write_hashes(f: &mut fmt::Formatter, label: &str, hashes: &[TransactionHash]) -> fmt::Result {
    if hashes.is_empty() {
        return Ok(());
    }
    writeln!(f, "  {} ({}):", label, hashes.len())?;
    for hash in hashes {
        writeln!(f, "    {}", hash)?;
    }
    Ok(())
}
