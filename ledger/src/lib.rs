pub mod audit;
pub mod error;
mod ledger;

pub use crate::audit::{AuditReport, ChainStatus};
pub use crate::error::{LedgerError, LedgerResult};
pub use crate::ledger::Ledger;
