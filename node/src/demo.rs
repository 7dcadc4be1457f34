use anyhow::{Context, Result};
use log::info;
use ledger::{Ledger, LedgerError};
use model::config::Parameters;
use model::transaction::{NewTransaction, PURCHASE, SALE};
use storage::Storage;
use crate::seed::{ADMIN_ID, SAMPLE_OWNER_ID};

#[derive(Debug, Default, PartialEq)]
pub struct DemoOutcome {
    pub genesis_linked: bool,
    pub sale_linked: bool,
    pub history_len: usize,
    pub dangling_linked: bool,
    pub race_winners: usize,
    pub race_conflicts: usize,
}

/// Walks through registration, sale, a dangling link and two racing appends
/// against a fresh in-memory ledger.
pub async fn run(parameters: Parameters) -> Result<DemoOutcome> {
    let ledger = Ledger::new(Storage::in_memory(parameters.channel_capacity), parameters);
    let mut outcome = DemoOutcome::default();

    info!("Registration of parcel 1");
    let genesis = ledger.register(1, SAMPLE_OWNER_ID).await.context("Registration failed")?;
    outcome.genesis_linked = ledger.verify_link(&genesis).await?;
    info!("{} links: {}", genesis, outcome.genesis_linked);

    info!("Sale of parcel 1");
    let sale = ledger
        .transfer(1, SALE, 7, Some(25_000_000.0))
        .await
        .context("Sale failed")?;
    outcome.sale_linked = ledger.verify_link(&sale).await?;
    let history = ledger.history(1).await?;
    outcome.history_len = history.len();
    for tx in &history {
        info!("  {}", tx);
    }

    info!("Transaction of parcel 2 pointing to an unknown hash");
    let dangling = ledger
        .append(
            NewTransaction::new(SALE)
                .parcel(2)
                .new_owner(8)
                .previous_hash("0".repeat(64)),
        )
        .await
        .context("Dangling append failed")?;
    outcome.dangling_linked = ledger.verify_link(&dangling).await?;
    info!("{} links: {}", dangling, outcome.dangling_linked);

    info!("Two buyers racing on parcel 3");
    let root = ledger.register(3, ADMIN_ID).await.context("Registration failed")?;
    let offer = |buyer| {
        NewTransaction::new(PURCHASE)
            .parcel(3)
            .previous_owner(ADMIN_ID)
            .new_owner(buyer)
            .previous_hash(root.hash())
    };
    let (first, second) = futures::join!(ledger.append(offer(9)), ledger.append(offer(10)));
    for result in [first, second] {
        match result {
            Ok(tx) => {
                info!("  won: {}", tx);
                outcome.race_winners += 1;
            }
            Err(e @ LedgerError::ConcurrentModification { .. }) => {
                info!("  lost: {}", e);
                outcome.race_conflicts += 1;
            }
            Err(e) => return Err(e).context("Racing append failed"),
        }
    }

    for parcel_id in 1..=3 {
        let report = ledger.audit(parcel_id).await?;
        if report.is_clean() {
            info!("{}", report);
        }
    }

    Ok(outcome)
}
