use log::info;
use ledger::{Ledger, LedgerError, LedgerResult};
use model::{ParcelId, UserId};
use storage::TransactionStore;

pub const ADMIN_ID: UserId = 1;
pub const SAMPLE_OWNER_ID: UserId = 2;

pub struct SampleParcel {
    pub parcel_id: ParcelId,
    pub reference: &'static str,
    pub location: &'static str,
    pub land_use: &'static str,
    pub owner_id: UserId,
}

pub struct SampleParcels {
    pub parcels: Vec<SampleParcel>,
}

impl SampleParcels {
    pub fn new() -> Self {
        let parcels = vec![
            SampleParcel {
                parcel_id: 1,
                reference: "BJ-COT-001-2024",
                location: "Cotonou, Littoral",
                land_use: "Résidentiel",
                owner_id: SAMPLE_OWNER_ID,
            },
            SampleParcel {
                parcel_id: 2,
                reference: "BJ-COT-002-2024",
                location: "Cotonou, Littoral",
                land_use: "Commercial",
                owner_id: SAMPLE_OWNER_ID,
            },
            SampleParcel {
                parcel_id: 3,
                reference: "BJ-PNO-001-2024",
                location: "Porto-Novo, Ouémé",
                land_use: "Agricole",
                owner_id: ADMIN_ID,
            },
        ];

        SampleParcels { parcels }
    }
}

/// Registers every sample parcel that has no history yet. Returns how many were registered.
pub async fn seed<S: TransactionStore>(ledger: &Ledger<S>, samples: &SampleParcels) -> LedgerResult<usize> {
    let mut registered = 0;
    for parcel in &samples.parcels {
        match ledger.register(parcel.parcel_id, parcel.owner_id).await {
            Ok(_) => {
                info!(
                    "Registered {} ({}, {}) to owner {}",
                    parcel.reference, parcel.location, parcel.land_use, parcel.owner_id
                );
                registered += 1;
            }
            Err(LedgerError::GenesisExists(_)) => {
                info!("Parcel {} already registered, skipping", parcel.reference);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(registered)
}
