use crate::client::BusApi;
use crate::protocol::BusId;
use anyhow::{Context, Result};
use tracing::{info, warn};

/// The single bus used for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bus {
    pub id: BusId,
    /// Created by this process and removed again on release
    pub owned: bool,
}

impl Bus {
    /// Pick the lowest-numbered existing bus, or create one if there is none
    pub async fn resolve<B: BusApi>(api: &B) -> Result<Self> {
        let buses = api.list_buses().await.context("Failed to list buses")?;

        match buses.iter().min() {
            Some(&id) => {
                info!("Using existing bus {} ({} available)", id, buses.len());
                Ok(Self { id, owned: false })
            }
            None => {
                let id = api.create_bus(1).await.context("Failed to create bus")?;
                info!("Created bus {}", id);
                Ok(Self { id, owned: true })
            }
        }
    }

    /// Remove the bus if this process created it
    pub async fn release<B: BusApi>(&self, api: &B) {
        if !self.owned {
            return;
        }
        match api.remove_bus(self.id).await {
            Ok(()) => info!("Removed bus {}", self.id),
            Err(e) => warn!("Failed to remove bus {}: {:#}", self.id, e),
        }
    }
}
