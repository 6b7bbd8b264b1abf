use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::models::adjustment::{AdjustmentError, PrecompAllocation, ProductStock, TransactionMovement};

/// Immutable copy of one upstream load for a business date
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSnapshot {
    pub business_date: NaiveDate,
    pub loaded_at: DateTime<Utc>,
    pub products: Vec<ProductStock>,
    pub movements: Vec<TransactionMovement>,
    pub precomp_allocations: Vec<PrecompAllocation>,
}

impl LedgerSnapshot {
    pub fn product(&self, product_code: &str) -> Option<&ProductStock> {
        self.products.iter().find(|p| p.product_code == product_code)
    }

    /// Movements of one product on the snapshot's business date
    pub fn todays_movements(&self, product_code: &str) -> Vec<TransactionMovement> {
        self.movements
            .iter()
            .filter(|m| m.product_code == product_code && m.date == self.business_date)
            .cloned()
            .collect()
    }

    pub fn allocation(&self, allocation_id: &str) -> Option<&PrecompAllocation> {
        self.precomp_allocations.iter().find(|a| a.id == allocation_id)
    }
}

/// Last successful load. Replaced wholesale, never merged.
#[derive(Clone, Default)]
pub struct SnapshotStore {
    current: Arc<RwLock<Option<Arc<LedgerSnapshot>>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn replace(&self, snapshot: LedgerSnapshot) -> Arc<LedgerSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.current.write().await = Some(snapshot.clone());
        info!(
            business_date = %snapshot.business_date,
            products = snapshot.products.len(),
            "📦 Ledger snapshot replaced"
        );
        snapshot
    }

    /// Drop whatever was loaded; the screen shows no data until the next load
    pub async fn clear(&self) {
        *self.current.write().await = None;
    }

    pub async fn current(&self) -> Result<Arc<LedgerSnapshot>, AdjustmentError> {
        self.current
            .read()
            .await
            .clone()
            .ok_or(AdjustmentError::NoDataLoaded)
    }

    pub async fn is_loaded(&self) -> bool {
        self.current.read().await.is_some()
    }
}
