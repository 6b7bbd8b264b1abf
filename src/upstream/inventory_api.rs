use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

use crate::constants::UPSTREAM_HEALTH_TIMEOUT_SECS;
use crate::models::adjustment::{
    AdjustmentError, AdjustmentSaveRequest, PrecompAllocation, ProductStock, TransactionMovement,
};
use crate::snapshot::LedgerSnapshot;
use crate::upstream::UpstreamClient;

/// Reads and writes against the pharmacy API's inventory endpoints
#[derive(Clone, Debug)]
pub struct InventoryApi {
    client: UpstreamClient,
}

impl InventoryApi {
    pub fn new(client: UpstreamClient) -> Self {
        Self { client }
    }

    pub fn base_url(&self) -> &str {
        self.client.base_url()
    }

    /// Product rows with their expected stock for the date
    pub async fn fetch_products(&self, date: NaiveDate) -> Result<Vec<ProductStock>, AdjustmentError> {
        self.fetch_list("/api/inventory/products", date, "products").await
    }

    /// Posted ledger movements for the date
    pub async fn fetch_movements(&self, date: NaiveDate) -> Result<Vec<TransactionMovement>, AdjustmentError> {
        self.fetch_list("/api/transactions", date, "movements").await
    }

    /// Precomp allocations still held against stock on the date
    pub async fn fetch_active_precomps(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<PrecompAllocation>, AdjustmentError> {
        self.fetch_list("/api/precomp/active", date, "allocations").await
    }

    /// Everything the adjustment screens need for one business date
    #[instrument(skip(self))]
    pub async fn load_snapshot(&self, business_date: NaiveDate) -> Result<LedgerSnapshot, AdjustmentError> {
        let products = self.fetch_products(business_date).await?;
        let movements = self.fetch_movements(business_date).await?;
        let precomp_allocations = self.fetch_active_precomps(business_date).await?;

        info!(
            products = products.len(),
            movements = movements.len(),
            precomps = precomp_allocations.len(),
            "✅ Inventory data fetched from pharmacy API"
        );

        Ok(LedgerSnapshot {
            business_date,
            loaded_at: Utc::now(),
            products,
            movements,
            precomp_allocations,
        })
    }

    /// Forward the final lot quantities for persistence
    #[instrument(skip(self, request), fields(request_id = %request.request_id))]
    pub async fn submit_adjustment(&self, request: &AdjustmentSaveRequest) -> Result<Value, AdjustmentError> {
        let builder = self
            .client
            .request(Method::POST, "/api/inventory/adjustments")
            .json(request);
        self.client.send_json(builder).await
    }

    /// Round-trip latency of the upstream health endpoint in milliseconds
    pub async fn ping(&self) -> Result<u64, AdjustmentError> {
        let start = Instant::now();
        let builder = self
            .client
            .request(Method::GET, "/api/health")
            .timeout(Duration::from_secs(UPSTREAM_HEALTH_TIMEOUT_SECS));
        self.client.send_json(builder).await?;
        Ok(elapsed_millis(start.elapsed()))
    }

    async fn fetch_list<T: DeserializeOwned>(
        &self,
        path: &str,
        date: NaiveDate,
        key: &str,
    ) -> Result<Vec<T>, AdjustmentError> {
        debug!("🔍 GET {} for {}", path, date);
        let builder = self
            .client
            .request(Method::GET, path)
            .query(&[("date", date.to_string())]);
        let body = self.client.send_json(builder).await?;
        decode_list(body, key)
    }
}

fn elapsed_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Accept a bare array, `{ "<key>": [...] }` or `{ "data": [...] }`
fn decode_list<T: DeserializeOwned>(body: Value, key: &str) -> Result<Vec<T>, AdjustmentError> {
    let list = match body {
        Value::Array(_) => body,
        Value::Object(mut map) => map
            .remove(key)
            .or_else(|| map.remove("data"))
            .ok_or_else(|| AdjustmentError::Upstream(format!("Pharmacy API response has no '{key}' list")))?,
        Value::Null => Value::Array(Vec::new()),
        other => {
            return Err(AdjustmentError::Upstream(format!(
                "Unexpected '{key}' payload from pharmacy API: {other}"
            )))
        }
    };

    serde_json::from_value(list)
        .map_err(|e| AdjustmentError::Upstream(format!("Invalid '{key}' payload from pharmacy API: {e}")))
}
