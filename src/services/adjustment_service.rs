use chrono::{NaiveDate, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::adjustment::{
    AdjustmentError, AdjustmentSaveRequest, CalculateRequest, CalculateResponse, CalculationEntry,
    CalculationStatus, ConversionIssue, LoadResult, LotSummary, LotSummaryRequest, PrecompAllocation,
    ProductAdjustment, ProductCalculation, SaveRequest, SaveResult, ScanData, ScanResponse,
    UpstreamHealthResponse,
};
use crate::models::inventory::AdjustmentAlert;
use crate::services::back_calculation::back_calculate;
use crate::services::barcode;
use crate::services::lot_distribution::{seed_lot, LotDistribution};
use crate::snapshot::{LedgerSnapshot, SnapshotStore};
use crate::upstream::InventoryApi;
use crate::utils::{business_date_today, tokyo_now_rfc3339};

/// Inventory adjustment workflow over the last loaded snapshot
#[derive(Clone)]
pub struct AdjustmentService {
    api: InventoryApi,
    snapshots: SnapshotStore,
}

impl AdjustmentService {
    pub fn new(api: InventoryApi, snapshots: SnapshotStore) -> Self {
        Self { api, snapshots }
    }

    /// Fetch fresh data and replace the snapshot. A failed fetch leaves no data loaded.
    pub async fn load(&self, date: Option<NaiveDate>) -> Result<LoadResult, AdjustmentError> {
        let business_date = date.unwrap_or_else(business_date_today);
        info!("🔄 Loading inventory data for {}", business_date);

        match self.api.load_snapshot(business_date).await {
            Ok(snapshot) => {
                let snapshot = self.snapshots.replace(snapshot).await;
                Ok(LoadResult {
                    business_date: snapshot.business_date,
                    loaded_at: snapshot.loaded_at,
                    product_count: snapshot.products.len(),
                    movement_count: snapshot.movements.len(),
                    precomp_count: snapshot.precomp_allocations.len(),
                })
            }
            Err(e) => {
                warn!("❌ Failed to load inventory data for {}: {}", business_date, e);
                self.snapshots.clear().await;
                Err(e)
            }
        }
    }

    pub async fn snapshot(&self) -> Result<Arc<LedgerSnapshot>, AdjustmentError> {
        self.snapshots.current().await
    }

    /// Recompute every requested product from scratch
    pub async fn calculate(&self, request: CalculateRequest) -> Result<CalculateResponse, AdjustmentError> {
        let snapshot = self.snapshots.current().await?;
        Ok(calculate_all(&snapshot, &request.entries))
    }

    /// Lot totals against a fresh calculation of the same product
    pub async fn summarize_lots(&self, request: LotSummaryRequest) -> Result<LotSummary, AdjustmentError> {
        let snapshot = self.snapshots.current().await?;
        summarize_lots(&snapshot, request)
    }

    /// Decode a pack barcode into lot/expiry fields. Bad scans are not errors.
    pub async fn scan(&self, raw: &str) -> ScanResponse {
        match barcode::parse(raw) {
            Ok(parsed) => {
                let product_code = parsed.product_code();
                let product_name = match (&product_code, self.snapshots.current().await) {
                    (Some(code), Ok(snapshot)) => snapshot.product(code).map(|p| p.product_name.clone()),
                    _ => None,
                };
                debug!("📷 Scanned GTIN {} lot {:?}", parsed.gtin, parsed.lot_number);

                let message = match &product_name {
                    Some(name) => format!("Scanned {name}"),
                    None => "Barcode scanned".to_string(),
                };

                ScanResponse {
                    valid: true,
                    data: Some(ScanData {
                        gtin: parsed.gtin,
                        product_code,
                        product_name,
                        lot_number: parsed.lot_number,
                        expiry_date: parsed.expiry_date,
                        serial: parsed.serial,
                    }),
                    message,
                }
            }
            Err(e) => {
                debug!("📷 Rejected barcode: {}", e);
                ScanResponse {
                    valid: false,
                    data: None,
                    message: e.to_string(),
                }
            }
        }
    }

    /// Build the save request and forward it to the pharmacy API
    pub async fn save(&self, request: SaveRequest) -> Result<SaveResult, AdjustmentError> {
        let snapshot = self.snapshots.current().await?;
        let (save_request, alerts) = build_save_request(&snapshot, request)?;

        info!(
            request_id = %save_request.request_id,
            products = save_request.products.len(),
            "💾 Submitting inventory adjustment"
        );
        let upstream = self.api.submit_adjustment(&save_request).await?;

        Ok(SaveResult {
            request_id: save_request.request_id,
            business_date: save_request.business_date,
            products_submitted: save_request.products.len(),
            alerts,
            upstream,
        })
    }

    pub async fn upstream_health(&self) -> UpstreamHealthResponse {
        let snapshot_loaded = self.snapshots.is_loaded().await;
        let (success, latency_ms, error) = match self.api.ping().await {
            Ok(latency) => (true, Some(latency), None),
            Err(e) => (false, None, Some(e.to_string())),
        };

        UpstreamHealthResponse {
            success,
            upstream_url: self.api.base_url().to_string(),
            snapshot_loaded,
            latency_ms,
            error,
            timestamp: tokyo_now_rfc3339(),
        }
    }
}

/// Calculate the listed products, or every product with defaults when none are listed
pub fn calculate_all(snapshot: &LedgerSnapshot, entries: &[CalculationEntry]) -> CalculateResponse {
    let products: Vec<ProductCalculation> = if entries.is_empty() {
        snapshot
            .products
            .iter()
            .map(|product| calculate_product(snapshot, &default_entry(snapshot, &product.product_code)))
            .collect()
    } else {
        entries
            .iter()
            .map(|entry| calculate_product(snapshot, entry))
            .collect()
    };

    let invalid_count = products
        .iter()
        .filter(|p| p.status == CalculationStatus::Invalid)
        .count();

    CalculateResponse {
        business_date: snapshot.business_date,
        products,
        invalid_count,
    }
}

/// Ledger stock as the count, with every allocation held against the product
fn default_entry(snapshot: &LedgerSnapshot, product_code: &str) -> CalculationEntry {
    CalculationEntry {
        product_code: product_code.to_string(),
        physical_stock: None,
        active_allocation_ids: snapshot
            .precomp_allocations
            .iter()
            .filter(|allocation| allocation.product_code == product_code)
            .map(|allocation| allocation.id.clone())
            .collect(),
    }
}

/// Back-calculate one product against the snapshot. Problems, including an
/// unknown product code, come back as an invalid calculation.
pub fn calculate_product(snapshot: &LedgerSnapshot, entry: &CalculationEntry) -> ProductCalculation {
    let Some(product) = snapshot.product(&entry.product_code) else {
        warn!(product_code = %entry.product_code, "⚠️ Product not in loaded inventory data");
        return invalid_calculation(
            entry.product_code.clone(),
            String::new(),
            vec![ConversionIssue::UnknownProduct {
                product_code: entry.product_code.clone(),
            }],
        );
    };

    let physical_stock = entry
        .physical_stock
        .as_ref()
        .map_or(product.current_stock, |raw| raw.to_quantity());

    let (active, mut issues) = resolve_active_allocations(snapshot, entry);
    let movements = snapshot.todays_movements(&product.product_code);

    match back_calculate(physical_stock, &active, &movements) {
        Ok(computed) if issues.is_empty() => ProductCalculation {
            product_code: product.product_code.clone(),
            product_name: product.product_name.clone(),
            status: CalculationStatus::Ok,
            previous_day_stock: Some(computed.value),
            display: Some(computed.display()),
            breakdown: Some(computed.input),
            seed_lot: Some(seed_lot(computed.value)),
            issues,
        },
        result => {
            if let Err(invalid) = result {
                issues.extend(invalid.issues);
            }
            warn!(
                product_code = %product.product_code,
                issues = issues.len(),
                "⚠️ Previous-day stock cannot be computed"
            );
            invalid_calculation(product.product_code.clone(), product.product_name.clone(), issues)
        }
    }
}

fn invalid_calculation(
    product_code: String,
    product_name: String,
    issues: Vec<ConversionIssue>,
) -> ProductCalculation {
    ProductCalculation {
        product_code,
        product_name,
        status: CalculationStatus::Invalid,
        previous_day_stock: None,
        display: None,
        breakdown: None,
        seed_lot: None,
        issues,
    }
}

/// Checked allocation ids that exist for this product; anything else is an issue
fn resolve_active_allocations(
    snapshot: &LedgerSnapshot,
    entry: &CalculationEntry,
) -> (Vec<PrecompAllocation>, Vec<ConversionIssue>) {
    let mut seen = HashSet::new();
    let mut active = Vec::new();
    let mut issues = Vec::new();

    for id in &entry.active_allocation_ids {
        if !seen.insert(id.as_str()) {
            continue;
        }
        match snapshot.allocation(id) {
            Some(allocation) if allocation.product_code == entry.product_code => {
                active.push(allocation.clone())
            }
            _ => issues.push(ConversionIssue::UnknownAllocation {
                allocation_id: id.clone(),
            }),
        }
    }

    (active, issues)
}

fn require_product(snapshot: &LedgerSnapshot, product_code: &str) -> Result<(), AdjustmentError> {
    match snapshot.product(product_code) {
        Some(_) => Ok(()),
        None => Err(AdjustmentError::ProductNotFound {
            product_code: product_code.to_string(),
        }),
    }
}

pub fn summarize_lots(
    snapshot: &LedgerSnapshot,
    request: LotSummaryRequest,
) -> Result<LotSummary, AdjustmentError> {
    require_product(snapshot, &request.product_code)?;
    let calculation = calculate_product(snapshot, &request.entry());
    Ok(LotDistribution::for_calculation(&calculation, request.lots).summary())
}

/// Validate the user's lot rows and wrap them for the pharmacy API. Every
/// product is recalculated here; client-side totals are never forwarded.
pub fn build_save_request(
    snapshot: &LedgerSnapshot,
    request: SaveRequest,
) -> Result<(AdjustmentSaveRequest, Vec<AdjustmentAlert>), AdjustmentError> {
    if request.products.is_empty() {
        return Err(AdjustmentError::ValidationError(
            "At least one product is required".to_string(),
        ));
    }

    let mut alerts = Vec::new();
    let mut products = Vec::with_capacity(request.products.len());
    for submission in request.products {
        require_product(snapshot, &submission.product_code)?;
        if let Some(lot) = submission.lots.iter().find(|lot| lot.quantity < 0.0) {
            return Err(AdjustmentError::ValidationError(format!(
                "Lot quantity cannot be negative ({} for {})",
                lot.quantity, submission.product_code
            )));
        }

        let calculation = calculate_product(snapshot, &submission.entry());
        let distribution = LotDistribution::for_calculation(&calculation, submission.lots);
        for alert in distribution.alerts() {
            debug!("📝 {}", alert.message);
            alerts.push(alert);
        }

        products.push(ProductAdjustment {
            product_code: submission.product_code,
            computed_previous_day_stock: distribution.computed_previous_day_stock(),
            lots: distribution.rows().to_vec(),
        });
    }

    let save_request = AdjustmentSaveRequest {
        request_id: Uuid::new_v4(),
        business_date: snapshot.business_date,
        submitted_at: Utc::now(),
        submitted_by: request.submitted_by,
        products,
    };

    Ok((save_request, alerts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::adjustment::{LotRecord, ProductLotSubmission, RawQuantity};
    use crate::models::inventory::{AdjustmentAlertType, AlertSeverity};
    use crate::snapshot::tests::sample_snapshot;

    fn entry(code: &str, physical: Option<RawQuantity>, ids: &[&str]) -> CalculationEntry {
        CalculationEntry {
            product_code: code.to_string(),
            physical_stock: physical,
            active_allocation_ids: ids.iter().map(|id| id.to_string()).collect(),
        }
    }

    fn submission(code: &str, physical: f64, ids: &[&str], lots: Vec<LotRecord>) -> ProductLotSubmission {
        ProductLotSubmission {
            product_code: code.to_string(),
            physical_stock: Some(RawQuantity::Number(physical)),
            active_allocation_ids: ids.iter().map(|id| id.to_string()).collect(),
            lots,
        }
    }

    fn lot(quantity: f64, expiry: (i32, u32, u32), lot_number: &str) -> LotRecord {
        LotRecord {
            quantity,
            expiry_date: NaiveDate::from_ymd_opt(expiry.0, expiry.1, expiry.2),
            lot_number: lot_number.to_string(),
        }
    }

    #[test]
    fn test_calculate_product_with_active_precomp() {
        let snapshot = sample_snapshot();
        let result = calculate_product(
            &snapshot,
            &entry("4987000000001", Some(RawQuantity::Number(10.0)), &["pc-1"]),
        );

        // (10 + 6/3) - (5 - 3); the inventory count and yesterday's receipt are ignored
        assert_eq!(result.status, CalculationStatus::Ok);
        assert_eq!(result.previous_day_stock, Some(10.0));
        assert_eq!(result.display.as_deref(), Some("10.00"));
        assert_eq!(result.seed_lot.unwrap().quantity, 10.0);
    }

    #[test]
    fn test_blank_physical_stock_counts_as_zero() {
        let snapshot = sample_snapshot();
        let result = calculate_product(
            &snapshot,
            &entry("4987000000001", Some(RawQuantity::Text(String::new())), &[]),
        );
        assert_eq!(result.previous_day_stock, Some(-2.0));
    }

    #[test]
    fn test_missing_physical_stock_defaults_to_current_stock() {
        let snapshot = sample_snapshot();
        let result = calculate_product(&snapshot, &entry("4987000000001", None, &[]));
        assert_eq!(result.previous_day_stock, Some(8.0));
    }

    #[test]
    fn test_invalid_product_does_not_affect_others() {
        let snapshot = sample_snapshot();
        let response = calculate_all(
            &snapshot,
            &[
                entry("4987000000002", None, &["pc-2"]),
                entry("4987000000001", Some(RawQuantity::Number(10.0)), &["pc-1"]),
            ],
        );

        assert_eq!(response.invalid_count, 1);
        let invalid = &response.products[0];
        assert_eq!(invalid.status, CalculationStatus::Invalid);
        assert_eq!(invalid.previous_day_stock, None);
        assert_eq!(invalid.display, None);
        // Unset pack on the precomp and on the YJ-only dispense
        assert_eq!(invalid.issues.len(), 2);

        assert_eq!(response.products[1].previous_day_stock, Some(10.0));
    }

    #[test]
    fn test_allocation_of_another_product_is_rejected() {
        let snapshot = sample_snapshot();
        let result = calculate_product(
            &snapshot,
            &entry("4987000000001", Some(RawQuantity::Number(1.0)), &["pc-2", "pc-missing", "pc-2"]),
        );

        assert_eq!(result.status, CalculationStatus::Invalid);
        assert_eq!(result.issues.len(), 2);
        assert!(result
            .issues
            .iter()
            .all(|issue| matches!(issue, ConversionIssue::UnknownAllocation { .. })));
    }

    #[test]
    fn test_empty_entries_include_each_products_allocations() {
        let snapshot = sample_snapshot();
        let response = calculate_all(&snapshot, &[]);
        assert_eq!(response.products.len(), 2);
        assert_eq!(response.business_date, snapshot.business_date);

        // Ledger stock 10 plus pc-1 (6/3), less today's net +2
        assert_eq!(response.products[0].status, CalculationStatus::Ok);
        assert_eq!(response.products[0].previous_day_stock, Some(10.0));

        // pc-2 has no package inner quantity, so it must surface rather than count as zero
        let amlodipine = &response.products[1];
        assert_eq!(amlodipine.status, CalculationStatus::Invalid);
        assert!(amlodipine
            .issues
            .iter()
            .any(|issue| matches!(issue, ConversionIssue::PrecompPackInnerQtyUnset { allocation_id, .. } if allocation_id == "pc-2")));
        assert_eq!(response.invalid_count, 1);
    }

    #[test]
    fn test_unknown_product_is_reported_inline() {
        let snapshot = sample_snapshot();
        let response = calculate_all(
            &snapshot,
            &[
                entry("4987000000001", Some(RawQuantity::Number(10.0)), &["pc-1"]),
                entry("0000000000000", None, &[]),
            ],
        );

        assert_eq!(response.invalid_count, 1);
        assert_eq!(response.products[0].previous_day_stock, Some(10.0));
        let unknown = &response.products[1];
        assert_eq!(unknown.status, CalculationStatus::Invalid);
        assert_eq!(
            unknown.issues,
            vec![ConversionIssue::UnknownProduct {
                product_code: "0000000000000".to_string()
            }]
        );
    }

    #[test]
    fn test_build_save_request_recomputes_and_reports_mismatch() {
        let snapshot = sample_snapshot();
        let request = SaveRequest {
            submitted_by: Some("pharmacist01".to_string()),
            products: vec![submission(
                "4987000000001",
                10.0,
                &["pc-1"],
                vec![lot(6.0, (2027, 1, 31), "A100"), lot(3.0, (2027, 6, 30), "B200")],
            )],
        };

        let (save_request, alerts) = build_save_request(&snapshot, request).unwrap();
        assert_eq!(save_request.business_date, snapshot.business_date);
        assert_eq!(save_request.products[0].computed_previous_day_stock, Some(10.0));
        assert_eq!(save_request.products[0].lots.len(), 2);
        assert_eq!(save_request.products[0].lots[1].quantity, 3.0);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AdjustmentAlertType::LotTotalMismatch);
    }

    #[test]
    fn test_build_save_request_with_invalid_computation() {
        let snapshot = sample_snapshot();
        let request = SaveRequest {
            submitted_by: None,
            products: vec![submission(
                "4987000000002",
                20.0,
                &["pc-2"],
                vec![lot(20.0, (2027, 2, 28), "C300")],
            )],
        };

        let (save_request, alerts) = build_save_request(&snapshot, request).unwrap();
        let product = &save_request.products[0];
        assert_eq!(product.computed_previous_day_stock, None);
        assert_eq!(product.lots[0].quantity, 20.0);

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AdjustmentAlertType::InvalidComputation);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);

        let body = serde_json::to_value(&save_request).unwrap();
        assert!(body["products"][0].get("computed_previous_day_stock").is_none());
    }

    #[test]
    fn test_build_save_request_seeds_lot_when_none_entered() {
        let snapshot = sample_snapshot();
        let request = SaveRequest {
            submitted_by: None,
            products: vec![submission("4987000000001", 10.0, &["pc-1"], Vec::new())],
        };

        let (save_request, _) = build_save_request(&snapshot, request).unwrap();
        assert_eq!(save_request.products[0].lots.len(), 1);
        assert_eq!(save_request.products[0].lots[0].quantity, 10.0);
    }

    #[test]
    fn test_build_save_request_validation() {
        let snapshot = sample_snapshot();

        let empty = SaveRequest {
            submitted_by: None,
            products: Vec::new(),
        };
        assert!(matches!(
            build_save_request(&snapshot, empty),
            Err(AdjustmentError::ValidationError(_))
        ));

        let negative = SaveRequest {
            submitted_by: None,
            products: vec![submission(
                "4987000000001",
                1.0,
                &[],
                vec![LotRecord {
                    quantity: -1.0,
                    ..LotRecord::default()
                }],
            )],
        };
        assert!(matches!(
            build_save_request(&snapshot, negative),
            Err(AdjustmentError::ValidationError(_))
        ));

        let unknown = SaveRequest {
            submitted_by: None,
            products: vec![submission("0000000000000", 1.0, &[], Vec::new())],
        };
        assert!(matches!(
            build_save_request(&snapshot, unknown),
            Err(AdjustmentError::ProductNotFound { .. })
        ));
    }

    #[test]
    fn test_summarize_lots() {
        let snapshot = sample_snapshot();
        let summary = summarize_lots(
            &snapshot,
            LotSummaryRequest {
                product_code: "4987000000001".to_string(),
                physical_stock: Some(RawQuantity::Number(10.0)),
                active_allocation_ids: vec!["pc-1".to_string()],
                lots: vec![lot(10.0, (2027, 1, 31), "A100")],
            },
        )
        .unwrap();
        assert_eq!(summary.computed_previous_day_stock, Some(10.0));
        assert_eq!(summary.difference, Some(0.0));
        assert!(summary.alerts.is_empty());
    }

    #[test]
    fn test_summarize_lots_for_invalid_product() {
        let snapshot = sample_snapshot();
        let summary = summarize_lots(
            &snapshot,
            LotSummaryRequest {
                product_code: "4987000000002".to_string(),
                physical_stock: None,
                active_allocation_ids: vec!["pc-2".to_string()],
                lots: vec![lot(20.0, (2027, 2, 28), "C300")],
            },
        )
        .unwrap();
        assert_eq!(summary.computed_previous_day_stock, None);
        assert_eq!(summary.alerts[0].alert_type, AdjustmentAlertType::InvalidComputation);
    }
}
