use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::constants::DISPLAY_DECIMALS;
use crate::models::inventory::AdjustmentAlert;

/// Ledger movement type as shipped by the pharmacy API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum FlagType {
    Dispense,
    Receipt,
    Return,
    InventoryCount,
    InboundTransfer,
    OutboundTransfer,
    StockIncreaseAdjustment,
    StockDecreaseAdjustment,
    Unknown(i64),
}

/// Direction a movement moves stock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Inbound => 1.0,
            Direction::Outbound => -1.0,
        }
    }
}

impl From<i64> for FlagType {
    fn from(code: i64) -> Self {
        match code {
            1 => FlagType::Dispense,
            2 => FlagType::Receipt,
            3 => FlagType::Return,
            4 => FlagType::InventoryCount,
            5 => FlagType::InboundTransfer,
            6 => FlagType::OutboundTransfer,
            7 => FlagType::StockIncreaseAdjustment,
            8 => FlagType::StockDecreaseAdjustment,
            other => FlagType::Unknown(other),
        }
    }
}

impl From<FlagType> for i64 {
    fn from(flag: FlagType) -> Self {
        flag.code()
    }
}

impl FlagType {
    pub fn code(self) -> i64 {
        match self {
            FlagType::Dispense => 1,
            FlagType::Receipt => 2,
            FlagType::Return => 3,
            FlagType::InventoryCount => 4,
            FlagType::InboundTransfer => 5,
            FlagType::OutboundTransfer => 6,
            FlagType::StockIncreaseAdjustment => 7,
            FlagType::StockDecreaseAdjustment => 8,
            FlagType::Unknown(code) => code,
        }
    }

    /// `None` for snapshots (inventory count) and unrecognised codes
    pub fn direction(self) -> Option<Direction> {
        match self {
            FlagType::Receipt | FlagType::InboundTransfer | FlagType::StockIncreaseAdjustment => {
                Some(Direction::Inbound)
            }
            FlagType::Dispense
            | FlagType::Return
            | FlagType::OutboundTransfer
            | FlagType::StockDecreaseAdjustment => Some(Direction::Outbound),
            FlagType::InventoryCount | FlagType::Unknown(_) => None,
        }
    }

    pub fn is_inventory_count(self) -> bool {
        self == FlagType::InventoryCount
    }
}

/// Product row from the pharmacy API, keyed by JAN code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductStock {
    pub product_code: String,
    #[serde(default)]
    pub yj_code: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub pack_inner_qty: f64,
    /// Stock the ledger expects on hand; default for the physical count
    #[serde(default)]
    pub current_stock: f64,
}

/// Posted ledger entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionMovement {
    #[serde(default)]
    pub id: String,
    pub product_code: String,
    pub date: NaiveDate,
    pub flag_type: FlagType,
    #[serde(default)]
    pub jan_quantity: Option<f64>,
    #[serde(default)]
    pub yj_quantity: Option<f64>,
    #[serde(default)]
    pub pack_inner_qty: f64,
}

/// Precomp quantity allocated against stock, in dispensing units
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecompAllocation {
    pub id: String,
    pub product_code: String,
    pub allocated_quantity: f64,
    #[serde(default)]
    pub pack_inner_qty: f64,
}

/// Per-product inputs of the back-calculation, all in JAN units
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StockAdjustmentInput {
    pub physical_stock_today: f64,
    pub precomp_deduction_today: f64,
    pub net_transaction_change_today: f64,
}

impl StockAdjustmentInput {
    pub fn total_stock_including_precomp(&self) -> f64 {
        self.physical_stock_today + self.precomp_deduction_today
    }

    pub fn previous_day_stock(&self) -> f64 {
        self.total_stock_including_precomp() - self.net_transaction_change_today
    }
}

/// Back-solved previous-day ending balance
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComputedPreviousDayStock {
    pub input: StockAdjustmentInput,
    pub value: f64,
}

impl ComputedPreviousDayStock {
    pub fn from_input(input: StockAdjustmentInput) -> Self {
        Self {
            input,
            value: input.previous_day_stock(),
        }
    }

    /// Display projection only; never feed this back into arithmetic
    pub fn display(&self) -> String {
        format_quantity(self.value)
    }
}

pub fn format_quantity(value: f64) -> String {
    format!("{value:.prec$}", prec = DISPLAY_DECIMALS)
}

/// Why a product's computation cannot produce a number
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversionIssue {
    #[error("Precomp allocation {allocation_id} has {quantity} dispensing units but package inner quantity is unset ({pack_inner_qty})")]
    PrecompPackInnerQtyUnset {
        allocation_id: String,
        quantity: f64,
        pack_inner_qty: f64,
    },
    #[error("Movement {movement_id} has {yj_quantity} dispensing units but package inner quantity is unset ({pack_inner_qty})")]
    MovementPackInnerQtyUnset {
        movement_id: String,
        flag_type: i64,
        yj_quantity: f64,
        pack_inner_qty: f64,
    },
    #[error("Movement {movement_id} has unknown flag type {code}")]
    UnknownFlagType { movement_id: String, code: i64 },
    #[error("Precomp allocation {allocation_id} is not active for this product")]
    UnknownAllocation { allocation_id: String },
    #[error("Product {product_code} is not in the loaded inventory data")]
    UnknownProduct { product_code: String },
    #[error("Physical stock cannot be negative ({quantity})")]
    NegativePhysicalStock { quantity: f64 },
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("Stock computation is invalid ({} issue(s))", .issues.len())]
pub struct InvalidComputation {
    pub issues: Vec<ConversionIssue>,
}

/// Lot/expiry sub-record of a product's counted stock
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LotRecord {
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub lot_number: String,
}

/// Physical count as typed by the user: a number, a string, or nothing
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawQuantity {
    Number(f64),
    Text(String),
}

impl RawQuantity {
    /// Blank or unparseable input counts as zero
    pub fn to_quantity(&self) -> f64 {
        match self {
            RawQuantity::Number(value) if value.is_finite() => *value,
            RawQuantity::Number(_) => 0.0,
            RawQuantity::Text(text) => parse_quantity(text),
        }
    }
}

pub fn parse_quantity(text: &str) -> f64 {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct LoadRequest {
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct LoadResult {
    pub business_date: NaiveDate,
    pub loaded_at: DateTime<Utc>,
    pub product_count: usize,
    pub movement_count: usize,
    pub precomp_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct CalculateRequest {
    pub entries: Vec<CalculationEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalculationEntry {
    pub product_code: String,
    /// Falls back to the product's current stock when absent
    #[serde(default)]
    pub physical_stock: Option<RawQuantity>,
    #[serde(default)]
    pub active_allocation_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationStatus {
    Ok,
    Invalid,
}

#[derive(Debug, Serialize)]
pub struct ProductCalculation {
    pub product_code: String,
    pub product_name: String,
    pub status: CalculationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_day_stock: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<StockAdjustmentInput>,
    /// Default for the primary lot row
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_lot: Option<LotRecord>,
    pub issues: Vec<ConversionIssue>,
}

#[derive(Debug, Serialize)]
pub struct CalculateResponse {
    pub business_date: NaiveDate,
    pub products: Vec<ProductCalculation>,
    pub invalid_count: usize,
}

/// Lot rows for one product, with the count they were split from
#[derive(Debug, Deserialize)]
pub struct LotSummaryRequest {
    pub product_code: String,
    #[serde(default)]
    pub physical_stock: Option<RawQuantity>,
    #[serde(default)]
    pub active_allocation_ids: Vec<String>,
    /// Empty means a single primary row seeded with the computed stock
    #[serde(default)]
    pub lots: Vec<LotRecord>,
}

impl LotSummaryRequest {
    pub fn entry(&self) -> CalculationEntry {
        CalculationEntry {
            product_code: self.product_code.clone(),
            physical_stock: self.physical_stock.clone(),
            active_allocation_ids: self.active_allocation_ids.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LotSummary {
    pub product_code: String,
    pub row_count: usize,
    pub entered_total: f64,
    pub entered_total_display: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computed_previous_day_stock: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difference: Option<f64>,
    pub alerts: Vec<AdjustmentAlert>,
}

#[derive(Debug, Deserialize)]
pub struct SaveRequest {
    #[serde(default)]
    pub submitted_by: Option<String>,
    pub products: Vec<ProductLotSubmission>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductLotSubmission {
    pub product_code: String,
    #[serde(default)]
    pub physical_stock: Option<RawQuantity>,
    #[serde(default)]
    pub active_allocation_ids: Vec<String>,
    #[serde(default)]
    pub lots: Vec<LotRecord>,
}

impl ProductLotSubmission {
    pub fn entry(&self) -> CalculationEntry {
        CalculationEntry {
            product_code: self.product_code.clone(),
            physical_stock: self.physical_stock.clone(),
            active_allocation_ids: self.active_allocation_ids.clone(),
        }
    }
}

/// Per-product part of the saved adjustment. The computed stock is the
/// server's own recalculation and is absent when it is invalid.
#[derive(Debug, Clone, Serialize)]
pub struct ProductAdjustment {
    pub product_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computed_previous_day_stock: Option<f64>,
    pub lots: Vec<LotRecord>,
}

/// Body forwarded to the pharmacy API
#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentSaveRequest {
    pub request_id: Uuid,
    pub business_date: NaiveDate,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_by: Option<String>,
    pub products: Vec<ProductAdjustment>,
}

#[derive(Debug, Serialize)]
pub struct SaveResult {
    pub request_id: Uuid,
    pub business_date: NaiveDate,
    pub products_submitted: usize,
    pub alerts: Vec<AdjustmentAlert>,
    pub upstream: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub barcode: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScanResponse {
    pub valid: bool,
    pub data: Option<ScanData>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanData {
    pub gtin: String,
    /// JAN code, when the GTIN is a unit-level code
    pub product_code: Option<String>,
    pub product_name: Option<String>,
    pub lot_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub serial: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpstreamHealthResponse {
    pub success: bool,
    pub upstream_url: String,
    pub snapshot_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

/// Service-level failures
#[derive(Debug, Error)]
pub enum AdjustmentError {
    #[error("No inventory data loaded")]
    NoDataLoaded,
    #[error("Product not found: {product_code}")]
    ProductNotFound { product_code: String },
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Upstream error: {0}")]
    Upstream(String),
    #[error("Upstream returned HTTP {status}: {message}")]
    UpstreamStatus { status: u16, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_type_codes_round_trip_through_json() {
        let movement: TransactionMovement = serde_json::from_str(
            r#"{"product_code":"4987123456789","date":"2026-10-18","flag_type":4,"jan_quantity":3}"#,
        )
        .unwrap();
        assert_eq!(movement.flag_type, FlagType::InventoryCount);
        assert_eq!(movement.yj_quantity, None);
        assert_eq!(movement.pack_inner_qty, 0.0);

        let json = serde_json::to_value(&movement).unwrap();
        assert_eq!(json["flag_type"], 4);
    }

    #[test]
    fn test_unknown_flag_type_is_preserved() {
        let flag: FlagType = serde_json::from_str("42").unwrap();
        assert_eq!(flag, FlagType::Unknown(42));
        assert_eq!(flag.direction(), None);
        assert_eq!(flag.code(), 42);
    }

    #[test]
    fn test_flag_directions() {
        for code in [2i64, 5, 7] {
            assert_eq!(FlagType::from(code).direction(), Some(Direction::Inbound));
        }
        for code in [1i64, 3, 6, 8] {
            assert_eq!(FlagType::from(code).direction(), Some(Direction::Outbound));
        }
        assert_eq!(FlagType::InventoryCount.direction(), None);
    }

    #[test]
    fn test_raw_quantity_parsing() {
        let blank: RawQuantity = serde_json::from_str(r#""   ""#).unwrap();
        assert_eq!(blank.to_quantity(), 0.0);

        let junk: RawQuantity = serde_json::from_str(r#""abc""#).unwrap();
        assert_eq!(junk.to_quantity(), 0.0);

        let text: RawQuantity = serde_json::from_str(r#"" 12.5 ""#).unwrap();
        assert_eq!(text.to_quantity(), 12.5);

        let number: RawQuantity = serde_json::from_str("7").unwrap();
        assert_eq!(number.to_quantity(), 7.0);

        assert_eq!(parse_quantity("NaN"), 0.0);
        assert_eq!(parse_quantity("inf"), 0.0);
    }

    #[test]
    fn test_display_does_not_alter_value() {
        let computed = ComputedPreviousDayStock::from_input(StockAdjustmentInput {
            physical_stock_today: 1.0 / 3.0,
            precomp_deduction_today: 0.0,
            net_transaction_change_today: 0.0,
        });
        assert_eq!(computed.display(), "0.33");
        assert_eq!(computed.value, 1.0 / 3.0);
    }

    #[test]
    fn test_conversion_issue_serializes_with_kind_tag() {
        let issue = ConversionIssue::PrecompPackInnerQtyUnset {
            allocation_id: "pc-1".to_string(),
            quantity: 4.0,
            pack_inner_qty: 0.0,
        };
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["kind"], "precomp_pack_inner_qty_unset");
        assert_eq!(json["allocation_id"], "pc-1");
    }
}
