use serde::{Deserialize, Serialize};

use crate::models::adjustment::{format_quantity, ConversionIssue};

/// Inline alert attached to a product on the adjustment screens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentAlert {
    pub alert_type: AdjustmentAlertType,
    pub product_code: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub recommended_action: Option<String>,
}

/// Types of adjustment alerts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AdjustmentAlertType {
    InvalidComputation,
    LotTotalMismatch,
    MissingExpiry,
    MissingLotNumber,
}

/// Alert severity levels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AlertSeverity {
    Critical, // Computed stock is not a number
    Warning,  // Should be addressed but doesn't block saving
    Info,     // Informational only
}

impl AdjustmentAlert {
    /// Computed stock could not be derived for this product
    pub fn invalid_computation(product_code: &str, issues: &[ConversionIssue]) -> Self {
        let detail = issues
            .iter()
            .map(|issue| issue.to_string())
            .collect::<Vec<_>>()
            .join("; ");

        Self {
            alert_type: AdjustmentAlertType::InvalidComputation,
            product_code: product_code.to_string(),
            message: format!("Previous-day stock for {product_code} cannot be computed: {detail}"),
            severity: AlertSeverity::Critical,
            recommended_action: Some("Correct the product master or precomp data, then recalculate".to_string()),
        }
    }

    /// Lot rows do not add up to the computed stock. Advisory only.
    pub fn lot_total_mismatch(product_code: &str, entered: f64, computed: f64) -> Self {
        Self {
            alert_type: AdjustmentAlertType::LotTotalMismatch,
            product_code: product_code.to_string(),
            message: format!(
                "Lot total {} differs from computed stock {} for {product_code}",
                format_quantity(entered),
                format_quantity(computed)
            ),
            severity: AlertSeverity::Info,
            recommended_action: Some("Review lot quantities before saving".to_string()),
        }
    }

    pub fn missing_expiry(product_code: &str, row: usize) -> Self {
        Self {
            alert_type: AdjustmentAlertType::MissingExpiry,
            product_code: product_code.to_string(),
            message: format!("Lot row {} of {product_code} has a quantity but no expiry date", row + 1),
            severity: AlertSeverity::Warning,
            recommended_action: Some("Scan the pack barcode or enter the expiry date".to_string()),
        }
    }

    pub fn missing_lot_number(product_code: &str, row: usize) -> Self {
        Self {
            alert_type: AdjustmentAlertType::MissingLotNumber,
            product_code: product_code.to_string(),
            message: format!("Lot row {} of {product_code} has a quantity but no lot number", row + 1),
            severity: AlertSeverity::Info,
            recommended_action: None,
        }
    }
}
