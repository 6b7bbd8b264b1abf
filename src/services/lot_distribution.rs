use crate::constants::LOT_TOTAL_TOLERANCE;
use crate::models::adjustment::{
    format_quantity, CalculationStatus, ConversionIssue, LotRecord, LotSummary, ProductCalculation,
};
use crate::models::inventory::AdjustmentAlert;

/// User-edited split of one product's counted stock across lots.
///
/// Rows are never rebalanced: adding, removing or editing a row leaves every
/// other row untouched, and the total is only the sum of what was entered.
#[derive(Debug, Clone, PartialEq)]
pub struct LotDistribution {
    product_code: String,
    computed_previous_day_stock: Option<f64>,
    computation_issues: Vec<ConversionIssue>,
    rows: Vec<LotRecord>,
}

impl LotDistribution {
    pub fn new(product_code: &str, computed_previous_day_stock: Option<f64>, rows: Vec<LotRecord>) -> Self {
        Self {
            product_code: product_code.to_string(),
            computed_previous_day_stock,
            computation_issues: Vec::new(),
            rows,
        }
    }

    /// One primary row holding the whole computed quantity
    pub fn seeded(product_code: &str, previous_day_stock: f64) -> Self {
        Self::new(
            product_code,
            Some(previous_day_stock),
            vec![seed_lot(previous_day_stock)],
        )
    }

    /// Rows checked against a fresh calculation. With no rows entered yet the
    /// primary row is seeded from the computed value.
    pub fn for_calculation(calculation: &ProductCalculation, rows: Vec<LotRecord>) -> Self {
        let mut distribution = match (calculation.previous_day_stock, rows.is_empty()) {
            (Some(computed), true) => Self::seeded(&calculation.product_code, computed),
            (computed, _) => Self::new(&calculation.product_code, computed, rows),
        };
        if calculation.status == CalculationStatus::Invalid {
            distribution.computed_previous_day_stock = None;
            distribution.computation_issues = calculation.issues.clone();
        }
        distribution
    }

    pub fn computed_previous_day_stock(&self) -> Option<f64> {
        self.computed_previous_day_stock
    }

    pub fn rows(&self) -> &[LotRecord] {
        &self.rows
    }

    #[cfg(test)]
    pub fn add_row(&mut self, row: LotRecord) {
        self.rows.push(row);
    }

    #[cfg(test)]
    pub fn remove_row(&mut self, index: usize) -> Option<LotRecord> {
        (index < self.rows.len()).then(|| self.rows.remove(index))
    }

    #[cfg(test)]
    pub fn set_quantity(&mut self, index: usize, quantity: f64) -> bool {
        match self.rows.get_mut(index) {
            Some(row) => {
                row.quantity = quantity;
                true
            }
            None => false,
        }
    }

    pub fn entered_total(&self) -> f64 {
        self.rows.iter().map(|row| row.quantity).sum()
    }

    /// Entered minus computed; `None` while the computed value is unknown
    pub fn difference(&self) -> Option<f64> {
        self.computed_previous_day_stock
            .map(|computed| self.entered_total() - computed)
    }

    /// Advisory alerts. None of them blocks saving.
    pub fn alerts(&self) -> Vec<AdjustmentAlert> {
        let mut alerts = Vec::new();

        if !self.computation_issues.is_empty() {
            alerts.push(AdjustmentAlert::invalid_computation(
                &self.product_code,
                &self.computation_issues,
            ));
        }

        if let Some(computed) = self.computed_previous_day_stock {
            let entered = self.entered_total();
            if (entered - computed).abs() > LOT_TOTAL_TOLERANCE {
                alerts.push(AdjustmentAlert::lot_total_mismatch(&self.product_code, entered, computed));
            }
        }

        for (index, row) in self.rows.iter().enumerate() {
            if row.quantity == 0.0 {
                continue;
            }
            if row.expiry_date.is_none() {
                alerts.push(AdjustmentAlert::missing_expiry(&self.product_code, index));
            }
            if row.lot_number.trim().is_empty() {
                alerts.push(AdjustmentAlert::missing_lot_number(&self.product_code, index));
            }
        }

        alerts
    }

    pub fn summary(&self) -> LotSummary {
        let entered_total = self.entered_total();
        LotSummary {
            product_code: self.product_code.clone(),
            row_count: self.rows().len(),
            entered_total,
            entered_total_display: format_quantity(entered_total),
            computed_previous_day_stock: self.computed_previous_day_stock(),
            difference: self.difference(),
            alerts: self.alerts(),
        }
    }
}

pub fn seed_lot(previous_day_stock: f64) -> LotRecord {
    LotRecord {
        quantity: previous_day_stock,
        ..LotRecord::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::inventory::{AdjustmentAlertType, AlertSeverity};
    use chrono::NaiveDate;

    fn lot(quantity: f64, lot_number: &str) -> LotRecord {
        LotRecord {
            quantity,
            expiry_date: NaiveDate::from_ymd_opt(2027, 3, 31),
            lot_number: lot_number.to_string(),
        }
    }

    #[test]
    fn test_seeded_distribution_reconciles() {
        let dist = LotDistribution::seeded("4987000000001", 12.5);
        assert_eq!(dist.rows().len(), 1);
        assert_eq!(dist.entered_total(), 12.5);
        assert_eq!(dist.difference(), Some(0.0));
    }

    #[test]
    fn test_add_row_does_not_rebalance() {
        let mut dist = LotDistribution::new("4987000000001", Some(10.0), vec![lot(10.0, "A1")]);
        dist.add_row(lot(4.0, "B2"));

        assert_eq!(dist.rows()[0].quantity, 10.0);
        assert_eq!(dist.entered_total(), 14.0);
        assert_eq!(dist.difference(), Some(4.0));
    }

    #[test]
    fn test_remove_row_does_not_rebalance() {
        let mut dist = LotDistribution::new(
            "4987000000001",
            Some(10.0),
            vec![lot(6.0, "A1"), lot(4.0, "B2")],
        );

        let removed = dist.remove_row(0).unwrap();
        assert_eq!(removed.lot_number, "A1");
        assert_eq!(dist.rows()[0].quantity, 4.0);
        assert_eq!(dist.entered_total(), 4.0);
        assert!(dist.remove_row(5).is_none());
    }

    #[test]
    fn test_set_quantity_only_touches_target_row() {
        let mut dist = LotDistribution::new("4987000000001", None, vec![lot(1.0, "A"), lot(2.0, "B")]);
        assert!(dist.set_quantity(1, 5.0));
        assert!(!dist.set_quantity(2, 5.0));
        assert_eq!(dist.rows()[0].quantity, 1.0);
        assert_eq!(dist.entered_total(), 6.0);
        assert_eq!(dist.difference(), None);
    }

    #[test]
    fn test_mismatch_is_reported_but_advisory() {
        let dist = LotDistribution::new("4987000000001", Some(10.0), vec![lot(7.0, "A1")]);
        let summary = dist.summary();

        assert_eq!(summary.difference, Some(-3.0));
        assert_eq!(summary.entered_total_display, "7.00");
        assert_eq!(summary.alerts.len(), 1);
        assert_eq!(summary.alerts[0].alert_type, AdjustmentAlertType::LotTotalMismatch);
    }

    fn calculation(status: CalculationStatus, previous_day_stock: Option<f64>) -> ProductCalculation {
        let issues = match status {
            CalculationStatus::Ok => Vec::new(),
            CalculationStatus::Invalid => vec![ConversionIssue::PrecompPackInnerQtyUnset {
                allocation_id: "pc-2".to_string(),
                quantity: 4.0,
                pack_inner_qty: 0.0,
            }],
        };
        ProductCalculation {
            product_code: "4987000000002".to_string(),
            product_name: "Amlodipine 5mg".to_string(),
            status,
            previous_day_stock,
            display: None,
            breakdown: None,
            seed_lot: None,
            issues,
        }
    }

    #[test]
    fn test_calculation_seeds_primary_row_when_none_entered() {
        let dist = LotDistribution::for_calculation(&calculation(CalculationStatus::Ok, Some(7.5)), Vec::new());
        assert_eq!(dist.rows().len(), 1);
        assert_eq!(dist.rows()[0].quantity, 7.5);
        assert!(dist.alerts().iter().all(|a| a.alert_type != AdjustmentAlertType::LotTotalMismatch));

        let entered = LotDistribution::for_calculation(
            &calculation(CalculationStatus::Ok, Some(7.5)),
            vec![lot(7.5, "A1")],
        );
        assert_eq!(entered.rows()[0].lot_number, "A1");
        assert!(entered.alerts().is_empty());
    }

    #[test]
    fn test_invalid_calculation_raises_critical_alert() {
        let dist = LotDistribution::for_calculation(
            &calculation(CalculationStatus::Invalid, None),
            vec![lot(5.0, "A1")],
        );
        let summary = dist.summary();

        assert_eq!(summary.computed_previous_day_stock, None);
        assert_eq!(summary.difference, None);
        assert_eq!(summary.entered_total, 5.0);
        assert_eq!(summary.alerts.len(), 1);
        assert_eq!(summary.alerts[0].alert_type, AdjustmentAlertType::InvalidComputation);
        assert_eq!(summary.alerts[0].severity, AlertSeverity::Critical);
        assert!(summary.alerts[0].message.contains("pc-2"));
    }

    #[test]
    fn test_rows_missing_expiry_or_lot_are_flagged() {
        let dist = LotDistribution::new(
            "4987000000001",
            Some(3.0),
            vec![
                LotRecord {
                    quantity: 3.0,
                    expiry_date: None,
                    lot_number: " ".to_string(),
                },
                LotRecord::default(),
            ],
        );

        let kinds: Vec<_> = dist.alerts().into_iter().map(|a| a.alert_type).collect();
        assert_eq!(
            kinds,
            vec![AdjustmentAlertType::MissingExpiry, AdjustmentAlertType::MissingLotNumber]
        );
    }
}
