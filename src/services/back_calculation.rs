//! Previous-day stock back-calculation.
//!
//! Given today's physical count, the precomp allocations the user marked
//! active, and today's posted movements for one product, solve for the
//! ending balance of the previous day:
//!
//! ```text
//! previous_day_stock = (physical_stock_today + precomp_stock_equivalent) - net_change_today
//! ```
//!
//! Every function here is pure. A product whose allocations or movements
//! cannot be converted to JAN units yields [`InvalidComputation`] listing
//! every offending record instead of a number.

use crate::models::adjustment::{
    ComputedPreviousDayStock, ConversionIssue, InvalidComputation, PrecompAllocation,
    StockAdjustmentInput, TransactionMovement,
};

/// Sum of active allocations converted from dispensing units to JAN units
pub fn precomp_stock_equivalent(
    active_allocations: &[PrecompAllocation],
) -> Result<f64, Vec<ConversionIssue>> {
    let mut total = 0.0;
    let mut issues = Vec::new();

    for allocation in active_allocations {
        if allocation.pack_inner_qty > 0.0 {
            total += allocation.allocated_quantity / allocation.pack_inner_qty;
        } else if allocation.allocated_quantity != 0.0 {
            issues.push(ConversionIssue::PrecompPackInnerQtyUnset {
                allocation_id: allocation.id.clone(),
                quantity: allocation.allocated_quantity,
                pack_inner_qty: allocation.pack_inner_qty,
            });
        }
    }

    if issues.is_empty() {
        Ok(total)
    } else {
        Err(issues)
    }
}

/// Unsigned JAN-unit quantity of a movement.
///
/// The JAN quantity wins when present and non-zero; otherwise the YJ
/// (dispensing unit) quantity is converted through the package inner
/// quantity.
pub fn movement_magnitude(movement: &TransactionMovement) -> Result<f64, ConversionIssue> {
    if let Some(jan) = movement.jan_quantity.filter(|q| *q != 0.0) {
        return Ok(jan.abs());
    }

    let yj = movement.yj_quantity.unwrap_or(0.0);
    if yj == 0.0 {
        return Ok(0.0);
    }

    if movement.pack_inner_qty > 0.0 {
        Ok(yj.abs() / movement.pack_inner_qty)
    } else {
        Err(ConversionIssue::MovementPackInnerQtyUnset {
            movement_id: movement.id.clone(),
            flag_type: movement.flag_type.code(),
            yj_quantity: yj,
            pack_inner_qty: movement.pack_inner_qty,
        })
    }
}

/// Signed flow of today's movements; inventory counts are snapshots, not flow
pub fn net_change_today(todays_movements: &[TransactionMovement]) -> Result<f64, Vec<ConversionIssue>> {
    let mut total = 0.0;
    let mut issues = Vec::new();

    for movement in todays_movements {
        if movement.flag_type.is_inventory_count() {
            continue;
        }

        let Some(direction) = movement.flag_type.direction() else {
            issues.push(ConversionIssue::UnknownFlagType {
                movement_id: movement.id.clone(),
                code: movement.flag_type.code(),
            });
            continue;
        };

        match movement_magnitude(movement) {
            Ok(magnitude) => total += magnitude * direction.sign(),
            Err(issue) => issues.push(issue),
        }
    }

    if issues.is_empty() {
        Ok(total)
    } else {
        Err(issues)
    }
}

/// Back-solve one product's previous-day ending balance
pub fn back_calculate(
    physical_stock_today: f64,
    active_allocations: &[PrecompAllocation],
    todays_movements: &[TransactionMovement],
) -> Result<ComputedPreviousDayStock, InvalidComputation> {
    let mut issues = Vec::new();

    if physical_stock_today < 0.0 {
        issues.push(ConversionIssue::NegativePhysicalStock {
            quantity: physical_stock_today,
        });
    }

    let precomp = precomp_stock_equivalent(active_allocations).unwrap_or_else(|mut found| {
        issues.append(&mut found);
        0.0
    });
    let net_change = net_change_today(todays_movements).unwrap_or_else(|mut found| {
        issues.append(&mut found);
        0.0
    });

    if !issues.is_empty() {
        return Err(InvalidComputation { issues });
    }

    Ok(ComputedPreviousDayStock::from_input(StockAdjustmentInput {
        physical_stock_today,
        precomp_deduction_today: precomp,
        net_transaction_change_today: net_change,
    }))
}
