//! Commission calculation.
//!
//! [`calculate_commissions`] turns a [`SaleEntry`] into a
//! [`CommissionBreakdown`].  It is a total, pure function: absent
//! optional amounts contribute zero and nothing here can fail, so it is
//! safe to call from any number of threads at once.

use crate::models::{CommissionBreakdown, SaleEntry, SaleType};

/// Vehicle commission tiers as `(exclusive upper bound, commission)`.
/// Prices at or above the last bound earn [`TOP_TIER_COMMISSION`].
const VEHICLE_TIERS: [(f64, i64); 3] = [(10_000.0, 200), (20_000.0, 300), (30_000.0, 400)];
const TOP_TIER_COMMISSION: i64 = 500;

const NEW_ACCESSORIES_THRESHOLD: f64 = 988.0;
const USED_ACCESSORIES_THRESHOLD: f64 = 488.0;
/// Accessories revenue above the threshold must exceed this to earn the bonus.
const ACCESSORIES_MIN_ELIGIBLE: f64 = 800.0;
const ACCESSORIES_BONUS: i64 = 100;

/// Warranty pays `WARRANTY_RATE` for every full `WARRANTY_STEP` of profit.
const WARRANTY_STEP: f64 = 1_000.0;
const WARRANTY_RATE: i64 = 100;
/// Step count is clamped to this magnitude so the commission and the
/// total always fit in an `i64`.
const WARRANTY_STEP_LIMIT: f64 = 1e13;

const MAINTENANCE_MIN_PRICE: f64 = 800.0;
const MAINTENANCE_BONUS: i64 = 100;

/// Computes the commission owed for a single sale.
pub fn calculate_commissions(sale: &SaleEntry) -> CommissionBreakdown {
    let car_commission = vehicle_commission(sale.sale_price);
    let accessories_commission = accessories_commission(sale.sale_type, sale.accessories_price);
    let warranty_commission = warranty_commission(sale.warranty_price, sale.warranty_cost);
    let maintenance_commission = maintenance_commission(sale.maintenance_price);

    CommissionBreakdown {
        car_commission,
        accessories_commission,
        warranty_commission,
        maintenance_commission,
        total_commission: car_commission
            .saturating_add(accessories_commission)
            .saturating_add(warranty_commission)
            .saturating_add(maintenance_commission),
    }
}

fn vehicle_commission(sale_price: f64) -> i64 {
    VEHICLE_TIERS
        .iter()
        .find(|(ceiling, _)| sale_price < *ceiling)
        .map(|(_, commission)| *commission)
        .unwrap_or(TOP_TIER_COMMISSION)
}

fn accessories_commission(sale_type: SaleType, accessories_price: Option<f64>) -> i64 {
    let Some(price) = present(accessories_price) else {
        return 0;
    };
    let threshold = match sale_type {
        SaleType::New => NEW_ACCESSORIES_THRESHOLD,
        SaleType::Used | SaleType::TradeIn => USED_ACCESSORIES_THRESHOLD,
    };
    if price - threshold > ACCESSORIES_MIN_ELIGIBLE {
        ACCESSORIES_BONUS
    } else {
        0
    }
}

fn warranty_commission(warranty_price: Option<f64>, warranty_cost: Option<f64>) -> i64 {
    match (present(warranty_price), present(warranty_cost)) {
        (Some(price), Some(cost)) => {
            // Floor, not truncation: a $500 loss costs a full step.
            let steps = ((price - cost) / WARRANTY_STEP)
                .floor()
                .clamp(-WARRANTY_STEP_LIMIT, WARRANTY_STEP_LIMIT);
            (steps as i64).saturating_mul(WARRANTY_RATE)
        }
        _ => 0,
    }
}

fn maintenance_commission(maintenance_price: Option<f64>) -> i64 {
    match maintenance_price {
        Some(price) if price > MAINTENANCE_MIN_PRICE => MAINTENANCE_BONUS,
        _ => 0,
    }
}

/// Zero and NaN count as "not entered".
fn present(amount: Option<f64>) -> Option<f64> {
    amount.filter(|v| *v != 0.0 && !v.is_nan())
}
