//! Monthly statistics engine.
//!
//! The `engine` module folds a user's sales and spiffs into a
//! [`MonthlyStats`].  It uses the [`rayon`] crate to compute the
//! per-sale commission breakdowns across multiple CPU cores before
//! summing them.

use crate::commission::calculate_commissions;
use crate::error::{AppError, AppResult};
use crate::models::{CommissionBreakdown, MonthlyStats, SaleRecord, SaleType, SpiffEntry};
use chrono::NaiveDate;
use rayon::prelude::*;

/// Returns the half-open range `[first day of month, first day of next
/// month)` for the given calendar month.
pub fn month_bounds(year: i32, month: u32) -> AppResult<(NaiveDate, NaiveDate)> {
    let invalid = || AppError::InvalidInput(format!("invalid month {year}-{month:02}"));
    let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let end = NaiveDate::from_ymd_opt(next_year, next_month, 1).ok_or_else(invalid)?;
    Ok((start, end))
}

/// Builds the statistics for one month.
///
/// Records dated outside the month are ignored, so callers may pass an
/// unfiltered list.
pub fn monthly_stats(
    year: i32,
    month: u32,
    sales: &[SaleRecord],
    spiffs: &[SpiffEntry],
) -> AppResult<MonthlyStats> {
    let (start, end) = month_bounds(year, month)?;
    let in_month = |date: NaiveDate| date >= start && date < end;

    let sales: Vec<&SaleRecord> = sales.iter().filter(|s| in_month(s.sold_on)).collect();
    let breakdowns: Vec<CommissionBreakdown> = sales
        .par_iter()
        .map(|sale| calculate_commissions(&sale.entry))
        .collect();

    let count_of = |kind: SaleType| sales.iter().filter(|s| s.entry.sale_type == kind).count();

    let sales_commission = sum_component(&breakdowns, |b| b.total_commission);
    let (spiff_count, spiff_total) = spiffs
        .iter()
        .filter(|s| in_month(s.awarded_on))
        .fold((0usize, 0i64), |(count, total), s| {
            (count + 1, total.saturating_add(s.amount))
        });
    let average_commission = if sales.is_empty() {
        0.0
    } else {
        sales_commission as f64 / sales.len() as f64
    };

    Ok(MonthlyStats {
        year,
        month,
        sale_count: sales.len(),
        new_count: count_of(SaleType::New),
        used_count: count_of(SaleType::Used),
        trade_in_count: count_of(SaleType::TradeIn),
        car_commission: sum_component(&breakdowns, |b| b.car_commission),
        accessories_commission: sum_component(&breakdowns, |b| b.accessories_commission),
        warranty_commission: sum_component(&breakdowns, |b| b.warranty_commission),
        maintenance_commission: sum_component(&breakdowns, |b| b.maintenance_commission),
        sales_commission,
        spiff_count,
        spiff_total,
        total_earnings: sales_commission.saturating_add(spiff_total),
        gross_sales: sales.iter().map(|s| s.entry.sale_price).sum(),
        average_commission,
    })
}

fn sum_component(breakdowns: &[CommissionBreakdown], field: fn(&CommissionBreakdown) -> i64) -> i64 {
    breakdowns
        .iter()
        .map(field)
        .fold(0i64, |acc, v| acc.saturating_add(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SaleEntry;
    use chrono::Utc;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn sale_on(sold_on: NaiveDate, price: f64, sale_type: SaleType) -> SaleRecord {
        SaleRecord {
            id: Uuid::new_v4(),
            owner_id: Uuid::nil(),
            sold_on,
            customer_name: "Pat Doe".into(),
            vehicle: "Sedan".into(),
            stock_number: None,
            shared_from: None,
            created_at: Utc::now(),
            entry: SaleEntry {
                sale_price: price,
                sale_type,
                accessories_price: None,
                warranty_price: None,
                warranty_cost: None,
                maintenance_price: None,
            },
        }
    }

    fn spiff_on(awarded_on: NaiveDate, amount: i64) -> SpiffEntry {
        SpiffEntry {
            id: Uuid::new_v4(),
            owner_id: Uuid::nil(),
            awarded_on,
            amount,
            description: "weekend push".into(),
            proof_path: None,
            proof_url: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn december_rolls_into_next_year() {
        let (start, end) = month_bounds(2024, 12).expect("bounds");
        assert_eq!(start, date(2024, 12, 1));
        assert_eq!(end, date(2025, 1, 1));
    }

    #[test]
    fn rejects_month_thirteen() {
        assert!(matches!(month_bounds(2024, 13), Err(AppError::InvalidInput(_))));
        assert!(monthly_stats(2024, 0, &[], &[]).is_err());
    }

    #[test]
    fn only_counts_records_inside_the_month() {
        let mut warranty_loss = sale_on(date(2024, 3, 31), 12_000.0, SaleType::Used);
        warranty_loss.entry.warranty_price = Some(500.0);
        warranty_loss.entry.warranty_cost = Some(1_000.0);
        let sales = vec![
            sale_on(date(2024, 3, 1), 35_000.0, SaleType::New),
            warranty_loss,
            sale_on(date(2024, 3, 15), 8_000.0, SaleType::TradeIn),
            sale_on(date(2024, 4, 1), 50_000.0, SaleType::New),
            sale_on(date(2024, 2, 29), 50_000.0, SaleType::New),
        ];
        let spiffs = vec![
            spiff_on(date(2024, 3, 10), 150),
            spiff_on(date(2024, 3, 20), 50),
            spiff_on(date(2024, 4, 2), 1_000),
        ];

        let stats = monthly_stats(2024, 3, &sales, &spiffs).expect("stats");
        assert_eq!(stats.sale_count, 3);
        assert_eq!(stats.new_count, 1);
        assert_eq!(stats.used_count, 1);
        assert_eq!(stats.trade_in_count, 1);
        assert_eq!(stats.car_commission, 500 + 300 + 200);
        assert_eq!(stats.warranty_commission, -100);
        assert_eq!(stats.sales_commission, 900);
        assert_eq!(stats.spiff_count, 2);
        assert_eq!(stats.spiff_total, 200);
        assert_eq!(stats.total_earnings, 1_100);
        assert_eq!(stats.gross_sales, 55_000.0);
        assert_eq!(stats.average_commission, 300.0);
    }

    #[test]
    fn oversized_amounts_saturate_instead_of_overflowing() {
        let spiffs = vec![
            spiff_on(date(2024, 3, 1), i64::MAX),
            spiff_on(date(2024, 3, 2), 1),
        ];
        let mut huge = sale_on(date(2024, 3, 3), 40_000.0, SaleType::New);
        huge.entry.warranty_price = Some(1e300);
        huge.entry.warranty_cost = Some(1.0);
        let sales = vec![huge.clone(), huge];

        let stats = monthly_stats(2024, 3, &sales, &spiffs).expect("stats");
        assert_eq!(stats.spiff_count, 2);
        assert_eq!(stats.spiff_total, i64::MAX);
        assert_eq!(stats.total_earnings, i64::MAX);
        assert_eq!(stats.warranty_commission, 2_000_000_000_000_000);
    }

    #[test]
    fn empty_month_has_zero_average() {
        let stats = monthly_stats(2023, 7, &[], &[spiff_on(date(2023, 7, 4), 75)]).expect("stats");
        assert_eq!(stats.sale_count, 0);
        assert_eq!(stats.average_commission, 0.0);
        assert_eq!(stats.total_earnings, 75);
    }
}
