//! Pure pricing math shared by the quoting and invoicing paths.

use chrono::{Datelike, NaiveDate};

use crate::billing::{BillingCycle, LineItem};

pub fn line_total(item: &LineItem) -> f64 {
    item.qty * item.unit_price
}

pub fn subtotal(items: &[LineItem]) -> f64 {
    items.iter().map(line_total).sum()
}

pub fn tax_total(items: &[LineItem]) -> f64 {
    items
        .iter()
        .map(|item| line_total(item) * item.tax_rate / 100.0)
        .sum()
}

pub fn total(items: &[LineItem]) -> f64 {
    subtotal(items) + tax_total(items)
}

/// Recomputes every stored `line_total` and returns
/// `(subtotal, tax_total, total)`. The only path by which persisted totals
/// are produced.
pub fn price_line_items(items: &mut [LineItem]) -> (f64, f64, f64) {
    for item in items.iter_mut() {
        item.line_total = line_total(item);
    }
    (subtotal(items), tax_total(items), total(items))
}

/// A credit may drain an invoice to zero but never below it.
pub fn credited_total(current_total: f64, amount: f64) -> f64 {
    (current_total - amount).max(0.0)
}

/// Advances one billing cycle and always lands on the 1st of the resulting
/// month, never the original day-of-month.
pub fn next_billing_date(start: NaiveDate, cycle: BillingCycle) -> NaiveDate {
    let months = match cycle {
        BillingCycle::Monthly => 1,
        BillingCycle::Quarterly => 3,
        BillingCycle::Yearly => 12,
    };
    let absolute = start.year() * 12 + start.month0() as i32 + months;
    let year = absolute.div_euclid(12);
    let month = absolute.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn item(qty: f64, unit_price: f64, tax_rate: f64) -> LineItem {
        LineItem {
            id: Uuid::new_v4(),
            item_type: None,
            item_id: None,
            description: "test item".to_string(),
            qty,
            unit_price,
            tax_rate,
            line_total: 0.0,
        }
    }

    #[test]
    fn line_total_ignores_tax_rate() {
        assert_eq!(line_total(&item(3.0, 40.0, 10.0)), 120.0);
        assert_eq!(line_total(&item(3.0, 40.0, 0.0)), 120.0);
    }

    #[test]
    fn totals_sum_across_items() {
        let mut items = vec![item(2.0, 50.0, 10.0), item(1.0, 200.0, 0.0)];
        let (sub, tax, tot) = price_line_items(&mut items);
        assert_eq!(sub, 300.0);
        assert_eq!(tax, 10.0);
        assert_eq!(tot, 310.0);
        assert_eq!(items[0].line_total, 100.0);
        assert_eq!(items[1].line_total, 200.0);
    }

    #[test]
    fn pricing_recomputes_stale_line_totals() {
        let mut stale = item(4.0, 25.0, 0.0);
        stale.line_total = 999.0;
        let mut items = vec![stale];
        let (sub, _, _) = price_line_items(&mut items);
        assert_eq!(items[0].line_total, 100.0);
        assert_eq!(sub, 100.0);
    }

    #[test]
    fn credited_total_clamps_at_zero() {
        assert_eq!(credited_total(100.0, 30.0), 70.0);
        assert_eq!(credited_total(100.0, 150.0), 0.0);
        assert_eq!(credited_total(0.0, 1.0), 0.0);
    }

    #[test]
    fn next_billing_date_snaps_to_first_of_month() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 17).unwrap();
        assert_eq!(
            next_billing_date(start, BillingCycle::Monthly),
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()
        );
        assert_eq!(
            next_billing_date(start, BillingCycle::Quarterly),
            NaiveDate::from_ymd_opt(2026, 4, 1).unwrap()
        );
        assert_eq!(
            next_billing_date(start, BillingCycle::Yearly),
            NaiveDate::from_ymd_opt(2027, 1, 1).unwrap()
        );
    }

    #[test]
    fn next_billing_date_rolls_over_year_end() {
        let start = NaiveDate::from_ymd_opt(2026, 11, 30).unwrap();
        assert_eq!(
            next_billing_date(start, BillingCycle::Quarterly),
            NaiveDate::from_ymd_opt(2027, 2, 1).unwrap()
        );
        assert_eq!(
            next_billing_date(start, BillingCycle::Monthly),
            NaiveDate::from_ymd_opt(2026, 12, 1).unwrap()
        );
    }
}
