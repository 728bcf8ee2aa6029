//! Installment allocation and pass reconciliation.
//!
//! These functions are pure: no I/O, no clock, no errors of their own.
//! Callers validate inputs first (non-negative price, count bounds) and
//! persist the returned state afterwards. The workflow is always
//! "compute new state, then persist new state".

use std::collections::HashSet;

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{BoardingPass, PassInstallment, ProductInstallment};

/// One proposed installment row, before a plan is persisted.
///
/// Rows carry optional dates: a plan drafted without a window yet is a set of
/// placeholder rows with no dates and zero amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentRow {
    pub sequence_number: i32,
    pub starts_on: Option<NaiveDate>,
    pub ends_on: Option<NaiveDate>,
    pub amount: Decimal,
}

/// Split `price` into `count` rows over `[starts_on, ends_on]`.
///
/// Every row gets the largest cent-truncated equal share; the rounding
/// remainder is absorbed entirely by the last row, so the amounts always sum
/// to `price` exactly. The date span is divided uniformly by day count, with
/// the first row pinned to `starts_on` and the last row pinned to `ends_on`.
///
/// A missing or inverted date range yields `count` placeholder rows with no
/// dates and zero amounts. Sequence numbers are 1-based.
pub fn allocate(
    price: Decimal,
    count: u32,
    starts_on: Option<NaiveDate>,
    ends_on: Option<NaiveDate>,
) -> Vec<InstallmentRow> {
    if count == 0 {
        return Vec::new();
    }

    let window = match (starts_on, ends_on) {
        (Some(start), Some(end)) if start <= end => Some((start, end)),
        _ => None,
    };

    let Some((start, end)) = window else {
        return (1..=count as i32)
            .map(|sequence_number| InstallmentRow {
                sequence_number,
                starts_on: None,
                ends_on: None,
                amount: Decimal::ZERO,
            })
            .collect();
    };

    let amounts = split_amounts(price, count);
    let total_days = (end - start).num_days();

    (0..count as i64)
        .map(|i| {
            let row_start = if i == 0 {
                start
            } else {
                boundary(start, total_days, i, count as i64)
            };
            let row_end = if i == count as i64 - 1 {
                end
            } else {
                boundary(start, total_days, i + 1, count as i64)
            };

            InstallmentRow {
                sequence_number: i as i32 + 1,
                starts_on: Some(row_start),
                ends_on: Some(row_end),
                amount: amounts[i as usize],
            }
        })
        .collect()
}

/// Re-split `price` across the existing rows without touching their dates.
///
/// Used when staff edits the price after rows already carry custom dates.
pub fn redistribute(rows: &[InstallmentRow], price: Decimal) -> Vec<InstallmentRow> {
    if rows.is_empty() {
        return Vec::new();
    }

    let amounts = split_amounts(price, rows.len() as u32);

    rows.iter()
        .zip(amounts)
        .map(|(row, amount)| InstallmentRow {
            amount,
            ..row.clone()
        })
        .collect()
}

/// Apply a newly realized installment to a pass.
///
/// The three monetary fields each grow by the installment amount, the
/// validity end moves forward to the later of the current expiry and the
/// installment's end date (it never regresses), and the installment becomes
/// the active one. The caller must have filtered the sequence number through
/// [`available_rows`] first; this function trusts its input.
pub fn reconcile_after_add(pass: &BoardingPass, installment: &PassInstallment) -> BoardingPass {
    let mut updated = pass.clone();

    updated.amount += installment.amount;
    updated.amount_paid += installment.amount;
    updated.partial_payment_total += installment.amount;
    updated.valid_to = Some(match pass.valid_to {
        Some(current) => current.max(installment.ends_on),
        None => installment.ends_on,
    });
    updated.active_installment_id = Some(installment.installment_id);

    updated
}

/// Reverse a realized installment on a pass.
///
/// The three monetary fields shrink by the removed amount. The validity end
/// becomes the maximum end date among the remaining active installments in
/// `realized` (the removed one is ignored even if still present there); when
/// none remain it falls back to `baseline_valid_to`, which callers set to
/// `None` to clear or to a pre-partial-payment baseline to restore. If the
/// removed installment was the active one, the remaining installment with the
/// latest end date takes its place, higher sequence winning ties.
pub fn reconcile_after_remove(
    pass: &BoardingPass,
    realized: &[PassInstallment],
    removed: &PassInstallment,
    baseline_valid_to: Option<NaiveDate>,
) -> BoardingPass {
    let mut updated = pass.clone();

    updated.amount -= removed.amount;
    updated.amount_paid -= removed.amount;
    updated.partial_payment_total -= removed.amount;

    let top_remaining = realized
        .iter()
        .filter(|i| i.active && i.installment_id != removed.installment_id)
        .max_by_key(|i| (i.ends_on, i.sequence_number));

    updated.valid_to = top_remaining.map(|i| i.ends_on).or(baseline_valid_to);

    if pass.active_installment_id == Some(removed.installment_id) {
        updated.active_installment_id = top_remaining.map(|i| i.installment_id);
    }

    updated
}

/// Plan rows not yet realized on a pass: a set difference keyed by sequence
/// number, preserving plan order. Recomputed on every load.
pub fn available_rows(
    plan: &[ProductInstallment],
    realized: &[PassInstallment],
) -> Vec<ProductInstallment> {
    let taken: HashSet<i32> = realized.iter().map(|i| i.sequence_number).collect();

    plan.iter()
        .filter(|row| !taken.contains(&row.sequence_number))
        .cloned()
        .collect()
}

/// Largest cent amount `base` with `base * count <= price`, assigned to every
/// row; the last row additionally absorbs `price - base * count`.
fn split_amounts(price: Decimal, count: u32) -> Vec<Decimal> {
    let count_dec = Decimal::from(count);
    let base = (price / count_dec).trunc_with_scale(2);
    let remainder = price - base * count_dec;

    let mut amounts = vec![base; count as usize];
    if let Some(last) = amounts.last_mut() {
        *last += remainder;
    }
    amounts
}

/// Interior boundary `i` of a uniform `count`-way split of `total_days` days.
fn boundary(start: NaiveDate, total_days: i64, i: i64, count: i64) -> NaiveDate {
    let offset = (total_days * i / count).max(0) as u64;
    start
        .checked_add_days(Days::new(offset))
        .unwrap_or(start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn pass(valid_to: Option<NaiveDate>) -> BoardingPass {
        BoardingPass {
            pass_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            status: "partial".to_string(),
            amount: Decimal::ZERO,
            amount_paid: Decimal::ZERO,
            partial_payment_total: Decimal::ZERO,
            valid_from: Some(date(2025, 1, 1)),
            valid_to,
            partial_payments_enabled: true,
            active_installment_id: None,
            created_utc: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            updated_utc: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn realized(
        sequence_number: i32,
        amount: &str,
        ends_on: NaiveDate,
    ) -> PassInstallment {
        PassInstallment {
            installment_id: Uuid::new_v4(),
            pass_id: Uuid::new_v4(),
            sequence_number,
            amount: dec(amount),
            starts_on: date(2025, 1, 1),
            ends_on,
            active: true,
            created_utc: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn plan_row(sequence_number: i32, amount: &str) -> ProductInstallment {
        ProductInstallment {
            installment_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            sequence_number,
            starts_on: Some(date(2025, 1, 1)),
            ends_on: Some(date(2025, 2, 1)),
            amount: dec(amount),
            active: true,
            created_utc: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn amounts_always_sum_to_price() {
        let start = Some(date(2025, 1, 1));
        let end = Some(date(2025, 12, 31));

        for (price, count) in [
            ("1000", 3),
            ("999.99", 7),
            ("0.01", 2),
            ("1250.50", 12),
            ("100", 60),
        ] {
            let rows = allocate(dec(price), count, start, end);
            let total: Decimal = rows.iter().map(|r| r.amount).sum();
            assert_eq!(total, dec(price), "price={} count={}", price, count);
        }
    }

    #[test]
    fn last_row_absorbs_rounding_remainder() {
        let rows = allocate(
            dec("1000"),
            3,
            Some(date(2025, 1, 1)),
            Some(date(2025, 4, 1)),
        );

        let amounts: Vec<Decimal> = rows.iter().map(|r| r.amount).collect();
        assert_eq!(amounts, vec![dec("333.33"), dec("333.33"), dec("333.34")]);
    }

    #[test]
    fn zero_price_still_splits_dates() {
        let rows = allocate(
            Decimal::ZERO,
            4,
            Some(date(2025, 1, 1)),
            Some(date(2025, 5, 1)),
        );

        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.amount == Decimal::ZERO));
        assert_eq!(rows[0].starts_on, Some(date(2025, 1, 1)));
        assert_eq!(rows[3].ends_on, Some(date(2025, 5, 1)));
        assert!(rows.iter().all(|r| r.starts_on.is_some() && r.ends_on.is_some()));
    }

    #[test]
    fn boundaries_are_pinned_and_contiguous() {
        let start = date(2025, 1, 1);
        let end = date(2025, 12, 31);
        let rows = allocate(dec("600"), 5, Some(start), Some(end));

        assert_eq!(rows[0].starts_on, Some(start));
        assert_eq!(rows[4].ends_on, Some(end));
        for pair in rows.windows(2) {
            assert_eq!(pair[0].ends_on, pair[1].starts_on);
        }
        for row in &rows {
            assert!(row.starts_on <= row.ends_on);
        }
    }

    #[test]
    fn sequence_numbers_are_one_based_and_ordered() {
        let rows = allocate(
            dec("100"),
            4,
            Some(date(2025, 1, 1)),
            Some(date(2025, 2, 1)),
        );
        let sequences: Vec<i32> = rows.iter().map(|r| r.sequence_number).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4]);
    }

    #[test]
    fn missing_dates_yield_placeholder_rows() {
        let rows = allocate(dec("500"), 3, None, Some(date(2025, 6, 1)));

        assert_eq!(rows.len(), 3);
        for row in &rows {
            assert_eq!(row.starts_on, None);
            assert_eq!(row.ends_on, None);
            assert_eq!(row.amount, Decimal::ZERO);
        }
    }

    #[test]
    fn inverted_range_yields_placeholder_rows() {
        let rows = allocate(
            dec("500"),
            3,
            Some(date(2025, 6, 1)),
            Some(date(2025, 1, 1)),
        );

        assert!(rows.iter().all(|r| r.starts_on.is_none() && r.amount == Decimal::ZERO));
    }

    #[test]
    fn redistribute_updates_amounts_but_not_dates() {
        let rows = allocate(
            dec("300"),
            3,
            Some(date(2025, 1, 1)),
            Some(date(2025, 4, 1)),
        );
        let resplit = redistribute(&rows, dec("1000"));

        assert_eq!(resplit.len(), 3);
        for (before, after) in rows.iter().zip(&resplit) {
            assert_eq!(before.starts_on, after.starts_on);
            assert_eq!(before.ends_on, after.ends_on);
            assert_eq!(before.sequence_number, after.sequence_number);
        }
        let amounts: Vec<Decimal> = resplit.iter().map(|r| r.amount).collect();
        assert_eq!(amounts, vec![dec("333.33"), dec("333.33"), dec("333.34")]);
    }

    #[test]
    fn add_updates_totals_and_validity() {
        let pass = pass(None);
        let installment = realized(1, "500", date(2025, 3, 1));

        let updated = reconcile_after_add(&pass, &installment);

        assert_eq!(updated.amount, dec("500"));
        assert_eq!(updated.amount_paid, dec("500"));
        assert_eq!(updated.partial_payment_total, dec("500"));
        assert_eq!(updated.valid_to, Some(date(2025, 3, 1)));
        assert_eq!(
            updated.active_installment_id,
            Some(installment.installment_id)
        );
        // functional update: the original is untouched
        assert_eq!(pass.amount, Decimal::ZERO);
    }

    #[test]
    fn add_never_regresses_validity() {
        let pass = pass(Some(date(2025, 6, 1)));
        let earlier = realized(1, "100", date(2025, 2, 1));

        let updated = reconcile_after_add(&pass, &earlier);

        assert_eq!(updated.valid_to, Some(date(2025, 6, 1)));
    }

    #[test]
    fn add_then_remove_restores_numeric_state() {
        let original = pass(None);
        let installment = realized(1, "500", date(2025, 3, 1));

        let added = reconcile_after_add(&original, &installment);
        let removed =
            reconcile_after_remove(&added, &[installment.clone()], &installment, None);

        assert_eq!(removed.amount, original.amount);
        assert_eq!(removed.amount_paid, original.amount_paid);
        assert_eq!(removed.partial_payment_total, original.partial_payment_total);
        assert_eq!(removed.valid_to, None);
        assert_eq!(removed.active_installment_id, None);
    }

    #[test]
    fn remove_non_latest_keeps_validity() {
        let first = realized(1, "100", date(2025, 2, 1));
        let second = realized(2, "100", date(2025, 3, 1));
        let third = realized(3, "100", date(2025, 4, 1));
        let mut pass = pass(Some(date(2025, 4, 1)));
        pass.amount = dec("300");
        pass.amount_paid = dec("300");
        pass.partial_payment_total = dec("300");
        pass.active_installment_id = Some(third.installment_id);

        let all = vec![first.clone(), second.clone(), third.clone()];
        let updated = reconcile_after_remove(&pass, &all, &second, None);

        assert_eq!(updated.valid_to, Some(date(2025, 4, 1)));
        assert_eq!(updated.active_installment_id, Some(third.installment_id));
        assert_eq!(updated.amount, dec("200"));
    }

    #[test]
    fn remove_active_reselects_latest_remaining() {
        let first = realized(1, "100", date(2025, 2, 1));
        let second = realized(2, "100", date(2025, 3, 1));
        let mut pass = pass(Some(date(2025, 3, 1)));
        pass.active_installment_id = Some(second.installment_id);

        let all = vec![first.clone(), second.clone()];
        let updated = reconcile_after_remove(&pass, &all, &second, None);

        assert_eq!(updated.valid_to, Some(date(2025, 2, 1)));
        assert_eq!(updated.active_installment_id, Some(first.installment_id));
    }

    #[test]
    fn remove_ignores_inactive_remaining() {
        let mut dormant = realized(1, "100", date(2025, 5, 1));
        dormant.active = false;
        let active = realized(2, "100", date(2025, 3, 1));
        let pass = pass(Some(date(2025, 5, 1)));

        let all = vec![dormant, active.clone()];
        let updated = reconcile_after_remove(&pass, &all, &active, None);

        assert_eq!(updated.valid_to, None);
    }

    #[test]
    fn remove_last_falls_back_to_baseline_when_given() {
        let only = realized(1, "250", date(2025, 3, 1));
        let pass = pass(Some(date(2025, 3, 1)));

        let cleared = reconcile_after_remove(&pass, &[only.clone()], &only, None);
        assert_eq!(cleared.valid_to, None);

        let baseline = date(2024, 12, 31);
        let restored =
            reconcile_after_remove(&pass, &[only.clone()], &only, Some(baseline));
        assert_eq!(restored.valid_to, Some(baseline));
    }

    #[test]
    fn available_rows_is_a_set_difference_by_sequence() {
        let plan = vec![plan_row(1, "100"), plan_row(2, "100"), plan_row(3, "100")];
        let taken = vec![realized(2, "100", date(2025, 2, 1))];

        let available = available_rows(&plan, &taken);

        let sequences: Vec<i32> = available.iter().map(|r| r.sequence_number).collect();
        assert_eq!(sequences, vec![1, 3]);
    }

    #[test]
    fn available_rows_empty_when_plan_fully_realized() {
        let plan = vec![plan_row(1, "100"), plan_row(2, "100")];
        let taken = vec![
            realized(1, "100", date(2025, 2, 1)),
            realized(2, "100", date(2025, 3, 1)),
        ];

        assert!(available_rows(&plan, &taken).is_empty());
    }
}
