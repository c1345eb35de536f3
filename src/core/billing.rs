//! Daily rate calculation.
//!
//! Both the daily debit and the refund on a rejected or skipped order use
//! [`daily_amount`], so the two always agree for a given subscription state.

use crate::{
    config::DailyRatePolicy,
    entities::subscription,
    errors::{Error, Result},
};
use chrono::NaiveDate;

/// Whole days between two dates (`end - start`), negative if `end < start`.
#[must_use]
pub fn days_between(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days()
}

/// Number of days the subscription amount is spread over under `policy`.
#[must_use]
pub fn billable_days(policy: DailyRatePolicy, subscription: &subscription::Model) -> i64 {
    match policy {
        DailyRatePolicy::FixedOriginalRate => subscription.original_total_days,
        DailyRatePolicy::RecomputeFromCurrentRange => {
            days_between(subscription.start_date, subscription.end_date)
        }
    }
}

/// Pro-rated per-day amount of a subscription.
///
/// # Errors
/// Returns [`Error::DegenerateRange`] when the billable day count is zero or
/// negative, e.g. a subscription whose start and end date are the same day.
#[allow(clippy::cast_precision_loss)]
pub fn daily_amount(policy: DailyRatePolicy, subscription: &subscription::Model) -> Result<f64> {
    let days = billable_days(policy, subscription);
    if days <= 0 {
        return Err(Error::DegenerateRange {
            subscription_id: subscription.id,
            start_date: subscription.start_date,
            end_date: subscription.end_date,
        });
    }
    Ok(subscription.amount / days as f64)
}
