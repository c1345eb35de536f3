//! Read-side views over subscriptions and daily orders.
//!
//! This module provides the vendor's list of orders for a day and the
//! subscription detail view with order history and extension count. All
//! functions return structured data; [`format_subscription_details`] renders
//! the detail view as text.

use crate::{
    core::{billing::days_between, subscription::get_subscription},
    entities::{DailyOrder, daily_order, daily_order::OrderStatus, subscription},
    errors::{Error, Result},
};
use chrono::{Days, NaiveDate};
use sea_orm::{QueryOrder, prelude::*};

/// An order together with the subscription it was generated from.
#[derive(Debug, Clone)]
pub struct VendorOrder {
    /// The daily order
    pub order: daily_order::Model,
    /// Its subscription, if it still exists
    pub subscription: Option<subscription::Model>,
}

/// A vendor's orders dated `day`, oldest first.
pub async fn vendor_daily_orders(
    db: &DatabaseConnection,
    vendor_id: i64,
    day: NaiveDate,
) -> Result<Vec<VendorOrder>> {
    let rows = DailyOrder::find()
        .filter(daily_order::Column::VendorId.eq(vendor_id))
        .filter(daily_order::Column::Date.eq(day))
        .order_by_asc(daily_order::Column::Id)
        .find_also_related(subscription::Entity)
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(order, subscription)| VendorOrder {
            order,
            subscription,
        })
        .collect())
}

/// One line of a subscription's order history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderHistoryEntry {
    /// Delivery day
    pub date: NaiveDate,
    /// Settlement state
    pub status: OrderStatus,
    /// Vendor reason, empty if none
    pub reason: String,
    /// Whether this order extended the subscription
    pub extended: bool,
}

/// Detail view of a subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionDetails {
    /// The subscription row
    pub subscription: subscription::Model,
    /// Display code of the user, e.g. `USER001`
    pub user_code: String,
    /// Display code of the vendor, e.g. `VEND001`
    pub vendor_code: String,
    /// Days in the current (adjusted) range, `end - start`
    pub duration_days: i64,
    /// Start of the originally purchased range
    pub original_start: NaiveDate,
    /// End of the originally purchased range: current end minus extended days.
    /// Ranges are inclusive, so no extra day is subtracted.
    pub original_end: NaiveDate,
    /// Current end date
    pub adjusted_end: NaiveDate,
    /// Number of orders that extended the subscription
    pub extended_days: u64,
    /// Orders newest first
    pub history: Vec<OrderHistoryEntry>,
}

/// Formats an id as a zero-padded display code.
#[must_use]
pub fn display_code(prefix: &str, id: i64) -> String {
    format!("{prefix}{id:03}")
}

/// Builds the detail view of a subscription.
///
/// # Errors
/// [`Error::NotFound`] if the subscription does not exist.
pub async fn subscription_details(
    db: &DatabaseConnection,
    subscription_id: i64,
) -> Result<SubscriptionDetails> {
    let subscription = get_subscription(db, subscription_id)
        .await?
        .ok_or_else(|| Error::not_found("Subscription", subscription_id))?;

    let orders = DailyOrder::find()
        .filter(daily_order::Column::SubscriptionId.eq(subscription_id))
        .order_by_desc(daily_order::Column::Date)
        .all(db)
        .await?;

    let extended_days = orders.iter().filter(|o| o.extended_subscription).count() as u64;
    let original_end = subscription
        .end_date
        .checked_sub_days(Days::new(extended_days))
        .unwrap_or(subscription.start_date);

    let history = orders
        .into_iter()
        .map(|o| OrderHistoryEntry {
            date: o.date,
            status: o.status,
            reason: o.reason.unwrap_or_default(),
            extended: o.extended_subscription,
        })
        .collect();

    Ok(SubscriptionDetails {
        user_code: display_code("USER", subscription.user_id),
        vendor_code: display_code("VEND", subscription.vendor_id),
        duration_days: days_between(subscription.start_date, subscription.end_date),
        original_start: subscription.start_date,
        original_end,
        adjusted_end: subscription.end_date,
        extended_days,
        history,
        subscription,
    })
}

/// Renders a detail view as plain text.
#[must_use]
pub fn format_subscription_details(details: &SubscriptionDetails) -> String {
    use std::fmt::Write;

    let mut out = format!(
        "Subscription {} - {} with {}\n",
        details.subscription.id, details.user_code, details.vendor_code
    );

    // write! is infallible when writing to String
    let _ = writeln!(
        out,
        "  Duration: {} days | Amount paid: {:.2}",
        details.duration_days, details.subscription.amount
    );
    let _ = writeln!(
        out,
        "  Original: {} → {}",
        details.original_start, details.original_end
    );
    let extension = if details.extended_days > 0 {
        format!(" (+{} days)", details.extended_days)
    } else {
        String::new()
    };
    let _ = writeln!(
        out,
        "  Adjusted: {} → {}{}",
        details.original_start, details.adjusted_end, extension
    );

    for entry in &details.history {
        let _ = writeln!(
            out,
            "  {} {:?}{}{}",
            entry.date,
            entry.status,
            if entry.reason.is_empty() {
                String::new()
            } else {
                format!(" - {}", entry.reason)
            },
            if entry.extended { " [extended]" } else { "" }
        );
    }

    out
}
