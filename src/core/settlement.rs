//! Daily order settlement.
//!
//! A vendor moves one of its own `Pending` orders to `Accepted`, `Rejected` or
//! `Skipped`. Accepting only records the status. Rejecting or skipping also
//! refunds the daily amount to the subscriber's wallet, extends the
//! subscription by one day and flags the order as having extended it.
//!
//! The status change is a compare-and-swap on `status = Pending` inside the
//! same database transaction as the refund and extension, so either all four
//! effects happen or none do, and a repeated or concurrent call cannot refund
//! twice.

use crate::{
    config::DailyRatePolicy,
    core::{
        billing::daily_amount,
        subscription::{extend_by_one_day, get_subscription},
        wallet::{self, LedgerEntry, LedgerEntryKind},
    },
    entities::{DailyOrder, daily_order, daily_order::OrderStatus},
    errors::{Error, Result},
};
use sea_orm::{Set, TransactionTrait, prelude::*};
use std::str::FromStr;
use tracing::{info, instrument};

/// A vendor's decision on a pending order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementAction {
    /// Will deliver
    Accept,
    /// Refuses the order; refunded and compensated
    Reject,
    /// Skips the day; refunded and compensated
    Skip,
}

impl SettlementAction {
    /// Status the order ends up in.
    #[must_use]
    pub const fn target_status(self) -> OrderStatus {
        match self {
            Self::Accept => OrderStatus::Accepted,
            Self::Reject => OrderStatus::Rejected,
            Self::Skip => OrderStatus::Skipped,
        }
    }

    /// Whether the subscriber is refunded and the subscription extended.
    #[must_use]
    pub const fn compensates(self) -> bool {
        matches!(self, Self::Reject | Self::Skip)
    }
}

impl FromStr for SettlementAction {
    type Err = Error;

    /// Accepts the status names `Accepted`, `Rejected` and `Skipped`.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Accepted" => Ok(Self::Accept),
            "Rejected" => Ok(Self::Reject),
            "Skipped" => Ok(Self::Skip),
            other => Err(Error::InvalidStatus {
                status: other.to_string(),
            }),
        }
    }
}

/// Applies a vendor's decision to one of its orders.
///
/// # Errors
/// - [`Error::NotFound`] if the order does not exist or belongs to another vendor
/// - [`Error::InvalidTransition`] if the order is no longer `Pending`
/// - [`Error::DegenerateRange`] if the refund amount cannot be computed
/// - database errors; in every error case nothing is changed
#[instrument(skip(db, reason))]
pub async fn settle_order(
    db: &DatabaseConnection,
    policy: DailyRatePolicy,
    vendor_id: i64,
    order_id: i64,
    action: SettlementAction,
    reason: Option<String>,
) -> Result<daily_order::Model> {
    let txn = db.begin().await?;

    let order = DailyOrder::find_by_id(order_id)
        .filter(daily_order::Column::VendorId.eq(vendor_id))
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("DailyOrder", order_id))?;

    if order.status.is_terminal() {
        return Err(Error::invalid_transition(format!(
            "Order {order_id} is already {:?}",
            order.status
        )));
    }

    // Compare-and-swap: only a Pending row is updated
    let swapped = DailyOrder::update_many()
        .set(daily_order::ActiveModel {
            status: Set(action.target_status()),
            reason: Set(reason),
            ..Default::default()
        })
        .filter(daily_order::Column::Id.eq(order_id))
        .filter(daily_order::Column::Status.eq(OrderStatus::Pending))
        .exec(&txn)
        .await?;
    if swapped.rows_affected != 1 {
        return Err(Error::invalid_transition(format!(
            "Order {order_id} was settled concurrently"
        )));
    }

    if action.compensates() {
        let subscription = get_subscription(&txn, order.subscription_id)
            .await?
            .ok_or_else(|| Error::not_found("Subscription", order.subscription_id))?;

        // Same formula as the debit taken at generation time
        let refund = daily_amount(policy, &subscription)?;

        wallet::credit(
            &txn,
            subscription.user_id,
            refund,
            LedgerEntry::for_order(
                LedgerEntryKind::RefundCredit,
                order_id,
                format!("Refund for order {order_id} on {}", order.date),
            ),
        )
        .await?;

        extend_by_one_day(&txn, subscription.id).await?;

        DailyOrder::update_many()
            .set(daily_order::ActiveModel {
                extended_subscription: Set(true),
                ..Default::default()
            })
            .filter(daily_order::Column::Id.eq(order_id))
            .exec(&txn)
            .await?;

        info!(
            order_id,
            subscription_id = subscription.id,
            refund,
            "Order compensated with refund and one-day extension"
        );
    }

    let settled = DailyOrder::find_by_id(order_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("DailyOrder", order_id))?;

    txn.commit().await?;
    info!(order_id, status = ?settled.status, "Order settled");
    Ok(settled)
}

/// Boundary form of [`settle_order`] taking the raw status string.
///
/// The status is validated before anything is read or written.
pub async fn update_order_status(
    db: &DatabaseConnection,
    policy: DailyRatePolicy,
    vendor_id: i64,
    order_id: i64,
    status: &str,
    reason: Option<String>,
) -> Result<daily_order::Model> {
    let action = SettlementAction::from_str(status)?;
    settle_order(db, policy, vendor_id, order_id, action, reason).await
}
