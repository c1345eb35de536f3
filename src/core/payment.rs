//! Payment approval gate.
//!
//! Users submit a payment receipt against their latest cart; an admin then
//! approves or rejects it. Approval is one transaction: the payment becomes
//! `Completed`, the full amount is credited to the user's wallet, and a
//! subscription is created from the latest cart. If any step fails (no cart,
//! unknown plan, database error) the payment stays `Pending`.

use crate::{
    config::Settings,
    core::{
        cart::latest_cart_for_user,
        subscription::create_from_approved_payment,
        wallet::{self, LedgerEntry, LedgerEntryKind},
    },
    entities::{Payment, payment, payment::PaymentStatus, subscription},
    errors::{Error, Result},
};
use chrono::NaiveDate;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use std::str::FromStr;
use tracing::{info, instrument};

/// Admin decision on a pending payment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentDecision {
    /// Credit the wallet and create the subscription
    Approved,
    /// Mark the payment rejected
    Rejected,
}

impl FromStr for PaymentDecision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Approved" => Ok(Self::Approved),
            "Rejected" => Ok(Self::Rejected),
            other => Err(Error::InvalidStatus {
                status: other.to_string(),
            }),
        }
    }
}

/// Result of reviewing a payment.
#[derive(Debug, Clone)]
pub struct PaymentReview {
    /// The payment after review
    pub payment: payment::Model,
    /// Subscription created on approval
    pub subscription: Option<subscription::Model>,
}

/// Formats the n-th payment id, e.g. `PAY001`.
#[must_use]
pub fn format_payment_id(sequence: i64) -> String {
    format!("PAY{sequence:03}")
}

/// Records a pending payment against the user's latest cart.
///
/// # Errors
/// [`Error::InvalidAmount`] for a non-positive amount, [`Error::EmptyCart`] if
/// the user has no cart.
#[instrument(skip(db))]
pub async fn submit_payment(
    db: &DatabaseConnection,
    user_id: i64,
    amount: f64,
    method: &str,
) -> Result<payment::Model> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::InvalidAmount { amount });
    }
    if method.trim().is_empty() {
        return Err(Error::Config {
            message: "Payment method cannot be empty".to_string(),
        });
    }

    let txn = db.begin().await?;

    let cart = latest_cart_for_user(&txn, user_id)
        .await?
        .ok_or(Error::EmptyCart { user_id })?;

    let last_id = Payment::find()
        .order_by_desc(payment::Column::Id)
        .one(&txn)
        .await?
        .map_or(0, |p| p.id);

    let created = payment::ActiveModel {
        payment_id: Set(format_payment_id(last_id + 1)),
        user_id: Set(user_id),
        vendor_id: Set(cart.vendor_id),
        amount: Set(amount),
        method: Set(method.trim().to_string()),
        status: Set(PaymentStatus::Pending),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    info!(payment_id = %created.payment_id, user_id, amount, "Payment submitted");
    Ok(created)
}

/// Finds a payment by its human-readable id, case-insensitively.
pub async fn get_payment<C>(db: &C, payment_id: &str) -> Result<Option<payment::Model>>
where
    C: ConnectionTrait,
{
    Payment::find()
        .filter(payment::Column::PaymentId.eq(payment_id.to_uppercase()))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Applies an admin decision to a pending payment.
///
/// `decision` must be `"Approved"` or `"Rejected"`; it is validated before any
/// database access. `today` becomes the start date of the new subscription.
///
/// # Errors
/// - [`Error::InvalidStatus`] for any other decision
/// - [`Error::NotFound`] if no `Pending` payment has this id
/// - [`Error::EmptyCart`] / [`Error::UnknownPlan`] on approval; the payment stays `Pending`
#[instrument(skip(db, settings))]
pub async fn review_payment(
    db: &DatabaseConnection,
    settings: &Settings,
    payment_id: &str,
    decision: &str,
    today: NaiveDate,
) -> Result<PaymentReview> {
    let decision = PaymentDecision::from_str(decision)?;

    let txn = db.begin().await?;

    let pending = get_payment(&txn, payment_id)
        .await?
        .filter(|p| p.status == PaymentStatus::Pending)
        .ok_or_else(|| Error::not_found("Pending payment", payment_id.to_uppercase()))?;

    let new_status = match decision {
        PaymentDecision::Approved => PaymentStatus::Completed,
        PaymentDecision::Rejected => PaymentStatus::Rejected,
    };
    let mut active_model: payment::ActiveModel = pending.into();
    active_model.status = Set(new_status);
    let reviewed = active_model.update(&txn).await?;

    let subscription = if decision == PaymentDecision::Approved {
        wallet::credit(
            &txn,
            reviewed.user_id,
            reviewed.amount,
            LedgerEntry::new(
                LedgerEntryKind::PaymentCredit,
                format!("Payment {}", reviewed.payment_id),
            ),
        )
        .await?;

        Some(create_from_approved_payment(&txn, settings, &reviewed, today).await?)
    } else {
        None
    };

    txn.commit().await?;
    info!(
        payment_id = %reviewed.payment_id,
        status = ?reviewed.status,
        subscription_id = subscription.as_ref().map(|s| s.id),
        "Payment reviewed"
    );

    Ok(PaymentReview {
        payment: reviewed,
        subscription,
    })
}
