//! Wallet ledger business logic.
//!
//! Wallets hold a signed per-user balance. Every change goes through [`credit`]
//! or [`debit`], which update the balance with a single atomic SQL expression
//! and append a `wallet_transactions` row in the same database transaction.
//! There is no idempotency key: callers must invoke these at most once per
//! logical event, normally by running them inside the transaction that records
//! that event. No balance floor is enforced.

use crate::{
    entities::{Wallet, WalletTransaction, wallet, wallet_transaction},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use tracing::debug;

pub use crate::entities::wallet_transaction::LedgerEntryKind;

/// Describes why a wallet balance changes; becomes a ledger row.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    /// Category of the change
    pub kind: LedgerEntryKind,
    /// Daily order that caused the change, if any
    pub daily_order_id: Option<i64>,
    /// Human-readable description
    pub description: String,
}

impl LedgerEntry {
    /// Creates an entry not tied to a daily order.
    pub fn new(kind: LedgerEntryKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            daily_order_id: None,
            description: description.into(),
        }
    }

    /// Creates an entry caused by the given daily order.
    pub fn for_order(kind: LedgerEntryKind, daily_order_id: i64, description: impl Into<String>) -> Self {
        Self {
            kind,
            daily_order_id: Some(daily_order_id),
            description: description.into(),
        }
    }
}

fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::InvalidAmount { amount });
    }
    Ok(())
}

/// Finds the wallet of a user, if one has been created.
pub async fn get_wallet_for_user<C>(db: &C, user_id: i64) -> Result<Option<wallet::Model>>
where
    C: ConnectionTrait,
{
    Wallet::find()
        .filter(wallet::Column::UserId.eq(user_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Returns the user's wallet, creating an empty one if none exists yet.
pub async fn get_or_create_wallet<C>(db: &C, user_id: i64) -> Result<wallet::Model>
where
    C: ConnectionTrait,
{
    if let Some(existing) = get_wallet_for_user(db, user_id).await? {
        return Ok(existing);
    }

    debug!(user_id, "Creating wallet");
    let new_wallet = wallet::ActiveModel {
        user_id: Set(user_id),
        amount: Set(0.0),
        ..Default::default()
    };
    new_wallet.insert(db).await.map_err(Into::into)
}

/// Adds `delta` to the balance and records the ledger row, inside a (nested) transaction.
async fn apply_delta<C>(db: &C, user_id: i64, delta: f64, entry: LedgerEntry) -> Result<wallet::Model>
where
    C: ConnectionTrait + TransactionTrait,
{
    use sea_orm::sea_query::Expr;

    let txn = db.begin().await?;

    let target = get_or_create_wallet(&txn, user_id).await?;

    // Atomic update: amount = amount + delta
    Wallet::update_many()
        .col_expr(
            wallet::Column::Amount,
            Expr::col(wallet::Column::Amount).add(delta),
        )
        .filter(wallet::Column::Id.eq(target.id))
        .exec(&txn)
        .await?;

    wallet_transaction::ActiveModel {
        wallet_id: Set(target.id),
        user_id: Set(user_id),
        amount: Set(delta),
        kind: Set(entry.kind),
        daily_order_id: Set(entry.daily_order_id),
        description: Set(entry.description),
        timestamp: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let updated = Wallet::find_by_id(target.id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("Wallet", target.id))?;

    txn.commit().await?;

    debug!(user_id, delta, balance = updated.amount, "Wallet balance changed");
    Ok(updated)
}

/// Credits a positive `amount` to the user's wallet.
///
/// # Errors
/// [`Error::InvalidAmount`] if `amount` is not a positive finite number; any
/// database error aborts the change.
pub async fn credit<C>(db: &C, user_id: i64, amount: f64, entry: LedgerEntry) -> Result<wallet::Model>
where
    C: ConnectionTrait + TransactionTrait,
{
    validate_amount(amount)?;
    apply_delta(db, user_id, amount, entry).await
}

/// Debits a positive `amount` from the user's wallet. The balance may go negative.
///
/// # Errors
/// [`Error::InvalidAmount`] if `amount` is not a positive finite number; any
/// database error aborts the change.
pub async fn debit<C>(db: &C, user_id: i64, amount: f64, entry: LedgerEntry) -> Result<wallet::Model>
where
    C: ConnectionTrait + TransactionTrait,
{
    validate_amount(amount)?;
    apply_delta(db, user_id, -amount, entry).await
}

/// Current balance; a user without a wallet has a balance of zero.
pub async fn wallet_balance(db: &DatabaseConnection, user_id: i64) -> Result<f64> {
    Ok(get_wallet_for_user(db, user_id)
        .await?
        .map_or(0.0, |w| w.amount))
}

/// Ledger rows of a user, newest first.
pub async fn wallet_history(
    db: &DatabaseConnection,
    user_id: i64,
) -> Result<Vec<wallet_transaction::Model>> {
    WalletTransaction::find()
        .filter(wallet_transaction::Column::UserId.eq(user_id))
        .order_by_desc(wallet_transaction::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}
