//! Daily order generation.
//!
//! Once per calendar day every Active, admin-approved subscription whose range
//! covers "today" gets one `Pending` daily order, and the subscriber's wallet is
//! debited the pro-rated daily amount. Each subscription is processed in its own
//! database transaction. The work before the commit is bounded by the
//! configured timeout; a failure or timeout rolls back that subscription only
//! and the run continues with the next one.
//!
//! Re-running for the same day is safe. An existing order for
//! `(subscription_id, date)` is detected before insert (and the unique index
//! rejects any that slip through), so no second order or debit happens.
//!
//! The date of the last run is kept in the `system_state` table, so a process
//! started after the scheduled time can tell whether today still needs a run.

use crate::{
    config::{DailyRatePolicy, Settings},
    core::{
        billing::daily_amount,
        subscription::{get_subscription, subscriptions_due_on},
        wallet::{self, LedgerEntry, LedgerEntryKind},
    },
    entities::{
        DailyOrder, SystemState, daily_order,
        daily_order::OrderStatus,
        system_state,
    },
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{
    DatabaseTransaction, Set, TransactionTrait, prelude::*, sea_query::OnConflict,
};
use tracing::{debug, info, instrument, warn};

const LAST_DAILY_GENERATION_KEY: &str = "last_daily_generation";

/// An order created by a generation run.
#[derive(Debug, Clone)]
pub struct GeneratedOrder {
    /// The new `Pending` order
    pub order: daily_order::Model,
    /// Subscriber whose wallet was debited
    pub user_id: i64,
    /// Amount debited
    pub amount_debited: f64,
    /// Wallet balance after the debit
    pub wallet_balance: f64,
}

/// A subscription that could not be processed.
#[derive(Debug, Clone)]
pub struct GenerationFailure {
    /// The subscription that was skipped
    pub subscription_id: i64,
    /// Rendered error
    pub message: String,
    /// Whether a later re-run may succeed (database error or timeout)
    pub retryable: bool,
}

impl GenerationFailure {
    fn new(subscription_id: i64, error: &Error) -> Self {
        Self {
            subscription_id,
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

/// Outcome of one generation run.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    /// Day orders were generated for
    pub date: NaiveDate,
    /// Orders created in this run
    pub created: Vec<GeneratedOrder>,
    /// Subscriptions that already had an order for the day
    pub already_generated: Vec<i64>,
    /// Subscriptions skipped because of an error
    pub failures: Vec<GenerationFailure>,
}

impl GenerationReport {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            created: Vec::new(),
            already_generated: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Number of due subscriptions seen by the run.
    #[must_use]
    pub fn subscriptions_considered(&self) -> usize {
        self.created.len() + self.already_generated.len() + self.failures.len()
    }

    /// Sum of all debits taken in the run.
    #[must_use]
    pub fn total_debited(&self) -> f64 {
        self.created.iter().map(|g| g.amount_debited).sum()
    }

    /// True when no subscription failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

enum SubscriptionOutcome {
    Created(GeneratedOrder),
    AlreadyGenerated,
}

/// Work done for one subscription, not yet committed.
enum StagedOrder {
    Ready(DatabaseTransaction, GeneratedOrder),
    AlreadyGenerated,
}

/// Day of the most recent generation run, if any run was recorded.
pub async fn get_last_generation_date<C>(db: &C) -> Result<Option<NaiveDate>>
where
    C: ConnectionTrait,
{
    let Some(state) = SystemState::find()
        .filter(system_state::Column::Key.eq(LAST_DAILY_GENERATION_KEY))
        .one(db)
        .await?
    else {
        return Ok(None);
    };

    state
        .value
        .parse::<NaiveDate>()
        .map(Some)
        .map_err(|e| Error::Config {
            message: format!("Stored {LAST_DAILY_GENERATION_KEY} '{}' is not a date: {e}", state.value),
        })
}

/// Whether no run has been recorded for `today` yet.
pub async fn is_daily_generation_needed<C>(db: &C, today: NaiveDate) -> Result<bool>
where
    C: ConnectionTrait,
{
    Ok(get_last_generation_date(db)
        .await?
        .is_none_or(|last| last < today))
}

/// Days strictly between the last run and `today` that never got a run.
#[must_use]
pub fn missed_days(last_run: Option<NaiveDate>, today: NaiveDate) -> Vec<NaiveDate> {
    last_run.map_or_else(Vec::new, |last| {
        last.iter_days()
            .skip(1)
            .take_while(|day| *day < today)
            .collect()
    })
}

async fn record_generation_date<C>(db: &C, date: NaiveDate) -> Result<()>
where
    C: ConnectionTrait,
{
    SystemState::insert(system_state::ActiveModel {
        key: Set(LAST_DAILY_GENERATION_KEY.to_string()),
        value: Set(date.to_string()),
        updated_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    })
    .on_conflict(
        OnConflict::column(system_state::Column::Key)
            .update_columns([system_state::Column::Value, system_state::Column::UpdatedAt])
            .to_owned(),
    )
    .exec(db)
    .await?;
    Ok(())
}

/// Inserts today's order for one subscription and debits the wallet inside an
/// open transaction. Nothing is visible until the caller commits; dropping the
/// returned transaction rolls everything back.
async fn stage_subscription_order(
    db: &DatabaseConnection,
    policy: DailyRatePolicy,
    subscription_id: i64,
    today: NaiveDate,
) -> Result<StagedOrder> {
    let txn = db.begin().await?;

    // Re-read inside the transaction so a concurrent extension is seen
    let subscription = get_subscription(&txn, subscription_id)
        .await?
        .ok_or_else(|| Error::not_found("Subscription", subscription_id))?;

    let existing = DailyOrder::find()
        .filter(daily_order::Column::SubscriptionId.eq(subscription_id))
        .filter(daily_order::Column::Date.eq(today))
        .one(&txn)
        .await?;
    if existing.is_some() {
        return Ok(StagedOrder::AlreadyGenerated);
    }

    // Checked before any write; a degenerate range leaves no trace
    let amount = daily_amount(policy, &subscription)?;

    let order = daily_order::ActiveModel {
        subscription_id: Set(subscription.id),
        vendor_id: Set(subscription.vendor_id),
        date: Set(today),
        status: Set(OrderStatus::Pending),
        reason: Set(None),
        extended_subscription: Set(false),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let updated_wallet = wallet::debit(
        &txn,
        subscription.user_id,
        amount,
        LedgerEntry::for_order(
            LedgerEntryKind::DailyDebit,
            order.id,
            format!("Daily charge for subscription {} on {today}", subscription.id),
        ),
    )
    .await?;

    Ok(StagedOrder::Ready(
        txn,
        GeneratedOrder {
            order,
            user_id: subscription.user_id,
            amount_debited: amount,
            wallet_balance: updated_wallet.amount,
        },
    ))
}

/// Runs one subscription under the time limit.
///
/// Only the staging is bounded: once the transaction is ready the commit runs
/// to completion, so a reported timeout always means nothing was written.
async fn generate_for_subscription(
    db: &DatabaseConnection,
    settings: &Settings,
    subscription_id: i64,
    today: NaiveDate,
) -> Result<SubscriptionOutcome> {
    let staged = tokio::time::timeout(
        settings.scheduler.transaction_timeout(),
        stage_subscription_order(db, settings.billing.daily_rate_policy, subscription_id, today),
    )
    .await
    .map_err(|_| Error::Timeout {
        seconds: settings.scheduler.transaction_timeout_secs,
    })??;

    match staged {
        StagedOrder::Ready(txn, generated) => {
            txn.commit().await?;
            Ok(SubscriptionOutcome::Created(generated))
        }
        StagedOrder::AlreadyGenerated => Ok(SubscriptionOutcome::AlreadyGenerated),
    }
}

/// Generates the daily orders for `today`.
///
/// Never aborts because of a single subscription: every due subscription ends
/// up in exactly one of the report's `created`, `already_generated` or
/// `failures` lists. Only a failure to list the due subscriptions is returned
/// as an error.
#[instrument(skip(db, settings))]
pub async fn generate_daily_orders(
    db: &DatabaseConnection,
    settings: &Settings,
    today: NaiveDate,
) -> Result<GenerationReport> {
    let due = subscriptions_due_on(db, today).await?;
    info!(count = due.len(), %today, "Generating daily orders");

    let mut report = GenerationReport::new(today);

    for subscription in due {
        let subscription_id = subscription.id;
        match generate_for_subscription(db, settings, subscription_id, today).await {
            Ok(SubscriptionOutcome::Created(generated)) => {
                debug!(
                    subscription_id,
                    order_id = generated.order.id,
                    amount = generated.amount_debited,
                    "Daily order created"
                );
                report.created.push(generated);
            }
            Ok(SubscriptionOutcome::AlreadyGenerated) => {
                debug!(subscription_id, "Daily order already exists, skipping");
                report.already_generated.push(subscription_id);
            }
            Err(e) => {
                warn!(subscription_id, error = %e, "Daily order generation failed");
                report.failures.push(GenerationFailure::new(subscription_id, &e));
            }
        }
    }

    if let Err(e) = record_generation_date(db, today).await {
        warn!(error = %e, "Failed to record last generation date");
    }

    info!(
        created = report.created.len(),
        already_generated = report.already_generated.len(),
        failed = report.failures.len(),
        "Daily order generation finished"
    );
    Ok(report)
}

/// Formats a generation report into a human-readable summary.
#[must_use]
pub fn format_generation_summary(report: &GenerationReport) -> String {
    use std::fmt::Write;

    let mut summary = format!(
        "Daily Orders - {} - {} subscriptions due\n",
        report.date.format("%Y-%m-%d"),
        report.subscriptions_considered()
    );

    // write! is infallible when writing to String
    let _ = writeln!(
        summary,
        "  Created: {} | Already generated: {} | Failed: {} | Debited: {:.2}",
        report.created.len(),
        report.already_generated.len(),
        report.failures.len(),
        report.total_debited()
    );

    for failure in &report.failures {
        let _ = writeln!(
            summary,
            "  Subscription {} failed{}: {}",
            failure.subscription_id,
            if failure.retryable { " (retryable)" } else { "" },
            failure.message
        );
    }

    summary
}
