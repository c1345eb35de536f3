//! Shared test utilities.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults.
#![allow(clippy::unwrap_used)]

use crate::{
    core::{
        cart::NewCart,
        subscription::{self, NewSubscription},
        wallet::{self, LedgerEntry, LedgerEntryKind},
    },
    entities::{self, daily_order::OrderStatus, payment::PaymentStatus},
    errors::Result,
};
use chrono::NaiveDate;
use sea_orm::{ActiveModelTrait, ConnectOptions, DatabaseConnection, Set};

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
///
/// The pool holds a single connection: every in-memory connection is its own
/// database, and a test holding an open transaction blocks all other work.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let db = sea_orm::Database::connect(options).await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Shorthand for a calendar date.
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Subscription fields with defaults for menu and meals.
///
/// # Defaults
/// * `menu_type`: "veg"
/// * `meal_types`: "Lunch"
/// * `payment_id`: None
pub fn test_new_subscription(
    user_id: i64,
    vendor_id: i64,
    start_date: NaiveDate,
    end_date: NaiveDate,
    amount: f64,
) -> NewSubscription {
    NewSubscription {
        user_id,
        vendor_id,
        menu_type: "veg".to_string(),
        meal_types: "Lunch".to_string(),
        start_date,
        end_date,
        amount,
        payment_id: None,
    }
}

/// Creates an Active subscription and passes the admin approval gate,
/// so it is picked up by daily order generation.
pub async fn create_test_subscription(
    db: &DatabaseConnection,
    user_id: i64,
    vendor_id: i64,
    start_date: NaiveDate,
    end_date: NaiveDate,
    amount: f64,
) -> Result<entities::subscription::Model> {
    let created = subscription::create_subscription(
        db,
        test_new_subscription(user_id, vendor_id, start_date, end_date, amount),
    )
    .await?;
    subscription::approve_subscription(db, created.id).await
}

/// Cart fields for the given plan.
///
/// # Defaults
/// * `menu_type`: "veg"
/// * `meal_types`: "dinner,lunch" (normalised to "Lunch,Dinner" on insert)
pub fn test_cart(user_id: i64, vendor_id: i64, plan_type: &str, total_price: f64) -> NewCart {
    NewCart {
        user_id,
        vendor_id,
        menu_type: "veg".to_string(),
        meal_types: "dinner,lunch".to_string(),
        plan_type: plan_type.to_string(),
        total_price,
    }
}

/// Credits a wallet as if a payment had been approved.
pub async fn fund_wallet(
    db: &DatabaseConnection,
    user_id: i64,
    amount: f64,
) -> Result<entities::wallet::Model> {
    wallet::credit(
        db,
        user_id,
        amount,
        LedgerEntry::new(LedgerEntryKind::PaymentCredit, "Test funding"),
    )
    .await
}

/// An unsaved completed payment model.
pub fn completed_payment(user_id: i64, amount: f64, payment_id: &str) -> entities::payment::Model {
    entities::payment::Model {
        id: 1,
        payment_id: payment_id.to_string(),
        user_id,
        vendor_id: 0,
        amount,
        method: "UPI".to_string(),
        status: PaymentStatus::Completed,
        created_at: chrono::Utc::now(),
    }
}

/// Inserts a pending order directly, bypassing the generator and its debit.
pub async fn insert_pending_order(
    db: &DatabaseConnection,
    subscription: &entities::subscription::Model,
    day: NaiveDate,
) -> Result<entities::daily_order::Model> {
    entities::daily_order::ActiveModel {
        subscription_id: Set(subscription.id),
        vendor_id: Set(subscription.vendor_id),
        date: Set(day),
        status: Set(OrderStatus::Pending),
        reason: Set(None),
        extended_subscription: Set(false),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}
