//! Database configuration module.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs. The one constraint the entities cannot
//! express, a unique `(subscription_id, date)` pair on daily orders, is added as a
//! separate index.

use crate::entities::{
    Cart, DailyOrder, Payment, Subscription, SystemState, Wallet, WalletTransaction, daily_order,
};
use crate::errors::Result;
use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::info;

/// Used when neither `DATABASE_URL` nor the settings file name a database.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/tiffin_ledger.sqlite?mode=rwc";

/// Name of the unique index guarding one order per subscription per day
pub const DAILY_ORDER_UNIQUE_INDEX: &str = "idx_daily_orders_subscription_date";

/// Connects to the given database URL.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    info!("Connecting to database at {database_url}");
    Database::connect(database_url).await.map_err(Into::into)
}

async fn create_table_for<E>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

/// Creates all tables (if missing) plus the daily-order uniqueness index.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    create_table_for(db, &schema, Subscription).await?;
    create_table_for(db, &schema, DailyOrder).await?;
    create_table_for(db, &schema, Wallet).await?;
    create_table_for(db, &schema, WalletTransaction).await?;
    create_table_for(db, &schema, Payment).await?;
    create_table_for(db, &schema, Cart).await?;
    create_table_for(db, &schema, SystemState).await?;

    let unique_order_per_day = Index::create()
        .name(DAILY_ORDER_UNIQUE_INDEX)
        .table(DailyOrder)
        .col(daily_order::Column::SubscriptionId)
        .col(daily_order::Column::Date)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&unique_order_per_day)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::{daily_order::OrderStatus, subscription::SubscriptionStatus};
    use chrono::NaiveDate;
    use sea_orm::{ActiveModelTrait, QuerySelect, Set};

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        let _ = Subscription::find().limit(1).all(&db).await?;
        let _ = DailyOrder::find().limit(1).all(&db).await?;
        let _ = Wallet::find().limit(1).all(&db).await?;
        let _ = WalletTransaction::find().limit(1).all(&db).await?;
        let _ = Payment::find().limit(1).all(&db).await?;
        let _ = Cart::find().limit(1).all(&db).await?;
        let _ = SystemState::find().limit(1).all(&db).await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_idempotent() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_unique_index_rejects_duplicate_order_day() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let subscription = crate::entities::subscription::ActiveModel {
            user_id: Set(1),
            vendor_id: Set(2),
            menu_type: Set("veg".to_string()),
            meal_types: Set("Lunch".to_string()),
            start_date: Set(date),
            end_date: Set(date),
            original_total_days: Set(0),
            amount: Set(100.0),
            payment_id: Set(None),
            status: Set(SubscriptionStatus::Active),
            is_admin_approved: Set(true),
            ..Default::default()
        }
        .insert(&db)
        .await?;

        let order = || daily_order::ActiveModel {
            subscription_id: Set(subscription.id),
            vendor_id: Set(2),
            date: Set(date),
            status: Set(OrderStatus::Pending),
            reason: Set(None),
            extended_subscription: Set(false),
            ..Default::default()
        };

        order().insert(&db).await?;
        assert!(order().insert(&db).await.is_err());

        Ok(())
    }
}
