//! Wallet transaction entity - Append-only ledger of wallet balance changes.
//!
//! Each row is written in the same database transaction as the balance update it
//! describes, so the sum of `amount` over a wallet equals its balance.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Why the balance changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum LedgerEntryKind {
    /// Approved payment credited in full
    #[sea_orm(string_value = "payment_credit")]
    PaymentCredit,
    /// Pro-rated charge when a daily order is generated
    #[sea_orm(string_value = "daily_debit")]
    DailyDebit,
    /// Pro-rated refund when a daily order is rejected or skipped
    #[sea_orm(string_value = "refund_credit")]
    RefundCredit,
}

/// Wallet transaction database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "wallet_transactions")]
pub struct Model {
    /// Unique identifier for the entry
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Wallet whose balance changed
    pub wallet_id: i64,
    /// Wallet owner, denormalised for per-user queries
    pub user_id: i64,
    /// Signed change (positive credit, negative debit)
    pub amount: f64,
    /// Category of the change
    pub kind: LedgerEntryKind,
    /// Daily order that caused the change, if any
    pub daily_order_id: Option<i64>,
    /// Human-readable description
    pub description: String,
    /// When the entry was written
    pub timestamp: DateTimeUtc,
}

/// Defines relationships between `WalletTransaction` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each entry belongs to one wallet
    #[sea_orm(
        belongs_to = "super::wallet::Entity",
        from = "Column::WalletId",
        to = "super::wallet::Column::Id"
    )]
    Wallet,
}

impl Related<super::wallet::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Wallet.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
