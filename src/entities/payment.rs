//! Payment entity - A manual receipt awaiting admin review.
//!
//! Only `amount` and the transition to `Completed` matter to the ledger: approval
//! credits the wallet and creates the subscription.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Review status of a payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum PaymentStatus {
    /// Uploaded, waiting for an admin
    #[sea_orm(string_value = "Pending")]
    Pending,
    /// Approved; wallet credited and subscription created
    #[sea_orm(string_value = "Completed")]
    Completed,
    /// Refused by an admin
    #[sea_orm(string_value = "Rejected")]
    Rejected,
}

/// Payment database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    /// Unique identifier for the payment
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Human-readable sequence id such as `PAY001`
    #[sea_orm(unique)]
    pub payment_id: String,
    /// Paying user
    pub user_id: i64,
    /// Vendor taken from the user's latest cart
    pub vendor_id: i64,
    /// Amount paid
    pub amount: f64,
    /// Payment method as reported by the user (e.g. "UPI")
    pub method: String,
    /// Review status
    pub status: PaymentStatus,
    /// When the receipt was submitted
    pub created_at: DateTimeUtc,
}

/// Payments have no relationships managed by the ledger
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
