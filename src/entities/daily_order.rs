//! Daily order entity - One day's delivery obligation derived from a subscription.
//!
//! Orders start `Pending` and move exactly once to `Accepted`, `Rejected` or
//! `Skipped` when the vendor acts on them. At most one order exists per
//! `(subscription_id, date)`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Settlement state of a daily order
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum OrderStatus {
    /// Generated, waiting for the vendor
    #[sea_orm(string_value = "Pending")]
    Pending,
    /// Vendor will deliver
    #[sea_orm(string_value = "Accepted")]
    Accepted,
    /// Vendor refused the order
    #[sea_orm(string_value = "Rejected")]
    Rejected,
    /// Vendor skipped the day
    #[sea_orm(string_value = "Skipped")]
    Skipped,
}

impl OrderStatus {
    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Daily order database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "daily_orders")]
pub struct Model {
    /// Unique identifier for the order
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Subscription this order was generated from
    pub subscription_id: i64,
    /// Copied from the subscription so vendors can query their own orders
    pub vendor_id: i64,
    /// Delivery day
    pub date: Date,
    /// Current settlement state
    pub status: OrderStatus,
    /// Vendor-supplied reason for a rejection or skip
    pub reason: Option<String>,
    /// True iff settling this order pushed the subscription end date by one day
    pub extended_subscription: bool,
}

/// Defines relationships between `DailyOrder` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each order belongs to one subscription
    #[sea_orm(
        belongs_to = "super::subscription::Entity",
        from = "Column::SubscriptionId",
        to = "super::subscription::Column::Id"
    )]
    Subscription,
}

impl Related<super::subscription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscription.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
