//! Subscription entity - A user's paid commitment to receive meals from one vendor
//! over an inclusive calendar date range.
//!
//! A subscription is created once, when its payment is approved. Daily orders are
//! only generated for it after an admin sets `is_admin_approved`. The end date only
//! ever moves forward, one day per rejected or skipped order.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum SubscriptionStatus {
    /// Eligible for daily order generation (subject to admin approval)
    #[sea_orm(string_value = "Active")]
    Active,
    /// Finished or switched off; never generates orders
    #[sea_orm(string_value = "Inactive")]
    Inactive,
}

/// Subscription database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subscriptions")]
pub struct Model {
    /// Unique identifier for the subscription
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Subscriber
    pub user_id: i64,
    /// Vendor delivering the meals
    pub vendor_id: i64,
    /// Vendor menu the user picked (e.g. "veg")
    pub menu_type: String,
    /// Canonical comma-separated meal slots, see [`crate::core::meal::MealType`]
    pub meal_types: String,
    /// First day of service
    pub start_date: Date,
    /// Last day of service, pushed forward by extensions
    pub end_date: Date,
    /// `end_date - start_date` in days at creation time
    pub original_total_days: i64,
    /// Total price paid for the full plan
    pub amount: f64,
    /// Human-readable id of the payment that created this subscription
    #[sea_orm(unique)]
    pub payment_id: Option<String>,
    /// Active or Inactive
    pub status: SubscriptionStatus,
    /// Second approval gate, required before daily orders are generated
    pub is_admin_approved: bool,
}

/// Defines relationships between Subscription and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One subscription has many daily orders
    #[sea_orm(has_many = "super::daily_order::Entity")]
    DailyOrders,
}

impl Related<super::daily_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DailyOrders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
