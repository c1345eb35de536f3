//! Cart entity - Snapshot of what a user intends to subscribe to.
//!
//! The latest row per user is consumed when a payment is approved.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Cart database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "carts")]
pub struct Model {
    /// Unique identifier; higher means more recent
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Cart owner
    pub user_id: i64,
    /// Vendor the cart was built against
    pub vendor_id: i64,
    /// Vendor menu chosen
    pub menu_type: String,
    /// Canonical comma-separated meal slots
    pub meal_types: String,
    /// Plan name, e.g. `15days` or `30days`
    pub plan_type: String,
    /// Price of the full plan
    pub total_price: f64,
}

/// Carts have no relationships managed by the ledger
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
