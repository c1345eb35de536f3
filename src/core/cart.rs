//! Cart snapshot helpers.
//!
//! Carts are owned by the storefront; the ledger only records the snapshot a
//! payment is made against and reads back the most recent one per user.

use crate::{
    core::meal::normalize_meal_types,
    entities::{Cart, cart},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, prelude::*};

/// Fields of a new cart row.
#[derive(Debug, Clone)]
pub struct NewCart {
    /// Cart owner
    pub user_id: i64,
    /// Vendor the cart is for
    pub vendor_id: i64,
    /// Vendor menu chosen
    pub menu_type: String,
    /// Comma-separated meal slots in any order or case
    pub meal_types: String,
    /// Plan name, must match a configured plan when the payment is approved
    pub plan_type: String,
    /// Price of the full plan
    pub total_price: f64,
}

/// Validates and stores a cart snapshot.
pub async fn record_cart(db: &DatabaseConnection, new_cart: NewCart) -> Result<cart::Model> {
    if !new_cart.total_price.is_finite() || new_cart.total_price <= 0.0 {
        return Err(Error::InvalidAmount {
            amount: new_cart.total_price,
        });
    }
    if new_cart.plan_type.trim().is_empty() {
        return Err(Error::Config {
            message: "Cart plan type cannot be empty".to_string(),
        });
    }
    let meal_types = normalize_meal_types(&new_cart.meal_types)?;

    cart::ActiveModel {
        user_id: Set(new_cart.user_id),
        vendor_id: Set(new_cart.vendor_id),
        menu_type: Set(new_cart.menu_type),
        meal_types: Set(meal_types),
        plan_type: Set(new_cart.plan_type.trim().to_string()),
        total_price: Set(new_cart.total_price),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// The most recently created cart row of a user.
pub async fn latest_cart_for_user<C>(db: &C, user_id: i64) -> Result<Option<cart::Model>>
where
    C: ConnectionTrait,
{
    Cart::find()
        .filter(cart::Column::UserId.eq(user_id))
        .order_by_desc(cart::Column::Id)
        .one(db)
        .await
        .map_err(Into::into)
}
