//! Subscription business logic.
//!
//! Owns creation (from an approved payment), the admin approval gate, the
//! one-day extension used by order settlement, and the expiry sweep. The date
//! range is inclusive and `start_date <= end_date` holds for every stored row;
//! `end_date` is never moved backwards.

use crate::{
    config::Settings,
    core::{billing::days_between, cart::latest_cart_for_user, meal::normalize_meal_types},
    entities::{
        Subscription, payment,
        payment::PaymentStatus,
        subscription::{self, SubscriptionStatus},
    },
    errors::{Error, Result},
};
use chrono::{Days, NaiveDate};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use tracing::{info, instrument};

/// Fields of a new subscription.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    /// Subscriber
    pub user_id: i64,
    /// Delivering vendor
    pub vendor_id: i64,
    /// Vendor menu
    pub menu_type: String,
    /// Comma-separated meal slots
    pub meal_types: String,
    /// First day of service
    pub start_date: NaiveDate,
    /// Last day of service (inclusive)
    pub end_date: NaiveDate,
    /// Total price of the plan
    pub amount: f64,
    /// Payment that paid for it, if any
    pub payment_id: Option<String>,
}

/// Validates and inserts a subscription.
///
/// New subscriptions are `Active` but not admin-approved, so no daily orders
/// are generated for them until [`approve_subscription`] is called.
pub async fn create_subscription<C>(db: &C, new_subscription: NewSubscription) -> Result<subscription::Model>
where
    C: ConnectionTrait,
{
    if !new_subscription.amount.is_finite() || new_subscription.amount <= 0.0 {
        return Err(Error::InvalidAmount {
            amount: new_subscription.amount,
        });
    }
    if new_subscription.start_date > new_subscription.end_date {
        return Err(Error::InvalidDateRange {
            start_date: new_subscription.start_date,
            end_date: new_subscription.end_date,
        });
    }
    let meal_types = normalize_meal_types(&new_subscription.meal_types)?;

    subscription::ActiveModel {
        user_id: Set(new_subscription.user_id),
        vendor_id: Set(new_subscription.vendor_id),
        menu_type: Set(new_subscription.menu_type),
        meal_types: Set(meal_types),
        start_date: Set(new_subscription.start_date),
        end_date: Set(new_subscription.end_date),
        original_total_days: Set(days_between(
            new_subscription.start_date,
            new_subscription.end_date,
        )),
        amount: Set(new_subscription.amount),
        payment_id: Set(new_subscription.payment_id),
        status: Set(SubscriptionStatus::Active),
        is_admin_approved: Set(false),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Creates the subscription paid for by a completed payment.
///
/// Uses the user's most recent cart: `start_date = today`,
/// `end_date = today + plan days`, `amount = cart.total_price`.
///
/// # Errors
/// - [`Error::InvalidTransition`] if the payment is not `Completed`
/// - [`Error::EmptyCart`] if the user has no cart
/// - [`Error::UnknownPlan`] if the cart's plan is not configured
pub async fn create_from_approved_payment<C>(
    db: &C,
    settings: &Settings,
    approved_payment: &payment::Model,
    today: NaiveDate,
) -> Result<subscription::Model>
where
    C: ConnectionTrait,
{
    if approved_payment.status != PaymentStatus::Completed {
        return Err(Error::invalid_transition(format!(
            "Payment {} is not completed",
            approved_payment.payment_id
        )));
    }

    let cart = latest_cart_for_user(db, approved_payment.user_id)
        .await?
        .ok_or(Error::EmptyCart {
            user_id: approved_payment.user_id,
        })?;

    let plan_days = settings.plan_days(&cart.plan_type)?;
    let end_date = today
        .checked_add_days(Days::new(u64::from(plan_days)))
        .ok_or_else(|| Error::Config {
            message: format!("End date overflow for plan {}", cart.plan_type),
        })?;

    create_subscription(
        db,
        NewSubscription {
            user_id: approved_payment.user_id,
            vendor_id: cart.vendor_id,
            menu_type: cart.menu_type,
            meal_types: cart.meal_types,
            start_date: today,
            end_date,
            amount: cart.total_price,
            payment_id: Some(approved_payment.payment_id.clone()),
        },
    )
    .await
}

/// Finds a subscription by id.
pub async fn get_subscription<C>(db: &C, subscription_id: i64) -> Result<Option<subscription::Model>>
where
    C: ConnectionTrait,
{
    Subscription::find_by_id(subscription_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// All subscriptions of a user, newest first.
pub async fn subscriptions_for_user(
    db: &DatabaseConnection,
    user_id: i64,
) -> Result<Vec<subscription::Model>> {
    Subscription::find()
        .filter(subscription::Column::UserId.eq(user_id))
        .order_by_desc(subscription::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Flips `is_admin_approved` from `!approved` to `approved`, or fails.
async fn set_admin_approval(
    db: &DatabaseConnection,
    subscription_id: i64,
    approved: bool,
) -> Result<subscription::Model> {
    let txn = db.begin().await?;

    // Compare-and-swap on the current flag value
    let result = Subscription::update_many()
        .set(subscription::ActiveModel {
            is_admin_approved: Set(approved),
            ..Default::default()
        })
        .filter(subscription::Column::Id.eq(subscription_id))
        .filter(subscription::Column::IsAdminApproved.eq(!approved))
        .exec(&txn)
        .await?;

    let current = get_subscription(&txn, subscription_id)
        .await?
        .ok_or_else(|| Error::not_found("Subscription", subscription_id))?;

    if result.rows_affected == 0 {
        let state = if approved { "approved" } else { "unapproved" };
        return Err(Error::invalid_transition(format!(
            "Subscription {subscription_id} is already {state}"
        )));
    }

    txn.commit().await?;
    info!(subscription_id, approved, "Subscription admin approval changed");
    Ok(current)
}

/// Sets the admin approval gate.
///
/// # Errors
/// [`Error::InvalidTransition`] if the subscription is already approved.
#[instrument(skip(db))]
pub async fn approve_subscription(
    db: &DatabaseConnection,
    subscription_id: i64,
) -> Result<subscription::Model> {
    set_admin_approval(db, subscription_id, true).await
}

/// Clears the admin approval gate.
///
/// # Errors
/// [`Error::InvalidTransition`] if the subscription is not approved.
#[instrument(skip(db))]
pub async fn reject_subscription(
    db: &DatabaseConnection,
    subscription_id: i64,
) -> Result<subscription::Model> {
    set_admin_approval(db, subscription_id, false).await
}

/// Pushes the end date forward by exactly one calendar day.
///
/// Meant to run inside the settlement transaction of a rejected or skipped order.
/// An `Inactive` subscription is switched back to `Active`. If the new end date
/// is still in the past, the next [`expire_finished_subscriptions`] sweep marks it
/// `Inactive` again, and it is never due in between.
pub async fn extend_by_one_day<C>(db: &C, subscription_id: i64) -> Result<subscription::Model>
where
    C: ConnectionTrait,
{
    let current = get_subscription(db, subscription_id)
        .await?
        .ok_or_else(|| Error::not_found("Subscription", subscription_id))?;

    let new_end = current
        .end_date
        .checked_add_days(Days::new(1))
        .ok_or_else(|| Error::invalid_transition("Subscription end date cannot be extended"))?;

    let was_expired = current.status == SubscriptionStatus::Inactive;
    let mut active_model: subscription::ActiveModel = current.into();
    active_model.end_date = Set(new_end);
    if was_expired {
        // Expired by the sweep before the compensating day was granted
        active_model.status = Set(SubscriptionStatus::Active);
    }
    active_model.update(db).await.map_err(Into::into)
}

/// Active, approved subscriptions whose range covers `date`.
pub async fn subscriptions_due_on<C>(db: &C, date: NaiveDate) -> Result<Vec<subscription::Model>>
where
    C: ConnectionTrait,
{
    Subscription::find()
        .filter(subscription::Column::Status.eq(SubscriptionStatus::Active))
        .filter(subscription::Column::IsAdminApproved.eq(true))
        .filter(subscription::Column::StartDate.lte(date))
        .filter(subscription::Column::EndDate.gte(date))
        .order_by_asc(subscription::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Marks Active subscriptions that ended before `today` as Inactive.
///
/// Returns the number of subscriptions expired.
pub async fn expire_finished_subscriptions(db: &DatabaseConnection, today: NaiveDate) -> Result<u64> {
    let result = Subscription::update_many()
        .set(subscription::ActiveModel {
            status: Set(SubscriptionStatus::Inactive),
            ..Default::default()
        })
        .filter(subscription::Column::Status.eq(SubscriptionStatus::Active))
        .filter(subscription::Column::EndDate.lt(today))
        .exec(db)
        .await?;

    if result.rows_affected > 0 {
        info!(count = result.rows_affected, %today, "Expired finished subscriptions");
    }
    Ok(result.rows_affected)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_create_subscription_validation() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        let mut new_sub = test_new_subscription(1, 2, date(2024, 1, 10), date(2024, 1, 1), 100.0);
        let result = create_subscription(&db, new_sub.clone()).await;
        assert!(matches!(
            result,
            Err(Error::InvalidDateRange { start_date, end_date })
                if start_date == date(2024, 1, 10) && end_date == date(2024, 1, 1)
        ));
        assert!(!result.unwrap_err().is_retryable());

        new_sub.end_date = date(2024, 1, 31);
        new_sub.amount = -1.0;
        let result = create_subscription(&db, new_sub).await;
        assert!(matches!(result, Err(Error::InvalidAmount { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_new_subscription_awaits_admin_approval() -> Result<()> {
        let db = setup_test_db().await?;
        let sub = create_subscription(
            &db,
            test_new_subscription(1, 2, date(2024, 1, 1), date(2024, 1, 31), 1500.0),
        )
        .await?;

        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert!(!sub.is_admin_approved);
        assert_eq!(sub.original_total_days, 30);
        assert!(subscriptions_due_on(&db, date(2024, 1, 5)).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_approve_twice_is_a_conflict() -> Result<()> {
        let db = setup_test_db().await?;
        let sub = create_subscription(
            &db,
            test_new_subscription(1, 2, date(2024, 1, 1), date(2024, 1, 31), 1500.0),
        )
        .await?;

        let approved = approve_subscription(&db, sub.id).await?;
        assert!(approved.is_admin_approved);

        let again = approve_subscription(&db, sub.id).await;
        assert!(matches!(again, Err(Error::InvalidTransition { .. })));
        assert!(get_subscription(&db, sub.id).await?.unwrap().is_admin_approved);

        Ok(())
    }

    #[tokio::test]
    async fn test_reject_requires_approved() -> Result<()> {
        let db = setup_test_db().await?;
        let sub = create_subscription(
            &db,
            test_new_subscription(1, 2, date(2024, 1, 1), date(2024, 1, 31), 1500.0),
        )
        .await?;

        let result = reject_subscription(&db, sub.id).await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));

        approve_subscription(&db, sub.id).await?;
        let rejected = reject_subscription(&db, sub.id).await?;
        assert!(!rejected.is_admin_approved);

        Ok(())
    }

    #[tokio::test]
    async fn test_approve_unknown_subscription() -> Result<()> {
        let db = setup_test_db().await?;
        let result = approve_subscription(&db, 404).await;
        assert!(matches!(
            result,
            Err(Error::NotFound {
                entity: "Subscription",
                ..
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_extend_by_one_day_moves_end_forward() -> Result<()> {
        let db = setup_test_db().await?;
        let sub = create_test_subscription(&db, 1, 2, date(2024, 1, 1), date(2024, 1, 31), 1500.0)
            .await?;

        let extended = extend_by_one_day(&db, sub.id).await?;
        assert_eq!(extended.end_date, date(2024, 2, 1));
        assert_eq!(extended.start_date, sub.start_date);
        assert_eq!(extended.amount, 1500.0);
        assert_eq!(extended.original_total_days, 30);

        let extended = extend_by_one_day(&db, sub.id).await?;
        assert_eq!(extended.end_date, date(2024, 2, 2));

        Ok(())
    }

    #[tokio::test]
    async fn test_extension_reactivates_expired_subscription() -> Result<()> {
        let db = setup_test_db().await?;
        let sub = create_test_subscription(&db, 1, 2, date(2024, 1, 1), date(2024, 1, 31), 1500.0)
            .await?;
        expire_finished_subscriptions(&db, date(2024, 2, 1)).await?;

        let extended = extend_by_one_day(&db, sub.id).await?;
        assert_eq!(extended.status, SubscriptionStatus::Active);
        assert_eq!(extended.end_date, date(2024, 2, 1));
        assert_eq!(subscriptions_due_on(&db, date(2024, 2, 1)).await?.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_late_extension_of_long_expired_subscription_expires_again() -> Result<()> {
        let db = setup_test_db().await?;
        let sub = create_test_subscription(&db, 1, 2, date(2024, 1, 1), date(2024, 1, 31), 1500.0)
            .await?;
        expire_finished_subscriptions(&db, date(2024, 3, 1)).await?;

        // Settled weeks late: the extra day lies before "today"
        let extended = extend_by_one_day(&db, sub.id).await?;
        assert_eq!(extended.end_date, date(2024, 2, 1));
        assert!(subscriptions_due_on(&db, date(2024, 3, 1)).await?.is_empty());

        assert_eq!(expire_finished_subscriptions(&db, date(2024, 3, 1)).await?, 1);
        let swept = get_subscription(&db, sub.id).await?.unwrap();
        assert_eq!(swept.status, SubscriptionStatus::Inactive);
        assert_eq!(swept.end_date, date(2024, 2, 1));

        Ok(())
    }

    #[tokio::test]
    async fn test_subscriptions_due_on_respects_range_and_gates() -> Result<()> {
        let db = setup_test_db().await?;
        let due = create_test_subscription(&db, 1, 2, date(2024, 1, 1), date(2024, 1, 31), 1500.0)
            .await?;
        // Starts later
        create_test_subscription(&db, 2, 2, date(2024, 1, 10), date(2024, 2, 9), 1500.0).await?;
        // Unapproved
        create_subscription(
            &db,
            test_new_subscription(3, 2, date(2024, 1, 1), date(2024, 1, 31), 1500.0),
        )
        .await?;
        // Ends on the day itself, still due
        let last_day =
            create_test_subscription(&db, 4, 2, date(2023, 12, 6), date(2024, 1, 5), 900.0).await?;

        let ids: Vec<i64> = subscriptions_due_on(&db, date(2024, 1, 5))
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![due.id, last_day.id]);

        Ok(())
    }

    #[tokio::test]
    async fn test_expire_finished_subscriptions() -> Result<()> {
        let db = setup_test_db().await?;
        let finished =
            create_test_subscription(&db, 1, 2, date(2024, 1, 1), date(2024, 1, 15), 800.0).await?;
        let running =
            create_test_subscription(&db, 2, 2, date(2024, 1, 1), date(2024, 1, 31), 1500.0).await?;

        let expired = expire_finished_subscriptions(&db, date(2024, 1, 16)).await?;
        assert_eq!(expired, 1);

        let finished = get_subscription(&db, finished.id).await?.unwrap();
        let running = get_subscription(&db, running.id).await?.unwrap();
        assert_eq!(finished.status, SubscriptionStatus::Inactive);
        assert_eq!(running.status, SubscriptionStatus::Active);

        // Second sweep finds nothing new
        assert_eq!(expire_finished_subscriptions(&db, date(2024, 1, 16)).await?, 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_create_from_approved_payment_uses_latest_cart() -> Result<()> {
        let db = setup_test_db().await?;
        let settings = Settings::default();
        crate::core::cart::record_cart(&db, test_cart(5, 9, "30days", 1000.0)).await?;
        crate::core::cart::record_cart(&db, test_cart(5, 8, "15days", 750.0)).await?;

        let paid = completed_payment(5, 750.0, "PAY007");
        let sub = create_from_approved_payment(&db, &settings, &paid, date(2024, 3, 1)).await?;

        assert_eq!(sub.vendor_id, 8);
        assert_eq!(sub.start_date, date(2024, 3, 1));
        assert_eq!(sub.end_date, date(2024, 3, 16));
        assert_eq!(sub.original_total_days, 15);
        assert_eq!(sub.amount, 750.0);
        assert_eq!(sub.payment_id.as_deref(), Some("PAY007"));
        assert!(!sub.is_admin_approved);

        Ok(())
    }

    #[tokio::test]
    async fn test_create_from_approved_payment_requires_cart() -> Result<()> {
        let db = setup_test_db().await?;
        let paid = completed_payment(5, 750.0, "PAY001");
        let result =
            create_from_approved_payment(&db, &Settings::default(), &paid, date(2024, 3, 1)).await;
        assert!(matches!(result, Err(Error::EmptyCart { user_id: 5 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_from_pending_payment_is_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        let mut pending = completed_payment(5, 750.0, "PAY001");
        pending.status = PaymentStatus::Pending;
        let result =
            create_from_approved_payment(&db, &Settings::default(), &pending, date(2024, 3, 1))
                .await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));
        Ok(())
    }
}
