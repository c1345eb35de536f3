//! Unified error type for the subscription ledger.
//!
//! Every fallible operation in the crate returns [`Result`]. Validation,
//! not-found and conflict errors are raised before any mutation; database and
//! timeout errors abort the enclosing transaction, which rolls back.

use chrono::NaiveDate;
use thiserror::Error;

/// All errors produced by the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying `SeaORM` / database failure
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Invalid configuration or malformed input that is not a more specific variant
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },

    /// Monetary amount was zero, negative or not finite
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: f64,
    },

    /// Status value not accepted by the requested operation
    #[error("Invalid status: {status}")]
    InvalidStatus {
        /// The rejected status string
        status: String,
    },

    /// A referenced record does not exist (or is not visible to the caller)
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record, e.g. `"Subscription"`
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// The record is not in a state that permits the requested change
    #[error("Invalid transition: {message}")]
    InvalidTransition {
        /// Description of the rejected transition
        message: String,
    },

    /// The user has no cart to build a subscription or payment from
    #[error("Cart is empty for user {user_id}")]
    EmptyCart {
        /// The user without a cart
        user_id: i64,
    },

    /// The cart references a plan that is not configured
    #[error("Unknown plan type: {plan}")]
    UnknownPlan {
        /// The unrecognised plan name
        plan: String,
    },

    /// A meal slot name could not be parsed
    #[error("Invalid meal type: {value}")]
    InvalidMealType {
        /// The unrecognised meal slot
        value: String,
    },

    /// A subscription's date range yields zero (or negative) billable days
    #[error(
        "Subscription {subscription_id} has a degenerate date range {start_date}..{end_date}"
    )]
    DegenerateRange {
        /// Offending subscription
        subscription_id: i64,
        /// Subscription start date
        start_date: NaiveDate,
        /// Subscription end date
        end_date: NaiveDate,
    },

    /// A date range was given with its start after its end
    #[error("Start date {start_date} is after end date {end_date}")]
    InvalidDateRange {
        /// Requested start date
        start_date: NaiveDate,
        /// Requested end date
        end_date: NaiveDate,
    },

    /// A transaction did not finish within the configured time limit
    #[error("Operation timed out after {seconds}s")]
    Timeout {
        /// The configured limit in seconds
        seconds: u64,
    },

    /// I/O error while preparing the data directory
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a [`Error::NotFound`] for the given entity kind and id.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Creates a [`Error::InvalidTransition`] with the given message.
    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::InvalidTransition {
            message: message.into(),
        }
    }

    /// Whether the failure was transactional and the same call may succeed on retry.
    ///
    /// Validation, not-found and conflict errors are final.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Timeout { .. })
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Timeout { seconds: 5 }.is_retryable());
        assert!(Error::Database(sea_orm::DbErr::Custom("boom".to_string())).is_retryable());
        assert!(!Error::not_found("Subscription", 7).is_retryable());
        assert!(!Error::invalid_transition("already approved").is_retryable());
        assert!(
            !Error::InvalidStatus {
                status: "Done".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            Error::not_found("DailyOrder", 42).to_string(),
            "DailyOrder not found: 42"
        );
        let err = Error::DegenerateRange {
            subscription_id: 3,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap_or_default(),
        };
        assert_eq!(
            err.to_string(),
            "Subscription 3 has a degenerate date range 2024-01-05..2024-01-05"
        );
    }
}
