//! Application settings loaded from `config.toml`.
//!
//! The file is optional: any section or key left out falls back to the
//! defaults below, and a missing file yields [`Settings::default`]. The
//! settings control when the daily run fires, which timezone "today" is
//! computed in, how the daily subscription rate is derived, and how many days
//! each purchasable plan lasts.

use crate::errors::{Error, Result};
use chrono::FixedOffset;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Default location of the settings file
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level structure of `config.toml`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Database URL; `DATABASE_URL` in the environment takes precedence
    pub database_url: Option<String>,
    /// Daily run schedule and timezone
    pub scheduler: SchedulerSettings,
    /// Pro-rating behaviour for daily debits and refunds
    pub billing: BillingSettings,
    /// Purchasable plans and their durations
    pub plans: Vec<PlanConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: None,
            scheduler: SchedulerSettings::default(),
            billing: BillingSettings::default(),
            plans: vec![
                PlanConfig {
                    name: "15days".to_string(),
                    days: 15,
                },
                PlanConfig {
                    name: "30days".to_string(),
                    days: 30,
                },
            ],
        }
    }
}

/// When the daily generation runs, and in which fixed UTC offset.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Hour of day (0-23) at which the run fires
    pub run_hour: u32,
    /// Minute of the hour (0-59) at which the run fires
    pub run_minute: u32,
    /// Offset from UTC in minutes used for "today" (330 = India Standard Time)
    pub utc_offset_minutes: i32,
    /// Upper bound for a single per-subscription generation transaction
    pub transaction_timeout_secs: u64,
    /// Mark subscriptions past their end date Inactive after each run
    pub expire_finished_subscriptions: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            run_hour: 0,
            run_minute: 0,
            utc_offset_minutes: 330,
            transaction_timeout_secs: 30,
            expire_finished_subscriptions: true,
        }
    }
}

impl SchedulerSettings {
    /// Returns the configured offset as a chrono [`FixedOffset`].
    pub fn offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| Error::Config {
            message: format!("UTC offset out of range: {} minutes", self.utc_offset_minutes),
        })
    }

    /// Returns the per-transaction timeout.
    #[must_use]
    pub const fn transaction_timeout(&self) -> Duration {
        Duration::from_secs(self.transaction_timeout_secs)
    }
}

/// How the per-day amount of a subscription is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DailyRatePolicy {
    /// `amount / original_total_days`, fixed when the subscription was created
    FixedOriginalRate,
    /// `amount / (end_date - start_date)` using the current, possibly extended, end date
    #[default]
    RecomputeFromCurrentRange,
}

/// Billing behaviour
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct BillingSettings {
    /// Policy used for both daily debits and refunds
    pub daily_rate_policy: DailyRatePolicy,
}

/// A purchasable plan, e.g. `15days` lasting 15 days
#[derive(Debug, Clone, Deserialize)]
pub struct PlanConfig {
    /// Plan name as stored on cart rows
    pub name: String,
    /// Number of days added to the start date to get the end date
    pub days: u32,
}

impl Settings {
    /// Looks up the duration of a plan by name.
    pub fn plan_days(&self, plan: &str) -> Result<u32> {
        self.plans
            .iter()
            .find(|p| p.name == plan)
            .map(|p| p.days)
            .ok_or_else(|| Error::UnknownPlan {
                plan: plan.to_string(),
            })
    }

    /// Checks value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.run_hour > 23 || self.scheduler.run_minute > 59 {
            return Err(Error::Config {
                message: format!(
                    "Invalid run time {:02}:{:02}",
                    self.scheduler.run_hour, self.scheduler.run_minute
                ),
            });
        }
        self.scheduler.offset()?;

        if self.scheduler.transaction_timeout_secs == 0 {
            return Err(Error::Config {
                message: "transaction_timeout_secs must be positive".to_string(),
            });
        }

        for (i, plan) in self.plans.iter().enumerate() {
            if plan.days == 0 {
                return Err(Error::Config {
                    message: format!("Plan '{}' must last at least one day", plan.name),
                });
            }
            if self.plans[..i].iter().any(|p| p.name == plan.name) {
                return Err(Error::Config {
                    message: format!("Duplicate plan '{}'", plan.name),
                });
            }
        }

        Ok(())
    }

    /// Resolves the database URL: environment first, then the file, then the default path.
    #[must_use]
    pub fn resolve_database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .ok()
            .or_else(|| self.database_url.clone())
            .unwrap_or_else(|| crate::config::database::DEFAULT_DATABASE_URL.to_string())
    }
}

/// Parses settings from a TOML string and validates them.
pub fn parse_settings(contents: &str) -> Result<Settings> {
    let settings: Settings = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;
    settings.validate()?;
    Ok(settings)
}

/// Loads settings from a TOML file.
///
/// # Errors
/// Returns an error if the file cannot be read, the TOML is invalid, or a
/// value is out of range.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path_ref = path.as_ref();
    debug!("Attempting to load settings from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;
    parse_settings(&contents)
}

/// Loads settings from `TIFFIN_CONFIG` or `./config.toml`, using defaults if the file is absent.
pub fn load_default_settings() -> Result<Settings> {
    let path = std::env::var("TIFFIN_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    if Path::new(&path).exists() {
        load_settings(&path)
    } else {
        info!("No settings file at {path}, using defaults");
        Ok(Settings::default())
    }
}
