/// Database configuration and connection management
pub mod database;

/// Scheduler, billing and plan settings from config.toml
pub mod settings;

pub use settings::{
    BillingSettings, DailyRatePolicy, PlanConfig, SchedulerSettings, Settings,
    load_default_settings, load_settings,
};
