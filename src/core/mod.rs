//! Core business logic - framework-agnostic subscription, order and wallet operations.

/// Daily rate (pro-rating) calculation
pub mod billing;
/// Cart snapshots consumed on payment approval
pub mod cart;
/// Scheduled daily order generation
pub mod generator;
/// Meal slot parsing
pub mod meal;
/// Payment submission and admin review
pub mod payment;
/// Read-side views for vendors and subscribers
pub mod report;
/// Vendor accept/reject/skip transitions
pub mod settlement;
/// Subscription lifecycle
pub mod subscription;
/// Wallet ledger
pub mod wallet;
