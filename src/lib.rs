//! # Cogni Scheduler Library
//!
//! This library provides the core functionality for the Cogni Scheduler
//! service: durable cron schedules, execution grants, the reconciliation
//! sweep, and the append-only run ledger.

pub mod auth;
pub mod config;
pub mod cron;
pub mod cursor;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod queue;
pub mod reconciler;
pub mod repositories;
pub mod schedules;
pub mod server;
pub mod telemetry;
pub use migration;
