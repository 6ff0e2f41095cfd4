//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM
//! operations for database entities, providing owner-scoped access patterns
//! and the optimistic-concurrency guards the reconciler relies on.

pub mod grant;
pub mod lease;
pub mod run;
pub mod schedule;

pub use grant::GrantRepository;
pub use lease::LeaseRepository;
pub use run::RunRepository;
pub use schedule::ScheduleRepository;
