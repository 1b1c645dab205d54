#![forbid(unsafe_code)]

//! Core domain model and business logic for the Lift workout tracker.
//!
//! This crate provides:
//! - Domain types (plans, exercises, set and session records)
//! - Plan catalog
//! - Live session engine and its single-queue runner
//! - Clock and tick sources
//! - Persistence (JSONL workout log, JSON/CSV export)
//! - Streak, weekly progress and achievement analytics

pub mod types;
pub mod error;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod clock;
pub mod timer;
pub mod store;
pub mod engine;
pub mod runner;
pub mod analytics;
pub mod export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::{build_default_catalog, get_default_catalog, PlanCatalog};
pub use config::Config;
pub use clock::{Clock, ManualClock, SystemClock};
pub use timer::{IntervalTicker, ManualTicker, TickSource};
pub use store::{JsonlLog, MemoryLog, WorkoutLogStore};
pub use engine::{Command, SessionEngine, SessionSnapshot, SessionState};
pub use runner::RunnerHandle;
