//! Service layer for orchestrating a migration
//!
//! This module ties discovery, planning and copy execution together,
//! separating the run order from the CLI layer in main.rs.

pub mod migrate;
pub mod preflight;

pub use migrate::{MigrationReport, MigrationService};
pub use preflight::LoginCheck;
