//! Domain model for the scheduling and cost-baseline engine.
//!
//! # Responsibility
//! - Define canonical records for projects, components, tasks, assignments,
//!   work templates and baselines.
//! - Keep field-level validation next to the data it guards.
//!
//! # Invariants
//! - Every record is identified by a stable UUID.
//! - Rollup fields (`progress`, `actual_cost`) are derived, never authoritative.
//! - Baseline snapshot fields are immutable after creation.

pub mod baseline;
pub mod project;
pub mod task;
pub mod template;

use chrono::NaiveDate;

/// Calendar date format used by persistence and CLI output.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Opaque user identifier resolved by the external identity directory.
pub type UserId = String;

/// Parses one `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}

/// Formats one date as `YYYY-MM-DD`.
pub fn format_date(value: NaiveDate) -> String {
    value.format(DATE_FORMAT).to_string()
}
