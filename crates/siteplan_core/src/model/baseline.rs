//! Baseline domain model.
//!
//! # Responsibility
//! - Define immutable schedule/cost snapshots and their audit history.
//! - Provide the pure comparison between two snapshots.
//!
//! # Invariants
//! - `version` is unique per `(project_id, baseline_type)` and starts at 1.
//! - Snapshot fields (`start_date`, `end_date`, `cost`) never change after
//!   creation; only `note` may be amended.

use crate::model::project::ProjectId;
use crate::model::UserId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type BaselineId = Uuid;

/// Baseline family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineType {
    /// Agreed with the client; changes through contract amendments.
    Contract,
    /// Internal working plan.
    Execution,
}

impl BaselineType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contract => "contract",
            Self::Execution => "execution",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "contract" => Some(Self::Contract),
            "execution" => Some(Self::Execution),
            _ => None,
        }
    }
}

/// Immutable snapshot of a project's schedule bounds and cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub id: BaselineId,
    pub project_id: ProjectId,
    pub baseline_type: BaselineType,
    pub version: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub cost: f64,
    pub note: Option<String>,
    pub contract_id: Option<String>,
    /// Baseline this one re-baselined, if any.
    pub supersedes: Option<BaselineId>,
    pub created_by: UserId,
    /// Epoch milliseconds.
    pub created_at: i64,
}

/// Values captured for a new baseline; the version is allocated by storage.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineDraft {
    pub project_id: ProjectId,
    pub baseline_type: BaselineType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub cost: f64,
    pub note: Option<String>,
    pub contract_id: Option<String>,
    pub supersedes: Option<BaselineId>,
    pub created_by: UserId,
}

/// Lifecycle events recorded for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineEvent {
    Created,
    Rebaselined,
    NoteAmended,
    Deleted,
}

impl BaselineEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Rebaselined => "rebaselined",
            Self::NoteAmended => "note_amended",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(Self::Created),
            "rebaselined" => Some(Self::Rebaselined),
            "note_amended" => Some(Self::NoteAmended),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// One audit row in the baseline history log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineHistoryEntry {
    pub id: Uuid,
    pub baseline_id: BaselineId,
    pub project_id: ProjectId,
    pub event: BaselineEvent,
    /// Prior baseline in a re-baseline chain.
    pub previous_baseline_id: Option<BaselineId>,
    pub actor: UserId,
    pub detail: Option<String>,
    /// Epoch milliseconds.
    pub recorded_at: i64,
}

/// Structured difference `second - first` between two baselines.
///
/// Signs are not interpreted: callers decide which side is "earlier".
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineComparison {
    pub first_id: BaselineId,
    pub second_id: BaselineId,
    pub start_date_delta_days: i64,
    pub end_date_delta_days: i64,
    pub duration_delta_days: i64,
    pub cost_delta: f64,
    /// `None` when the first baseline's cost is zero.
    pub cost_delta_percentage: Option<f64>,
}

impl BaselineComparison {
    pub fn between(first: &Baseline, second: &Baseline) -> Self {
        let first_span = (first.end_date - first.start_date).num_days();
        let second_span = (second.end_date - second.start_date).num_days();
        let cost_delta = second.cost - first.cost;
        Self {
            first_id: first.id,
            second_id: second.id,
            start_date_delta_days: (second.start_date - first.start_date).num_days(),
            end_date_delta_days: (second.end_date - first.end_date).num_days(),
            duration_delta_days: second_span - first_span,
            cost_delta,
            cost_delta_percentage: percentage_of(cost_delta, first.cost),
        }
    }
}

/// `delta` as a percentage of `base`, or `None` for a zero base.
pub fn percentage_of(delta: f64, base: f64) -> Option<f64> {
    if base == 0.0 {
        None
    } else {
        Some(delta / base * 100.0)
    }
}

/// Variance of current project state against its latest baseline.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectVariance {
    /// No baseline of the requested type exists; nothing to compare with.
    NoBaseline {
        project_id: ProjectId,
        baseline_type: BaselineType,
    },
    Measured(VarianceReport),
}

impl ProjectVariance {
    pub fn report(&self) -> Option<&VarianceReport> {
        match self {
            Self::Measured(report) => Some(report),
            Self::NoBaseline { .. } => None,
        }
    }
}

/// Measured schedule and cost variance.
#[derive(Debug, Clone, PartialEq)]
pub struct VarianceReport {
    pub baseline_id: BaselineId,
    pub baseline_version: u32,
    pub baseline_end_date: NaiveDate,
    pub current_end_date: NaiveDate,
    /// Positive means the project now finishes later than planned.
    pub schedule_variance_days: i64,
    pub baseline_cost: f64,
    pub current_cost: f64,
    /// Positive means the project now costs more than planned.
    pub cost_variance: f64,
    pub cost_variance_percentage: Option<f64>,
}
