//! Task and task-assignment domain model.
//!
//! # Responsibility
//! - Define the task node shared by the dependency graph, the schedule
//!   calculator and the rollups.
//! - Define the exact split-percentage value used by workload allocation.
//!
//! # Invariants
//! - `dependencies` is an ordered set: no duplicates, never the task itself.
//! - `end_date >= start_date` when both are set.
//! - A split percentage is a positive multiple of 0.01 and at most 100.

use crate::model::project::{ComponentId, ProjectId};
use crate::model::template::TemplateId;
use crate::model::UserId;
use crate::tags::ConditionalTag;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type TaskId = Uuid;
pub type AssignmentId = Uuid;

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    OnHold,
    Done,
}

impl TaskStatus {
    /// Terminal tasks no longer block their dependents.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::OnHold => "on_hold",
            Self::Done => "done",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "not_started" => Some(Self::NotStarted),
            "in_progress" => Some(Self::InProgress),
            "on_hold" => Some(Self::OnHold),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

/// Back-reference to the template definition a task was spawned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateTaskRef {
    pub template_id: TemplateId,
    /// Local index of the definition inside `template_data`.
    pub index: u32,
}

/// Field-level validation failures for tasks.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskValidationError {
    BlankName,
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
    ProgressOutOfRange(f64),
    InvalidCost(f64),
    DuplicateDependency(TaskId),
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "task name must not be blank"),
            Self::InvalidDateRange { start, end } => {
                write!(f, "task end date {end} is earlier than start date {start}")
            }
            Self::ProgressOutOfRange(value) => {
                write!(f, "task progress must be within 0..=100, got {value}")
            }
            Self::InvalidCost(value) => {
                write!(f, "task cost must be finite and not negative, got {value}")
            }
            Self::DuplicateDependency(id) => write!(f, "dependency listed twice: {id}"),
        }
    }
}

impl Error for TaskValidationError {}

/// One schedulable unit of work inside a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub component_id: Option<ComponentId>,
    pub name: String,
    pub status: TaskStatus,
    /// Computed by the schedule calculator unless `dates_overridden`.
    pub start_date: Option<NaiveDate>,
    /// Exclusive finish: `start_date + duration_days`.
    pub end_date: Option<NaiveDate>,
    pub duration_days: u32,
    /// Earliest-start lower bound, in days after the schedule base date.
    pub offset_days: u32,
    /// Tasks that must finish before this one starts, in insertion order.
    pub dependencies: Vec<TaskId>,
    pub conditional_tag: Option<ConditionalTag>,
    pub is_hidden: bool,
    /// Set when a user pinned `start_date`/`end_date` by hand.
    pub dates_overridden: bool,
    pub template_task_id: Option<TemplateTaskRef>,
    /// 0..=100.
    pub progress: f64,
    pub planned_cost: f64,
    pub actual_cost: f64,
}

impl Task {
    pub fn new(project_id: ProjectId, name: impl Into<String>, duration_days: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            component_id: None,
            name: name.into(),
            status: TaskStatus::NotStarted,
            start_date: None,
            end_date: None,
            duration_days,
            offset_days: 0,
            dependencies: Vec::new(),
            conditional_tag: None,
            is_hidden: false,
            dates_overridden: false,
            template_task_id: None,
            progress: 0.0,
            planned_cost: 0.0,
            actual_cost: 0.0,
        }
    }

    pub fn validate(&self) -> Result<(), TaskValidationError> {
        if self.name.trim().is_empty() {
            return Err(TaskValidationError::BlankName);
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(TaskValidationError::InvalidDateRange { start, end });
            }
        }
        if !(0.0..=100.0).contains(&self.progress) {
            return Err(TaskValidationError::ProgressOutOfRange(self.progress));
        }
        for cost in [self.planned_cost, self.actual_cost] {
            if !cost.is_finite() || cost < 0.0 {
                return Err(TaskValidationError::InvalidCost(cost));
            }
        }
        for (index, id) in self.dependencies.iter().enumerate() {
            if self.dependencies[..index].contains(id) {
                return Err(TaskValidationError::DuplicateDependency(*id));
            }
        }
        Ok(())
    }

    /// Progress used by rollups: done tasks always count as complete.
    pub fn effective_progress(&self) -> f64 {
        if self.status.is_terminal() {
            100.0
        } else {
            self.progress
        }
    }

    /// Estimate-at-completion for this task.
    pub fn forecast_cost(&self) -> f64 {
        if self.status.is_terminal() {
            self.actual_cost
        } else {
            self.planned_cost.max(self.actual_cost)
        }
    }
}

/// Rejections for split-percentage input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SplitPercentageError {
    NotFinite,
    NotPositive(f64),
    AboveHundred(f64),
    TooPrecise(f64),
}

impl Display for SplitPercentageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFinite => write!(f, "split percentage must be a finite number"),
            Self::NotPositive(value) => {
                write!(f, "split percentage must be greater than 0, got {value}")
            }
            Self::AboveHundred(value) => {
                write!(f, "split percentage must not exceed 100, got {value}")
            }
            Self::TooPrecise(value) => write!(
                f,
                "split percentage supports at most two decimal places, got {value}"
            ),
        }
    }
}

impl Error for SplitPercentageError {}

/// Share of a task's workload held by one assignee.
///
/// Stored as hundredths of a percent so sums are exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SplitPercentage(u32);

impl SplitPercentage {
    /// Upper bound for one task, in hundredths of a percent.
    pub const FULL_HUNDREDTHS: u32 = 100_00;

    pub const FULL: Self = Self(Self::FULL_HUNDREDTHS);

    pub fn from_percent(value: f64) -> Result<Self, SplitPercentageError> {
        if !value.is_finite() {
            return Err(SplitPercentageError::NotFinite);
        }
        if value <= 0.0 {
            return Err(SplitPercentageError::NotPositive(value));
        }
        if value > 100.0 {
            return Err(SplitPercentageError::AboveHundred(value));
        }
        let scaled = value * 100.0;
        let rounded = scaled.round();
        if (scaled - rounded).abs() > 1e-6 {
            return Err(SplitPercentageError::TooPrecise(value));
        }
        Ok(Self(rounded as u32))
    }

    pub fn from_hundredths(value: u32) -> Result<Self, SplitPercentageError> {
        if value == 0 {
            return Err(SplitPercentageError::NotPositive(0.0));
        }
        if value > Self::FULL_HUNDREDTHS {
            return Err(SplitPercentageError::AboveHundred(f64::from(value) / 100.0));
        }
        Ok(Self(value))
    }

    pub fn hundredths(self) -> u32 {
        self.0
    }

    pub fn as_percent(self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

impl Display for SplitPercentage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

/// One user's share of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAssignment {
    pub id: AssignmentId,
    pub task_id: TaskId,
    pub user_id: UserId,
    pub split: SplitPercentage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_percentage_accepts_two_decimals_and_rejects_more() {
        let split = SplitPercentage::from_percent(33.33).unwrap();
        assert_eq!(split.hundredths(), 3333);
        assert_eq!(split.to_string(), "33.33%");

        assert_eq!(
            SplitPercentage::from_percent(33.333),
            Err(SplitPercentageError::TooPrecise(33.333))
        );
    }

    #[test]
    fn split_percentage_rejects_out_of_range_without_clamping() {
        assert!(matches!(
            SplitPercentage::from_percent(100.5),
            Err(SplitPercentageError::AboveHundred(_))
        ));
        assert!(matches!(
            SplitPercentage::from_percent(0.0),
            Err(SplitPercentageError::NotPositive(_))
        ));
        assert_eq!(
            SplitPercentage::from_percent(f64::NAN),
            Err(SplitPercentageError::NotFinite)
        );
        assert_eq!(SplitPercentage::from_percent(100.0), Ok(SplitPercentage::FULL));
    }

    #[test]
    fn validate_rejects_duplicate_dependencies() {
        let mut task = Task::new(Uuid::new_v4(), "Pour slab", 3);
        let dep = Uuid::new_v4();
        task.dependencies = vec![dep, dep];
        assert_eq!(
            task.validate(),
            Err(TaskValidationError::DuplicateDependency(dep))
        );
    }

    #[test]
    fn validate_rejects_non_finite_costs() {
        let mut task = Task::new(Uuid::new_v4(), "Hoarding", 2);
        task.planned_cost = f64::INFINITY;
        assert_eq!(
            task.validate(),
            Err(TaskValidationError::InvalidCost(f64::INFINITY))
        );
        task.planned_cost = 10.0;
        task.actual_cost = f64::NAN;
        assert!(matches!(
            task.validate(),
            Err(TaskValidationError::InvalidCost(value)) if value.is_nan()
        ));
        task.actual_cost = 0.0;
        assert_eq!(task.validate(), Ok(()));
    }

    #[test]
    fn forecast_uses_actual_once_done() {
        let mut task = Task::new(Uuid::new_v4(), "Frame", 5);
        task.planned_cost = 100.0;
        task.actual_cost = 40.0;
        assert_eq!(task.forecast_cost(), 100.0);
        task.status = TaskStatus::Done;
        assert_eq!(task.forecast_cost(), 40.0);
        assert_eq!(task.effective_progress(), 100.0);
    }
}
