//! Engine-level error taxonomy.
//!
//! # Responsibility
//! - Map repository, validation and graph failures to one caller-facing enum.
//! - Expose a stable machine-readable code per rejection kind.
//!
//! # Invariants
//! - Every variant is recoverable at the caller boundary.
//! - Rejections carry the structured detail needed to render a message
//!   (missing ids, cycle path, current total, attempts).

use crate::config::ConfigError;
use crate::events::EntityKind;
use crate::graph::schedule::ScheduleError;
use crate::graph::validator::DependencyViolation;
use crate::model::baseline::BaselineType;
use crate::model::project::{ProjectId, ProjectValidationError};
use crate::model::task::{SplitPercentage, SplitPercentageError, TaskId, TaskValidationError};
use crate::model::template::TemplateValidationError;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type EngineResult<T> = Result<T, EngineError>;

/// Stable rejection codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnknownReference,
    SelfReference,
    Cycle,
    CapacityExceeded,
    Validation,
    VersionConflict,
    NotFound,
    InUse,
    Storage,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownReference => "unknown_reference",
            Self::SelfReference => "self_reference",
            Self::Cycle => "cycle",
            Self::CapacityExceeded => "capacity_exceeded",
            Self::Validation => "validation",
            Self::VersionConflict => "version_conflict",
            Self::NotFound => "not_found",
            Self::InUse => "in_use",
            Self::Storage => "storage",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field or structure rejected before any write.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Project(ProjectValidationError),
    Task(TaskValidationError),
    Template(TemplateValidationError),
    Split(SplitPercentageError),
    Config(ConfigError),
    /// Component parent lives in another project.
    ForeignComponent {
        component_id: Uuid,
        project_id: ProjectId,
    },
    /// Computed date falls outside the supported calendar.
    DateOutOfRange,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Project(err) => write!(f, "{err}"),
            Self::Task(err) => write!(f, "{err}"),
            Self::Template(err) => write!(f, "{err}"),
            Self::Split(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::ForeignComponent {
                component_id,
                project_id,
            } => write!(
                f,
                "component {component_id} does not belong to project {project_id}"
            ),
            Self::DateOutOfRange => write!(f, "computed date is out of range"),
        }
    }
}

/// Caller-facing engine error.
#[derive(Debug)]
pub enum EngineError {
    /// Proposed dependencies that are not tasks of the project.
    UnknownReference { missing: Vec<TaskId> },
    SelfReference { task_id: TaskId },
    /// Closed path: first and last element are the same task.
    Cycle { path: Vec<TaskId> },
    CapacityExceeded {
        task_id: TaskId,
        /// Sum of the other assignments, in hundredths of a percent.
        current_total_hundredths: u32,
        requested: SplitPercentage,
    },
    Validation(ValidationError),
    VersionConflict {
        project_id: ProjectId,
        baseline_type: BaselineType,
        attempts: u32,
    },
    NotFound { entity: EntityKind, id: Uuid },
    InUse {
        entity: EntityKind,
        id: Uuid,
        reason: &'static str,
    },
    Storage(RepoError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownReference { .. } => ErrorKind::UnknownReference,
            Self::SelfReference { .. } => ErrorKind::SelfReference,
            Self::Cycle { .. } => ErrorKind::Cycle,
            Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Self::Validation(_) => ErrorKind::Validation,
            Self::VersionConflict { .. } => ErrorKind::VersionConflict,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InUse { .. } => ErrorKind::InUse,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn not_found(entity: EntityKind, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownReference { missing } => {
                write!(f, "dependencies reference unknown tasks: {}", join_ids(missing))
            }
            Self::SelfReference { task_id } => write!(f, "task {task_id} cannot depend on itself"),
            Self::Cycle { path } => {
                write!(f, "dependency cycle detected: {}", path_display(path))
            }
            Self::CapacityExceeded {
                task_id,
                current_total_hundredths,
                requested,
            } => write!(
                f,
                "task {task_id} is already {}.{:02}% allocated; adding {requested} would exceed 100%",
                current_total_hundredths / 100,
                current_total_hundredths % 100
            ),
            Self::Validation(err) => write!(f, "{err}"),
            Self::VersionConflict {
                project_id,
                baseline_type,
                attempts,
            } => write!(
                f,
                "could not allocate a {} baseline version for project {project_id} after {attempts} attempts",
                baseline_type.as_str()
            ),
            Self::NotFound { entity, id } => write!(f, "{} not found: {id}", entity.as_str()),
            Self::InUse { entity, id, reason } => {
                write!(f, "{} {id} is in use: {reason}", entity.as_str())
            }
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for EngineError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepoError::InUse { entity, id, reason } => Self::InUse { entity, id, reason },
            RepoError::CapacityExceeded {
                task_id,
                current_total_hundredths,
                requested,
            } => Self::CapacityExceeded {
                task_id,
                current_total_hundredths,
                requested,
            },
            RepoError::TaskValidation(err) => Self::Validation(ValidationError::Task(err)),
            RepoError::ProjectValidation(err) => Self::Validation(ValidationError::Project(err)),
            RepoError::TemplateValidation(err) => {
                Self::Validation(ValidationError::Template(err))
            }
            other => Self::Storage(other),
        }
    }
}

impl From<DependencyViolation<TaskId>> for EngineError {
    fn from(value: DependencyViolation<TaskId>) -> Self {
        match value {
            DependencyViolation::UnknownReference { missing } => Self::UnknownReference { missing },
            DependencyViolation::SelfReference(task_id) => Self::SelfReference { task_id },
            DependencyViolation::Cycle { path } => Self::Cycle { path },
        }
    }
}

impl From<ScheduleError<TaskId>> for EngineError {
    fn from(value: ScheduleError<TaskId>) -> Self {
        match value {
            ScheduleError::Cycle { path } => Self::Cycle { path },
            ScheduleError::DuplicateNode(id) => {
                Self::Validation(ValidationError::Task(TaskValidationError::DuplicateDependency(id)))
            }
            ScheduleError::NegativeDuration(_) => Self::Validation(ValidationError::DateOutOfRange),
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<ProjectValidationError> for EngineError {
    fn from(value: ProjectValidationError) -> Self {
        Self::Validation(ValidationError::Project(value))
    }
}

impl From<TaskValidationError> for EngineError {
    fn from(value: TaskValidationError) -> Self {
        Self::Validation(ValidationError::Task(value))
    }
}

impl From<TemplateValidationError> for EngineError {
    fn from(value: TemplateValidationError) -> Self {
        Self::Validation(ValidationError::Template(value))
    }
}

impl From<SplitPercentageError> for EngineError {
    fn from(value: SplitPercentageError) -> Self {
        Self::Validation(ValidationError::Split(value))
    }
}

fn join_ids(ids: &[TaskId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn path_display(path: &[TaskId]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}
