//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Write paths validate records before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Multi-statement units run inside `BEGIN IMMEDIATE` transactions.

pub mod baseline_repo;
pub mod project_repo;
pub mod task_repo;
pub mod template_repo;

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::events::EntityKind;
use crate::model::project::ProjectValidationError;
use crate::model::task::{SplitPercentage, TaskId, TaskValidationError};
use crate::model::template::TemplateValidationError;
use crate::model::{format_date, parse_date};
use chrono::NaiveDate;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors shared by all SQLite repositories.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound {
        entity: EntityKind,
        id: Uuid,
    },
    /// Row is still referenced and cannot be removed or rewritten.
    InUse {
        entity: EntityKind,
        id: Uuid,
        reason: &'static str,
    },
    /// Assignment write would push the task above 100%.
    CapacityExceeded {
        task_id: TaskId,
        current_total_hundredths: u32,
        requested: SplitPercentage,
    },
    ProjectValidation(ProjectValidationError),
    TaskValidation(TaskValidationError),
    TemplateValidation(TemplateValidationError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
}

impl RepoError {
    /// Whether a sequence-allocating write may be retried.
    pub fn is_write_conflict(&self) -> bool {
        match self {
            Self::Db(err) => err.is_write_conflict(),
            _ => false,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{} not found: {id}", entity.as_str()),
            Self::InUse { entity, id, reason } => {
                write!(f, "{} {id} is in use: {reason}", entity.as_str())
            }
            Self::CapacityExceeded {
                task_id,
                current_total_hundredths,
                requested,
            } => write!(
                f,
                "assignment of {requested} exceeds capacity of task {task_id} (current total {current_total_hundredths}/10000)"
            ),
            Self::ProjectValidation(err) => write!(f, "{err}"),
            Self::TaskValidation(err) => write!(f, "{err}"),
            Self::TemplateValidation(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "repository requires table `{table}`"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::ProjectValidation(err) => Some(err),
            Self::TaskValidation(err) => Some(err),
            Self::TemplateValidation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ProjectValidationError> for RepoError {
    fn from(value: ProjectValidationError) -> Self {
        Self::ProjectValidation(value)
    }
}

impl From<TaskValidationError> for RepoError {
    fn from(value: TaskValidationError) -> Self {
        Self::TaskValidation(value)
    }
}

impl From<TemplateValidationError> for RepoError {
    fn from(value: TemplateValidationError) -> Self {
        Self::TemplateValidation(value)
    }
}

/// Verifies `conn` is migrated and carries `tables`.
pub(crate) fn ensure_connection_ready(
    conn: &Connection,
    tables: &[&'static str],
) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in tables {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [*table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn parse_optional_uuid(
    value: Option<String>,
    column: &'static str,
) -> RepoResult<Option<Uuid>> {
    value.map(|text| parse_uuid(&text, column)).transpose()
}

pub(crate) fn parse_stored_date(value: &str, column: &'static str) -> RepoResult<NaiveDate> {
    parse_date(value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid date `{value}` in {column}")))
}

pub(crate) fn parse_optional_date(
    value: Option<String>,
    column: &'static str,
) -> RepoResult<Option<NaiveDate>> {
    value.map(|text| parse_stored_date(&text, column)).transpose()
}

pub(crate) fn date_to_db(value: NaiveDate) -> String {
    format_date(value)
}

pub(crate) fn parse_flag(value: i64, column: &'static str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn invalid_code(value: &str, column: &'static str) -> RepoError {
    RepoError::InvalidData(format!("invalid value `{value}` in {column}"))
}
