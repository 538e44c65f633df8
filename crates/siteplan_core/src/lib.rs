//! Core scheduling and cost-baseline engine for construction projects.
//! This crate is the single source of truth for task-graph, workload and
//! baseline invariants.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod graph;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod tags;

pub use config::{ConfigError, EngineConfig, LoggingConfig};
pub use db::{open_db, open_db_in_memory, open_db_with_config, DbError};
pub use error::{EngineError, EngineResult, ErrorKind, ValidationError};
pub use events::{DomainEvent, EntityKind, EventAction, EventSink, LogEventSink, RecordingEventSink};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::baseline::{
    Baseline, BaselineComparison, BaselineHistoryEntry, BaselineId, BaselineType,
    ProjectVariance, VarianceReport,
};
pub use model::project::{Component, ComponentId, ComponentKind, Project, ProjectId, Rollup};
pub use model::task::{SplitPercentage, Task, TaskAssignment, TaskId, TaskStatus};
pub use model::template::{TemplateData, TemplateTaskDef, WorkTemplate};
pub use repo::baseline_repo::SqliteBaselineRepository;
pub use repo::project_repo::SqliteProjectRepository;
pub use repo::task_repo::SqliteTaskRepository;
pub use repo::template_repo::SqliteTemplateRepository;
pub use repo::{RepoError, RepoResult};
pub use service::baseline_service::BaselineService;
pub use service::project_service::ProjectService;
pub use service::schedule_service::{ScheduleOptions, ScheduleScope, ScheduleService};
pub use service::tag_service::TagService;
pub use service::task_service::TaskService;
pub use service::template_service::{ApplyOptions, InstantiationPlan, TemplateService};
pub use service::workload_service::WorkloadService;
pub use tags::ConditionalTag;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
