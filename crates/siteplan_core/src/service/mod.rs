//! Use-case services over repository contracts.
//!
//! # Responsibility
//! - Orchestrate validation, pure graph/tag logic and persistence.
//! - Emit domain events after successful commits.
//!
//! # Invariants
//! - Services never issue SQL directly.
//! - Every rejection is logged once with its stable error code.

pub mod baseline_service;
pub mod project_service;
pub mod schedule_service;
pub mod tag_service;
pub mod task_service;
pub mod template_service;
pub mod workload_service;

use crate::error::{EngineError, EngineResult, ErrorKind, ValidationError};
use crate::events::{DomainEvent, EntityKind, EventAction, EventSink, LogEventSink};
use crate::model::project::{Component, ComponentId, Project, ProjectId};
use crate::model::task::{Task, TaskId};
use crate::repo::project_repo::ProjectRepository;
use crate::repo::task_repo::TaskRepository;
use log::{error, warn};
use std::sync::Arc;
use uuid::Uuid;

pub(crate) fn default_event_sink() -> Arc<dyn EventSink> {
    Arc::new(LogEventSink)
}

pub(crate) fn emit(
    sink: &Arc<dyn EventSink>,
    entity: EntityKind,
    action: EventAction,
    entity_id: Uuid,
    project_id: Option<ProjectId>,
) {
    sink.emit(&DomainEvent::new(entity, action, entity_id, project_id));
}

/// Logs a failed operation at `warn` (rejection) or `error` (storage).
pub(crate) fn logged<T>(
    event: &'static str,
    module: &'static str,
    result: EngineResult<T>,
) -> EngineResult<T> {
    if let Err(err) = &result {
        if err.kind() == ErrorKind::Storage {
            error!(
                "event={event} module={module} status=error error_code={} error={err}",
                err.kind()
            );
        } else {
            warn!(
                "event={event} module={module} status=rejected error_code={} error={err}",
                err.kind()
            );
        }
    }
    result
}

pub(crate) fn require_project<P: ProjectRepository>(
    projects: &P,
    project_id: ProjectId,
) -> EngineResult<Project> {
    projects
        .get_project(project_id)?
        .ok_or_else(|| EngineError::not_found(EntityKind::Project, project_id))
}

pub(crate) fn require_task<T: TaskRepository>(tasks: &T, task_id: TaskId) -> EngineResult<Task> {
    tasks
        .get_task(task_id)?
        .ok_or_else(|| EngineError::not_found(EntityKind::Task, task_id))
}

/// Loads a component and checks it belongs to `project_id`.
pub(crate) fn require_component_in<P: ProjectRepository>(
    projects: &P,
    component_id: ComponentId,
    project_id: ProjectId,
) -> EngineResult<Component> {
    let component = projects
        .get_component(component_id)?
        .ok_or_else(|| EngineError::not_found(EntityKind::Component, component_id))?;
    if component.project_id != project_id {
        return Err(ValidationError::ForeignComponent {
            component_id,
            project_id,
        }
        .into());
    }
    Ok(component)
}
