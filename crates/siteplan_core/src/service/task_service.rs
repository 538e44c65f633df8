//! Task use-case service.
//!
//! # Responsibility
//! - Guard every dependency edit with the dependency validator.
//! - Apply status, progress, cost, duration and date edits.
//! - Keep project rollups current after cost/progress-relevant edits.
//!
//! # Invariants
//! - Dependencies only reference tasks of the same project and never form
//!   a cycle.
//! - Edits never recompute the schedule; callers trigger that explicitly.
//! - Deletion is refused while assignments or dependents exist.

use crate::error::EngineResult;
use crate::events::{EntityKind, EventAction, EventSink};
use crate::graph::arena::TaskGraph;
use crate::graph::validator;
use crate::model::project::ProjectId;
use crate::model::task::{Task, TaskId, TaskStatus, TaskValidationError};
use crate::repo::project_repo::ProjectRepository;
use crate::repo::task_repo::TaskRepository;
use crate::service::project_service::recalculate_rollups;
use crate::service::{
    default_event_sink, emit, logged, require_component_in, require_project, require_task,
};
use crate::tags::is_visible;
use chrono::NaiveDate;
use log::info;
use std::sync::Arc;

/// Builds the dependency graph of `tasks`.
pub fn task_graph(tasks: &[Task]) -> TaskGraph<TaskId> {
    TaskGraph::from_edges(tasks.iter().map(|task| (task.id, task.dependencies.clone())))
}

/// Task use-case service.
pub struct TaskService<P: ProjectRepository, T: TaskRepository> {
    projects: P,
    tasks: T,
    events: Arc<dyn EventSink>,
}

impl<P: ProjectRepository, T: TaskRepository> TaskService<P, T> {
    pub fn new(projects: P, tasks: T) -> Self {
        Self {
            projects,
            tasks,
            events: default_event_sink(),
        }
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Checks `proposed` as the dependency list of `task_id` (or of a new
    /// task when `None`) against the project's current graph.
    pub fn validate_dependencies(
        &self,
        project_id: ProjectId,
        task_id: Option<TaskId>,
        proposed: &[TaskId],
    ) -> EngineResult<()> {
        let result = (|| -> EngineResult<_> {
            require_project(&self.projects, project_id)?;
            let tasks = self.tasks.list_tasks(project_id)?;
            validator::validate_dependencies(&task_graph(&tasks), task_id, proposed)?;
            Ok(())
        })();
        logged("dependency_validate", "task", result)
    }

    /// Creates `task` with its dependencies.
    ///
    /// Initial visibility comes from the task's conditional tag; the
    /// incoming `is_hidden` value is ignored.
    pub fn create_task(&self, task: &Task) -> EngineResult<Task> {
        let result = (|| -> EngineResult<_> {
            task.validate()?;
            let project = require_project(&self.projects, task.project_id)?;
            let component = match task.component_id {
                Some(component_id) => Some(require_component_in(
                    &self.projects,
                    component_id,
                    task.project_id,
                )?),
                None => None,
            };

            let existing = self.tasks.list_tasks(task.project_id)?;
            validator::validate_dependencies(
                &task_graph(&existing),
                Some(task.id),
                &task.dependencies,
            )?;

            let mut task = task.clone();
            task.is_hidden = !is_visible(task.conditional_tag, &project, component.as_ref());
            self.tasks.create_task(&task)?;
            recalculate_rollups(&self.projects, &self.tasks, task.project_id)?;
            emit(
                &self.events,
                EntityKind::Task,
                EventAction::Created,
                task.id,
                Some(task.project_id),
            );
            info!(
                "event=task_create module=task status=ok task_id={} project_id={} dependencies={} hidden={}",
                task.id,
                task.project_id,
                task.dependencies.len(),
                task.is_hidden
            );
            Ok(task)
        })();
        logged("task_create", "task", result)
    }

    pub fn get_task(&self, id: TaskId) -> EngineResult<Option<Task>> {
        Ok(self.tasks.get_task(id)?)
    }

    /// Tasks of one project in creation order.
    pub fn list_tasks(&self, project_id: ProjectId) -> EngineResult<Vec<Task>> {
        require_project(&self.projects, project_id)?;
        Ok(self.tasks.list_tasks(project_id)?)
    }

    /// Replaces the full dependency list of one task.
    pub fn replace_dependencies(
        &self,
        task_id: TaskId,
        dependencies: &[TaskId],
    ) -> EngineResult<Task> {
        let result = (|| -> EngineResult<_> {
            let mut task = require_task(&self.tasks, task_id)?;
            if let Some(duplicate) = first_duplicate(dependencies) {
                return Err(TaskValidationError::DuplicateDependency(duplicate).into());
            }
            let tasks = self.tasks.list_tasks(task.project_id)?;
            validator::validate_dependencies(&task_graph(&tasks), Some(task_id), dependencies)?;

            self.tasks.replace_dependencies(task_id, dependencies)?;
            task.dependencies = dependencies.to_vec();
            emit(
                &self.events,
                EntityKind::Task,
                EventAction::Updated,
                task_id,
                Some(task.project_id),
            );
            info!(
                "event=dependencies_replace module=task status=ok task_id={} dependencies={}",
                task_id,
                dependencies.len()
            );
            Ok(task)
        })();
        logged("dependencies_replace", "task", result)
    }

    pub fn update_status(&self, task_id: TaskId, status: TaskStatus) -> EngineResult<Task> {
        self.mutate("task_status", task_id, true, |task| {
            task.status = status;
            Ok(())
        })
    }

    /// Sets progress within `0..=100`; out-of-range values are rejected.
    pub fn update_progress(&self, task_id: TaskId, progress: f64) -> EngineResult<Task> {
        self.mutate("task_progress", task_id, true, |task| {
            task.progress = progress;
            Ok(())
        })
    }

    pub fn update_costs(
        &self,
        task_id: TaskId,
        planned_cost: f64,
        actual_cost: f64,
    ) -> EngineResult<Task> {
        self.mutate("task_costs", task_id, true, |task| {
            task.planned_cost = planned_cost;
            task.actual_cost = actual_cost;
            Ok(())
        })
    }

    /// Changes duration and earliest-start offset.
    ///
    /// Stored dates keep their old values until the schedule is recomputed.
    pub fn update_duration(
        &self,
        task_id: TaskId,
        duration_days: u32,
        offset_days: u32,
    ) -> EngineResult<Task> {
        self.mutate("task_duration", task_id, true, |task| {
            task.duration_days = duration_days;
            task.offset_days = offset_days;
            Ok(())
        })
    }

    /// Pins `start_date`/`end_date`; schedule writes skip the task until
    /// the override is cleared.
    pub fn override_dates(
        &self,
        task_id: TaskId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> EngineResult<Task> {
        self.mutate("task_override_dates", task_id, false, |task| {
            if end_date < start_date {
                return Err(TaskValidationError::InvalidDateRange {
                    start: start_date,
                    end: end_date,
                }
                .into());
            }
            task.start_date = Some(start_date);
            task.end_date = Some(end_date);
            task.dates_overridden = true;
            Ok(())
        })
    }

    /// Returns the task to calculator control; dates stay until the next
    /// schedule write.
    pub fn clear_date_override(&self, task_id: TaskId) -> EngineResult<Task> {
        self.mutate("task_clear_override", task_id, false, |task| {
            task.dates_overridden = false;
            Ok(())
        })
    }

    /// Manual visibility toggle; the next tag processing run may undo it.
    pub fn set_hidden(&self, task_id: TaskId, hidden: bool) -> EngineResult<Task> {
        self.mutate("task_set_hidden", task_id, true, |task| {
            task.is_hidden = hidden;
            Ok(())
        })
    }

    pub fn delete_task(&self, task_id: TaskId) -> EngineResult<()> {
        let result = (|| -> EngineResult<_> {
            let task = require_task(&self.tasks, task_id)?;
            self.tasks.delete_task(task_id)?;
            recalculate_rollups(&self.projects, &self.tasks, task.project_id)?;
            emit(
                &self.events,
                EntityKind::Task,
                EventAction::Deleted,
                task_id,
                Some(task.project_id),
            );
            info!(
                "event=task_delete module=task status=ok task_id={} project_id={}",
                task_id, task.project_id
            );
            Ok(())
        })();
        logged("task_delete", "task", result)
    }

    /// Load-modify-store for single-task edits.
    fn mutate(
        &self,
        event: &'static str,
        task_id: TaskId,
        affects_rollups: bool,
        edit: impl FnOnce(&mut Task) -> EngineResult<()>,
    ) -> EngineResult<Task> {
        let result = (|| -> EngineResult<_> {
            let mut task = require_task(&self.tasks, task_id)?;
            edit(&mut task)?;
            task.validate()?;
            self.tasks.update_task(&task)?;
            if affects_rollups {
                recalculate_rollups(&self.projects, &self.tasks, task.project_id)?;
            }
            emit(
                &self.events,
                EntityKind::Task,
                EventAction::Updated,
                task_id,
                Some(task.project_id),
            );
            info!("event={event} module=task status=ok task_id={task_id}");
            Ok(task)
        })();
        logged(event, "task", result)
    }
}

fn first_duplicate(ids: &[TaskId]) -> Option<TaskId> {
    ids.iter()
        .enumerate()
        .find(|(index, id)| ids[..*index].contains(id))
        .map(|(_, id)| *id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn graph_tracks_existing_edges() {
        let project = Uuid::new_v4();
        let a = Task::new(project, "A", 1);
        let mut b = Task::new(project, "B", 1);
        b.dependencies = vec![a.id];
        let graph = task_graph(&[a.clone(), b.clone()]);

        match validator::validate_dependencies(&graph, Some(a.id), &[b.id]) {
            Err(validator::DependencyViolation::Cycle { path }) => {
                assert_eq!(path.len(), 3);
                assert_eq!(path.first(), path.last());
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn first_duplicate_reports_repeated_id() {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        assert_eq!(first_duplicate(&[id, other, id]), Some(id));
        assert_eq!(first_duplicate(&[id, other]), None);
    }
}
