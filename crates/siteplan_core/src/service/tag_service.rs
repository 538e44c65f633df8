//! Conditional tag processing.
//!
//! # Responsibility
//! - Re-evaluate tagged tasks against current project/component attributes.
//! - Offer the tags that make sense for one project.
//!
//! # Invariants
//! - Processing is idempotent: a second run with unchanged attributes
//!   reports zero changes.
//! - Untagged tasks are never touched.

use crate::error::EngineResult;
use crate::events::{EntityKind, EventAction, EventSink};
use crate::model::project::{Component, ComponentId, Project, ProjectId};
use crate::model::task::{Task, TaskId};
use crate::repo::project_repo::ProjectRepository;
use crate::repo::task_repo::TaskRepository;
use crate::service::project_service::recalculate_rollups;
use crate::service::{default_event_sink, emit, logged, require_project};
use crate::tags::{self, ConditionalTag};
use log::info;
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of one processing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagProcessingReport {
    /// Tagged tasks evaluated.
    pub processed: usize,
    /// Tasks whose `is_hidden` flipped.
    pub changed: usize,
    pub changed_task_ids: Vec<TaskId>,
}

/// Desired `is_hidden` for every tagged task in `tasks`.
pub fn evaluate_visibility(
    project: &Project,
    components: &[Component],
    tasks: &[Task],
) -> Vec<(TaskId, bool)> {
    let by_id: HashMap<ComponentId, &Component> = components
        .iter()
        .map(|component| (component.id, component))
        .collect();
    tasks
        .iter()
        .filter(|task| task.conditional_tag.is_some())
        .map(|task| {
            let component = task
                .component_id
                .and_then(|component_id| by_id.get(&component_id).copied());
            let visible = tags::is_visible(task.conditional_tag, project, component);
            (task.id, !visible)
        })
        .collect()
}

pub struct TagService<P: ProjectRepository, T: TaskRepository> {
    projects: P,
    tasks: T,
    events: Arc<dyn EventSink>,
}

impl<P: ProjectRepository, T: TaskRepository> TagService<P, T> {
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

    /// Sets `is_hidden = !predicate(project, component)` on every tagged
    /// task of the project.
    ///
    /// Manual toggles on tagged tasks are overwritten.
    pub fn process_project_conditional_tags(
        &self,
        project_id: ProjectId,
    ) -> EngineResult<TagProcessingReport> {
        let result = (|| -> EngineResult<_> {
            let project = require_project(&self.projects, project_id)?;
            let components = self.projects.list_components(project_id)?;
            let tasks = self.tasks.list_tasks(project_id)?;

            let flags = evaluate_visibility(&project, &components, &tasks);
            let changed_task_ids = self.tasks.write_hidden_flags(&flags)?;
            if !changed_task_ids.is_empty() {
                recalculate_rollups(&self.projects, &self.tasks, project_id)?;
            }
            for task_id in &changed_task_ids {
                emit(
                    &self.events,
                    EntityKind::Task,
                    EventAction::Updated,
                    *task_id,
                    Some(project_id),
                );
            }

            let report = TagProcessingReport {
                processed: flags.len(),
                changed: changed_task_ids.len(),
                changed_task_ids,
            };
            info!(
                "event=tag_process module=tags status=ok project_id={} processed={} changed={}",
                project_id, report.processed, report.changed
            );
            Ok(report)
        })();
        logged("tag_process", "tags", result)
    }

    /// Vocabulary subset meaningful for the project's category.
    pub fn available_conditional_tags(
        &self,
        project_id: ProjectId,
    ) -> EngineResult<Vec<ConditionalTag>> {
        let project = require_project(&self.projects, project_id)?;
        Ok(tags::available_conditional_tags(&project))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::project::{ComponentKind, ProjectCategory};
    use chrono::NaiveDate;

    #[test]
    fn untagged_tasks_are_not_evaluated() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();
        let project = Project::new("Homes", ProjectCategory::Residential, start, end);
        let component = Component::new(project.id, "Lot 4", ComponentKind::Building);

        let plain = Task::new(project.id, "Framing", 5);
        let mut basement = Task::new(project.id, "Basement slab", 3);
        basement.conditional_tag = Some(ConditionalTag::HasBasement);
        basement.component_id = Some(component.id);

        let flags = evaluate_visibility(&project, &[component], &[plain, basement.clone()]);
        assert_eq!(flags, vec![(basement.id, true)]);
    }
}
