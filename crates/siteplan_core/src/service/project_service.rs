//! Project and component use-case service.
//!
//! # Responsibility
//! - Create projects and their component tree.
//! - Update the attributes conditional tags are evaluated against.
//! - Recompute progress/cost rollups from current tasks.
//!
//! # Invariants
//! - Rollups are a pure function of visible tasks; nothing increments them.
//! - A component parent always belongs to the same project.

use crate::error::EngineResult;
use crate::events::{EntityKind, EventAction, EventSink};
use crate::model::project::{
    Component, ComponentId, Project, ProjectCategory, ProjectId, ProjectStatus, Rollup, Visibility,
};
use crate::model::task::Task;
use crate::repo::project_repo::ProjectRepository;
use crate::repo::task_repo::TaskRepository;
use crate::service::{
    default_event_sink, emit, logged, require_component_in, require_project,
};
use chrono::NaiveDate;
use log::info;
use std::collections::HashSet;
use std::sync::Arc;

/// Partial update of descriptive project attributes.
///
/// `None` leaves the stored value unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectAttributes {
    pub name: Option<String>,
    pub category: Option<ProjectCategory>,
    pub status: Option<ProjectStatus>,
    pub visibility: Option<Visibility>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub planned_cost: Option<f64>,
    pub floors: Option<u32>,
    pub has_basement: Option<bool>,
}

impl ProjectAttributes {
    fn apply(&self, project: &mut Project) {
        if let Some(name) = &self.name {
            project.name = name.clone();
        }
        if let Some(category) = self.category {
            project.category = category;
        }
        if let Some(status) = self.status {
            project.status = status;
        }
        if let Some(visibility) = self.visibility {
            project.visibility = visibility;
        }
        if let Some(start_date) = self.start_date {
            project.start_date = start_date;
        }
        if let Some(end_date) = self.end_date {
            project.end_date = end_date;
        }
        if let Some(planned_cost) = self.planned_cost {
            project.planned_cost = planned_cost;
        }
        if let Some(floors) = self.floors {
            project.floors = floors;
        }
        if let Some(has_basement) = self.has_basement {
            project.has_basement = has_basement;
        }
    }
}

/// Rollups for a project and each of its components.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRollups {
    pub project: Rollup,
    /// In component creation order.
    pub components: Vec<(ComponentId, Rollup)>,
}

/// Rollup over the visible tasks in `tasks`.
///
/// Progress is weighted by `max(duration_days, 1)` so zero-day milestones
/// still count.
pub fn rollup_of<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Rollup {
    let mut weight_total = 0.0;
    let mut weighted_progress = 0.0;
    let mut rollup = Rollup::default();
    for task in tasks.into_iter().filter(|task| !task.is_hidden) {
        let weight = f64::from(task.duration_days.max(1));
        weight_total += weight;
        weighted_progress += weight * task.effective_progress();
        rollup.actual_cost += task.actual_cost;
        rollup.forecast_cost += task.forecast_cost();
    }
    if weight_total > 0.0 {
        rollup.progress = weighted_progress / weight_total;
    }
    rollup
}

/// Computes project and component-subtree rollups.
pub fn compute_rollups(tasks: &[Task], components: &[Component]) -> ProjectRollups {
    let project = rollup_of(tasks);
    let components = components
        .iter()
        .map(|component| {
            let members = component_subtree(components, component.id);
            let rollup = rollup_of(tasks.iter().filter(|task| {
                task.component_id
                    .is_some_and(|component_id| members.contains(&component_id))
            }));
            (component.id, rollup)
        })
        .collect();
    ProjectRollups {
        project,
        components,
    }
}

/// Estimate-at-completion of the project right now.
///
/// Falls back to the owner's planned cost while no task is visible.
pub fn current_cost(project: &Project, tasks: &[Task]) -> f64 {
    if tasks.iter().all(|task| task.is_hidden) {
        return project.planned_cost;
    }
    rollup_of(tasks).forecast_cost
}

/// `root` plus every component below it.
pub(crate) fn component_subtree(
    components: &[Component],
    root: ComponentId,
) -> HashSet<ComponentId> {
    let mut members = HashSet::from([root]);
    // Parents are fixed at creation, so repeated sweeps terminate.
    loop {
        let before = members.len();
        for component in components {
            if let Some(parent) = component.parent_id {
                if members.contains(&parent) {
                    members.insert(component.id);
                }
            }
        }
        if members.len() == before {
            return members;
        }
    }
}

/// Recomputes and stores rollups for one project.
pub(crate) fn recalculate_rollups<P: ProjectRepository, T: TaskRepository>(
    projects: &P,
    tasks: &T,
    project_id: ProjectId,
) -> EngineResult<ProjectRollups> {
    let task_rows = tasks.list_tasks(project_id)?;
    let components = projects.list_components(project_id)?;
    let rollups = compute_rollups(&task_rows, &components);
    projects.write_rollups(project_id, rollups.project, &rollups.components)?;
    info!(
        "event=rollup_recalculate module=project status=ok project_id={} tasks={} components={} progress={:.2} actual_cost={:.2}",
        project_id,
        task_rows.len(),
        components.len(),
        rollups.project.progress,
        rollups.project.actual_cost
    );
    Ok(rollups)
}

/// Project use-case service.
pub struct ProjectService<P: ProjectRepository, T: TaskRepository> {
    projects: P,
    tasks: T,
    events: Arc<dyn EventSink>,
}

impl<P: ProjectRepository, T: TaskRepository> ProjectService<P, T> {
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

    pub fn create_project(&self, project: &Project) -> EngineResult<ProjectId> {
        let result = (|| -> EngineResult<_> {
            project.validate()?;
            self.projects.create_project(project)?;
            emit(
                &self.events,
                EntityKind::Project,
                EventAction::Created,
                project.id,
                Some(project.id),
            );
            info!(
                "event=project_create module=project status=ok project_id={} category={}",
                project.id,
                project.category.as_str()
            );
            Ok(project.id)
        })();
        logged("project_create", "project", result)
    }

    pub fn get_project(&self, id: ProjectId) -> EngineResult<Option<Project>> {
        Ok(self.projects.get_project(id)?)
    }

    /// Applies `attributes` and returns the stored project.
    ///
    /// Task visibility is not re-evaluated here; run tag processing after
    /// changing category, floors or basement.
    pub fn update_attributes(
        &self,
        id: ProjectId,
        attributes: &ProjectAttributes,
    ) -> EngineResult<Project> {
        let result = (|| -> EngineResult<_> {
            let mut project = require_project(&self.projects, id)?;
            attributes.apply(&mut project);
            project.validate()?;
            self.projects.update_project(&project)?;
            emit(
                &self.events,
                EntityKind::Project,
                EventAction::Updated,
                id,
                Some(id),
            );
            Ok(project)
        })();
        logged("project_update", "project", result)
    }

    pub fn create_component(&self, component: &Component) -> EngineResult<ComponentId> {
        let result = (|| -> EngineResult<_> {
            component.validate()?;
            require_project(&self.projects, component.project_id)?;
            if let Some(parent_id) = component.parent_id {
                require_component_in(&self.projects, parent_id, component.project_id)?;
            }
            self.projects.create_component(component)?;
            emit(
                &self.events,
                EntityKind::Component,
                EventAction::Created,
                component.id,
                Some(component.project_id),
            );
            Ok(component.id)
        })();
        logged("component_create", "project", result)
    }

    pub fn get_component(&self, id: ComponentId) -> EngineResult<Option<Component>> {
        Ok(self.projects.get_component(id)?)
    }

    pub fn list_components(&self, project_id: ProjectId) -> EngineResult<Vec<Component>> {
        require_project(&self.projects, project_id)?;
        Ok(self.projects.list_components(project_id)?)
    }

    /// Recomputes progress and cost rollups from current tasks.
    pub fn recalculate(&self, project_id: ProjectId) -> EngineResult<ProjectRollups> {
        let result = (|| -> EngineResult<_> {
            require_project(&self.projects, project_id)?;
            let rollups = recalculate_rollups(&self.projects, &self.tasks, project_id)?;
            emit(
                &self.events,
                EntityKind::Project,
                EventAction::Updated,
                project_id,
                Some(project_id),
            );
            Ok(rollups)
        })();
        logged("rollup_recalculate", "project", result)
    }
}
