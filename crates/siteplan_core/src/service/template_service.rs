//! Work template management and instantiation.
//!
//! # Responsibility
//! - Store, list and version work templates.
//! - Expand a template into concrete tasks, edges and default assignments
//!   for one project (and optionally one component).
//!
//! # Invariants
//! - Template definitions reference each other by local index only; the
//!   local-index to task-id map is built once per `apply` call.
//! - `preview_only` never writes a row.
//! - A persisted plan is inserted in one transaction: all tasks, edges and
//!   assignments, or nothing.

use crate::error::{EngineError, EngineResult};
use crate::events::{EntityKind, EventAction, EventSink};
use crate::graph::validator::{self, find_cycle};
use crate::model::project::{Component, ComponentId, Project, ProjectId};
use crate::model::task::{SplitPercentage, Task, TaskAssignment, TaskId, TemplateTaskRef};
use crate::model::template::{TemplateData, TemplateId, TemplateValidationError, WorkTemplate};
use crate::model::UserId;
use crate::repo::project_repo::ProjectRepository;
use crate::repo::task_repo::TaskRepository;
use crate::repo::template_repo::TemplateRepository;
use crate::service::project_service::recalculate_rollups;
use crate::service::schedule_service::build_schedule;
use crate::service::task_service::task_graph;
use crate::service::{default_event_sink, emit, logged, require_component_in, require_project};
use crate::tags::is_visible;
use chrono::NaiveDate;
use log::info;
use std::sync::Arc;
use uuid::Uuid;

/// Caller choices for one instantiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Assignee for every created task; falls back to each definition's
    /// `assignee_hint`.
    pub default_assignee_id: Option<UserId>,
    /// Share given to default assignments.
    pub default_split: SplitPercentage,
    /// Day zero for offsets and scheduling; defaults to the project start.
    pub base_start_date: Option<NaiveDate>,
    pub preview_only: bool,
    /// Existing project tasks every root definition will depend on.
    pub attach_after: Vec<TaskId>,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            default_assignee_id: None,
            default_split: SplitPercentage::FULL,
            base_start_date: None,
            preview_only: false,
            attach_after: Vec::new(),
        }
    }
}

/// Result of `apply`, persisted or not.
#[derive(Debug, Clone, PartialEq)]
pub struct InstantiationPlan {
    pub template_id: TemplateId,
    pub project_id: ProjectId,
    /// In template order.
    pub tasks: Vec<Task>,
    pub assignments: Vec<TaskAssignment>,
    pub created_tasks: usize,
    pub created_dependencies: usize,
    pub persisted: bool,
}

/// Expands `template` into tasks for `project`.
///
/// `existing` holds the project's current tasks; they only take part in
/// reference checks and in scheduling of `attach_after` successors.
pub fn build_plan(
    template: &WorkTemplate,
    project: &Project,
    component: Option<&Component>,
    existing: &[Task],
    options: &ApplyOptions,
) -> EngineResult<InstantiationPlan> {
    template.validate()?;
    let defs = &template.data.tasks;

    let existing_graph = task_graph(existing);
    validator::validate_dependencies(&existing_graph, None, &options.attach_after)?;

    let ids: Vec<TaskId> = defs.iter().map(|_| Uuid::new_v4()).collect();
    let mut tasks = Vec::with_capacity(defs.len());
    for (index, def) in defs.iter().enumerate() {
        let local_index =
            u32::try_from(index).map_err(|_| TemplateValidationError::TooManyTasks {
                len: defs.len(),
                max: TemplateData::MAX_TASKS,
            })?;
        let mut task = Task::new(project.id, def.name.clone(), def.duration_days);
        task.id = ids[index];
        task.component_id = component.map(|component| component.id);
        task.offset_days = def.offset_days;
        task.conditional_tag = def.conditional_tag;
        task.planned_cost = def.planned_cost;
        task.template_task_id = Some(TemplateTaskRef {
            template_id: template.id,
            index: local_index,
        });
        task.dependencies = if def.depends_on.is_empty() {
            options.attach_after.clone()
        } else {
            def.depends_on.iter().map(|local| ids[*local]).collect()
        };
        task.is_hidden = !is_visible(task.conditional_tag, project, component);
        tasks.push(task);
    }

    let combined: Vec<Task> = existing.iter().chain(tasks.iter()).cloned().collect();
    if let Some(path) = find_cycle(&task_graph(&combined)) {
        return Err(EngineError::Cycle { path });
    }

    let base_date = options.base_start_date.unwrap_or(project.start_date);
    let schedule = build_schedule(project.id, &combined, |_| true, base_date, None)?;
    for task in &mut tasks {
        if let Some(entry) = schedule.task(task.id) {
            task.start_date = Some(entry.start_date);
            task.end_date = Some(entry.end_date);
        }
    }

    let mut assignments = Vec::new();
    for (task, def) in tasks.iter().zip(defs) {
        let assignee = options
            .default_assignee_id
            .as_ref()
            .or(def.assignee_hint.as_ref());
        if let Some(user_id) = assignee {
            assignments.push(TaskAssignment {
                id: Uuid::new_v4(),
                task_id: task.id,
                user_id: user_id.clone(),
                split: options.default_split,
            });
        }
    }

    let created_dependencies = tasks.iter().map(|task| task.dependencies.len()).sum();
    Ok(InstantiationPlan {
        template_id: template.id,
        project_id: project.id,
        created_tasks: tasks.len(),
        created_dependencies,
        tasks,
        assignments,
        persisted: false,
    })
}

pub struct TemplateService<P, T, R>
where
    P: ProjectRepository,
    T: TaskRepository,
    R: TemplateRepository,
{
    projects: P,
    tasks: T,
    templates: R,
    events: Arc<dyn EventSink>,
}

impl<P, T, R> TemplateService<P, T, R>
where
    P: ProjectRepository,
    T: TaskRepository,
    R: TemplateRepository,
{
    pub fn new(projects: P, tasks: T, templates: R) -> Self {
        Self {
            projects,
            tasks,
            templates,
            events: default_event_sink(),
        }
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn create_template(&self, template: &WorkTemplate) -> EngineResult<TemplateId> {
        let result = (|| -> EngineResult<_> {
            template.validate()?;
            self.templates.create_template(template)?;
            emit(
                &self.events,
                EntityKind::WorkTemplate,
                EventAction::Created,
                template.id,
                None,
            );
            info!(
                "event=template_create module=template status=ok template_id={} tasks={} edges={}",
                template.id,
                template.data.tasks.len(),
                template.data.edge_count()
            );
            Ok(template.id)
        })();
        logged("template_create", "template", result)
    }

    pub fn get_template(&self, id: TemplateId) -> EngineResult<Option<WorkTemplate>> {
        Ok(self.templates.get_template(id)?)
    }

    pub fn list_templates(&self, category: Option<&str>) -> EngineResult<Vec<WorkTemplate>> {
        Ok(self.templates.list_templates(category)?)
    }

    /// Copies a template under a new id with the next version of its
    /// `(category, name)` family, optionally with new data.
    pub fn duplicate_with_version_bump(
        &self,
        id: TemplateId,
        data: Option<TemplateData>,
    ) -> EngineResult<WorkTemplate> {
        let result = (|| -> EngineResult<_> {
            let source = self.require_template(id)?;
            let latest = self
                .templates
                .list_templates(Some(source.category.as_str()))?
                .into_iter()
                .filter(|template| template.name == source.name)
                .map(|template| template.version)
                .max()
                .unwrap_or(source.version);

            let mut copy = source.clone();
            copy.id = Uuid::new_v4();
            copy.version = latest + 1;
            if let Some(data) = data {
                copy.data = data;
            }
            copy.validate()?;
            self.templates.create_template(&copy)?;
            emit(
                &self.events,
                EntityKind::WorkTemplate,
                EventAction::Created,
                copy.id,
                None,
            );
            info!(
                "event=template_duplicate module=template status=ok source_id={} template_id={} version={}",
                id, copy.id, copy.version
            );
            Ok(copy)
        })();
        logged("template_duplicate", "template", result)
    }

    /// Rewrites the task list of a template no task was spawned from yet.
    pub fn replace_template_data(&self, id: TemplateId, data: &TemplateData) -> EngineResult<()> {
        let result = (|| -> EngineResult<_> {
            self.templates.replace_data(id, data)?;
            emit(
                &self.events,
                EntityKind::WorkTemplate,
                EventAction::Updated,
                id,
                None,
            );
            Ok(())
        })();
        logged("template_replace_data", "template", result)
    }

    /// Instantiates a stored template.
    pub fn apply_template(
        &self,
        template_id: TemplateId,
        project_id: ProjectId,
        component_id: Option<ComponentId>,
        options: &ApplyOptions,
    ) -> EngineResult<InstantiationPlan> {
        let result = (|| -> EngineResult<_> {
            let template = self.require_template(template_id)?;
            self.apply_inner(&template, project_id, component_id, options)
        })();
        logged("template_apply", "template", result)
    }

    /// Instantiates `template`, which does not need to be stored.
    ///
    /// Persisted tasks keep a back-reference to `template.id`.
    pub fn apply(
        &self,
        template: &WorkTemplate,
        project_id: ProjectId,
        component_id: Option<ComponentId>,
        options: &ApplyOptions,
    ) -> EngineResult<InstantiationPlan> {
        let result = self.apply_inner(template, project_id, component_id, options);
        logged("template_apply", "template", result)
    }

    fn apply_inner(
        &self,
        template: &WorkTemplate,
        project_id: ProjectId,
        component_id: Option<ComponentId>,
        options: &ApplyOptions,
    ) -> EngineResult<InstantiationPlan> {
        let project = require_project(&self.projects, project_id)?;
        let component = match component_id {
            Some(component_id) => Some(require_component_in(
                &self.projects,
                component_id,
                project_id,
            )?),
            None => None,
        };
        let existing = self.tasks.list_tasks(project_id)?;
        let mut plan = build_plan(template, &project, component.as_ref(), &existing, options)?;

        if options.preview_only {
            info!(
                "event=template_apply module=template status=ok mode=preview template_id={} project_id={} tasks={} dependencies={}",
                template.id, project_id, plan.created_tasks, plan.created_dependencies
            );
            return Ok(plan);
        }

        self.tasks.insert_plan(&plan.tasks, &plan.assignments)?;
        plan.persisted = true;
        recalculate_rollups(&self.projects, &self.tasks, project_id)?;

        for task in &plan.tasks {
            emit(
                &self.events,
                EntityKind::Task,
                EventAction::Created,
                task.id,
                Some(project_id),
            );
        }
        for assignment in &plan.assignments {
            emit(
                &self.events,
                EntityKind::TaskAssignment,
                EventAction::Created,
                assignment.id,
                Some(project_id),
            );
        }
        info!(
            "event=template_apply module=template status=ok mode=persist template_id={} project_id={} tasks={} dependencies={} assignments={}",
            template.id,
            project_id,
            plan.created_tasks,
            plan.created_dependencies,
            plan.assignments.len()
        );
        Ok(plan)
    }

    fn require_template(&self, id: TemplateId) -> EngineResult<WorkTemplate> {
        self.templates
            .get_template(id)?
            .ok_or_else(|| EngineError::not_found(EntityKind::WorkTemplate, id))
    }
}
