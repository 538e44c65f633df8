//! Schedule calculation use cases.
//!
//! # Responsibility
//! - Translate persisted tasks into calculator input and calendar dates.
//! - Write computed dates back only when a caller asks for it.
//!
//! # Invariants
//! - Only visible tasks are scheduled; hidden tasks never constrain others.
//! - Tasks with `dates_overridden` are scheduled from their pinned start
//!   but their stored dates are never rewritten.
//! - Recomputation is explicit; no edit triggers it implicitly.

use crate::error::{EngineError, EngineResult, ValidationError};
use crate::events::{EntityKind, EventAction, EventSink};
use crate::graph::schedule::{compute_schedule, ready_task_ids, ScheduleNode};
use crate::model::project::{ComponentId, Project, ProjectId};
use crate::model::task::{Task, TaskId};
use crate::repo::project_repo::ProjectRepository;
use crate::repo::task_repo::{TaskDates, TaskRepository};
use crate::service::project_service::component_subtree;
use crate::service::{default_event_sink, emit, logged, require_project, require_task};
use chrono::{Days, NaiveDate};
use log::info;
use std::collections::HashSet;
use std::sync::Arc;

/// Which tasks of a project take part in one calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleScope {
    #[default]
    Project,
    /// Tasks of one component and its descendants.
    Component(ComponentId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScheduleOptions {
    pub scope: ScheduleScope,
    /// Day zero of the calculation; defaults to the project start date.
    pub base_date: Option<NaiveDate>,
    /// Explicit finish for the backward pass.
    pub target_finish: Option<NaiveDate>,
}

/// Calendar view of one scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSchedule {
    pub task_id: TaskId,
    pub start_date: NaiveDate,
    /// Exclusive.
    pub end_date: NaiveDate,
    pub latest_start_date: NaiveDate,
    pub slack_days: i64,
    pub is_critical: bool,
    pub dates_overridden: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSchedule {
    pub project_id: ProjectId,
    pub base_date: NaiveDate,
    /// Latest exclusive end across scheduled tasks.
    pub finish_date: NaiveDate,
    pub target_finish_date: NaiveDate,
    /// Dependencies first.
    pub tasks: Vec<TaskSchedule>,
    pub critical_path: Vec<TaskId>,
    pub critical_duration_days: i64,
}

impl ProjectSchedule {
    pub fn task(&self, id: TaskId) -> Option<&TaskSchedule> {
        self.tasks.iter().find(|task| task.task_id == id)
    }

    /// Earliest start across scheduled tasks.
    pub fn start_date(&self) -> Option<NaiveDate> {
        self.tasks.iter().map(|task| task.start_date).min()
    }
}

/// Outcome of a persisted calculation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleWrite {
    pub schedule: ProjectSchedule,
    /// Tasks whose stored dates changed.
    pub updated_task_ids: Vec<TaskId>,
}

/// Shifts `base` by a signed number of days.
pub fn add_days(base: NaiveDate, days: i64) -> EngineResult<NaiveDate> {
    let shifted = if days >= 0 {
        base.checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        base.checked_sub_days(Days::new(days.unsigned_abs()))
    };
    shifted.ok_or_else(|| ValidationError::DateOutOfRange.into())
}

/// Runs the calculator over the visible tasks selected by `scope`.
///
/// Dependencies on tasks outside the selection are ignored.
pub fn build_schedule(
    project_id: ProjectId,
    tasks: &[Task],
    scope_filter: impl Fn(&Task) -> bool,
    base_date: NaiveDate,
    target_finish: Option<NaiveDate>,
) -> EngineResult<ProjectSchedule> {
    let selected: Vec<&Task> = tasks
        .iter()
        .filter(|task| !task.is_hidden && scope_filter(task))
        .collect();

    let nodes: Vec<ScheduleNode<TaskId>> = selected
        .iter()
        .map(|task| schedule_node(task, base_date))
        .collect();
    let target = target_finish.map(|date| (date - base_date).num_days());
    let result = compute_schedule(&nodes, target)?;

    let pinned: HashSet<TaskId> = selected
        .iter()
        .filter(|task| task.dates_overridden)
        .map(|task| task.id)
        .collect();

    let mut scheduled = Vec::with_capacity(result.tasks.len());
    for entry in &result.tasks {
        scheduled.push(TaskSchedule {
            task_id: entry.id,
            start_date: add_days(base_date, entry.earliest_start)?,
            end_date: add_days(base_date, entry.earliest_finish)?,
            latest_start_date: add_days(base_date, entry.latest_start)?,
            slack_days: entry.slack(),
            is_critical: entry.is_critical,
            dates_overridden: pinned.contains(&entry.id),
        });
    }

    Ok(ProjectSchedule {
        project_id,
        base_date,
        finish_date: add_days(base_date, result.project_finish)?,
        target_finish_date: add_days(base_date, result.target_finish)?,
        tasks: scheduled,
        critical_path: result.critical_path.task_ids,
        critical_duration_days: result.critical_path.total_duration,
    })
}

/// Current `(start, finish)` of the project as the calculator sees it from
/// the project start date; falls back to the project's own dates when no
/// task is visible.
pub fn current_bounds(project: &Project, tasks: &[Task]) -> EngineResult<(NaiveDate, NaiveDate)> {
    let schedule = build_schedule(project.id, tasks, |_| true, project.start_date, None)?;
    match schedule.start_date() {
        Some(start) => Ok((start, schedule.finish_date)),
        None => Ok((project.start_date, project.end_date)),
    }
}

fn schedule_node(task: &Task, base_date: NaiveDate) -> ScheduleNode<TaskId> {
    let mut not_before = i64::from(task.offset_days);
    let mut duration = i64::from(task.duration_days);
    if task.dates_overridden {
        if let Some(start) = task.start_date {
            not_before = not_before.max((start - base_date).num_days());
            if let Some(end) = task.end_date {
                duration = (end - start).num_days();
            }
        }
    }
    ScheduleNode {
        id: task.id,
        duration,
        not_before,
        dependencies: task.dependencies.clone(),
    }
}

/// Schedule use-case service.
pub struct ScheduleService<P: ProjectRepository, T: TaskRepository> {
    projects: P,
    tasks: T,
    events: Arc<dyn EventSink>,
}

impl<P: ProjectRepository, T: TaskRepository> ScheduleService<P, T> {
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

    /// Computes a schedule without writing anything.
    pub fn compute(
        &self,
        project_id: ProjectId,
        options: &ScheduleOptions,
    ) -> EngineResult<ProjectSchedule> {
        logged("schedule_compute", "schedule", self.compute_inner(project_id, options))
    }

    /// Recomputes the project and writes dates onto one task.
    ///
    /// Returns `None` when the task is hidden and therefore unscheduled.
    pub fn calculate_task_schedule(
        &self,
        task_id: TaskId,
        base_date: Option<NaiveDate>,
    ) -> EngineResult<Option<TaskSchedule>> {
        let result = (|| -> EngineResult<_> {
            let task = require_task(&self.tasks, task_id)?;
            let options = ScheduleOptions {
                base_date,
                ..ScheduleOptions::default()
            };
            let schedule = self.compute_inner(task.project_id, &options)?;
            let Some(entry) = schedule.task(task_id).copied() else {
                return Ok(None);
            };
            let changed = self.tasks.write_scheduled_dates(&[TaskDates {
                task_id,
                start_date: entry.start_date,
                end_date: entry.end_date,
            }])?;
            for id in &changed {
                emit(
                    &self.events,
                    EntityKind::Task,
                    EventAction::Updated,
                    *id,
                    Some(task.project_id),
                );
            }
            info!(
                "event=task_schedule module=schedule status=ok task_id={} changed={}",
                task_id,
                !changed.is_empty()
            );
            Ok(Some(entry))
        })();
        logged("task_schedule", "schedule", result)
    }

    /// Recomputes the scope and writes dates onto every non-pinned task.
    pub fn calculate_project_schedule(
        &self,
        project_id: ProjectId,
        options: &ScheduleOptions,
    ) -> EngineResult<ScheduleWrite> {
        let result = (|| -> EngineResult<_> {
            let schedule = self.compute_inner(project_id, options)?;
            let dates: Vec<TaskDates> = schedule
                .tasks
                .iter()
                .filter(|task| !task.dates_overridden)
                .map(|task| TaskDates {
                    task_id: task.task_id,
                    start_date: task.start_date,
                    end_date: task.end_date,
                })
                .collect();
            let updated_task_ids = self.tasks.write_scheduled_dates(&dates)?;
            for id in &updated_task_ids {
                emit(
                    &self.events,
                    EntityKind::Task,
                    EventAction::Updated,
                    *id,
                    Some(project_id),
                );
            }
            info!(
                "event=project_schedule module=schedule status=ok project_id={} scheduled={} updated={} finish={}",
                project_id,
                schedule.tasks.len(),
                updated_task_ids.len(),
                schedule.finish_date
            );
            Ok(ScheduleWrite {
                schedule,
                updated_task_ids,
            })
        })();
        logged("project_schedule", "schedule", result)
    }

    /// Visible, unfinished tasks whose dependencies are all done.
    pub fn ready_tasks(&self, project_id: ProjectId) -> EngineResult<Vec<Task>> {
        let result = (|| -> EngineResult<_> {
            require_project(&self.projects, project_id)?;
            let tasks = self.tasks.list_tasks(project_id)?;
            let ready: HashSet<TaskId> = ready_task_ids(&tasks).into_iter().collect();
            Ok(tasks
                .into_iter()
                .filter(|task| ready.contains(&task.id))
                .collect())
        })();
        logged("ready_tasks", "schedule", result)
    }

    fn compute_inner(
        &self,
        project_id: ProjectId,
        options: &ScheduleOptions,
    ) -> EngineResult<ProjectSchedule> {
        let project = require_project(&self.projects, project_id)?;
        let tasks = self.tasks.list_tasks(project_id)?;
        let base_date = options.base_date.unwrap_or(project.start_date);

        match options.scope {
            ScheduleScope::Project => {
                build_schedule(project_id, &tasks, |_| true, base_date, options.target_finish)
            }
            ScheduleScope::Component(component_id) => {
                let components = self.projects.list_components(project_id)?;
                if !components.iter().any(|component| component.id == component_id) {
                    return Err(EngineError::not_found(
                        EntityKind::Component,
                        component_id,
                    ));
                }
                let members = component_subtree(&components, component_id);
                build_schedule(
                    project_id,
                    &tasks,
                    |task| {
                        task.component_id
                            .is_some_and(|component| members.contains(&component))
                    },
                    base_date,
                    options.target_finish,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::project::ProjectCategory;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn dates_follow_offsets_and_dependencies() {
        let project = Uuid::new_v4();
        let a = Task::new(project, "Excavation", 2);
        let mut b = Task::new(project, "Footings", 3);
        b.dependencies = vec![a.id];
        let mut late = Task::new(project, "Survey", 1);
        late.offset_days = 4;

        let base = date(2026, 4, 6);
        let schedule =
            build_schedule(project, &[a.clone(), b.clone(), late.clone()], |_| true, base, None)
                .unwrap();
        assert_eq!(schedule.task(b.id).unwrap().start_date, date(2026, 4, 8));
        assert_eq!(schedule.task(b.id).unwrap().end_date, date(2026, 4, 11));
        assert_eq!(schedule.task(late.id).unwrap().start_date, date(2026, 4, 10));
        assert_eq!(schedule.finish_date, date(2026, 4, 11));
        assert_eq!(schedule.critical_path, vec![a.id, b.id]);
    }

    #[test]
    fn pinned_dates_constrain_successors() {
        let project = Uuid::new_v4();
        let base = date(2026, 1, 1);
        let mut pinned = Task::new(project, "Crane delivery", 1);
        pinned.dates_overridden = true;
        pinned.start_date = Some(date(2026, 1, 10));
        pinned.end_date = Some(date(2026, 1, 12));
        let mut next = Task::new(project, "Lift steel", 1);
        next.dependencies = vec![pinned.id];

        let schedule = build_schedule(project, &[pinned.clone(), next.clone()], |_| true, base, None)
            .unwrap();
        assert!(schedule.task(pinned.id).unwrap().dates_overridden);
        assert_eq!(schedule.task(next.id).unwrap().start_date, date(2026, 1, 12));
    }

    #[test]
    fn current_bounds_fall_back_to_project_dates_without_visible_tasks() {
        let project = Project::new(
            "Warehouse",
            ProjectCategory::Industrial,
            date(2026, 2, 1),
            date(2026, 8, 1),
        );
        let mut hidden = Task::new(project.id, "Basement", 5);
        hidden.is_hidden = true;
        assert_eq!(
            current_bounds(&project, &[hidden]).unwrap(),
            (date(2026, 2, 1), date(2026, 8, 1))
        );
    }

    #[test]
    fn add_days_handles_negative_offsets() {
        assert_eq!(add_days(date(2026, 3, 1), -1).unwrap(), date(2026, 2, 28));
    }
}
