//! Baseline snapshots and variance.
//!
//! # Responsibility
//! - Snapshot current schedule bounds and cost into versioned baselines.
//! - Re-baseline with lineage, compare baselines, measure variance.
//!
//! # Invariants
//! - Versions per `(project, type)` start at 1 and increase without gaps,
//!   also under concurrent writers; allocation is retried a bounded number
//!   of times before `version_conflict` is surfaced.
//! - Snapshots are always taken from live project state, never copied from
//!   an older baseline.
//! - Missing baselines yield `ProjectVariance::NoBaseline`, never a zero
//!   variance.

use crate::config::{EngineConfig, DEFAULT_BASELINE_VERSION_ATTEMPTS};
use crate::error::{EngineError, EngineResult};
use crate::events::{EntityKind, EventAction, EventSink};
use crate::model::baseline::{
    percentage_of, Baseline, BaselineComparison, BaselineDraft, BaselineEvent,
    BaselineHistoryEntry, BaselineId, BaselineType, ProjectVariance, VarianceReport,
};
use crate::model::project::{Project, ProjectId};
use crate::model::task::Task;
use crate::repo::baseline_repo::BaselineRepository;
use crate::repo::project_repo::ProjectRepository;
use crate::repo::task_repo::TaskRepository;
use crate::service::project_service::current_cost;
use crate::service::schedule_service::current_bounds;
use crate::service::{default_event_sink, emit, logged, require_project};
use chrono::NaiveDate;
use log::{info, warn};
use std::sync::Arc;

/// Live values a baseline would capture right now.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectSnapshot {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub cost: f64,
}

impl ProjectSnapshot {
    /// Bounds from the schedule calculator, cost from the forecast rollup.
    pub fn capture(project: &Project, tasks: &[Task]) -> EngineResult<Self> {
        let (start_date, end_date) = current_bounds(project, tasks)?;
        Ok(Self {
            start_date,
            end_date,
            cost: current_cost(project, tasks),
        })
    }
}

/// Variance of `snapshot` against `baseline`.
pub fn variance_against(baseline: &Baseline, snapshot: &ProjectSnapshot) -> VarianceReport {
    let cost_variance = snapshot.cost - baseline.cost;
    VarianceReport {
        baseline_id: baseline.id,
        baseline_version: baseline.version,
        baseline_end_date: baseline.end_date,
        current_end_date: snapshot.end_date,
        schedule_variance_days: (snapshot.end_date - baseline.end_date).num_days(),
        baseline_cost: baseline.cost,
        current_cost: snapshot.cost,
        cost_variance,
        cost_variance_percentage: percentage_of(cost_variance, baseline.cost),
    }
}

pub struct BaselineService<P, T, B>
where
    P: ProjectRepository,
    T: TaskRepository,
    B: BaselineRepository,
{
    projects: P,
    tasks: T,
    baselines: B,
    version_attempts: u32,
    events: Arc<dyn EventSink>,
}

impl<P, T, B> BaselineService<P, T, B>
where
    P: ProjectRepository,
    T: TaskRepository,
    B: BaselineRepository,
{
    pub fn new(projects: P, tasks: T, baselines: B) -> Self {
        Self {
            projects,
            tasks,
            baselines,
            version_attempts: DEFAULT_BASELINE_VERSION_ATTEMPTS,
            events: default_event_sink(),
        }
    }

    /// Takes the version allocation retry bound from `config`.
    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.version_attempts = config.baseline_version_attempts.max(1);
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Snapshots the project into the next version of `baseline_type`.
    pub fn create_baseline_from_project(
        &self,
        project_id: ProjectId,
        baseline_type: BaselineType,
        created_by: &str,
        note: Option<&str>,
    ) -> EngineResult<Baseline> {
        let result = (|| -> EngineResult<_> {
            let snapshot = self.snapshot(project_id)?;
            let draft = BaselineDraft {
                project_id,
                baseline_type,
                start_date: snapshot.start_date,
                end_date: snapshot.end_date,
                cost: snapshot.cost,
                note: note.map(str::to_string),
                contract_id: None,
                supersedes: None,
                created_by: created_by.to_string(),
            };
            self.insert_with_retry(&draft, BaselineEvent::Created)
        })();
        logged("baseline_create", "baseline", result)
    }

    /// Re-snapshots the project as the next version of `existing_id`'s
    /// family and records the lineage.
    ///
    /// `linked_contract_id = None` keeps the prior baseline's contract link.
    pub fn rebaseline(
        &self,
        existing_id: BaselineId,
        created_by: &str,
        note: Option<&str>,
        linked_contract_id: Option<&str>,
    ) -> EngineResult<Baseline> {
        let result = (|| -> EngineResult<_> {
            let existing = self.require_baseline(existing_id)?;
            let snapshot = self.snapshot(existing.project_id)?;
            let draft = BaselineDraft {
                project_id: existing.project_id,
                baseline_type: existing.baseline_type,
                start_date: snapshot.start_date,
                end_date: snapshot.end_date,
                cost: snapshot.cost,
                note: note.map(str::to_string),
                contract_id: linked_contract_id
                    .map(str::to_string)
                    .or_else(|| existing.contract_id.clone()),
                supersedes: Some(existing.id),
                created_by: created_by.to_string(),
            };
            self.insert_with_retry(&draft, BaselineEvent::Rebaselined)
        })();
        logged("baseline_rebaseline", "baseline", result)
    }

    /// Difference `second - first`.
    pub fn compare_baselines(
        &self,
        first_id: BaselineId,
        second_id: BaselineId,
    ) -> EngineResult<BaselineComparison> {
        let result = (|| -> EngineResult<_> {
            let first = self.require_baseline(first_id)?;
            let second = self.require_baseline(second_id)?;
            Ok(BaselineComparison::between(&first, &second))
        })();
        logged("baseline_compare", "baseline", result)
    }

    /// Current state against the latest baseline of `baseline_type`.
    pub fn calculate_project_variance(
        &self,
        project_id: ProjectId,
        baseline_type: BaselineType,
    ) -> EngineResult<ProjectVariance> {
        let result = (|| -> EngineResult<_> {
            let snapshot = self.snapshot(project_id)?;
            let Some(baseline) = self.baselines.latest(project_id, baseline_type)? else {
                info!(
                    "event=project_variance module=baseline status=ok project_id={} baseline_type={} result=no_baseline",
                    project_id,
                    baseline_type.as_str()
                );
                return Ok(ProjectVariance::NoBaseline {
                    project_id,
                    baseline_type,
                });
            };
            let report = variance_against(&baseline, &snapshot);
            info!(
                "event=project_variance module=baseline status=ok project_id={} baseline_type={} version={} schedule_days={} cost={:.2}",
                project_id,
                baseline_type.as_str(),
                baseline.version,
                report.schedule_variance_days,
                report.cost_variance
            );
            Ok(ProjectVariance::Measured(report))
        })();
        logged("project_variance", "baseline", result)
    }

    /// Highest version of `(project_id, baseline_type)`, if any.
    pub fn get_current_baseline(
        &self,
        project_id: ProjectId,
        baseline_type: BaselineType,
    ) -> EngineResult<Option<Baseline>> {
        Ok(self.baselines.latest(project_id, baseline_type)?)
    }

    pub fn get_baseline(&self, id: BaselineId) -> EngineResult<Option<Baseline>> {
        Ok(self.baselines.get_baseline(id)?)
    }

    pub fn list_baselines(
        &self,
        project_id: ProjectId,
        baseline_type: Option<BaselineType>,
    ) -> EngineResult<Vec<Baseline>> {
        Ok(self.baselines.list_baselines(project_id, baseline_type)?)
    }

    pub fn history_for_project(
        &self,
        project_id: ProjectId,
    ) -> EngineResult<Vec<BaselineHistoryEntry>> {
        Ok(self.baselines.history_for_project(project_id)?)
    }

    /// Replaces the note; snapshot fields stay untouched.
    pub fn amend_note(
        &self,
        id: BaselineId,
        note: Option<&str>,
        actor: &str,
    ) -> EngineResult<Baseline> {
        let result = (|| -> EngineResult<_> {
            let baseline = self.baselines.amend_note(id, note, actor)?;
            emit(
                &self.events,
                EntityKind::Baseline,
                EventAction::Updated,
                id,
                Some(baseline.project_id),
            );
            Ok(baseline)
        })();
        logged("baseline_amend_note", "baseline", result)
    }

    /// Administrative removal; the history log keeps a `deleted` entry.
    pub fn delete_baseline(&self, id: BaselineId, actor: &str) -> EngineResult<Baseline> {
        let result = (|| -> EngineResult<_> {
            let baseline = self.baselines.delete_baseline(id, actor)?;
            emit(
                &self.events,
                EntityKind::Baseline,
                EventAction::Deleted,
                id,
                Some(baseline.project_id),
            );
            warn!(
                "event=baseline_delete module=baseline status=ok baseline_id={} project_id={} version={} actor={}",
                id, baseline.project_id, baseline.version, actor
            );
            Ok(baseline)
        })();
        logged("baseline_delete", "baseline", result)
    }

    fn snapshot(&self, project_id: ProjectId) -> EngineResult<ProjectSnapshot> {
        let project = require_project(&self.projects, project_id)?;
        let tasks = self.tasks.list_tasks(project_id)?;
        ProjectSnapshot::capture(&project, &tasks)
    }

    fn insert_with_retry(
        &self,
        draft: &BaselineDraft,
        event: BaselineEvent,
    ) -> EngineResult<Baseline> {
        for attempt in 1..=self.version_attempts {
            match self.baselines.insert_next_version(draft, event) {
                Ok(baseline) => {
                    emit(
                        &self.events,
                        EntityKind::Baseline,
                        EventAction::Created,
                        baseline.id,
                        Some(baseline.project_id),
                    );
                    info!(
                        "event=baseline_insert module=baseline status=ok baseline_id={} project_id={} baseline_type={} version={} attempt={}",
                        baseline.id,
                        baseline.project_id,
                        baseline.baseline_type.as_str(),
                        baseline.version,
                        attempt
                    );
                    return Ok(baseline);
                }
                Err(err) if err.is_write_conflict() => {
                    warn!(
                        "event=baseline_insert module=baseline status=retry project_id={} baseline_type={} attempt={} error={}",
                        draft.project_id,
                        draft.baseline_type.as_str(),
                        attempt,
                        err
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(EngineError::VersionConflict {
            project_id: draft.project_id,
            baseline_type: draft.baseline_type,
            attempts: self.version_attempts,
        })
    }

    fn require_baseline(&self, id: BaselineId) -> EngineResult<Baseline> {
        self.baselines
            .get_baseline(id)?
            .ok_or_else(|| EngineError::not_found(EntityKind::Baseline, id))
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
    fn variance_is_current_minus_baseline() {
        let baseline = Baseline {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            baseline_type: BaselineType::Contract,
            version: 2,
            start_date: date(2026, 1, 1),
            end_date: date(2026, 3, 1),
            cost: 100.0,
            note: None,
            contract_id: None,
            supersedes: None,
            created_by: "pm".to_string(),
            created_at: 0,
        };
        let snapshot = ProjectSnapshot {
            start_date: date(2026, 1, 1),
            end_date: date(2026, 3, 6),
            cost: 120.0,
        };
        let report = variance_against(&baseline, &snapshot);
        assert_eq!(report.schedule_variance_days, 5);
        assert_eq!(report.cost_variance, 20.0);
        assert_eq!(report.cost_variance_percentage, Some(20.0));
    }

    #[test]
    fn snapshot_uses_visible_schedule_bounds() {
        let project = Project::new(
            "Bridge deck",
            ProjectCategory::Infrastructure,
            date(2026, 6, 1),
            date(2026, 12, 1),
        );
        let a = Task::new(project.id, "Piling", 10);
        let mut b = Task::new(project.id, "Deck", 5);
        b.dependencies = vec![a.id];
        b.planned_cost = 40.0;

        let snapshot = ProjectSnapshot::capture(&project, &[a, b]).unwrap();
        assert_eq!(snapshot.start_date, date(2026, 6, 1));
        assert_eq!(snapshot.end_date, date(2026, 6, 16));
        assert_eq!(snapshot.cost, 40.0);
    }
}
