//! Workload allocation across task assignees.
//!
//! # Responsibility
//! - Turn caller percentages into exact split values.
//! - Route every write through the repository's atomic capacity check.
//!
//! # Invariants
//! - Per task, accepted splits never sum above 100%.
//! - Invalid splits are rejected, never clamped or rounded.

use crate::error::{EngineError, EngineResult};
use crate::events::{EntityKind, EventAction, EventSink};
use crate::model::task::{AssignmentId, SplitPercentage, TaskAssignment, TaskId};
use crate::repo::task_repo::TaskRepository;
use crate::service::{default_event_sink, emit, logged, require_task};
use log::info;
use std::sync::Arc;
use uuid::Uuid;

pub struct WorkloadService<T: TaskRepository> {
    tasks: T,
    events: Arc<dyn EventSink>,
}

impl<T: TaskRepository> WorkloadService<T> {
    pub fn new(tasks: T) -> Self {
        Self {
            tasks,
            events: default_event_sink(),
        }
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Assigns `user_id` to `task_id` with `split_percentage` percent.
    ///
    /// An existing assignment of the same user is updated in place, with
    /// its old share excluded from the capacity sum.
    pub fn assign(
        &self,
        task_id: TaskId,
        user_id: &str,
        split_percentage: f64,
    ) -> EngineResult<TaskAssignment> {
        let result = (|| -> EngineResult<_> {
            let split = SplitPercentage::from_percent(split_percentage)?;
            let task = require_task(&self.tasks, task_id)?;

            if let Some(existing) = self.tasks.find_assignment(task_id, user_id)? {
                let updated = self.tasks.update_assignment_split(existing.id, split)?;
                emit(
                    &self.events,
                    EntityKind::TaskAssignment,
                    EventAction::Updated,
                    updated.id,
                    Some(task.project_id),
                );
                return Ok(updated);
            }

            let assignment = TaskAssignment {
                id: Uuid::new_v4(),
                task_id,
                user_id: user_id.to_string(),
                split,
            };
            self.tasks.insert_assignment(&assignment)?;
            emit(
                &self.events,
                EntityKind::TaskAssignment,
                EventAction::Created,
                assignment.id,
                Some(task.project_id),
            );
            info!(
                "event=workload_assign module=workload status=ok task_id={} assignment_id={} split={}",
                task_id, assignment.id, split
            );
            Ok(assignment)
        })();
        logged("workload_assign", "workload", result)
    }

    /// Changes the share of one assignment.
    pub fn update_assignment(
        &self,
        assignment_id: AssignmentId,
        split_percentage: f64,
    ) -> EngineResult<TaskAssignment> {
        let result = (|| -> EngineResult<_> {
            let split = SplitPercentage::from_percent(split_percentage)?;
            let updated = self.tasks.update_assignment_split(assignment_id, split)?;
            let task = require_task(&self.tasks, updated.task_id)?;
            emit(
                &self.events,
                EntityKind::TaskAssignment,
                EventAction::Updated,
                updated.id,
                Some(task.project_id),
            );
            info!(
                "event=workload_update module=workload status=ok assignment_id={} split={}",
                assignment_id, split
            );
            Ok(updated)
        })();
        logged("workload_update", "workload", result)
    }

    pub fn remove_assignment(&self, assignment_id: AssignmentId) -> EngineResult<TaskAssignment> {
        let result = (|| -> EngineResult<_> {
            let removed = self.tasks.delete_assignment(assignment_id)?;
            let project_id = self.tasks.get_task(removed.task_id)?.map(|task| task.project_id);
            emit(
                &self.events,
                EntityKind::TaskAssignment,
                EventAction::Deleted,
                removed.id,
                project_id,
            );
            Ok(removed)
        })();
        logged("workload_remove", "workload", result)
    }

    pub fn get_assignment(&self, assignment_id: AssignmentId) -> EngineResult<TaskAssignment> {
        self.tasks
            .get_assignment(assignment_id)?
            .ok_or_else(|| EngineError::not_found(EntityKind::TaskAssignment, assignment_id))
    }

    pub fn assignments_for_task(&self, task_id: TaskId) -> EngineResult<Vec<TaskAssignment>> {
        require_task(&self.tasks, task_id)?;
        Ok(self.tasks.list_assignments(task_id)?)
    }

    /// Sum of accepted splits for `task_id`, in percent.
    pub fn allocated_total(&self, task_id: TaskId) -> EngineResult<f64> {
        require_task(&self.tasks, task_id)?;
        let hundredths = self.tasks.allocated_hundredths(task_id)?;
        Ok(f64::from(hundredths) / 100.0)
    }

    /// Share still available on `task_id`, in percent.
    pub fn remaining_capacity(&self, task_id: TaskId) -> EngineResult<f64> {
        require_task(&self.tasks, task_id)?;
        let hundredths = self.tasks.allocated_hundredths(task_id)?;
        let free = SplitPercentage::FULL_HUNDREDTHS.saturating_sub(hundredths);
        Ok(f64::from(free) / 100.0)
    }
}
