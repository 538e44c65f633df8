//! Domain event emission.
//!
//! # Responsibility
//! - Describe created/updated/deleted changes for downstream consumers.
//! - Decouple services from whoever listens (activity feed, notifications).
//!
//! # Invariants
//! - Services emit only after the owning transaction committed.
//! - Sinks must not fail the operation that produced the event.

use crate::model::project::ProjectId;
use log::info;
use std::sync::Mutex;
use uuid::Uuid;

/// Entity family an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Project,
    Component,
    Task,
    TaskAssignment,
    WorkTemplate,
    Baseline,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Component => "component",
            Self::Task => "task",
            Self::TaskAssignment => "task_assignment",
            Self::WorkTemplate => "work_template",
            Self::Baseline => "baseline",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventAction {
    Created,
    Updated,
    Deleted,
}

impl EventAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainEvent {
    pub entity: EntityKind,
    pub action: EventAction,
    pub entity_id: Uuid,
    /// Owning project; `None` for project-independent entities (templates).
    pub project_id: Option<ProjectId>,
}

impl DomainEvent {
    pub fn new(
        entity: EntityKind,
        action: EventAction,
        entity_id: Uuid,
        project_id: Option<ProjectId>,
    ) -> Self {
        Self {
            entity,
            action,
            entity_id,
            project_id,
        }
    }
}

/// Receiver of committed domain events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &DomainEvent);
}

/// Default sink: one metadata-only log line per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: &DomainEvent) {
        info!(
            "event=domain_event module=events status=ok entity={} action={} entity_id={} project_id={}",
            event.entity.as_str(),
            event.action.as_str(),
            event.entity_id,
            event
                .project_id
                .map_or_else(|| "none".to_string(), |id| id.to_string())
        );
    }
}

/// In-memory sink that keeps every event in emission order.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events.
    pub fn events(&self) -> Vec<DomainEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self, entity: EntityKind, action: EventAction) -> usize {
        self.events()
            .iter()
            .filter(|event| event.entity == entity && event.action == action)
            .count()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: &DomainEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_keeps_order_and_counts() {
        let sink = RecordingEventSink::new();
        let task = Uuid::new_v4();
        sink.emit(&DomainEvent::new(EntityKind::Task, EventAction::Created, task, None));
        sink.emit(&DomainEvent::new(EntityKind::Task, EventAction::Updated, task, None));
        sink.emit(&DomainEvent::new(EntityKind::Task, EventAction::Updated, task, None));

        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].action, EventAction::Created);
        assert_eq!(sink.count(EntityKind::Task, EventAction::Updated), 2);
        assert_eq!(sink.count(EntityKind::Baseline, EventAction::Created), 0);
    }
}
