//! Work template domain model.
//!
//! # Responsibility
//! - Define the declarative task list stored in `template_data`.
//! - Validate template structure before it is stored or instantiated.
//!
//! # Invariants
//! - Dependencies are local indices into the same template, never global ids.
//! - Local dependencies are in range, never self-referencing, and acyclic.
//! - `category` is a lowercase slug.

use crate::graph::arena::TaskGraph;
use crate::graph::validator::find_cycle;
use crate::model::UserId;
use crate::tags::ConditionalTag;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type TemplateId = Uuid;

static CATEGORY_SLUG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9]*(?:[-_][a-z0-9]+)*$").expect("valid slug regex"));

/// One task definition inside `template_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateTaskDef {
    pub name: String,
    /// Local indices of definitions this one depends on.
    #[serde(default)]
    pub depends_on: Vec<usize>,
    #[serde(default)]
    pub conditional_tag: Option<ConditionalTag>,
    #[serde(default)]
    pub duration_days: u32,
    /// Days after the instantiation base date before this task may start.
    #[serde(default)]
    pub offset_days: u32,
    /// Suggested assignee; overridden by the caller's default assignee.
    #[serde(default)]
    pub assignee_hint: Option<UserId>,
    #[serde(default)]
    pub planned_cost: f64,
}

impl TemplateTaskDef {
    pub fn new(name: impl Into<String>, duration_days: u32) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            conditional_tag: None,
            duration_days,
            offset_days: 0,
            assignee_hint: None,
            planned_cost: 0.0,
        }
    }

    pub fn depends_on(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.depends_on = indices.into_iter().collect();
        self
    }

    pub fn with_tag(mut self, tag: ConditionalTag) -> Self {
        self.conditional_tag = Some(tag);
        self
    }

    pub fn with_offset(mut self, offset_days: u32) -> Self {
        self.offset_days = offset_days;
        self
    }
}

/// Structured payload of a work template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateData {
    pub tasks: Vec<TemplateTaskDef>,
}

impl TemplateData {
    /// Largest number of task definitions one template may carry.
    pub const MAX_TASKS: usize = 10_000;

    pub fn new(tasks: Vec<TemplateTaskDef>) -> Self {
        Self { tasks }
    }

    /// Parses `template_data` JSON and validates its structure.
    pub fn from_json_str(value: &str) -> Result<Self, TemplateValidationError> {
        let data: Self = serde_json::from_str(value)
            .map_err(|err| TemplateValidationError::Malformed(err.to_string()))?;
        data.validate()?;
        Ok(data)
    }

    pub fn to_json_string(&self) -> Result<String, TemplateValidationError> {
        serde_json::to_string(self).map_err(|err| TemplateValidationError::Malformed(err.to_string()))
    }

    /// Total number of local dependency edges.
    pub fn edge_count(&self) -> usize {
        self.tasks.iter().map(|task| task.depends_on.len()).sum()
    }

    pub fn validate(&self) -> Result<(), TemplateValidationError> {
        if self.tasks.is_empty() {
            return Err(TemplateValidationError::Empty);
        }

        let len = self.tasks.len();
        if len > Self::MAX_TASKS {
            return Err(TemplateValidationError::TooManyTasks {
                len,
                max: Self::MAX_TASKS,
            });
        }
        for (index, task) in self.tasks.iter().enumerate() {
            if task.name.trim().is_empty() {
                return Err(TemplateValidationError::BlankTaskName { index });
            }
            if !task.planned_cost.is_finite() || task.planned_cost < 0.0 {
                return Err(TemplateValidationError::InvalidCost { index });
            }
            for (position, dep) in task.depends_on.iter().enumerate() {
                if *dep >= len {
                    return Err(TemplateValidationError::DanglingDependency {
                        index,
                        target: *dep,
                        len,
                    });
                }
                if *dep == index {
                    return Err(TemplateValidationError::SelfDependency { index });
                }
                if task.depends_on[..position].contains(dep) {
                    return Err(TemplateValidationError::DuplicateDependency {
                        index,
                        target: *dep,
                    });
                }
            }
        }

        let graph = TaskGraph::from_edges(
            self.tasks
                .iter()
                .enumerate()
                .map(|(index, task)| (index, task.depends_on.clone())),
        );
        if let Some(path) = find_cycle(&graph) {
            return Err(TemplateValidationError::CyclicDependencies { path });
        }
        Ok(())
    }
}

/// Structural failures of a template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValidationError {
    Malformed(String),
    Empty,
    TooManyTasks { len: usize, max: usize },
    BlankName,
    InvalidCategory(String),
    BlankTaskName { index: usize },
    InvalidCost { index: usize },
    DanglingDependency { index: usize, target: usize, len: usize },
    SelfDependency { index: usize },
    DuplicateDependency { index: usize, target: usize },
    CyclicDependencies { path: Vec<usize> },
}

impl Display for TemplateValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(message) => write!(f, "malformed template data: {message}"),
            Self::Empty => write!(f, "template must define at least one task"),
            Self::TooManyTasks { len, max } => {
                write!(f, "template defines {len} tasks, at most {max} are allowed")
            }
            Self::BlankName => write!(f, "template name must not be blank"),
            Self::InvalidCategory(value) => {
                write!(f, "template category must be a lowercase slug, got `{value}`")
            }
            Self::BlankTaskName { index } => {
                write!(f, "template task #{index} has a blank name")
            }
            Self::InvalidCost { index } => {
                write!(f, "template task #{index} has an invalid planned cost")
            }
            Self::DanglingDependency { index, target, len } => write!(
                f,
                "template task #{index} depends on #{target}, but only {len} tasks are defined"
            ),
            Self::SelfDependency { index } => {
                write!(f, "template task #{index} depends on itself")
            }
            Self::DuplicateDependency { index, target } => {
                write!(f, "template task #{index} lists dependency #{target} twice")
            }
            Self::CyclicDependencies { path } => {
                let rendered: Vec<String> = path.iter().map(|i| format!("#{i}")).collect();
                write!(f, "template dependencies form a cycle: {}", rendered.join(" -> "))
            }
        }
    }
}

impl Error for TemplateValidationError {}

/// Reusable, versioned task list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkTemplate {
    pub id: TemplateId,
    pub name: String,
    pub category: String,
    pub version: u32,
    pub description: Option<String>,
    pub data: TemplateData,
}

impl WorkTemplate {
    pub fn new(name: impl Into<String>, category: impl Into<String>, data: TemplateData) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            category: category.into(),
            version: 1,
            description: None,
            data,
        }
    }

    pub fn validate(&self) -> Result<(), TemplateValidationError> {
        if self.name.trim().is_empty() {
            return Err(TemplateValidationError::BlankName);
        }
        if !CATEGORY_SLUG_RE.is_match(&self.category) {
            return Err(TemplateValidationError::InvalidCategory(self.category.clone()));
        }
        self.data.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_with_defaults_and_known_tags() {
        let data = TemplateData::from_json_str(
            r#"{"tasks":[
                {"name":"Excavate","duration_days":4,"conditional_tag":"has_basement"},
                {"name":"Footings","depends_on":[0],"duration_days":2}
            ]}"#,
        )
        .unwrap();
        assert_eq!(data.tasks.len(), 2);
        assert_eq!(data.tasks[0].conditional_tag, Some(ConditionalTag::HasBasement));
        assert_eq!(data.tasks[1].offset_days, 0);
        assert_eq!(data.edge_count(), 1);
    }

    #[test]
    fn unknown_tag_is_malformed() {
        let err = TemplateData::from_json_str(
            r#"{"tasks":[{"name":"Pool","conditional_tag":"has_pool"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, TemplateValidationError::Malformed(_)));
    }

    #[test]
    fn dangling_local_index_is_rejected() {
        let data = TemplateData::new(vec![
            TemplateTaskDef::new("A", 1),
            TemplateTaskDef::new("B", 1).depends_on([5]),
        ]);
        assert_eq!(
            data.validate(),
            Err(TemplateValidationError::DanglingDependency {
                index: 1,
                target: 5,
                len: 2
            })
        );
    }

    #[test]
    fn oversized_template_is_rejected() {
        let data = TemplateData::new(vec![
            TemplateTaskDef::new("Pour", 1);
            TemplateData::MAX_TASKS + 1
        ]);
        assert_eq!(
            data.validate(),
            Err(TemplateValidationError::TooManyTasks {
                len: TemplateData::MAX_TASKS + 1,
                max: TemplateData::MAX_TASKS,
            })
        );
    }

    #[test]
    fn local_cycle_is_rejected_with_path() {
        let data = TemplateData::new(vec![
            TemplateTaskDef::new("A", 1).depends_on([2]),
            TemplateTaskDef::new("B", 1).depends_on([0]),
            TemplateTaskDef::new("C", 1).depends_on([1]),
        ]);
        match data.validate() {
            Err(TemplateValidationError::CyclicDependencies { path }) => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 4);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn category_must_be_slug() {
        let template = WorkTemplate::new(
            "Shell",
            "Site Works",
            TemplateData::new(vec![TemplateTaskDef::new("A", 1)]),
        );
        assert!(matches!(
            template.validate(),
            Err(TemplateValidationError::InvalidCategory(_))
        ));
    }
}
