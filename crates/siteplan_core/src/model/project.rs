//! Project and component domain model.
//!
//! # Responsibility
//! - Describe the attributes conditional tags are evaluated against.
//! - Hold rollup projections recomputed from tasks.
//!
//! # Invariants
//! - `end_date` is never earlier than `start_date`.
//! - A component has at most one parent, fixed at creation, inside the
//!   same project.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type ProjectId = Uuid;
pub type ComponentId = Uuid;

/// Construction category of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectCategory {
    Residential,
    Commercial,
    Industrial,
    Infrastructure,
    Renovation,
}

impl ProjectCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Residential => "residential",
            Self::Commercial => "commercial",
            Self::Industrial => "industrial",
            Self::Infrastructure => "infrastructure",
            Self::Renovation => "renovation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "residential" => Some(Self::Residential),
            "commercial" => Some(Self::Commercial),
            "industrial" => Some(Self::Industrial),
            "infrastructure" => Some(Self::Infrastructure),
            "renovation" => Some(Self::Renovation),
            _ => None,
        }
    }
}

/// Lifecycle state of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Planning,
    Active,
    OnHold,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Active => "active",
            Self::OnHold => "on_hold",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "planning" => Some(Self::Planning),
            "active" => Some(Self::Active),
            "on_hold" => Some(Self::OnHold),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Who may see the project outside its owning team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Private,
    Internal,
    Public,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Internal => "internal",
            Self::Public => "public",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "private" => Some(Self::Private),
            "internal" => Some(Self::Internal),
            "public" => Some(Self::Public),
            _ => None,
        }
    }
}

/// Structural kind of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Building,
    Floor,
    Zone,
    Roof,
    Sitework,
    Utility,
}

impl ComponentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Building => "building",
            Self::Floor => "floor",
            Self::Zone => "zone",
            Self::Roof => "roof",
            Self::Sitework => "sitework",
            Self::Utility => "utility",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "building" => Some(Self::Building),
            "floor" => Some(Self::Floor),
            "zone" => Some(Self::Zone),
            "roof" => Some(Self::Roof),
            "sitework" => Some(Self::Sitework),
            "utility" => Some(Self::Utility),
            _ => None,
        }
    }
}

/// Field-level validation failures for projects and components.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectValidationError {
    BlankName,
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
    InvalidCost(f64),
    ProgressOutOfRange(f64),
}

impl Display for ProjectValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "name must not be blank"),
            Self::InvalidDateRange { start, end } => {
                write!(f, "end date {end} is earlier than start date {start}")
            }
            Self::InvalidCost(value) => write!(f, "cost must be finite and not negative, got {value}"),
            Self::ProgressOutOfRange(value) => {
                write!(f, "progress must be within 0..=100, got {value}")
            }
        }
    }
}

impl Error for ProjectValidationError {}

/// A construction project: the scope every task graph and baseline belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub category: ProjectCategory,
    pub status: ProjectStatus,
    pub visibility: Visibility,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Budget entered by the project owner.
    pub planned_cost: f64,
    /// Rollup: sum of visible task actual costs.
    pub actual_cost: f64,
    /// Rollup: duration-weighted task progress, 0..=100.
    pub progress: f64,
    /// Number of above-grade storeys.
    pub floors: u32,
    pub has_basement: bool,
}

impl Project {
    /// Creates a project in `planning` status with empty rollups.
    pub fn new(
        name: impl Into<String>,
        category: ProjectCategory,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            category,
            status: ProjectStatus::Planning,
            visibility: Visibility::Private,
            start_date,
            end_date,
            planned_cost: 0.0,
            actual_cost: 0.0,
            progress: 0.0,
            floors: 1,
            has_basement: false,
        }
    }

    pub fn validate(&self) -> Result<(), ProjectValidationError> {
        if self.name.trim().is_empty() {
            return Err(ProjectValidationError::BlankName);
        }
        if self.end_date < self.start_date {
            return Err(ProjectValidationError::InvalidDateRange {
                start: self.start_date,
                end: self.end_date,
            });
        }
        if !self.planned_cost.is_finite() || self.planned_cost < 0.0 {
            return Err(ProjectValidationError::InvalidCost(self.planned_cost));
        }
        if !(0.0..=100.0).contains(&self.progress) {
            return Err(ProjectValidationError::ProgressOutOfRange(self.progress));
        }
        Ok(())
    }
}

/// A node of the project's containment tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: ComponentId,
    pub project_id: ProjectId,
    pub parent_id: Option<ComponentId>,
    pub name: String,
    pub kind: ComponentKind,
    /// Storey index; negative values are below grade.
    pub level: Option<i32>,
    /// Rollup over the component subtree.
    pub progress: f64,
    /// Rollup over the component subtree.
    pub actual_cost: f64,
}

impl Component {
    pub fn new(project_id: ProjectId, name: impl Into<String>, kind: ComponentKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            parent_id: None,
            name: name.into(),
            kind,
            level: None,
            progress: 0.0,
            actual_cost: 0.0,
        }
    }

    pub fn validate(&self) -> Result<(), ProjectValidationError> {
        if self.name.trim().is_empty() {
            return Err(ProjectValidationError::BlankName);
        }
        Ok(())
    }
}

/// Derived progress/cost view for one project or component subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rollup {
    pub progress: f64,
    pub actual_cost: f64,
    /// Estimate at completion: done tasks at actual cost, open tasks at
    /// `max(planned, actual)`.
    pub forecast_cost: f64,
}
