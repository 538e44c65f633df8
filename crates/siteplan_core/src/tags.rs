//! Conditional tag vocabulary and evaluator.
//!
//! # Responsibility
//! - Define the closed set of tags a task may carry.
//! - Map every tag to a typed predicate over project/component attributes.
//!
//! # Invariants
//! - The vocabulary is fixed at compile time; unknown tag codes are rejected.
//! - Evaluation is pure and deterministic: same attributes, same answer.

use crate::model::project::{Component, ComponentKind, Project, ProjectCategory};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Storey count from which a building counts as high-rise.
pub const HIGH_RISE_MIN_FLOORS: u32 = 10;
/// Storey count from which a passenger elevator is required.
pub const ELEVATOR_MIN_FLOORS: u32 = 4;

/// Predefined visibility tags for tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionalTag {
    ResidentialOnly,
    CommercialOnly,
    IndustrialOnly,
    InfrastructureOnly,
    RenovationOnly,
    NewBuildOnly,
    HasBasement,
    NoBasement,
    SingleStory,
    MultiStory,
    HighRise,
    RequiresElevator,
    BelowGrade,
    RoofWorks,
    Sitework,
}

impl ConditionalTag {
    pub const ALL: [ConditionalTag; 15] = [
        Self::ResidentialOnly,
        Self::CommercialOnly,
        Self::IndustrialOnly,
        Self::InfrastructureOnly,
        Self::RenovationOnly,
        Self::NewBuildOnly,
        Self::HasBasement,
        Self::NoBasement,
        Self::SingleStory,
        Self::MultiStory,
        Self::HighRise,
        Self::RequiresElevator,
        Self::BelowGrade,
        Self::RoofWorks,
        Self::Sitework,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ResidentialOnly => "residential_only",
            Self::CommercialOnly => "commercial_only",
            Self::IndustrialOnly => "industrial_only",
            Self::InfrastructureOnly => "infrastructure_only",
            Self::RenovationOnly => "renovation_only",
            Self::NewBuildOnly => "new_build_only",
            Self::HasBasement => "has_basement",
            Self::NoBasement => "no_basement",
            Self::SingleStory => "single_story",
            Self::MultiStory => "multi_story",
            Self::HighRise => "high_rise",
            Self::RequiresElevator => "requires_elevator",
            Self::BelowGrade => "below_grade",
            Self::RoofWorks => "roof_works",
            Self::Sitework => "sitework",
        }
    }

    /// Parses a stored tag code. Surrounding whitespace and case are ignored.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|tag| tag.as_str() == normalized.as_str())
    }

    /// Human-readable label for pickers.
    pub fn label(self) -> &'static str {
        match self {
            Self::ResidentialOnly => "Residential projects only",
            Self::CommercialOnly => "Commercial projects only",
            Self::IndustrialOnly => "Industrial projects only",
            Self::InfrastructureOnly => "Infrastructure projects only",
            Self::RenovationOnly => "Renovations only",
            Self::NewBuildOnly => "New builds only",
            Self::HasBasement => "With basement",
            Self::NoBasement => "Without basement",
            Self::SingleStory => "Single storey",
            Self::MultiStory => "Multiple storeys",
            Self::HighRise => "High-rise",
            Self::RequiresElevator => "Elevator required",
            Self::BelowGrade => "Below-grade work",
            Self::RoofWorks => "Roof works",
            Self::Sitework => "Sitework",
        }
    }

    /// Whether the task carrying this tag applies to `project` (and its
    /// owning `component`, when the task has one).
    pub fn evaluate(self, project: &Project, component: Option<&Component>) -> bool {
        match self {
            Self::ResidentialOnly => project.category == ProjectCategory::Residential,
            Self::CommercialOnly => project.category == ProjectCategory::Commercial,
            Self::IndustrialOnly => project.category == ProjectCategory::Industrial,
            Self::InfrastructureOnly => project.category == ProjectCategory::Infrastructure,
            Self::RenovationOnly => project.category == ProjectCategory::Renovation,
            Self::NewBuildOnly => project.category != ProjectCategory::Renovation,
            Self::HasBasement => project.has_basement,
            Self::NoBasement => !project.has_basement,
            Self::SingleStory => project.floors <= 1,
            Self::MultiStory => project.floors > 1,
            Self::HighRise => project.floors >= HIGH_RISE_MIN_FLOORS,
            Self::RequiresElevator => project.floors >= ELEVATOR_MIN_FLOORS,
            Self::BelowGrade => match component.and_then(|component| component.level) {
                Some(level) => level < 0,
                None => project.has_basement,
            },
            Self::RoofWorks => match component {
                Some(component) => component.kind == ComponentKind::Roof,
                None => project.category != ProjectCategory::Infrastructure,
            },
            Self::Sitework => match component {
                Some(component) => component.kind == ComponentKind::Sitework,
                None => true,
            },
        }
    }

    /// Whether offering this tag makes sense for a project category.
    pub fn is_meaningful_for(self, category: ProjectCategory) -> bool {
        let building_tag = matches!(
            self,
            Self::HasBasement
                | Self::NoBasement
                | Self::SingleStory
                | Self::MultiStory
                | Self::HighRise
                | Self::RequiresElevator
                | Self::BelowGrade
                | Self::RoofWorks
        );
        if building_tag {
            return category != ProjectCategory::Infrastructure;
        }
        match self {
            // Category gates are offered everywhere so shared templates can
            // carry them.
            Self::ResidentialOnly
            | Self::CommercialOnly
            | Self::IndustrialOnly
            | Self::InfrastructureOnly => true,
            Self::RenovationOnly | Self::NewBuildOnly => {
                category != ProjectCategory::Infrastructure
            }
            _ => true,
        }
    }
}

impl Display for ConditionalTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tags worth offering for `project`, in vocabulary order.
pub fn available_conditional_tags(project: &Project) -> Vec<ConditionalTag> {
    ConditionalTag::ALL
        .into_iter()
        .filter(|tag| tag.is_meaningful_for(project.category))
        .collect()
}

/// Visibility for a task carrying `tag`: untagged tasks are always visible.
pub fn is_visible(
    tag: Option<ConditionalTag>,
    project: &Project,
    component: Option<&Component>,
) -> bool {
    tag.map_or(true, |tag| tag.evaluate(project, component))
}
