//! Project and component repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist projects and their component tree.
//! - Write recomputed rollups for a project and its components in one unit.
//!
//! # Invariants
//! - Component listing is deterministic: insertion order.
//! - A component's parent belongs to the same project (checked by services).

use crate::events::EntityKind;
use crate::model::project::{
    Component, ComponentId, ComponentKind, Project, ProjectCategory, ProjectId, ProjectStatus,
    Rollup, Visibility,
};
use crate::repo::{
    bool_to_int, date_to_db, ensure_connection_ready, invalid_code, parse_flag,
    parse_optional_uuid, parse_stored_date, parse_uuid, RepoError, RepoResult,
};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};

const PROJECT_SELECT_SQL: &str = "SELECT
    id,
    name,
    category,
    status,
    visibility,
    start_date,
    end_date,
    planned_cost,
    actual_cost,
    progress,
    floors,
    has_basement
FROM projects";

const COMPONENT_SELECT_SQL: &str = "SELECT
    id,
    project_id,
    parent_id,
    name,
    kind,
    level,
    progress,
    actual_cost
FROM components";

/// Repository interface for projects and components.
pub trait ProjectRepository {
    fn create_project(&self, project: &Project) -> RepoResult<()>;
    /// Updates descriptive attributes; rollup columns are left untouched.
    fn update_project(&self, project: &Project) -> RepoResult<()>;
    fn get_project(&self, id: ProjectId) -> RepoResult<Option<Project>>;
    fn create_component(&self, component: &Component) -> RepoResult<()>;
    fn get_component(&self, id: ComponentId) -> RepoResult<Option<Component>>;
    fn list_components(&self, project_id: ProjectId) -> RepoResult<Vec<Component>>;
    /// Stores project and component rollups atomically.
    fn write_rollups(
        &self,
        project_id: ProjectId,
        project: Rollup,
        components: &[(ComponentId, Rollup)],
    ) -> RepoResult<()>;
}

/// SQLite-backed project repository.
pub struct SqliteProjectRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteProjectRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["projects", "components"])?;
        Ok(Self { conn })
    }
}

impl ProjectRepository for SqliteProjectRepository<'_> {
    fn create_project(&self, project: &Project) -> RepoResult<()> {
        project.validate()?;

        self.conn.execute(
            "INSERT INTO projects (
                id,
                name,
                category,
                status,
                visibility,
                start_date,
                end_date,
                planned_cost,
                actual_cost,
                progress,
                floors,
                has_basement
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12);",
            params![
                project.id.to_string(),
                project.name.as_str(),
                project.category.as_str(),
                project.status.as_str(),
                project.visibility.as_str(),
                date_to_db(project.start_date),
                date_to_db(project.end_date),
                project.planned_cost,
                project.actual_cost,
                project.progress,
                i64::from(project.floors),
                bool_to_int(project.has_basement),
            ],
        )?;
        Ok(())
    }

    fn update_project(&self, project: &Project) -> RepoResult<()> {
        project.validate()?;

        let changed = self.conn.execute(
            "UPDATE projects
             SET
                name = ?1,
                category = ?2,
                status = ?3,
                visibility = ?4,
                start_date = ?5,
                end_date = ?6,
                planned_cost = ?7,
                floors = ?8,
                has_basement = ?9,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?10;",
            params![
                project.name.as_str(),
                project.category.as_str(),
                project.status.as_str(),
                project.visibility.as_str(),
                date_to_db(project.start_date),
                date_to_db(project.end_date),
                project.planned_cost,
                i64::from(project.floors),
                bool_to_int(project.has_basement),
                project.id.to_string(),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: EntityKind::Project,
                id: project.id,
            });
        }
        Ok(())
    }

    fn get_project(&self, id: ProjectId) -> RepoResult<Option<Project>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PROJECT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_project_row(row)?));
        }
        Ok(None)
    }

    fn create_component(&self, component: &Component) -> RepoResult<()> {
        component.validate()?;

        self.conn.execute(
            "INSERT INTO components (
                id,
                project_id,
                parent_id,
                name,
                kind,
                level,
                progress,
                actual_cost
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                component.id.to_string(),
                component.project_id.to_string(),
                component.parent_id.map(|value| value.to_string()),
                component.name.as_str(),
                component.kind.as_str(),
                component.level,
                component.progress,
                component.actual_cost,
            ],
        )?;
        Ok(())
    }

    fn get_component(&self, id: ComponentId) -> RepoResult<Option<Component>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{COMPONENT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_component_row(row)?));
        }
        Ok(None)
    }

    fn list_components(&self, project_id: ProjectId) -> RepoResult<Vec<Component>> {
        let mut stmt = self.conn.prepare(&format!(
            "{COMPONENT_SELECT_SQL} WHERE project_id = ?1 ORDER BY rowid ASC;"
        ))?;
        let mut rows = stmt.query([project_id.to_string()])?;
        let mut components = Vec::new();
        while let Some(row) = rows.next()? {
            components.push(parse_component_row(row)?);
        }
        Ok(components)
    }

    fn write_rollups(
        &self,
        project_id: ProjectId,
        project: Rollup,
        components: &[(ComponentId, Rollup)],
    ) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE projects
             SET progress = ?2,
                 actual_cost = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![project_id.to_string(), project.progress, project.actual_cost],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: EntityKind::Project,
                id: project_id,
            });
        }

        for (component_id, rollup) in components {
            tx.execute(
                "UPDATE components
                 SET progress = ?2,
                     actual_cost = ?3
                 WHERE id = ?1
                   AND project_id = ?4;",
                params![
                    component_id.to_string(),
                    rollup.progress,
                    rollup.actual_cost,
                    project_id.to_string(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}

fn parse_project_row(row: &Row<'_>) -> RepoResult<Project> {
    let id_text: String = row.get("id")?;
    let category_text: String = row.get("category")?;
    let status_text: String = row.get("status")?;
    let visibility_text: String = row.get("visibility")?;
    let start_text: String = row.get("start_date")?;
    let end_text: String = row.get("end_date")?;
    let floors: i64 = row.get("floors")?;

    let project = Project {
        id: parse_uuid(&id_text, "projects.id")?,
        name: row.get("name")?,
        category: ProjectCategory::parse(&category_text)
            .ok_or_else(|| invalid_code(&category_text, "projects.category"))?,
        status: ProjectStatus::parse(&status_text)
            .ok_or_else(|| invalid_code(&status_text, "projects.status"))?,
        visibility: Visibility::parse(&visibility_text)
            .ok_or_else(|| invalid_code(&visibility_text, "projects.visibility"))?,
        start_date: parse_stored_date(&start_text, "projects.start_date")?,
        end_date: parse_stored_date(&end_text, "projects.end_date")?,
        planned_cost: row.get("planned_cost")?,
        actual_cost: row.get("actual_cost")?,
        progress: row.get("progress")?,
        floors: u32::try_from(floors)
            .map_err(|_| invalid_code(&floors.to_string(), "projects.floors"))?,
        has_basement: parse_flag(row.get("has_basement")?, "projects.has_basement")?,
    };
    project.validate()?;
    Ok(project)
}

fn parse_component_row(row: &Row<'_>) -> RepoResult<Component> {
    let id_text: String = row.get("id")?;
    let project_text: String = row.get("project_id")?;
    let kind_text: String = row.get("kind")?;

    let component = Component {
        id: parse_uuid(&id_text, "components.id")?,
        project_id: parse_uuid(&project_text, "components.project_id")?,
        parent_id: parse_optional_uuid(row.get("parent_id")?, "components.parent_id")?,
        name: row.get("name")?,
        kind: ComponentKind::parse(&kind_text)
            .ok_or_else(|| invalid_code(&kind_text, "components.kind"))?,
        level: row.get("level")?,
        progress: row.get("progress")?,
        actual_cost: row.get("actual_cost")?,
    };
    component.validate()?;
    Ok(component)
}
