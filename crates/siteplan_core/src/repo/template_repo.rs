//! Work template repository.
//!
//! # Invariants
//! - `template_data` is stored as validated JSON and re-validated on read.
//! - A template referenced by instantiated tasks is never rewritten.

use crate::events::EntityKind;
use crate::model::template::{TemplateData, TemplateId, WorkTemplate};
use crate::repo::{ensure_connection_ready, invalid_code, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};

const TEMPLATE_SELECT_SQL: &str = "SELECT
    id,
    name,
    category,
    version,
    description,
    template_data
FROM work_templates";

pub trait TemplateRepository {
    fn create_template(&self, template: &WorkTemplate) -> RepoResult<()>;
    fn get_template(&self, id: TemplateId) -> RepoResult<Option<WorkTemplate>>;
    /// Ordered by category, name, then version.
    fn list_templates(&self, category: Option<&str>) -> RepoResult<Vec<WorkTemplate>>;
    /// Number of tasks spawned from this template.
    fn usage_count(&self, id: TemplateId) -> RepoResult<u64>;
    /// Rewrites `template_data` of a template no task references yet.
    fn replace_data(&self, id: TemplateId, data: &TemplateData) -> RepoResult<()>;
}

pub struct SqliteTemplateRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTemplateRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["work_templates", "tasks"])?;
        Ok(Self { conn })
    }
}

impl TemplateRepository for SqliteTemplateRepository<'_> {
    fn create_template(&self, template: &WorkTemplate) -> RepoResult<()> {
        template.validate()?;
        let payload = template.data.to_json_string()?;

        self.conn.execute(
            "INSERT INTO work_templates (
                id,
                name,
                category,
                version,
                description,
                template_data
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                template.id.to_string(),
                template.name.as_str(),
                template.category.as_str(),
                i64::from(template.version),
                template.description.as_deref(),
                payload,
            ],
        )?;
        Ok(())
    }

    fn get_template(&self, id: TemplateId) -> RepoResult<Option<WorkTemplate>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TEMPLATE_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_template_row(row)?));
        }
        Ok(None)
    }

    fn list_templates(&self, category: Option<&str>) -> RepoResult<Vec<WorkTemplate>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TEMPLATE_SELECT_SQL}
             WHERE (?1 IS NULL OR category = ?1)
             ORDER BY category ASC, name ASC, version ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([category])?;
        let mut templates = Vec::new();
        while let Some(row) = rows.next()? {
            templates.push(parse_template_row(row)?);
        }
        Ok(templates)
    }

    fn usage_count(&self, id: TemplateId) -> RepoResult<u64> {
        count_usage(self.conn, id)
    }

    fn replace_data(&self, id: TemplateId, data: &TemplateData) -> RepoResult<()> {
        data.validate()?;
        let payload = data.to_json_string()?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if count_usage(&tx, id)? > 0 {
            return Err(RepoError::InUse {
                entity: EntityKind::WorkTemplate,
                id,
                reason: "template has instantiated tasks; duplicate it with a version bump",
            });
        }
        let changed = tx.execute(
            "UPDATE work_templates
             SET template_data = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id.to_string(), payload],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: EntityKind::WorkTemplate,
                id,
            });
        }
        tx.commit()?;
        Ok(())
    }
}

fn count_usage(conn: &Connection, id: TemplateId) -> RepoResult<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tasks WHERE template_id = ?1;",
        [id.to_string()],
        |row| row.get(0),
    )?;
    u64::try_from(count).map_err(|_| invalid_code(&count.to_string(), "tasks.template_id"))
}

fn parse_template_row(row: &Row<'_>) -> RepoResult<WorkTemplate> {
    let id_text: String = row.get("id")?;
    let version: i64 = row.get("version")?;
    let payload: String = row.get("template_data")?;

    let template = WorkTemplate {
        id: parse_uuid(&id_text, "work_templates.id")?,
        name: row.get("name")?,
        category: row.get("category")?,
        version: u32::try_from(version)
            .map_err(|_| invalid_code(&version.to_string(), "work_templates.version"))?,
        description: row.get("description")?,
        data: TemplateData::from_json_str(&payload)
            .map_err(|err| RepoError::InvalidData(format!("work_templates.template_data: {err}")))?,
    };
    template.validate()?;
    Ok(template)
}
