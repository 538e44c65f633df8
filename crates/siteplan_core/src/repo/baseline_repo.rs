//! Baseline repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Allocate baseline versions and insert snapshots atomically.
//! - Keep the baseline history log next to every lifecycle change.
//!
//! # Invariants
//! - `max(version) + 1` and the insert run in one `BEGIN IMMEDIATE`
//!   transaction; `UNIQUE(project_id, baseline_type, version)` backs it up.
//! - Snapshot columns are never updated; only `note` can change.
//! - Every write appends exactly one `baseline_history` row.

use crate::events::EntityKind;
use crate::model::baseline::{
    Baseline, BaselineDraft, BaselineEvent, BaselineHistoryEntry, BaselineId, BaselineType,
};
use crate::model::project::ProjectId;
use crate::repo::{
    date_to_db, ensure_connection_ready, invalid_code, parse_optional_uuid, parse_stored_date,
    parse_uuid, RepoError, RepoResult,
};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

const BASELINE_SELECT_SQL: &str = "SELECT
    id,
    project_id,
    baseline_type,
    version,
    start_date,
    end_date,
    cost,
    note,
    contract_id,
    supersedes_id,
    created_by,
    created_at
FROM baselines";

pub trait BaselineRepository {
    /// Inserts `draft` as the next version of its `(project, type)` family
    /// and records `event` in the history log.
    fn insert_next_version(
        &self,
        draft: &BaselineDraft,
        event: BaselineEvent,
    ) -> RepoResult<Baseline>;
    fn get_baseline(&self, id: BaselineId) -> RepoResult<Option<Baseline>>;
    /// Highest version of one family.
    fn latest(
        &self,
        project_id: ProjectId,
        baseline_type: BaselineType,
    ) -> RepoResult<Option<Baseline>>;
    /// Ordered by type, then version.
    fn list_baselines(
        &self,
        project_id: ProjectId,
        baseline_type: Option<BaselineType>,
    ) -> RepoResult<Vec<Baseline>>;
    fn amend_note(
        &self,
        id: BaselineId,
        note: Option<&str>,
        actor: &str,
    ) -> RepoResult<Baseline>;
    fn delete_baseline(&self, id: BaselineId, actor: &str) -> RepoResult<Baseline>;
    /// History in recording order.
    fn history_for_project(&self, project_id: ProjectId) -> RepoResult<Vec<BaselineHistoryEntry>>;
}

pub struct SqliteBaselineRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteBaselineRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(
            conn,
            &["baselines", "baseline_history", "baseline_version_counters"],
        )?;
        Ok(Self { conn })
    }
}

impl BaselineRepository for SqliteBaselineRepository<'_> {
    fn insert_next_version(
        &self,
        draft: &BaselineDraft,
        event: BaselineEvent,
    ) -> RepoResult<Baseline> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let project_id = draft.project_id.to_string();
        // The counter survives deletes; MAX(version) covers rows it never saw.
        let current: i64 = tx.query_row(
            "SELECT MAX(
                COALESCE((SELECT last_version
                          FROM baseline_version_counters
                          WHERE project_id = ?1 AND baseline_type = ?2), 0),
                COALESCE((SELECT MAX(version)
                          FROM baselines
                          WHERE project_id = ?1 AND baseline_type = ?2), 0)
             );",
            params![project_id, draft.baseline_type.as_str()],
            |row| row.get(0),
        )?;
        let version = u32::try_from(current + 1)
            .map_err(|_| invalid_code(&current.to_string(), "baselines.version"))?;
        tx.execute(
            "INSERT INTO baseline_version_counters (project_id, baseline_type, last_version)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(project_id, baseline_type)
             DO UPDATE SET last_version = excluded.last_version;",
            params![project_id, draft.baseline_type.as_str(), i64::from(version)],
        )?;

        let baseline = Baseline {
            id: Uuid::new_v4(),
            project_id: draft.project_id,
            baseline_type: draft.baseline_type,
            version,
            start_date: draft.start_date,
            end_date: draft.end_date,
            cost: draft.cost,
            note: draft.note.clone(),
            contract_id: draft.contract_id.clone(),
            supersedes: draft.supersedes,
            created_by: draft.created_by.clone(),
            created_at: now_ms(),
        };

        tx.execute(
            "INSERT INTO baselines (
                id,
                project_id,
                baseline_type,
                version,
                start_date,
                end_date,
                cost,
                note,
                contract_id,
                supersedes_id,
                created_by,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12);",
            params![
                baseline.id.to_string(),
                baseline.project_id.to_string(),
                baseline.baseline_type.as_str(),
                i64::from(baseline.version),
                date_to_db(baseline.start_date),
                date_to_db(baseline.end_date),
                baseline.cost,
                baseline.note.as_deref(),
                baseline.contract_id.as_deref(),
                baseline.supersedes.map(|id| id.to_string()),
                baseline.created_by.as_str(),
                baseline.created_at,
            ],
        )?;

        let detail = format!("version={}", baseline.version);
        append_history(
            &tx,
            &baseline,
            event,
            baseline.supersedes,
            &baseline.created_by,
            Some(detail.as_str()),
        )?;
        tx.commit()?;
        Ok(baseline)
    }

    fn get_baseline(&self, id: BaselineId) -> RepoResult<Option<Baseline>> {
        load_baseline(self.conn, id)
    }

    fn latest(
        &self,
        project_id: ProjectId,
        baseline_type: BaselineType,
    ) -> RepoResult<Option<Baseline>> {
        let mut stmt = self.conn.prepare(&format!(
            "{BASELINE_SELECT_SQL}
             WHERE project_id = ?1
               AND baseline_type = ?2
             ORDER BY version DESC
             LIMIT 1;"
        ))?;
        let mut rows = stmt.query(params![project_id.to_string(), baseline_type.as_str()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_baseline_row(row)?));
        }
        Ok(None)
    }

    fn list_baselines(
        &self,
        project_id: ProjectId,
        baseline_type: Option<BaselineType>,
    ) -> RepoResult<Vec<Baseline>> {
        let mut stmt = self.conn.prepare(&format!(
            "{BASELINE_SELECT_SQL}
             WHERE project_id = ?1
               AND (?2 IS NULL OR baseline_type = ?2)
             ORDER BY baseline_type ASC, version ASC;"
        ))?;
        let mut rows = stmt.query(params![
            project_id.to_string(),
            baseline_type.map(BaselineType::as_str)
        ])?;
        let mut baselines = Vec::new();
        while let Some(row) = rows.next()? {
            baselines.push(parse_baseline_row(row)?);
        }
        Ok(baselines)
    }

    fn amend_note(
        &self,
        id: BaselineId,
        note: Option<&str>,
        actor: &str,
    ) -> RepoResult<Baseline> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut baseline = load_baseline(&tx, id)?.ok_or(RepoError::NotFound {
            entity: EntityKind::Baseline,
            id,
        })?;
        tx.execute(
            "UPDATE baselines SET note = ?2 WHERE id = ?1;",
            params![id.to_string(), note],
        )?;
        baseline.note = note.map(str::to_string);
        append_history(&tx, &baseline, BaselineEvent::NoteAmended, None, actor, None)?;
        tx.commit()?;
        Ok(baseline)
    }

    fn delete_baseline(&self, id: BaselineId, actor: &str) -> RepoResult<Baseline> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let baseline = load_baseline(&tx, id)?.ok_or(RepoError::NotFound {
            entity: EntityKind::Baseline,
            id,
        })?;
        tx.execute("DELETE FROM baselines WHERE id = ?1;", [id.to_string()])?;
        let detail = format!(
            "type={} version={}",
            baseline.baseline_type.as_str(),
            baseline.version
        );
        append_history(
            &tx,
            &baseline,
            BaselineEvent::Deleted,
            None,
            actor,
            Some(detail.as_str()),
        )?;
        tx.commit()?;
        Ok(baseline)
    }

    fn history_for_project(&self, project_id: ProjectId) -> RepoResult<Vec<BaselineHistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                id,
                baseline_id,
                project_id,
                event,
                previous_baseline_id,
                actor,
                detail,
                recorded_at
             FROM baseline_history
             WHERE project_id = ?1
             ORDER BY rowid ASC;",
        )?;
        let mut rows = stmt.query([project_id.to_string()])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_history_row(row)?);
        }
        Ok(entries)
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn append_history(
    conn: &Connection,
    baseline: &Baseline,
    event: BaselineEvent,
    previous: Option<BaselineId>,
    actor: &str,
    detail: Option<&str>,
) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO baseline_history (
            id,
            baseline_id,
            project_id,
            event,
            previous_baseline_id,
            actor,
            detail,
            recorded_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
        params![
            Uuid::new_v4().to_string(),
            baseline.id.to_string(),
            baseline.project_id.to_string(),
            event.as_str(),
            previous.map(|id| id.to_string()),
            actor,
            detail,
            now_ms(),
        ],
    )?;
    Ok(())
}

fn load_baseline(conn: &Connection, id: BaselineId) -> RepoResult<Option<Baseline>> {
    let mut stmt = conn.prepare(&format!("{BASELINE_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_baseline_row(row)?));
    }
    Ok(None)
}

fn parse_baseline_row(row: &Row<'_>) -> RepoResult<Baseline> {
    let id_text: String = row.get("id")?;
    let project_text: String = row.get("project_id")?;
    let type_text: String = row.get("baseline_type")?;
    let version: i64 = row.get("version")?;
    let start_text: String = row.get("start_date")?;
    let end_text: String = row.get("end_date")?;

    Ok(Baseline {
        id: parse_uuid(&id_text, "baselines.id")?,
        project_id: parse_uuid(&project_text, "baselines.project_id")?,
        baseline_type: BaselineType::parse(&type_text)
            .ok_or_else(|| invalid_code(&type_text, "baselines.baseline_type"))?,
        version: u32::try_from(version)
            .ok()
            .filter(|value| *value >= 1)
            .ok_or_else(|| invalid_code(&version.to_string(), "baselines.version"))?,
        start_date: parse_stored_date(&start_text, "baselines.start_date")?,
        end_date: parse_stored_date(&end_text, "baselines.end_date")?,
        cost: row.get("cost")?,
        note: row.get("note")?,
        contract_id: row.get("contract_id")?,
        supersedes: parse_optional_uuid(row.get("supersedes_id")?, "baselines.supersedes_id")?,
        created_by: row.get("created_by")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_history_row(row: &Row<'_>) -> RepoResult<BaselineHistoryEntry> {
    let id_text: String = row.get("id")?;
    let baseline_text: String = row.get("baseline_id")?;
    let project_text: String = row.get("project_id")?;
    let event_text: String = row.get("event")?;

    Ok(BaselineHistoryEntry {
        id: parse_uuid(&id_text, "baseline_history.id")?,
        baseline_id: parse_uuid(&baseline_text, "baseline_history.baseline_id")?,
        project_id: parse_uuid(&project_text, "baseline_history.project_id")?,
        event: BaselineEvent::parse(&event_text)
            .ok_or_else(|| invalid_code(&event_text, "baseline_history.event"))?,
        previous_baseline_id: parse_optional_uuid(
            row.get("previous_baseline_id")?,
            "baseline_history.previous_baseline_id",
        )?,
        actor: row.get("actor")?,
        detail: row.get("detail")?,
        recorded_at: row.get("recorded_at")?,
    })
}
