//! Task, dependency and assignment repository.
//!
//! # Responsibility
//! - Persist tasks together with their ordered dependency lists.
//! - Guard the per-task split-percentage capacity inside one write lock.
//! - Store template instantiation plans atomically.
//!
//! # Invariants
//! - Dependency order is preserved through `task_dependencies.position`.
//! - Assignment check-then-write runs under `BEGIN IMMEDIATE`, so two
//!   writers can never both pass the capacity check for one task.
//! - Scheduled-date writes never touch tasks with `dates_overridden=1`.

use crate::events::EntityKind;
use crate::model::task::{
    AssignmentId, SplitPercentage, Task, TaskAssignment, TaskId, TaskStatus, TemplateTaskRef,
};
use crate::model::project::ProjectId;
use crate::repo::{
    bool_to_int, date_to_db, ensure_connection_ready, invalid_code, parse_flag,
    parse_optional_date, parse_optional_uuid, parse_uuid, RepoError, RepoResult,
};
use crate::tags::ConditionalTag;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::HashMap;

const TASK_SELECT_SQL: &str = "SELECT
    id,
    project_id,
    component_id,
    name,
    status,
    start_date,
    end_date,
    duration_days,
    offset_days,
    conditional_tag,
    is_hidden,
    dates_overridden,
    template_id,
    template_index,
    progress,
    planned_cost,
    actual_cost
FROM tasks";

/// Computed dates for one task, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskDates {
    pub task_id: TaskId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Repository interface for tasks and their assignments.
pub trait TaskRepository {
    /// Inserts one task and its dependency edges.
    fn create_task(&self, task: &Task) -> RepoResult<()>;
    /// Updates task attributes; dependencies and template origin are kept.
    fn update_task(&self, task: &Task) -> RepoResult<()>;
    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>>;
    /// All tasks of one project in insertion order, dependencies loaded.
    fn list_tasks(&self, project_id: ProjectId) -> RepoResult<Vec<Task>>;
    fn replace_dependencies(&self, task_id: TaskId, dependencies: &[TaskId]) -> RepoResult<()>;
    /// Deletes a task that has no assignments and no dependents.
    fn delete_task(&self, id: TaskId) -> RepoResult<()>;
    /// Writes computed dates; returns the tasks that changed.
    fn write_scheduled_dates(&self, dates: &[TaskDates]) -> RepoResult<Vec<TaskId>>;
    /// Writes `is_hidden` flags; returns the tasks that changed.
    fn write_hidden_flags(&self, flags: &[(TaskId, bool)]) -> RepoResult<Vec<TaskId>>;
    /// Inserts a batch of tasks, their edges and assignments as one unit.
    fn insert_plan(&self, tasks: &[Task], assignments: &[TaskAssignment]) -> RepoResult<()>;
    /// Inserts an assignment if the task stays within 100%.
    fn insert_assignment(&self, assignment: &TaskAssignment) -> RepoResult<()>;
    /// Changes one assignment's split if the task stays within 100%.
    fn update_assignment_split(
        &self,
        id: AssignmentId,
        split: SplitPercentage,
    ) -> RepoResult<TaskAssignment>;
    fn delete_assignment(&self, id: AssignmentId) -> RepoResult<TaskAssignment>;
    fn get_assignment(&self, id: AssignmentId) -> RepoResult<Option<TaskAssignment>>;
    fn find_assignment(&self, task_id: TaskId, user_id: &str)
        -> RepoResult<Option<TaskAssignment>>;
    fn list_assignments(&self, task_id: TaskId) -> RepoResult<Vec<TaskAssignment>>;
    /// Sum of splits on one task, in hundredths of a percent.
    fn allocated_hundredths(&self, task_id: TaskId) -> RepoResult<u32>;
}

/// SQLite-backed task repository.
pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["tasks", "task_dependencies", "task_assignments"])?;
        Ok(Self { conn })
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn create_task(&self, task: &Task) -> RepoResult<()> {
        task.validate()?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        insert_task_row(&tx, task)?;
        insert_dependencies(&tx, task.id, &task.dependencies)?;
        tx.commit()?;
        Ok(())
    }

    fn update_task(&self, task: &Task) -> RepoResult<()> {
        task.validate()?;

        let changed = self.conn.execute(
            "UPDATE tasks
             SET
                component_id = ?1,
                name = ?2,
                status = ?3,
                start_date = ?4,
                end_date = ?5,
                duration_days = ?6,
                offset_days = ?7,
                conditional_tag = ?8,
                is_hidden = ?9,
                dates_overridden = ?10,
                progress = ?11,
                planned_cost = ?12,
                actual_cost = ?13,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?14;",
            params![
                task.component_id.map(|value| value.to_string()),
                task.name.as_str(),
                task.status.as_str(),
                task.start_date.map(date_to_db),
                task.end_date.map(date_to_db),
                i64::from(task.duration_days),
                i64::from(task.offset_days),
                task.conditional_tag.map(ConditionalTag::as_str),
                bool_to_int(task.is_hidden),
                bool_to_int(task.dates_overridden),
                task.progress,
                task.planned_cost,
                task.actual_cost,
                task.id.to_string(),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: EntityKind::Task,
                id: task.id,
            });
        }
        Ok(())
    }

    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TASK_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let mut task = parse_task_row(row)?;
        task.dependencies = load_dependencies(self.conn, id)?;
        Ok(Some(task))
    }

    fn list_tasks(&self, project_id: ProjectId) -> RepoResult<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TASK_SELECT_SQL} WHERE project_id = ?1 ORDER BY rowid ASC;"
        ))?;
        let mut rows = stmt.query([project_id.to_string()])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }

        let mut edges: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        let mut stmt = self.conn.prepare(
            "SELECT d.task_id, d.depends_on_id
             FROM task_dependencies d
             JOIN tasks t ON t.id = d.task_id
             WHERE t.project_id = ?1
             ORDER BY d.task_id ASC, d.position ASC;",
        )?;
        let mut rows = stmt.query([project_id.to_string()])?;
        while let Some(row) = rows.next()? {
            let task_text: String = row.get(0)?;
            let dep_text: String = row.get(1)?;
            edges
                .entry(parse_uuid(&task_text, "task_dependencies.task_id")?)
                .or_default()
                .push(parse_uuid(&dep_text, "task_dependencies.depends_on_id")?);
        }

        for task in &mut tasks {
            if let Some(deps) = edges.remove(&task.id) {
                task.dependencies = deps;
            }
        }
        Ok(tasks)
    }

    fn replace_dependencies(&self, task_id: TaskId, dependencies: &[TaskId]) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_task_exists(&tx, task_id)?;
        tx.execute(
            "DELETE FROM task_dependencies WHERE task_id = ?1;",
            [task_id.to_string()],
        )?;
        insert_dependencies(&tx, task_id, dependencies)?;
        tx.execute(
            "UPDATE tasks
             SET updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            [task_id.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete_task(&self, id: TaskId) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_task_exists(&tx, id)?;

        let assignments: i64 = tx.query_row(
            "SELECT COUNT(*) FROM task_assignments WHERE task_id = ?1;",
            [id.to_string()],
            |row| row.get(0),
        )?;
        if assignments > 0 {
            return Err(RepoError::InUse {
                entity: EntityKind::Task,
                id,
                reason: "task still has assignments",
            });
        }

        let dependents: i64 = tx.query_row(
            "SELECT COUNT(*) FROM task_dependencies WHERE depends_on_id = ?1;",
            [id.to_string()],
            |row| row.get(0),
        )?;
        if dependents > 0 {
            return Err(RepoError::InUse {
                entity: EntityKind::Task,
                id,
                reason: "other tasks depend on this task",
            });
        }

        tx.execute("DELETE FROM tasks WHERE id = ?1;", [id.to_string()])?;
        tx.commit()?;
        Ok(())
    }

    fn write_scheduled_dates(&self, dates: &[TaskDates]) -> RepoResult<Vec<TaskId>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut changed = Vec::new();
        for entry in dates {
            let rows = tx.execute(
                "UPDATE tasks
                 SET start_date = ?2,
                     end_date = ?3,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1
                   AND dates_overridden = 0
                   AND (start_date IS NOT ?2 OR end_date IS NOT ?3);",
                params![
                    entry.task_id.to_string(),
                    date_to_db(entry.start_date),
                    date_to_db(entry.end_date),
                ],
            )?;
            if rows > 0 {
                changed.push(entry.task_id);
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    fn write_hidden_flags(&self, flags: &[(TaskId, bool)]) -> RepoResult<Vec<TaskId>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut changed = Vec::new();
        for (task_id, hidden) in flags {
            let rows = tx.execute(
                "UPDATE tasks
                 SET is_hidden = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1
                   AND is_hidden <> ?2;",
                params![task_id.to_string(), bool_to_int(*hidden)],
            )?;
            if rows > 0 {
                changed.push(*task_id);
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    fn insert_plan(&self, tasks: &[Task], assignments: &[TaskAssignment]) -> RepoResult<()> {
        for task in tasks {
            task.validate()?;
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        for task in tasks {
            insert_task_row(&tx, task)?;
        }
        // Edges go in after every row exists so forward references resolve.
        for task in tasks {
            insert_dependencies(&tx, task.id, &task.dependencies)?;
        }
        for assignment in assignments {
            insert_assignment_checked(&tx, assignment)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn insert_assignment(&self, assignment: &TaskAssignment) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_task_exists(&tx, assignment.task_id)?;
        insert_assignment_checked(&tx, assignment)?;
        tx.commit()?;
        Ok(())
    }

    fn update_assignment_split(
        &self,
        id: AssignmentId,
        split: SplitPercentage,
    ) -> RepoResult<TaskAssignment> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut assignment =
            load_assignment(&tx, id)?.ok_or(RepoError::NotFound {
                entity: EntityKind::TaskAssignment,
                id,
            })?;

        let others = allocated_excluding(&tx, assignment.task_id, Some(id))?;
        if others + split.hundredths() > SplitPercentage::FULL_HUNDREDTHS {
            return Err(RepoError::CapacityExceeded {
                task_id: assignment.task_id,
                current_total_hundredths: others,
                requested: split,
            });
        }

        tx.execute(
            "UPDATE task_assignments SET split_hundredths = ?2 WHERE id = ?1;",
            params![id.to_string(), i64::from(split.hundredths())],
        )?;
        tx.commit()?;

        assignment.split = split;
        Ok(assignment)
    }

    fn delete_assignment(&self, id: AssignmentId) -> RepoResult<TaskAssignment> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let assignment = load_assignment(&tx, id)?.ok_or(RepoError::NotFound {
            entity: EntityKind::TaskAssignment,
            id,
        })?;
        tx.execute(
            "DELETE FROM task_assignments WHERE id = ?1;",
            [id.to_string()],
        )?;
        tx.commit()?;
        Ok(assignment)
    }

    fn get_assignment(&self, id: AssignmentId) -> RepoResult<Option<TaskAssignment>> {
        load_assignment(self.conn, id)
    }

    fn find_assignment(
        &self,
        task_id: TaskId,
        user_id: &str,
    ) -> RepoResult<Option<TaskAssignment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, user_id, split_hundredths
             FROM task_assignments
             WHERE task_id = ?1
               AND user_id = ?2;",
        )?;
        let mut rows = stmt.query(params![task_id.to_string(), user_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_assignment_row(row)?));
        }
        Ok(None)
    }

    fn list_assignments(&self, task_id: TaskId) -> RepoResult<Vec<TaskAssignment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, user_id, split_hundredths
             FROM task_assignments
             WHERE task_id = ?1
             ORDER BY rowid ASC;",
        )?;
        let mut rows = stmt.query([task_id.to_string()])?;
        let mut assignments = Vec::new();
        while let Some(row) = rows.next()? {
            assignments.push(parse_assignment_row(row)?);
        }
        Ok(assignments)
    }

    fn allocated_hundredths(&self, task_id: TaskId) -> RepoResult<u32> {
        allocated_excluding(self.conn, task_id, None)
    }
}

fn insert_task_row(conn: &Connection, task: &Task) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO tasks (
            id,
            project_id,
            component_id,
            name,
            status,
            start_date,
            end_date,
            duration_days,
            offset_days,
            conditional_tag,
            is_hidden,
            dates_overridden,
            template_id,
            template_index,
            progress,
            planned_cost,
            actual_cost
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17);",
        params![
            task.id.to_string(),
            task.project_id.to_string(),
            task.component_id.map(|value| value.to_string()),
            task.name.as_str(),
            task.status.as_str(),
            task.start_date.map(date_to_db),
            task.end_date.map(date_to_db),
            i64::from(task.duration_days),
            i64::from(task.offset_days),
            task.conditional_tag.map(ConditionalTag::as_str),
            bool_to_int(task.is_hidden),
            bool_to_int(task.dates_overridden),
            task.template_task_id.map(|origin| origin.template_id.to_string()),
            task.template_task_id.map(|origin| i64::from(origin.index)),
            task.progress,
            task.planned_cost,
            task.actual_cost,
        ],
    )?;
    Ok(())
}

fn insert_dependencies(conn: &Connection, task_id: TaskId, deps: &[TaskId]) -> RepoResult<()> {
    for (position, dep) in deps.iter().enumerate() {
        conn.execute(
            "INSERT INTO task_dependencies (task_id, depends_on_id, position)
             VALUES (?1, ?2, ?3);",
            params![task_id.to_string(), dep.to_string(), position as i64],
        )?;
    }
    Ok(())
}

fn load_dependencies(conn: &Connection, task_id: TaskId) -> RepoResult<Vec<TaskId>> {
    let mut stmt = conn.prepare(
        "SELECT depends_on_id
         FROM task_dependencies
         WHERE task_id = ?1
         ORDER BY position ASC;",
    )?;
    let mut rows = stmt.query([task_id.to_string()])?;
    let mut deps = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        deps.push(parse_uuid(&value, "task_dependencies.depends_on_id")?);
    }
    Ok(deps)
}

fn ensure_task_exists(conn: &Connection, task_id: TaskId) -> RepoResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM tasks WHERE id = ?1);",
        [task_id.to_string()],
        |row| row.get(0),
    )?;
    if exists != 1 {
        return Err(RepoError::NotFound {
            entity: EntityKind::Task,
            id: task_id,
        });
    }
    Ok(())
}

fn allocated_excluding(
    conn: &Connection,
    task_id: TaskId,
    excluded: Option<AssignmentId>,
) -> RepoResult<u32> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(split_hundredths), 0)
         FROM task_assignments
         WHERE task_id = ?1
           AND id IS NOT ?2;",
        params![task_id.to_string(), excluded.map(|id| id.to_string())],
        |row| row.get(0),
    )?;
    u32::try_from(total)
        .map_err(|_| invalid_code(&total.to_string(), "task_assignments.split_hundredths"))
}

fn insert_assignment_checked(conn: &Connection, assignment: &TaskAssignment) -> RepoResult<()> {
    let current = allocated_excluding(conn, assignment.task_id, None)?;
    if current + assignment.split.hundredths() > SplitPercentage::FULL_HUNDREDTHS {
        return Err(RepoError::CapacityExceeded {
            task_id: assignment.task_id,
            current_total_hundredths: current,
            requested: assignment.split,
        });
    }

    conn.execute(
        "INSERT INTO task_assignments (id, task_id, user_id, split_hundredths)
         VALUES (?1, ?2, ?3, ?4);",
        params![
            assignment.id.to_string(),
            assignment.task_id.to_string(),
            assignment.user_id.as_str(),
            i64::from(assignment.split.hundredths()),
        ],
    )?;
    Ok(())
}

fn load_assignment(conn: &Connection, id: AssignmentId) -> RepoResult<Option<TaskAssignment>> {
    conn.query_row(
        "SELECT id, task_id, user_id, split_hundredths
         FROM task_assignments
         WHERE id = ?1;",
        [id.to_string()],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        },
    )
    .optional()?
    .map(|(id, task_id, user_id, split)| assignment_from_parts(&id, &task_id, user_id, split))
    .transpose()
}

fn parse_assignment_row(row: &Row<'_>) -> RepoResult<TaskAssignment> {
    let id: String = row.get("id")?;
    let task_id: String = row.get("task_id")?;
    assignment_from_parts(
        &id,
        &task_id,
        row.get("user_id")?,
        row.get("split_hundredths")?,
    )
}

fn assignment_from_parts(
    id: &str,
    task_id: &str,
    user_id: String,
    split: i64,
) -> RepoResult<TaskAssignment> {
    let split = u32::try_from(split)
        .ok()
        .and_then(|value| SplitPercentage::from_hundredths(value).ok())
        .ok_or_else(|| invalid_code(&split.to_string(), "task_assignments.split_hundredths"))?;
    Ok(TaskAssignment {
        id: parse_uuid(id, "task_assignments.id")?,
        task_id: parse_uuid(task_id, "task_assignments.task_id")?,
        user_id,
        split,
    })
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let id_text: String = row.get("id")?;
    let project_text: String = row.get("project_id")?;
    let status_text: String = row.get("status")?;
    let duration: i64 = row.get("duration_days")?;
    let offset: i64 = row.get("offset_days")?;

    let conditional_tag = match row.get::<_, Option<String>>("conditional_tag")? {
        Some(value) => Some(
            ConditionalTag::parse(&value)
                .ok_or_else(|| invalid_code(&value, "tasks.conditional_tag"))?,
        ),
        None => None,
    };

    let template_id = parse_optional_uuid(row.get("template_id")?, "tasks.template_id")?;
    let template_index: Option<i64> = row.get("template_index")?;
    let template_task_id = match (template_id, template_index) {
        (Some(template_id), Some(index)) => Some(TemplateTaskRef {
            template_id,
            index: u32::try_from(index)
                .map_err(|_| invalid_code(&index.to_string(), "tasks.template_index"))?,
        }),
        (None, None) => None,
        _ => {
            return Err(RepoError::InvalidData(format!(
                "task {id_text} has a partial template reference"
            )));
        }
    };

    let task = Task {
        id: parse_uuid(&id_text, "tasks.id")?,
        project_id: parse_uuid(&project_text, "tasks.project_id")?,
        component_id: parse_optional_uuid(row.get("component_id")?, "tasks.component_id")?,
        name: row.get("name")?,
        status: TaskStatus::parse(&status_text)
            .ok_or_else(|| invalid_code(&status_text, "tasks.status"))?,
        start_date: parse_optional_date(row.get("start_date")?, "tasks.start_date")?,
        end_date: parse_optional_date(row.get("end_date")?, "tasks.end_date")?,
        duration_days: u32::try_from(duration)
            .map_err(|_| invalid_code(&duration.to_string(), "tasks.duration_days"))?,
        offset_days: u32::try_from(offset)
            .map_err(|_| invalid_code(&offset.to_string(), "tasks.offset_days"))?,
        dependencies: Vec::new(),
        conditional_tag,
        is_hidden: parse_flag(row.get("is_hidden")?, "tasks.is_hidden")?,
        dates_overridden: parse_flag(row.get("dates_overridden")?, "tasks.dates_overridden")?,
        template_task_id,
        progress: row.get("progress")?,
        planned_cost: row.get("planned_cost")?,
        actual_cost: row.get("actual_cost")?,
    };
    task.validate()?;
    Ok(task)
}
