//! Ordered schema steps for the engine database.
//!
//! # Invariants
//! - Step numbers start at 1 and increase by exactly one.
//! - The last applied step is mirrored to `PRAGMA user_version`.
//! - Pending steps run inside one IMMEDIATE transaction, so two processes
//!   opening a fresh file cannot both apply step 1.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::{Connection, TransactionBehavior};

/// `(user_version after the step, label, script)`.
const STEPS: &[(u32, &str, &str)] = &[
    (
        1,
        "projects_tasks",
        include_str!("0001_projects_tasks.sql"),
    ),
    (
        2,
        "work_templates",
        include_str!("0002_work_templates.sql"),
    ),
    (3, "baselines", include_str!("0003_baselines.sql")),
    (
        4,
        "baseline_version_counters",
        include_str!("0004_baseline_version_counters.sql"),
    ),
];

/// Schema version this build writes and expects.
pub fn latest_version() -> u32 {
    STEPS.last().map_or(0, |(version, _, _)| *version)
}

/// Brings `conn` up to [`latest_version`]; a newer file is refused.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let found: u32 = tx.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let latest = latest_version();
    if found > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: found,
            latest_supported: latest,
        });
    }

    let pending = STEPS.iter().filter(|(version, _, _)| *version > found);
    let mut applied = 0usize;
    for (version, label, script) in pending {
        tx.execute_batch(script)?;
        tx.pragma_update(None, "user_version", version)?;
        applied += 1;
        info!("event=db_migrate module=db status=ok version={version} step={label}");
    }
    tx.commit()?;

    if applied > 0 {
        info!("event=db_migrate module=db status=done from={found} to={latest} steps={applied}");
    }
    Ok(())
}
