//! Operator CLI for the scheduling engine.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `siteplan_core` linkage.
//! - Print schedules, ready tasks and variance for one project database.
//!
//! # Invariants
//! - Read-only: no command writes to the database.
//! - Output is deterministic line-oriented text.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::error;
use siteplan_core::model::{format_date, parse_date};
use siteplan_core::{
    open_db, BaselineService, BaselineType, EngineError, LoggingConfig, ProjectId,
    ProjectVariance, ScheduleOptions, ScheduleService, SqliteBaselineRepository,
    SqliteProjectRepository, SqliteTaskRepository,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "siteplan", version, about = "Project scheduling and baseline engine")]
struct Cli {
    /// Absolute directory for rolling log files.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Checks that the core library links and responds.
    Ping,
    /// Prints the core crate version.
    Version,
    /// Computes the project schedule without writing it.
    Schedule {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        project: ProjectId,
        /// Day zero as YYYY-MM-DD; defaults to the project start.
        #[arg(long, value_parser = parse_date_arg)]
        base_date: Option<NaiveDate>,
    },
    /// Lists tasks whose dependencies are all done.
    Ready {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        project: ProjectId,
    },
    /// Compares current state with the latest baseline.
    Variance {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        project: ProjectId,
        #[arg(long = "type", value_parser = parse_baseline_type, default_value = "execution")]
        baseline_type: BaselineType,
    },
}

fn parse_date_arg(value: &str) -> Result<NaiveDate, String> {
    parse_date(value).ok_or_else(|| format!("expected YYYY-MM-DD, got `{value}`"))
}

fn parse_baseline_type(value: &str) -> Result<BaselineType, String> {
    BaselineType::parse(value).ok_or_else(|| format!("expected contract|execution, got `{value}`"))
}

#[derive(Debug)]
enum CliError {
    Db(siteplan_core::DbError),
    Repo(siteplan_core::RepoError),
    Engine(EngineError),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "database: {err}"),
            Self::Repo(err) => write!(f, "repository: {err}"),
            Self::Engine(err) => write!(f, "{}: {err}", err.kind()),
        }
    }
}

impl From<siteplan_core::DbError> for CliError {
    fn from(value: siteplan_core::DbError) -> Self {
        Self::Db(value)
    }
}

impl From<siteplan_core::RepoError> for CliError {
    fn from(value: siteplan_core::RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<EngineError> for CliError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Some(dir) = &cli.log_dir {
        if let Err(err) = siteplan_core::init_logging(&LoggingConfig::with_dir(dir)) {
            eprintln!("logging disabled: {err}");
        }
    }

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_command module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), CliError> {
    match command {
        Command::Ping => println!("siteplan_core ping={}", siteplan_core::ping()),
        Command::Version => println!("siteplan_core version={}", siteplan_core::core_version()),
        Command::Schedule {
            db,
            project,
            base_date,
        } => {
            let conn = open_db(db)?;
            let service = ScheduleService::new(
                SqliteProjectRepository::try_new(&conn)?,
                SqliteTaskRepository::try_new(&conn)?,
            );
            let options = ScheduleOptions {
                base_date,
                ..ScheduleOptions::default()
            };
            let schedule = service.compute(project, &options)?;
            println!(
                "project={} base={} finish={} critical_days={}",
                schedule.project_id,
                format_date(schedule.base_date),
                format_date(schedule.finish_date),
                schedule.critical_duration_days
            );
            for task in &schedule.tasks {
                println!(
                    "task={} start={} end={} slack={} critical={}{}",
                    task.task_id,
                    format_date(task.start_date),
                    format_date(task.end_date),
                    task.slack_days,
                    task.is_critical,
                    if task.dates_overridden { " pinned" } else { "" }
                );
            }
        }
        Command::Ready { db, project } => {
            let conn = open_db(db)?;
            let service = ScheduleService::new(
                SqliteProjectRepository::try_new(&conn)?,
                SqliteTaskRepository::try_new(&conn)?,
            );
            for task in service.ready_tasks(project)? {
                println!("task={} name={}", task.id, task.name);
            }
        }
        Command::Variance {
            db,
            project,
            baseline_type,
        } => {
            let conn = open_db(db)?;
            let service = BaselineService::new(
                SqliteProjectRepository::try_new(&conn)?,
                SqliteTaskRepository::try_new(&conn)?,
                SqliteBaselineRepository::try_new(&conn)?,
            );
            match service.calculate_project_variance(project, baseline_type)? {
                ProjectVariance::NoBaseline { .. } => {
                    println!(
                        "project={} type={} result=no_baseline",
                        project,
                        baseline_type.as_str()
                    );
                }
                ProjectVariance::Measured(report) => {
                    let percentage = report
                        .cost_variance_percentage
                        .map_or_else(|| "n/a".to_string(), |value| format!("{value:.2}%"));
                    println!(
                        "project={} type={} version={} schedule_days={} cost={:.2} cost_pct={}",
                        project,
                        baseline_type.as_str(),
                        report.baseline_version,
                        report.schedule_variance_days,
                        report.cost_variance,
                        percentage
                    );
                }
            }
        }
    }
    Ok(())
}
