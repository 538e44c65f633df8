use chrono::NaiveDate;
use rusqlite::Connection;
use siteplan_core::db::open_db_in_memory;
use siteplan_core::model::project::ProjectCategory;
use siteplan_core::{
    Component, ComponentKind, Project, ProjectService, ScheduleOptions, ScheduleScope,
    ScheduleService, SqliteProjectRepository, SqliteTaskRepository, Task, TaskId, TaskService,
    TaskStatus,
};

type Repos<'conn> = (SqliteProjectRepository<'conn>, SqliteTaskRepository<'conn>);

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn repos(conn: &Connection) -> Repos<'_> {
    (
        SqliteProjectRepository::try_new(conn).unwrap(),
        SqliteTaskRepository::try_new(conn).unwrap(),
    )
}

fn schedule_service(
    conn: &Connection,
) -> ScheduleService<SqliteProjectRepository<'_>, SqliteTaskRepository<'_>> {
    let (projects, tasks) = repos(conn);
    ScheduleService::new(projects, tasks)
}

fn task_service(conn: &Connection) -> TaskService<SqliteProjectRepository<'_>, SqliteTaskRepository<'_>> {
    let (projects, tasks) = repos(conn);
    TaskService::new(projects, tasks)
}

fn seed_project(conn: &Connection) -> Project {
    let (projects, tasks) = repos(conn);
    let project = Project::new(
        "Medical centre",
        ProjectCategory::Commercial,
        date(2026, 4, 6),
        date(2026, 12, 18),
    );
    ProjectService::new(projects, tasks)
        .create_project(&project)
        .unwrap();
    project
}

struct Diamond {
    a: TaskId,
    b: TaskId,
    c: TaskId,
    d: TaskId,
}

/// A(2) -> B(3) -> D(1) and A(2) -> C(1) -> D(1).
fn seed_diamond(conn: &Connection, project: &Project) -> Diamond {
    let service = task_service(conn);
    let mut create = |name: &str, duration: u32, deps: Vec<TaskId>| {
        let mut task = Task::new(project.id, name, duration);
        task.dependencies = deps;
        service.create_task(&task).unwrap().id
    };
    let a = create("A", 2, vec![]);
    let b = create("B", 3, vec![a]);
    let c = create("C", 1, vec![a]);
    let d = create("D", 1, vec![b, c]);
    Diamond { a, b, c, d }
}

#[test]
fn diamond_critical_path_and_slack() {
    let conn = open_db_in_memory().unwrap();
    let project = seed_project(&conn);
    let diamond = seed_diamond(&conn, &project);

    let schedule = schedule_service(&conn)
        .compute(project.id, &ScheduleOptions::default())
        .unwrap();

    assert_eq!(schedule.critical_path, vec![diamond.a, diamond.b, diamond.d]);
    assert_eq!(schedule.critical_duration_days, 6);
    assert_eq!(schedule.finish_date, date(2026, 4, 12));

    let c = schedule.task(diamond.c).unwrap();
    assert_eq!(c.slack_days, 2);
    assert!(!c.is_critical);
    assert_eq!(c.start_date, date(2026, 4, 8));
    assert_eq!(c.latest_start_date, date(2026, 4, 10));
}

#[test]
fn compute_does_not_write_but_project_schedule_does() {
    let conn = open_db_in_memory().unwrap();
    let project = seed_project(&conn);
    let diamond = seed_diamond(&conn, &project);
    let service = schedule_service(&conn);
    let tasks = task_service(&conn);

    service
        .compute(project.id, &ScheduleOptions::default())
        .unwrap();
    assert_eq!(tasks.get_task(diamond.d).unwrap().unwrap().start_date, None);

    let written = service
        .calculate_project_schedule(project.id, &ScheduleOptions::default())
        .unwrap();
    assert_eq!(written.updated_task_ids.len(), 4);
    let d = tasks.get_task(diamond.d).unwrap().unwrap();
    assert_eq!(d.start_date, Some(date(2026, 4, 11)));
    assert_eq!(d.end_date, Some(date(2026, 4, 12)));

    let again = service
        .calculate_project_schedule(project.id, &ScheduleOptions::default())
        .unwrap();
    assert!(again.updated_task_ids.is_empty());
}

#[test]
fn task_schedule_respects_base_date_and_overrides() {
    let conn = open_db_in_memory().unwrap();
    let project = seed_project(&conn);
    let diamond = seed_diamond(&conn, &project);
    let service = schedule_service(&conn);
    let tasks = task_service(&conn);

    let entry = service
        .calculate_task_schedule(diamond.b, Some(date(2026, 5, 1)))
        .unwrap()
        .unwrap();
    assert_eq!(entry.start_date, date(2026, 5, 3));
    assert_eq!(
        tasks.get_task(diamond.b).unwrap().unwrap().end_date,
        Some(date(2026, 5, 6))
    );
    assert_eq!(tasks.get_task(diamond.a).unwrap().unwrap().start_date, None);

    tasks
        .override_dates(diamond.a, date(2026, 4, 20), date(2026, 4, 22))
        .unwrap();
    let written = service
        .calculate_project_schedule(project.id, &ScheduleOptions::default())
        .unwrap();
    assert!(!written.updated_task_ids.contains(&diamond.a));
    let a = tasks.get_task(diamond.a).unwrap().unwrap();
    assert_eq!(a.start_date, Some(date(2026, 4, 20)));
    let b = tasks.get_task(diamond.b).unwrap().unwrap();
    assert_eq!(b.start_date, Some(date(2026, 4, 22)));
}

#[test]
fn hidden_tasks_are_unscheduled() {
    let conn = open_db_in_memory().unwrap();
    let project = seed_project(&conn);
    let diamond = seed_diamond(&conn, &project);
    let tasks = task_service(&conn);
    tasks.set_hidden(diamond.b, true).unwrap();

    let service = schedule_service(&conn);
    assert_eq!(service.calculate_task_schedule(diamond.b, None).unwrap(), None);

    let schedule = service
        .compute(project.id, &ScheduleOptions::default())
        .unwrap();
    assert!(schedule.task(diamond.b).is_none());
    assert_eq!(schedule.critical_path, vec![diamond.a, diamond.c, diamond.d]);
    assert_eq!(schedule.critical_duration_days, 4);
}

#[test]
fn explicit_target_finish_adds_slack_everywhere() {
    let conn = open_db_in_memory().unwrap();
    let project = seed_project(&conn);
    let diamond = seed_diamond(&conn, &project);

    let options = ScheduleOptions {
        target_finish: Some(date(2026, 4, 15)),
        ..ScheduleOptions::default()
    };
    let schedule = schedule_service(&conn).compute(project.id, &options).unwrap();
    assert_eq!(schedule.task(diamond.a).unwrap().slack_days, 3);
    assert_eq!(schedule.task(diamond.c).unwrap().slack_days, 5);
    assert_eq!(schedule.target_finish_date, date(2026, 4, 15));
}

#[test]
fn component_scope_limits_tasks() {
    let conn = open_db_in_memory().unwrap();
    let project = seed_project(&conn);
    let (projects, task_repo) = repos(&conn);
    let project_service = ProjectService::new(projects, task_repo);
    let wing = Component::new(project.id, "East wing", ComponentKind::Building);
    project_service.create_component(&wing).unwrap();
    let mut floor = Component::new(project.id, "Level 2", ComponentKind::Floor);
    floor.parent_id = Some(wing.id);
    project_service.create_component(&floor).unwrap();

    let tasks = task_service(&conn);
    let mut inside = Task::new(project.id, "Partitions", 4);
    inside.component_id = Some(floor.id);
    let inside = tasks.create_task(&inside).unwrap();
    let outside = tasks
        .create_task(&Task::new(project.id, "Car park", 9))
        .unwrap();

    let options = ScheduleOptions {
        scope: ScheduleScope::Component(wing.id),
        ..ScheduleOptions::default()
    };
    let schedule = schedule_service(&conn).compute(project.id, &options).unwrap();
    assert!(schedule.task(inside.id).is_some());
    assert!(schedule.task(outside.id).is_none());
    assert_eq!(schedule.critical_duration_days, 4);
}

#[test]
fn ready_tasks_follow_dependency_status() {
    let conn = open_db_in_memory().unwrap();
    let project = seed_project(&conn);
    let diamond = seed_diamond(&conn, &project);
    let service = schedule_service(&conn);
    let tasks = task_service(&conn);

    let ready: Vec<TaskId> = service
        .ready_tasks(project.id)
        .unwrap()
        .into_iter()
        .map(|task| task.id)
        .collect();
    assert_eq!(ready, vec![diamond.a]);

    tasks.update_status(diamond.a, TaskStatus::Done).unwrap();
    let ready: Vec<TaskId> = service
        .ready_tasks(project.id)
        .unwrap()
        .into_iter()
        .map(|task| task.id)
        .collect();
    assert_eq!(ready, vec![diamond.b, diamond.c]);

    tasks.update_status(diamond.b, TaskStatus::Done).unwrap();
    tasks.update_status(diamond.c, TaskStatus::InProgress).unwrap();
    let ready: Vec<TaskId> = service
        .ready_tasks(project.id)
        .unwrap()
        .into_iter()
        .map(|task| task.id)
        .collect();
    assert_eq!(ready, vec![diamond.c]);
}
