use chrono::NaiveDate;
use rusqlite::Connection;
use siteplan_core::db::open_db_in_memory;
use siteplan_core::model::project::{ProjectCategory, ProjectStatus};
use siteplan_core::service::project_service::ProjectAttributes;
use siteplan_core::{
    Component, ComponentKind, EntityKind, ErrorKind, EventAction, Project, ProjectService,
    RecordingEventSink, SqliteProjectRepository, SqliteTaskRepository, Task, TaskService,
    TaskStatus,
};
use std::sync::Arc;

type Projects<'conn> = ProjectService<SqliteProjectRepository<'conn>, SqliteTaskRepository<'conn>>;
type Tasks<'conn> = TaskService<SqliteProjectRepository<'conn>, SqliteTaskRepository<'conn>>;

fn project_service(conn: &Connection) -> Projects<'_> {
    ProjectService::new(
        SqliteProjectRepository::try_new(conn).unwrap(),
        SqliteTaskRepository::try_new(conn).unwrap(),
    )
}

fn task_service(conn: &Connection) -> Tasks<'_> {
    TaskService::new(
        SqliteProjectRepository::try_new(conn).unwrap(),
        SqliteTaskRepository::try_new(conn).unwrap(),
    )
}

fn new_project() -> Project {
    Project::new(
        "Clinic refurbishment",
        ProjectCategory::Renovation,
        NaiveDate::from_ymd_opt(2026, 1, 12).unwrap(),
        NaiveDate::from_ymd_opt(2026, 5, 29).unwrap(),
    )
}

#[test]
fn task_edits_refresh_project_rollups() {
    let conn = open_db_in_memory().unwrap();
    let projects = project_service(&conn);
    let tasks = task_service(&conn);
    let project = new_project();
    projects.create_project(&project).unwrap();

    let strip_out = tasks
        .create_task(&Task::new(project.id, "Strip out", 3))
        .unwrap();
    let rewire = tasks
        .create_task(&Task::new(project.id, "Rewire", 1))
        .unwrap();

    tasks.update_progress(strip_out.id, 50.0).unwrap();
    tasks.update_costs(strip_out.id, 40.0, 25.0).unwrap();
    tasks.update_status(rewire.id, TaskStatus::Done).unwrap();
    tasks.update_costs(rewire.id, 10.0, 12.0).unwrap();

    let stored = projects.get_project(project.id).unwrap().unwrap();
    // (3 * 50 + 1 * 100) / 4
    assert!((stored.progress - 62.5).abs() < 1e-9);
    assert_eq!(stored.actual_cost, 37.0);

    tasks.set_hidden(rewire.id, true).unwrap();
    let stored = projects.get_project(project.id).unwrap().unwrap();
    assert!((stored.progress - 50.0).abs() < 1e-9);
    assert_eq!(stored.actual_cost, 25.0);

    tasks.delete_task(strip_out.id).unwrap();
    let stored = projects.get_project(project.id).unwrap().unwrap();
    assert_eq!(stored.progress, 0.0);
    assert_eq!(stored.actual_cost, 0.0);
}

#[test]
fn component_rollups_cover_their_subtree() {
    let conn = open_db_in_memory().unwrap();
    let projects = project_service(&conn);
    let tasks = task_service(&conn);
    let project = new_project();
    projects.create_project(&project).unwrap();

    let wing = Component::new(project.id, "North wing", ComponentKind::Building);
    let mut ward = Component::new(project.id, "Ward 3", ComponentKind::Zone);
    ward.parent_id = Some(wing.id);
    let plant = Component::new(project.id, "Plant room", ComponentKind::Utility);
    for component in [&wing, &ward, &plant] {
        projects.create_component(component).unwrap();
    }

    let mut ceilings = Task::new(project.id, "Ceilings", 2);
    ceilings.component_id = Some(ward.id);
    ceilings.actual_cost = 8.0;
    ceilings.progress = 100.0;
    let mut boiler = Task::new(project.id, "Boiler swap", 2);
    boiler.component_id = Some(plant.id);
    boiler.actual_cost = 30.0;
    tasks.create_task(&ceilings).unwrap();
    tasks.create_task(&boiler).unwrap();

    let rollups = projects.recalculate(project.id).unwrap();
    assert!((rollups.project.progress - 50.0).abs() < 1e-9);
    assert_eq!(rollups.project.actual_cost, 38.0);

    let rollup_for = |id| {
        rollups
            .components
            .iter()
            .find(|(component_id, _)| *component_id == id)
            .map(|(_, rollup)| *rollup)
            .unwrap()
    };
    assert_eq!(rollup_for(wing.id).progress, 100.0);
    assert_eq!(rollup_for(wing.id).actual_cost, 8.0);
    assert_eq!(rollup_for(plant.id).actual_cost, 30.0);

    let stored_wing = projects.get_component(wing.id).unwrap().unwrap();
    assert_eq!(stored_wing.progress, 100.0);
    assert_eq!(stored_wing.actual_cost, 8.0);
}

#[test]
fn components_must_nest_within_one_project() {
    let conn = open_db_in_memory().unwrap();
    let projects = project_service(&conn);
    let first = new_project();
    let second = new_project();
    projects.create_project(&first).unwrap();
    projects.create_project(&second).unwrap();

    let building = Component::new(first.id, "Block A", ComponentKind::Building);
    projects.create_component(&building).unwrap();

    let mut stray = Component::new(second.id, "Level 1", ComponentKind::Floor);
    stray.parent_id = Some(building.id);
    assert!(projects.create_component(&stray).is_err());
    assert_eq!(projects.list_components(second.id).unwrap().len(), 0);

    let mut task = Task::new(second.id, "Screed", 1);
    task.component_id = Some(building.id);
    assert!(task_service(&conn).create_task(&task).is_err());
}

#[test]
fn attribute_updates_validate_and_emit_events() {
    let conn = open_db_in_memory().unwrap();
    let sink = Arc::new(RecordingEventSink::new());
    let projects = project_service(&conn).with_event_sink(sink.clone());
    let project = new_project();
    projects.create_project(&project).unwrap();

    let updated = projects
        .update_attributes(
            project.id,
            &ProjectAttributes {
                status: Some(ProjectStatus::Active),
                planned_cost: Some(250_000.0),
                ..ProjectAttributes::default()
            },
        )
        .unwrap();
    assert_eq!(updated.status, ProjectStatus::Active);
    assert_eq!(updated.planned_cost, 250_000.0);
    assert_eq!(updated.name, project.name);

    let err = projects
        .update_attributes(
            project.id,
            &ProjectAttributes {
                end_date: NaiveDate::from_ymd_opt(2025, 12, 1),
                ..ProjectAttributes::default()
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let stored = projects.get_project(project.id).unwrap().unwrap();
    assert_eq!(stored.end_date, project.end_date);

    assert_eq!(sink.count(EntityKind::Project, EventAction::Created), 1);
    assert_eq!(sink.count(EntityKind::Project, EventAction::Updated), 1);
    let events = sink.events();
    assert!(events.iter().all(|event| event.project_id == Some(project.id)));
}

#[test]
fn task_events_are_emitted_after_commit() {
    let conn = open_db_in_memory().unwrap();
    let projects = project_service(&conn);
    let project = new_project();
    projects.create_project(&project).unwrap();

    let sink = Arc::new(RecordingEventSink::new());
    let tasks = task_service(&conn).with_event_sink(sink.clone());
    let task = tasks
        .create_task(&Task::new(project.id, "Asbestos survey", 2))
        .unwrap();
    tasks.update_status(task.id, TaskStatus::InProgress).unwrap();

    let mut cyclic = Task::new(project.id, "Self", 1);
    cyclic.dependencies = vec![cyclic.id];
    assert!(tasks.create_task(&cyclic).is_err());

    tasks.delete_task(task.id).unwrap();

    let events = sink.events();
    let actions: Vec<EventAction> = events.iter().map(|event| event.action).collect();
    assert_eq!(
        actions,
        vec![EventAction::Created, EventAction::Updated, EventAction::Deleted]
    );
    assert!(events.iter().all(|event| event.entity_id == task.id));
}

#[test]
fn non_finite_costs_are_validation_errors() {
    let conn = open_db_in_memory().unwrap();
    let projects = project_service(&conn);
    let tasks = task_service(&conn);
    let project = new_project();
    projects.create_project(&project).unwrap();
    let task = tasks
        .create_task(&Task::new(project.id, "Scaffold hire", 4))
        .unwrap();
    tasks.update_costs(task.id, 60.0, 15.0).unwrap();

    for (planned, actual) in [
        (f64::INFINITY, 0.0),
        (f64::NAN, 0.0),
        (10.0, f64::NEG_INFINITY),
        (10.0, f64::NAN),
    ] {
        let err = tasks.update_costs(task.id, planned, actual).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
    let stored = tasks.get_task(task.id).unwrap().unwrap();
    assert_eq!((stored.planned_cost, stored.actual_cost), (60.0, 15.0));

    let mut unbounded = Task::new(project.id, "Crane", 1);
    unbounded.planned_cost = f64::INFINITY;
    assert_eq!(
        tasks.create_task(&unbounded).unwrap_err().kind(),
        ErrorKind::Validation
    );

    let err = projects
        .update_attributes(
            project.id,
            &ProjectAttributes {
                planned_cost: Some(f64::NAN),
                ..ProjectAttributes::default()
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let stored = projects.get_project(project.id).unwrap().unwrap();
    assert_eq!(stored.planned_cost, project.planned_cost);
    assert_eq!(stored.actual_cost, 15.0);
}
