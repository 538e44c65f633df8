use chrono::NaiveDate;
use rusqlite::Connection;
use siteplan_core::db::open_db_in_memory;
use siteplan_core::model::project::ProjectCategory;
use siteplan_core::service::project_service::ProjectAttributes;
use siteplan_core::{
    Component, ComponentKind, ConditionalTag, EntityKind, EventAction, Project, ProjectService,
    RecordingEventSink, SqliteProjectRepository, SqliteTaskRepository, TagService, Task,
    TaskService,
};
use std::sync::Arc;

fn projects(conn: &Connection) -> ProjectService<SqliteProjectRepository<'_>, SqliteTaskRepository<'_>> {
    ProjectService::new(
        SqliteProjectRepository::try_new(conn).unwrap(),
        SqliteTaskRepository::try_new(conn).unwrap(),
    )
}

fn tasks(conn: &Connection) -> TaskService<SqliteProjectRepository<'_>, SqliteTaskRepository<'_>> {
    TaskService::new(
        SqliteProjectRepository::try_new(conn).unwrap(),
        SqliteTaskRepository::try_new(conn).unwrap(),
    )
}

fn tag_service(conn: &Connection) -> TagService<SqliteProjectRepository<'_>, SqliteTaskRepository<'_>> {
    TagService::new(
        SqliteProjectRepository::try_new(conn).unwrap(),
        SqliteTaskRepository::try_new(conn).unwrap(),
    )
}

fn seed_project(conn: &Connection) -> Project {
    let project = Project::new(
        "Terrace houses",
        ProjectCategory::Residential,
        NaiveDate::from_ymd_opt(2026, 7, 6).unwrap(),
        NaiveDate::from_ymd_opt(2027, 4, 30).unwrap(),
    );
    projects(conn).create_project(&project).unwrap();
    project
}

fn tagged(project: &Project, name: &str, tag: ConditionalTag) -> Task {
    let mut task = Task::new(project.id, name, 3);
    task.conditional_tag = Some(tag);
    task
}

#[test]
fn creation_applies_initial_visibility() {
    let conn = open_db_in_memory().unwrap();
    let project = seed_project(&conn);
    let service = tasks(&conn);

    let basement = service
        .create_task(&tagged(&project, "Basement slab", ConditionalTag::HasBasement))
        .unwrap();
    let homes = service
        .create_task(&tagged(&project, "Kitchen fit-out", ConditionalTag::ResidentialOnly))
        .unwrap();
    assert!(basement.is_hidden);
    assert!(!homes.is_hidden);
}

#[test]
fn processing_is_idempotent_and_follows_attribute_changes() {
    let conn = open_db_in_memory().unwrap();
    let project = seed_project(&conn);
    let task_service = tasks(&conn);
    let basement = task_service
        .create_task(&tagged(&project, "Basement slab", ConditionalTag::HasBasement))
        .unwrap();
    let lift = task_service
        .create_task(&tagged(&project, "Lift shaft", ConditionalTag::RequiresElevator))
        .unwrap();
    task_service
        .create_task(&Task::new(project.id, "Site fence", 1))
        .unwrap();

    let sink = Arc::new(RecordingEventSink::new());
    let service = tag_service(&conn).with_event_sink(sink.clone());

    let first = service.process_project_conditional_tags(project.id).unwrap();
    assert_eq!(first.processed, 2);
    assert_eq!(first.changed, 0);

    projects(&conn)
        .update_attributes(
            project.id,
            &ProjectAttributes {
                has_basement: Some(true),
                floors: Some(5),
                ..ProjectAttributes::default()
            },
        )
        .unwrap();

    let second = service.process_project_conditional_tags(project.id).unwrap();
    assert_eq!(second.changed, 2);
    assert!(second.changed_task_ids.contains(&basement.id));
    assert!(second.changed_task_ids.contains(&lift.id));
    assert!(!task_service.get_task(basement.id).unwrap().unwrap().is_hidden);
    assert_eq!(sink.count(EntityKind::Task, EventAction::Updated), 2);

    let third = service.process_project_conditional_tags(project.id).unwrap();
    assert_eq!(third.changed, 0);
    assert_eq!(sink.count(EntityKind::Task, EventAction::Updated), 2);
}

#[test]
fn manual_toggles_on_tagged_tasks_are_overwritten() {
    let conn = open_db_in_memory().unwrap();
    let project = seed_project(&conn);
    let task_service = tasks(&conn);
    let tagged_task = task_service
        .create_task(&tagged(&project, "Kitchen fit-out", ConditionalTag::ResidentialOnly))
        .unwrap();
    let plain = task_service
        .create_task(&Task::new(project.id, "Landscaping", 2))
        .unwrap();
    task_service.set_hidden(tagged_task.id, true).unwrap();
    task_service.set_hidden(plain.id, true).unwrap();

    let report = tag_service(&conn)
        .process_project_conditional_tags(project.id)
        .unwrap();
    assert_eq!(report.changed_task_ids, vec![tagged_task.id]);
    assert!(!task_service.get_task(tagged_task.id).unwrap().unwrap().is_hidden);
    assert!(task_service.get_task(plain.id).unwrap().unwrap().is_hidden);
}

#[test]
fn component_context_drives_component_tags() {
    let conn = open_db_in_memory().unwrap();
    let project = seed_project(&conn);
    let roof = Component::new(project.id, "Main roof", ComponentKind::Roof);
    let mut cellar = Component::new(project.id, "Cellar", ComponentKind::Floor);
    cellar.level = Some(-1);
    let project_service = projects(&conn);
    project_service.create_component(&roof).unwrap();
    project_service.create_component(&cellar).unwrap();

    let task_service = tasks(&conn);
    let mut on_roof = tagged(&project, "Membrane", ConditionalTag::RoofWorks);
    on_roof.component_id = Some(roof.id);
    let mut misplaced = tagged(&project, "Gutters", ConditionalTag::RoofWorks);
    misplaced.component_id = Some(cellar.id);
    let mut below = tagged(&project, "Tanking", ConditionalTag::BelowGrade);
    below.component_id = Some(cellar.id);

    assert!(!task_service.create_task(&on_roof).unwrap().is_hidden);
    assert!(task_service.create_task(&misplaced).unwrap().is_hidden);
    assert!(!task_service.create_task(&below).unwrap().is_hidden);

    let report = tag_service(&conn)
        .process_project_conditional_tags(project.id)
        .unwrap();
    assert_eq!(report.processed, 3);
    assert_eq!(report.changed, 0);
}

#[test]
fn available_tags_depend_on_category() {
    let conn = open_db_in_memory().unwrap();
    let project = seed_project(&conn);
    let service = tag_service(&conn);

    let residential = service.available_conditional_tags(project.id).unwrap();
    assert!(residential.contains(&ConditionalTag::HasBasement));

    projects(&conn)
        .update_attributes(
            project.id,
            &ProjectAttributes {
                category: Some(ProjectCategory::Infrastructure),
                ..ProjectAttributes::default()
            },
        )
        .unwrap();
    let infrastructure = service.available_conditional_tags(project.id).unwrap();
    assert!(!infrastructure.contains(&ConditionalTag::HasBasement));
    assert!(infrastructure.contains(&ConditionalTag::Sitework));
}
