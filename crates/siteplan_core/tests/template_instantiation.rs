use chrono::NaiveDate;
use rusqlite::Connection;
use siteplan_core::db::open_db_in_memory;
use siteplan_core::model::project::ProjectCategory;
use siteplan_core::{
    ApplyOptions, ErrorKind, Project, ProjectService, SqliteProjectRepository,
    SqliteTaskRepository, SqliteTemplateRepository, TaskService, TemplateData, TemplateService,
    TemplateTaskDef, WorkTemplate, WorkloadService,
};

type Templates<'conn> = TemplateService<
    SqliteProjectRepository<'conn>,
    SqliteTaskRepository<'conn>,
    SqliteTemplateRepository<'conn>,
>;

const FRAMING_JSON: &str = r#"{
    "tasks": [
        { "name": "Set out", "duration_days": 1 },
        { "name": "Wall frames", "duration_days": 4, "depends_on": [0] },
        { "name": "Roof trusses", "duration_days": 2, "depends_on": [0, 1],
          "assignee_hint": "carpenters" },
        { "name": "Basement waterproofing", "duration_days": 3,
          "conditional_tag": "has_basement" }
    ]
}"#;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn template_service(conn: &Connection) -> Templates<'_> {
    TemplateService::new(
        SqliteProjectRepository::try_new(conn).unwrap(),
        SqliteTaskRepository::try_new(conn).unwrap(),
        SqliteTemplateRepository::try_new(conn).unwrap(),
    )
}

fn task_service(conn: &Connection) -> TaskService<SqliteProjectRepository<'_>, SqliteTaskRepository<'_>> {
    TaskService::new(
        SqliteProjectRepository::try_new(conn).unwrap(),
        SqliteTaskRepository::try_new(conn).unwrap(),
    )
}

fn seed_project(conn: &Connection) -> Project {
    let service = ProjectService::new(
        SqliteProjectRepository::try_new(conn).unwrap(),
        SqliteTaskRepository::try_new(conn).unwrap(),
    );
    let project = Project::new(
        "Two-storey house",
        ProjectCategory::Residential,
        date(2026, 9, 7),
        date(2027, 3, 26),
    );
    service.create_project(&project).unwrap();
    project
}

fn framing_template() -> WorkTemplate {
    let data = TemplateData::from_json_str(FRAMING_JSON).unwrap();
    WorkTemplate::new("Timber framing", "framing", data)
}

#[test]
fn persisted_apply_creates_tasks_edges_and_assignments() {
    let conn = open_db_in_memory().unwrap();
    let project = seed_project(&conn);
    let service = template_service(&conn);
    let template = framing_template();
    service.create_template(&template).unwrap();

    let plan = service
        .apply_template(template.id, project.id, None, &ApplyOptions::default())
        .unwrap();
    assert!(plan.persisted);
    assert_eq!(plan.created_tasks, 4);
    assert_eq!(plan.created_dependencies, 3);
    // Only the hinted definition gets an assignee without a default.
    assert_eq!(plan.assignments.len(), 1);
    assert_eq!(plan.assignments[0].user_id, "carpenters");

    let stored = task_service(&conn).list_tasks(project.id).unwrap();
    assert_eq!(stored.len(), 4);
    let by_name = |name: &str| stored.iter().find(|task| task.name == name).unwrap();

    let set_out = by_name("Set out");
    let frames = by_name("Wall frames");
    let trusses = by_name("Roof trusses");
    assert_eq!(frames.dependencies, vec![set_out.id]);
    assert_eq!(trusses.dependencies, vec![set_out.id, frames.id]);
    assert_eq!(trusses.start_date, Some(date(2026, 9, 12)));
    assert_eq!(trusses.end_date, Some(date(2026, 9, 14)));

    let waterproofing = by_name("Basement waterproofing");
    assert!(waterproofing.is_hidden);
    assert_eq!(waterproofing.start_date, None);
    for task in &stored {
        let link = task.template_task_id.unwrap();
        assert_eq!(link.template_id, template.id);
    }

    let workload = WorkloadService::new(SqliteTaskRepository::try_new(&conn).unwrap());
    assert_eq!(workload.allocated_total(trusses.id).unwrap(), 100.0);
}

#[test]
fn preview_writes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let project = seed_project(&conn);
    let service = template_service(&conn);
    let template = framing_template();
    service.create_template(&template).unwrap();

    let options = ApplyOptions {
        preview_only: true,
        default_assignee_id: Some("site-lead".to_string()),
        ..ApplyOptions::default()
    };
    let plan = service
        .apply_template(template.id, project.id, None, &options)
        .unwrap();
    assert!(!plan.persisted);
    assert_eq!(plan.tasks.len(), 4);
    assert_eq!(plan.assignments.len(), 4);
    assert!(plan
        .assignments
        .iter()
        .all(|assignment| assignment.user_id == "site-lead"));

    assert!(task_service(&conn).list_tasks(project.id).unwrap().is_empty());
    // Nothing references the template yet, so it is still editable.
    service
        .replace_template_data(template.id, &template.data)
        .unwrap();
}

#[test]
fn template_is_frozen_once_tasks_reference_it() {
    let conn = open_db_in_memory().unwrap();
    let project = seed_project(&conn);
    let service = template_service(&conn);
    let template = framing_template();
    service.create_template(&template).unwrap();
    service
        .apply_template(template.id, project.id, None, &ApplyOptions::default())
        .unwrap();

    let err = service
        .replace_template_data(template.id, &template.data)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InUse);

    let mut revised = template.data.clone();
    revised.tasks[1].duration_days = 5;
    let bumped = service
        .duplicate_with_version_bump(template.id, Some(revised))
        .unwrap();
    assert_ne!(bumped.id, template.id);
    assert_eq!(bumped.version, 2);
    assert_eq!(bumped.data.tasks[1].duration_days, 5);

    let again = service.duplicate_with_version_bump(template.id, None).unwrap();
    assert_eq!(again.version, 3);

    let family = service.list_templates(Some("framing")).unwrap();
    let versions: Vec<u32> = family.iter().map(|template| template.version).collect();
    assert_eq!(versions, vec![1, 2, 3]);
    let original = service.get_template(template.id).unwrap().unwrap();
    assert_eq!(original.data.tasks[1].duration_days, 4);
}

#[test]
fn attach_after_links_roots_to_existing_tasks() {
    let conn = open_db_in_memory().unwrap();
    let project = seed_project(&conn);
    let tasks = task_service(&conn);
    let slab = tasks
        .create_task(&siteplan_core::Task::new(project.id, "Slab pour", 3))
        .unwrap();

    let service = template_service(&conn);
    let template = framing_template();
    let options = ApplyOptions {
        attach_after: vec![slab.id],
        ..ApplyOptions::default()
    };
    let plan = service.apply(&template, project.id, None, &options).unwrap();
    assert_eq!(plan.created_dependencies, 5);

    let set_out = plan.tasks.iter().find(|task| task.name == "Set out").unwrap();
    assert_eq!(set_out.dependencies, vec![slab.id]);
    assert_eq!(set_out.start_date, Some(date(2026, 9, 10)));

    assert_eq!(tasks.delete_task(slab.id).unwrap_err().kind(), ErrorKind::InUse);
}

#[test]
fn unknown_attach_target_is_rejected_without_writes() {
    let conn = open_db_in_memory().unwrap();
    let project = seed_project(&conn);
    let service = template_service(&conn);

    let options = ApplyOptions {
        attach_after: vec![uuid::Uuid::new_v4()],
        ..ApplyOptions::default()
    };
    let err = service
        .apply(&framing_template(), project.id, None, &options)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownReference);
    assert!(task_service(&conn).list_tasks(project.id).unwrap().is_empty());
}

#[test]
fn malformed_template_data_is_rejected() {
    let cyclic = r#"{"tasks":[
        {"name":"A","duration_days":1,"depends_on":[1]},
        {"name":"B","duration_days":1,"depends_on":[0]}
    ]}"#;
    assert!(TemplateData::from_json_str(cyclic).is_err());
    assert!(TemplateData::from_json_str(r#"{"tasks":[{"name":"A","depends_on":[3]}]}"#).is_err());
    assert!(TemplateData::from_json_str("not json").is_err());
    assert!(TemplateData::from_json_str(r#"{"tasks":[]}"#).is_err());
}

#[test]
fn bad_category_slug_is_a_validation_error() {
    let conn = open_db_in_memory().unwrap();
    let service = template_service(&conn);
    let template = WorkTemplate::new("Framing", "Timber Framing", framing_template().data);
    assert_eq!(
        service.create_template(&template).unwrap_err().kind(),
        ErrorKind::Validation
    );
}

#[test]
fn oversized_template_is_refused_before_any_task_is_built() {
    let conn = open_db_in_memory().unwrap();
    let project = seed_project(&conn);
    let service = template_service(&conn);
    let data = TemplateData::new(vec![
        TemplateTaskDef::new("Pile", 1);
        TemplateData::MAX_TASKS + 1
    ]);
    let template = WorkTemplate::new("Piling", "piling", data);

    let options = ApplyOptions {
        preview_only: true,
        ..ApplyOptions::default()
    };
    let err = service
        .apply(&template, project.id, None, &options)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(
        service.create_template(&template).unwrap_err().kind(),
        ErrorKind::Validation
    );
    assert!(task_service(&conn).list_tasks(project.id).unwrap().is_empty());
}
