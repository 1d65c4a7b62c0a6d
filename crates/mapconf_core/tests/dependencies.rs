use mapconf_core::db::open_db_in_memory;
use mapconf_core::{
    payload_from_value, Dependent, DependencyReport, DependencyService, ErrorKind, GuardedDelete,
    Payload, RecordMeta, RecordRepository, Section, SqliteRecordRepository,
};
use rusqlite::Connection;
use serde_json::{json, Value};

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn payload(value: Value) -> Payload {
    payload_from_value(value).unwrap()
}

fn add(conn: &Connection, section: Section, project: &str, value: Value) -> i64 {
    let repo = SqliteRecordRepository::try_new(conn).unwrap();
    repo.add(section, project, &payload(value), &RecordMeta::default())
        .unwrap()
}

#[test]
fn layer_referencing_source_is_reported() {
    let conn = setup();
    let source_id = add(
        &conn,
        Section::Sources,
        "base",
        json!({"data": {"name": "foo_source"}}),
    );
    assert_eq!(source_id, 1);
    let layer_id = add(
        &conn,
        Section::Layers,
        "base",
        json!({"data": {"name": "foo_layer", "sources": [source_id]}}),
    );
    assert_eq!(layer_id, 2);

    let service = DependencyService::new(SqliteRecordRepository::try_new(&conn).unwrap());
    let report = service
        .check_dependencies(source_id, "base", &[(Section::Layers, "sources")])
        .unwrap();

    assert_eq!(
        report,
        DependencyReport::from([(
            Section::Layers,
            vec![Dependent {
                id: layer_id,
                name: Some("foo_layer".to_string()),
            }]
        )])
    );
    assert_eq!(
        serde_json::to_value(&report).unwrap(),
        json!({"layers": [{"_id": layer_id, "name": "foo_layer"}]})
    );
}

#[test]
fn unreferenced_record_yields_empty_report() {
    let conn = setup();
    let source_id = add(&conn, Section::Sources, "base", json!({"data": {"name": "lonely"}}));
    add(
        &conn,
        Section::Layers,
        "base",
        json!({"data": {"name": "other", "sources": [source_id + 100]}}),
    );

    let service = DependencyService::new(SqliteRecordRepository::try_new(&conn).unwrap());
    let report = service
        .check_dependencies(
            source_id,
            "base",
            &[(Section::Layers, "sources"), (Section::Caches, "sources")],
        )
        .unwrap();

    assert_eq!(report, DependencyReport::new());
    assert_eq!(serde_json::to_value(&report).unwrap(), json!({}));
}

#[test]
fn sections_without_matches_are_omitted() {
    let conn = setup();
    let grid_id = add(&conn, Section::Grids, "base", json!({"data": {"name": "utm32"}}));
    let cache_id = add(
        &conn,
        Section::Caches,
        "base",
        json!({"data": {"name": "osm_cache", "grids": [grid_id], "sources": []}}),
    );
    let service_id = add(
        &conn,
        Section::Services,
        "base",
        json!({"grid": grid_id, "name": "tms"}),
    );

    let service = DependencyService::new(SqliteRecordRepository::try_new(&conn).unwrap());
    let report = service
        .check_dependencies(
            grid_id,
            "base",
            &[
                (Section::Layers, "grids"),
                (Section::Caches, "grids"),
                (Section::Services, "grid"),
            ],
        )
        .unwrap();

    assert_eq!(report.len(), 2);
    assert!(!report.contains_key(&Section::Layers));
    assert_eq!(report[&Section::Caches][0].id, cache_id);
    assert_eq!(
        report[&Section::Services],
        vec![Dependent {
            id: service_id,
            name: Some("tms".to_string()),
        }]
    );
}

#[test]
fn dependents_without_name_and_other_projects() {
    let conn = setup();
    let source_id = add(&conn, Section::Sources, "base", json!({"data": {}}));
    let unnamed = add(
        &conn,
        Section::Caches,
        "base",
        json!({"data": {"sources": [source_id]}}),
    );
    add(
        &conn,
        Section::Caches,
        "other",
        json!({"data": {"name": "foreign", "sources": [source_id]}}),
    );

    let service = DependencyService::new(SqliteRecordRepository::try_new(&conn).unwrap());
    let report = service
        .check_dependencies(source_id, "base", &[(Section::Caches, "sources")])
        .unwrap();

    assert_eq!(
        report[&Section::Caches],
        vec![Dependent {
            id: unnamed,
            name: None,
        }]
    );
    assert_eq!(
        serde_json::to_value(&report).unwrap(),
        json!({"caches": [{"_id": unnamed}]})
    );
}

#[test]
fn guarded_delete_blocks_until_dependents_are_gone() {
    let conn = setup();
    let source_id = add(&conn, Section::Sources, "base", json!({"data": {"name": "src"}}));
    let layer_id = add(
        &conn,
        Section::Layers,
        "base",
        json!({"data": {"name": "lyr", "sources": [source_id]}}),
    );
    let look_for = [(Section::Layers, "sources"), (Section::Caches, "sources")];

    let service = DependencyService::new(SqliteRecordRepository::try_new(&conn).unwrap());
    match service
        .delete_unreferenced(source_id, Section::Sources, "base", &look_for)
        .unwrap()
    {
        GuardedDelete::Blocked(report) => {
            assert_eq!(report[&Section::Layers][0].id, layer_id);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    assert!(repo.get(source_id, Section::Sources, "base").unwrap().is_some());
    assert!(repo.delete(layer_id, Section::Layers, "base").unwrap());

    assert_eq!(
        service
            .delete_unreferenced(source_id, Section::Sources, "base", &look_for)
            .unwrap(),
        GuardedDelete::Deleted
    );
    assert_eq!(
        service
            .delete_unreferenced(source_id, Section::Sources, "base", &look_for)
            .unwrap(),
        GuardedDelete::NotFound
    );
}

#[test]
fn repeated_section_reports_dependent_once() {
    let conn = setup();
    let source_id = add(&conn, Section::Sources, "base", json!({"data": {"name": "src"}}));
    let layer_id = add(
        &conn,
        Section::Layers,
        "base",
        json!({"data": {"name": "mixed", "sources": [source_id], "caches": [source_id]}}),
    );

    let service = DependencyService::new(SqliteRecordRepository::try_new(&conn).unwrap());
    let report = service
        .check_dependencies(
            source_id,
            "base",
            &[(Section::Layers, "sources"), (Section::Layers, "caches")],
        )
        .unwrap();
    assert_eq!(
        report[&Section::Layers],
        vec![Dependent {
            id: layer_id,
            name: Some("mixed".to_string()),
        }]
    );

    match service
        .delete_unreferenced(
            source_id,
            Section::Sources,
            "base",
            &[(Section::Layers, "sources"), (Section::Layers, "caches")],
        )
        .unwrap()
    {
        GuardedDelete::Blocked(blocked) => assert_eq!(blocked, report),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn guarded_delete_refuses_records_with_children() {
    let conn = setup();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let group = repo
        .add(
            Section::Layers,
            "base",
            &payload(json!({"data": {"name": "group"}})),
            &RecordMeta::default(),
        )
        .unwrap();
    repo.add(
        Section::Layers,
        "base",
        &payload(json!({"data": {"name": "child"}})),
        &RecordMeta::default().with_parent(group),
    )
    .unwrap();

    let service = DependencyService::new(repo);
    let err = service
        .delete_unreferenced(group, Section::Layers, "base", &[(Section::Caches, "layers")])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);

    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    assert!(repo.get(group, Section::Layers, "base").unwrap().is_some());
}
