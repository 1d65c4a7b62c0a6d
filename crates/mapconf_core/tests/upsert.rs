use mapconf_core::db::open_db_in_memory;
use mapconf_core::{
    key_literal, payload_from_value, ErrorKind, GetAllOptions, Payload, RecordMeta,
    RecordRepository, Section, SqliteRecordRepository, UpsertOutcome, UpsertService,
};
use rusqlite::Connection;
use serde_json::{json, Value};

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn payload(value: Value) -> Payload {
    payload_from_value(value).unwrap()
}

fn capabilities(url: &str, title: &str) -> Payload {
    payload(json!({
        "url": url,
        "title": title,
        "layer": {"name": "root", "layers": []}
    }))
}

#[test]
fn first_import_inserts_and_reimport_updates_in_place() {
    let conn = setup();
    let service = UpsertService::new(SqliteRecordRepository::try_new(&conn).unwrap());

    let first = service
        .upsert_by_key(
            Section::WmsCapabilities,
            "base",
            "url",
            &capabilities("http://example.com/wms", "Old title"),
        )
        .unwrap();
    assert!(first.created);

    let second = service
        .upsert_by_key(
            Section::WmsCapabilities,
            "base",
            "url",
            &capabilities("http://example.com/wms", "New title"),
        )
        .unwrap();
    assert_eq!(
        second,
        UpsertOutcome {
            id: first.id,
            created: false,
        }
    );

    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let all = repo
        .get_all(Section::WmsCapabilities, "base", &GetAllOptions::default())
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[&first.id], capabilities("http://example.com/wms", "New title"));

    let record = repo
        .get(first.id, Section::WmsCapabilities, "base")
        .unwrap()
        .unwrap();
    assert!(!record.manual);
}

#[test]
fn different_or_prefixed_key_inserts_new_record() {
    let conn = setup();
    let service = UpsertService::new(SqliteRecordRepository::try_new(&conn).unwrap());

    let original = service
        .upsert_by_key(
            Section::WmsCapabilities,
            "base",
            "url",
            &capabilities("http://example.com/wms2", "Two"),
        )
        .unwrap();
    let prefix = service
        .upsert_by_key(
            Section::WmsCapabilities,
            "base",
            "url",
            &capabilities("http://example.com/wms", "One"),
        )
        .unwrap();
    assert!(prefix.created);
    assert_ne!(prefix.id, original.id);

    let other_project = service
        .upsert_by_key(
            Section::WmsCapabilities,
            "other",
            "url",
            &capabilities("http://example.com/wms2", "Two"),
        )
        .unwrap();
    assert!(other_project.created);
}

#[test]
fn manual_flag_of_matched_record_is_preserved() {
    let conn = setup();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let id = repo
        .add(
            Section::Sources,
            "base",
            &payload(json!({"data": {"name": "osm", "url": "http://tiles.example/wms"}})),
            &RecordMeta::default().manual(true),
        )
        .unwrap();

    let service = UpsertService::new(repo);
    let outcome = service
        .upsert_by_key(
            Section::Sources,
            "base",
            "url",
            &payload(json!({"data": {"name": "osm v2", "url": "http://tiles.example/wms"}})),
        )
        .unwrap();
    assert_eq!(outcome, UpsertOutcome { id, created: false });

    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let record = repo.get(id, Section::Sources, "base").unwrap().unwrap();
    assert!(record.manual);
    assert_eq!(
        Value::Object(record.data),
        json!({"data": {"name": "osm v2", "url": "http://tiles.example/wms"}})
    );
}

#[test]
fn missing_key_is_malformed_and_inserts_nothing() {
    let conn = setup();
    let service = UpsertService::new(SqliteRecordRepository::try_new(&conn).unwrap());

    for document in [json!({"title": "no url"}), json!({"url": null})] {
        let err = service
            .upsert_by_key(Section::WmsCapabilities, "base", "url", &payload(document))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }

    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    assert!(repo
        .get_all(Section::WmsCapabilities, "base", &GetAllOptions::default())
        .unwrap()
        .is_empty());
}

#[test]
fn key_literal_matches_stored_text() {
    let conn = setup();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let id = repo
        .add(
            Section::WmsCapabilities,
            "base",
            &capabilities("http://example.com/wms?SERVICE=WMS&x=\"q\"", "Quoted"),
            &RecordMeta::default(),
        )
        .unwrap();

    let literal = key_literal("url", &json!("http://example.com/wms?SERVICE=WMS&x=\"q\"")).unwrap();
    assert_eq!(
        repo.exists_in_data(Section::WmsCapabilities, "base", &literal)
            .unwrap(),
        Some(id)
    );
}

#[test]
fn numeric_key_does_not_match_longer_number() {
    let conn = setup();
    let service = UpsertService::new(SqliteRecordRepository::try_new(&conn).unwrap());

    let seventy = service
        .upsert_by_key(
            Section::Sources,
            "base",
            "ext",
            &payload(json!({"data": {"ext": 70, "name": "seventy"}})),
        )
        .unwrap();
    let seven = service
        .upsert_by_key(
            Section::Sources,
            "base",
            "ext",
            &payload(json!({"data": {"ext": 7, "name": "seven"}})),
        )
        .unwrap();
    assert!(seven.created);
    assert_ne!(seven.id, seventy.id);

    let again = service
        .upsert_by_key(
            Section::Sources,
            "base",
            "ext",
            &payload(json!({"data": {"ext": 7, "name": "seven again"}})),
        )
        .unwrap();
    assert_eq!(
        again,
        UpsertOutcome {
            id: seven.id,
            created: false,
        }
    );

    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let all = repo
        .get_all(Section::Sources, "base", &GetAllOptions::default())
        .unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(
        all[&seventy.id],
        payload(json!({"data": {"ext": 70, "name": "seventy"}}))
    );
    assert_eq!(
        all[&seven.id],
        payload(json!({"data": {"ext": 7, "name": "seven again"}}))
    );
}

#[test]
fn key_found_only_in_another_scope_is_not_a_match() {
    let conn = setup();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let nested = repo
        .add(
            Section::WmsCapabilities,
            "base",
            &payload(json!({
                "url": "http://root.example/wms",
                "layer": {"url": "http://example.com/wms"}
            })),
            &RecordMeta::default(),
        )
        .unwrap();

    let service = UpsertService::new(repo);
    let outcome = service
        .upsert_by_key(
            Section::WmsCapabilities,
            "base",
            "url",
            &capabilities("http://example.com/wms", "Top level"),
        )
        .unwrap();
    assert!(outcome.created);
    assert_ne!(outcome.id, nested);
}
