mod support;

use docsession_core::db::{migrations, open_db, open_db_in_memory, DbError};
use docsession_core::{
    now_epoch_ms, stamp_aggregate, AggregateRoot, ChangeToken, DocumentRecord, DocumentRepository,
    DocumentSession, RepoError, SqliteRepository,
};
use rusqlite::Connection;
use support::Shipment;
use uuid::Uuid;

fn stamped_record(reference: &str) -> DocumentRecord {
    let mut shipment = Shipment::new(reference, "acme");
    stamp_aggregate(&mut shipment, now_epoch_ms());
    DocumentRecord::from_aggregate(&shipment).unwrap()
}

#[test]
fn opening_a_database_applies_migrations() {
    let conn = open_db_in_memory().unwrap();

    let user_version: u32 = conn
        .query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(user_version, migrations::latest_version());

    let tables: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'documents';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(tables, 1);
}

#[test]
fn writes_assign_a_store_wide_monotonic_version() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRepository::new(&conn);

    let first = stamped_record("ord-1");
    let second = stamped_record("ord-2");
    repo.add(&first).unwrap();
    repo.add(&second).unwrap();

    let stored_first = repo.get_by_id(&first.schema, first.id).unwrap().unwrap();
    let stored_second = repo.get_by_id(&second.schema, second.id).unwrap().unwrap();
    assert_eq!(stored_first.version, 1);
    assert_eq!(stored_second.version, 2);

    // An update takes the next watermark, not a per-row counter.
    repo.update(&first).unwrap();
    let updated = repo.get_by_id(&first.schema, first.id).unwrap().unwrap();
    assert_eq!(updated.version, 3);
}

#[test]
fn soft_delete_forces_the_stored_active_flag() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRepository::new(&conn);

    let record = stamped_record("ord-3");
    repo.add(&record).unwrap();
    repo.delete_soft(&record).unwrap();

    let stored = repo.get_by_id(&record.schema, record.id).unwrap().unwrap();
    assert!(!stored.active);
    assert!(repo.exists(record.id).unwrap());
}

#[test]
fn hard_delete_removes_the_row_and_missing_targets_are_not_found() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRepository::new(&conn);

    let record = stamped_record("ord-4");
    repo.add(&record).unwrap();
    repo.delete_hard(&record.schema, record.id).unwrap();

    assert!(!repo.exists(record.id).unwrap());
    assert!(matches!(
        repo.delete_hard(&record.schema, record.id),
        Err(RepoError::NotFound { .. })
    ));
    assert!(matches!(
        repo.update(&record),
        Err(RepoError::NotFound { .. })
    ));
}

#[test]
fn changed_since_returns_strictly_newer_rows_in_version_order() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRepository::new(&conn);

    for reference in ["ord-5", "ord-6", "ord-7"] {
        repo.add(&stamped_record(reference)).unwrap();
    }

    let scan = repo.changed_since(Shipment::SCHEMA, 1).unwrap();
    let versions: Vec<i64> = scan.records.iter().map(|row| row.version).collect();
    assert_eq!(versions, vec![2, 3]);

    assert!(repo.changed_since(Shipment::SCHEMA, 3).unwrap().records.is_empty());
}

#[test]
fn a_session_works_end_to_end_over_the_relational_adapter() {
    let conn = open_db_in_memory().unwrap();

    let mut session = DocumentSession::new(SqliteRepository::new(&conn));
    let added = session.add(Shipment::new("ord-8", "acme")).unwrap();
    session.commit_changes().unwrap();

    let mut reader = DocumentSession::new(SqliteRepository::new(&conn));
    let stored: Shipment = reader.read_by_id(added.meta.id).unwrap().unwrap();
    assert_eq!(stored.reference, "ord-8");
    assert_eq!(stored.meta.version, 1);

    let feed = reader
        .advanced()
        .read_changed::<Shipment>(&ChangeToken::beginning())
        .unwrap();
    assert_eq!(feed.changed.len(), 1);
    assert_eq!(feed.continuation.as_str(), "1");
}

#[test]
fn reopening_a_database_file_preserves_documents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("documents.db");

    let record = stamped_record("ord-9");
    {
        let conn = open_db(&path).unwrap();
        SqliteRepository::new(&conn).add(&record).unwrap();
    }

    let conn = open_db(&path).unwrap();
    let stored = SqliteRepository::new(&conn)
        .get_by_id(&record.schema, record.id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.id, record.id);
    assert_eq!(stored.version, 1);
}

#[test]
fn a_database_from_a_newer_build_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("documents.db");

    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("PRAGMA user_version = 99;").unwrap();
    }

    let err = open_db(&path).unwrap_err();
    assert!(matches!(
        err,
        DbError::UnsupportedSchemaVersion { db_version: 99, .. }
    ));
}

#[test]
fn an_unparseable_body_surfaces_as_an_invalid_record() {
    let conn = open_db_in_memory().unwrap();
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO documents (id, schema, active, version, body) VALUES (?1, ?2, 1, 1, ?3);",
        rusqlite::params![id.to_string(), Shipment::SCHEMA, "{not json"],
    )
    .unwrap();

    let repo = SqliteRepository::new(&conn);
    assert!(matches!(
        repo.get_by_id(Shipment::SCHEMA, id),
        Err(RepoError::InvalidRecord(_))
    ));
}
