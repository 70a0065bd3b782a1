//! SQLite-backed document repository adapter.
//!
//! # Responsibility
//! - Persist `DocumentRecord`s in the `documents` table.
//! - Assign the store-scoped version watermark on every write.
//!
//! # Invariants
//! - Connections come from `db::open_db`/`open_db_in_memory` so the
//!   schema is migrated before first use.
//! - `SQLITE_BUSY`/`SQLITE_LOCKED` surface as transient failures; all
//!   other SQLite errors are permanent.

use crate::repo::document_repo::{
    ChangeScan, DocumentRecord, DocumentRepository, QueryBatch, RepoError, RepoResult,
    WriteReceipt,
};
use rusqlite::{params, Connection, ErrorCode, Row};
use uuid::Uuid;

const DOCUMENT_SELECT_SQL: &str = "SELECT id, schema, active, version, body FROM documents";
const NEXT_VERSION_SQL: &str = "(SELECT IFNULL(MAX(version), 0) + 1 FROM documents)";
const WRITE_COST: f64 = 1.0;

/// Relational adapter borrowing a bootstrapped connection.
pub struct SqliteRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl DocumentRepository for SqliteRepository<'_> {
    fn add(&self, record: &DocumentRecord) -> RepoResult<WriteReceipt> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO documents (id, schema, active, version, body)
                     VALUES (?1, ?2, ?3, {NEXT_VERSION_SQL}, ?4);"
                ),
                params![
                    record.id.to_string(),
                    record.schema,
                    bool_to_int(record.active),
                    record.body.to_string(),
                ],
            )
            .map_err(map_sqlite_error)?;

        Ok(WriteReceipt { cost: WRITE_COST })
    }

    fn update(&self, record: &DocumentRecord) -> RepoResult<WriteReceipt> {
        self.write_snapshot(record, record.active)
    }

    fn delete_soft(&self, record: &DocumentRecord) -> RepoResult<WriteReceipt> {
        // The snapshot is already tombstoned; force the column regardless.
        self.write_snapshot(record, false)
    }

    fn delete_hard(&self, schema: &str, id: Uuid) -> RepoResult<WriteReceipt> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM documents WHERE schema = ?1 AND id = ?2;",
                params![schema, id.to_string()],
            )
            .map_err(map_sqlite_error)?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                schema: schema.to_string(),
                id,
            });
        }

        Ok(WriteReceipt { cost: WRITE_COST })
    }

    fn query(&self, schema: &str) -> RepoResult<QueryBatch> {
        let mut stmt = self
            .conn
            .prepare(&format!("{DOCUMENT_SELECT_SQL} WHERE schema = ?1 ORDER BY version ASC;"))
            .map_err(map_sqlite_error)?;

        let mut rows = stmt.query(params![schema]).map_err(map_sqlite_error)?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqlite_error)? {
            records.push(parse_document_row(row)?);
        }

        let cost = records.len() as f64;
        Ok(QueryBatch { records, cost })
    }

    fn get_by_id(&self, schema: &str, id: Uuid) -> RepoResult<Option<DocumentRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{DOCUMENT_SELECT_SQL} WHERE schema = ?1 AND id = ?2;"))
            .map_err(map_sqlite_error)?;

        let mut rows = stmt
            .query(params![schema, id.to_string()])
            .map_err(map_sqlite_error)?;
        if let Some(row) = rows.next().map_err(map_sqlite_error)? {
            return Ok(Some(parse_document_row(row)?));
        }

        Ok(None)
    }

    fn exists(&self, id: Uuid) -> RepoResult<bool> {
        let found: i64 = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM documents WHERE id = ?1);",
                params![id.to_string()],
                |row| row.get(0),
            )
            .map_err(map_sqlite_error)?;

        Ok(found == 1)
    }

    fn changed_since(&self, schema: &str, watermark: i64) -> RepoResult<ChangeScan> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "{DOCUMENT_SELECT_SQL} WHERE schema = ?1 AND version > ?2 ORDER BY version ASC;"
            ))
            .map_err(map_sqlite_error)?;

        let mut rows = stmt
            .query(params![schema, watermark])
            .map_err(map_sqlite_error)?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqlite_error)? {
            records.push(parse_document_row(row)?);
        }

        let cost = records.len() as f64;
        Ok(ChangeScan { records, cost })
    }
}

impl SqliteRepository<'_> {
    fn write_snapshot(&self, record: &DocumentRecord, active: bool) -> RepoResult<WriteReceipt> {
        let changed = self
            .conn
            .execute(
                &format!(
                    "UPDATE documents
                     SET active = ?1, version = {NEXT_VERSION_SQL}, body = ?2
                     WHERE schema = ?3 AND id = ?4;"
                ),
                params![
                    bool_to_int(active),
                    record.body.to_string(),
                    record.schema,
                    record.id.to_string(),
                ],
            )
            .map_err(map_sqlite_error)?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                schema: record.schema.clone(),
                id: record.id,
            });
        }

        Ok(WriteReceipt { cost: WRITE_COST })
    }
}

fn parse_document_row(row: &Row<'_>) -> RepoResult<DocumentRecord> {
    let id_text: String = row.get("id").map_err(map_sqlite_error)?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        RepoError::InvalidRecord(format!("invalid uuid value `{id_text}` in documents.id"))
    })?;

    let active = match row.get::<_, i64>("active").map_err(map_sqlite_error)? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidRecord(format!(
                "invalid active value `{other}` in documents.active"
            )));
        }
    };

    let body_text: String = row.get("body").map_err(map_sqlite_error)?;
    let body = serde_json::from_str(&body_text)
        .map_err(|err| RepoError::InvalidRecord(format!("unparseable documents.body: {err}")))?;

    Ok(DocumentRecord {
        id,
        schema: row.get("schema").map_err(map_sqlite_error)?,
        active,
        version: row.get("version").map_err(map_sqlite_error)?,
        body,
    })
}

fn map_sqlite_error(err: rusqlite::Error) -> RepoError {
    if let rusqlite::Error::SqliteFailure(failure, message) = &err {
        if matches!(
            failure.code,
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
        ) {
            return RepoError::Transient {
                retry_after: None,
                message: message.clone().unwrap_or_else(|| failure.to_string()),
            };
        }
    }
    RepoError::Permanent(err.to_string())
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
