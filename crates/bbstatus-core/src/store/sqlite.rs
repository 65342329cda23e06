//! SQLite-backed document store.
//!
//! Each collection is a two-column table: the document `_id` and the JSON
//! document itself. Indexed fields become JSON expression indexes, so the
//! query planner can use `json_extract(doc, '$.field')` lookups.

use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use super::{index_name, DocumentStore, INDEXES};
use crate::config::Backend;
use crate::error::{Error, Result};
use crate::types::{BuildQuery, BuildRecord, BuilderRecord, StepRecord, BUILDERS, BUILDS, STEPS};

/// Document store on a local SQLite database.
///
/// Thread-safe via internal Mutex. All database operations acquire the lock.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`.
    pub fn open_path(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(Error::Database)?;
        Self::with_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::Database)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        for collection in [BUILDERS, BUILDS, STEPS] {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id  TEXT PRIMARY KEY NOT NULL,
                    doc TEXT NOT NULL
                )",
                collection
            ))?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Names of the indexes currently defined on `collection`.
    pub fn index_names(&self, collection: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'index' AND tbl_name = ?1 AND sql IS NOT NULL
             ORDER BY name",
        )?;
        let names = stmt
            .query_map(params![collection], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn insert<T: Serialize>(&self, collection: &str, id: &str, doc: &T) -> Result<()> {
        let json = serde_json::to_string(doc)?;
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let result = conn.execute(
            &format!("INSERT INTO {} (id, doc) VALUES (?1, ?2)", collection),
            params![id, json],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(Error::DuplicateDocument {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })
            }
            Err(e) => Err(Error::Database(e)),
        }
    }

    fn upsert<T: Serialize>(&self, collection: &str, id: &str, doc: &T) -> Result<()> {
        let json = serde_json::to_string(doc)?;
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute(
            &format!(
                "INSERT INTO {} (id, doc) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET doc = excluded.doc",
                collection
            ),
            params![id, json],
        )?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let doc: Option<String> = conn
            .query_row(
                &format!("SELECT doc FROM {} WHERE id = ?1", collection),
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        doc.map(|d| serde_json::from_str(&d).map_err(Error::from))
            .transpose()
    }

    fn query<T, P>(&self, sql: &str, params: P) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        P: rusqlite::Params,
    {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(sql)?;
        let docs = stmt
            .query_map(params, |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        docs.iter()
            .map(|d| serde_json::from_str(d).map_err(Error::from))
            .collect()
    }
}

impl DocumentStore for SqliteStore {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn authenticate(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.query_row("SELECT 1", [], |_| Ok(())).map_err(Error::Database)
    }

    fn ensure_indexes(&self) -> Result<usize> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut created = 0;

        for (collection, fields) in INDEXES {
            for field in *fields {
                let name = index_name(collection, field);
                let exists: bool = conn.query_row(
                    "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'index' AND name = ?1",
                    params![name],
                    |row| row.get(0),
                )?;
                if exists {
                    continue;
                }

                conn.execute_batch(&format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {}(json_extract(doc, '$.{}'))",
                    name, collection, field
                ))?;
                debug!(index = %name, "created index");
                created += 1;
            }
        }

        Ok(created)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Operations
    // ─────────────────────────────────────────────────────────────────────────

    fn find_builder(&self, name: &str, master_id: Option<&str>) -> Result<Option<BuilderRecord>> {
        let mut found: Vec<BuilderRecord> = self.query(
            "SELECT doc FROM builders
             WHERE json_extract(doc, '$.name') = ?1
               AND json_extract(doc, '$.master_id') IS ?2
             ORDER BY rowid
             LIMIT 1",
            params![name, master_id],
        )?;
        Ok(found.pop())
    }

    fn save_builder(&self, builder: &BuilderRecord) -> Result<()> {
        self.upsert(BUILDERS, &builder.id, builder)
    }

    fn list_builders(&self, master_id: Option<&str>) -> Result<Vec<BuilderRecord>> {
        self.query(
            "SELECT doc FROM builders
             WHERE json_extract(doc, '$.master_id') IS ?1
             ORDER BY json_extract(doc, '$.name')",
            params![master_id],
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Build Operations
    // ─────────────────────────────────────────────────────────────────────────

    fn insert_build(&self, build: &BuildRecord) -> Result<()> {
        self.insert(BUILDS, &build.id, build)
    }

    fn save_build(&self, build: &BuildRecord) -> Result<()> {
        self.upsert(BUILDS, &build.id, build)
    }

    fn get_build(&self, id: &str) -> Result<Option<BuildRecord>> {
        self.get(BUILDS, id)
    }

    fn recent_builds(&self, query: &BuildQuery) -> Result<Vec<BuildRecord>> {
        let mut clauses = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(builder) = &query.builder {
            values.push(builder.clone());
            clauses.push(format!("json_extract(doc, '$.builder') = ?{}", values.len()));
        }
        if let Some(worker) = &query.worker {
            values.push(worker.clone());
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM json_each(doc, '$.workers') WHERE value = ?{})",
                values.len()
            ));
        }
        match query.finished {
            Some(true) => clauses.push("json_extract(doc, '$.time_end') IS NOT NULL".to_string()),
            Some(false) => clauses.push("json_extract(doc, '$.time_end') IS NULL".to_string()),
            None => {}
        }

        let mut sql = "SELECT doc FROM builds".to_string();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        // Builds are inserted as they start, so rowid order is start order.
        sql.push_str(" ORDER BY rowid DESC");
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        self.query(&sql, params_from_iter(values.iter()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Step Operations
    // ─────────────────────────────────────────────────────────────────────────

    fn insert_step(&self, step: &StepRecord) -> Result<()> {
        self.insert(STEPS, &step.id, step)
    }

    fn save_step(&self, step: &StepRecord) -> Result<()> {
        self.upsert(STEPS, &step.id, step)
    }

    fn get_step(&self, id: &str) -> Result<Option<StepRecord>> {
        self.get(STEPS, id)
    }

    fn steps_for_build(&self, build_id: &str) -> Result<Vec<StepRecord>> {
        self.query(
            "SELECT doc FROM steps WHERE json_extract(doc, '$.build') = ?1 ORDER BY rowid",
            params![build_id],
        )
    }
}
