//! SQLite storage engine
//!
//! Manages the SQLite connection, migrations and the SQL rendering of the
//! collection table contract.

use async_trait::async_trait;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Type, Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, Row, ToSql, TransactionBehavior};
use std::path::Path;
use tokio::sync::Mutex;

use super::traits::{
    CollectionStore, CollectionTable, Filter, MonotonicClock, ReadOnly, TxMode, TxWork,
};
use crate::domain::{Collection, CollectionId, DomainResult};

const COLUMNS: &str =
    "id, title, parent_path, server_id, queries, extra, created_at, updated_at";

/// SQLite-backed collection table
pub struct SqliteStore {
    conn: Mutex<Connection>,
    clock: MonotonicClock,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations
    pub fn open(path: impl AsRef<Path>) -> DomainResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        log::info!("Opened collection database at {}", path.as_ref().display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> DomainResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> DomainResult<Self> {
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock: MonotonicClock::new(),
        })
    }
}

/// Check if a column exists in a table
fn column_exists(conn: &Connection, table: &str, column: &str) -> DomainResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Run database migrations
fn run_migrations(conn: &Connection) -> DomainResult<()> {
    // `id` has no declared type so integer and text keys stay distinct
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS query_collections (
            id PRIMARY KEY NOT NULL,
            title TEXT NOT NULL,
            parent_path TEXT,
            server_id TEXT,
            queries TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_collections_parent_path ON query_collections(parent_path);
        CREATE INDEX IF NOT EXISTS idx_collections_server_id ON query_collections(server_id);",
    )?;

    // Collection settings beyond title/queries were added later
    if !column_exists(conn, "query_collections", "extra")? {
        conn.execute(
            "ALTER TABLE query_collections ADD COLUMN extra TEXT NOT NULL DEFAULT '{}'",
            [],
        )?;
    }

    Ok(())
}

impl ToSql for CollectionId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            CollectionId::Numeric(n) => ToSqlOutput::from(*n),
            CollectionId::Textual(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

impl FromSql for CollectionId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Integer(n) => Ok(CollectionId::Numeric(n)),
            ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                .map(|s| CollectionId::Textual(s.to_string()))
                .map_err(|e| FromSqlError::Other(Box::new(e))),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

fn id_value(id: &CollectionId) -> Value {
    match id {
        CollectionId::Numeric(n) => Value::Integer(*n),
        CollectionId::Textual(s) => Value::Text(s.clone()),
    }
}

fn json_column_error(idx: usize, err: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

/// Convert a database row to Collection
fn row_to_collection(row: &Row<'_>) -> rusqlite::Result<Collection> {
    let queries: String = row.get(4)?;
    let extra: String = row.get(5)?;
    Ok(Collection {
        id: row.get(0)?,
        title: row.get(1)?,
        parent_path: row.get(2)?,
        server_id: row.get(3)?,
        queries: serde_json::from_str(&queries).map_err(|e| json_column_error(4, e))?,
        extra: serde_json::from_str(&extra).map_err(|e| json_column_error(5, e))?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Render a filter as a WHERE fragment, pushing its parameters in order
fn where_clause(filter: &Filter, params: &mut Vec<Value>) -> String {
    match filter {
        Filter::IdEquals(id) => {
            params.push(id_value(id));
            "id = ?".to_string()
        }
        Filter::ParentPathEquals(path) => {
            params.push(Value::Text(path.clone()));
            "COALESCE(parent_path, '') = ?".to_string()
        }
        Filter::ParentPathStartsWith(prefix) => {
            params.push(Value::Integer(prefix.chars().count() as i64));
            params.push(Value::Text(prefix.clone()));
            "substr(COALESCE(parent_path, ''), 1, ?) = ?".to_string()
        }
        Filter::ServerIdEquals(server_id) => {
            params.push(Value::Text(server_id.clone()));
            "server_id = ?".to_string()
        }
        Filter::Or(filters) if filters.is_empty() => "0".to_string(),
        Filter::Or(filters) => {
            let parts: Vec<String> = filters.iter().map(|f| where_clause(f, params)).collect();
            format!("({})", parts.join(" OR "))
        }
    }
}

struct SqliteTable<'a> {
    conn: &'a Connection,
}

impl SqliteTable<'_> {
    fn query(&self, where_sql: &str, params: Vec<Value>) -> DomainResult<Vec<Collection>> {
        let sql = format!(
            "SELECT {} FROM query_collections WHERE {} ORDER BY rowid",
            COLUMNS, where_sql
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), row_to_collection)?;
        let mut collections = Vec::new();
        for row in rows {
            collections.push(row?);
        }
        Ok(collections)
    }

    fn write(&self, sql: &str, collection: &Collection) -> DomainResult<()> {
        let queries = serde_json::to_string(&collection.queries)?;
        let extra = serde_json::to_string(&collection.extra)?;
        self.conn.execute(
            sql,
            params![
                collection.id,
                collection.title,
                collection.parent_path,
                collection.server_id,
                queries,
                extra,
                collection.created_at,
                collection.updated_at,
            ],
        )?;
        Ok(())
    }
}

impl CollectionTable for SqliteTable<'_> {
    fn get(&self, id: &CollectionId) -> DomainResult<Option<Collection>> {
        Ok(self.query("id = ?", vec![id_value(id)])?.into_iter().next())
    }

    fn all(&self) -> DomainResult<Vec<Collection>> {
        self.query("1", Vec::new())
    }

    fn select(&self, filter: &Filter) -> DomainResult<Vec<Collection>> {
        let mut params = Vec::new();
        let where_sql = where_clause(filter, &mut params);
        self.query(&where_sql, params)
    }

    fn add(&mut self, collection: &Collection) -> DomainResult<()> {
        self.write(
            &format!(
                "INSERT INTO query_collections ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                COLUMNS
            ),
            collection,
        )
    }

    fn put(&mut self, collection: &Collection) -> DomainResult<()> {
        // Upsert keeps the rowid, and with it the record's position in listings
        self.write(
            &format!(
                "INSERT INTO query_collections ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    parent_path = excluded.parent_path,
                    server_id = excluded.server_id,
                    queries = excluded.queries,
                    extra = excluded.extra,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at",
                COLUMNS
            ),
            collection,
        )
    }

    fn delete(&mut self, id: &CollectionId) -> DomainResult<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM query_collections WHERE id = ?", [id])?)
    }
}

#[async_trait]
impl CollectionStore for SqliteStore {
    async fn transaction(&self, mode: TxMode, work: TxWork<'_>) -> DomainResult<()> {
        let mut conn = self.conn.lock().await;
        let behavior = match mode {
            TxMode::Read => TransactionBehavior::Deferred,
            TxMode::ReadWrite => TransactionBehavior::Immediate,
        };
        // Dropping the transaction on error rolls it back
        let tx = conn.transaction_with_behavior(behavior)?;
        {
            let mut table = SqliteTable { conn: &tx };
            match mode {
                TxMode::Read => work(&mut ReadOnly(&table))?,
                TxMode::ReadWrite => work(&mut table)?,
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn now(&self) -> i64 {
        self.clock.now()
    }
}
