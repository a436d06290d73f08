//! Relational store on SQLite.

use crate::error::{StorageError, StorageResult};
use crate::record::{changed_columns, Record};
use lookup_model::{Row, RowId, RowOwner, Table, TableId};
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

const SCHEMA: &str = "
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS lookup_table (
    id TEXT PRIMARY KEY,
    domain TEXT NOT NULL,
    tag TEXT NOT NULL,
    is_global INTEGER NOT NULL DEFAULT 0,
    fields TEXT NOT NULL DEFAULT '[]',
    item_attributes TEXT NOT NULL DEFAULT '[]',
    description TEXT NOT NULL DEFAULT '',
    UNIQUE (domain, tag)
);

CREATE TABLE IF NOT EXISTS lookup_table_row (
    id TEXT PRIMARY KEY,
    domain TEXT NOT NULL,
    table_id TEXT NOT NULL REFERENCES lookup_table (id) ON DELETE CASCADE,
    fields TEXT NOT NULL DEFAULT '{}',
    item_attributes TEXT NOT NULL DEFAULT '{}',
    sort_key INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS lookup_table_row_domain_table
    ON lookup_table_row (domain, table_id, sort_key);

CREATE TABLE IF NOT EXISTS lookup_table_row_owner (
    id TEXT PRIMARY KEY,
    domain TEXT NOT NULL,
    row_id TEXT NOT NULL REFERENCES lookup_table_row (id) ON DELETE CASCADE,
    owner_type TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    UNIQUE (row_id, owner_type, owner_id)
);
CREATE INDEX IF NOT EXISTS lookup_table_row_owner_domain
    ON lookup_table_row_owner (domain, owner_type, owner_id);
";

/// What a [`SqliteStore::save`] call wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A new record was inserted.
    Created,
    /// The listed columns were updated.
    Updated(Vec<&'static str>),
    /// The stored record already matched; nothing was written.
    Unchanged,
}

impl SaveOutcome {
    /// Returns true if anything was written.
    #[must_use]
    pub fn wrote(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Counts written by [`SqliteStore::apply_chunked`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkStats {
    /// Records inserted.
    pub created: usize,
    /// Records deleted (including records that were already gone).
    pub deleted: usize,
    /// Transactions committed.
    pub transactions: usize,
}

fn select_sql<R: Record>() -> String {
    format!("SELECT id, {} FROM {}", R::COLUMNS.join(", "), R::SQL_TABLE)
}

fn insert_in<R: Record>(conn: &Connection, record: &R) -> StorageResult<()> {
    let placeholders: Vec<String> = (1..=R::COLUMNS.len() + 1).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} (id, {}) VALUES ({})",
        R::SQL_TABLE,
        R::COLUMNS.join(", "),
        placeholders.join(", ")
    );
    let mut values = vec![rusqlite::types::Value::Text(record.record_id().to_string())];
    values.extend(record.values()?);
    conn.prepare_cached(&sql)?.execute(params_from_iter(values))?;
    Ok(())
}

fn delete_in<R: Record>(conn: &Connection, id: R::Id) -> StorageResult<bool> {
    let sql = format!("DELETE FROM {} WHERE id = ?1", R::SQL_TABLE);
    let n = conn.prepare_cached(&sql)?.execute([id.to_string()])?;
    Ok(n > 0)
}

fn get_in<R: Record>(conn: &Connection, id: R::Id) -> StorageResult<Option<R>> {
    let sql = format!("{} WHERE id = ?1", select_sql::<R>());
    Ok(conn
        .prepare_cached(&sql)?
        .query_row([id.to_string()], R::from_sql)
        .optional()?)
}

fn query_in<R: Record>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> StorageResult<Vec<R>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(params, R::from_sql)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn update_in<R: Record>(conn: &Connection, old: &R, new: &R) -> StorageResult<Vec<&'static str>> {
    let changed = changed_columns(old, new)?;
    if changed.is_empty() {
        return Ok(changed);
    }
    let all = new.values()?;
    let mut assignments = Vec::with_capacity(changed.len());
    let mut values = Vec::with_capacity(changed.len() + 1);
    for (name, value) in R::COLUMNS.iter().zip(all) {
        if changed.contains(name) {
            values.push(value);
            assignments.push(format!("{name} = ?{}", values.len()));
        }
    }
    values.push(rusqlite::types::Value::Text(new.record_id().to_string()));
    let sql = format!(
        "UPDATE {} SET {} WHERE id = ?{}",
        R::SQL_TABLE,
        assignments.join(", "),
        values.len()
    );
    conn.execute(&sql, params_from_iter(values))?;
    Ok(changed)
}

/// The relational store.
///
/// # Invariants
///
/// - Foreign keys are enforced: rows need their table, owners need their row
/// - Deleting a table cascades to its rows and their owners in one statement
/// - Updates write only the columns whose values changed
///
/// # Thread Safety
///
/// The connection is guarded by a mutex; the store can be shared across
/// threads.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens (or creates) a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot be
    /// created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self::init(conn)?;
        info!(path = %path.display(), "relational store opened");
        Ok(store)
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs `f` inside one transaction, committing if it succeeds.
    ///
    /// # Errors
    ///
    /// Returns the error of `f` (after rolling back) or of the commit.
    pub fn transaction<T>(&self, f: impl FnOnce(&Connection) -> StorageResult<T>) -> StorageResult<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Inserts a record.
    ///
    /// # Errors
    ///
    /// Returns an error on constraint violations (duplicate id, duplicate
    /// natural key, missing parent).
    pub fn insert<R: Record>(&self, record: &R) -> StorageResult<()> {
        insert_in(&self.conn.lock(), record)
    }

    /// Reads a record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get<R: Record>(&self, id: R::Id) -> StorageResult<Option<R>> {
        get_in(&self.conn.lock(), id)
    }

    /// Reads a record by id, failing if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if there is no such record.
    pub fn require<R: Record>(&self, id: R::Id) -> StorageResult<R> {
        self.get(id)?.ok_or_else(|| StorageError::not_found(R::KIND, id))
    }

    /// Inserts the record or updates only its changed columns.
    ///
    /// # Errors
    ///
    /// Returns an error on constraint violations.
    pub fn save<R: Record>(&self, record: &R) -> StorageResult<SaveOutcome> {
        self.transaction(|conn| match get_in::<R>(conn, record.record_id())? {
            None => {
                insert_in(conn, record)?;
                Ok(SaveOutcome::Created)
            }
            Some(existing) => {
                let changed = update_in(conn, &existing, record)?;
                if changed.is_empty() {
                    Ok(SaveOutcome::Unchanged)
                } else {
                    Ok(SaveOutcome::Updated(changed))
                }
            }
        })
    }

    /// Deletes a record (and its dependents). Returns false if it was absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub fn delete<R: Record>(&self, id: R::Id) -> StorageResult<bool> {
        delete_in::<R>(&self.conn.lock(), id)
    }

    /// Returns every record id of a kind, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn ids<R: Record>(&self) -> StorageResult<Vec<R::Id>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT id FROM {}", R::SQL_TABLE);
        let mut stmt = conn.prepare_cached(&sql)?;
        let texts = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut ids = texts
            .iter()
            .map(|t| t.parse::<R::Id>().map_err(StorageError::from))
            .collect::<StorageResult<Vec<_>>>()?;
        ids.sort();
        Ok(ids)
    }

    /// Reads every record of a kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn all<R: Record>(&self) -> StorageResult<Vec<R>> {
        query_in(&self.conn.lock(), &format!("{} ORDER BY id", select_sql::<R>()), [])
    }

    /// Counts records of a kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count<R: Record>(&self) -> StorageResult<usize> {
        let conn = self.conn.lock();
        let sql = format!("SELECT COUNT(*) FROM {}", R::SQL_TABLE);
        let n: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or_default())
    }

    /// Applies creates and deletes in bounded chunks, one transaction each.
    ///
    /// Deletes run first so that a delete-and-recreate of the same natural
    /// key does not trip a uniqueness constraint.
    ///
    /// # Errors
    ///
    /// Returns the first failing chunk's error. Chunks committed before it
    /// stay committed.
    pub fn apply_chunked<R: Record>(
        &self,
        creates: &[R],
        deletes: &[R::Id],
        chunk_size: usize,
    ) -> StorageResult<ChunkStats> {
        let chunk_size = chunk_size.max(1);
        let mut stats = ChunkStats::default();
        for chunk in deletes.chunks(chunk_size) {
            self.transaction(|conn| {
                for id in chunk {
                    delete_in::<R>(conn, *id)?;
                }
                Ok(())
            })?;
            stats.deleted += chunk.len();
            stats.transactions += 1;
        }
        for chunk in creates.chunks(chunk_size) {
            self.transaction(|conn| {
                for record in chunk {
                    insert_in(conn, record)?;
                }
                Ok(())
            })?;
            stats.created += chunk.len();
            stats.transactions += 1;
        }
        debug!(
            kind = R::KIND,
            created = stats.created,
            deleted = stats.deleted,
            transactions = stats.transactions,
            "applied chunked mutation"
        );
        Ok(stats)
    }

    /// Inserts or patches records in bounded chunks, one transaction each.
    ///
    /// Returns the number of records that were inserted or changed.
    ///
    /// # Errors
    ///
    /// Returns the first failing chunk's error. Chunks committed before it
    /// stay committed.
    pub fn save_chunked<R: Record>(&self, records: &[R], chunk_size: usize) -> StorageResult<usize> {
        let mut written = 0;
        for chunk in records.chunks(chunk_size.max(1)) {
            written += self.transaction(|conn| {
                let mut n = 0;
                for record in chunk {
                    match get_in::<R>(conn, record.record_id())? {
                        None => {
                            insert_in(conn, record)?;
                            n += 1;
                        }
                        Some(existing) => {
                            if !update_in(conn, &existing, record)?.is_empty() {
                                n += 1;
                            }
                        }
                    }
                }
                Ok(n)
            })?;
        }
        Ok(written)
    }

    /// Finds a table by tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_table_by_tag(&self, domain: &str, tag: &str) -> StorageResult<Option<Table>> {
        let sql = format!("{} WHERE domain = ?1 AND tag = ?2", select_sql::<Table>());
        let mut tables = query_in::<Table>(&self.conn.lock(), &sql, params![domain, tag])?;
        Ok(tables.pop())
    }

    /// Returns the tables of a domain ordered by tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn tables_for_domain(&self, domain: &str) -> StorageResult<Vec<Table>> {
        let sql = format!("{} WHERE domain = ?1 ORDER BY tag", select_sql::<Table>());
        query_in(&self.conn.lock(), &sql, [domain])
    }

    /// Returns the distinct domains holding tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn domains(&self) -> StorageResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT DISTINCT domain FROM lookup_table ORDER BY domain")?;
        let domains = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(domains)
    }

    /// Returns the rows of a table ordered by sort key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn rows_for_table(&self, table_id: TableId) -> StorageResult<Vec<Row>> {
        let sql = format!(
            "{} WHERE table_id = ?1 ORDER BY sort_key, id",
            select_sql::<Row>()
        );
        query_in(&self.conn.lock(), &sql, [table_id.to_legacy()])
    }

    /// Counts the rows of a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_rows(&self, table_id: TableId) -> StorageResult<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM lookup_table_row WHERE table_id = ?1",
            [table_id.to_legacy()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(n).unwrap_or_default())
    }

    /// Returns the owners of a row in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn owners_for_row(&self, row_id: RowId) -> StorageResult<Vec<RowOwner>> {
        let sql = format!("{} WHERE row_id = ?1 ORDER BY rowid", select_sql::<RowOwner>());
        query_in(&self.conn.lock(), &sql, [row_id.to_legacy()])
    }

    /// Returns the owners of every row of a table in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn owners_for_table(&self, table_id: TableId) -> StorageResult<Vec<RowOwner>> {
        let sql = "SELECT o.id, o.domain, o.row_id, o.owner_type, o.owner_id
            FROM lookup_table_row_owner o
            JOIN lookup_table_row r ON r.id = o.row_id
            WHERE r.table_id = ?1
            ORDER BY o.rowid";
        query_in(&self.conn.lock(), sql, [table_id.to_legacy()])
    }
}
