//! Schema Scope: the connection and tablespace a cache is bound to
//!
//! Wraps a rusqlite connection behind the connection-wide lock. Every
//! metadata read in this crate goes through [`SchemaScope::lock`], and every
//! statement is prepared through the connection's statement cache.

use crate::schema::{
    COLUMN_KIND_CLASS_ID, METADATA_SCHEMA_VERSION, REPOPULATE_CLASS_HIERARCHY_CACHE,
    SCHEMA_CREATE_INDEXES, SCHEMA_CREATE_TABLES,
};
use crate::types::{DbTable, TableId, TableKind};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Result as SqliteResult};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Tablespace used when none is configured
pub const DEFAULT_TABLE_SPACE: &str = "main";

/// Default capacity of the prepared statement cache
pub const DEFAULT_STATEMENT_CACHE_CAPACITY: usize = 64;

/// Errors that can occur while opening or maintaining a scope
#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid tablespace name: {0:?}")]
    InvalidTableSpace(String),

    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch { expected: String, found: String },
}

/// Options for opening a [`SchemaScope`]
#[derive(Debug, Clone)]
pub struct ScopeOptions {
    /// SQLite schema name holding the metadata tables (`main` or an attached alias)
    pub table_space: String,
    /// Capacity of the prepared statement cache
    pub statement_cache_capacity: usize,
    /// Open the database read-only
    pub read_only: bool,
}

impl Default for ScopeOptions {
    fn default() -> Self {
        Self {
            table_space: DEFAULT_TABLE_SPACE.to_string(),
            statement_cache_capacity: DEFAULT_STATEMENT_CACHE_CAPACITY,
            read_only: false,
        }
    }
}

impl ScopeOptions {
    pub fn with_table_space(mut self, table_space: impl Into<String>) -> Self {
        self.table_space = table_space.into();
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

/// Check that a tablespace name can be spliced into `[...]` safely
pub fn is_valid_table_space(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A connection-scoped view of one tablespace's mapping metadata
///
/// Thread-safe: the connection sits behind a `parking_lot::Mutex`, which is
/// the connection-wide lock the cache serializes on.
pub struct SchemaScope {
    table_space: String,
    conn: Mutex<Connection>,
}

impl SchemaScope {
    /// Open an existing metadata database
    pub fn open(path: &Path, options: ScopeOptions) -> Result<Self, ScopeError> {
        let flags = if options.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX
        };
        let conn = Connection::open_with_flags(path, flags)?;
        let scope = Self::from_connection(conn, options)?;

        if let Some(version) = scope.metadata("schema_version")? {
            if version != METADATA_SCHEMA_VERSION {
                return Err(ScopeError::SchemaVersionMismatch {
                    expected: METADATA_SCHEMA_VERSION.to_string(),
                    found: version,
                });
            }
        }

        debug!("Opened metadata database {:?}", path);
        Ok(scope)
    }

    /// Create a new metadata database with the system tables
    pub fn create(path: &Path, options: ScopeOptions) -> Result<Self, ScopeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let scope = Self::from_connection(conn, options)?;
        scope.create_metadata_tables()?;
        Ok(scope)
    }

    /// Create an in-memory metadata database (for testing)
    pub fn in_memory(options: ScopeOptions) -> Result<Self, ScopeError> {
        let conn = Connection::open_in_memory()?;
        let scope = Self::from_connection(conn, options)?;
        scope.create_metadata_tables()?;
        Ok(scope)
    }

    /// Wrap an already configured connection
    pub fn from_connection(conn: Connection, options: ScopeOptions) -> Result<Self, ScopeError> {
        if !is_valid_table_space(&options.table_space) {
            return Err(ScopeError::InvalidTableSpace(options.table_space));
        }
        Self::configure_connection(&conn)?;
        conn.set_prepared_statement_cache_capacity(options.statement_cache_capacity);

        Ok(Self {
            table_space: options.table_space,
            conn: Mutex::new(conn),
        })
    }

    fn configure_connection(conn: &Connection) -> SqliteResult<()> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        Ok(())
    }

    fn create_metadata_tables(&self) -> Result<(), ScopeError> {
        let conn = self.conn.lock();
        for ddl in SCHEMA_CREATE_TABLES {
            conn.execute(ddl, [])?;
        }
        conn.execute_batch(SCHEMA_CREATE_INDEXES)?;
        conn.execute(
            "INSERT OR REPLACE INTO ec_Metadata (key, value) VALUES ('schema_version', ?1)",
            [METADATA_SCHEMA_VERSION],
        )?;
        Ok(())
    }

    /// Name of the tablespace every metadata query is scoped to
    pub fn table_space(&self) -> &str {
        &self.table_space
    }

    /// Acquire the connection-wide lock.
    ///
    /// Released when the guard drops, on every exit path.
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Read a value from `ec_Metadata`
    pub fn metadata(&self, key: &str) -> Result<Option<String>, ScopeError> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT value FROM [{}].ec_Metadata WHERE key = ?1",
            self.table_space
        );
        let value = match conn.prepare_cached(&sql) {
            Ok(mut stmt) => stmt.query_row([key], |row| row.get(0)).optional()?,
            // Databases written by other tools may lack the table; an
            // attached table space may not be attached yet
            Err(rusqlite::Error::SqliteFailure(_, Some(msg)))
                if msg.contains("no such table") || msg.contains("unknown database") =>
            {
                None
            }
            Err(e) => return Err(e.into()),
        };
        Ok(value)
    }

    /// Look up a table by id
    pub fn find_table(&self, id: TableId) -> Option<DbTable> {
        let conn = self.conn.lock();
        match load_table(&conn, &self.table_space, id) {
            Ok(table) => table,
            Err(e) => {
                warn!("Failed to load table {}: {}", id, e);
                None
            }
        }
    }

    /// Look up a table by name (case-insensitive)
    pub fn find_table_by_name(&self, name: &str) -> Option<DbTable> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT Id FROM [{}].ec_Table WHERE Name = ?1",
            self.table_space
        );
        let id = conn
            .prepare_cached(&sql)
            .and_then(|mut stmt| stmt.query_row([name], |row| row.get::<_, i64>(0)).optional());
        match id {
            Ok(Some(id)) => load_table(&conn, &self.table_space, TableId(id)).ok().flatten(),
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to look up table '{}': {}", name, e);
                None
            }
        }
    }

    /// Rebuild `ec_cache_ClassHierarchy` from `ec_ClassHasBaseClasses`.
    ///
    /// Owners must call [`crate::LightweightCache::clear`] afterwards.
    pub fn repopulate_class_hierarchy_cache(&self) -> Result<(), ScopeError> {
        let conn = self.conn.lock();
        let sql = REPOPULATE_CLASS_HIERARCHY_CACHE.replace("{ts}", &self.table_space);
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(&sql)?;
        tx.commit()?;
        debug!("Repopulated class hierarchy cache in [{}]", self.table_space);
        Ok(())
    }
}

/// Resolve a table through an already locked connection
pub(crate) fn load_table(
    conn: &Connection,
    table_space: &str,
    id: TableId,
) -> SqliteResult<Option<DbTable>> {
    let sql = format!(
        r#"
        SELECT t.Name, t.Type, t.ParentTableId,
               (SELECT c.Name FROM [{ts}].ec_Column c
                WHERE c.TableId = t.Id AND (c.ColumnKind & ?2) = ?2
                ORDER BY c.Id LIMIT 1)
        FROM [{ts}].ec_Table t
        WHERE t.Id = ?1
        "#,
        ts = table_space
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    stmt.query_row(params![id.0, COLUMN_KIND_CLASS_ID], |row| {
        let kind_value: i64 = row.get(1)?;
        let kind = TableKind::from_i64(kind_value).unwrap_or_else(|| {
            warn!("Table {} has unknown type {}, treating as primary", id, kind_value);
            TableKind::Primary
        });
        Ok(DbTable {
            id,
            name: row.get(0)?,
            kind,
            parent: row.get::<_, Option<i64>>(2)?.map(TableId),
            class_id_column: row.get(3)?,
        })
    })
    .optional()
}
