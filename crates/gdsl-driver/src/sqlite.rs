//! Embedded SQLite driver backed by `rusqlite`.

use std::cell::{Cell, RefCell};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::Duration;

use gdsl_error::BackendError;
use gdsl_types::{ColumnInfo, TableLocation, Value};
use rusqlite::OpenFlags;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::convert::{backend_error, from_sql, to_sql};
use crate::{Capabilities, Connection, DriverResult, RowBuffer, RowVisitor};

/// Options for opening a [`SqliteConnection`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteOptions {
    /// Database file. `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    pub read_only: bool,
    /// How long a statement waits on a locked database before failing.
    pub busy_timeout_ms: u64,
    /// Cursor features advertised to the core.
    pub capabilities: Capabilities,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            path: None,
            read_only: false,
            busy_timeout_ms: 5_000,
            capabilities: Capabilities::default(),
        }
    }
}

impl SqliteOptions {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    fn open_flags(&self) -> OpenFlags {
        let access = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
        };
        access | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX
    }
}

/// A [`Connection`] over one SQLite database handle.
pub struct SqliteConnection {
    conn: RefCell<Option<rusqlite::Connection>>,
    capabilities: Capabilities,
    manual_commit: Cell<bool>,
    /// Set when `close` is called while a statement still holds the handle.
    close_pending: Cell<bool>,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("closed", &self.is_closed())
            .field("autocommit", &self.is_autocommit())
            .finish_non_exhaustive()
    }
}

impl SqliteConnection {
    pub fn open(options: &SqliteOptions) -> DriverResult<Self> {
        let conn = match &options.path {
            Some(path) => rusqlite::Connection::open_with_flags(path, options.open_flags()),
            None => rusqlite::Connection::open_in_memory(),
        }
        .map_err(|e| backend_error(&e))?;
        conn.busy_timeout(Duration::from_millis(options.busy_timeout_ms))
            .map_err(|e| backend_error(&e))?;
        debug!(
            target: "gdsl.driver",
            path = ?options.path,
            busy_timeout_ms = options.busy_timeout_ms,
            "opened sqlite connection"
        );
        Ok(Self {
            conn: RefCell::new(Some(conn)),
            capabilities: options.capabilities.clone(),
            manual_commit: Cell::new(false),
            close_pending: Cell::new(false),
        })
    }

    pub fn open_in_memory() -> DriverResult<Self> {
        Self::open(&SqliteOptions::in_memory())
    }

    /// Run `f` against the underlying handle, e.g. to register SQL functions.
    pub fn with_inner<R>(
        &self,
        f: impl FnOnce(&rusqlite::Connection) -> rusqlite::Result<R>,
    ) -> DriverResult<R> {
        self.with_conn(|conn| f(conn).map_err(|e| backend_error(&e)))
    }

    fn with_conn<R>(
        &self,
        f: impl FnOnce(&rusqlite::Connection) -> DriverResult<R>,
    ) -> DriverResult<R> {
        if self.close_pending.get() {
            return Err(BackendError::closed());
        }
        let result = {
            let guard = self.conn.borrow();
            let conn = guard.as_ref().ok_or_else(BackendError::closed)?;
            f(conn)
        };
        if self.close_pending.get() {
            self.finish_pending_close();
        }
        result
    }

    /// Close the handle once the outermost statement has released it.
    fn finish_pending_close(&self) {
        let Ok(mut slot) = self.conn.try_borrow_mut() else {
            return;
        };
        self.close_pending.set(false);
        if let Some(conn) = slot.take() {
            debug!(target: "gdsl.driver", "closing sqlite connection after statement");
            if let Err((_, e)) = conn.close() {
                warn!(target: "gdsl.driver", error = %e, "deferred close failed");
            }
        }
    }

    fn batch(&self, sql: &str) -> DriverResult<()> {
        self.with_conn(|conn| conn.execute_batch(sql).map_err(|e| backend_error(&e)))
    }

    /// Re-open a transaction after commit or rollback while autocommit is off.
    fn resume_manual(&self) -> DriverResult<()> {
        if self.manual_commit.get() {
            self.batch("BEGIN")?;
        }
        Ok(())
    }
}

fn savepoint_name(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl Connection for SqliteConnection {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn capabilities(&self) -> DriverResult<Capabilities> {
        self.with_conn(|_| Ok(self.capabilities.clone()))
    }

    fn execute(&self, sql: &str, params: &[Value]) -> DriverResult<usize> {
        trace!(target: "gdsl.driver", sql, params = params.len(), "execute");
        self.with_conn(|conn| {
            if params.is_empty() {
                conn.execute_batch(sql).map_err(|e| backend_error(&e))?;
                return usize::try_from(conn.changes())
                    .map_err(|_| BackendError::statement("change count overflow"));
            }
            let mut stmt = conn.prepare(sql).map_err(|e| backend_error(&e))?;
            stmt.execute(rusqlite::params_from_iter(params.iter().map(to_sql)))
                .map_err(|e| backend_error(&e))
        })
    }

    fn query(&self, sql: &str, params: &[Value], visitor: &mut dyn RowVisitor) -> DriverResult<()> {
        trace!(target: "gdsl.driver", sql, params = params.len(), "query");
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql).map_err(|e| backend_error(&e))?;
            let columns: Vec<ColumnInfo> = stmt
                .columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.decl_type()))
                .collect();
            visitor.columns(&columns);
            let mut rows = stmt
                .query(rusqlite::params_from_iter(params.iter().map(to_sql)))
                .map_err(|e| backend_error(&e))?;
            while let Some(row) = rows.next().map_err(|e| backend_error(&e))? {
                let mut values = Vec::with_capacity(columns.len());
                for (idx, col) in columns.iter().enumerate() {
                    let raw: rusqlite::types::Value = row.get(idx).map_err(|e| backend_error(&e))?;
                    values.push(from_sql(raw, col.declared_type.as_deref()));
                }
                if visitor.row(values).is_break() || self.close_pending.get() {
                    break;
                }
            }
            Ok(())
        })
    }

    fn table_columns(&self, location: &TableLocation) -> DriverResult<Option<Vec<ColumnInfo>>> {
        let schema = location.schema().unwrap_or("main");
        let mut buffer = ColumnCollector::default();
        self.query(
            "SELECT name, type FROM pragma_table_info(?1, ?2) ORDER BY cid",
            &[Value::from(location.table()), Value::from(schema)],
            &mut buffer,
        )?;
        Ok((!buffer.columns.is_empty()).then_some(buffer.columns))
    }

    fn table_names(&self) -> DriverResult<Vec<String>> {
        let mut buffer = RowBuffer::default();
        self.query(
            "SELECT name FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
             ORDER BY name",
            &[],
            &mut buffer,
        )?;
        Ok(buffer
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next().and_then(|v| v.as_text().map(str::to_owned)))
            .collect())
    }

    fn in_transaction(&self) -> DriverResult<bool> {
        self.with_conn(|conn| Ok(!conn.is_autocommit()))
    }

    fn is_autocommit(&self) -> bool {
        !self.manual_commit.get()
    }

    fn set_autocommit(&self, autocommit: bool) -> DriverResult<()> {
        if autocommit == self.is_autocommit() {
            return Ok(());
        }
        if autocommit {
            if self.in_transaction()? {
                self.batch("COMMIT")?;
            }
            self.manual_commit.set(false);
        } else {
            self.batch("BEGIN")?;
            self.manual_commit.set(true);
        }
        debug!(target: "gdsl.driver", autocommit, "autocommit changed");
        Ok(())
    }

    fn commit(&self) -> DriverResult<()> {
        if self.in_transaction()? {
            self.batch("COMMIT")?;
        }
        self.resume_manual()
    }

    fn rollback(&self) -> DriverResult<()> {
        if self.in_transaction()? {
            self.batch("ROLLBACK")?;
        }
        self.resume_manual()
    }

    fn savepoint(&self, name: &str) -> DriverResult<()> {
        self.batch(&format!("SAVEPOINT {}", savepoint_name(name)))
    }

    fn release_savepoint(&self, name: &str) -> DriverResult<()> {
        self.batch(&format!("RELEASE SAVEPOINT {}", savepoint_name(name)))
    }

    fn rollback_to_savepoint(&self, name: &str) -> DriverResult<()> {
        let name = savepoint_name(name);
        self.batch(&format!("ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name}"))
    }

    fn close(&self) -> DriverResult<()> {
        let Ok(mut slot) = self.conn.try_borrow_mut() else {
            debug!(target: "gdsl.driver", "statement in progress, deferring close");
            self.close_pending.set(true);
            return Ok(());
        };
        let Some(conn) = slot.take() else {
            return Ok(());
        };
        drop(slot);
        debug!(target: "gdsl.driver", "closing sqlite connection");
        conn.close().map_err(|(_, e)| backend_error(&e))
    }

    fn is_closed(&self) -> bool {
        self.close_pending.get() || self.conn.try_borrow().map_or(false, |c| c.is_none())
    }
}

#[derive(Default)]
struct ColumnCollector {
    columns: Vec<ColumnInfo>,
}

impl RowVisitor for ColumnCollector {
    fn row(&mut self, values: Vec<Value>) -> ControlFlow<()> {
        if let [Value::Text(name), decl] = values.as_slice() {
            let decl = decl.as_text().filter(|d| !d.is_empty());
            self.columns.push(ColumnInfo::new(name.clone(), decl));
        }
        ControlFlow::Continue(())
    }
}
