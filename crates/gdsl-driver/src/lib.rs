//! Backend seam between the query core and a concrete database.
//!
//! The core only talks to a [`Connection`]; it never sees a driver type. A
//! driver reports failures as [`BackendError`] and leaves attaching the SQL
//! text to the caller.

pub mod sqlite;

mod convert;

use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};

pub use gdsl_error::{BackendError, BackendErrorKind};
use gdsl_types::{ColumnInfo, TableLocation, Value};

pub use sqlite::{SqliteConnection, SqliteOptions};

/// Result type for driver operations.
pub type DriverResult<T> = std::result::Result<T, BackendError>;

/// How a cursor moves through its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorType {
    /// `next` only.
    ForwardOnly,
    /// Random access over a snapshot taken when the query ran.
    ScrollInsensitive,
    /// Random access that observes the live result at each positioning.
    ScrollSensitive,
}

impl CursorType {
    pub const fn is_scrollable(self) -> bool {
        !matches!(self, Self::ForwardOnly)
    }
}

/// Whether rows read through a cursor may be written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Concurrency {
    ReadOnly,
    Updatable,
}

/// The cursor shape a table was opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CursorOptions {
    pub cursor_type: CursorType,
    pub concurrency: Concurrency,
}

impl CursorOptions {
    pub const FORWARD_READ_ONLY: Self = Self {
        cursor_type: CursorType::ForwardOnly,
        concurrency: Concurrency::ReadOnly,
    };

    pub const fn new(cursor_type: CursorType, concurrency: Concurrency) -> Self {
        Self {
            cursor_type,
            concurrency,
        }
    }
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self::FORWARD_READ_ONLY
    }
}

/// Cursor features a backend advertises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub cursor_types: Vec<CursorType>,
    pub updatable: bool,
}

impl Capabilities {
    /// A backend that can only stream rows forward.
    pub fn forward_only() -> Self {
        Self {
            cursor_types: vec![CursorType::ForwardOnly],
            updatable: false,
        }
    }

    pub fn supports(&self, options: CursorOptions) -> bool {
        self.cursor_types.contains(&options.cursor_type)
            && (options.concurrency == Concurrency::ReadOnly || self.updatable)
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            cursor_types: vec![
                CursorType::ForwardOnly,
                CursorType::ScrollInsensitive,
                CursorType::ScrollSensitive,
            ],
            updatable: false,
        }
    }
}

/// Receives a query result one row at a time.
pub trait RowVisitor {
    /// Called once with the result-set metadata before any row.
    fn columns(&mut self, columns: &[ColumnInfo]) {
        let _ = columns;
    }

    /// Called for each row in result order. `Break` stops the query.
    fn row(&mut self, values: Vec<Value>) -> ControlFlow<()>;
}

/// A visitor that keeps the whole result.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RowBuffer {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<Value>>,
}

impl RowVisitor for RowBuffer {
    fn columns(&mut self, columns: &[ColumnInfo]) {
        self.columns = columns.to_vec();
    }

    fn row(&mut self, values: Vec<Value>) -> ControlFlow<()> {
        self.rows.push(values);
        ControlFlow::Continue(())
    }
}

/// A live database connection.
///
/// Methods take `&self`; a connection is used from one thread and shared
/// between sequential query chains.
pub trait Connection {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Cursor features of this backend. Fails only when the backend cannot be asked.
    fn capabilities(&self) -> DriverResult<Capabilities>;

    /// Run a statement. Without parameters the text may hold several statements.
    fn execute(&self, sql: &str, params: &[Value]) -> DriverResult<usize>;

    /// Run a query and stream its metadata and rows into `visitor`.
    fn query(&self, sql: &str, params: &[Value], visitor: &mut dyn RowVisitor) -> DriverResult<()>;

    /// Columns of a stored table, `None` when no such table exists.
    fn table_columns(&self, location: &TableLocation) -> DriverResult<Option<Vec<ColumnInfo>>>;

    /// Names of the stored tables and views, sorted, system tables excluded.
    fn table_names(&self) -> DriverResult<Vec<String>>;

    /// Whether a transaction is currently open.
    fn in_transaction(&self) -> DriverResult<bool>;

    fn is_autocommit(&self) -> bool;

    /// Switch autocommit. Turning it back on commits the open transaction.
    fn set_autocommit(&self, autocommit: bool) -> DriverResult<()>;

    fn commit(&self) -> DriverResult<()>;

    fn rollback(&self) -> DriverResult<()>;

    fn savepoint(&self, name: &str) -> DriverResult<()>;

    fn release_savepoint(&self, name: &str) -> DriverResult<()>;

    fn rollback_to_savepoint(&self, name: &str) -> DriverResult<()>;

    /// Close the connection. Closing twice is a no-op.
    fn close(&self) -> DriverResult<()>;

    fn is_closed(&self) -> bool;
}
