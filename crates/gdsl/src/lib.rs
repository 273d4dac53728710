//! Public API facade for gdsl.
//!
//! ```no_run
//! use gdsl::{DataSource, DataSourceConfig, SqliteConnection, CellAccess};
//!
//! # fn main() -> gdsl::Result<()> {
//! let conn = SqliteConnection::open_in_memory().expect("in-memory sqlite");
//! let ds = DataSource::new(conn, DataSourceConfig::default())?;
//! ds.execute("CREATE TABLE t (a INTEGER, b TEXT)")?;
//! let mut table = ds
//!     .select(["a", "b"])
//!     .from("t")
//!     .where_(gdsl::template!("a > {}", 1))
//!     .order_by("b")
//!     .table()?;
//! while table.next()? {
//!     println!("{}", table.get_int("a")?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod display;

pub use gdsl_core::{
    bind, count_placeholders, BoundQuery, CellAccess, ColumnIndex, ConditionBuilder, Cursor,
    DataSource, DataSourceConfig, Dialect, DialectKind, FromBuilder, FromSource, IntoRows,
    IntoTemplate, NamedAttributes, OptionBuilder, Order, Position, QueryFragment,
    RelationalDialect, Resolved, Row, RowView, Rows, SelectBuilder, SpatialDialect, SpatialTable,
    Table, TableKind, TableRequest, Template, MIN_CELL_WIDTH,
};
pub use gdsl_driver::{
    Capabilities, Concurrency, Connection, CursorOptions, CursorType, RowBuffer, RowVisitor,
    SqliteConnection, SqliteOptions,
};
pub use gdsl_error::{BackendError, BackendErrorKind, ErrorCategory, GdslError, Result};
pub use gdsl_types::{
    quote_identifier, ColumnInfo, Envelope, FoldingRule, FromValue, Geometry, Raster,
    TableLocation, Value, UNKNOWN_SRID,
};

/// Build a `Vec<Value>` from anything convertible into [`Value`].
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::Value>::new()
    };
    ($($val:expr),+ $(,)?) => {
        ::std::vec![$($crate::Value::from($val)),+]
    };
}

/// [`Template::format`] with inline values: `template!("a > {} AND b = {}", 1, "x")`.
///
/// Evaluates to `Result<Template>`, which builder methods accept directly.
#[macro_export]
macro_rules! template {
    ($fmt:expr) => {
        $crate::Template::format($fmt, ::std::vec::Vec::new())
    };
    ($fmt:expr, $($val:expr),+ $(,)?) => {
        $crate::Template::format($fmt, $crate::params![$($val),+])
    };
}
