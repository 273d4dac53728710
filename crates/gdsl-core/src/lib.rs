//! Query building, dialect adaptation and cursor-backed tables.
//!
//! A [`DataSource`] wraps one driver [`Connection`](gdsl_driver::Connection).
//! Builder chains started from it render parameterized SQL, and their
//! terminals open a [`Table`] or a [`SpatialTable`] over the result.

pub mod attributes;
pub mod binder;
pub mod config;
pub mod cursor;
pub mod datasource;
pub mod dialect;
pub mod dsl;
pub mod resolver;
pub mod script;
pub mod spatial;
pub mod table;

pub use attributes::NamedAttributes;
pub use binder::{bind, count_placeholders, BoundQuery, IntoTemplate, Template};
pub use config::{DataSourceConfig, MIN_CELL_WIDTH};
pub use cursor::{Cursor, Position};
pub use datasource::DataSource;
pub use dialect::{Dialect, DialectKind, RelationalDialect, SpatialDialect};
pub use dsl::{
    ConditionBuilder, FromBuilder, FromSource, OptionBuilder, Order, QueryFragment, SelectBuilder,
};
pub use resolver::{Resolved, TableKind, TableRequest};
pub use spatial::SpatialTable;
pub use table::{CellAccess, ColumnIndex, IntoRows, Row, RowView, Rows, Table};
