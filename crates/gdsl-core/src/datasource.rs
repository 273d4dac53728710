//! The entry point: a connection, its dialect and configuration.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::ops::ControlFlow;
use std::path::Path;
use std::rc::Rc;

use gdsl_driver::Connection;
use gdsl_error::{BackendErrorKind, GdslError, Result};
use gdsl_types::{Envelope, Value};
use tracing::{debug, info};

use crate::binder::{BoundQuery, IntoTemplate};
use crate::config::DataSourceConfig;
use crate::cursor;
use crate::dialect::Dialect;
use crate::dsl::SelectBuilder;
use crate::resolver::{Resolved, TableKind, TableRequest};
use crate::script;
use crate::spatial::SpatialTable;
use crate::table::{Row, Table};

struct Inner {
    conn: Rc<dyn Connection>,
    dialect: Box<dyn Dialect>,
    config: DataSourceConfig,
}

/// A shared handle on one connection.
///
/// Cloning is cheap; clones and every table opened from them use the same
/// connection, so closing one closes all.
#[derive(Clone)]
pub struct DataSource {
    inner: Rc<Inner>,
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSource")
            .field("backend", &self.inner.conn.backend_name())
            .field("dialect", &self.inner.dialect.kind())
            .field("closed", &self.inner.conn.is_closed())
            .finish_non_exhaustive()
    }
}

impl DataSource {
    /// Wrap a connection, using the dialect named by `config`.
    pub fn new(conn: impl Connection + 'static, config: DataSourceConfig) -> Result<Self> {
        Self::from_shared(Rc::new(conn), config)
    }

    pub fn from_shared(conn: Rc<dyn Connection>, config: DataSourceConfig) -> Result<Self> {
        let dialect = config.dialect.dialect();
        Self::with_dialect(conn, dialect, config)
    }

    /// Wrap a connection with a caller-supplied dialect. `config.dialect` is
    /// ignored.
    pub fn with_dialect(
        conn: Rc<dyn Connection>,
        dialect: Box<dyn Dialect>,
        config: DataSourceConfig,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            target: "gdsl.datasource",
            backend = conn.backend_name(),
            dialect = ?dialect.kind(),
            fetch_size = config.fetch_size,
            "data source ready"
        );
        Ok(Self {
            inner: Rc::new(Inner {
                conn,
                dialect,
                config,
            }),
        })
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.inner.dialect.as_ref()
    }

    pub fn config(&self) -> &DataSourceConfig {
        &self.inner.config
    }

    pub fn connection(&self) -> &dyn Connection {
        self.inner.conn.as_ref()
    }

    pub(crate) fn shared_connection(&self) -> Rc<dyn Connection> {
        Rc::clone(&self.inner.conn)
    }

    // Query building

    /// Start a `SELECT` of the given columns; no columns selects `*`.
    pub fn select<I>(&self, columns: I) -> SelectBuilder
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        SelectBuilder::new(self.clone(), columns.into_iter().map(Into::into).collect())
    }

    /// Start a `SELECT *`.
    pub fn select_all(&self) -> SelectBuilder {
        SelectBuilder::new(self.clone(), Vec::new())
    }

    // Tables

    /// Open a table by name, or over a query such as `SELECT ...` or
    /// `(SELECT ...) as t`.
    pub fn table(&self, source: impl IntoTemplate) -> Result<Table> {
        self.open_as(source)
    }

    /// Like [`Self::table`], failing with `NotSpatial` when the result has
    /// no geometry column.
    pub fn spatial_table(&self, source: impl IntoTemplate) -> Result<SpatialTable> {
        self.open_as(source)
    }

    /// Open whichever kind of table the source yields.
    pub fn resolve(&self, source: impl IntoTemplate) -> Result<Resolved> {
        self.open_as(source)
    }

    pub fn open_as<T: TableKind>(&self, source: impl IntoTemplate) -> Result<T> {
        let request = self.request(source)?;
        T::open(self, request)
    }

    fn request(&self, source: impl IntoTemplate) -> Result<TableRequest> {
        let template = source.into_template()?;
        TableRequest::from_template(self.dialect(), &template)
    }

    // Statements

    /// Run a statement and return the number of changed rows.
    pub fn execute(&self, statement: impl IntoTemplate) -> Result<usize> {
        let query = statement.into_template()?.bind();
        debug!(
            target: "gdsl.datasource",
            sql = %query.sql,
            params = query.params.len(),
            "executing statement"
        );
        self.connection()
            .execute(&query.sql, &query.params)
            .map_err(|source| GdslError::execution(query.sql, source))
    }

    /// Run every statement of a SQL script, in order, and return how many ran.
    ///
    /// Remarks are skipped and `${name}` references are filled from
    /// `bindings` when it is not empty. The first failing statement stops
    /// the script; statements before it stay applied.
    pub fn execute_script(
        &self,
        reader: impl Read,
        bindings: &HashMap<String, String>,
    ) -> Result<usize> {
        let statements = script::read_statements(reader, bindings)?;
        info!(
            target: "gdsl.datasource",
            statements = statements.len(),
            bindings = bindings.len(),
            "running script"
        );
        for statement in &statements {
            self.execute(statement)?;
        }
        Ok(statements.len())
    }

    pub fn execute_script_file(
        &self,
        path: impl AsRef<Path>,
        bindings: &HashMap<String, String>,
    ) -> Result<usize> {
        let file = File::open(path.as_ref())?;
        self.execute_script(BufReader::new(file), bindings)
    }

    /// Every row of a query.
    pub fn rows(&self, query: impl IntoTemplate) -> Result<Vec<Row>> {
        let query = query.into_template()?.bind();
        let mut rows = Vec::new();
        cursor::stream(self.connection(), &query, |columns, values| {
            rows.push(Row::new(Rc::clone(columns), values));
            ControlFlow::Continue(())
        })?;
        Ok(rows)
    }

    pub fn first_row(&self, query: impl IntoTemplate) -> Result<Option<Row>> {
        let query = query.into_template()?.bind();
        let mut first = None;
        cursor::stream(self.connection(), &query, |columns, values| {
            first = Some(Row::new(Rc::clone(columns), values));
            ControlFlow::Break(())
        })?;
        Ok(first)
    }

    /// Call `f` for every row of a query, in backend order.
    pub fn each_row(&self, query: impl IntoTemplate, mut f: impl FnMut(&Row)) -> Result<()> {
        let query = query.into_template()?.bind();
        cursor::stream(self.connection(), &query, |columns, values| {
            f(&Row::new(Rc::clone(columns), values));
            ControlFlow::Continue(())
        })
    }

    /// First column of the first row; `None` when there is no row.
    pub(crate) fn scalar(&self, query: &BoundQuery) -> Result<Option<Value>> {
        let mut value = None;
        cursor::stream(self.connection(), query, |_, mut row| {
            value = Some(if row.is_empty() {
                Value::Null
            } else {
                row.swap_remove(0)
            });
            ControlFlow::Break(())
        })?;
        Ok(value)
    }

    // Catalog

    /// Whether a stored table exists under `name`.
    pub fn has_table(&self, name: &str) -> Result<bool> {
        let location = self.dialect().parse_location(name)?;
        match self.dialect().table_columns(self.connection(), &location) {
            Ok(_) => Ok(true),
            Err(GdslError::NoSuchTable { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Names of the stored tables and views, sorted.
    pub fn table_names(&self) -> Result<Vec<String>> {
        self.connection()
            .table_names()
            .map_err(|source| match source.kind {
                BackendErrorKind::Statement => GdslError::execution("table names", source),
                _ => GdslError::MetadataUnavailable {
                    target: "table names".to_owned(),
                    source,
                },
            })
    }

    /// Column names of a stored table, from the catalog.
    pub fn column_names(&self, name: &str) -> Result<Vec<String>> {
        let location = self.dialect().parse_location(name)?;
        Ok(self
            .dialect()
            .table_columns(self.connection(), &location)?
            .into_iter()
            .map(|c| c.name)
            .collect())
    }

    /// `COUNT(*)` over a table or query.
    pub fn row_count(&self, source: impl IntoTemplate) -> Result<usize> {
        let request = self.request(source)?;
        let query = BoundQuery::new(
            format!("SELECT COUNT(*) FROM {}", request.from()),
            request.params().to_vec(),
        );
        let count = self
            .scalar(&query)?
            .as_ref()
            .and_then(Value::as_integer)
            .ok_or_else(|| GdslError::internal("COUNT(*) returned no value"))?;
        usize::try_from(count).map_err(|_| GdslError::internal("negative row count"))
    }

    /// Exact extent of the first geometry column of a table or query.
    pub fn extent(&self, source: impl IntoTemplate) -> Result<Option<Envelope>> {
        self.spatial_table(source)?.extent()
    }

    // Transactions

    pub fn commit(&self) -> Result<()> {
        self.connection()
            .commit()
            .map_err(|source| GdslError::execution("COMMIT", source))
    }

    pub fn rollback(&self) -> Result<()> {
        self.connection()
            .rollback()
            .map_err(|source| GdslError::execution("ROLLBACK", source))
    }

    /// Switch autocommit. Leaving manual mode commits pending work.
    pub fn set_autocommit(&self, autocommit: bool) -> Result<()> {
        self.connection()
            .set_autocommit(autocommit)
            .map_err(|source| GdslError::execution("set autocommit", source))
    }

    pub fn is_autocommit(&self) -> bool {
        self.connection().is_autocommit()
    }

    /// Close the connection for every clone of this handle.
    pub fn close(&self) -> Result<()> {
        debug!(target: "gdsl.datasource", "closing data source");
        self.connection()
            .close()
            .map_err(|source| GdslError::execution("close", source))
    }

    pub fn is_closed(&self) -> bool {
        self.connection().is_closed()
    }
}
