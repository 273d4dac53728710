//! Deciding whether a source yields a plain or a spatial table.
//!
//! A stored table is classified from the catalog. Anything else is probed with
//! `SELECT * FROM <source> WHERE 1=0`, which returns metadata but no rows.
//! Inside an open transaction the probe runs under a savepoint so that a
//! failing probe does not abort the caller's transaction.

use gdsl_driver::{Connection, RowBuffer};
use gdsl_error::{GdslError, Result};
use gdsl_types::{ColumnInfo, TableLocation, Value};
use tracing::{debug, info_span, warn};

use crate::binder::Template;
use crate::datasource::DataSource;
use crate::dialect::Dialect;
use crate::spatial::SpatialTable;
use crate::table::Table;

/// Leading keywords that mark raw text as a query rather than a table name.
const QUERY_KEYWORDS: [&str; 3] = ["SELECT", "WITH", "VALUES"];

/// What a table is opened over: the `FROM` text, its parameters and, for
/// stored tables, the parsed location.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRequest {
    pub(crate) from: String,
    pub(crate) location: Option<TableLocation>,
    pub(crate) params: Vec<Value>,
}

impl TableRequest {
    pub(crate) fn located(dialect: &dyn Dialect, location: TableLocation) -> Self {
        Self {
            from: dialect.render_location(&location),
            location: Some(location),
            params: Vec::new(),
        }
    }

    pub(crate) fn subquery(sql: &str, params: Vec<Value>) -> Self {
        Self {
            from: format!("({sql}) as foo"),
            location: None,
            params,
        }
    }

    /// Interpret a table name, a bare query or an aliased sub-query.
    pub(crate) fn from_template(dialect: &dyn Dialect, template: &Template) -> Result<Self> {
        let bound = template.bind();
        let text = bound.sql.trim();
        if text.starts_with('(') {
            return Ok(Self {
                from: text.to_owned(),
                location: None,
                params: bound.params,
            });
        }
        if starts_with_query_keyword(text) {
            return Ok(Self::subquery(text, bound.params));
        }
        if !bound.params.is_empty() {
            return Err(GdslError::invalid_identifier(
                text,
                "a table name cannot carry parameters",
            ));
        }
        Ok(Self::located(dialect, dialect.parse_location(text)?))
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn location(&self) -> Option<&TableLocation> {
        self.location.as_ref()
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

fn starts_with_query_keyword(text: &str) -> bool {
    let word = text
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default();
    word.len() < text.len() && QUERY_KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

/// A table whose kind was decided by the resolver.
#[derive(Debug)]
pub enum Resolved {
    Plain(Table),
    Spatial(SpatialTable),
}

impl Resolved {
    pub fn is_spatial(&self) -> bool {
        matches!(self, Self::Spatial(_))
    }

    /// The underlying table, whatever its kind.
    pub fn table(&self) -> &Table {
        match self {
            Self::Plain(table) => table,
            Self::Spatial(spatial) => spatial.as_table(),
        }
    }

    pub fn table_mut(&mut self) -> &mut Table {
        match self {
            Self::Plain(table) => table,
            Self::Spatial(spatial) => spatial.as_table_mut(),
        }
    }

    pub fn into_spatial(self) -> Result<SpatialTable> {
        match self {
            Self::Spatial(spatial) => Ok(spatial),
            Self::Plain(table) => Err(GdslError::NotSpatial { name: table.name() }),
        }
    }

    pub fn into_table(self) -> Table {
        match self {
            Self::Plain(table) => table,
            Self::Spatial(spatial) => spatial.into_table(),
        }
    }
}

/// A table kind that can be opened from a [`TableRequest`].
pub trait TableKind: Sized {
    fn open(source: &DataSource, request: TableRequest) -> Result<Self>;
}

impl TableKind for Table {
    fn open(source: &DataSource, request: TableRequest) -> Result<Self> {
        let options = source.dialect().cursor_options(source.connection());
        Table::open(source, request, options)
    }
}

impl TableKind for SpatialTable {
    fn open(source: &DataSource, request: TableRequest) -> Result<Self> {
        match resolve(source, request)? {
            Resolved::Spatial(spatial) => Ok(spatial),
            Resolved::Plain(table) => Err(GdslError::NotSpatial { name: table.name() }),
        }
    }
}

impl TableKind for Resolved {
    fn open(source: &DataSource, request: TableRequest) -> Result<Self> {
        resolve(source, request)
    }
}

/// Spatial columns found by a probe.
#[derive(Debug, Default)]
struct Probe {
    geometry: Vec<String>,
    raster: Vec<String>,
}

pub(crate) fn resolve(source: &DataSource, request: TableRequest) -> Result<Resolved> {
    let span = info_span!(target: "gdsl.resolver", "resolve", from = %request.from);
    let _guard = span.enter();

    let dialect = source.dialect();
    let options = dialect.cursor_options(source.connection());
    let found = guarded(source, || probe(source, &request))?;
    if found.geometry.is_empty() {
        debug!(
            target: "gdsl.resolver",
            rasters = found.raster.len(),
            "no geometry column, resolved as plain table"
        );
        return Table::open(source, request, options).map(Resolved::Plain);
    }
    debug!(
        target: "gdsl.resolver",
        geometry_columns = ?found.geometry,
        "resolved as spatial table"
    );
    let table = Table::open(source, request, options)?;
    Ok(Resolved::Spatial(SpatialTable::new(
        table,
        found.geometry,
        found.raster,
    )))
}

fn probe(source: &DataSource, request: &TableRequest) -> Result<Probe> {
    let dialect = source.dialect();
    let columns = match &request.location {
        Some(location) => dialect.table_columns(source.connection(), location)?,
        None => result_columns(source.connection(), request)?,
    };
    let names = |found: Vec<ColumnInfo>| -> Vec<String> { found.into_iter().map(|c| c.name).collect() };
    Ok(Probe {
        geometry: names(dialect.geometry_columns_in(&columns)),
        raster: names(dialect.raster_columns_in(&columns)),
    })
}

fn result_columns(conn: &dyn Connection, request: &TableRequest) -> Result<Vec<ColumnInfo>> {
    let sql = format!("SELECT * FROM {} WHERE 1=0", request.from);
    debug!(target: "gdsl.resolver", sql = %sql, params = request.params.len(), "probing result metadata");
    let mut buffer = RowBuffer::default();
    conn.query(&sql, &request.params, &mut buffer)
        .map_err(|source| GdslError::execution(sql, source))?;
    Ok(buffer.columns)
}

/// Run `probe` under the configured savepoint when a transaction is open.
fn guarded<T>(source: &DataSource, probe: impl FnOnce() -> Result<T>) -> Result<T> {
    let conn = source.connection();
    let in_transaction = conn
        .in_transaction()
        .map_err(|e| GdslError::execution("transaction status", e))?;
    if !in_transaction {
        return probe();
    }
    let name = &source.config().probe_savepoint;
    conn.savepoint(name)
        .map_err(|e| GdslError::execution(format!("SAVEPOINT {name}"), e))?;
    match probe() {
        Ok(value) => {
            conn.release_savepoint(name)
                .map_err(|e| GdslError::execution(format!("RELEASE {name}"), e))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = conn.rollback_to_savepoint(name) {
                warn!(
                    target: "gdsl.resolver",
                    savepoint = %name,
                    error = %rollback,
                    "could not roll back probe savepoint"
                );
            }
            Err(err)
        }
    }
}
