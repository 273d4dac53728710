//! Tables with at least one geometry column.

use std::collections::BTreeMap;
use std::ops::{ControlFlow, Deref, DerefMut};

use geo::{BoundingRect, GeometryCollection};
use gdsl_error::{GdslError, Result};
use gdsl_types::{
    quote_identifier, Envelope, FoldingRule, FromValue, Geometry, Raster, Value, UNKNOWN_SRID,
};
use tracing::{debug, warn};

use crate::binder::BoundQuery;
use crate::cursor;
use crate::resolver::TableRequest;
use crate::table::{CellAccess, ColumnIndex, Table};

/// A [`Table`] whose result holds geometries.
///
/// Every plain table operation is available through `Deref`.
#[derive(Debug)]
pub struct SpatialTable {
    table: Table,
    geometry_columns: Vec<String>,
    raster_columns: Vec<String>,
}

impl SpatialTable {
    pub(crate) fn new(table: Table, geometry_columns: Vec<String>, raster_columns: Vec<String>) -> Self {
        Self {
            table,
            geometry_columns,
            raster_columns,
        }
    }

    pub fn as_table(&self) -> &Table {
        &self.table
    }

    pub fn as_table_mut(&mut self) -> &mut Table {
        &mut self.table
    }

    pub fn into_table(self) -> Table {
        self.table
    }

    pub fn is_spatial(&self) -> bool {
        true
    }

    /// Geometry in `column` of the current row, `None` for NULL.
    pub fn geometry(&self, column: impl ColumnIndex) -> Result<Option<Geometry>> {
        self.table.get(column)
    }

    /// Geometry in the first geometry column of the current row.
    pub fn first_geometry(&self) -> Result<Option<Geometry>> {
        self.geometry(self.first_geometry_column()?)
    }

    pub fn raster(&self, column: impl ColumnIndex) -> Result<Option<Raster>> {
        self.table.get(column)
    }

    pub fn geometric_columns(&self) -> &[String] {
        &self.geometry_columns
    }

    pub fn raster_columns(&self) -> &[String] {
        &self.raster_columns
    }

    /// Geometry columns followed by raster columns.
    pub fn spatial_columns(&self) -> Vec<String> {
        self.geometry_columns
            .iter()
            .chain(&self.raster_columns)
            .cloned()
            .collect()
    }

    /// Declared geometry type per geometry column, e.g. `POINT` for
    /// `geometry(POINT, 4326)` and `GEOMETRY` for a bare declaration.
    pub fn geometry_types(&self) -> BTreeMap<String, String> {
        self.geometry_columns
            .iter()
            .map(|name| {
                let declared = name
                    .as_str()
                    .column_index(self.table.columns())
                    .ok()
                    .map(|i| &self.table.columns()[i]);
                let kind = declared
                    .filter(|c| c.declared_type.is_some())
                    .map_or_else(
                        || "GEOMETRY".to_owned(),
                        |c| c.declared_subtype().unwrap_or_else(|| c.base_type()),
                    );
                (name.clone(), kind)
            })
            .collect()
    }

    /// SRID of the first geometry column.
    ///
    /// Taken from the declared type when it carries one, otherwise from the
    /// first non-NULL value. Lookup failures yield [`UNKNOWN_SRID`].
    pub fn srid(&self) -> i32 {
        match self.lookup_srid() {
            Ok(srid) => srid,
            Err(err) => {
                warn!(
                    target: "gdsl.spatial",
                    table = %self.table.name(),
                    error = %err,
                    "SRID lookup failed"
                );
                UNKNOWN_SRID
            }
        }
    }

    fn lookup_srid(&self) -> Result<i32> {
        let column = self.first_geometry_column()?;
        let declared = column
            .column_index(self.table.columns())
            .ok()
            .and_then(|i| self.table.columns()[i].declared_srid());
        if let Some(srid) = declared {
            return Ok(srid);
        }
        let name = self.table.source().dialect().quote_identifier(column);
        let query = BoundQuery::new(
            format!(
                "SELECT {name} FROM {} WHERE {name} IS NOT NULL LIMIT 1",
                self.table.from_clause()
            ),
            self.table.params().to_vec(),
        );
        match self.table.source().scalar(&query)? {
            Some(value) => Ok(Geometry::from_value(&value)?.srid()),
            None => Ok(UNKNOWN_SRID),
        }
    }

    /// Exact bounding box of every geometry in the first geometry column,
    /// computed client-side. `None` when there is no non-empty geometry.
    pub fn extent(&self) -> Result<Option<Envelope>> {
        let column = self.first_geometry_column()?;
        let name = self.table.source().dialect().quote_identifier(column);
        let query = BoundQuery::new(
            format!("SELECT {name} FROM {}", self.table.from_clause()),
            self.table.params().to_vec(),
        );
        let mut shapes = Vec::new();
        let mut failure = None;
        cursor::stream(self.table.source().connection(), &query, |_, row| {
            let Some(value) = row.first() else {
                return ControlFlow::Continue(());
            };
            match Option::<Geometry>::from_value(value) {
                Ok(Some(geometry)) => {
                    shapes.push(geometry.into_shape());
                    ControlFlow::Continue(())
                }
                Ok(None) => ControlFlow::Continue(()),
                Err(err) => {
                    failure = Some(err);
                    ControlFlow::Break(())
                }
            }
        })?;
        if let Some(err) = failure {
            return Err(err);
        }
        debug!(target: "gdsl.spatial", geometries = shapes.len(), "computed exact extent");
        Ok(GeometryCollection::from(shapes)
            .bounding_rect()
            .map(Envelope::from))
    }

    /// Extent from backend statistics, falling back to [`Self::extent`] when
    /// the backend has none or the statistics query fails.
    pub fn estimated_extent(&self) -> Result<Option<Envelope>> {
        let column = self.first_geometry_column()?;
        let source = self.table.source();
        let sql = self
            .table
            .location()
            .and_then(|location| source.dialect().estimated_extent_sql(location, column));
        let Some(sql) = sql else {
            return self.extent();
        };
        let estimate = source
            .scalar(&BoundQuery::new(sql, Vec::new()))
            .and_then(|value| envelope_from_box(value.as_ref()));
        match estimate {
            Ok(Some(envelope)) => Ok(Some(envelope)),
            Ok(None) => {
                debug!(target: "gdsl.spatial", "no extent statistics, computing exact extent");
                self.extent()
            }
            Err(err) => {
                warn!(
                    target: "gdsl.spatial",
                    table = %self.table.name(),
                    error = %err,
                    "estimated extent failed, computing exact extent"
                );
                self.extent()
            }
        }
    }

    /// A new table with every geometry column transformed into `srid`.
    ///
    /// Other columns pass through as reported, and `self` is left as it is.
    pub fn reproject(&self, srid: i32) -> Result<SpatialTable> {
        let dialect = self.table.source().dialect();
        let select: Vec<String> = self
            .table
            .columns()
            .iter()
            .map(|column| {
                if self.geometry_columns.contains(&column.name) {
                    let name = dialect.quote_identifier(&column.name);
                    format!("{} AS {name}", dialect.transform_expression(&name, srid))
                } else {
                    pass_through(&column.name)
                }
            })
            .collect();
        let sql = format!("SELECT {} FROM {}", select.join(", "), self.table.from_clause());
        debug!(target: "gdsl.spatial", sql = %sql, srid, "reprojecting");
        let request = TableRequest::subquery(&sql, self.table.params().to_vec());
        let table = Table::open(self.table.source(), request, self.table.cursor_options())?;
        Ok(Self::new(
            table,
            self.geometry_columns.clone(),
            self.raster_columns.clone(),
        ))
    }

    fn first_geometry_column(&self) -> Result<&str> {
        self.geometry_columns
            .first()
            .map(String::as_str)
            .ok_or_else(|| GdslError::NotSpatial {
                name: self.table.name(),
            })
    }
}

fn envelope_from_box(value: Option<&Value>) -> Result<Option<Envelope>> {
    match value {
        Some(Value::Text(text)) => Envelope::parse_box(text).map(Some),
        Some(Value::Null) | None => Ok(None),
        Some(other) => Err(GdslError::type_mismatch("BOX text", other.typeof_str())),
    }
}

impl Deref for SpatialTable {
    type Target = Table;

    fn deref(&self) -> &Table {
        &self.table
    }
}

impl DerefMut for SpatialTable {
    fn deref_mut(&mut self) -> &mut Table {
        &mut self.table
    }
}

/// A reported column name, quoted only when it cannot be written as a bare word.
fn pass_through(name: &str) -> String {
    if FoldingRule::Lower.is_simple(&name.to_ascii_lowercase()) {
        name.to_owned()
    } else {
        quote_identifier(name, FoldingRule::Lower)
    }
}
