//! Backend-specific facts: identifier folding, cursor selection and geometry
//! column detection.

use gdsl_driver::{Concurrency, Connection, CursorOptions, CursorType};
use gdsl_error::{BackendErrorKind, GdslError, Result};
use gdsl_types::{quote_identifier, ColumnInfo, FoldingRule, TableLocation, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which dialect a data source speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialectKind {
    /// H2-like relational backend, upper-case folding.
    #[default]
    Relational,
    /// PostGIS-like spatial backend, lower-case folding.
    Spatial,
}

impl DialectKind {
    pub fn dialect(self) -> Box<dyn Dialect> {
        match self {
            Self::Relational => Box::new(RelationalDialect),
            Self::Spatial => Box::new(SpatialDialect),
        }
    }
}

/// Order in which cursor types are tried.
const CURSOR_PREFERENCE: [CursorType; 3] = [
    CursorType::ScrollSensitive,
    CursorType::ScrollInsensitive,
    CursorType::ForwardOnly,
];

pub trait Dialect {
    fn kind(&self) -> DialectKind;

    fn folding(&self) -> FoldingRule;

    fn is_upper_folding(&self) -> bool {
        self.folding() == FoldingRule::Upper
    }

    /// Whether a declared base type (as from [`ColumnInfo::base_type`]) holds geometries.
    fn is_geometry_type(&self, base_type: &str) -> bool;

    fn is_raster_type(&self, base_type: &str) -> bool;

    /// Pick the richest cursor the connection supports.
    ///
    /// Scroll-sensitive beats scroll-insensitive beats forward-only, and
    /// updatable beats read-only. A failed probe yields forward-only read-only.
    fn cursor_options(&self, conn: &dyn Connection) -> CursorOptions {
        let caps = match conn.capabilities() {
            Ok(caps) => caps,
            Err(err) => {
                debug!(
                    target: "gdsl.resolver",
                    error = %err,
                    "capability probe failed, using forward-only read-only cursor"
                );
                return CursorOptions::FORWARD_READ_ONLY;
            }
        };
        let Some(cursor_type) = CURSOR_PREFERENCE
            .into_iter()
            .find(|t| caps.supports(CursorOptions::new(*t, Concurrency::ReadOnly)))
        else {
            debug!(target: "gdsl.resolver", "backend advertises no cursor type, using forward-only");
            return CursorOptions::FORWARD_READ_ONLY;
        };
        let updatable = CursorOptions::new(cursor_type, Concurrency::Updatable);
        let chosen = if caps.supports(updatable) {
            updatable
        } else {
            CursorOptions::new(cursor_type, Concurrency::ReadOnly)
        };
        if chosen.cursor_type != CURSOR_PREFERENCE[0] || chosen.concurrency != Concurrency::Updatable
        {
            debug!(
                target: "gdsl.resolver",
                backend = conn.backend_name(),
                cursor_type = ?chosen.cursor_type,
                concurrency = ?chosen.concurrency,
                "cursor downgraded to backend capabilities"
            );
        }
        chosen
    }

    /// Geometry columns among result-set metadata.
    fn geometry_columns_in(&self, columns: &[ColumnInfo]) -> Vec<ColumnInfo> {
        columns
            .iter()
            .filter(|c| self.is_geometry_type(&c.base_type()))
            .cloned()
            .collect()
    }

    fn raster_columns_in(&self, columns: &[ColumnInfo]) -> Vec<ColumnInfo> {
        columns
            .iter()
            .filter(|c| self.is_raster_type(&c.base_type()))
            .cloned()
            .collect()
    }

    fn has_geometry_column_in(&self, columns: &[ColumnInfo]) -> bool {
        columns.iter().any(|c| self.is_geometry_type(&c.base_type()))
    }

    /// Columns of a stored table, read from the catalog.
    ///
    /// A catalog that cannot be reached surfaces as
    /// [`GdslError::MetadataUnavailable`], never as a missing table.
    fn table_columns(
        &self,
        conn: &dyn Connection,
        location: &TableLocation,
    ) -> Result<Vec<ColumnInfo>> {
        conn.table_columns(location)
            .map_err(|source| match source.kind {
                BackendErrorKind::Connectivity | BackendErrorKind::Closed => {
                    GdslError::MetadataUnavailable {
                        target: location.to_string(),
                        source,
                    }
                }
                BackendErrorKind::Statement => {
                    GdslError::execution(format!("catalog lookup of {location}"), source)
                }
            })?
            .ok_or_else(|| GdslError::NoSuchTable {
                name: location.to_string(),
            })
    }

    /// Geometry columns of a stored table, read from the catalog.
    fn geometry_columns(
        &self,
        conn: &dyn Connection,
        location: &TableLocation,
    ) -> Result<Vec<ColumnInfo>> {
        Ok(self.geometry_columns_in(&self.table_columns(conn, location)?))
    }

    fn has_geometry_column(&self, conn: &dyn Connection, location: &TableLocation) -> Result<bool> {
        Ok(!self.geometry_columns(conn, location)?.is_empty())
    }

    fn quote_identifier(&self, raw: &str) -> String {
        quote_identifier(raw, self.folding())
    }

    fn parse_location(&self, raw: &str) -> Result<TableLocation> {
        TableLocation::parse(raw, self.folding())
    }

    fn render_location(&self, location: &TableLocation) -> String {
        TableLocation::from_parts(
            location.catalog(),
            location.schema(),
            location.table(),
            self.folding(),
        )
        .to_string()
    }

    /// Expression reprojecting `column` into `srid`.
    fn transform_expression(&self, column: &str, srid: i32) -> String {
        format!("ST_Transform({column}, {srid})")
    }

    /// Statistics-based extent query, when the backend keeps such statistics.
    fn estimated_extent_sql(&self, location: &TableLocation, column: &str) -> Option<String> {
        let _ = (location, column);
        None
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RelationalDialect;

impl Dialect for RelationalDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Relational
    }

    fn folding(&self) -> FoldingRule {
        FoldingRule::Upper
    }

    fn is_geometry_type(&self, base_type: &str) -> bool {
        base_type.eq_ignore_ascii_case("GEOMETRY")
    }

    fn is_raster_type(&self, _base_type: &str) -> bool {
        false
    }
}

const GEOMETRY_FAMILY: &[&str] = &[
    "GEOMETRY",
    "GEOGRAPHY",
    "POINT",
    "LINESTRING",
    "POLYGON",
    "MULTIPOINT",
    "MULTILINESTRING",
    "MULTIPOLYGON",
    "GEOMETRYCOLLECTION",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct SpatialDialect;

impl Dialect for SpatialDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Spatial
    }

    fn folding(&self) -> FoldingRule {
        FoldingRule::Lower
    }

    fn is_geometry_type(&self, base_type: &str) -> bool {
        GEOMETRY_FAMILY
            .iter()
            .any(|family| family.eq_ignore_ascii_case(base_type))
    }

    fn is_raster_type(&self, base_type: &str) -> bool {
        base_type.eq_ignore_ascii_case("RASTER")
    }

    fn estimated_extent_sql(&self, location: &TableLocation, column: &str) -> Option<String> {
        let literal = |text: &str| Value::from(text).to_string();
        let args = match location.schema() {
            Some(schema) => format!(
                "{}, {}, {}",
                literal(schema),
                literal(location.table()),
                literal(column)
            ),
            None => format!("{}, {}", literal(location.table()), literal(column)),
        };
        Some(format!("SELECT ST_EstimatedExtent({args})"))
    }
}
