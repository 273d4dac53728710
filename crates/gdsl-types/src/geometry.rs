//! Geometry, envelope and raster cell values.
//!
//! Geometries travel as (E)WKT text: `POINT(1 2)` or `SRID=4326;POINT(1 2)`.

use std::fmt;
use std::str::FromStr;

use geo::BoundingRect;
use gdsl_error::{GdslError, Result};
use wkt::{ToWkt, TryFromWkt};

use crate::value::{FromValue, Value};

/// SRID reported when a geometry or table carries no usable reference system.
pub const UNKNOWN_SRID: i32 = 0;

/// A geometry value together with its spatial reference identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    srid: i32,
    shape: geo::Geometry<f64>,
}

impl Geometry {
    pub fn new(shape: geo::Geometry<f64>, srid: i32) -> Self {
        Self { srid, shape }
    }

    /// Parse WKT, optionally prefixed by `SRID=<n>;`.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let (srid, body) = match text.split_once(';') {
            Some((prefix, body)) if starts_with_srid(prefix) => {
                let srid = prefix[5..].trim().parse::<i32>().map_err(|_| {
                    GdslError::invalid_geometry(format!("bad SRID prefix '{prefix}'"))
                })?;
                (srid, body)
            }
            _ => (UNKNOWN_SRID, text),
        };
        let shape = geo::Geometry::<f64>::try_from_wkt_str(body)
            .map_err(|e| GdslError::invalid_geometry(format!("{e}: '{body}'")))?;
        Ok(Self { srid, shape })
    }

    pub const fn srid(&self) -> i32 {
        self.srid
    }

    pub fn shape(&self) -> &geo::Geometry<f64> {
        &self.shape
    }

    pub fn into_shape(self) -> geo::Geometry<f64> {
        self.shape
    }

    /// The same shape tagged with another SRID. Coordinates are untouched.
    #[must_use]
    pub fn with_srid(mut self, srid: i32) -> Self {
        self.srid = srid;
        self
    }

    /// OGC type name, e.g. `POINT` or `MULTIPOLYGON`.
    pub fn geometry_type(&self) -> &'static str {
        match &self.shape {
            geo::Geometry::Point(_) => "POINT",
            geo::Geometry::Line(_) | geo::Geometry::LineString(_) => "LINESTRING",
            geo::Geometry::Polygon(_) | geo::Geometry::Rect(_) | geo::Geometry::Triangle(_) => {
                "POLYGON"
            }
            geo::Geometry::MultiPoint(_) => "MULTIPOINT",
            geo::Geometry::MultiLineString(_) => "MULTILINESTRING",
            geo::Geometry::MultiPolygon(_) => "MULTIPOLYGON",
            geo::Geometry::GeometryCollection(_) => "GEOMETRYCOLLECTION",
        }
    }

    /// Bounding box of the shape, `None` when the shape is empty.
    pub fn envelope(&self) -> Option<Envelope> {
        self.shape.bounding_rect().map(Envelope::from)
    }

    /// Plain WKT without the SRID prefix.
    pub fn to_wkt(&self) -> String {
        self.shape.wkt_string()
    }
}

fn starts_with_srid(prefix: &str) -> bool {
    prefix
        .get(..5)
        .is_some_and(|head| head.eq_ignore_ascii_case("SRID="))
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.srid != UNKNOWN_SRID {
            write!(f, "SRID={};", self.srid)?;
        }
        f.write_str(&self.to_wkt())
    }
}

impl FromStr for Geometry {
    type Err = GdslError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<Geometry> for Value {
    fn from(geom: Geometry) -> Self {
        Self::Text(geom.to_string())
    }
}

impl FromValue for Geometry {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Text(text) => Self::parse(text),
            Value::Blob(bytes) => std::str::from_utf8(bytes)
                .map_err(|_| GdslError::invalid_geometry("binary geometry is not EWKT"))
                .and_then(Self::parse),
            other => Err(GdslError::type_mismatch("geometry", other.typeof_str())),
        }
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Smallest envelope covering every item, `None` for an empty input.
    pub fn union_all(items: impl IntoIterator<Item = Self>) -> Option<Self> {
        items.into_iter().reduce(Self::union)
    }

    #[must_use]
    pub fn contains_point(self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    #[must_use]
    pub fn contains_box(self, other: Self) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    pub fn width(self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(self) -> f64 {
        self.max_y - self.min_y
    }

    /// Parse the `BOX(xmin ymin,xmax ymax)` text returned by extent functions.
    pub fn parse_box(text: &str) -> Result<Self> {
        let invalid = || GdslError::invalid_geometry(format!("malformed box '{text}'"));
        let trimmed = text.trim();
        let open = trimmed.find('(').ok_or_else(invalid)?;
        if !trimmed[..open].trim().to_uppercase().starts_with("BOX") {
            return Err(invalid());
        }
        let inner = trimmed[open + 1..]
            .strip_suffix(')')
            .ok_or_else(invalid)?;
        let coords = inner
            .split([',', ' '])
            .filter(|part| !part.is_empty())
            .map(|part| part.trim().parse::<f64>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>>>()?;
        match coords.as_slice() {
            [min_x, min_y, max_x, max_y] => Ok(Self::new(*min_x, *min_y, *max_x, *max_y)),
            _ => Err(invalid()),
        }
    }

    /// The envelope as a polygon geometry.
    pub fn to_geometry(self, srid: i32) -> Geometry {
        let rect = geo::Rect::new(
            geo::coord! { x: self.min_x, y: self.min_y },
            geo::coord! { x: self.max_x, y: self.max_y },
        );
        Geometry::new(geo::Geometry::Polygon(rect.to_polygon()), srid)
    }
}

impl From<geo::Rect<f64>> for Envelope {
    fn from(rect: geo::Rect<f64>) -> Self {
        Self::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BOX({} {},{} {})",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

/// Raw raster cell content. Decoding raster formats is left to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster(Vec<u8>);

impl Raster {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl FromValue for Raster {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Blob(bytes) => Ok(Self(bytes.clone())),
            Value::Text(text) => Ok(Self(text.as_bytes().to_vec())),
            other => Err(GdslError::type_mismatch("raster", other.typeof_str())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_wkt() {
        let geom = Geometry::parse("POINT(1 2)").unwrap();
        assert_eq!(geom.srid(), UNKNOWN_SRID);
        assert_eq!(geom.geometry_type(), "POINT");
        assert_eq!(geom.shape(), &geo::Geometry::Point(geo::Point::new(1.0, 2.0)));
    }

    #[test]
    fn parse_ewkt_prefix() {
        let geom = Geometry::parse("SRID=4326;LINESTRING(0 0, 3 4)").unwrap();
        assert_eq!(geom.srid(), 4326);
        assert_eq!(geom.geometry_type(), "LINESTRING");
        assert!(geom.to_string().starts_with("SRID=4326;LINESTRING"));
        let env = geom.envelope().unwrap();
        assert_eq!(env, Envelope::new(0.0, 0.0, 3.0, 4.0));
    }

    #[test]
    fn reparse_display() {
        let geom = Geometry::parse("SRID=2154;POLYGON((0 0, 10 0, 10 10, 0 10, 0 0))").unwrap();
        let again = Geometry::parse(&geom.to_string()).unwrap();
        assert_eq!(geom, again);
    }

    #[test]
    fn invalid_geometry_text() {
        for text in ["POINT(1", "SRID=abc;POINT(1 2)", "not a geometry"] {
            let err = Geometry::parse(text).unwrap_err();
            assert!(matches!(err, GdslError::InvalidGeometry { .. }), "{text}");
        }
    }

    #[test]
    fn geometry_from_value() {
        let geom = Geometry::from_value(&Value::Text("POINT(5 6)".into())).unwrap();
        assert_eq!(geom.envelope(), Some(Envelope::new(5.0, 6.0, 5.0, 6.0)));
        let err = Geometry::from_value(&Value::Integer(1)).unwrap_err();
        assert!(matches!(err, GdslError::TypeMismatch { .. }));
        let missing = Option::<Geometry>::from_value(&Value::Null).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn envelope_union_and_contains() {
        let a = Envelope::new(0.0, 0.0, 1.0, 1.0);
        let b = Envelope::new(2.0, -1.0, 3.0, 0.5);
        let both = Envelope::union_all([a, b]).unwrap();
        assert_eq!(both, Envelope::new(0.0, -1.0, 3.0, 1.0));
        assert!(both.contains_box(a));
        assert!(both.contains_box(b));
        assert!(!a.contains_box(both));
        assert!(both.contains_point(2.5, 0.0));
        assert_eq!(both.width(), 3.0);
        assert_eq!(Envelope::union_all(std::iter::empty()), None);
    }

    #[test]
    fn parse_box_text() {
        let env = Envelope::parse_box("BOX(-1.5 2,3 4.25)").unwrap();
        assert_eq!(env, Envelope::new(-1.5, 2.0, 3.0, 4.25));
        assert_eq!(Envelope::parse_box(&env.to_string()).unwrap(), env);
        assert!(Envelope::parse_box("BOX(1 2)").is_err());
        assert!(Envelope::parse_box("POINT(1 2)").is_err());
    }

    #[test]
    fn envelope_as_polygon() {
        let poly = Envelope::new(0.0, 0.0, 2.0, 1.0).to_geometry(4326);
        assert_eq!(poly.geometry_type(), "POLYGON");
        assert_eq!(poly.srid(), 4326);
        assert_eq!(poly.envelope(), Some(Envelope::new(0.0, 0.0, 2.0, 1.0)));
    }

    #[test]
    fn raster_from_blob() {
        let raster = Raster::from_value(&Value::Blob(vec![1, 2, 3])).unwrap();
        assert_eq!(raster.len(), 3);
        assert_eq!(raster.as_bytes(), &[1, 2, 3]);
        assert!(Raster::from_value(&Value::Float(1.0)).is_err());
    }
}
