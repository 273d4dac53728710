pub mod column;
pub mod geometry;
pub mod location;
pub mod value;

pub use column::ColumnInfo;
pub use geometry::{Envelope, Geometry, Raster, UNKNOWN_SRID};
pub use location::{quote_identifier, FoldingRule, TableLocation};
pub use value::{FromValue, Value};
