//! Access to table properties and current-row cells by name.
//!
//! Synthetic names take precedence over column names, so a column called
//! `name` is read through [`CellAccess::get_object`] instead.

use gdsl_error::{GdslError, Result};
use gdsl_types::Value;

use crate::spatial::SpatialTable;
use crate::table::{CellAccess, ColumnIndex, Table};

pub trait NamedAttributes {
    /// Read a property or a cell of the current row.
    fn attribute(&self, name: &str) -> Result<Value>;

    /// Write a property. Only `fetch_size` is writable.
    fn set_attribute(&mut self, name: &str, value: Value) -> Result<()>;
}

impl NamedAttributes for Table {
    fn attribute(&self, name: &str) -> Result<Value> {
        match name {
            "location" => Ok(self
                .location()
                .map_or(Value::Null, |location| Value::Text(location.to_string()))),
            "name" => Ok(Value::Text(self.name())),
            "columns" => to_json(&self.column_names()),
            "meta" | "metadata" => to_json(self.columns()),
            "row_count" => {
                let count = self.row_count()?;
                i64::try_from(count)
                    .map(Value::Integer)
                    .map_err(|_| GdslError::internal("row count exceeds i64"))
            }
            "spatial" => Ok(Value::Boolean(self.is_spatial())),
            "fetch_size" => Ok(Value::Integer(
                i64::try_from(self.fetch_size()).unwrap_or(i64::MAX),
            )),
            column => match column.column_index(self.columns()) {
                Ok(_) => self.get_object(column),
                Err(_) => Err(GdslError::UnknownAttribute {
                    name: name.to_owned(),
                }),
            },
        }
    }

    fn set_attribute(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            "fetch_size" => {
                let size = value
                    .as_integer()
                    .and_then(|n| usize::try_from(n).ok())
                    .filter(|n| *n > 0)
                    .ok_or_else(|| {
                        GdslError::type_mismatch("positive integer", value.to_plain_string())
                    })?;
                self.set_fetch_size(size);
                Ok(())
            }
            _ => Err(GdslError::UnknownAttribute {
                name: name.to_owned(),
            }),
        }
    }
}

impl NamedAttributes for SpatialTable {
    fn attribute(&self, name: &str) -> Result<Value> {
        match name {
            "spatial" => Ok(Value::Boolean(true)),
            "srid" => Ok(Value::Integer(i64::from(self.srid()))),
            _ => self.as_table().attribute(name),
        }
    }

    fn set_attribute(&mut self, name: &str, value: Value) -> Result<()> {
        self.as_table_mut().set_attribute(name, value)
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_string(value)
        .map(Value::Text)
        .map_err(|e| GdslError::internal(e.to_string()))
}
