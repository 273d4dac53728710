use gdsl_error::{GdslError, Result};
use serde::{Deserialize, Serialize};

use crate::dialect::DialectKind;

/// Settings for a [`DataSource`](crate::DataSource).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DataSourceConfig {
    /// Dialect used for folding, cursor selection and geometry detection.
    pub dialect: DialectKind,
    /// Rows fetched per round trip by forward-only cursors.
    pub fetch_size: usize,
    /// Savepoint name guarding metadata probes inside open transactions.
    pub probe_savepoint: String,
    /// Default width for printed cells.
    pub cell_width: usize,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            dialect: DialectKind::Relational,
            fetch_size: 100,
            probe_savepoint: "gdsl_probe".to_owned(),
            cell_width: 20,
        }
    }
}

/// Narrowest cell that still fits one character plus the `...` marker.
pub const MIN_CELL_WIDTH: usize = 4;

impl DataSourceConfig {
    /// Defaults for the spatial dialect.
    pub fn spatial() -> Self {
        Self {
            dialect: DialectKind::Spatial,
            ..Self::default()
        }
    }

    /// Parse and validate a JSON document. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(|e| GdslError::InvalidConfig {
            detail: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| GdslError::internal(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |detail: String| Err(GdslError::InvalidConfig { detail });
        if self.fetch_size == 0 {
            return invalid("fetch_size must be greater than zero".to_owned());
        }
        if self.cell_width < MIN_CELL_WIDTH {
            return invalid(format!("cell_width must be at least {MIN_CELL_WIDTH}"));
        }
        let mut chars = self.probe_savepoint.chars();
        let valid_name = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_name {
            return invalid(format!(
                "probe_savepoint '{}' is not a plain identifier",
                self.probe_savepoint
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_dialect(mut self, dialect: DialectKind) -> Self {
        self.dialect = dialect;
        self
    }

    #[must_use]
    pub fn with_fetch_size(mut self, fetch_size: usize) -> Self {
        self.fetch_size = fetch_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DataSourceConfig::default();
        config.validate().unwrap();
        assert_eq!(config.dialect, DialectKind::Relational);
        assert_eq!(config.fetch_size, 100);
        assert_eq!(config.probe_savepoint, "gdsl_probe");
        assert_eq!(config.cell_width, 20);
    }

    #[test]
    fn json_fills_missing_fields() {
        let config = DataSourceConfig::from_json(r#"{"dialect":"spatial","fetch_size":5}"#).unwrap();
        assert_eq!(config.dialect, DialectKind::Spatial);
        assert_eq!(config.fetch_size, 5);
        assert_eq!(config.cell_width, 20);
    }

    #[test]
    fn json_round_trip() {
        let config = DataSourceConfig::spatial().with_fetch_size(7);
        let text = config.to_json().unwrap();
        assert_eq!(DataSourceConfig::from_json(&text).unwrap(), config);
    }

    #[test]
    fn rejects_bad_values() {
        for text in [
            r#"{"fetch_size":0}"#,
            r#"{"cell_width":3}"#,
            r#"{"probe_savepoint":"drop table"}"#,
            r#"{"dialect":"oracle"}"#,
            r#"{"unknown":1}"#,
            "not json",
        ] {
            let err = DataSourceConfig::from_json(text).unwrap_err();
            assert!(matches!(err, GdslError::InvalidConfig { .. }), "{text}");
        }
    }
}
