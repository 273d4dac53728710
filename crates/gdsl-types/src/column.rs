use serde::{Deserialize, Serialize};

/// A result or table column: its label and the type the backend declared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// `None` for computed columns the backend cannot describe.
    pub declared_type: Option<String>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, declared_type: Option<&str>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.map(str::to_owned),
        }
    }

    /// Upper-cased declared type without its modifier list.
    ///
    /// `geometry(POINT, 4326)` becomes `GEOMETRY`; an undeclared type is `""`.
    pub fn base_type(&self) -> String {
        self.declared_type
            .as_deref()
            .map(|decl| {
                decl.split('(')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_uppercase()
            })
            .unwrap_or_default()
    }

    /// Comma-separated modifiers between the parentheses of the declared type.
    pub fn type_modifiers(&self) -> Vec<String> {
        let Some(decl) = self.declared_type.as_deref() else {
            return Vec::new();
        };
        let Some((_, rest)) = decl.split_once('(') else {
            return Vec::new();
        };
        let inner = rest.rsplit_once(')').map_or(rest, |(inner, _)| inner);
        inner
            .split(',')
            .map(|m| m.trim().to_uppercase())
            .filter(|m| !m.is_empty())
            .collect()
    }

    /// SRID carried by a `geometry(<subtype>, <srid>)` declaration.
    pub fn declared_srid(&self) -> Option<i32> {
        self.type_modifiers()
            .iter()
            .rev()
            .find_map(|m| m.parse::<i32>().ok())
    }

    /// Geometry subtype carried by a `geometry(<subtype>[, <srid>])` declaration.
    pub fn declared_subtype(&self) -> Option<String> {
        self.type_modifiers()
            .into_iter()
            .find(|m| m.parse::<i32>().is_err())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_type_strips_modifiers() {
        let col = ColumnInfo::new("the_geom", Some("geometry(POINT, 4326)"));
        assert_eq!(col.base_type(), "GEOMETRY");
        assert_eq!(col.declared_srid(), Some(4326));
        assert_eq!(col.declared_subtype().as_deref(), Some("POINT"));
    }

    #[test]
    fn plain_types() {
        let col = ColumnInfo::new("id", Some("integer"));
        assert_eq!(col.base_type(), "INTEGER");
        assert!(col.type_modifiers().is_empty());
        assert_eq!(col.declared_srid(), None);

        let col = ColumnInfo::new("name", Some("VARCHAR(32)"));
        assert_eq!(col.base_type(), "VARCHAR");
        assert_eq!(col.type_modifiers(), vec!["32".to_owned()]);
    }

    #[test]
    fn undeclared_type() {
        let col = ColumnInfo::new("count(*)", None);
        assert_eq!(col.base_type(), "");
        assert!(col.declared_subtype().is_none());
    }
}
