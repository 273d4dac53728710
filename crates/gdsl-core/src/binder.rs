//! Templated SQL and parameter binding.
//!
//! A [`Template`] interleaves SQL text with values. Binding turns every value
//! into one positional `?` placeholder, in left-to-right order, so values keep
//! their native type instead of being spliced into the text. Identifiers are
//! never values: callers interpolate them (after dialect validation) into the
//! text segments.

use std::fmt;

use gdsl_error::{GdslError, Result};
use gdsl_types::Value;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Sql(String),
    Value(Value),
}

/// SQL text with embedded values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append literal SQL text.
    #[must_use]
    pub fn sql(mut self, text: impl AsRef<str>) -> Self {
        self.push_sql(text.as_ref());
        self
    }

    /// Append a value.
    #[must_use]
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.segments.push(Segment::Value(value.into()));
        self
    }

    /// Build a template from a format string where each `{}` takes the next
    /// value. `{{` and `}}` stand for literal braces.
    pub fn format(fmt: &str, values: Vec<Value>) -> Result<Self> {
        let placeholders = count_format_slots(fmt);
        if placeholders != values.len() {
            return Err(GdslError::TemplateArity {
                placeholders,
                values: values.len(),
            });
        }
        let mut template = Self::new();
        let mut values = values.into_iter();
        let mut text = String::new();
        let mut chars = fmt.chars().peekable();
        while let Some(c) = chars.next() {
            match (c, chars.peek()) {
                ('{', Some('}')) => {
                    chars.next();
                    template.push_sql(&std::mem::take(&mut text));
                    if let Some(value) = values.next() {
                        template.segments.push(Segment::Value(value));
                    }
                }
                ('{', Some('{')) | ('}', Some('}')) => {
                    chars.next();
                    text.push(c);
                }
                _ => text.push(c),
            }
        }
        template.push_sql(&text);
        Ok(template)
    }

    /// Append another template.
    pub fn append(&mut self, other: Self) {
        for segment in other.segments {
            match segment {
                Segment::Sql(text) => self.push_sql(&text),
                value @ Segment::Value(_) => self.segments.push(value),
            }
        }
    }

    fn push_sql(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Segment::Sql(last)) = self.segments.last_mut() {
            last.push_str(text);
        } else {
            self.segments.push(Segment::Sql(text.to_owned()));
        }
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Value(value) => Some(value),
            Segment::Sql(_) => None,
        })
    }

    pub fn value_count(&self) -> usize {
        self.values().count()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Turn the template into placeholder SQL and its parameter list.
    pub fn bind(&self) -> BoundQuery {
        let mut sql = String::new();
        let mut params = Vec::new();
        for segment in &self.segments {
            match segment {
                Segment::Sql(text) => sql.push_str(text),
                Segment::Value(value) => {
                    sql.push('?');
                    params.push(value.clone());
                }
            }
        }
        BoundQuery { sql, params }
    }
}

/// Shows the SQL with values rendered as literals, for logs and messages.
impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Sql(text) => f.write_str(text)?,
                Segment::Value(value) => write!(f, "{value}")?,
            }
        }
        Ok(())
    }
}

impl From<&str> for Template {
    fn from(text: &str) -> Self {
        Self::new().sql(text)
    }
}

impl From<String> for Template {
    fn from(text: String) -> Self {
        Self::new().sql(text)
    }
}

impl From<&String> for Template {
    fn from(text: &String) -> Self {
        Self::new().sql(text)
    }
}

/// Conversion used by builder methods, so that a failed [`Template::format`]
/// is recorded in the chain instead of forcing an early `?`.
pub trait IntoTemplate {
    fn into_template(self) -> Result<Template>;
}

impl IntoTemplate for Template {
    fn into_template(self) -> Result<Template> {
        Ok(self)
    }
}

impl IntoTemplate for Result<Template> {
    fn into_template(self) -> Result<Template> {
        self
    }
}

impl IntoTemplate for &str {
    fn into_template(self) -> Result<Template> {
        Ok(self.into())
    }
}

impl IntoTemplate for String {
    fn into_template(self) -> Result<Template> {
        Ok(self.into())
    }
}

impl IntoTemplate for &String {
    fn into_template(self) -> Result<Template> {
        Ok(self.into())
    }
}

/// Parameterized SQL ready for a driver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

impl BoundQuery {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Whether the query needs a prepared statement. Unprepared text goes
    /// through the driver's plain path and may hold several statements.
    pub fn is_prepared(&self) -> bool {
        !self.params.is_empty()
    }
}

/// Bind a template. See [`Template::bind`].
pub fn bind(template: &Template) -> BoundQuery {
    template.bind()
}

fn count_format_slots(fmt: &str) -> usize {
    let mut count = 0;
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('{', Some('}')) => {
                chars.next();
                count += 1;
            }
            ('{', Some('{')) | ('}', Some('}')) => {
                chars.next();
            }
            _ => {}
        }
    }
    count
}

/// Count `?` placeholders outside quoted literals and identifiers.
pub fn count_placeholders(sql: &str) -> usize {
    let mut count = 0;
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        match quote {
            // A doubled quote closes and reopens, which nets out.
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '?' => count += 1,
            None => {}
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn values_become_placeholders_in_order() {
        let bound = Template::new()
            .sql("SELECT * FROM t WHERE a > ")
            .value(1)
            .sql(" AND b = ")
            .value("x")
            .bind();
        assert_eq!(bound.sql, "SELECT * FROM t WHERE a > ? AND b = ?");
        assert_eq!(bound.params, vec![Value::Integer(1), Value::from("x")]);
        assert!(bound.is_prepared());
    }

    #[test]
    fn plain_text_passes_through() {
        let bound = bind(&Template::from("CREATE TABLE t (a INT); INSERT INTO t VALUES (1)"));
        assert_eq!(bound.sql, "CREATE TABLE t (a INT); INSERT INTO t VALUES (1)");
        assert!(bound.params.is_empty());
        assert!(!bound.is_prepared());
    }

    #[test]
    fn format_fills_slots() {
        let template = Template::format(
            "a = {} OR b IN ({}, {})",
            vec![Value::Integer(1), Value::Null, Value::Float(2.5)],
        )
        .unwrap();
        let bound = template.bind();
        assert_eq!(bound.sql, "a = ? OR b IN (?, ?)");
        assert_eq!(bound.params.len(), 3);
        assert_eq!(bound.params[1], Value::Null);
    }

    #[test]
    fn format_escapes_braces() {
        let template = Template::format("x = '{{}}' AND y = {}", vec![Value::Integer(7)]).unwrap();
        assert_eq!(template.bind().sql, "x = '{}' AND y = ?");
    }

    #[test]
    fn format_arity_mismatch() {
        let err = Template::format("a = {} AND b = {}", vec![Value::Integer(1)]).unwrap_err();
        assert!(matches!(
            err,
            GdslError::TemplateArity {
                placeholders: 2,
                values: 1
            }
        ));
        assert!(err.is_structural());
    }

    #[test]
    fn display_renders_literals() {
        let template = Template::new().sql("name = ").value("O'Hara");
        assert_eq!(template.to_string(), "name = 'O''Hara'");
    }

    #[test]
    fn append_merges_text() {
        let mut left = Template::from("a = ").value(1);
        left.append(Template::from(" AND b = ").value(2));
        assert_eq!(left.value_count(), 2);
        assert_eq!(left.bind().sql, "a = ? AND b = ?");
    }

    #[test]
    fn placeholders_inside_quotes_are_ignored() {
        assert_eq!(count_placeholders("SELECT '?', \"?\" FROM t WHERE a = ?"), 1);
        assert_eq!(count_placeholders("SELECT 'it''s ?' WHERE b = ? AND c = ?"), 2);
    }

    proptest! {
        #[test]
        fn bound_placeholders_match_params(
            parts in proptest::collection::vec(("[a-z =<>]{0,6}", any::<Option<i64>>()), 0..12)
        ) {
            let mut template = Template::new();
            for (text, value) in &parts {
                template = template.sql(text);
                if let Some(v) = value {
                    template = template.value(*v);
                }
            }
            let bound = template.bind();
            let expected: Vec<Value> = parts
                .iter()
                .filter_map(|(_, v)| v.map(Value::Integer))
                .collect();
            prop_assert_eq!(count_placeholders(&bound.sql), bound.params.len());
            prop_assert_eq!(bound.params, expected);
        }
    }
}
