//! Qualified table identifiers and backend case-folding.

use std::fmt;

use gdsl_error::{GdslError, Result};

/// How a backend normalizes unquoted identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldingRule {
    /// Unquoted identifiers are upper-cased (H2 family).
    Upper,
    /// Unquoted identifiers are lower-cased (PostgreSQL family).
    Lower,
}

impl FoldingRule {
    /// Fold an unquoted identifier.
    pub fn fold(self, ident: &str) -> String {
        match self {
            Self::Upper => ident.to_uppercase(),
            Self::Lower => ident.to_lowercase(),
        }
    }

    /// Whether `ident` can be written unquoted and read back unchanged.
    pub fn is_simple(self, ident: &str) -> bool {
        let mut chars = ident.chars();
        let Some(first) = chars.next() else {
            return false;
        };
        let folded_letter = |c: char| match self {
            Self::Upper => c.is_ascii_uppercase(),
            Self::Lower => c.is_ascii_lowercase(),
        };
        (folded_letter(first) || first == '_')
            && chars.all(|c| folded_letter(c) || c.is_ascii_digit() || c == '_')
            && !(self == Self::Lower && is_reserved_word(ident))
    }
}

/// Words the lower-folding backend refuses as bare identifiers.
const RESERVED_WORDS: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric", "both",
    "case", "cast", "check", "collate", "column", "constraint", "create", "current_catalog",
    "current_date", "current_role", "current_time", "current_timestamp", "current_user",
    "default", "deferrable", "desc", "distinct", "do", "else", "end", "except", "false",
    "fetch", "for", "foreign", "from", "grant", "group", "having", "in", "initially",
    "intersect", "into", "lateral", "leading", "limit", "localtime", "localtimestamp", "not",
    "null", "offset", "on", "only", "or", "order", "placing", "primary", "references",
    "returning", "select", "session_user", "some", "symmetric", "table", "then", "to",
    "trailing", "true", "union", "unique", "user", "using", "variadic", "when", "where",
    "window", "with",
];

fn is_reserved_word(ident: &str) -> bool {
    RESERVED_WORDS.binary_search(&ident).is_ok()
}

/// Quote `ident` for `folding` when it would not survive unquoted.
pub fn quote_identifier(ident: &str, folding: FoldingRule) -> String {
    if folding.is_simple(ident) {
        ident.to_owned()
    } else {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}

/// A table identified by optional catalog, optional schema and name.
///
/// Parts are stored as the backend sees them: unquoted input is folded,
/// quoted input is kept verbatim. Equality compares the stored parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableLocation {
    catalog: Option<String>,
    schema: Option<String>,
    table: String,
    folding: FoldingRule,
}

impl TableLocation {
    /// Build a location from already-normalized parts.
    pub fn from_parts(
        catalog: Option<&str>,
        schema: Option<&str>,
        table: &str,
        folding: FoldingRule,
    ) -> Self {
        Self {
            catalog: catalog.map(str::to_owned),
            schema: schema.map(str::to_owned),
            table: table.to_owned(),
            folding,
        }
    }

    /// Parse `catalog.schema.table`, `schema.table` or `table`.
    ///
    /// Each part is either a plain identifier (`[A-Za-z_][A-Za-z0-9_$]*`),
    /// folded with `folding`, or a double-quoted identifier with `""` escapes.
    pub fn parse(raw: &str, folding: FoldingRule) -> Result<Self> {
        let parts = split_parts(raw)?;
        let mut parts = parts.into_iter();
        let (catalog, schema, table) = match (parts.next(), parts.next(), parts.next()) {
            (Some(t), None, None) => (None, None, t),
            (Some(s), Some(t), None) => (None, Some(s), t),
            (Some(c), Some(s), Some(t)) => (Some(c), Some(s), t),
            _ => return Err(GdslError::invalid_identifier(raw, "empty identifier")),
        };
        let normalize = |part: Part| match part {
            Part::Quoted(text) => text,
            Part::Bare(text) => folding.fold(&text),
        };
        Ok(Self {
            catalog: catalog.map(normalize),
            schema: schema.map(normalize),
            table: normalize(table),
            folding,
        })
    }

    /// The catalog part, if present.
    pub fn catalog(&self) -> Option<&str> {
        self.catalog.as_deref()
    }

    /// The schema part, if present.
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// The table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The folding rule the parts were normalized with.
    pub const fn folding(&self) -> FoldingRule {
        self.folding
    }
}

impl fmt::Display for TableLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in [self.catalog.as_deref(), self.schema.as_deref()]
            .into_iter()
            .flatten()
        {
            write!(f, "{}.", quote_identifier(part, self.folding))?;
        }
        f.write_str(&quote_identifier(&self.table, self.folding))
    }
}

enum Part {
    Bare(String),
    Quoted(String),
}

fn split_parts(raw: &str) -> Result<Vec<Part>> {
    let invalid = |reason: &str| GdslError::invalid_identifier(raw, reason);
    let mut parts = Vec::new();
    let mut chars = raw.trim().chars().peekable();
    loop {
        let part = if chars.peek() == Some(&'"') {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    Some('"') if chars.peek() == Some(&'"') => {
                        chars.next();
                        text.push('"');
                    }
                    Some('"') => break,
                    Some(c) => text.push(c),
                    None => return Err(invalid("unterminated quoted identifier")),
                }
            }
            if text.is_empty() {
                return Err(invalid("empty quoted identifier"));
            }
            Part::Quoted(text)
        } else {
            let mut text = String::new();
            while let Some(&c) = chars.peek() {
                if c == '.' {
                    break;
                }
                let valid = if text.is_empty() {
                    c.is_ascii_alphabetic() || c == '_'
                } else {
                    c.is_ascii_alphanumeric() || c == '_' || c == '$'
                };
                if !valid {
                    return Err(invalid("unexpected character in identifier"));
                }
                text.push(c);
                chars.next();
            }
            if text.is_empty() {
                return Err(invalid("empty identifier"));
            }
            Part::Bare(text)
        };
        parts.push(part);
        match chars.next() {
            None => break,
            Some('.') => {}
            Some(_) => return Err(invalid("expected '.' between identifier parts")),
        }
    }
    if parts.len() > 3 {
        return Err(invalid("more than three identifier parts"));
    }
    Ok(parts)
}
