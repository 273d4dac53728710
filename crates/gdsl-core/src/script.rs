//! Multi-statement SQL scripts.
//!
//! A script is split on unquoted semicolons. `--` and `/* */` remarks are
//! dropped, and `${name}` references are replaced from a binding map when one
//! is supplied.

use std::collections::HashMap;
use std::io::Read;

use gdsl_error::{GdslError, Result};

/// Read a whole script and split it into runnable statements.
pub fn read_statements(
    mut reader: impl Read,
    bindings: &HashMap<String, String>,
) -> Result<Vec<String>> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    split_statements(&text)
        .into_iter()
        .map(|statement| {
            if bindings.is_empty() {
                Ok(statement)
            } else {
                substitute(&statement, bindings)
            }
        })
        .collect()
}

/// Split on unquoted semicolons, dropping remarks and blank statements.
///
/// Single-quoted literals (with `''` escapes) and double-quoted identifiers
/// are copied untouched.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                current.push(c);
                while let Some(inner) = chars.next() {
                    current.push(inner);
                    if inner == c {
                        if chars.peek() == Some(&c) {
                            current.extend(chars.next());
                            continue;
                        }
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        current.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    prev = skipped;
                }
                current.push(' ');
            }
            ';' => push_statement(&mut statements, &mut current),
            _ => current.push(c),
        }
    }
    push_statement(&mut statements, &mut current);
    statements
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_owned());
    }
    current.clear();
}

/// Replace every `${name}` in `statement`. An unterminated `${` is kept as is.
fn substitute(statement: &str, bindings: &HashMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(statement.len());
    let mut rest = statement;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        let name = rest[start + 2..start + 2 + len].trim();
        let value = bindings
            .get(name)
            .ok_or_else(|| GdslError::UnboundVariable {
                name: name.to_owned(),
            })?;
        out.push_str(&rest[..start]);
        out.push_str(value);
        rest = &rest[start + 3 + len..];
    }
    out.push_str(rest);
    Ok(out)
}
