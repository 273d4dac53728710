//! Plain-text rendering of cells and tables.

use std::fmt::Write as _;

use crate::{CellAccess, Result, Table, Value, MIN_CELL_WIDTH};

const ELLIPSIS: &str = "...";

/// Where text sits inside a padded cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CellPosition {
    Left,
    Right,
    #[default]
    Center,
}

/// Cut `text` to `width` characters, ending in `...` when it was cut.
///
/// Widths under [`MIN_CELL_WIDTH`] are raised to it.
pub fn truncate(text: &str, width: usize) -> String {
    let width = width.max(MIN_CELL_WIDTH);
    if text.chars().count() <= width {
        return text.to_owned();
    }
    let mut cut: String = text.chars().take(width - ELLIPSIS.len()).collect();
    cut.push_str(ELLIPSIS);
    cut
}

/// Text of a cell value, truncated to `width`. NULL renders as `NULL`.
pub fn render_cell(value: &Value, width: usize) -> String {
    let text = match value {
        Value::Null => "NULL".to_owned(),
        other => other.to_plain_string(),
    };
    truncate(&text, width)
}

/// Truncate and pad `text` to exactly `width` characters.
pub fn pad(text: &str, width: usize, position: CellPosition) -> String {
    let width = width.max(MIN_CELL_WIDTH);
    let cut = truncate(text, width);
    let gap = width - cut.chars().count();
    let (left, right) = match position {
        CellPosition::Left => (0, gap),
        CellPosition::Right => (gap, 0),
        CellPosition::Center => (gap / 2, gap - gap / 2),
    };
    format!("{}{cut}{}", " ".repeat(left), " ".repeat(right))
}

/// Render every row of `table` as an ASCII grid with a header line.
///
/// The table is rewound first when its cursor can scroll.
pub fn ascii_table(table: &mut Table, width: usize) -> Result<String> {
    let width = width.max(MIN_CELL_WIDTH);
    let names = table.column_names();
    let separator = {
        let mut line = String::from("+");
        for _ in &names {
            line.push_str(&"-".repeat(width));
            line.push('+');
        }
        line
    };
    let mut out = String::new();
    let _ = writeln!(out, "{separator}");
    push_line(&mut out, names.iter().map(|n| pad(n, width, CellPosition::Center)));
    let _ = writeln!(out, "{separator}");
    for row in table.rows() {
        let row = row?;
        let cells = (0..row.len())
            .map(|i| row.cell(i).map(|v| pad(&render_cell(v, width), width, CellPosition::Left)))
            .collect::<Result<Vec<_>>>()?;
        push_line(&mut out, cells.into_iter());
    }
    let _ = writeln!(out, "{separator}");
    Ok(out)
}

/// [`ascii_table`] with the cell width configured on the table's data source.
pub fn ascii(table: &mut Table) -> Result<String> {
    let width = table.source().config().cell_width;
    ascii_table(table, width)
}

fn push_line(out: &mut String, cells: impl Iterator<Item = String>) {
    out.push('|');
    for cell in cells {
        out.push_str(&cell);
        out.push('|');
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DataSource, DataSourceConfig, SqliteConnection};

    #[test]
    fn long_text_is_cut_with_ellipsis() {
        assert_eq!(truncate("abcdefghij", 6), "abc...");
        assert_eq!(truncate("abcdef", 6), "abcdef");
        assert_eq!(truncate("abcdefghij", 1), "a...");
        assert_eq!(truncate("ééééééé", 5), "éé...");
    }

    #[test]
    fn cells_render_values() {
        assert_eq!(render_cell(&Value::Null, 10), "NULL");
        assert_eq!(render_cell(&Value::Integer(12_345_678), 5), "12...");
        assert_eq!(render_cell(&Value::from("short"), 20), "short");
    }

    #[test]
    fn padding() {
        assert_eq!(pad("ab", 6, CellPosition::Left), "ab    ");
        assert_eq!(pad("ab", 6, CellPosition::Right), "    ab");
        assert_eq!(pad("ab", 7, CellPosition::Center), "  ab   ");
    }

    #[test]
    fn renders_a_table() {
        let ds = DataSource::new(
            SqliteConnection::open_in_memory().unwrap(),
            DataSourceConfig::default(),
        )
        .unwrap();
        ds.execute("CREATE TABLE t (id INTEGER, label TEXT); INSERT INTO t VALUES (1, 'a rather long label');")
            .unwrap();
        let mut table = ds.table("t").unwrap();
        let text = ascii_table(&mut table, 8).unwrap();
        let expected = "\
+--------+--------+
|   id   | label  |
+--------+--------+
|1       |a rat...|
+--------+--------+
";
        assert_eq!(text, expected);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn truncated_text_fits_and_keeps_its_prefix(text in "\\PC{0,40}", width in 0usize..30) {
                let cut = truncate(&text, width);
                let limit = width.max(MIN_CELL_WIDTH);
                prop_assert!(cut.chars().count() <= limit);
                if text.chars().count() <= limit {
                    prop_assert_eq!(&cut, &text);
                } else {
                    let kept = cut.trim_end_matches(ELLIPSIS);
                    prop_assert!(cut.ends_with(ELLIPSIS));
                    prop_assert!(text.starts_with(&cut[..cut.len() - ELLIPSIS.len()]));
                    prop_assert!(kept.chars().count() <= limit - ELLIPSIS.len());
                }
                prop_assert_eq!(pad(&text, width, CellPosition::Right).chars().count(), limit);
            }
        }
    }
}
