//! Result cursors.
//!
//! Rows are fetched according to the cursor type:
//! - forward-only runs the query once and hands the rows out in order,
//! - scroll-insensitive runs the query once and keeps every row,
//! - scroll-sensitive re-reads the row at each positioning.
//!
//! A forward-only pass never re-executes its query, so statements issued on
//! the same connection while it is being read neither skip nor repeat rows.
//! Only [`Cursor::reopen`] starts a new pass.
//!
//! Navigation follows JDBC conventions: row numbers are 1-based and
//! `absolute(0)` moves before the first row.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::rc::Rc;

use gdsl_driver::{Connection, CursorOptions, CursorType, RowBuffer, RowVisitor};
use gdsl_error::{GdslError, Result};
use gdsl_types::{ColumnInfo, Value};
use tracing::{debug, trace};

use crate::binder::BoundQuery;

/// Where a cursor stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    BeforeFirst,
    /// 0-based index of the current row.
    OnRow(usize),
    AfterLast,
    Closed,
}

enum Strategy {
    /// Rows of the single forward pass not yet handed out.
    Streamed(VecDeque<Vec<Value>>),
    Materialized(Vec<Vec<Value>>),
    Positional,
}

/// A positioned view over an executed query.
pub struct Cursor {
    conn: Rc<dyn Connection>,
    query: BoundQuery,
    options: CursorOptions,
    fetch_size: usize,
    columns: Rc<[ColumnInfo]>,
    strategy: Strategy,
    position: Position,
    current: Option<Vec<Value>>,
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("sql", &self.query.sql)
            .field("options", &self.options)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl Cursor {
    /// Execute `query` and position the cursor before the first row.
    pub fn open(
        conn: Rc<dyn Connection>,
        query: BoundQuery,
        options: CursorOptions,
        fetch_size: usize,
    ) -> Result<Self> {
        let mut cursor = Self {
            conn,
            query,
            options,
            fetch_size: fetch_size.max(1),
            columns: Rc::from(Vec::new()),
            strategy: Strategy::Positional,
            position: Position::BeforeFirst,
            current: None,
        };
        cursor.execute()?;
        Ok(cursor)
    }

    fn execute(&mut self) -> Result<()> {
        debug!(
            target: "gdsl.cursor",
            sql = %self.query.sql,
            params = self.query.params.len(),
            cursor_type = ?self.options.cursor_type,
            "opening cursor"
        );
        self.strategy = match self.options.cursor_type {
            CursorType::ForwardOnly => {
                let pass = self.run(&self.query.sql, self.query.params.clone())?;
                trace!(
                    target: "gdsl.cursor",
                    rows = pass.rows.len(),
                    fetch_size = self.fetch_size,
                    "forward pass buffered"
                );
                self.columns = Rc::from(pass.columns);
                Strategy::Streamed(pass.rows.into())
            }
            CursorType::ScrollInsensitive => {
                let all = self.run(&self.query.sql, self.query.params.clone())?;
                self.columns = Rc::from(all.columns);
                Strategy::Materialized(all.rows)
            }
            CursorType::ScrollSensitive => {
                let sql = format!("SELECT * FROM ({}) AS gdsl_cursor LIMIT 0", self.query.sql);
                let probe = self.run(&sql, self.query.params.clone())?;
                self.columns = Rc::from(probe.columns);
                Strategy::Positional
            }
        };
        self.position = Position::BeforeFirst;
        self.current = None;
        Ok(())
    }

    fn run(&self, sql: &str, params: Vec<Value>) -> Result<RowBuffer> {
        let mut buffer = RowBuffer::default();
        self.conn
            .query(sql, &params, &mut buffer)
            .map_err(|source| GdslError::execution(sql, source))?;
        Ok(buffer)
    }

    /// Row count of the live result, for scrollable strategies.
    fn count(&self) -> Result<usize> {
        match &self.strategy {
            Strategy::Materialized(rows) => Ok(rows.len()),
            Strategy::Positional => {
                let sql = format!("SELECT COUNT(*) FROM ({}) AS gdsl_count", self.query.sql);
                let result = self.run(&sql, self.query.params.clone())?;
                let count = result
                    .rows
                    .first()
                    .and_then(|row| row.first())
                    .and_then(Value::as_integer)
                    .ok_or_else(|| GdslError::internal("COUNT(*) returned no value"))?;
                usize::try_from(count).map_err(|_| GdslError::internal("negative row count"))
            }
            Strategy::Streamed(_) => Err(GdslError::UnsupportedNavigation { operation: "count" }),
        }
    }

    fn load(&self, index: usize) -> Result<Option<Vec<Value>>> {
        match &self.strategy {
            Strategy::Materialized(rows) => Ok(rows.get(index).cloned()),
            Strategy::Positional => {
                let sql = format!(
                    "SELECT * FROM ({}) AS gdsl_cursor LIMIT 1 OFFSET {index}",
                    self.query.sql
                );
                Ok(self.run(&sql, self.query.params.clone())?.rows.into_iter().next())
            }
            Strategy::Streamed(_) => Err(GdslError::UnsupportedNavigation { operation: "load" }),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.position == Position::Closed {
            return Err(GdslError::CursorClosed);
        }
        if self.conn.is_closed() {
            return Err(GdslError::ConnectionClosed);
        }
        Ok(())
    }

    fn ensure_scrollable(&self, operation: &'static str) -> Result<()> {
        self.ensure_open()?;
        if self.options.cursor_type.is_scrollable() {
            Ok(())
        } else {
            Err(GdslError::UnsupportedNavigation { operation })
        }
    }

    /// 1-based number of the current row; 0 before the first row and
    /// `count + 1` after the last.
    fn ordinal(&self, count: impl FnOnce() -> Result<usize>) -> Result<usize> {
        match self.position {
            Position::BeforeFirst => Ok(0),
            Position::OnRow(index) => Ok(index + 1),
            Position::AfterLast => Ok(count()? + 1),
            Position::Closed => Err(GdslError::CursorClosed),
        }
    }

    /// Move to a 1-based row number, clamping to before-first/after-last.
    fn move_to(&mut self, target: i64, count: usize) -> Result<bool> {
        if target <= 0 {
            self.set_position(Position::BeforeFirst, None);
            return Ok(false);
        }
        let index = usize::try_from(target - 1).unwrap_or(usize::MAX);
        if index >= count {
            self.set_position(Position::AfterLast, None);
            return Ok(false);
        }
        match self.load(index)? {
            Some(row) => {
                self.set_position(Position::OnRow(index), Some(row));
                Ok(true)
            }
            // The live result shrank underneath us.
            None => {
                self.set_position(Position::AfterLast, None);
                Ok(false)
            }
        }
    }

    fn set_position(&mut self, position: Position, row: Option<Vec<Value>>) {
        self.position = position;
        self.current = row;
    }

    /// Advance to the next row. Returns `false`, and keeps returning it,
    /// once the result is exhausted.
    pub fn next(&mut self) -> Result<bool> {
        self.ensure_open()?;
        if self.position == Position::AfterLast {
            return Ok(false);
        }
        let next_index = match self.position {
            Position::OnRow(index) => index + 1,
            _ => 0,
        };
        let row = if let Strategy::Streamed(pending) = &mut self.strategy {
            pending.pop_front()
        } else {
            self.load(next_index)?
        };
        match row {
            Some(row) => self.set_position(Position::OnRow(next_index), Some(row)),
            None => self.set_position(Position::AfterLast, None),
        }
        Ok(self.current.is_some())
    }

    pub fn previous(&mut self) -> Result<bool> {
        self.ensure_scrollable("previous")?;
        match self.position {
            Position::OnRow(index) => {
                let target = i64::try_from(index).unwrap_or(i64::MAX);
                self.move_to(target, index)
            }
            Position::AfterLast => self.last(),
            _ => Ok(false),
        }
    }

    pub fn first(&mut self) -> Result<bool> {
        self.ensure_scrollable("first")?;
        let count = self.count()?;
        self.move_to(1, count)
    }

    pub fn last(&mut self) -> Result<bool> {
        self.ensure_scrollable("last")?;
        let count = self.count()?;
        self.move_to(i64::try_from(count).unwrap_or(i64::MAX), count)
    }

    /// Move to row `row` (1-based). Negative values count from the end,
    /// `-1` being the last row. `0` moves before the first row.
    pub fn absolute(&mut self, row: i64) -> Result<bool> {
        self.ensure_scrollable("absolute")?;
        let count = self.count()?;
        let count_i = i64::try_from(count).unwrap_or(i64::MAX);
        let target = if row < 0 { count_i + 1 + row } else { row };
        if row == 0 {
            self.set_position(Position::BeforeFirst, None);
            return Ok(false);
        }
        self.move_to(target, count)
    }

    /// Move `offset` rows from the current position.
    pub fn relative(&mut self, offset: i64) -> Result<bool> {
        self.ensure_scrollable("relative")?;
        let count = self.count()?;
        let current = self.ordinal(|| Ok(count))?;
        let target = i64::try_from(current)
            .unwrap_or(i64::MAX)
            .saturating_add(offset);
        self.move_to(target, count)
    }

    pub fn before_first(&mut self) -> Result<()> {
        self.ensure_scrollable("before_first")?;
        self.set_position(Position::BeforeFirst, None);
        Ok(())
    }

    pub fn after_last(&mut self) -> Result<()> {
        self.ensure_scrollable("after_last")?;
        self.set_position(Position::AfterLast, None);
        Ok(())
    }

    /// 1-based number of the current row, 0 when not on a row.
    pub fn row_number(&self) -> Result<usize> {
        self.ensure_scrollable("row_number")?;
        Ok(match self.position {
            Position::OnRow(index) => index + 1,
            _ => 0,
        })
    }

    pub fn is_before_first(&self) -> Result<bool> {
        self.ensure_scrollable("is_before_first")?;
        Ok(self.position == Position::BeforeFirst)
    }

    pub fn is_after_last(&self) -> Result<bool> {
        self.ensure_scrollable("is_after_last")?;
        Ok(self.position == Position::AfterLast)
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Values of the current row.
    pub fn current(&self) -> Result<&[Value]> {
        self.ensure_open()?;
        self.current.as_deref().ok_or(GdslError::NoCurrentRow)
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub(crate) fn shared_columns(&self) -> Rc<[ColumnInfo]> {
        Rc::clone(&self.columns)
    }

    pub fn options(&self) -> CursorOptions {
        self.options
    }

    pub fn query(&self) -> &BoundQuery {
        &self.query
    }

    pub fn fetch_size(&self) -> usize {
        self.fetch_size
    }

    /// Buffering hint for drivers that stream rows. Zero is treated as one.
    pub fn set_fetch_size(&mut self, fetch_size: usize) {
        self.fetch_size = fetch_size.max(1);
    }

    /// Run the query again and move before the first row.
    pub fn reopen(&mut self) -> Result<()> {
        self.execute()
    }

    /// Release the rows. Every later access fails with `CursorClosed`.
    pub fn close(&mut self) {
        if self.position != Position::Closed {
            debug!(target: "gdsl.cursor", sql = %self.query.sql, "closing cursor");
        }
        self.strategy = Strategy::Materialized(Vec::new());
        self.set_position(Position::Closed, None);
    }

    pub fn is_closed(&self) -> bool {
        self.position == Position::Closed
    }
}

/// Stream every row of `query` into `f` without keeping the result.
pub(crate) fn stream(
    conn: &dyn Connection,
    query: &BoundQuery,
    f: impl FnMut(&Rc<[ColumnInfo]>, Vec<Value>) -> ControlFlow<()>,
) -> Result<()> {
    struct Visitor<F> {
        columns: Rc<[ColumnInfo]>,
        f: F,
    }

    impl<F> RowVisitor for Visitor<F>
    where
        F: FnMut(&Rc<[ColumnInfo]>, Vec<Value>) -> ControlFlow<()>,
    {
        fn columns(&mut self, columns: &[ColumnInfo]) {
            self.columns = Rc::from(columns);
        }

        fn row(&mut self, values: Vec<Value>) -> ControlFlow<()> {
            (self.f)(&self.columns, values)
        }
    }

    let mut visitor = Visitor {
        columns: Rc::from(Vec::new()),
        f,
    };
    conn.query(&query.sql, &query.params, &mut visitor)
        .map_err(|source| GdslError::execution(query.sql.clone(), source))
}
