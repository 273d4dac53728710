//! Cursor-backed tables and their rows.

use std::cell::Cell;
use std::fmt;
use std::ops::ControlFlow;
use std::rc::Rc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use gdsl_driver::CursorOptions;
use gdsl_error::{GdslError, Result};
use gdsl_types::{ColumnInfo, FromValue, TableLocation, Value};
use tracing::debug;

use crate::binder::BoundQuery;
use crate::cursor::{self, Cursor, Position};
use crate::datasource::DataSource;
use crate::resolver::TableRequest;

/// Something that selects a column: a 0-based index or a column name.
pub trait ColumnIndex {
    fn column_index(&self, columns: &[ColumnInfo]) -> Result<usize>;
}

impl ColumnIndex for usize {
    fn column_index(&self, columns: &[ColumnInfo]) -> Result<usize> {
        if *self < columns.len() {
            Ok(*self)
        } else {
            Err(GdslError::NoSuchColumn {
                name: format!("#{self}"),
            })
        }
    }
}

/// Exact match first, then ASCII case-insensitive.
impl ColumnIndex for &str {
    fn column_index(&self, columns: &[ColumnInfo]) -> Result<usize> {
        columns
            .iter()
            .position(|c| c.name == *self)
            .or_else(|| {
                columns
                    .iter()
                    .position(|c| c.name.eq_ignore_ascii_case(self))
            })
            .ok_or_else(|| GdslError::NoSuchColumn {
                name: (*self).to_owned(),
            })
    }
}

impl ColumnIndex for String {
    fn column_index(&self, columns: &[ColumnInfo]) -> Result<usize> {
        self.as_str().column_index(columns)
    }
}

impl ColumnIndex for &String {
    fn column_index(&self, columns: &[ColumnInfo]) -> Result<usize> {
        self.as_str().column_index(columns)
    }
}

/// Typed cell access shared by tables and rows.
///
/// Object getters return `None` for SQL NULL. Numeric and boolean getters
/// return zero or `false` for NULL; [`Table::was_null`] tells the two apart.
pub trait CellAccess {
    fn column_infos(&self) -> &[ColumnInfo];

    fn cell_at(&self, index: usize) -> Result<&Value>;

    /// Hook for remembering whether the last cell read was NULL.
    fn record_null(&self, is_null: bool) {
        let _ = is_null;
    }

    fn cell(&self, column: impl ColumnIndex) -> Result<&Value> {
        let index = column.column_index(self.column_infos())?;
        let value = self.cell_at(index)?;
        self.record_null(value.is_null());
        Ok(value)
    }

    fn get<T: FromValue>(&self, column: impl ColumnIndex) -> Result<T> {
        T::from_value(self.cell(column)?)
    }

    fn get_object(&self, column: impl ColumnIndex) -> Result<Value> {
        self.cell(column).cloned()
    }

    fn get_string(&self, column: impl ColumnIndex) -> Result<Option<String>> {
        self.get(column)
    }

    fn get_int(&self, column: impl ColumnIndex) -> Result<i32> {
        Ok(self.get::<Option<i32>>(column)?.unwrap_or_default())
    }

    fn get_long(&self, column: impl ColumnIndex) -> Result<i64> {
        Ok(self.get::<Option<i64>>(column)?.unwrap_or_default())
    }

    fn get_double(&self, column: impl ColumnIndex) -> Result<f64> {
        Ok(self.get::<Option<f64>>(column)?.unwrap_or_default())
    }

    fn get_bool(&self, column: impl ColumnIndex) -> Result<bool> {
        Ok(self.get::<Option<bool>>(column)?.unwrap_or_default())
    }

    fn get_date(&self, column: impl ColumnIndex) -> Result<Option<NaiveDate>> {
        self.get(column)
    }

    fn get_time(&self, column: impl ColumnIndex) -> Result<Option<NaiveTime>> {
        self.get(column)
    }

    fn get_timestamp(&self, column: impl ColumnIndex) -> Result<Option<NaiveDateTime>> {
        self.get(column)
    }

    fn get_bytes(&self, column: impl ColumnIndex) -> Result<Option<Vec<u8>>> {
        self.get(column)
    }
}

/// An owned row, detached from its cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Rc<[ColumnInfo]>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(columns: Rc<[ColumnInfo]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(column name, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(|c| c.name.as_str())
            .zip(self.values.iter())
    }
}

impl CellAccess for Row {
    fn column_infos(&self) -> &[ColumnInfo] {
        &self.columns
    }

    fn cell_at(&self, index: usize) -> Result<&Value> {
        self.values.get(index).ok_or_else(|| GdslError::NoSuchColumn {
            name: format!("#{index}"),
        })
    }
}

/// The current row of a table, borrowed until the cursor moves.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'t> {
    columns: &'t [ColumnInfo],
    values: &'t [Value],
}

impl<'t> RowView<'t> {
    pub fn values(&self) -> &'t [Value] {
        self.values
    }

    pub fn to_row(&self) -> Row {
        Row::new(Rc::from(self.columns), self.values.to_vec())
    }
}

impl CellAccess for RowView<'_> {
    fn column_infos(&self) -> &[ColumnInfo] {
        self.columns
    }

    fn cell_at(&self, index: usize) -> Result<&Value> {
        self.values.get(index).ok_or_else(|| GdslError::NoSuchColumn {
            name: format!("#{index}"),
        })
    }
}

/// An executed query seen as a relation, with a cursor over its rows.
pub struct Table {
    source: DataSource,
    location: Option<TableLocation>,
    from: String,
    cursor: Cursor,
    was_null: Cell<bool>,
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name())
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

impl Table {
    /// Run `SELECT * FROM <request.from>` on a new cursor.
    pub(crate) fn open(
        source: &DataSource,
        request: TableRequest,
        options: CursorOptions,
    ) -> Result<Self> {
        let query = BoundQuery::new(format!("SELECT * FROM {}", request.from), request.params);
        let cursor = Cursor::open(
            source.shared_connection(),
            query,
            options,
            source.config().fetch_size,
        )?;
        Ok(Self {
            source: source.clone(),
            location: request.location,
            from: request.from,
            cursor,
            was_null: Cell::new(false),
        })
    }

    pub(crate) fn from_clause(&self) -> &str {
        &self.from
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }

    // Navigation

    pub fn next(&mut self) -> Result<bool> {
        self.cursor.next()
    }

    pub fn previous(&mut self) -> Result<bool> {
        self.cursor.previous()
    }

    pub fn first(&mut self) -> Result<bool> {
        self.cursor.first()
    }

    pub fn last(&mut self) -> Result<bool> {
        self.cursor.last()
    }

    pub fn absolute(&mut self, row: i64) -> Result<bool> {
        self.cursor.absolute(row)
    }

    pub fn relative(&mut self, offset: i64) -> Result<bool> {
        self.cursor.relative(offset)
    }

    pub fn before_first(&mut self) -> Result<()> {
        self.cursor.before_first()
    }

    pub fn after_last(&mut self) -> Result<()> {
        self.cursor.after_last()
    }

    pub fn row_number(&self) -> Result<usize> {
        self.cursor.row_number()
    }

    pub fn is_before_first(&self) -> Result<bool> {
        self.cursor.is_before_first()
    }

    pub fn is_after_last(&self) -> Result<bool> {
        self.cursor.is_after_last()
    }

    pub fn position(&self) -> Position {
        self.cursor.position()
    }

    /// The row under the cursor.
    pub fn current(&self) -> Result<RowView<'_>> {
        Ok(RowView {
            columns: self.cursor.columns(),
            values: self.cursor.current()?,
        })
    }

    /// Whether the last cell read through this table was NULL.
    pub fn was_null(&self) -> bool {
        self.was_null.get()
    }

    // Introspection

    pub fn columns(&self) -> &[ColumnInfo] {
        self.cursor.columns()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_count(&self) -> usize {
        self.columns().len()
    }

    /// Declared type of a column, `None` when the backend declares none.
    pub fn column_type(&self, column: impl ColumnIndex) -> Result<Option<&str>> {
        let index = column.column_index(self.columns())?;
        Ok(self.columns()[index].declared_type.as_deref())
    }

    pub fn has_column(&self, name: &str) -> bool {
        name.column_index(self.columns()).is_ok()
    }

    /// Location of a stored table, `None` for a sub-query.
    pub fn location(&self) -> Option<&TableLocation> {
        self.location.as_ref()
    }

    /// Display name: the location, or the sub-query text.
    pub fn name(&self) -> String {
        match &self.location {
            Some(location) => location.to_string(),
            None => self.from.clone(),
        }
    }

    pub fn is_spatial(&self) -> bool {
        false
    }

    pub fn cursor_options(&self) -> CursorOptions {
        self.cursor.options()
    }

    pub fn sql(&self) -> &str {
        &self.cursor.query().sql
    }

    pub fn params(&self) -> &[Value] {
        &self.cursor.query().params
    }

    pub fn fetch_size(&self) -> usize {
        self.cursor.fetch_size()
    }

    pub fn set_fetch_size(&mut self, fetch_size: usize) {
        self.cursor.set_fetch_size(fetch_size);
    }

    // Whole-table queries, independent of the cursor position

    /// Count rows with `COUNT(*)`. Never cached.
    pub fn row_count(&self) -> Result<usize> {
        let query = BoundQuery::new(
            format!("SELECT COUNT(*) FROM {}", self.from),
            self.params().to_vec(),
        );
        let count = self
            .source
            .scalar(&query)?
            .as_ref()
            .and_then(Value::as_integer)
            .ok_or_else(|| GdslError::internal("COUNT(*) returned no value"))?;
        usize::try_from(count).map_err(|_| GdslError::internal("negative row count"))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.first_row()?.is_none())
    }

    pub fn first_row(&self) -> Result<Option<Row>> {
        let query = BoundQuery::new(
            format!("SELECT * FROM {} LIMIT 1", self.from),
            self.params().to_vec(),
        );
        let mut first = None;
        cursor::stream(self.source.connection(), &query, |columns, values| {
            first = Some(Row::new(Rc::clone(columns), values));
            ControlFlow::Break(())
        })?;
        Ok(first)
    }

    /// Distinct values of one column, in backend order.
    pub fn unique_values(&self, column: impl ColumnIndex) -> Result<Vec<Value>> {
        let index = column.column_index(self.columns())?;
        let name = self.source.dialect().quote_identifier(&self.columns()[index].name);
        let query = BoundQuery::new(
            format!("SELECT DISTINCT {name} FROM {}", self.from),
            self.params().to_vec(),
        );
        let mut values = Vec::new();
        cursor::stream(self.source.connection(), &query, |_, mut row| {
            if let Some(value) = row.pop() {
                values.push(value);
            }
            ControlFlow::Continue(())
        })?;
        Ok(values)
    }

    // Iteration

    /// Iterate the rows. A scrollable cursor starts over from the first row;
    /// a forward-only cursor continues where it stands.
    pub fn rows(&mut self) -> Rows<'_> {
        let pending = self.rewind().err();
        Rows {
            table: self,
            pending,
            done: false,
        }
    }

    /// Consume the table into a one-shot row stream.
    pub fn into_rows(mut self) -> IntoRows {
        let pending = self.rewind().err();
        IntoRows {
            table: self,
            pending,
            done: false,
        }
    }

    /// Call `f` for every row in cursor order.
    pub fn each_row(&mut self, mut f: impl FnMut(&Row)) -> Result<()> {
        for row in self.rows() {
            f(&row?);
        }
        Ok(())
    }

    fn rewind(&mut self) -> Result<()> {
        if self.cursor.options().cursor_type.is_scrollable() && !self.cursor.is_closed() {
            self.cursor.before_first()?;
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<Option<Row>> {
        if !self.cursor.next()? {
            return Ok(None);
        }
        let values = self.cursor.current()?.to_vec();
        Ok(Some(Row::new(self.cursor.shared_columns(), values)))
    }

    /// Run the query again and move before the first row.
    pub fn reopen(&mut self) -> Result<()> {
        self.cursor.reopen()
    }

    /// Release the cursor. Later access fails with `CursorClosed`.
    pub fn close(&mut self) {
        if !self.cursor.is_closed() {
            debug!(target: "gdsl.cursor", table = %self.name(), "closing table");
        }
        self.cursor.close();
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_closed()
    }
}

impl CellAccess for Table {
    fn column_infos(&self) -> &[ColumnInfo] {
        self.cursor.columns()
    }

    fn cell_at(&self, index: usize) -> Result<&Value> {
        self.cursor
            .current()?
            .get(index)
            .ok_or_else(|| GdslError::NoSuchColumn {
                name: format!("#{index}"),
            })
    }

    fn record_null(&self, is_null: bool) {
        self.was_null.set(is_null);
    }
}

/// Rows of a borrowed table. See [`Table::rows`].
pub struct Rows<'t> {
    table: &'t mut Table,
    pending: Option<GdslError>,
    done: bool,
}

impl Iterator for Rows<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        next_row(self.table, &mut self.pending, &mut self.done)
    }
}

/// Rows of a consumed table. See [`Table::into_rows`].
pub struct IntoRows {
    table: Table,
    pending: Option<GdslError>,
    done: bool,
}

impl Iterator for IntoRows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        next_row(&mut self.table, &mut self.pending, &mut self.done)
    }
}

fn next_row(
    table: &mut Table,
    pending: &mut Option<GdslError>,
    done: &mut bool,
) -> Option<Result<Row>> {
    if *done {
        return None;
    }
    if let Some(err) = pending.take() {
        *done = true;
        return Some(Err(err));
    }
    match table.advance() {
        Ok(Some(row)) => Some(Ok(row)),
        Ok(None) => {
            *done = true;
            None
        }
        Err(err) => {
            *done = true;
            Some(Err(err))
        }
    }
}
