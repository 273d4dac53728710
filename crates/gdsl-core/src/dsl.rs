//! Fluent `SELECT` builder.
//!
//! The chain moves through typed stages so that only legal clause sequences
//! compile:
//!
//! ```text
//! select ─from─▶ FromBuilder ─where_─▶ ConditionBuilder ─and/or─▶ ConditionBuilder
//!                    │                        │
//!                    └─group_by/order_by/limit┴──▶ OptionBuilder ─(options)─▶ OptionBuilder
//! ```
//!
//! Rule violations the types cannot express (a second `limit`, `having`
//! without `group_by`, a malformed table name) are recorded in the chain and
//! returned by every terminal before anything reaches the backend. Clauses
//! render in SQL order whatever the call order.

use std::fmt;
use std::ops::ControlFlow;
use std::rc::Rc;

use gdsl_error::{GdslError, Result};
use gdsl_types::Value;
use tracing::debug;

use crate::binder::{BoundQuery, IntoTemplate, Template};
use crate::cursor;
use crate::datasource::DataSource;
use crate::resolver::{Resolved, TableKind, TableRequest};
use crate::spatial::SpatialTable;
use crate::table::{Row, Table};

/// Sort direction for [`OptionBuilder::order_by_dir`] and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Order {
    Asc,
    Desc,
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        })
    }
}

/// Rendered SQL with its parameters in placeholder order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFragment {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryFragment {
    pub fn bound(&self) -> BoundQuery {
        BoundQuery::new(self.sql.clone(), self.params.clone())
    }
}

/// What a `FROM` clause reads: a table name or a nested builder.
#[derive(Debug, Clone)]
pub enum FromSource {
    Table(String),
    Query(Result<QueryFragment>),
}

impl From<&str> for FromSource {
    fn from(name: &str) -> Self {
        Self::Table(name.to_owned())
    }
}

impl From<String> for FromSource {
    fn from(name: String) -> Self {
        Self::Table(name)
    }
}

impl From<&String> for FromSource {
    fn from(name: &String) -> Self {
        Self::Table(name.clone())
    }
}

struct Chain {
    source: DataSource,
    select: Vec<String>,
    from: String,
    from_params: Vec<Value>,
    conditions: Option<Template>,
    group_by: Option<Vec<String>>,
    having: Option<Template>,
    order_by: Vec<String>,
    limit: Option<u64>,
    error: Option<GdslError>,
}

impl Chain {
    /// Keep the first error only; later ones are usually its consequences.
    fn fail(&mut self, err: GdslError) {
        if self.error.is_none() {
            debug!(target: "gdsl.resolver", error = %err, "builder error recorded");
            self.error = Some(err);
        }
    }

    fn set_from(&mut self, source: FromSource) {
        match source {
            FromSource::Table(name) => {
                let name = name.trim();
                if let Err(err) = self.source.dialect().parse_location(name) {
                    self.fail(err);
                }
                self.from = name.to_owned();
            }
            FromSource::Query(Ok(fragment)) => {
                self.from = format!("({}) as foo", fragment.sql);
                self.from_params = fragment.params;
            }
            FromSource::Query(Err(err)) => self.fail(err),
        }
    }

    fn add_condition(&mut self, joiner: &str, condition: impl IntoTemplate) {
        let condition = match condition.into_template() {
            Ok(condition) => condition,
            Err(err) => return self.fail(err),
        };
        match &mut self.conditions {
            Some(existing) => {
                existing.append(Template::from(joiner));
                existing.append(condition);
            }
            None => self.conditions = Some(condition),
        }
    }

    fn group_by<I>(&mut self, fields: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if self.group_by.is_some() {
            return self.fail(GdslError::builder_state("group_by called twice"));
        }
        if fields.is_empty() {
            return self.fail(GdslError::builder_state("group_by needs at least one field"));
        }
        self.group_by = Some(fields);
    }

    fn having(&mut self, condition: impl IntoTemplate) {
        if self.group_by.is_none() {
            return self.fail(GdslError::builder_state("having requires a prior group_by"));
        }
        if self.having.is_some() {
            return self.fail(GdslError::builder_state("having called twice"));
        }
        match condition.into_template() {
            Ok(condition) => self.having = Some(condition),
            Err(err) => self.fail(err),
        }
    }

    fn order_by(&mut self, field: String, order: Option<Order>) {
        self.order_by.push(match order {
            Some(order) => format!("{field} {order}"),
            None => field,
        });
    }

    fn limit(&mut self, limit: u64) {
        if self.limit.is_some() {
            return self.fail(GdslError::builder_state("limit called twice"));
        }
        self.limit = Some(limit);
    }

    /// The SQL as built so far, ignoring any recorded error.
    fn render(&self) -> QueryFragment {
        let mut sql = String::from("SELECT ");
        if self.select.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.select.join(","));
        }
        sql.push_str(" FROM ");
        sql.push_str(&self.from);
        let mut params = self.from_params.clone();
        if let Some(conditions) = &self.conditions {
            let bound = conditions.bind();
            sql.push_str(" WHERE ");
            sql.push_str(&bound.sql);
            params.extend(bound.params);
        }
        if let Some(fields) = &self.group_by {
            sql.push_str(" GROUP BY ");
            sql.push_str(&fields.join(","));
        }
        if let Some(having) = &self.having {
            let bound = having.bind();
            sql.push_str(" HAVING ");
            sql.push_str(&bound.sql);
            params.extend(bound.params);
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(","));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        QueryFragment { sql, params }
    }

    fn fragment(&self) -> Result<QueryFragment> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(self.render()),
        }
    }

    fn open<T: TableKind>(self) -> Result<T> {
        let fragment = self.fragment()?;
        T::open(
            &self.source,
            TableRequest::subquery(&fragment.sql, fragment.params),
        )
    }

    fn each_row(self, mut f: impl FnMut(&Row)) -> Result<()> {
        let query = self.fragment()?.bound();
        cursor::stream(self.source.connection(), &query, |columns, values| {
            f(&Row::new(Rc::clone(columns), values));
            ControlFlow::Continue(())
        })
    }
}

/// `SELECT <columns>`, waiting for `from`.
pub struct SelectBuilder {
    chain: Chain,
}

impl SelectBuilder {
    pub(crate) fn new(source: DataSource, select: Vec<String>) -> Self {
        Self {
            chain: Chain {
                source,
                select,
                from: String::new(),
                from_params: Vec::new(),
                conditions: None,
                group_by: None,
                having: None,
                order_by: Vec::new(),
                limit: None,
                error: None,
            },
        }
    }

    /// Read from a table name (validated by the dialect, emitted as given)
    /// or from another builder, emitted as `(<sql>) as foo`.
    pub fn from(mut self, source: impl Into<FromSource>) -> FromBuilder {
        self.chain.set_from(source.into());
        FromBuilder { chain: self.chain }
    }
}

/// `SELECT ... FROM ...`
pub struct FromBuilder {
    chain: Chain,
}

impl FromBuilder {
    pub fn where_(mut self, condition: impl IntoTemplate) -> ConditionBuilder {
        self.chain.add_condition("", condition);
        ConditionBuilder { chain: self.chain }
    }
}

/// `... WHERE <condition>`, open to more conditions.
pub struct ConditionBuilder {
    chain: Chain,
}

impl ConditionBuilder {
    #[must_use]
    pub fn and(mut self, condition: impl IntoTemplate) -> Self {
        self.chain.add_condition(" AND ", condition);
        self
    }

    #[must_use]
    pub fn or(mut self, condition: impl IntoTemplate) -> Self {
        self.chain.add_condition(" OR ", condition);
        self
    }
}

/// After the first `GROUP BY`, `ORDER BY` or `LIMIT`.
pub struct OptionBuilder {
    chain: Chain,
}

impl OptionBuilder {
    /// `HAVING <condition>`; needs an earlier `group_by`.
    #[must_use]
    pub fn having(mut self, condition: impl IntoTemplate) -> Self {
        self.chain.having(condition);
        self
    }
}

macro_rules! option_methods {
    ($($stage:ident),*) => {$(
        impl $stage {
            pub fn group_by<I>(mut self, fields: I) -> OptionBuilder
            where
                I: IntoIterator,
                I::Item: Into<String>,
            {
                self.chain.group_by(fields);
                OptionBuilder { chain: self.chain }
            }

            pub fn order_by(mut self, field: impl Into<String>) -> OptionBuilder {
                self.chain.order_by(field.into(), None);
                OptionBuilder { chain: self.chain }
            }

            pub fn order_by_dir(mut self, field: impl Into<String>, order: Order) -> OptionBuilder {
                self.chain.order_by(field.into(), Some(order));
                OptionBuilder { chain: self.chain }
            }

            pub fn limit(mut self, limit: u64) -> OptionBuilder {
                self.chain.limit(limit);
                OptionBuilder { chain: self.chain }
            }
        }
    )*};
}

option_methods!(FromBuilder, ConditionBuilder, OptionBuilder);

macro_rules! terminals {
    ($($stage:ident),*) => {$(
        impl $stage {
            /// The rendered SQL, or the first error recorded in the chain.
            pub fn sql(&self) -> Result<String> {
                self.chain.fragment().map(|f| f.sql)
            }

            /// Values bound to the placeholders of [`Self::sql`], in order.
            pub fn params(&self) -> Result<Vec<Value>> {
                self.chain.fragment().map(|f| f.params)
            }

            pub fn fragment(&self) -> Result<QueryFragment> {
                self.chain.fragment()
            }

            pub fn table(self) -> Result<Table> {
                self.chain.open()
            }

            /// Fails with `NotSpatial` when the result has no geometry column.
            pub fn spatial_table(self) -> Result<SpatialTable> {
                self.chain.open()
            }

            pub fn resolve(self) -> Result<Resolved> {
                self.chain.open()
            }

            pub fn as_type<T: TableKind>(self) -> Result<T> {
                self.chain.open()
            }

            /// Stream the result into `f` without opening a table.
            pub fn each_row(self, f: impl FnMut(&Row)) -> Result<()> {
                self.chain.each_row(f)
            }
        }

        /// `(<sql>) as foo`, for use as a sub-query.
        impl fmt::Display for $stage {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "({}) as foo", self.chain.render().sql)
            }
        }

        impl From<$stage> for FromSource {
            fn from(stage: $stage) -> Self {
                Self::Query(stage.chain.fragment())
            }
        }
    )*};
}

terminals!(FromBuilder, ConditionBuilder, OptionBuilder);
