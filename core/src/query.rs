//! Fluent construction of parameterized `WHERE` clauses.
//!
//! [`QueryBuilder`] accumulates [`Condition`]s through chained calls and
//! compiles them with [`build`](QueryBuilder::build) into a SQL fragment
//! plus the ordered list of values to bind.
//!
//! Placeholders are always positional (`?`). The parameter list is the only
//! thing tying values to placeholders, so the compiler emits each clause and
//! its parameters in the same step: a condition contributes one parameter
//! per scalar, N parameters for an N-element `IN` list, and none for the
//! always-false `1 = 0` an empty `IN` list compiles to.
//!
//! Conditions are joined left to right with their connector and no added
//! parentheses, so standard SQL precedence applies (`AND` binds tighter than
//! `OR`).
//!
//! # Example
//!
//! ```
//! use tinyorm_core::{Operator, QueryBuilder, Value};
//!
//! let fragment = QueryBuilder::new("items")
//!     .and_where("category", "=", "B")
//!     .or_where("name", Operator::Eq, "Gamma")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(fragment.sql, "WHERE category = ? OR name = ?");
//! assert_eq!(fragment.params, vec![Value::from("B"), Value::from("Gamma")]);
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::QueryBuildError;
use crate::validate::is_valid_identifier;
use crate::value::Value;

/// Comparison operator of a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    In,
}

impl Operator {
    /// SQL spelling of the operator.
    pub fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Lt => "<",
            Operator::LtEq => "<=",
            Operator::Gt => ">",
            Operator::GtEq => ">=",
            Operator::Like => "LIKE",
            Operator::In => "IN",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for Operator {
    type Err = QueryBuildError;

    /// Parses SQL operator text; keywords are case-insensitive.
    ///
    /// ```
    /// use tinyorm_core::Operator;
    ///
    /// assert_eq!("<=".parse::<Operator>().unwrap(), Operator::LtEq);
    /// assert_eq!("like".parse::<Operator>().unwrap(), Operator::Like);
    /// assert!("~~".parse::<Operator>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "=" | "==" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::NotEq),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::LtEq),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::GtEq),
            "LIKE" => Ok(Operator::Like),
            "IN" => Ok(Operator::In),
            _ => Err(QueryBuildError::UnknownOperator(s.to_string())),
        }
    }
}

/// Anything a chain call accepts as an operator: an [`Operator`] or its SQL
/// text.
pub trait IntoOperator {
    fn into_operator(self) -> Result<Operator, QueryBuildError>;
}

impl IntoOperator for Operator {
    fn into_operator(self) -> Result<Operator, QueryBuildError> {
        Ok(self)
    }
}

impl IntoOperator for &str {
    fn into_operator(self) -> Result<Operator, QueryBuildError> {
        self.parse()
    }
}

/// How a condition combines with the conditions before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connector {
    And,
    Or,
}

impl Connector {
    pub fn as_sql(self) -> &'static str {
        match self {
            Connector::And => "AND",
            Connector::Or => "OR",
        }
    }
}

/// Sort direction for [`QueryBuilder::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Right-hand side of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    Single(Value),
    List(Vec<Value>),
    /// No operand: `IS NULL` with [`Operator::Eq`], `IS NOT NULL` with
    /// [`Operator::NotEq`].
    Absent,
}

/// One filter predicate.
///
/// The connector of the first condition in a builder is never rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub operator: Operator,
    pub value: ConditionValue,
    pub connector: Connector,
}

/// Compiled SQL text and its ordered parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fragment {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Fragment {
    /// Number of `?` placeholders in the SQL text.
    pub fn placeholder_count(&self) -> usize {
        self.sql.matches('?').count()
    }
}

/// Ordered equality filters, e.g. `{"category": "A"}`.
///
/// Names may be entity attribute names or column names; a repository
/// resolves them against its metadata.
///
/// ```
/// use tinyorm_core::{Criteria, Value};
///
/// let criteria = Criteria::new().eq("category", "A").eq("score", 10);
/// assert_eq!(criteria.len(), 2);
///
/// let same: Criteria = [("category", Value::from("A")), ("score", Value::from(10))]
///     .into_iter()
///     .collect();
/// assert_eq!(criteria, same);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Criteria {
    entries: Vec<(String, Value)>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `name = value` filter.
    pub fn eq(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push((name.into(), value.into()));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Criteria {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Criteria::new(), |criteria, (k, v)| criteria.eq(k, v))
    }
}

/// Chained builder for filtered queries against one table.
///
/// Chain calls take and return the builder by value; [`build`](Self::build)
/// borrows it and has no side effects, so it can be called any number of
/// times.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBuilder {
    table_name: String,
    conditions: Vec<Condition>,
    limit: Option<u64>,
    order_by: Option<(String, Direction)>,
    /// First operator parse failure from a chain call, reported by `build`.
    error: Option<QueryBuildError>,
}

impl QueryBuilder {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            conditions: Vec::new(),
            limit: None,
            order_by: None,
            error: None,
        }
    }

    /// Adds `column op ?`, combined with `AND`.
    pub fn and_where(
        self,
        column: impl Into<String>,
        op: impl IntoOperator,
        value: impl Into<Value>,
    ) -> Self {
        self.push(column.into(), op, ConditionValue::Single(value.into()), Connector::And)
    }

    /// Adds `column op ?`, combined with `OR`.
    ///
    /// On an empty builder this is identical to [`and_where`](Self::and_where).
    pub fn or_where(
        self,
        column: impl Into<String>,
        op: impl IntoOperator,
        value: impl Into<Value>,
    ) -> Self {
        self.push(column.into(), op, ConditionValue::Single(value.into()), Connector::Or)
    }

    /// Adds `column IN (?, ...)`, combined with `AND`.
    ///
    /// An empty `values` compiles to the unsatisfiable `1 = 0` and binds
    /// nothing.
    pub fn where_in<V: Into<Value>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.push(column.into(), Operator::In, ConditionValue::List(values), Connector::And)
    }

    /// Adds `column IS NULL`, combined with `AND`. Binds nothing.
    pub fn where_null(self, column: impl Into<String>) -> Self {
        self.push(column.into(), Operator::Eq, ConditionValue::Absent, Connector::And)
    }

    /// Adds `column IS NOT NULL`, combined with `AND`. Binds nothing.
    pub fn where_not_null(self, column: impl Into<String>) -> Self {
        self.push(column.into(), Operator::NotEq, ConditionValue::Absent, Connector::And)
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((column.into(), direction));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns a copy of this builder targeting another table.
    pub fn scoped_to(&self, table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..self.clone()
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn order(&self) -> Option<(&str, Direction)> {
        self.order_by.as_ref().map(|(c, d)| (c.as_str(), *d))
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    fn push(
        mut self,
        column: String,
        op: impl IntoOperator,
        value: ConditionValue,
        connector: Connector,
    ) -> Self {
        match op.into_operator() {
            Ok(operator) => self.conditions.push(Condition {
                column,
                operator,
                value,
                connector,
            }),
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    /// Compiles the conditions into a `WHERE ...` fragment.
    ///
    /// With no conditions the fragment is empty (no `WHERE`, no params).
    /// Every scalar binds one `?`, `NULL` included: `a = ?` bound to `NULL`
    /// matches nothing, as in SQL. Use [`where_null`](Self::where_null) to
    /// match missing values.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryBuildError`] for an unknown operator passed to a
    /// chain call, a column that is not a plain identifier, or `IN` with a
    /// scalar.
    pub fn build(&self) -> Result<Fragment, QueryBuildError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }

        let mut sql = String::new();
        let mut params = Vec::new();

        for (i, cond) in self.conditions.iter().enumerate() {
            if !is_valid_identifier(&cond.column) {
                return Err(QueryBuildError::InvalidColumn(cond.column.clone()));
            }
            if i > 0 {
                sql.push(' ');
                sql.push_str(cond.connector.as_sql());
                sql.push(' ');
            }

            let column = &cond.column;
            match (cond.operator, &cond.value) {
                (Operator::In, ConditionValue::List(values)) if values.is_empty() => {
                    sql.push_str("1 = 0");
                }
                (Operator::In, ConditionValue::List(values)) => {
                    let placeholders = vec!["?"; values.len()].join(", ");
                    sql.push_str(&format!("{column} IN ({placeholders})"));
                    params.extend(values.iter().cloned());
                }
                (Operator::In, ConditionValue::Single(_)) => {
                    return Err(invalid(column, "IN requires a list of values"));
                }
                (op, ConditionValue::List(_)) => {
                    return Err(invalid(column, &format!("{op} cannot take a list of values")));
                }
                (Operator::Eq, ConditionValue::Absent) => {
                    sql.push_str(&format!("{column} IS NULL"));
                }
                (Operator::NotEq, ConditionValue::Absent) => {
                    sql.push_str(&format!("{column} IS NOT NULL"));
                }
                (op, ConditionValue::Absent) => {
                    return Err(invalid(column, &format!("{op} requires a value")));
                }
                (op, ConditionValue::Single(value)) => {
                    sql.push_str(&format!("{column} {op} ?"));
                    params.push(value.clone());
                }
            }
        }

        if !sql.is_empty() {
            sql.insert_str(0, "WHERE ");
        }
        Ok(Fragment { sql, params })
    }

    /// Compiles a full `SELECT` over this builder's table.
    ///
    /// An empty `columns` selects `*`. Ordering and limit follow the
    /// `WHERE` fragment; the limit is rendered literally and binds nothing.
    pub fn build_select(&self, columns: &[&str]) -> Result<Fragment, QueryBuildError> {
        if !is_valid_identifier(&self.table_name) {
            return Err(QueryBuildError::InvalidColumn(self.table_name.clone()));
        }
        if let Some(bad) = columns.iter().find(|c| !is_valid_identifier(c)) {
            return Err(QueryBuildError::InvalidColumn((*bad).to_string()));
        }

        let select_list = if columns.is_empty() {
            "*".to_string()
        } else {
            columns.join(", ")
        };
        let filter = self.build()?;

        let mut sql = format!("SELECT {select_list} FROM {}", self.table_name);
        if !filter.sql.is_empty() {
            sql.push(' ');
            sql.push_str(&filter.sql);
        }
        if let Some((column, direction)) = &self.order_by {
            if !is_valid_identifier(column) {
                return Err(QueryBuildError::InvalidColumn(column.clone()));
            }
            sql.push_str(&format!(" ORDER BY {column} {}", direction.as_sql()));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        Ok(Fragment {
            sql,
            params: filter.params,
        })
    }
}

fn invalid(column: &str, reason: &str) -> QueryBuildError {
    QueryBuildError::InvalidCondition {
        column: column.to_string(),
        reason: reason.to_string(),
    }
}
