//! SQL expression trees and dialect-aware compilation.
//!
//! Conditions for the relational backend are built as [`SqlExpr`] trees and compiled
//! to text per [`SqlDialect`]. Every parameter is rendered inline as a literal, so the
//! compiled text is runnable as-is and doubles as the audit query handed back to
//! users. Identifiers and string literals are rendered through sqlparser's AST so
//! quoting and escaping match what the SQL parser reads back.

use crate::{MetricResult, ValidationError};
use datafusion::sql::sqlparser::ast::{Ident, Value};
use datafusion::sql::sqlparser::dialect::{
    BigQueryDialect, Dialect, GenericDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect,
    RedshiftSqlDialect, SQLiteDialect, SnowflakeDialect,
};
use expectations_core::{ConfigurationError, DataValue};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// SQL dialects the relational backend can compile for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SqlDialect {
    Postgresql,
    Redshift,
    Mysql,
    Sqlite,
    Mssql,
    Bigquery,
    Trino,
    Snowflake,
}

impl SqlDialect {
    /// Every built-in dialect.
    pub const ALL: [SqlDialect; 8] = [
        SqlDialect::Postgresql,
        SqlDialect::Redshift,
        SqlDialect::Mysql,
        SqlDialect::Sqlite,
        SqlDialect::Mssql,
        SqlDialect::Bigquery,
        SqlDialect::Trino,
        SqlDialect::Snowflake,
    ];

    /// Lower-case dialect name.
    pub fn name(&self) -> &'static str {
        match self {
            SqlDialect::Postgresql => "postgresql",
            SqlDialect::Redshift => "redshift",
            SqlDialect::Mysql => "mysql",
            SqlDialect::Sqlite => "sqlite",
            SqlDialect::Mssql => "mssql",
            SqlDialect::Bigquery => "bigquery",
            SqlDialect::Trino => "trino",
            SqlDialect::Snowflake => "snowflake",
        }
    }

    /// Parser dialect matching this SQL dialect.
    pub fn parser_dialect(&self) -> Box<dyn Dialect> {
        match self {
            SqlDialect::Postgresql => Box::new(PostgreSqlDialect {}),
            SqlDialect::Redshift => Box::new(RedshiftSqlDialect {}),
            SqlDialect::Mysql => Box::new(MySqlDialect {}),
            SqlDialect::Sqlite => Box::new(SQLiteDialect {}),
            SqlDialect::Mssql => Box::new(MsSqlDialect {}),
            SqlDialect::Bigquery => Box::new(BigQueryDialect {}),
            SqlDialect::Trino => Box::new(GenericDialect {}),
            SqlDialect::Snowflake => Box::new(SnowflakeDialect {}),
        }
    }

    /// Quotes an identifier if the dialect would not read it back verbatim.
    pub fn quote_identifier(&self, ident: &str) -> String {
        if !requires_quotes(ident) {
            return Ident::new(ident).to_string();
        }
        match self {
            SqlDialect::Mysql | SqlDialect::Bigquery => Ident::with_quote('`', ident).to_string(),
            // sqlparser prints bracketed identifiers without escaping.
            SqlDialect::Mssql => Ident::with_quote('[', ident.replace(']', "]]")).to_string(),
            _ => Ident::with_quote('"', ident).to_string(),
        }
    }

    /// Renders a value as an inline literal.
    pub fn render_literal(&self, value: &DataValue) -> MetricResult<String> {
        match value {
            DataValue::Null => Ok("NULL".to_string()),
            DataValue::Bool(b) => Ok(match (self, b) {
                (SqlDialect::Mssql, true) => "1".to_string(),
                (SqlDialect::Mssql, false) => "0".to_string(),
                (_, true) => "TRUE".to_string(),
                (_, false) => "FALSE".to_string(),
            }),
            DataValue::Int(i) => Ok(i.to_string()),
            DataValue::Float(f) if f.is_finite() => Ok(format!("{f:?}")),
            DataValue::Float(f) => Err(ValidationError::backend(format!(
                "cannot render non-finite float {f} as a SQL literal"
            ))),
            DataValue::String(s) | DataValue::Timestamp(s) => {
                Ok(Value::SingleQuotedString(s.clone()).to_string())
            }
            DataValue::List(_) | DataValue::Map(_) => Err(ValidationError::backend(format!(
                "cannot render a {} value as a SQL literal",
                value.type_name()
            ))),
        }
    }

    /// Renders a regex match, or fails if the dialect has no regex operator.
    fn render_regex(&self, expr: &str, pattern: &str, negated: bool) -> MetricResult<String> {
        let pattern = self.render_literal(&DataValue::from(pattern))?;
        let not = if negated { "NOT " } else { "" };
        match self {
            SqlDialect::Postgresql | SqlDialect::Redshift => {
                let op = if negated { "!~" } else { "~" };
                Ok(format!("{expr} {op} {pattern}"))
            }
            SqlDialect::Mysql | SqlDialect::Sqlite => Ok(format!("{expr} {not}REGEXP {pattern}")),
            SqlDialect::Bigquery => Ok(format!("{not}REGEXP_CONTAINS({expr}, {pattern})")),
            SqlDialect::Trino => Ok(format!("{not}regexp_like({expr}, {pattern})")),
            SqlDialect::Mssql | SqlDialect::Snowflake => Err(ValidationError::backend(format!(
                "regex conditions are not supported for dialect '{}'",
                self.name()
            ))),
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SqlDialect {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(SqlDialect::Postgresql),
            "redshift" => Ok(SqlDialect::Redshift),
            "mysql" => Ok(SqlDialect::Mysql),
            "sqlite" => Ok(SqlDialect::Sqlite),
            "mssql" => Ok(SqlDialect::Mssql),
            "bigquery" => Ok(SqlDialect::Bigquery),
            "trino" => Ok(SqlDialect::Trino),
            "snowflake" => Ok(SqlDialect::Snowflake),
            other => Err(ConfigurationError::UnsupportedDialect(other.to_string())),
        }
    }
}

const RESERVED_WORDS: &[&str] = &[
    "all", "and", "as", "asc", "by", "case", "check", "column", "create", "default", "desc",
    "distinct", "else", "end", "from", "group", "having", "in", "index", "is", "join", "key",
    "limit", "not", "null", "on", "or", "order", "select", "table", "then", "to", "union", "user",
    "when", "where", "with",
];

/// Lower-case identifiers made of `[a-z0-9_$]` that are not reserved words are
/// left bare; everything else is quoted.
fn requires_quotes(ident: &str) -> bool {
    let mut chars = ident.chars();
    let legal = match chars.next() {
        Some(first) if first.is_ascii_lowercase() || first == '_' => chars
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$'),
        _ => false,
    };
    !legal || RESERVED_WORDS.contains(&ident)
}

/// Set of dialects enabled for this process.
///
/// Dialect support is registered explicitly rather than discovered at run time; the
/// relational backend refuses dialects that were not registered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialectRegistry {
    dialects: BTreeSet<SqlDialect>,
}

impl DialectRegistry {
    /// Creates a registry with no dialects.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a registry with every built-in dialect.
    pub fn with_builtin() -> Self {
        Self {
            dialects: SqlDialect::ALL.into_iter().collect(),
        }
    }

    /// Process-wide registry, initialised with the built-in dialects on first use.
    pub fn global() -> &'static DialectRegistry {
        static GLOBAL: OnceLock<DialectRegistry> = OnceLock::new();
        GLOBAL.get_or_init(DialectRegistry::with_builtin)
    }

    /// Enables a dialect.
    pub fn register(&mut self, dialect: SqlDialect) {
        self.dialects.insert(dialect);
    }

    /// Returns true if `dialect` is enabled.
    pub fn supports(&self, dialect: SqlDialect) -> bool {
        self.dialects.contains(&dialect)
    }

    /// Checks that `dialect` is enabled.
    pub fn require(&self, dialect: SqlDialect) -> Result<SqlDialect, ConfigurationError> {
        if self.supports(dialect) {
            Ok(dialect)
        } else {
            Err(ConfigurationError::UnsupportedDialect(dialect.name().to_string()))
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

/// A SQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    Column(String),
    Literal(DataValue),
    IsNull(Box<SqlExpr>),
    IsNotNull(Box<SqlExpr>),
    InList {
        expr: Box<SqlExpr>,
        list: Vec<DataValue>,
        negated: bool,
    },
    Compare {
        left: Box<SqlExpr>,
        op: CompareOp,
        right: Box<SqlExpr>,
    },
    RegexMatch {
        expr: Box<SqlExpr>,
        pattern: String,
        negated: bool,
    },
    And(Vec<SqlExpr>),
    Or(Vec<SqlExpr>),
    Not(Box<SqlExpr>),
    /// `COUNT(*)`
    CountAll,
    /// `SUM(CASE WHEN <cond> THEN 1 ELSE 0 END)`
    CountIf(Box<SqlExpr>),
}

impl SqlExpr {
    /// Column reference.
    pub fn column(name: impl Into<String>) -> Self {
        SqlExpr::Column(name.into())
    }

    /// `self IS NULL`.
    pub fn is_null(self) -> Self {
        SqlExpr::IsNull(Box::new(self))
    }

    /// `self IS NOT NULL`.
    pub fn is_not_null(self) -> Self {
        SqlExpr::IsNotNull(Box::new(self))
    }

    /// `self [NOT] IN (...)`.
    pub fn in_list(self, list: Vec<DataValue>, negated: bool) -> Self {
        SqlExpr::InList {
            expr: Box::new(self),
            list,
            negated,
        }
    }

    /// `self <op> value`.
    pub fn compare(self, op: CompareOp, value: DataValue) -> Self {
        SqlExpr::Compare {
            left: Box::new(self),
            op,
            right: Box::new(SqlExpr::Literal(value)),
        }
    }

    /// Regex match.
    pub fn regex(self, pattern: impl Into<String>) -> Self {
        SqlExpr::RegexMatch {
            expr: Box::new(self),
            pattern: pattern.into(),
            negated: false,
        }
    }

    /// Conjunction, flattening nested `AND`s.
    pub fn and(self, other: SqlExpr) -> Self {
        let mut terms = match self {
            SqlExpr::And(terms) => terms,
            single => vec![single],
        };
        match other {
            SqlExpr::And(more) => terms.extend(more),
            single => terms.push(single),
        }
        SqlExpr::And(terms)
    }

    /// Logical negation, pushed into the operator where SQL has a negated form.
    pub fn negate(self) -> Self {
        match self {
            SqlExpr::IsNull(inner) => SqlExpr::IsNotNull(inner),
            SqlExpr::IsNotNull(inner) => SqlExpr::IsNull(inner),
            SqlExpr::InList {
                expr,
                list,
                negated,
            } => SqlExpr::InList {
                expr,
                list,
                negated: !negated,
            },
            SqlExpr::RegexMatch {
                expr,
                pattern,
                negated,
            } => SqlExpr::RegexMatch {
                expr,
                pattern,
                negated: !negated,
            },
            SqlExpr::Not(inner) => *inner,
            other => SqlExpr::Not(Box::new(other)),
        }
    }

    fn is_simple(&self) -> bool {
        matches!(
            self,
            SqlExpr::Column(_)
                | SqlExpr::Literal(_)
                | SqlExpr::IsNull(_)
                | SqlExpr::IsNotNull(_)
                | SqlExpr::Compare { .. }
        )
    }

    fn render_term(&self, dialect: SqlDialect) -> MetricResult<String> {
        let rendered = self.render(dialect)?;
        if self.is_simple() {
            Ok(rendered)
        } else {
            Ok(format!("({rendered})"))
        }
    }

    /// Compiles the expression for `dialect` with every value inlined.
    pub fn render(&self, dialect: SqlDialect) -> MetricResult<String> {
        match self {
            SqlExpr::Column(name) => Ok(dialect.quote_identifier(name)),
            SqlExpr::Literal(value) => dialect.render_literal(value),
            SqlExpr::IsNull(inner) => Ok(format!("{} IS NULL", inner.render(dialect)?)),
            SqlExpr::IsNotNull(inner) => Ok(format!("{} IS NOT NULL", inner.render(dialect)?)),
            SqlExpr::InList {
                expr,
                list,
                negated,
            } => {
                if list.is_empty() {
                    // An empty IN list is not valid SQL in most dialects.
                    return Ok(if *negated { "1 = 1" } else { "1 = 0" }.to_string());
                }
                let values = list
                    .iter()
                    .map(|v| dialect.render_literal(v))
                    .collect::<MetricResult<Vec<_>>>()?;
                let op = if *negated { "NOT IN" } else { "IN" };
                Ok(format!("{} {op} ({})", expr.render(dialect)?, values.join(", ")))
            }
            SqlExpr::Compare { left, op, right } => Ok(format!(
                "{} {} {}",
                left.render(dialect)?,
                op.as_str(),
                right.render(dialect)?
            )),
            SqlExpr::RegexMatch {
                expr,
                pattern,
                negated,
            } => dialect.render_regex(&expr.render(dialect)?, pattern, *negated),
            SqlExpr::And(terms) => render_junction(terms, " AND ", dialect),
            SqlExpr::Or(terms) => render_junction(terms, " OR ", dialect),
            SqlExpr::Not(inner) => Ok(format!("NOT ({})", inner.render(dialect)?)),
            SqlExpr::CountAll => Ok("COUNT(*)".to_string()),
            SqlExpr::CountIf(condition) => Ok(format!(
                "SUM(CASE WHEN {} THEN 1 ELSE 0 END)",
                condition.render(dialect)?
            )),
        }
    }
}

fn render_junction(terms: &[SqlExpr], separator: &str, dialect: SqlDialect) -> MetricResult<String> {
    let rendered = terms
        .iter()
        .map(|t| t.render_term(dialect))
        .collect::<MetricResult<Vec<_>>>()?;
    Ok(rendered.join(separator))
}

/// What a query reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlFrom {
    /// A named table or view
    Table {
        schema: Option<String>,
        name: String,
    },
    /// An arbitrary query used as a derived table
    Query(String),
}

impl SqlFrom {
    /// Name used in logs and errors.
    pub fn display_name(&self) -> String {
        match self {
            SqlFrom::Table {
                schema: Some(schema),
                name,
            } => format!("{schema}.{name}"),
            SqlFrom::Table { schema: None, name } => name.clone(),
            SqlFrom::Query(_) => "custom_sql".to_string(),
        }
    }

    fn render(&self, dialect: SqlDialect) -> String {
        match self {
            SqlFrom::Table {
                schema: Some(schema),
                name,
            } => format!(
                "{}.{}",
                dialect.quote_identifier(schema),
                dialect.quote_identifier(name)
            ),
            SqlFrom::Table { schema: None, name } => dialect.quote_identifier(name),
            SqlFrom::Query(query) => {
                format!("({}) AS custom_sql", query.trim().trim_end_matches(';'))
            }
        }
    }
}

/// A projected item.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*`
    Wildcard,
    /// Plain column
    Column(String),
    /// Expression with an alias
    Aliased { expr: SqlExpr, alias: String },
}

/// A `SELECT` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub items: Vec<SelectItem>,
    pub from: SqlFrom,
    pub filter: Option<SqlExpr>,
    pub limit: Option<usize>,
}

impl SelectStatement {
    /// `SELECT * FROM from`.
    pub fn all(from: SqlFrom) -> Self {
        Self {
            items: vec![SelectItem::Wildcard],
            from,
            filter: None,
            limit: None,
        }
    }

    /// `SELECT columns FROM from`.
    pub fn columns<S: Into<String>>(columns: impl IntoIterator<Item = S>, from: SqlFrom) -> Self {
        Self {
            items: columns
                .into_iter()
                .map(|c| SelectItem::Column(c.into()))
                .collect(),
            from,
            filter: None,
            limit: None,
        }
    }

    /// Adds a `WHERE` clause.
    pub fn filter(mut self, filter: SqlExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Adds a row limit.
    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Compiles the statement for `dialect` with every value inlined.
    pub fn render(&self, dialect: SqlDialect) -> MetricResult<String> {
        let items = self
            .items
            .iter()
            .map(|item| match item {
                SelectItem::Wildcard => Ok("*".to_string()),
                SelectItem::Column(name) => Ok(dialect.quote_identifier(name)),
                SelectItem::Aliased { expr, alias } => Ok(format!(
                    "{} AS {}",
                    expr.render(dialect)?,
                    dialect.quote_identifier(alias)
                )),
            })
            .collect::<MetricResult<Vec<_>>>()?;

        let mut sql = String::from("SELECT ");
        if let (SqlDialect::Mssql, Some(limit)) = (dialect, self.limit) {
            sql.push_str(&format!("TOP {limit} "));
        }
        sql.push_str(&items.join(", "));
        sql.push_str(" \nFROM ");
        sql.push_str(&self.from.render(dialect));
        if let Some(filter) = &self.filter {
            sql.push_str(" \nWHERE ");
            sql.push_str(&filter.render(dialect)?);
        }
        if let Some(limit) = self.limit {
            if dialect != SqlDialect::Mssql {
                sql.push_str(&format!(" \nLIMIT {limit}"));
            }
        }
        Ok(sql)
    }

    /// Compiles a complete, terminated statement suitable for copy-paste.
    pub fn render_audit_query(&self, dialect: SqlDialect) -> MetricResult<String> {
        Ok(format!("{};", self.render(dialect)?))
    }
}
