//! Structured query contract of the second counter source.
//!
//! Unlike counter objects, query results are not part of the shared scrape
//! snapshot. Each collector runs its own queries through a [`QueryAdapter`]
//! and a failing query only fails the collector that issued it.

use std::collections::BTreeMap;
use std::time::Instant;

/// A `SELECT` over one class of the query source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    namespace: Option<String>,
    class: String,
    columns: Vec<String>,
}

impl Query {
    /// Select the given columns of a class in the default namespace.
    pub fn select(class: &str, columns: &[&str]) -> Self {
        Self {
            namespace: None,
            class: class.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Run the query in the given namespace instead of the default one.
    pub fn in_namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    /// Returns the namespace, `None` for the default one.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Returns the queried class.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Returns the selected columns, which is the shape of every result row.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the query text.
    ///
    /// ```
    /// # use counter_exporter::query::Query;
    /// let query = Query::select("Win32_OperatingSystem", &["FreePhysicalMemory", "Caption"]);
    /// assert_eq!(
    ///     "SELECT FreePhysicalMemory, Caption FROM Win32_OperatingSystem",
    ///     query.text(),
    /// );
    /// ```
    pub fn text(&self) -> String {
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        };
        format!("SELECT {} FROM {}", columns, self.class)
    }
}

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum Value {
    Bool(bool),
    Unsigned(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Null,
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Unsigned(_) => "unsigned",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Null => "null",
        }
    }
}

/// One result row, column name to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder style [`Row::insert`].
    pub fn with<N: Into<String>>(mut self, column: N, value: Value) -> Self {
        self.insert(column, value);
        self
    }

    /// Set a column value.
    pub fn insert<N: Into<String>>(&mut self, column: N, value: Value) {
        self.columns.insert(column.into(), value);
    }

    fn require(&self, column: &str) -> Result<&Value, QueryError> {
        self.columns
            .get(column)
            .ok_or_else(|| QueryError::MissingColumn(column.to_string()))
    }

    fn mismatch(column: &str, expected: &'static str, found: &Value) -> QueryError {
        QueryError::Type {
            column: column.to_string(),
            expected,
            found: found.kind(),
        }
    }

    /// Returns a numeric column as float.
    pub fn f64(&self, column: &str) -> Result<f64, QueryError> {
        match self.require(column)? {
            Value::Float(v) => Ok(*v),
            Value::Unsigned(v) => Ok(*v as f64),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            v => Err(Self::mismatch(column, "float", v)),
        }
    }

    /// Returns a numeric column as float, `None` if the row lacks the column
    /// or holds null. Values of another type are still an error.
    pub fn optional_f64(&self, column: &str) -> Result<Option<f64>, QueryError> {
        match self.columns.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.f64(column).map(Some),
        }
    }

    /// Returns a column as boolean.
    pub fn bool(&self, column: &str) -> Result<bool, QueryError> {
        match self.require(column)? {
            Value::Bool(b) => Ok(*b),
            v => Err(Self::mismatch(column, "bool", v)),
        }
    }

    /// Returns a column as text.
    pub fn text(&self, column: &str) -> Result<&str, QueryError> {
        match self.require(column)? {
            Value::Text(s) => Ok(s),
            v => Err(Self::mismatch(column, "text", v)),
        }
    }

    /// Returns a column as byte array.
    pub fn bytes(&self, column: &str) -> Result<&[u8], QueryError> {
        match self.require(column)? {
            Value::Bytes(b) => Ok(b),
            v => Err(Self::mismatch(column, "bytes", v)),
        }
    }
}

/// Failure to run a query or to read its result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    /// The source rejected or failed the query.
    #[error("query {query:?} failed: {reason}")]
    Failed {
        /// Query text.
        query: String,
        /// Source specific reason.
        reason: String,
    },
    /// A result row lacks a selected column.
    #[error("missing column {0:?}")]
    MissingColumn(String),
    /// A column holds a value of an unexpected type.
    #[error("column {column:?}: expected {expected}, found {found}")]
    Type {
        /// Column name.
        column: String,
        /// Expected value kind.
        expected: &'static str,
        /// Actual value kind.
        found: &'static str,
    },
    /// The source as a whole could not be reached.
    #[error("query source unavailable: {0}")]
    Unavailable(String),
    /// The query did not finish before the scrape deadline.
    #[error("query {0:?} timed out")]
    TimedOut(String),
}

/// Executes structured queries against the query source.
///
/// Implementations must be callable from several collectors at once. A query
/// still running at `deadline` should be abandoned with
/// [`QueryError::TimedOut`].
pub trait QueryAdapter: std::fmt::Debug + Send + Sync + 'static {
    /// Run the query and return all result rows.
    fn run_query(
        &self,
        query: &Query,
        deadline: Option<Instant>,
    ) -> Result<Vec<Row>, QueryError>;
}
