use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::value::{FieldKind, Value};

/// Row of raw backend values, keyed by column name. Values are in whatever
/// shape the driver hands back; [`crate::value::decode`] normalizes them into
/// the declared field kinds.
#[derive(Debug, Clone, Default)]
pub struct Row {
    pub columns: HashMap<String, Value>,
}

impl Row {
    pub fn new() -> Row {
        Row {
            columns: HashMap::new(),
        }
    }

    pub fn insert(&mut self, column: String, value: Value) {
        self.columns.insert(column, value);
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.columns.get(column).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.columns.get(column).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, column: &str) -> Option<bool> {
        self.columns.get(column).and_then(Value::as_bool)
    }

    pub fn get_string(&self, column: &str) -> Option<String> {
        self.columns
            .get(column)
            .and_then(|value| value.as_str().map(String::from))
    }
}

/// SQL dialect of a backend: type names, placeholder style, and the spatial
/// function vocabulary. Everything here is a pure string derivation; the
/// engine never branches on backend identity directly.
pub trait Dialect: Send + Sync {
    /// Backend tag, e.g. `"postgres+postgis"` or `"sqlite"`.
    fn tag(&self) -> &'static str;

    /// Native column type for a field kind, or `UnsupportedType` when the
    /// backend cannot store it. Checked once at table construction.
    fn column_type(&self, kind: &FieldKind) -> Result<String>;

    /// Reverse mapping from a remote column type name, used when diffing
    /// against a reported schema. `None` when the name is unrecognized.
    fn kind_of_column_type(&self, column_type: &str) -> Option<FieldKind>;

    /// Numbered parameter placeholder; `index` is 1-based. Numbered forms
    /// (`$1`, `?1`) let one binding serve several occurrences in a statement.
    fn placeholder(&self, index: usize) -> String;

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Case-insensitive pattern-match predicate for a `%` wildcard value.
    fn pattern_predicate(&self, field: &str, placeholder: &str) -> String;

    fn geom_from_text(&self, wkt: &str, srid: &str) -> String;

    fn geom_transform(&self, expression: &str, srid: &str) -> String;

    fn geom_intersects(&self, field: &str, expression: &str) -> String;

    fn geom_as_text(&self, field: &str) -> String;
}

/// Statement execution against one backing database. Implemented by the SQL
/// driver integrations; the table engine owns no connection of its own and
/// issues every statement through this interface.
#[async_trait]
pub trait Backend: Dialect {
    /// Execute a statement, returning the number of affected rows.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Execute a query and return its rows.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Execute several statements atomically, in one transaction.
    async fn execute_batch(&self, statements: &[(String, Vec<Value>)]) -> Result<u64>;

    /// Whether a table of the given name exists.
    async fn table_exists(&self, name: &str) -> Result<bool>;

    /// Column names and native type names of a remote table, in column
    /// order, or `None` when the table does not exist.
    async fn remote_columns(&self, name: &str) -> Result<Option<Vec<(String, String)>>>;
}
