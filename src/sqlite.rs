use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, SqlitePool, TypeInfo};
use tracing::debug;

use crate::backend::{Backend, Dialect, Row};
use crate::error::{Result, TableError};
use crate::value::{
    FieldKind, GeometryKind, Value, DATETIME_FORMAT, DATE_FORMAT, TIME_FORMAT,
};

/// SQLite backend over a [`SqlitePool`].
///
/// Temporal values are stored as formatted text in SQLite's canonical
/// formats; [`crate::value::decode`] turns them back into typed values on
/// read. `Time` and `Duration` columns have no SQLite representation and are
/// rejected, as are geometry columns unless the SpatiaLite extension is
/// loaded.
pub struct SqliteBackend {
    pool: SqlitePool,
    spatialite: bool,
}

impl SqliteBackend {
    /// Connect to a database URL such as `sqlite::memory:` or
    /// `sqlite://path/to.db`, creating the file if missing.
    pub async fn new(url: &str) -> Result<SqliteBackend> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        Self::connect(options, false).await
    }

    /// An in-memory database, private to this backend.
    pub async fn memory() -> Result<SqliteBackend> {
        Self::new("sqlite::memory:").await
    }

    /// A database file on disk, created if missing.
    pub async fn file(path: impl AsRef<Path>) -> Result<SqliteBackend> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        Self::connect(options, false).await
    }

    /// Connect with the SpatiaLite extension loaded, enabling geometry
    /// columns. Requires `mod_spatialite` on the library search path.
    pub async fn with_spatialite(url: &str) -> Result<SqliteBackend> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .extension("mod_spatialite");
        Self::connect(options, true).await
    }

    async fn connect(options: SqliteConnectOptions, spatialite: bool) -> Result<SqliteBackend> {
        // a single connection keeps WAL writers serialized
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        if spatialite {
            sqlx::query("SELECT InitSpatialMetaData(1)")
                .execute(&pool)
                .await?;
        }
        debug!(spatialite, "connected to sqlite");
        Ok(SqliteBackend { pool, spatialite })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn bind_value<'q>(
        &self,
        query: sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>,
        value: &Value,
    ) -> Result<sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>> {
        Ok(match value {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(v) => query.bind(*v),
            Value::Int(v) => query.bind(*v),
            Value::Float(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.clone()),
            Value::Bytes(v) => query.bind(v.clone()),
            Value::Date(v) => query.bind(v.format(DATE_FORMAT).to_string()),
            Value::Time(v) => query.bind(v.format(TIME_FORMAT).to_string()),
            Value::DateTime(v) => query.bind(v.format(DATETIME_FORMAT).to_string()),
            Value::Duration(_) => {
                return Err(TableError::UnsupportedType {
                    backend: self.tag().to_string(),
                    kind: FieldKind::Duration,
                })
            }
            Value::Geometry(v) => query.bind(v.wkt()),
        })
    }

    fn convert_row(row: &SqliteRow) -> Result<Row> {
        let mut converted = Row::new();
        for (index, column) in row.columns().iter().enumerate() {
            let value = match column.type_info().name() {
                "NULL" => Value::Null,
                "BOOLEAN" => row
                    .try_get::<Option<bool>, _>(index)?
                    .map(Value::Bool)
                    .unwrap_or(Value::Null),
                "INTEGER" | "BIGINT" | "INT4" | "INT8" => row
                    .try_get::<Option<i64>, _>(index)?
                    .map(Value::Int)
                    .unwrap_or(Value::Null),
                "REAL" => row
                    .try_get::<Option<f64>, _>(index)?
                    .map(Value::Float)
                    .unwrap_or(Value::Null),
                "BLOB" => row
                    .try_get::<Option<Vec<u8>>, _>(index)?
                    .map(Value::Bytes)
                    .unwrap_or(Value::Null),
                // TEXT, DATE, DATETIME and anything else declared come back
                // as text; the engine re-types them per the declared kind
                _ => row
                    .try_get::<Option<String>, _>(index)?
                    .map(Value::Text)
                    .unwrap_or(Value::Null),
            };
            converted.insert(column.name().to_string(), value);
        }
        Ok(converted)
    }
}

impl Dialect for SqliteBackend {
    fn tag(&self) -> &'static str {
        if self.spatialite {
            "sqlite+spatialite"
        } else {
            "sqlite"
        }
    }

    fn column_type(&self, kind: &FieldKind) -> Result<String> {
        let unsupported = || TableError::UnsupportedType {
            backend: self.tag().to_string(),
            kind: kind.clone(),
        };
        Ok(match kind {
            FieldKind::Bool => "BOOLEAN".to_string(),
            FieldKind::Int => "INTEGER".to_string(),
            FieldKind::Float => "REAL".to_string(),
            FieldKind::Text => "TEXT".to_string(),
            FieldKind::Bytes => "BLOB".to_string(),
            FieldKind::Date => "DATE".to_string(),
            FieldKind::DateTime => "DATETIME".to_string(),
            FieldKind::Time | FieldKind::Duration => return Err(unsupported()),
            FieldKind::Geometry { kind, .. } => {
                if self.spatialite {
                    kind.name().to_uppercase()
                } else {
                    return Err(unsupported());
                }
            }
        })
    }

    fn kind_of_column_type(&self, column_type: &str) -> Option<FieldKind> {
        match column_type.to_uppercase().as_str() {
            "BOOLEAN" => Some(FieldKind::Bool),
            "INTEGER" => Some(FieldKind::Int),
            "REAL" => Some(FieldKind::Float),
            "TEXT" => Some(FieldKind::Text),
            "BLOB" => Some(FieldKind::Bytes),
            "DATE" => Some(FieldKind::Date),
            "DATETIME" => Some(FieldKind::DateTime),
            other => GeometryKind::from_type_name(other).map(|kind| FieldKind::geometry(kind, 0)),
        }
    }

    fn placeholder(&self, index: usize) -> String {
        format!("?{}", index)
    }

    fn pattern_predicate(&self, field: &str, placeholder: &str) -> String {
        format!("UPPER({}) LIKE UPPER({})", field, placeholder)
    }

    fn geom_from_text(&self, wkt: &str, srid: &str) -> String {
        format!("GeomFromText({}, {})", wkt, srid)
    }

    fn geom_transform(&self, expression: &str, srid: &str) -> String {
        format!("Transform({}, {})", expression, srid)
    }

    fn geom_intersects(&self, field: &str, expression: &str) -> String {
        format!("Intersects({}, {})", field, expression)
    }

    fn geom_as_text(&self, field: &str) -> String {
        format!("AsText({})", field)
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let mut query = sqlx::query(sql);
        for value in params {
            query = self.bind_value(query, value)?;
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let mut query = sqlx::query(sql);
        for value in params {
            query = self.bind_value(query, value)?;
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(Self::convert_row).collect()
    }

    async fn execute_batch(&self, statements: &[(String, Vec<Value>)]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for (sql, params) in statements {
            let mut query = sqlx::query(sql);
            for value in params {
                query = self.bind_value(query, value)?;
            }
            affected += query.execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(affected)
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn remote_columns(&self, name: &str) -> Result<Option<Vec<(String, String)>>> {
        let columns: Vec<(String, String)> =
            sqlx::query_as("SELECT name, type FROM pragma_table_info(?1)")
                .bind(name)
                .fetch_all(&self.pool)
                .await?;
        if columns.is_empty() {
            Ok(None)
        } else {
            Ok(Some(columns))
        }
    }
}
