use thiserror::Error;

use crate::value::FieldKind;

pub type Result<T> = std::result::Result<T, TableError>;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("invalid schema: {0}")]
    Schema(String),

    #[error(
        "remote schema differs from declared schema: \
         missing fields {missing:?}, extra fields {extra:?}, type mismatches {mismatched:?}"
    )]
    SchemaMismatch {
        missing: Vec<String>,
        extra: Vec<String>,
        mismatched: Vec<String>,
    },

    #[error("backend \"{backend}\" does not support field type {kind}")]
    UnsupportedType { backend: String, kind: FieldKind },

    #[error("no field \"{0}\" available to this query")]
    UnknownField(String),

    #[error("primary key takes {expected} value(s), got {actual}")]
    KeyArity { expected: usize, actual: usize },

    #[error("{count} records share the primary key value {key}; primary-key invariant is broken")]
    Integrity { key: String, count: usize },

    #[error("no record with primary key {key}")]
    NotFound { key: String },

    #[error("table \"{0}\" has been dropped")]
    TableDropped(String),

    #[error("table \"{0}\" declares no geometry fields")]
    NoGeometryFields(String),

    #[error("invalid geometry: {0}")]
    Geometry(String),

    #[error("cannot decode field \"{field}\" as {kind}: {reason}")]
    Decode {
        field: String,
        kind: FieldKind,
        reason: String,
    },

    #[error("backend error: {0}")]
    Backend(String),

    #[cfg(any(feature = "sqlite", feature = "postgres"))]
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}
