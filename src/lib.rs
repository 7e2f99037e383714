//! Primary-key CRUD over a single relational table, backend-agnostic.
//!
//! A [`Table`] pairs a declared [`Schema`] with a [`Backend`] and exposes
//! get/set/insert/delete plus filtered queries, including spatial
//! intersection queries over geometry fields. The engine renders SQL through
//! the backend's [`Dialect`] and binds values positionally, so the same
//! calling code runs against SQLite or PostgreSQL/PostGIS.
//!
//! The backing table is created lazily on first use with a conditional
//! `CREATE TABLE`, then verified against the declared schema; two instances
//! racing to create the same table both end up bound to it.
//!
//! ```rust,no_run
//! use monotable::{FieldKind, Filter, Schema, SqliteBackend, Table, Value};
//!
//! # async fn demo() -> monotable::Result<()> {
//! let schema = Schema::new(
//!     [
//!         ("id", FieldKind::Int),
//!         ("length", FieldKind::Float),
//!         ("name", FieldKind::Text),
//!     ],
//!     ["id"],
//! );
//! let backend = SqliteBackend::file("roads.db").await?;
//! let mut roads = Table::new(backend, "roads", schema)?;
//!
//! roads.set(1i64, [("name".to_string(), Value::from("long boi"))].into())
//!     .await?;
//! let long = roads.records_where(Filter::field("name", "%long%")).await?;
//! # let _ = long;
//! # Ok(())
//! # }
//! ```

mod backend;
mod error;
mod filter;
mod geometry;
mod schema;
mod table;
mod value;

#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use backend::{Backend, Dialect, Row};
pub use error::{Result, TableError};
pub use filter::Filter;
pub use geometry::GeometryQuery;
pub use schema::{FieldSpec, Schema};
pub use table::{Key, Record, Table};
pub use value::{decode, FieldKind, Geometry, GeometryKind, Value};

#[cfg(feature = "postgres")]
pub use postgres::PgBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

/// Convenience re-exports for callers that want everything at once.
pub mod prelude {
    pub use crate::{
        Backend, Dialect, FieldKind, FieldSpec, Filter, Geometry, GeometryKind, GeometryQuery,
        Key, Record, Result, Row, Schema, Table, TableError, Value,
    };

    #[cfg(feature = "postgres")]
    pub use crate::PgBackend;
    #[cfg(feature = "sqlite")]
    pub use crate::SqliteBackend;
}
