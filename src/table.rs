use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::backend::{Backend, Row};
use crate::error::{Result, TableError};
use crate::filter::{Filter, Params};
use crate::geometry::GeometryQuery;
use crate::schema::Schema;
use crate::value::{self, Value};

/// A record: field name to value. Only declared field names may appear;
/// fields absent from a partial record are null/backend-default on insert.
pub type Record = HashMap<String, Value>;

/// A primary-key value: one value per key field, in key order.
#[derive(Debug, Clone, PartialEq)]
pub struct Key(Vec<Value>);

impl Key {
    pub fn new(values: Vec<Value>) -> Key {
        Key(values)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() == 1 {
            write!(f, "{}", self.0[0])
        } else {
            let parts: Vec<String> = self.0.iter().map(|value| value.to_string()).collect();
            write!(f, "({})", parts.join(", "))
        }
    }
}

impl From<Value> for Key {
    fn from(value: Value) -> Key {
        Key(vec![value])
    }
}

impl From<Vec<Value>> for Key {
    fn from(values: Vec<Value>) -> Key {
        Key(values)
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Key {
        Key(vec![Value::Int(value)])
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Key {
        Key(vec![Value::Text(value.to_string())])
    }
}

impl From<String> for Key {
    fn from(value: String) -> Key {
        Key(vec![Value::Text(value)])
    }
}

impl<A: Into<Value>, B: Into<Value>> From<(A, B)> for Key {
    fn from((a, b): (A, B)) -> Key {
        Key(vec![a.into(), b.into()])
    }
}

impl<A: Into<Value>, B: Into<Value>, C: Into<Value>> From<(A, B, C)> for Key {
    fn from((a, b, c): (A, B, C)) -> Key {
        Key(vec![a.into(), b.into(), c.into()])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindState {
    Unbound,
    Bound,
    Dropped,
}

/// Primary-key CRUD over one backing table.
///
/// The engine holds the declared [`Schema`] and a [`Backend`] but no other
/// state beyond the bind flag: binding happens lazily on first use by
/// issuing a conditional `CREATE TABLE IF NOT EXISTS` and then verifying the
/// remote schema, which tolerates two instances racing to create the same
/// table. Once [`drop_table`](Table::drop_table) has run, every further
/// operation fails with [`TableError::TableDropped`].
#[derive(Debug)]
pub struct Table<B: Backend> {
    backend: B,
    name: String,
    schema: Schema,
    state: BindState,
}

impl<B: Backend> Table<B> {
    /// Create an engine over the named table.
    ///
    /// Validates the schema and checks that the backend supports every
    /// declared field kind; no statement is issued until first use.
    pub fn new(backend: B, name: impl Into<String>, schema: Schema) -> Result<Table<B>> {
        schema.validate()?;
        for field in schema.fields() {
            backend.column_type(&field.kind)?;
        }
        Ok(Table {
            backend,
            name: name.into(),
            schema,
            state: BindState::Unbound,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The record at the given primary-key value.
    ///
    /// More than one matching row means the primary-key invariant is broken
    /// and is reported as a fatal [`TableError::Integrity`].
    pub async fn get(&mut self, key: impl Into<Key>) -> Result<Record> {
        let key = key.into();
        let filter = self.key_filter(&key)?;
        self.ensure_bound().await?;
        let mut records = self.select(&filter).await?;
        if records.len() > 1 {
            return Err(TableError::Integrity {
                key: key.to_string(),
                count: records.len(),
            });
        }
        records.pop().ok_or_else(|| TableError::NotFound {
            key: key.to_string(),
        })
    }

    /// Whether a record exists at the given primary-key value.
    pub async fn contains(&mut self, key: impl Into<Key>) -> Result<bool> {
        match self.get(key).await {
            Ok(_) => Ok(true),
            Err(TableError::NotFound { .. }) => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// Upsert the record at the given primary-key value.
    ///
    /// One conditional-upsert statement, not a read-then-write pair, so two
    /// concurrent `set` calls on the same key cannot interleave into lost
    /// updates or duplicate-key errors. On update only the supplied fields
    /// change; on insert, omitted fields are null/backend-default.
    pub async fn set(&mut self, key: impl Into<Key>, record: Record) -> Result<()> {
        let key = key.into();
        self.check_arity(&key)?;
        self.validate_record(&record)?;

        let mut record = record;
        let primary_key: Vec<String> = self.schema.primary_key().to_vec();
        for (field, value) in primary_key.iter().zip(key.values()) {
            record.insert(field.clone(), value.clone());
        }

        self.ensure_bound().await?;
        let fields = self.present_fields(&record);
        let (sql, values) = self.upsert_statement(&fields, &[&record])?;
        self.backend.execute(&sql, &values).await?;
        Ok(())
    }

    /// Bulk upsert, keyed by each record's primary-key fields.
    ///
    /// Records later in the sequence replace earlier ones sharing the same
    /// key, whole-record (not merged field-by-field). Statements are batched
    /// into one transaction.
    pub async fn insert(&mut self, records: impl IntoIterator<Item = Record>) -> Result<()> {
        let incoming: Vec<Record> = records.into_iter().collect();
        if incoming.is_empty() {
            return Ok(());
        }

        let primary_key: Vec<String> = self.schema.primary_key().to_vec();
        for record in &incoming {
            self.validate_record(record)?;
            let present = primary_key
                .iter()
                .filter(|field| record.get(*field).map_or(false, |v| !v.is_null()))
                .count();
            if present != primary_key.len() {
                return Err(TableError::KeyArity {
                    expected: primary_key.len(),
                    actual: present,
                });
            }
        }

        // last write wins within one call, by whole-record replacement
        let mut deduped: Vec<Record> = Vec::with_capacity(incoming.len());
        let mut positions: HashMap<String, usize> = HashMap::new();
        for record in incoming {
            let key_repr = format!(
                "{:?}",
                primary_key
                    .iter()
                    .map(|field| &record[field])
                    .collect::<Vec<_>>()
            );
            match positions.get(&key_repr) {
                Some(&position) => deduped[position] = record,
                None => {
                    positions.insert(key_repr, deduped.len());
                    deduped.push(record);
                }
            }
        }

        self.ensure_bound().await?;

        // one multi-row statement per distinct field set
        let mut groups: Vec<(Vec<String>, Vec<usize>)> = Vec::new();
        for (position, record) in deduped.iter().enumerate() {
            let fields = self.present_fields(record);
            match groups.iter_mut().find(|(group, _)| *group == fields) {
                Some((_, members)) => members.push(position),
                None => groups.push((fields, vec![position])),
            }
        }

        let mut statements = Vec::with_capacity(groups.len());
        for (fields, members) in &groups {
            let records: Vec<&Record> = members.iter().map(|&position| &deduped[position]).collect();
            statements.push(self.upsert_statement(fields, &records)?);
        }

        if statements.len() == 1 {
            let (sql, values) = &statements[0];
            self.backend.execute(sql, values).await?;
        } else {
            self.backend.execute_batch(&statements).await?;
        }
        Ok(())
    }

    /// Delete the record at the given primary-key value. Deleting an absent
    /// key is not an error.
    pub async fn delete(&mut self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        let filter = self.key_filter(&key)?;
        self.ensure_bound().await?;
        self.delete_rows(&filter).await?;
        Ok(())
    }

    /// Delete every record matching the filter, returning the count. A
    /// match-all filter empties the table.
    pub async fn delete_where(&mut self, filter: impl Into<Filter>) -> Result<u64> {
        let filter = filter.into();
        let _ = filter.build(&self.schema, &mut Params::new(&self.backend))?;
        self.ensure_bound().await?;
        self.delete_rows(&filter).await
    }

    /// Records matching the filter, in unspecified order.
    pub async fn records_where(&mut self, filter: impl Into<Filter>) -> Result<Vec<Record>> {
        let filter = filter.into();
        let _ = filter.build(&self.schema, &mut Params::new(&self.backend))?;
        self.ensure_bound().await?;
        self.select(&filter).await
    }

    /// Every record in the table.
    pub async fn records(&mut self) -> Result<Vec<Record>> {
        self.records_where(Filter::All).await
    }

    /// Records whose targeted geometry fields intersect the query geometry.
    pub async fn records_intersecting(&mut self, query: &GeometryQuery) -> Result<Vec<Record>> {
        // validate targets (and build the predicate) before binding
        let (predicate, values) = {
            let mut params = Params::new(&self.backend);
            let predicate = query.build(&self.name, &self.schema, &mut params)?;
            (predicate, params.into_values())
        };
        self.ensure_bound().await?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            self.select_columns(),
            self.backend.quote_ident(&self.name),
            predicate
        );
        let rows = self.backend.query(&sql, &values).await?;
        rows.into_iter().map(|row| self.decode_row(row)).collect()
    }

    /// Number of records in the table.
    pub async fn len(&mut self) -> Result<u64> {
        self.ensure_bound().await?;
        let sql = format!(
            "SELECT COUNT(*) AS {} FROM {}",
            self.backend.quote_ident("count"),
            self.backend.quote_ident(&self.name)
        );
        let rows = self.backend.query(&sql, &[]).await?;
        rows.first()
            .and_then(|row| row.get_i64("count"))
            .map(|count| count as u64)
            .ok_or_else(|| TableError::Backend("COUNT(*) returned no rows".to_string()))
    }

    /// Drop the backing table. The engine is unusable afterwards.
    pub async fn drop_table(&mut self) -> Result<()> {
        if self.state == BindState::Dropped {
            return Err(TableError::TableDropped(self.name.clone()));
        }
        let sql = format!(
            "DROP TABLE IF EXISTS {}",
            self.backend.quote_ident(&self.name)
        );
        self.backend.execute(&sql, &[]).await?;
        self.state = BindState::Dropped;
        debug!(table = %self.name, "dropped table");
        Ok(())
    }

    /// Bind lazily on first use: conditional create, then verify the remote
    /// schema. Safe to race against another instance creating the same
    /// table; either way the loser verifies against the winner's columns.
    async fn ensure_bound(&mut self) -> Result<()> {
        match self.state {
            BindState::Dropped => Err(TableError::TableDropped(self.name.clone())),
            BindState::Bound => Ok(()),
            BindState::Unbound => {
                if !self.backend.table_exists(&self.name).await? {
                    debug!(
                        table = %self.name,
                        backend = self.backend.tag(),
                        "creating table"
                    );
                }
                let ddl = self.schema.ddl_create(&self.backend, &self.name)?;
                self.backend.execute(&ddl, &[]).await?;

                let remote = self
                    .backend
                    .remote_columns(&self.name)
                    .await?
                    .ok_or_else(|| {
                        TableError::Backend(format!(
                            "table \"{}\" absent after conditional create",
                            self.name
                        ))
                    })?;
                self.schema.diff(&remote, &self.backend)?;
                self.state = BindState::Bound;
                Ok(())
            }
        }
    }

    fn check_arity(&self, key: &Key) -> Result<()> {
        let expected = self.schema.primary_key().len();
        if key.values().len() != expected {
            return Err(TableError::KeyArity {
                expected,
                actual: key.values().len(),
            });
        }
        Ok(())
    }

    fn key_filter(&self, key: &Key) -> Result<Filter> {
        self.check_arity(key)?;
        Ok(Filter::Fields(
            self.schema
                .primary_key()
                .iter()
                .cloned()
                .zip(key.values().iter().cloned())
                .collect(),
        ))
    }

    fn validate_record(&self, record: &Record) -> Result<()> {
        for field in record.keys() {
            if !self.schema.contains(field) {
                return Err(TableError::UnknownField(field.clone()));
            }
        }
        Ok(())
    }

    /// Declared fields present in the record, in schema order.
    fn present_fields(&self, record: &Record) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .filter(|field| record.contains_key(&field.name))
            .map(|field| field.name.clone())
            .collect()
    }

    /// Multi-row conditional upsert over the given fields. Non-key fields
    /// update from `excluded` on conflict; a key-only record inserts or
    /// leaves the existing row untouched.
    fn upsert_statement(
        &self,
        fields: &[String],
        records: &[&Record],
    ) -> Result<(String, Vec<Value>)> {
        let mut params = Params::new(&self.backend);

        let columns: Vec<String> = fields
            .iter()
            .map(|field| self.backend.quote_ident(field))
            .collect();

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let expressions: Vec<String> = fields
                .iter()
                .map(|field| params.value_expr(record.get(field).unwrap_or(&Value::Null)))
                .collect();
            rows.push(format!("({})", expressions.join(", ")));
        }

        let conflict: Vec<String> = self
            .schema
            .primary_key()
            .iter()
            .map(|field| self.backend.quote_ident(field))
            .collect();

        let updates: Vec<String> = fields
            .iter()
            .filter(|field| !self.schema.is_key_field(field))
            .map(|field| {
                let quoted = self.backend.quote_ident(field);
                format!("{} = excluded.{}", quoted, quoted)
            })
            .collect();
        let action = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };

        let sql = format!(
            "INSERT INTO {} ({}) VALUES {} ON CONFLICT ({}) {}",
            self.backend.quote_ident(&self.name),
            columns.join(", "),
            rows.join(", "),
            conflict.join(", "),
            action
        );
        Ok((sql, params.into_values()))
    }

    async fn select(&self, filter: &Filter) -> Result<Vec<Record>> {
        let mut params = Params::new(&self.backend);
        let predicate = filter.build(&self.schema, &mut params)?;
        let sql = match predicate {
            Some(predicate) => format!(
                "SELECT {} FROM {} WHERE {}",
                self.select_columns(),
                self.backend.quote_ident(&self.name),
                predicate
            ),
            None => format!(
                "SELECT {} FROM {}",
                self.select_columns(),
                self.backend.quote_ident(&self.name)
            ),
        };
        let rows = self.backend.query(&sql, &params.into_values()).await?;
        rows.into_iter().map(|row| self.decode_row(row)).collect()
    }

    async fn delete_rows(&self, filter: &Filter) -> Result<u64> {
        let mut params = Params::new(&self.backend);
        let predicate = filter.build(&self.schema, &mut params)?;
        let sql = match predicate {
            Some(predicate) => format!(
                "DELETE FROM {} WHERE {}",
                self.backend.quote_ident(&self.name),
                predicate
            ),
            None => format!("DELETE FROM {}", self.backend.quote_ident(&self.name)),
        };
        self.backend.execute(&sql, &params.into_values()).await
    }

    /// SELECT list in schema order; geometry columns come back as WKT.
    fn select_columns(&self) -> String {
        self.schema
            .fields()
            .iter()
            .map(|field| {
                let quoted = self.backend.quote_ident(&field.name);
                if field.kind.is_geometry() {
                    format!("{} AS {}", self.backend.geom_as_text(&quoted), quoted)
                } else {
                    quoted
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn decode_row(&self, row: Row) -> Result<Record> {
        let mut record = Record::with_capacity(self.schema.fields().len());
        for field in self.schema.fields() {
            let raw = row.get(&field.name).cloned().unwrap_or(Value::Null);
            record.insert(
                field.name.clone(),
                value::decode(&field.name, &field.kind, raw)?,
            );
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::TestDialect;
    use crate::backend::Dialect;
    use crate::value::FieldKind;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct MockBackend {
        executed: Mutex<Vec<(String, Vec<Value>)>>,
        batches: Mutex<Vec<usize>>,
        results: Mutex<VecDeque<Vec<Row>>>,
        remote: Vec<(String, String)>,
    }

    impl MockBackend {
        fn for_schema(schema: &Schema) -> MockBackend {
            let remote = schema
                .fields()
                .iter()
                .map(|field| {
                    (
                        field.name.clone(),
                        TestDialect.column_type(&field.kind).unwrap(),
                    )
                })
                .collect();
            MockBackend {
                executed: Mutex::new(Vec::new()),
                batches: Mutex::new(Vec::new()),
                results: Mutex::new(VecDeque::new()),
                remote,
            }
        }

        fn queue_rows(&self, rows: Vec<Row>) {
            self.results.lock().unwrap().push_back(rows);
        }

        fn executed(&self) -> Vec<(String, Vec<Value>)> {
            self.executed.lock().unwrap().clone()
        }
    }

    impl Dialect for MockBackend {
        fn tag(&self) -> &'static str {
            TestDialect.tag()
        }

        fn column_type(&self, kind: &FieldKind) -> Result<String> {
            TestDialect.column_type(kind)
        }

        fn kind_of_column_type(&self, column_type: &str) -> Option<FieldKind> {
            TestDialect.kind_of_column_type(column_type)
        }

        fn placeholder(&self, index: usize) -> String {
            TestDialect.placeholder(index)
        }

        fn pattern_predicate(&self, field: &str, placeholder: &str) -> String {
            TestDialect.pattern_predicate(field, placeholder)
        }

        fn geom_from_text(&self, wkt: &str, srid: &str) -> String {
            TestDialect.geom_from_text(wkt, srid)
        }

        fn geom_transform(&self, expression: &str, srid: &str) -> String {
            TestDialect.geom_transform(expression, srid)
        }

        fn geom_intersects(&self, field: &str, expression: &str) -> String {
            TestDialect.geom_intersects(field, expression)
        }

        fn geom_as_text(&self, field: &str) -> String {
            TestDialect.geom_as_text(field)
        }
    }

    #[async_trait]
    impl Backend for MockBackend {
        async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
            self.executed
                .lock()
                .unwrap()
                .push((sql.to_string(), params.to_vec()));
            Ok(1)
        }

        async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
            self.executed
                .lock()
                .unwrap()
                .push((sql.to_string(), params.to_vec()));
            Ok(self
                .results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default())
        }

        async fn execute_batch(&self, statements: &[(String, Vec<Value>)]) -> Result<u64> {
            self.batches.lock().unwrap().push(statements.len());
            for (sql, params) in statements {
                self.executed
                    .lock()
                    .unwrap()
                    .push((sql.clone(), params.clone()));
            }
            Ok(statements.len() as u64)
        }

        async fn table_exists(&self, _name: &str) -> Result<bool> {
            Ok(false)
        }

        async fn remote_columns(&self, _name: &str) -> Result<Option<Vec<(String, String)>>> {
            Ok(Some(self.remote.clone()))
        }
    }

    fn schema() -> Schema {
        Schema::new(
            [
                ("id", FieldKind::Int),
                ("length", FieldKind::Float),
                ("name", FieldKind::Text),
            ],
            ["id"],
        )
    }

    fn table() -> Table<MockBackend> {
        let schema = schema();
        Table::new(MockBackend::for_schema(&schema), "roads", schema).unwrap()
    }

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    fn count_row(count: i64) -> Vec<Row> {
        let mut row = Row::new();
        row.insert("count".to_string(), Value::Int(count));
        vec![row]
    }

    #[tokio::test]
    async fn first_use_binds_once_with_conditional_create() {
        let mut table = table();
        table.backend().queue_rows(count_row(0));
        table.backend().queue_rows(count_row(0));

        table.len().await.unwrap();
        table.len().await.unwrap();

        let creates: Vec<_> = table
            .backend()
            .executed()
            .into_iter()
            .filter(|(sql, _)| sql.starts_with("CREATE TABLE IF NOT EXISTS"))
            .collect();
        assert_eq!(creates.len(), 1);
        assert_eq!(
            creates[0].0,
            "CREATE TABLE IF NOT EXISTS \"roads\" (\"id\" INTEGER, \"length\" REAL, \
             \"name\" TEXT, PRIMARY KEY(\"id\"))"
        );
    }

    #[tokio::test]
    async fn set_issues_one_conditional_upsert() {
        let mut table = table();
        table
            .set(1i64, record(&[("name", Value::Text("long boi".to_string()))]))
            .await
            .unwrap();

        let executed = table.backend().executed();
        let (sql, values) = executed.last().unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"roads\" (\"id\", \"name\") VALUES ($1, $2) \
             ON CONFLICT (\"id\") DO UPDATE SET \"name\" = excluded.\"name\""
        );
        assert_eq!(
            values,
            &vec![Value::Int(1), Value::Text("long boi".to_string())]
        );
    }

    #[tokio::test]
    async fn set_with_only_key_fields_does_nothing_on_conflict() {
        let mut table = table();
        table.set(2i64, Record::new()).await.unwrap();

        let executed = table.backend().executed();
        let (sql, _) = executed.last().unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"roads\" (\"id\") VALUES ($1) ON CONFLICT (\"id\") DO NOTHING"
        );
    }

    #[tokio::test]
    async fn insert_collapses_duplicate_keys_last_write_wins() {
        let mut table = table();
        table
            .insert(vec![
                record(&[
                    ("id", Value::Int(1)),
                    ("length", Value::Float(4.4)),
                    ("name", Value::Text("first".to_string())),
                ]),
                record(&[
                    ("id", Value::Int(1)),
                    ("length", Value::Float(5.5)),
                    ("name", Value::Text("last".to_string())),
                ]),
            ])
            .await
            .unwrap();

        let executed = table.backend().executed();
        let (sql, values) = executed.last().unwrap();
        // one row, the last record, whole-record replacement
        assert_eq!(
            sql,
            "INSERT INTO \"roads\" (\"id\", \"length\", \"name\") VALUES ($1, $2, $3) \
             ON CONFLICT (\"id\") DO UPDATE SET \"length\" = excluded.\"length\", \
             \"name\" = excluded.\"name\""
        );
        assert_eq!(
            values,
            &vec![
                Value::Int(1),
                Value::Float(5.5),
                Value::Text("last".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn insert_batches_mixed_field_sets_in_one_transaction() {
        let mut table = table();
        table
            .insert(vec![
                record(&[
                    ("id", Value::Int(1)),
                    ("length", Value::Float(4.4)),
                    ("name", Value::Text("long boi".to_string())),
                ]),
                record(&[("id", Value::Int(2))]),
            ])
            .await
            .unwrap();

        assert_eq!(table.backend().batches.lock().unwrap().as_slice(), &[2]);
    }

    #[tokio::test]
    async fn insert_requires_primary_key_fields() {
        let mut table = table();
        let error = table
            .insert(vec![record(&[("name", Value::Text("stray".to_string()))])])
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            TableError::KeyArity {
                expected: 1,
                actual: 0
            }
        ));
        assert!(table.backend().executed().is_empty());
    }

    #[tokio::test]
    async fn compound_key_arity_is_checked_before_any_statement() {
        let schema = Schema::new(
            [("a", FieldKind::Int), ("b", FieldKind::Int)],
            ["a", "b"],
        );
        let backend = MockBackend::for_schema(&schema);
        let mut table = Table::new(backend, "pairs", schema).unwrap();

        let error = table.get(1i64).await.unwrap_err();
        assert!(matches!(
            error,
            TableError::KeyArity {
                expected: 2,
                actual: 1
            }
        ));
        assert!(table.backend().executed().is_empty());

        table.backend().queue_rows(vec![]);
        assert!(!table.contains((1i64, 2i64)).await.unwrap());
    }

    #[tokio::test]
    async fn undeclared_filter_field_fails_before_any_statement() {
        let mut table = table();
        let error = table
            .records_where(Filter::field("missing", 1i64))
            .await
            .unwrap_err();
        assert!(matches!(error, TableError::UnknownField(field) if field == "missing"));
        assert!(table.backend().executed().is_empty());
    }

    #[tokio::test]
    async fn get_distinguishes_not_found_from_integrity_violation() {
        let mut table = table();

        table.backend().queue_rows(vec![]);
        let error = table.get(9i64).await.unwrap_err();
        assert!(matches!(error, TableError::NotFound { .. }));

        let mut row = Row::new();
        row.insert("id".to_string(), Value::Int(9));
        table.backend().queue_rows(vec![row.clone(), row]);
        let error = table.get(9i64).await.unwrap_err();
        assert!(matches!(error, TableError::Integrity { count: 2, .. }));
    }

    #[tokio::test]
    async fn records_are_decoded_through_declared_kinds() {
        let mut table = table();
        let mut row = Row::new();
        row.insert("id".to_string(), Value::Int(1));
        // backends may hand floats back as integers and leave fields unset
        row.insert("length".to_string(), Value::Int(4));
        table.backend().queue_rows(vec![row]);

        let records = table.records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["length"], Value::Float(4.0));
        assert_eq!(records[0]["name"], Value::Null);
    }

    #[tokio::test]
    async fn delete_where_match_all_emits_no_where_clause() {
        let mut table = table();
        table.delete_where(Filter::All).await.unwrap();
        let executed = table.backend().executed();
        assert_eq!(executed.last().unwrap().0, "DELETE FROM \"roads\"");
    }

    #[tokio::test]
    async fn dropped_table_rejects_every_operation() {
        let mut table = table();
        table.drop_table().await.unwrap();

        assert!(matches!(
            table.len().await.unwrap_err(),
            TableError::TableDropped(name) if name == "roads"
        ));
        assert!(matches!(
            table.drop_table().await.unwrap_err(),
            TableError::TableDropped(_)
        ));
    }

    #[tokio::test]
    async fn unsupported_kind_is_rejected_at_construction() {
        #[derive(Debug)]
        struct NoGeometry(MockBackend);

        // a dialect that rejects geometry, to stand in for plain sqlite
        impl Dialect for NoGeometry {
            fn tag(&self) -> &'static str {
                "test-no-geometry"
            }
            fn column_type(&self, kind: &FieldKind) -> Result<String> {
                if kind.is_geometry() {
                    Err(TableError::UnsupportedType {
                        backend: self.tag().to_string(),
                        kind: kind.clone(),
                    })
                } else {
                    self.0.column_type(kind)
                }
            }
            fn kind_of_column_type(&self, column_type: &str) -> Option<FieldKind> {
                self.0.kind_of_column_type(column_type)
            }
            fn placeholder(&self, index: usize) -> String {
                self.0.placeholder(index)
            }
            fn pattern_predicate(&self, field: &str, placeholder: &str) -> String {
                self.0.pattern_predicate(field, placeholder)
            }
            fn geom_from_text(&self, wkt: &str, srid: &str) -> String {
                self.0.geom_from_text(wkt, srid)
            }
            fn geom_transform(&self, expression: &str, srid: &str) -> String {
                self.0.geom_transform(expression, srid)
            }
            fn geom_intersects(&self, field: &str, expression: &str) -> String {
                self.0.geom_intersects(field, expression)
            }
            fn geom_as_text(&self, field: &str) -> String {
                self.0.geom_as_text(field)
            }
        }

        #[async_trait]
        impl Backend for NoGeometry {
            async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
                self.0.execute(sql, params).await
            }
            async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
                self.0.query(sql, params).await
            }
            async fn execute_batch(&self, statements: &[(String, Vec<Value>)]) -> Result<u64> {
                self.0.execute_batch(statements).await
            }
            async fn table_exists(&self, name: &str) -> Result<bool> {
                self.0.table_exists(name).await
            }
            async fn remote_columns(&self, name: &str) -> Result<Option<Vec<(String, String)>>> {
                self.0.remote_columns(name).await
            }
        }

        let schema = Schema::new(
            [
                ("id", FieldKind::Int),
                (
                    "footprint",
                    FieldKind::geometry(crate::value::GeometryKind::Polygon, 4326),
                ),
            ],
            ["id"],
        );
        let backend = NoGeometry(MockBackend::for_schema(&schema));
        let error = Table::new(backend, "places", schema).unwrap_err();
        assert!(matches!(error, TableError::UnsupportedType { .. }));
    }
}
