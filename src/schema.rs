use serde::{Deserialize, Serialize};

use crate::backend::Dialect;
use crate::error::{Result, TableError};
use crate::value::FieldKind;

/// One declared field: a name, unique within the table, and a semantic kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

/// Ordered field declarations plus the primary-key field names.
///
/// The schema is fixed at table construction; binding verifies it against
/// the backend's reported columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<FieldSpec>,
    primary_key: Vec<String>,
}

impl Schema {
    pub fn new<F, N, K, P>(fields: F, primary_key: K) -> Schema
    where
        F: IntoIterator<Item = (N, FieldKind)>,
        N: Into<String>,
        K: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Schema {
            fields: fields
                .into_iter()
                .map(|(name, kind)| FieldSpec {
                    name: name.into(),
                    kind,
                })
                .collect(),
            primary_key: primary_key.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Primary-key field names, in key order.
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn is_key_field(&self, name: &str) -> bool {
        self.primary_key.iter().any(|key| key == name)
    }

    pub fn geometry_fields(&self) -> Vec<&FieldSpec> {
        self.fields
            .iter()
            .filter(|field| field.kind.is_geometry())
            .collect()
    }

    /// Check field-name uniqueness and the primary-key subset invariant.
    pub fn validate(&self) -> Result<()> {
        for (index, field) in self.fields.iter().enumerate() {
            if self.fields[..index].iter().any(|f| f.name == field.name) {
                return Err(TableError::Schema(format!(
                    "duplicate field \"{}\"",
                    field.name
                )));
            }
        }

        if self.primary_key.is_empty() {
            return Err(TableError::Schema("empty primary key".to_string()));
        }

        for key in &self.primary_key {
            if !self.contains(key) {
                return Err(TableError::Schema(format!(
                    "primary key field \"{}\" is not declared",
                    key
                )));
            }
        }

        for (index, key) in self.primary_key.iter().enumerate() {
            if self.primary_key[..index].contains(key) {
                return Err(TableError::Schema(format!(
                    "duplicate primary key field \"{}\"",
                    key
                )));
            }
        }

        Ok(())
    }

    /// Column definitions in declaration order, typed through the dialect.
    pub fn ddl_columns(&self, dialect: &dyn Dialect) -> Result<Vec<String>> {
        self.fields
            .iter()
            .map(|field| {
                Ok(format!(
                    "{} {}",
                    dialect.quote_ident(&field.name),
                    dialect.column_type(&field.kind)?
                ))
            })
            .collect()
    }

    /// Conditional CREATE TABLE statement. The `IF NOT EXISTS` form is what
    /// makes concurrent first-use binding race-tolerant.
    pub fn ddl_create(&self, dialect: &dyn Dialect, table: &str) -> Result<String> {
        let mut parts = self.ddl_columns(dialect)?;
        parts.push(format!(
            "PRIMARY KEY({})",
            self.primary_key
                .iter()
                .map(|key| dialect.quote_ident(key))
                .collect::<Vec<_>>()
                .join(", ")
        ));
        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            dialect.quote_ident(table),
            parts.join(", ")
        ))
    }

    /// Compare the declared fields against a backend's reported columns,
    /// ignoring order. Reports every missing, extra, and type-mismatched
    /// field at once.
    pub fn diff(&self, remote: &[(String, String)], dialect: &dyn Dialect) -> Result<()> {
        let mut missing = Vec::new();
        let mut extra = Vec::new();
        let mut mismatched = Vec::new();

        for field in &self.fields {
            match remote
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(&field.name))
            {
                None => missing.push(field.name.clone()),
                Some((_, type_name)) => match dialect.kind_of_column_type(type_name) {
                    None => mismatched.push(format!(
                        "{}: unrecognized remote type \"{}\"",
                        field.name, type_name
                    )),
                    Some(remote_kind) if !field.kind.compatible(&remote_kind) => mismatched
                        .push(format!(
                            "{}: declared {}, remote \"{}\"",
                            field.name, field.kind, type_name
                        )),
                    Some(_) => {}
                },
            }
        }

        for (name, _) in remote {
            if !self
                .fields
                .iter()
                .any(|field| field.name.eq_ignore_ascii_case(name))
            {
                extra.push(name.clone());
            }
        }

        if missing.is_empty() && extra.is_empty() && mismatched.is_empty() {
            Ok(())
        } else {
            Err(TableError::SchemaMismatch {
                missing,
                extra,
                mismatched,
            })
        }
    }
}
