use crate::backend::Dialect;
use crate::error::{Result, TableError};
use crate::schema::Schema;
use crate::value::{Geometry, Value};

/// Accumulates bound parameter values and hands out numbered placeholders.
///
/// Placeholders are numbered, so an expression built once (a reprojected
/// geometry, for instance) can appear several times in a statement while its
/// values are bound once.
pub struct Params<'a> {
    dialect: &'a dyn Dialect,
    values: Vec<Value>,
}

impl<'a> Params<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Params<'a> {
        Params {
            dialect,
            values: Vec::new(),
        }
    }

    pub fn dialect(&self) -> &'a dyn Dialect {
        self.dialect
    }

    /// Bind a value, returning its placeholder text.
    pub fn push(&mut self, value: Value) -> String {
        self.values.push(value);
        self.dialect.placeholder(self.values.len())
    }

    /// Bind a geometry as WKT + SRID, returning the dialect's construction
    /// expression.
    pub fn geometry(&mut self, geometry: &Geometry) -> String {
        let wkt = self.push(Value::Text(geometry.wkt()));
        let srid = self.push(Value::Int(geometry.srid as i64));
        self.dialect.geom_from_text(&wkt, &srid)
    }

    /// SQL expression for a value in a VALUES/SET position: a literal NULL,
    /// a geometry construction, or a plain placeholder.
    pub fn value_expr(&mut self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Geometry(geometry) => self.geometry(geometry),
            other => self.push(other.clone()),
        }
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// A WHERE-clause in one of three forms, resolved at the API boundary rather
/// than by runtime type inspection inside the builder.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Match every record.
    All,
    /// Field/value pairs, AND-joined. Null matches `IS NULL`; a string value
    /// containing `%` becomes a case-insensitive pattern match, so a literal
    /// `%` cannot be matched exactly; anything else is parameterized
    /// equality.
    Fields(Vec<(String, Value)>),
    /// Opaque backend-native boolean expression, passed through unchecked.
    /// The caller is responsible for correctness and injection safety.
    Raw(String),
    /// Raw predicates, AND-joined; the same escape-hatch contract as `Raw`.
    Predicates(Vec<String>),
}

impl Filter {
    pub fn fields<N, V, I>(pairs: I) -> Filter
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<Value>,
    {
        Filter::Fields(
            pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }

    pub fn field(name: impl Into<String>, value: impl Into<Value>) -> Filter {
        Filter::Fields(vec![(name.into(), value.into())])
    }

    /// Build the predicate text, binding values into `params`. `None` means
    /// "match all records" and no WHERE clause should be emitted; an empty
    /// equality map or predicate list is match-all, not an error.
    pub fn build(&self, schema: &Schema, params: &mut Params<'_>) -> Result<Option<String>> {
        match self {
            Filter::All => Ok(None),
            Filter::Fields(pairs) if pairs.is_empty() => Ok(None),
            Filter::Fields(pairs) => {
                let dialect = params.dialect();
                let mut clauses = Vec::with_capacity(pairs.len());
                for (field, value) in pairs {
                    if !schema.contains(field) {
                        return Err(TableError::UnknownField(field.clone()));
                    }
                    let quoted = dialect.quote_ident(field);
                    let clause = match value {
                        Value::Null => format!("{} IS NULL", quoted),
                        Value::Geometry(geometry) => {
                            format!("{} = {}", quoted, params.geometry(geometry))
                        }
                        Value::Text(text) if text.contains('%') => {
                            let placeholder = params.push(value.clone());
                            dialect.pattern_predicate(&quoted, &placeholder)
                        }
                        other => format!("{} = {}", quoted, params.push(other.clone())),
                    };
                    clauses.push(clause);
                }
                Ok(Some(clauses.join(" AND ")))
            }
            Filter::Raw(predicate) => {
                if predicate.trim().is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(predicate.clone()))
                }
            }
            Filter::Predicates(predicates) if predicates.is_empty() => Ok(None),
            Filter::Predicates(predicates) => Ok(Some(predicates.join(" AND "))),
        }
    }
}

impl From<&str> for Filter {
    fn from(predicate: &str) -> Filter {
        Filter::Raw(predicate.to_string())
    }
}

impl From<String> for Filter {
    fn from(predicate: String) -> Filter {
        Filter::Raw(predicate)
    }
}

impl From<Vec<String>> for Filter {
    fn from(predicates: Vec<String>) -> Filter {
        Filter::Predicates(predicates)
    }
}

impl From<Vec<(String, Value)>> for Filter {
    fn from(pairs: Vec<(String, Value)>) -> Filter {
        Filter::Fields(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::TestDialect;
    use crate::value::FieldKind;

    fn schema() -> Schema {
        Schema::new(
            [
                ("id", FieldKind::Int),
                ("name", FieldKind::Text),
                ("length", FieldKind::Float),
            ],
            ["id"],
        )
    }

    fn build(filter: Filter) -> (Option<String>, Vec<Value>) {
        let mut params = Params::new(&TestDialect);
        let predicate = filter.build(&schema(), &mut params).unwrap();
        (predicate, params.into_values())
    }

    #[test]
    fn match_all_forms_emit_no_predicate() {
        assert_eq!(build(Filter::All).0, None);
        assert_eq!(build(Filter::Fields(vec![])).0, None);
        assert_eq!(build(Filter::Predicates(vec![])).0, None);
        assert_eq!(build(Filter::Raw("  ".to_string())).0, None);
    }

    #[test]
    fn equality_pairs_are_parameterized_and_and_joined() {
        let (predicate, values) = build(Filter::fields([
            ("id", Value::Int(1)),
            ("length", Value::Float(4.4)),
        ]));
        assert_eq!(
            predicate.unwrap(),
            "\"id\" = $1 AND \"length\" = $2"
        );
        assert_eq!(values, vec![Value::Int(1), Value::Float(4.4)]);
    }

    #[test]
    fn null_matches_is_null_without_binding() {
        let (predicate, values) = build(Filter::field("name", Value::Null));
        assert_eq!(predicate.unwrap(), "\"name\" IS NULL");
        assert!(values.is_empty());
    }

    #[test]
    fn wildcard_text_becomes_pattern_match() {
        let (predicate, values) = build(Filter::field("name", "%long%"));
        assert_eq!(predicate.unwrap(), "\"name\" ILIKE $1");
        assert_eq!(values, vec![Value::Text("%long%".to_string())]);
    }

    #[test]
    fn plain_text_is_equality_even_with_special_characters() {
        let (predicate, _) = build(Filter::field("name", "long boi"));
        assert_eq!(predicate.unwrap(), "\"name\" = $1");
    }

    #[test]
    fn undeclared_field_is_rejected() {
        let mut params = Params::new(&TestDialect);
        let error = Filter::field("missing", 1i64)
            .build(&schema(), &mut params)
            .unwrap_err();
        assert!(matches!(error, TableError::UnknownField(field) if field == "missing"));
    }

    #[test]
    fn raw_predicates_pass_through_unchecked() {
        let (predicate, values) = build(Filter::Raw("length > 2 OR name IS NULL".to_string()));
        assert_eq!(predicate.unwrap(), "length > 2 OR name IS NULL");
        assert!(values.is_empty());

        let (predicate, _) = build(Filter::Predicates(vec![
            "length > 2".to_string(),
            "id < 10".to_string(),
        ]));
        assert_eq!(predicate.unwrap(), "length > 2 AND id < 10");
    }
}
