use crate::error::{Result, TableError};
use crate::filter::Params;
use crate::schema::Schema;
use crate::value::{FieldKind, Geometry};

/// A spatial-intersection query: a geometry (carrying its source CRS) tested
/// against one or more geometry fields of the table.
#[derive(Debug, Clone)]
pub struct GeometryQuery {
    geometry: Geometry,
    fields: Option<Vec<String>>,
}

impl GeometryQuery {
    /// Query against every geometry field of the table, OR-joined.
    pub fn new(geometry: Geometry) -> GeometryQuery {
        GeometryQuery {
            geometry,
            fields: None,
        }
    }

    /// Restrict the query to the named geometry fields.
    pub fn with_fields<I, N>(mut self, fields: I) -> GeometryQuery
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Build the OR-joined intersects predicate over the target fields.
    ///
    /// The geometry is bound once per distinct target CRS; fields sharing a
    /// CRS reuse the same (possibly reprojected) expression, so reprojection
    /// cost and placeholder count do not grow with the field count.
    pub fn build(&self, table: &str, schema: &Schema, params: &mut Params<'_>) -> Result<String> {
        let targets = self.target_fields(table, schema)?;
        let dialect = params.dialect();

        // (srid, expression) in first-appearance order
        let mut expressions: Vec<(i32, String)> = Vec::new();
        for (_, srid) in &targets {
            if expressions.iter().any(|(known, _)| known == srid) {
                continue;
            }
            let mut expression = params.geometry(&self.geometry);
            if *srid != self.geometry.srid {
                let srid_placeholder = params.push(crate::value::Value::Int(*srid as i64));
                expression = dialect.geom_transform(&expression, &srid_placeholder);
            }
            expressions.push((*srid, expression));
        }

        let clauses: Vec<String> = targets
            .iter()
            .map(|(name, srid)| {
                let expression = &expressions
                    .iter()
                    .find(|(known, _)| known == srid)
                    .expect("expression built for every target srid")
                    .1;
                dialect.geom_intersects(&dialect.quote_ident(name), expression)
            })
            .collect();

        Ok(clauses.join(" OR "))
    }

    /// Resolve the targeted geometry fields to (name, declared SRID) pairs.
    fn target_fields(&self, table: &str, schema: &Schema) -> Result<Vec<(String, i32)>> {
        match &self.fields {
            Some(names) if !names.is_empty() => names
                .iter()
                .map(|name| match schema.field(name) {
                    Some(field) => match field.kind {
                        FieldKind::Geometry { srid, .. } => Ok((name.clone(), srid)),
                        _ => Err(TableError::UnknownField(name.clone())),
                    },
                    None => Err(TableError::UnknownField(name.clone())),
                })
                .collect(),
            _ => {
                let fields: Vec<(String, i32)> = schema
                    .geometry_fields()
                    .iter()
                    .map(|field| match field.kind {
                        FieldKind::Geometry { srid, .. } => (field.name.clone(), srid),
                        _ => unreachable!("geometry_fields returns geometry kinds only"),
                    })
                    .collect();
                if fields.is_empty() {
                    return Err(TableError::NoGeometryFields(table.to_string()));
                }
                Ok(fields)
            }
        }
    }
}
