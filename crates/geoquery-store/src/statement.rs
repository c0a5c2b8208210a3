//! Full SELECT statements for a feature query

use crate::translate::{FilterTranslator, SpatialMode, SqlBackend, SqlWriter};
use geoquery_core::error::{GeoqueryError, Result};
use geoquery_core::models::{FeatureQuery, FieldDefinition, LayerPolicy, SqlFragment};

/// Select-list alias carrying the feature identifier
pub const ID_COLUMN: &str = "__id";

/// Select-list alias carrying the serialized geometry
pub const GEOMETRY_COLUMN: &str = "__geometry";

/// Builds count and fetch statements for one layer
///
/// Only `query.filter` is translated; bbox and datetime parameters are
/// expected to have been folded into it already.
pub struct StatementBuilder<'a> {
    backend: &'a dyn SqlBackend,
    layer: &'a LayerPolicy,
    mode: SpatialMode,
}

impl<'a> StatementBuilder<'a> {
    pub fn new(backend: &'a dyn SqlBackend, layer: &'a LayerPolicy) -> Self {
        Self { backend, layer, mode: SpatialMode::Native }
    }

    pub fn with_mode(mut self, mode: SpatialMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> SpatialMode {
        self.mode
    }

    /// `SELECT COUNT(*)` over the filtered layer, ignoring paging and sort
    pub fn count(&self, query: &FeatureQuery) -> Result<SqlFragment> {
        let mut w = SqlWriter::new(self.backend);
        w.push("SELECT COUNT(*) FROM ");
        w.push(&self.table());
        self.where_clause(&mut w, query)?;
        Ok(w.finish())
    }

    /// Paged feature rows with identifier, geometry and properties
    pub fn fetch(&self, query: &FeatureQuery) -> Result<SqlFragment> {
        let mut w = SqlWriter::new(self.backend);
        let columns = self.select_list(&w, query)?;
        w.push("SELECT ");
        w.push(&columns.join(", "));
        w.push(" FROM ");
        w.push(&self.table());
        self.where_clause(&mut w, query)?;
        self.order_by(&mut w, query)?;
        self.backend.paginate(&mut w, query.limit, query.offset);

        let statement = w.finish();
        tracing::debug!(
            layer = %self.layer.name,
            backend = self.backend.label(),
            params = statement.params.len(),
            "Built feature statement"
        );
        Ok(statement)
    }

    fn table(&self) -> String {
        self.backend.table_name(self.layer.schema.as_deref(), &self.layer.table)
    }

    fn field(&self, name: &str) -> Result<&'a FieldDefinition> {
        self.layer
            .catalog
            .resolve(name)
            .ok_or_else(|| GeoqueryError::field_validation(name, format!("Unknown field '{}'", name)))
    }

    fn select_list(&self, w: &SqlWriter<'_>, query: &FeatureQuery) -> Result<Vec<String>> {
        let mut columns = Vec::new();

        if let Some(pk) = &self.layer.catalog.primary_key {
            let pk = self.field(pk)?;
            columns.push(format!("{} AS {}", w.ident(&pk.name), w.ident(ID_COLUMN)));
        }

        if query.include_geometry {
            if let Some(geometry) = self.layer.catalog.geometry_field() {
                let storage = geometry.srid.unwrap_or(self.layer.storage_crs);
                let transform_to = (query.output_crs != storage).then_some(query.output_crs.epsg);
                let expr = self.backend.geometry_output(&w.ident(&geometry.name), transform_to)?;
                columns.push(format!("{} AS {}", expr, w.ident(GEOMETRY_COLUMN)));
            }
        }

        match &query.property_names {
            Some(names) => {
                for name in names {
                    let field = self.field(name)?;
                    if field.is_geometry() {
                        continue;
                    }
                    columns.push(w.ident(&field.name));
                }
            }
            None => columns.extend(self.layer.catalog.property_fields().map(|f| w.ident(&f.name))),
        }

        if columns.is_empty() {
            columns.push("*".to_string());
        }
        Ok(columns)
    }

    fn where_clause(&self, w: &mut SqlWriter<'_>, query: &FeatureQuery) -> Result<()> {
        if let Some(filter) = &query.filter {
            let condition = FilterTranslator::new(self.backend, self.layer, self.mode).render(w, filter)?;
            w.push(" WHERE ");
            w.push(&condition);
        }
        Ok(())
    }

    fn order_by(&self, w: &mut SqlWriter<'_>, query: &FeatureQuery) -> Result<()> {
        let mut terms = Vec::with_capacity(query.sort.len());
        for order in &query.sort {
            let field = self.field(&order.field)?;
            terms.push(format!("{} {}", w.ident(&field.name), order.direction.keyword()));
        }

        if terms.is_empty() {
            if let Some(pk) = &self.layer.catalog.primary_key {
                terms.push(format!("{} ASC", w.ident(&self.field(pk)?.name)));
            } else if self.backend.paging_requires_order() {
                terms.push("(SELECT NULL)".to_string());
            }
        }

        if !terms.is_empty() {
            w.push(" ORDER BY ");
            w.push(&terms.join(", "));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::{PostgresBackend, SqlServerBackend, SqliteBackend};
    use geoquery_core::models::{
        BoundingBox, ComparisonOperator, Crs, FieldCatalog, FieldType, FilterExpression, Geometry,
        Literal, SortOrder, SpatialFilter, SpatialPredicate, SqlValue,
    };
    use geoquery_core::ErrorKind;

    fn layer() -> LayerPolicy {
        let catalog = FieldCatalog::new(vec![
            FieldDefinition::new("fid", FieldType::Integer),
            FieldDefinition::new("name", FieldType::String),
            FieldDefinition::geometry("geom", Crs::wgs84()),
        ])
        .with_primary_key("fid");
        let mut layer = LayerPolicy::new("roads", "roads", catalog);
        layer.schema = Some("public".into());
        layer
    }

    fn query() -> FeatureQuery {
        FeatureQuery { limit: 10, offset: 20, ..Default::default() }
    }

    #[test]
    fn test_postgres_fetch_statement() {
        let layer = layer();
        let statement = StatementBuilder::new(&PostgresBackend, &layer).fetch(&query()).unwrap();

        assert_eq!(
            statement.sql,
            "SELECT \"fid\" AS \"__id\", ST_AsGeoJSON(\"geom\") AS \"__geometry\", \"fid\", \"name\" \
             FROM \"public\".\"roads\" ORDER BY \"fid\" ASC LIMIT $1 OFFSET $2"
        );
        assert_eq!(statement.params, vec![SqlValue::Integer(10), SqlValue::Integer(20)]);
    }

    #[test]
    fn test_output_crs_reprojects_geometry() {
        let layer = layer();
        let query = FeatureQuery { output_crs: Crs::web_mercator(), property_names: Some(vec![]), ..query() };
        let statement = StatementBuilder::new(&PostgresBackend, &layer).fetch(&query).unwrap();

        assert!(statement.sql.contains("ST_AsGeoJSON(ST_Transform(\"geom\", 3857)) AS \"__geometry\""));
        assert!(!statement.sql.contains("\"name\""));
    }

    #[test]
    fn test_sqlserver_paging_binds_offset_first() {
        let mut layer = layer();
        layer.catalog.primary_key = None;
        let query = FeatureQuery { include_geometry: false, ..query() };
        let statement = StatementBuilder::new(&SqlServerBackend, &layer).fetch(&query).unwrap();

        assert!(statement
            .sql
            .ends_with("ORDER BY (SELECT NULL) OFFSET @p1 ROWS FETCH NEXT @p2 ROWS ONLY"));
        assert_eq!(statement.params, vec![SqlValue::Integer(20), SqlValue::Integer(10)]);
    }

    #[test]
    fn test_filter_params_precede_paging_params() {
        let layer = layer();
        let query = FeatureQuery {
            filter: Some(FilterExpression::comparison(
                "name",
                ComparisonOperator::Equal,
                Literal::String("A1".into()),
            )),
            sort: vec![SortOrder::descending("name")],
            include_geometry: false,
            ..query()
        };
        let statement = StatementBuilder::new(&SqliteBackend::plain(), &layer).fetch(&query).unwrap();

        assert!(statement.sql.contains("WHERE \"name\" = ? ORDER BY \"name\" DESC LIMIT ? OFFSET ?"));
        assert_eq!(statement.params[0], SqlValue::Text("A1".into()));
    }

    #[test]
    fn test_count_ignores_paging() {
        let layer = layer();
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let query = FeatureQuery {
            filter: Some(FilterExpression::Spatial(SpatialFilter::new(
                SpatialPredicate::BBox,
                "geom",
                Geometry::envelope(&bbox, Crs::wgs84()),
            ))),
            ..query()
        };
        let statement = StatementBuilder::new(&PostgresBackend, &layer).count(&query).unwrap();

        assert_eq!(
            statement.sql,
            "SELECT COUNT(*) FROM \"public\".\"roads\" WHERE ST_Intersects(\"geom\", ST_GeomFromText($1, 4326))"
        );
        assert_eq!(statement.params.len(), 1);
    }

    #[test]
    fn test_unknown_sort_field_is_rejected() {
        let layer = layer();
        let query = FeatureQuery { sort: vec![SortOrder::ascending("nope")], ..query() };
        let err = StatementBuilder::new(&PostgresBackend, &layer).fetch(&query).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
