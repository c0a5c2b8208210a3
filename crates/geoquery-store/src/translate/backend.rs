//! Backend capability and dialect traits

use geoquery_core::error::{GeoqueryError, Result, UnsupportedReason};
use geoquery_core::models::{BoundingBox, DatabaseProvider, SpatialPredicate, SqlFragment, SqlValue};

/// How spatial predicates are emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpatialMode {
    /// Exact predicates through the backend's spatial SQL
    #[default]
    Native,
    /// Envelope-overlap tests only, for backends without spatial SQL
    EnvelopeOnly,
}

/// What a backend can express; translation consults these instead of the
/// provider identity
pub trait SpatialCapabilities {
    fn supports_native_spatial(&self) -> bool;

    fn supports_de9im(&self) -> bool;

    fn supports_native_between(&self) -> bool {
        true
    }

    /// An explicit envelope operator or index table usable as a pre-filter
    fn supports_envelope_index(&self) -> bool;

    fn supports_transform(&self) -> bool;
}

/// Unquoted names of the column a spatial predicate applies to
#[derive(Debug, Clone, Copy)]
pub struct SpatialTarget<'a> {
    pub table: &'a str,
    pub column: &'a str,
}

/// Per-backend SQL spelling
///
/// Methods receive already rendered operands: quoted columns and geometry
/// expressions whose placeholders are bound in the [`SqlWriter`].
pub trait SqlBackend: SpatialCapabilities + Send + Sync {
    fn provider(&self) -> DatabaseProvider;

    /// Name used in error messages
    fn label(&self) -> &'static str {
        self.provider().name()
    }

    /// Placeholder for the parameter at 1-based `index`
    fn placeholder(&self, index: usize) -> String;

    fn quote_identifier(&self, name: &str) -> String;

    fn table_name(&self, schema: Option<&str>, table: &str) -> String {
        match schema {
            Some(schema) => format!("{}.{}", self.quote_identifier(schema), self.quote_identifier(table)),
            None => self.quote_identifier(table),
        }
    }

    /// Geometry constructor from a WKT placeholder
    fn geometry_from_text(&self, wkt: &str, srid: u32) -> String;

    fn transform(&self, geometry: &str, srid: u32) -> String;

    /// Envelope-overlap test between a column and a geometry expression
    fn envelope_intersects(&self, column: &str, geometry: &str) -> String;

    /// One of the eight topological predicates
    fn predicate(&self, predicate: SpatialPredicate, column: &str, geometry: &str) -> String;

    /// Cheap index-backed test emitted ahead of an exact predicate
    fn envelope_prefilter(
        &self,
        _writer: &mut SqlWriter<'_>,
        _target: SpatialTarget<'_>,
        column: &str,
        geometry: &str,
    ) -> Option<String> {
        self.supports_envelope_index().then(|| self.envelope_intersects(column, geometry))
    }

    /// Envelope-only filter used by [`SpatialMode::EnvelopeOnly`]
    fn envelope_filter(
        &self,
        writer: &mut SqlWriter<'_>,
        _target: SpatialTarget<'_>,
        column: &str,
        bbox: &BoundingBox,
        srid: u32,
    ) -> Result<String> {
        let wkt = writer.bind(SqlValue::Text(envelope_wkt(bbox)));
        Ok(self.envelope_intersects(column, &self.geometry_from_text(&wkt, srid)))
    }

    /// Distance test in meters; `geographic` selects ellipsoidal distance
    fn distance_within(&self, column: &str, geometry: &str, distance: &str, geographic: bool, srid: u32) -> String;

    /// DE-9IM pattern test
    fn relate(&self, _column: &str, _geometry: &str, _pattern: &str) -> Result<String> {
        Err(GeoqueryError::unsupported(
            SpatialPredicate::Relate.name(),
            self.label(),
            UnsupportedReason::De9imUnavailable,
        ))
    }

    fn like(&self, column: &str, pattern: &str) -> String {
        format!("{} LIKE {} ESCAPE '\\'", column, pattern)
    }

    fn case_insensitive_like(&self, column: &str, pattern: &str) -> String {
        format!("LOWER({}) LIKE LOWER({}) ESCAPE '\\'", column, pattern)
    }

    /// Rewrite a canonical `%`/`_`/`\` pattern for this backend
    fn like_pattern(&self, pattern: &str) -> String {
        pattern.to_string()
    }

    /// Select-list expression for the geometry column, optionally reprojected
    fn geometry_output(&self, column: &str, transform_to: Option<u32>) -> Result<String>;

    /// Whether paging needs an ORDER BY clause to be valid
    fn paging_requires_order(&self) -> bool {
        false
    }

    /// Append the paging clause, binding both values
    fn paginate(&self, writer: &mut SqlWriter<'_>, limit: u32, offset: u64) {
        let limit = writer.bind(SqlValue::Integer(i64::from(limit)));
        let offset = writer.bind(SqlValue::Integer(offset_value(offset)));
        writer.push(&format!(" LIMIT {} OFFSET {}", limit, offset));
    }
}

/// Offsets above `i64::MAX` cannot be bound; they match nothing anyway
pub(crate) fn offset_value(offset: u64) -> i64 {
    i64::try_from(offset).unwrap_or(i64::MAX)
}

/// `ST_*` function name of a topological predicate
pub(crate) fn st_function(predicate: SpatialPredicate) -> &'static str {
    match predicate {
        SpatialPredicate::Contains => "ST_Contains",
        SpatialPredicate::Within => "ST_Within",
        SpatialPredicate::Touches => "ST_Touches",
        SpatialPredicate::Crosses => "ST_Crosses",
        SpatialPredicate::Overlaps => "ST_Overlaps",
        SpatialPredicate::Disjoint => "ST_Disjoint",
        SpatialPredicate::Equals => "ST_Equals",
        _ => "ST_Intersects",
    }
}

/// Closed polygon WKT for a bounding box
pub(crate) fn envelope_wkt(bbox: &BoundingBox) -> String {
    format!(
        "POLYGON(({minx} {miny}, {maxx} {miny}, {maxx} {maxy}, {minx} {maxy}, {minx} {miny}))",
        minx = bbox.min_x,
        miny = bbox.min_y,
        maxx = bbox.max_x,
        maxy = bbox.max_y
    )
}

/// Accumulates SQL text and its bound parameters
///
/// Placeholders are numbered in binding order, so text must be assembled in
/// the order values are bound for positional (`?`) backends.
pub struct SqlWriter<'b> {
    backend: &'b dyn SqlBackend,
    sql: String,
    params: Vec<SqlValue>,
}

impl<'b> SqlWriter<'b> {
    pub fn new(backend: &'b dyn SqlBackend) -> Self {
        Self { backend, sql: String::new(), params: Vec::new() }
    }

    pub fn backend(&self) -> &'b dyn SqlBackend {
        self.backend
    }

    /// Bind a value and return its placeholder
    pub fn bind(&mut self, value: SqlValue) -> String {
        self.params.push(value);
        self.backend.placeholder(self.params.len())
    }

    pub fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    pub fn ident(&self, name: &str) -> String {
        self.backend.quote_identifier(name)
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn finish(self) -> SqlFragment {
        SqlFragment::new(self.sql, self.params)
    }
}
