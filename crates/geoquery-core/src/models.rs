pub mod catalog;
pub mod filter;
pub mod geometry;
pub mod policy;
pub mod query;
pub mod sql;

pub use catalog::{FieldCatalog, FieldDefinition, FieldType};
pub use filter::{ComparisonOperator, FilterExpression, Literal, LogicalOperator, SpatialFilter};
pub use geometry::{
    BoundingBox, Coordinate, Crs, Distance, DistanceUnit, Geometry, GeometryType, Shape,
    SpatialPredicate, ValidityMode,
};
pub use policy::{DatabaseProvider, LayerPolicy, ParserLimits, ServicePolicy, SpatialFallback};
pub use query::{
    FeatureQuery, FeatureRecord, QueryLimits, ResultType, SortDirection, SortOrder,
    TemporalInterval, ABSOLUTE_MAX_LIMIT,
};
pub use sql::{SqlFragment, SqlValue};
