use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::filter::FilterExpression;
use super::geometry::{BoundingBox, Crs};

/// Hard ceiling on page size, applied after layer and service limits
pub const ABSOLUTE_MAX_LIMIT: u32 = 5000;

/// Whether the caller wants matching features or only their count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ResultType {
    #[default]
    Results,
    Hits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// One ORDER BY term; `field` is the catalog's canonical name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    pub field: String,
    pub direction: SortDirection,
}

impl SortOrder {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Ascending }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Descending }
    }
}

/// Closed or half-open time range; `None` on either side means unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalInterval {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TemporalInterval {
    pub fn instant(at: DateTime<Utc>) -> Self {
        Self { start: Some(at), end: Some(at) }
    }

    pub fn is_instant(&self) -> bool {
        self.start.is_some() && self.start == self.end
    }
}

/// Fully resolved, backend-independent query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureQuery {
    /// Page size, already clamped
    pub limit: u32,
    pub offset: u64,
    pub bbox: Option<BoundingBox>,
    pub temporal: Option<TemporalInterval>,
    pub result_type: ResultType,
    /// `None` selects every catalog property
    pub property_names: Option<Vec<String>>,
    pub sort: Vec<SortOrder>,
    pub filter: Option<FilterExpression>,
    pub output_crs: Crs,
    pub include_geometry: bool,
}

impl Default for FeatureQuery {
    fn default() -> Self {
        Self {
            limit: 10,
            offset: 0,
            bbox: None,
            temporal: None,
            result_type: ResultType::Results,
            property_names: None,
            sort: Vec::new(),
            filter: None,
            output_crs: Crs::wgs84(),
            include_geometry: true,
        }
    }
}

/// The limit-related inputs of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub requested: Option<u32>,
    pub default_limit: u32,
    pub layer_max: Option<u32>,
    pub service_max: Option<u32>,
    pub absolute_max: u32,
}

impl QueryLimits {
    /// `min(requested ?? default, layer_max, service_max, absolute_max)`
    pub fn effective(&self) -> u32 {
        [self.layer_max, self.service_max, Some(self.absolute_max)]
            .into_iter()
            .flatten()
            .fold(self.requested.unwrap_or(self.default_limit), u32::min)
    }
}

/// A feature row returned by a data store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Primary-key value, when the layer has one
    pub id: Option<serde_json::Value>,

    /// Geometry as GeoJSON (or WKT text for stores that cannot emit GeoJSON)
    pub geometry: Option<serde_json::Value>,

    pub properties: HashMap<String, serde_json::Value>,
}

impl FeatureRecord {
    pub fn new(properties: HashMap<String, serde_json::Value>) -> Self {
        Self { id: None, geometry: None, properties }
    }

    pub fn with_id(mut self, id: serde_json::Value) -> Self {
        self.id = Some(id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(requested: Option<u32>) -> QueryLimits {
        QueryLimits {
            requested,
            default_limit: 10,
            layer_max: Some(2000),
            service_max: None,
            absolute_max: ABSOLUTE_MAX_LIMIT,
        }
    }

    #[test]
    fn test_effective_limit() {
        assert_eq!(limits(None).effective(), 10);
        assert_eq!(limits(Some(50)).effective(), 50);
        assert_eq!(limits(Some(100_000)).effective(), 2000);

        let uncapped = QueryLimits { layer_max: None, ..limits(Some(100_000)) };
        assert_eq!(uncapped.effective(), ABSOLUTE_MAX_LIMIT);
    }

    #[test]
    fn test_temporal_instant() {
        let now = Utc::now();
        assert!(TemporalInterval::instant(now).is_instant());
        assert!(!TemporalInterval { start: Some(now), end: None }.is_instant());
    }
}
