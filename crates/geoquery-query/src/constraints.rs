//! Paging, CRS, bbox, sort and projection constraints
//!
//! Malformed values are errors; values that are merely larger than policy
//! allows are clamped.

use crate::params::{self, RequestParams};
use geoquery_core::error::{GeoqueryError, Result};
use geoquery_core::models::{
    BoundingBox, Crs, FieldDefinition, LayerPolicy, QueryLimits, ResultType, ServicePolicy,
    SortDirection, SortOrder, TemporalInterval, ABSOLUTE_MAX_LIMIT,
};
use geoquery_filter::resolve::{parse_date, parse_timestamp};

/// Everything about a request except its filter
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConstraints {
    pub limit: u32,
    pub offset: u64,
    pub bbox: Option<BoundingBox>,
    pub temporal: Option<TemporalInterval>,
    pub result_type: ResultType,
    pub property_names: Option<Vec<String>>,
    pub sort: Vec<SortOrder>,
    pub output_crs: Crs,
    pub include_geometry: bool,
}

/// Resolves request parameters against layer and service policy
pub struct QueryConstraintResolver<'a> {
    layer: &'a LayerPolicy,
    service: &'a ServicePolicy,
}

impl<'a> QueryConstraintResolver<'a> {
    pub fn new(layer: &'a LayerPolicy, service: &'a ServicePolicy) -> Self {
        Self { layer, service }
    }

    pub fn resolve(&self, params: &RequestParams) -> Result<ResolvedConstraints> {
        let result_type = self.result_type(params)?;
        let constraints = ResolvedConstraints {
            limit: self.limit(params.first(params::LIMIT), result_type == ResultType::Hits)?,
            offset: self.offset(params.first(params::OFFSET))?,
            bbox: self.bbox(params.first(params::BBOX), params.first(params::BBOX_CRS))?,
            temporal: self.datetime(params.first(params::DATETIME))?,
            result_type,
            property_names: self.properties(params.first(params::PROPERTIES))?,
            sort: self.sort(params.first(params::SORT))?,
            output_crs: self.output_crs(params.first(params::CRS))?,
            include_geometry: match params.first(params::RETURN_GEOMETRY) {
                Some(raw) => parse_flag(raw, "returnGeometry")?,
                None => true,
            },
        };

        tracing::debug!(
            layer = %self.layer.name,
            limit = constraints.limit,
            offset = constraints.offset,
            crs = %constraints.output_crs,
            "Resolved query constraints"
        );
        Ok(constraints)
    }

    /// `min(requested ?? default, layer max, service max, absolute cap)`
    ///
    /// Zero is only accepted when `allow_zero` is set, for count-only requests.
    pub fn limit(&self, raw: Option<&str>, allow_zero: bool) -> Result<u32> {
        let requested = match raw {
            None => None,
            Some(raw) => {
                let value: i128 = raw
                    .trim()
                    .parse()
                    .map_err(|_| GeoqueryError::limit("limit", format!("'{}' is not an integer", raw)))?;
                if value < 0 || (value == 0 && !allow_zero) {
                    return Err(GeoqueryError::limit("limit", format!("must be positive, got {}", value)));
                }
                Some(u32::try_from(value).unwrap_or(u32::MAX))
            }
        };

        let limits = QueryLimits {
            requested,
            default_limit: self.service.default_limit,
            layer_max: self.layer.max_record_count,
            service_max: self.service.max_record_count,
            absolute_max: self.service.absolute_max_limit.min(ABSOLUTE_MAX_LIMIT),
        };
        Ok(limits.effective())
    }

    pub fn offset(&self, raw: Option<&str>) -> Result<u64> {
        let Some(raw) = raw else {
            return Ok(0);
        };
        let value: i128 = raw
            .trim()
            .parse()
            .map_err(|_| GeoqueryError::limit("offset", format!("'{}' is not an integer", raw)))?;
        if value < 0 {
            return Err(GeoqueryError::limit("offset", format!("must not be negative, got {}", value)));
        }
        Ok(u64::try_from(value).unwrap_or(u64::MAX))
    }

    /// A bbox without a CRS suffix takes `bbox-crs`, else stays unset
    pub fn bbox(&self, raw: Option<&str>, bbox_crs: Option<&str>) -> Result<Option<BoundingBox>> {
        let Some(raw) = raw else {
            return Ok(None);
        };
        let mut bbox = parse_bbox(raw)?;
        if bbox.crs.is_none() {
            if let Some(crs) = bbox_crs {
                bbox.crs = Some(Crs::parse(crs).map_err(|_| relocate(crs, "bbox-crs"))?);
            }
        }
        Ok(Some(bbox))
    }

    /// Request CRS, then layer default, then service default, then CRS84
    ///
    /// A well-formed CRS the layer cannot serve falls through the chain.
    pub fn output_crs(&self, raw: Option<&str>) -> Result<Crs> {
        if let Some(raw) = raw {
            let requested = parse_output_crs(raw)?;
            if self.layer.supports_crs(&requested) {
                return Ok(requested);
            }
            tracing::debug!(requested = %requested, layer = %self.layer.name, "CRS not offered by layer, using default");
        }
        Ok(self
            .layer
            .default_crs
            .or(self.service.default_crs)
            .unwrap_or_else(Crs::wgs84))
    }

    /// Sort keys in `[+-]field[:asc|desc]` or `field ASC|DESC|A|D` form
    ///
    /// Defaults to the primary key ascending.
    pub fn sort(&self, raw: Option<&str>) -> Result<Vec<SortOrder>> {
        let mut orders = Vec::new();
        for token in raw.unwrap_or_default().split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            orders.push(self.sort_key(token)?);
        }

        if orders.is_empty() {
            if let Some(pk) = &self.layer.catalog.primary_key {
                orders.push(SortOrder::ascending(pk.clone()));
            }
        }
        Ok(orders)
    }

    fn sort_key(&self, token: &str) -> Result<SortOrder> {
        let (mut direction, rest) = match token.as_bytes()[0] {
            b'-' => (SortDirection::Descending, &token[1..]),
            b'+' => (SortDirection::Ascending, &token[1..]),
            _ => (SortDirection::Ascending, token),
        };

        let (name, suffix) = match rest.split_once(':') {
            Some((name, suffix)) => (name, Some(suffix)),
            None => match rest.split_once(char::is_whitespace) {
                Some((name, suffix)) => (name, Some(suffix)),
                None => (rest, None),
            },
        };

        if let Some(suffix) = suffix {
            direction = match suffix.trim().to_ascii_uppercase().as_str() {
                "ASC" | "A" | "ASCENDING" => SortDirection::Ascending,
                "DESC" | "D" | "DESCENDING" => SortDirection::Descending,
                other => {
                    return Err(GeoqueryError::parse(format!("Unknown sort direction '{}'", other), "sortby"))
                }
            };
        }

        let field = self.queryable(name.trim(), "sortby")?;
        if field.is_geometry() {
            return Err(GeoqueryError::field_validation(
                &field.name,
                format!("Cannot sort on geometry field '{}'", field.name),
            ));
        }
        Ok(SortOrder { field: field.name.clone(), direction })
    }

    /// `*` or absent means every property
    pub fn properties(&self, raw: Option<&str>) -> Result<Option<Vec<String>>> {
        let Some(raw) = raw else {
            return Ok(None);
        };
        if raw.trim() == "*" {
            return Ok(None);
        }

        let mut names: Vec<String> = Vec::new();
        for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let field = self.field(name, "properties")?;
            if !names.contains(&field.name) {
                names.push(field.name.clone());
            }
        }
        Ok(Some(names))
    }

    /// RFC 3339 instant or `start/end` interval with `..` or empty open ends
    pub fn datetime(&self, raw: Option<&str>) -> Result<Option<TemporalInterval>> {
        let Some(raw) = raw else {
            return Ok(None);
        };

        let interval = match raw.split_once('/') {
            None => TemporalInterval::instant(parse_instant(raw)?),
            Some((start, end)) => {
                let start = parse_open_end(start)?;
                let end = parse_open_end(end)?;
                if let (Some(start), Some(end)) = (start, end) {
                    if start > end {
                        return Err(GeoqueryError::parse(
                            format!("Interval start {} is after its end {}", start, end),
                            "datetime",
                        ));
                    }
                }
                if start.is_none() && end.is_none() {
                    return Ok(None);
                }
                TemporalInterval { start, end }
            }
        };

        if self.layer.temporal_field.is_none() {
            return Err(GeoqueryError::field_validation(
                "datetime",
                format!("Layer '{}' has no temporal field", self.layer.name),
            ));
        }
        Ok(Some(interval))
    }

    pub fn result_type(&self, params: &RequestParams) -> Result<ResultType> {
        if let Some(raw) = params.first(params::COUNT_ONLY) {
            if parse_flag(raw, "returnCountOnly")? {
                return Ok(ResultType::Hits);
            }
        }
        match params.first(params::RESULT_TYPE).map(|r| r.trim().to_ascii_lowercase()) {
            None => Ok(ResultType::Results),
            Some(value) if value == "results" => Ok(ResultType::Results),
            Some(value) if value == "hits" => Ok(ResultType::Hits),
            Some(other) => Err(GeoqueryError::parse(format!("Unknown result type '{}'", other), "resultType")),
        }
    }

    fn field(&self, name: &str, parameter: &str) -> Result<&'a FieldDefinition> {
        self.layer.catalog.resolve(name).ok_or_else(|| {
            GeoqueryError::field_validation(name, format!("Unknown field '{}' in {}", name, parameter))
        })
    }

    fn queryable(&self, name: &str, parameter: &str) -> Result<&'a FieldDefinition> {
        let field = self.field(name, parameter)?;
        if !field.queryable {
            return Err(GeoqueryError::field_validation(
                &field.name,
                format!("Field '{}' is not queryable", field.name),
            ));
        }
        Ok(field)
    }
}

/// Parse `minx,miny,maxx,maxy` or the six-number 3D form, with an optional
/// trailing CRS token
pub fn parse_bbox(raw: &str) -> Result<BoundingBox> {
    let mut tokens: Vec<&str> = raw.split(',').map(str::trim).collect();

    let crs = match tokens.last() {
        Some(last) if last.parse::<f64>().is_err() && tokens.len() > 1 => {
            let crs = Crs::parse(last).map_err(|_| relocate(last, "bbox"))?;
            tokens.pop();
            Some(crs)
        }
        _ => None,
    };

    let numbers = tokens
        .iter()
        .map(|t| t.parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect::<Option<Vec<f64>>>()
        .ok_or_else(|| GeoqueryError::parse(format!("Invalid bbox '{}'", raw), "bbox"))?;

    let bbox = match numbers.as_slice() {
        [min_x, min_y, max_x, max_y] => BoundingBox::new(*min_x, *min_y, *max_x, *max_y)?,
        [min_x, min_y, min_z, max_x, max_y, max_z] => {
            BoundingBox::new_3d([*min_x, *min_y, *min_z], [*max_x, *max_y, *max_z])?
        }
        other => {
            return Err(GeoqueryError::parse(
                format!("bbox needs 4 or 6 numbers, got {}", other.len()),
                "bbox",
            ))
        }
    };

    Ok(match crs {
        Some(crs) => bbox.with_crs(crs),
        None => bbox,
    })
}

/// CRS identifier, or an Esri `{"wkid": n}` spatial reference
fn parse_output_crs(raw: &str) -> Result<Crs> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        let value: serde_json::Value =
            serde_json::from_str(trimmed).map_err(|e| GeoqueryError::parse(format!("Invalid outSR: {}", e), "crs"))?;
        let wkid = value
            .get("latestWkid")
            .or_else(|| value.get("wkid"))
            .and_then(serde_json::Value::as_u64)
            .and_then(|w| u32::try_from(w).ok())
            .ok_or_else(|| GeoqueryError::parse("outSR has no wkid", "crs"))?;
        return Crs::parse(&wkid.to_string());
    }
    Crs::parse(trimmed)
}

fn relocate(raw: &str, locator: &str) -> GeoqueryError {
    GeoqueryError::parse(format!("Unrecognized CRS identifier '{}'", raw), locator)
}

fn parse_instant(raw: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    let raw = raw.trim();
    if raw.len() == 10 {
        parse_date(raw, "datetime")
    } else {
        parse_timestamp(raw, "datetime")
    }
}

fn parse_open_end(raw: &str) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    match raw.trim() {
        "" | ".." => Ok(None),
        value => parse_instant(value).map(Some),
    }
}

fn parse_flag(raw: &str, parameter: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(GeoqueryError::parse(format!("Expected true or false, got '{}'", other), parameter)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoquery_core::models::{FieldCatalog, FieldType};
    use geoquery_core::ErrorKind;

    fn layer() -> LayerPolicy {
        let catalog = FieldCatalog::new(vec![
            FieldDefinition::new("id", FieldType::Integer),
            FieldDefinition::new("name", FieldType::String),
            FieldDefinition::new("secret", FieldType::String).hidden(),
            FieldDefinition::new("updated", FieldType::DateTime),
            FieldDefinition::geometry("geom", Crs::wgs84()),
        ])
        .with_primary_key("id");
        let mut layer = LayerPolicy::new("parcels", "parcels", catalog);
        layer.max_record_count = Some(500);
        layer.supported_crs = vec![Crs::wgs84(), Crs::web_mercator()];
        layer.temporal_field = Some("updated".into());
        layer
    }

    #[test]
    fn test_limit_clamps_to_layer_max() {
        let (layer, service) = (layer(), ServicePolicy::default());
        let resolver = QueryConstraintResolver::new(&layer, &service);

        assert_eq!(resolver.limit(Some("5000"), false).unwrap(), 500);
        assert_eq!(resolver.limit(None, false).unwrap(), 10);
        assert_eq!(resolver.limit(Some("99999999999999"), false).unwrap(), 500);
    }

    #[test]
    fn test_limit_rejects_malformed_values() {
        let (layer, service) = (layer(), ServicePolicy::default());
        let resolver = QueryConstraintResolver::new(&layer, &service);

        assert_eq!(resolver.limit(Some("-1"), false).unwrap_err().kind(), ErrorKind::Limit);
        assert_eq!(resolver.limit(Some("ten"), false).unwrap_err().kind(), ErrorKind::Limit);
        assert!(resolver.limit(Some("0"), false).is_err());
        assert_eq!(resolver.limit(Some("0"), true).unwrap(), 0);
    }

    #[test]
    fn test_offset() {
        let (layer, service) = (layer(), ServicePolicy::default());
        let resolver = QueryConstraintResolver::new(&layer, &service);

        assert_eq!(resolver.offset(None).unwrap(), 0);
        assert_eq!(resolver.offset(Some("1000000")).unwrap(), 1_000_000);
        assert_eq!(resolver.offset(Some("-3")).unwrap_err().kind(), ErrorKind::Limit);
    }

    #[test]
    fn test_bbox_without_crs() {
        let bbox = parse_bbox("-10,40,10,60").unwrap();
        assert_eq!(bbox, BoundingBox::new(-10.0, 40.0, 10.0, 60.0).unwrap());
        assert_eq!(bbox.crs, None);
    }

    #[test]
    fn test_bbox_with_crs_suffix() {
        let bbox = parse_bbox("-10,40,10,60,EPSG:3857").unwrap();
        assert_eq!(bbox.crs, Some(Crs::web_mercator()));

        let bbox = parse_bbox("0,0,0,1,1,5,urn:ogc:def:crs:EPSG::4326").unwrap();
        assert_eq!(bbox.max_z, Some(5.0));
        assert_eq!(bbox.crs, Some(Crs::wgs84()));
    }

    #[test]
    fn test_bbox_errors() {
        assert_eq!(parse_bbox("1,2,3").unwrap_err().kind(), ErrorKind::Parse);
        assert_eq!(parse_bbox("1,2,x,4").unwrap_err().kind(), ErrorKind::Parse);
        assert_eq!(parse_bbox("10,0,0,10").unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(parse_bbox("0,0,1,1,NOT-A-CRS").unwrap_err().kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_bbox_crs_parameter_applies_without_suffix() {
        let (layer, service) = (layer(), ServicePolicy::default());
        let resolver = QueryConstraintResolver::new(&layer, &service);

        let bbox = resolver.bbox(Some("0,0,1,1"), Some("EPSG:3857")).unwrap().unwrap();
        assert_eq!(bbox.crs, Some(Crs::web_mercator()));

        let bbox = resolver.bbox(Some("0,0,1,1,EPSG:4326"), Some("EPSG:3857")).unwrap().unwrap();
        assert_eq!(bbox.crs, Some(Crs::wgs84()));
    }

    #[test]
    fn test_output_crs_priority_chain() {
        let mut layer = layer();
        let mut service = ServicePolicy::default();
        service.default_crs = Some(Crs::new(3035));

        let resolver = QueryConstraintResolver::new(&layer, &service);
        assert_eq!(resolver.output_crs(Some("EPSG:3857")).unwrap(), Crs::web_mercator());
        assert_eq!(resolver.output_crs(Some("EPSG:2154")).unwrap(), Crs::new(3035));
        assert_eq!(resolver.output_crs(Some("{\"wkid\": 102100, \"latestWkid\": 3857}")).unwrap(), Crs::web_mercator());
        assert_eq!(resolver.output_crs(Some("garbage")).unwrap_err().kind(), ErrorKind::Parse);

        layer.default_crs = Some(Crs::web_mercator());
        let resolver = QueryConstraintResolver::new(&layer, &service);
        assert_eq!(resolver.output_crs(None).unwrap(), Crs::web_mercator());

        let bare = ServicePolicy::default();
        let plain = LayerPolicy::new("p", "p", FieldCatalog::default());
        assert_eq!(QueryConstraintResolver::new(&plain, &bare).output_crs(None).unwrap(), Crs::wgs84());
    }

    #[test]
    fn test_sort_forms() {
        let (layer, service) = (layer(), ServicePolicy::default());
        let resolver = QueryConstraintResolver::new(&layer, &service);

        let orders = resolver.sort(Some("-name, id:asc,NAME D")).unwrap();
        assert_eq!(
            orders,
            vec![SortOrder::descending("name"), SortOrder::ascending("id"), SortOrder::descending("name")]
        );
        assert_eq!(resolver.sort(None).unwrap(), vec![SortOrder::ascending("id")]);
    }

    #[test]
    fn test_sort_rejections() {
        let (layer, service) = (layer(), ServicePolicy::default());
        let resolver = QueryConstraintResolver::new(&layer, &service);

        assert_eq!(resolver.sort(Some("geom")).unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(resolver.sort(Some("missing")).unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(resolver.sort(Some("secret")).unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(resolver.sort(Some("name:sideways")).unwrap_err().kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_properties() {
        let (layer, service) = (layer(), ServicePolicy::default());
        let resolver = QueryConstraintResolver::new(&layer, &service);

        assert_eq!(resolver.properties(Some("*")).unwrap(), None);
        assert_eq!(resolver.properties(Some("NAME,id,name")).unwrap(), Some(vec!["name".into(), "id".into()]));
        assert!(resolver.properties(Some("nope")).is_err());
    }

    #[test]
    fn test_datetime_forms() {
        let (layer, service) = (layer(), ServicePolicy::default());
        let resolver = QueryConstraintResolver::new(&layer, &service);

        let instant = resolver.datetime(Some("2024-05-01T12:00:00Z")).unwrap().unwrap();
        assert!(instant.is_instant());

        let open = resolver.datetime(Some("2024-01-01/..")).unwrap().unwrap();
        assert!(open.start.is_some() && open.end.is_none());

        assert_eq!(resolver.datetime(Some("../")).unwrap(), None);
        assert_eq!(resolver.datetime(Some("yesterday")).unwrap_err().kind(), ErrorKind::Parse);
        assert!(resolver.datetime(Some("2024-02-01/2024-01-01")).is_err());
    }

    #[test]
    fn test_resolve_hits_allows_zero_limit() {
        let (layer, service) = (layer(), ServicePolicy::default());
        let resolver = QueryConstraintResolver::new(&layer, &service);
        let params = RequestParams::new().with("resultType", "hits").with("count", "0");

        let resolved = resolver.resolve(&params).unwrap();
        assert_eq!(resolved.result_type, ResultType::Hits);
        assert_eq!(resolved.limit, 0);
    }

    #[test]
    fn test_return_count_only_means_hits() {
        let (layer, service) = (layer(), ServicePolicy::default());
        let resolver = QueryConstraintResolver::new(&layer, &service);
        let params = RequestParams::new().with("returnCountOnly", "true").with("returnGeometry", "false");

        let resolved = resolver.resolve(&params).unwrap();
        assert_eq!(resolved.result_type, ResultType::Hits);
        assert!(!resolved.include_geometry);
    }
}
