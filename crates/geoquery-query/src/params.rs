//! Raw request parameters
//!
//! WFS, OGC API Features and GeoServices REST spell the same concepts with
//! different parameter names. Lookups are case-insensitive and go through
//! the alias lists below, first match wins.

use std::fmt;

pub const LIMIT: &[&str] = &["limit", "count", "maxFeatures", "resultRecordCount"];
pub const OFFSET: &[&str] = &["offset", "startIndex", "resultOffset"];
pub const BBOX: &[&str] = &["bbox"];
pub const BBOX_CRS: &[&str] = &["bbox-crs"];
pub const CRS: &[&str] = &["crs", "srsName", "outSR"];
pub const SORT: &[&str] = &["sortby", "orderByFields"];
pub const PROPERTIES: &[&str] = &["properties", "propertyName", "outFields"];
pub const DATETIME: &[&str] = &["datetime", "time"];
pub const RESULT_TYPE: &[&str] = &["resultType"];
pub const COUNT_ONLY: &[&str] = &["returnCountOnly"];
pub const RETURN_GEOMETRY: &[&str] = &["returnGeometry"];
pub const FILTER: &[&str] = &["filter", "cql_filter"];
pub const FILTER_LANG: &[&str] = &["filter-lang", "filter_language"];
pub const FILTER_CRS: &[&str] = &["filter-crs"];

/// Ordered key/value pairs from a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParams {
    pairs: Vec<(String, String)>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Parse `key=value` strings, as given on a command line
    pub fn from_assignments<I, S>(items: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut params = Self::new();
        for item in items {
            let (key, value) = item.as_ref().split_once('=')?;
            params.insert(key.trim(), value);
        }
        Some(params)
    }

    /// Value of the first pair whose key matches `key` ignoring case
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// First alias present, with the name the client used
    pub fn lookup(&self, aliases: &[&str]) -> Option<(&str, &str)> {
        aliases.iter().find_map(|alias| {
            self.pairs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(alias))
                .map(|(k, v)| (k.as_str(), v.as_str()))
        })
    }

    /// Value of the first alias present; blank values count as absent
    pub fn first(&self, aliases: &[&str]) -> Option<&str> {
        self.lookup(aliases).map(|(_, v)| v).filter(|v| !v.trim().is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RequestParams {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self { pairs: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

impl fmt::Display for RequestParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        Ok(())
    }
}
