//! Row decoding into feature records

use crate::statement::{GEOMETRY_COLUMN, ID_COLUMN};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use geoquery_core::error::{GeoqueryError, Result};
use geoquery_core::models::FeatureRecord;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo};
use std::collections::HashMap;

pub(super) fn decode(row: &PgRow) -> Result<FeatureRecord> {
    let mut record = FeatureRecord::new(HashMap::with_capacity(row.columns().len()));

    for (index, column) in row.columns().iter().enumerate() {
        let value = column_value(row, index, column.type_info().name())?;
        match column.name() {
            ID_COLUMN => record.id = (!value.is_null()).then_some(value),
            GEOMETRY_COLUMN => record.geometry = geometry_value(value)?,
            name => {
                record.properties.insert(name.to_string(), value);
            }
        }
    }

    Ok(record)
}

fn decode_error(index: usize, e: sqlx::Error) -> GeoqueryError {
    GeoqueryError::Execution(format!("Failed to decode column {}: {}", index, e))
}

fn column_value(row: &PgRow, index: usize, type_name: &str) -> Result<Value> {
    let err = |e| decode_error(index, e);
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index).map_err(err)?.map(Value::from),
        "INT2" => row.try_get::<Option<i16>, _>(index).map_err(err)?.map(Value::from),
        "INT4" => row.try_get::<Option<i32>, _>(index).map_err(err)?.map(Value::from),
        "INT8" => row.try_get::<Option<i64>, _>(index).map_err(err)?.map(Value::from),
        "FLOAT4" => row.try_get::<Option<f32>, _>(index).map_err(err)?.map(Value::from),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index).map_err(err)?.map(Value::from),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)
            .map_err(err)?
            .map(|t| Value::from(t.to_rfc3339())),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)
            .map_err(err)?
            .map(|t| Value::from(t.and_utc().to_rfc3339())),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)
            .map_err(err)?
            .map(|d| Value::from(d.to_string())),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(index).map_err(err)?,
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            row.try_get::<Option<String>, _>(index).map_err(err)?.map(Value::from)
        }
        other => match row.try_get::<Option<String>, _>(index) {
            Ok(text) => text.map(Value::from),
            Err(_) => {
                tracing::warn!(column = index, type_name = other, "Unsupported column type, returning null");
                None
            }
        },
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Geometry arrives as GeoJSON text from `ST_AsGeoJSON`
fn geometry_value(value: Value) -> Result<Option<Value>> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| GeoqueryError::Serialization(format!("Invalid GeoJSON from database: {}", e))),
        other => Ok(Some(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_geometry_text_is_parsed() {
        let geometry = geometry_value(json!("{\"type\":\"Point\",\"coordinates\":[1,2]}")).unwrap();
        assert_eq!(geometry, Some(json!({"type": "Point", "coordinates": [1, 2]})));
    }

    #[test]
    fn test_null_geometry_is_absent() {
        assert_eq!(geometry_value(Value::Null).unwrap(), None);
    }

    #[test]
    fn test_garbage_geometry_is_an_error() {
        assert!(geometry_value(json!("POINT(1 2)")).is_err());
    }
}
