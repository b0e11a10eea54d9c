//! MySQL rows to flat JSON rows.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

use relmap::{MapperError, Row};

fn decode_error(column: &str, err: impl std::fmt::Display) -> MapperError {
    MapperError::invalid(format!("cannot decode column {column}: {err}"))
}

/// Decode every column of a row, keyed by column name.
pub fn decode_row(row: &MySqlRow) -> Result<Row, MapperError> {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, idx, column.name(), column.type_info().name())?;
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

fn float(n: Option<f64>) -> JsonValue {
    n.and_then(serde_json::Number::from_f64)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

/// Decode one column based on its MySQL type name.
fn decode_column(
    row: &MySqlRow,
    idx: usize,
    name: &str,
    type_name: &str,
) -> Result<JsonValue, MapperError> {
    let raw = row.try_get_raw(idx).map_err(|e| decode_error(name, e))?;
    if raw.is_null() {
        return Ok(JsonValue::Null);
    }

    let value = match type_name {
        "BOOLEAN" => {
            let v: Option<bool> = row.try_get(idx).map_err(|e| decode_error(name, e))?;
            v.map(JsonValue::Bool).unwrap_or(JsonValue::Null)
        }
        t if t.ends_with("INT UNSIGNED") => {
            let v: Option<u64> = row.try_get(idx).map_err(|e| decode_error(name, e))?;
            v.map(JsonValue::from).unwrap_or(JsonValue::Null)
        }
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            let v: Option<i64> = row.try_get(idx).map_err(|e| decode_error(name, e))?;
            v.map(JsonValue::from).unwrap_or(JsonValue::Null)
        }
        "FLOAT" => {
            let v: Option<f32> = row.try_get(idx).map_err(|e| decode_error(name, e))?;
            float(v.map(f64::from))
        }
        "DOUBLE" => {
            let v: Option<f64> = row.try_get(idx).map_err(|e| decode_error(name, e))?;
            float(v)
        }
        "TIMESTAMP" => {
            let v: Option<DateTime<Utc>> = row.try_get(idx).map_err(|e| decode_error(name, e))?;
            v.map(|dt| JsonValue::String(dt.to_rfc3339_opts(SecondsFormat::Micros, true)))
                .unwrap_or(JsonValue::Null)
        }
        "DATETIME" => {
            let v: Option<NaiveDateTime> = row.try_get(idx).map_err(|e| decode_error(name, e))?;
            v.map(|dt| JsonValue::String(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()))
                .unwrap_or(JsonValue::Null)
        }
        "DATE" => {
            let v: Option<NaiveDate> = row.try_get(idx).map_err(|e| decode_error(name, e))?;
            v.map(|d| JsonValue::String(d.to_string()))
                .unwrap_or(JsonValue::Null)
        }
        "TIME" => {
            let v: Option<NaiveTime> = row.try_get(idx).map_err(|e| decode_error(name, e))?;
            v.map(|t| JsonValue::String(t.to_string()))
                .unwrap_or(JsonValue::Null)
        }
        "JSON" => {
            let v: Option<JsonValue> = row.try_get(idx).map_err(|e| decode_error(name, e))?;
            v.unwrap_or(JsonValue::Null)
        }
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" | "BIT"
        | "GEOMETRY" => {
            let v: Option<Vec<u8>> = row
                .try_get_unchecked(idx)
                .map_err(|e| decode_error(name, e))?;
            v.map(|bytes| JsonValue::String(String::from_utf8_lossy(&bytes).into_owned()))
                .unwrap_or(JsonValue::Null)
        }
        _ => {
            // DECIMAL arrives as text; so do VARCHAR, TEXT, ENUM and SET
            let v: Option<String> = row
                .try_get_unchecked(idx)
                .map_err(|e| decode_error(name, e))?;
            v.map(JsonValue::String).unwrap_or(JsonValue::Null)
        }
    };

    Ok(value)
}
