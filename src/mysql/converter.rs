// ABOUTME: MySQL to JSON value conversion for browser and query responses
// ABOUTME: Renders dates and times as strings and binary data as base64

use anyhow::{Context, Result};
use mysql_async::{Row, Value};
use serde_json::{Map, Value as JsonValue};

use crate::engine::Record;

/// Convert a MySQL Value to a JSON Value for display
///
/// - Integers -> JSON numbers
/// - Floats/Doubles -> JSON numbers (non-finite as strings)
/// - Strings (text protocol returns everything as bytes) -> JSON strings
/// - Binary data that is not UTF-8 -> `{"_type": "binary", "data": <base64>}`
/// - DATE/DATETIME/TIMESTAMP -> `YYYY-MM-DD HH:MM:SS[.ffffff]`
/// - TIME -> `[-]HH:MM:SS[.ffffff]` with days folded into hours
/// - NULL -> JSON null
///
/// # Examples
///
/// ```
/// # use mysql_async::Value;
/// # use mysql_panel::mysql::converter::mysql_value_to_json;
/// let json_val = mysql_value_to_json(&Value::Int(42)).unwrap();
/// assert_eq!(json_val, serde_json::json!(42));
/// ```
pub fn mysql_value_to_json(value: &Value) -> Result<JsonValue> {
    match value {
        Value::NULL => Ok(JsonValue::Null),

        Value::Int(i) => Ok(JsonValue::Number((*i).into())),
        Value::UInt(u) => Ok(JsonValue::Number((*u).into())),

        Value::Float(f) => float_to_json(f64::from(*f)),
        Value::Double(d) => float_to_json(*d),

        Value::Bytes(b) => match std::str::from_utf8(b) {
            Ok(s) => Ok(JsonValue::String(s.to_string())),
            Err(_) => {
                let encoded = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, b);
                Ok(serde_json::json!({
                    "_type": "binary",
                    "data": encoded
                }))
            }
        },

        Value::Date(year, month, day, hour, minute, second, micro) => {
            let mut rendered = format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            );
            if *micro > 0 {
                rendered.push_str(&format!(".{:06}", micro));
            }
            Ok(JsonValue::String(rendered))
        }

        Value::Time(is_negative, days, hours, minutes, seconds, micro) => {
            let sign = if *is_negative { "-" } else { "" };
            let total_hours = u64::from(*days) * 24 + u64::from(*hours);
            let mut rendered = format!("{}{:02}:{:02}:{:02}", sign, total_hours, minutes, seconds);
            if *micro > 0 {
                rendered.push_str(&format!(".{:06}", micro));
            }
            Ok(JsonValue::String(rendered))
        }
    }
}

fn float_to_json(value: f64) -> Result<JsonValue> {
    if value.is_finite() {
        serde_json::Number::from_f64(value)
            .map(JsonValue::Number)
            .ok_or_else(|| anyhow::anyhow!("Failed to convert float {} to JSON number", value))
    } else {
        Ok(JsonValue::String(value.to_string()))
    }
}

/// Convert a MySQL Row into a column-name keyed JSON object
///
/// Column names come from the result set metadata, so aliases in the query
/// are honoured. Duplicate column names keep the last value.
pub fn mysql_row_to_record(row: &Row) -> Result<Record> {
    let mut obj = Map::new();

    for (idx, column) in row.columns_ref().iter().enumerate() {
        let name = column.name_str().to_string();
        let json_val = match row.as_ref(idx) {
            Some(value) => mysql_value_to_json(value)
                .with_context(|| format!("Failed to convert column '{}' to JSON", name))?,
            None => JsonValue::Null,
        };
        obj.insert(name, json_val);
    }

    Ok(obj)
}
