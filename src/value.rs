//! Cell values and schema fields, plus decoding of the warehouse's string-typed cells.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::fmt;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// One materialized cell.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Timestamp(OffsetDateTime),
    /// Nested RECORD / REPEATED cells.
    Json(Json),
}

impl Value {
    pub fn is_null(&self) -> bool { matches!(self, Value::Null) }

    pub fn as_str(&self) -> Option<&str> {
        if let Value::String(s) = self { Some(s) } else { None }
    }
    pub fn as_i64(&self) -> Option<i64> {
        if let Value::Int(v) = self { Some(*v) } else { None }
    }
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(v) => Json::from(*v),
            Value::Float(v) => serde_json::Number::from_f64(*v).map(Json::Number).unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::Timestamp(ts) => Json::String(format_ts(ts)),
            Value::Json(j) => j.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => f.write_str(s),
            Value::Timestamp(ts) => f.write_str(&format_ts(ts)),
            Value::Json(j) => write!(f, "{j}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::String(s.to_string()) }
}
impl From<String> for Value {
    fn from(s: String) -> Self { Value::String(s) }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self { Value::Int(v) }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self { Value::Float(v) }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self { Value::Bool(v) }
}

fn format_ts(ts: &OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

/// Column type as reported by the schema. Legacy and standard names map to the same variant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    String,
    Bytes,
    Integer,
    Float,
    Numeric,
    Boolean,
    Timestamp,
    Date,
    Time,
    DateTime,
    Record,
    Json,
    Other(String),
}

impl From<String> for FieldType {
    fn from(s: String) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "STRING" => FieldType::String,
            "BYTES" => FieldType::Bytes,
            "INTEGER" | "INT64" => FieldType::Integer,
            "FLOAT" | "FLOAT64" => FieldType::Float,
            "NUMERIC" | "BIGNUMERIC" => FieldType::Numeric,
            "BOOLEAN" | "BOOL" => FieldType::Boolean,
            "TIMESTAMP" => FieldType::Timestamp,
            "DATE" => FieldType::Date,
            "TIME" => FieldType::Time,
            "DATETIME" => FieldType::DateTime,
            "RECORD" | "STRUCT" => FieldType::Record,
            "JSON" => FieldType::Json,
            _ => FieldType::Other(s),
        }
    }
}

impl From<FieldType> for String {
    fn from(t: FieldType) -> Self {
        match t {
            FieldType::String => "STRING".into(),
            FieldType::Bytes => "BYTES".into(),
            FieldType::Integer => "INTEGER".into(),
            FieldType::Float => "FLOAT".into(),
            FieldType::Numeric => "NUMERIC".into(),
            FieldType::Boolean => "BOOLEAN".into(),
            FieldType::Timestamp => "TIMESTAMP".into(),
            FieldType::Date => "DATE".into(),
            FieldType::Time => "TIME".into(),
            FieldType::DateTime => "DATETIME".into(),
            FieldType::Record => "RECORD".into(),
            FieldType::Json => "JSON".into(),
            FieldType::Other(s) => s,
        }
    }
}

/// One column descriptor of a result schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self { name: name.into(), field_type, mode: None, fields: Vec::new() }
    }

    pub fn is_repeated(&self) -> bool {
        self.mode.as_deref().map(|m| m.eq_ignore_ascii_case("REPEATED")).unwrap_or(false)
    }

    /// Decode one cell (`{"v": ...}` already unwrapped) according to this field.
    pub fn decode(&self, raw: &Json) -> Result<Value, String> {
        if raw.is_null() {
            return Ok(Value::Null);
        }
        if self.is_repeated() {
            let items = raw.as_array().ok_or_else(|| format!("{}: expected array for REPEATED field", self.name))?;
            let scalar = Field { mode: None, ..self.clone() };
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let v = item.get("v").unwrap_or(item);
                out.push(scalar.decode(v)?.to_json());
            }
            return Ok(Value::Json(Json::Array(out)));
        }
        if self.field_type == FieldType::Record {
            let cells = raw
                .get("f")
                .and_then(|f| f.as_array())
                .ok_or_else(|| format!("{}: expected {{\"f\": [...]}} for RECORD field", self.name))?;
            let mut obj = Map::new();
            for (sub, cell) in self.fields.iter().zip(cells) {
                let v = cell.get("v").unwrap_or(&Json::Null);
                obj.insert(sub.name.clone(), sub.decode(v)?.to_json());
            }
            return Ok(Value::Json(Json::Object(obj)));
        }

        let s = match raw {
            Json::String(s) => s.as_str(),
            // Some emulators send native JSON scalars.
            Json::Bool(b) => return Ok(Value::Bool(*b)),
            Json::Number(n) => return Ok(number_cell(&self.field_type, n)),
            other => return Ok(Value::Json(other.clone())),
        };

        match &self.field_type {
            FieldType::Integer => s
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| format!("{}: bad INTEGER {s:?}: {e}", self.name)),
            FieldType::Float => s
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| format!("{}: bad FLOAT {s:?}: {e}", self.name)),
            FieldType::Boolean => match s.to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(format!("{}: bad BOOLEAN {s:?}", self.name)),
            },
            FieldType::Timestamp => parse_epoch_seconds(s)
                .map(Value::Timestamp)
                .ok_or_else(|| format!("{}: bad TIMESTAMP {s:?}", self.name)),
            FieldType::Json => Ok(serde_json::from_str(s).map(Value::Json).unwrap_or_else(|_| Value::String(s.to_string()))),
            _ => Ok(Value::String(s.to_string())),
        }
    }
}

fn number_cell(t: &FieldType, n: &serde_json::Number) -> Value {
    match t {
        FieldType::Integer => n.as_i64().map(Value::Int).unwrap_or_else(|| Value::Float(n.as_f64().unwrap_or(f64::NAN))),
        FieldType::Timestamp => n
            .as_f64()
            .and_then(epoch_seconds)
            .map(Value::Timestamp)
            .unwrap_or(Value::Null),
        _ => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
    }
}

/// Timestamps arrive as (possibly scientific-notation) epoch seconds, e.g. "1.1360746E9".
fn parse_epoch_seconds(s: &str) -> Option<OffsetDateTime> {
    epoch_seconds(s.trim().parse().ok()?)
}

fn epoch_seconds(secs: f64) -> Option<OffsetDateTime> {
    if !secs.is_finite() { return None; }
    let nanos = (secs * 1_000_000.0).round() as i128 * 1_000;
    OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
}
