use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::{Number, Value};
use std::collections::HashSet;
use std::fmt;

use crate::error::RpcError;

/// One call inside a request payload
///
/// Every field is optional on the wire so that a record with a missing or
/// malformed id still decodes and can be answered individually.
#[derive(Debug, Deserialize)]
pub struct RequestRecord {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Option<Box<RawValue>>,
    #[serde(default)]
    pub id: Value,
}

impl RequestRecord {
    /// Raw parameter text; an absent parameter reads as `null`
    pub fn params_text(&self) -> &str {
        self.params.as_deref().map_or("null", RawValue::get)
    }

    /// The id, if it is a number or a string
    pub fn request_id(&self) -> Option<RequestId> {
        RequestId::from_value(&self.id)
    }
}

/// A valid request id: a JSON number or string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(Number),
    String(String),
}

impl RequestId {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(RequestId::Number(n.clone())),
            Value::String(s) => Some(RequestId::String(s.clone())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RequestId::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RequestId::Number(n) => n.as_i64(),
            _ => None,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n.into())
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}

/// Key used to detect repeated ids within one payload. Numbers compare by
/// value (`1` and `1.0` collide); anything else compares by its JSON text.
#[derive(PartialEq, Eq, Hash)]
enum IdKey {
    Number(u64),
    String(String),
    Other(String),
}

impl IdKey {
    fn of(id: &Value) -> Self {
        match id {
            Value::Number(n) => match n.as_f64() {
                // + 0.0 folds -0.0 into 0.0
                Some(f) => IdKey::Number((f + 0.0).to_bits()),
                None => IdKey::Other(n.to_string()),
            },
            Value::String(s) => IdKey::String(s.clone()),
            other => IdKey::Other(other.to_string()),
        }
    }
}

/// Split a request body into its records.
///
/// A body whose first non-blank byte is `{` is a single record; anything
/// else must be a non-empty array of records with pairwise distinct ids.
pub fn parse_requests(body: &[u8]) -> Result<Vec<RequestRecord>, RpcError> {
    let body = body.trim_ascii();

    let records = if body.first() == Some(&b'{') {
        vec![decode::<RequestRecord>(body)?]
    } else {
        decode::<Vec<RequestRecord>>(body)?
    };

    if records.is_empty() {
        return Err(RpcError::invalid_request("empty batch"));
    }

    let mut seen = HashSet::with_capacity(records.len());
    for record in &records {
        if !seen.insert(IdKey::of(&record.id)) {
            return Err(RpcError::invalid_request("ids must be unique"));
        }
    }

    Ok(records)
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, RpcError> {
    let mut de = serde_json::Deserializer::from_slice(body);
    let value = serde_path_to_error::deserialize(&mut de)
        .map_err(|err| RpcError::parse_field_error("cannot parse request", err, body))?;
    de.end()
        .map_err(|err| RpcError::parse_error("cannot parse request", err, body))?;
    Ok(value)
}
