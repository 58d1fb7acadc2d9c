use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorObject;
use crate::request::RequestId;

/// The answer to one request record
///
/// Exactly one of `result` and `error` is present. `id` echoes the request
/// id, or is `null` when the request carried no valid id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
    pub id: Option<RequestId>,
}

impl ResponseRecord {
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<RequestId>, error: ErrorObject) -> Self {
        Self {
            result: None,
            error: Some(error),
            id,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A complete response body: a bare record for a single request, an array
/// for a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    Single(ResponseRecord),
    Batch(Vec<ResponseRecord>),
}

impl Envelope {
    /// A single record stays bare, several become an array
    pub fn from_records(mut records: Vec<ResponseRecord>) -> Self {
        if records.len() == 1 {
            if let Some(record) = records.pop() {
                return Envelope::Single(record);
            }
        }
        Envelope::Batch(records)
    }

    /// Pretty-printed JSON (two-space indent) with a trailing newline
    pub fn to_body(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut body = serde_json::to_vec_pretty(self)?;
        body.push(b'\n');
        Ok(body)
    }
}
