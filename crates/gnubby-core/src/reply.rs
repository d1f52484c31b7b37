//! Replies delivered to a page

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::status::ErrorCode;
use crate::types::{Challenge, Version};

/// A reply to a page request
///
/// Response fields are flattened next to `type` and `code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebReply {
    #[serde(rename = "type")]
    pub reply_type: String,

    pub code: ErrorCode,

    #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Value>,

    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl WebReply {
    /// Error reply carrying only a code
    pub fn error(reply_type: &str, code: ErrorCode, request_id: Option<Value>) -> Self {
        Self {
            reply_type: reply_type.to_string(),
            code,
            request_id,
            data: Map::new(),
        }
    }

    /// Successful reply carrying response fields
    pub fn success(reply_type: &str, data: Map<String, Value>, request_id: Option<Value>) -> Self {
        Self {
            reply_type: reply_type.to_string(),
            code: ErrorCode::Ok,
            request_id,
            data,
        }
    }
}

/// Response fields for a finished enrollment
///
/// Starts from every field of the page's own challenge so caller-only
/// fields survive, then records the version the device enrolled with.
pub fn enroll_response_data(
    challenge: &Challenge,
    version: Version,
    enroll_data: &str,
    browser_data: Option<&str>,
) -> Map<String, Value> {
    let mut data = challenge.to_fields();
    data.insert("version".to_string(), Value::String(version.to_string()));
    data.insert(
        "enrollData".to_string(),
        Value::String(enroll_data.to_string()),
    );
    if let Some(browser_data) = browser_data {
        data.insert(
            "browserData".to_string(),
            Value::String(browser_data.to_string()),
        );
    }
    data
}

/// Response fields for a finished signature
pub fn sign_response_data(
    challenge: &Challenge,
    signature_data: &str,
    browser_data: &str,
) -> Map<String, Value> {
    let mut data = challenge.to_fields();
    data.insert(
        "signatureData".to_string(),
        Value::String(signature_data.to_string()),
    );
    data.insert(
        "browserData".to_string(),
        Value::String(browser_data.to_string()),
    );
    data
}
