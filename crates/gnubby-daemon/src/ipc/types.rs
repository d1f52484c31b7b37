//! Page channel message types

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::requests::MessageSender;

/// One inbound line on a page connection
///
/// The request stays raw JSON until its `type` picks an entry point, so
/// a malformed request can still be answered with the right reply type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMessage {
    pub sender: MessageSender,
    pub request: Value,
}

impl PageMessage {
    /// Value of the request's `type` member
    pub fn request_type(&self) -> Option<&str> {
        self.request.get("type").and_then(Value::as_str)
    }
}
