//! Core challenge types shared by the page and helper wire formats

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// U2F protocol version of a challenge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Version {
    /// Original U2F: the device signs the raw server challenge
    #[default]
    #[serde(rename = "U2F_V1")]
    V1,

    /// U2F with browser data: the device signs a hash of the browser data
    #[serde(rename = "U2F_V2")]
    V2,
}

impl Version {
    /// Wire name of the version
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::V1 => "U2F_V1",
            Version::V2 => "U2F_V2",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A challenge as supplied by the page
///
/// Fields the page adds beyond the U2F ones are kept in `extra` and echoed
/// back in the reply, since relying parties use them to correlate responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    /// App id scoping the credential
    #[serde(rename = "appId")]
    pub app_id: String,

    /// Opaque server challenge
    pub challenge: String,

    /// Protocol version; absent means U2F_V1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,

    /// Key handle of an existing registration
    #[serde(rename = "keyHandle", default, skip_serializing_if = "Option::is_none")]
    pub key_handle: Option<String>,

    /// Caller-only fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Challenge {
    pub fn new(app_id: impl Into<String>, challenge: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            challenge: challenge.into(),
            version: None,
            key_handle: None,
            extra: Map::new(),
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_key_handle(mut self, key_handle: impl Into<String>) -> Self {
        self.key_handle = Some(key_handle.into());
        self
    }

    /// All fields of the challenge as a JSON object, caller-only fields included
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = self.extra.clone();
        fields.insert("appId".to_string(), Value::String(self.app_id.clone()));
        fields.insert(
            "challenge".to_string(),
            Value::String(self.challenge.clone()),
        );
        if let Some(version) = self.version {
            fields.insert("version".to_string(), Value::String(version.to_string()));
        }
        if let Some(key_handle) = &self.key_handle {
            fields.insert("keyHandle".to_string(), Value::String(key_handle.clone()));
        }
        fields
    }
}

/// Enroll challenge in the form the device helper consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedEnrollChallenge {
    pub version: Version,

    /// Raw server challenge (V1) or web-safe base64 hash of the browser data (V2)
    pub challenge: String,

    /// Web-safe base64 SHA-256 of the app id
    #[serde(rename = "appIdHash")]
    pub app_id_hash: String,
}

/// Sign challenge in the form the device helper consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedSignChallenge {
    pub version: Version,

    /// Web-safe base64 SHA-256 of the signed input
    #[serde(rename = "challengeHash")]
    pub challenge_hash: String,

    /// Web-safe base64 SHA-256 of the app id
    #[serde(rename = "appIdHash")]
    pub app_id_hash: String,

    #[serde(rename = "keyHandle", default, skip_serializing_if = "Option::is_none")]
    pub key_handle: Option<String>,
}
