//! Page request shapes and their static validation

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::normalize_version;
use crate::error::{Error, Result};
use crate::types::Challenge;
use crate::MAX_TIMEOUT_SECS;

/// Enroll request from a page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollRequest {
    /// New registrations to create, at most one per version
    pub enroll_challenges: Vec<Challenge>,

    /// Existing registrations, so the device can detect re-enrollment
    #[serde(default)]
    pub sign_data: Vec<Challenge>,

    /// Ceremony timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_msg_url: Option<String>,

    /// Opaque id echoed in the reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Value>,
}

impl EnrollRequest {
    /// Parse and validate a raw page request
    pub fn from_value(value: Value) -> Result<Self> {
        let request: Self = serde_json::from_value(value)?;
        request.validate()?;
        Ok(request)
    }

    /// Check the request shape
    pub fn validate(&self) -> Result<()> {
        if self.enroll_challenges.is_empty() {
            return Err(Error::InvalidRequest(
                "enrollChallenges is empty".to_string(),
            ));
        }

        let mut versions = HashSet::new();
        for challenge in &self.enroll_challenges {
            let version = normalize_version(challenge);
            if !versions.insert(version) {
                return Err(Error::InvalidRequest(format!(
                    "more than one enroll challenge for {}",
                    version
                )));
            }
        }

        Ok(())
    }

    /// Ceremony timeout, `default` when absent or not positive
    pub fn timeout_or(&self, default: Duration) -> Duration {
        timeout_or(self.timeout, default)
    }
}

/// Sign request from a page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest {
    /// Registrations the page will accept a signature from
    pub sign_data: Vec<Challenge>,

    /// Ceremony timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_msg_url: Option<String>,
}

impl SignRequest {
    /// Parse and validate a raw page request
    pub fn from_value(value: Value) -> Result<Self> {
        let request: Self = serde_json::from_value(value)?;
        request.validate()?;
        Ok(request)
    }

    /// Check the request shape
    pub fn validate(&self) -> Result<()> {
        if self.sign_data.is_empty() {
            return Err(Error::InvalidRequest("signData is empty".to_string()));
        }
        Ok(())
    }

    /// Ceremony timeout, `default` when absent or not positive
    pub fn timeout_or(&self, default: Duration) -> Duration {
        timeout_or(self.timeout, default)
    }
}

/// Page timeouts above [`MAX_TIMEOUT_SECS`] are clamped to it
fn timeout_or(timeout: Option<f64>, default: Duration) -> Duration {
    let max = Duration::from_secs(MAX_TIMEOUT_SECS);
    match timeout {
        Some(secs) if secs.is_finite() && secs > 0.0 => {
            Duration::try_from_secs_f64(secs).map_or(max, |timeout| timeout.min(max))
        }
        _ => default,
    }
}
