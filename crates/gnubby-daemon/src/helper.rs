//! Device helper seam
//!
//! A helper owns the transport to the security key. Ceremonies only see the
//! [`Helper`] trait and the JSON messages defined here, so a physical
//! transport, a socket bridge and a test double are interchangeable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use gnubby_core::{
    DeviceStatus, EncodedEnrollChallenge, EncodedSignChallenge, Version, ENROLL_HELPER_REPLY,
    ENROLL_HELPER_REQUEST, SIGN_HELPER_REPLY, SIGN_HELPER_REQUEST,
};

use crate::error::Result;

/// Enrollment request sent to a helper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollHelperRequest {
    #[serde(rename = "type")]
    pub request_type: String,

    pub enroll_challenges: Vec<EncodedEnrollChallenge>,

    pub sign_data: Vec<EncodedSignChallenge>,

    /// Seconds left in the ceremony
    pub timeout: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_msg_url: Option<String>,
}

impl EnrollHelperRequest {
    pub fn new(
        enroll_challenges: Vec<EncodedEnrollChallenge>,
        sign_data: Vec<EncodedSignChallenge>,
        timeout: f64,
        log_msg_url: Option<String>,
    ) -> Self {
        Self {
            request_type: ENROLL_HELPER_REQUEST.to_string(),
            enroll_challenges,
            sign_data,
            timeout,
            log_msg_url,
        }
    }
}

/// Enrollment reply from a helper
///
/// Any `code`, including OK_STATUS, marks the reply as a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollHelperReply {
    #[serde(rename = "type")]
    pub reply_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<DeviceStatus>,

    /// Version the device enrolled with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enroll_data: Option<String>,
}

impl EnrollHelperReply {
    pub fn error(code: DeviceStatus) -> Self {
        Self {
            reply_type: ENROLL_HELPER_REPLY.to_string(),
            code: Some(code),
            version: None,
            enroll_data: None,
        }
    }

    pub fn success(version: Version, enroll_data: impl Into<String>) -> Self {
        Self {
            reply_type: ENROLL_HELPER_REPLY.to_string(),
            code: None,
            version: Some(version),
            enroll_data: Some(enroll_data.into()),
        }
    }
}

/// Sign request sent to a helper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignHelperRequest {
    #[serde(rename = "type")]
    pub request_type: String,

    pub sign_data: Vec<EncodedSignChallenge>,

    /// Seconds left in the ceremony
    pub timeout: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_msg_url: Option<String>,
}

impl SignHelperRequest {
    pub fn new(
        sign_data: Vec<EncodedSignChallenge>,
        timeout: f64,
        log_msg_url: Option<String>,
    ) -> Self {
        Self {
            request_type: SIGN_HELPER_REQUEST.to_string(),
            sign_data,
            timeout,
            log_msg_url,
        }
    }
}

/// What the device signed, and which challenge it signed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignResponseData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_handle: Option<String>,

    pub challenge_hash: String,

    pub signature_data: String,
}

/// Sign reply from a helper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignHelperReply {
    #[serde(rename = "type")]
    pub reply_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<DeviceStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_data: Option<SignResponseData>,

    /// Which transport produced the reply, for diagnostics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl SignHelperReply {
    pub fn error(code: DeviceStatus) -> Self {
        Self {
            reply_type: SIGN_HELPER_REPLY.to_string(),
            code: Some(code),
            response_data: None,
            source: None,
        }
    }

    pub fn success(response_data: SignResponseData) -> Self {
        Self {
            reply_type: SIGN_HELPER_REPLY.to_string(),
            code: None,
            response_data: Some(response_data),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// One device transport session
#[async_trait]
pub trait Helper: Send {
    /// Run an enrollment; transport failures come back as a reply code
    async fn do_enroll(&mut self, request: EnrollHelperRequest) -> EnrollHelperReply;

    /// Run a signature
    ///
    /// `Err` means the request could not be submitted at all; no reply
    /// will follow and the ceremony fails as a bad request.
    async fn do_sign(&mut self, request: SignHelperRequest) -> Result<SignHelperReply>;

    /// Release the transport; safe to call with nothing submitted
    fn close(&mut self);
}

/// Creates one helper per ceremony
pub trait HelperFactory: Send + Sync {
    fn create_helper(&self) -> Box<dyn Helper>;
}
