//! Gnubby Core - U2F wire types, challenge encoding and status tables
//!
//! This crate holds everything about a U2F enroll or sign ceremony that does
//! not need a clock, a socket or a device: the page request shapes, the
//! device-facing challenge encoding, and the translation from device status
//! codes to the codes a web page sees.

pub mod codec;
pub mod error;
pub mod reply;
pub mod request;
pub mod status;
pub mod types;

pub use codec::{
    build_browser_data, encode_enroll_challenge, encode_sign_challenge, hash_b64,
    normalize_version, BrowserDataKind,
};
pub use error::{Error, Result};
pub use reply::WebReply;
pub use request::{EnrollRequest, SignRequest};
pub use status::{enroll_error_for_status, sign_error_for_status, DeviceStatus, ErrorCode};
pub use types::{Challenge, EncodedEnrollChallenge, EncodedSignChallenge, Version};

/// Ceremony timeout used when the page supplies none (seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Longest ceremony timeout a page may ask for (seconds)
pub const MAX_TIMEOUT_SECS: u64 = 600;

/// Message type of an enroll request from a page
pub const ENROLL_WEB_REQUEST: &str = "enroll_web_request";

/// Message type of an enroll reply to a page
pub const ENROLL_WEB_REPLY: &str = "enroll_web_reply";

/// Message type of a sign request from a page
pub const SIGN_WEB_REQUEST: &str = "sign_web_request";

/// Message type of a sign reply to a page
pub const SIGN_WEB_REPLY: &str = "sign_web_reply";

/// Message type of the reply to a page message no entry point accepts
pub const ERROR_WEB_REPLY: &str = "error_web_reply";

/// Message type of an enroll request to the device helper
pub const ENROLL_HELPER_REQUEST: &str = "enroll_helper_request";

/// Message type of an enroll reply from the device helper
pub const ENROLL_HELPER_REPLY: &str = "enroll_helper_reply";

/// Message type of a sign request to the device helper
pub const SIGN_HELPER_REQUEST: &str = "sign_helper_request";

/// Message type of a sign reply from the device helper
pub const SIGN_HELPER_REPLY: &str = "sign_helper_reply";
