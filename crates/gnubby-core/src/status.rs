//! Device status codes, page error codes, and the tables between them
//!
//! Device helpers report ISO 7816 status words (or small negative codes for
//! transport conditions). Pages only ever see an [`ErrorCode`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status code reported by a device helper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceStatus(pub i32);

impl DeviceStatus {
    pub const OK: Self = Self(0);
    pub const WRONG_LENGTH: Self = Self(0x6700);
    pub const WAIT_TOUCH: Self = Self(0x6985);
    pub const INVALID_DATA: Self = Self(0x6984);
    pub const WRONG_DATA: Self = Self(0x6a80);
    pub const TIMEOUT: Self = Self(-5);
    pub const BUSY: Self = Self(-6);
    pub const GONE: Self = Self(-8);

    /// Symbolic name, if the code is a known one
    pub fn name(&self) -> Option<&'static str> {
        match *self {
            Self::OK => Some("OK_STATUS"),
            Self::WRONG_LENGTH => Some("WRONG_LENGTH_STATUS"),
            Self::WAIT_TOUCH => Some("WAIT_TOUCH_STATUS"),
            Self::INVALID_DATA => Some("INVALID_DATA_STATUS"),
            Self::WRONG_DATA => Some("WRONG_DATA_STATUS"),
            Self::TIMEOUT => Some("TIMEOUT_STATUS"),
            Self::BUSY => Some("BUSY_STATUS"),
            Self::GONE => Some("GONE_STATUS"),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "status {:#x}", self.0),
        }
    }
}

/// Result code delivered to a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum ErrorCode {
    Ok = 0,
    UnknownError = 1,
    BadRequest = 2,
    BadAppId = 3,
    AlreadyEnrolled = 4,
    WaitTouch = 5,
    NonePluggedEnrolled = 6,
}

impl ErrorCode {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::Ok => "OK",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::BadAppId => "BAD_APP_ID",
            ErrorCode::AlreadyEnrolled => "ALREADY_ENROLLED",
            ErrorCode::WaitTouch => "WAIT_TOUCH",
            ErrorCode::NonePluggedEnrolled => "NONE_PLUGGED_ENROLLED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<ErrorCode> for u8 {
    fn from(code: ErrorCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for ErrorCode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ErrorCode::Ok),
            1 => Ok(ErrorCode::UnknownError),
            2 => Ok(ErrorCode::BadRequest),
            3 => Ok(ErrorCode::BadAppId),
            4 => Ok(ErrorCode::AlreadyEnrolled),
            5 => Ok(ErrorCode::WaitTouch),
            6 => Ok(ErrorCode::NonePluggedEnrolled),
            other => Err(format!("unknown error code {}", other)),
        }
    }
}

/// Page error for a failed enroll helper reply
///
/// OK_STATUS only reaches this table when the helper found the key already
/// registered, so it means ALREADY_ENROLLED to the page.
pub fn enroll_error_for_status(status: DeviceStatus) -> ErrorCode {
    match status {
        DeviceStatus::OK => ErrorCode::AlreadyEnrolled,
        DeviceStatus::TIMEOUT | DeviceStatus::WAIT_TOUCH => ErrorCode::WaitTouch,
        _ => ErrorCode::UnknownError,
    }
}

/// Page error for a failed sign helper reply
pub fn sign_error_for_status(status: DeviceStatus) -> ErrorCode {
    match status {
        DeviceStatus::TIMEOUT | DeviceStatus::WAIT_TOUCH => ErrorCode::WaitTouch,
        DeviceStatus::WRONG_DATA => ErrorCode::NonePluggedEnrolled,
        _ => ErrorCode::UnknownError,
    }
}
