//! Challenge encoding for the device helper
//!
//! The device never sees an app id or (for V2) a server challenge directly.
//! It signs over SHA-256 hashes, carried as web-safe base64 strings. For V2
//! the hashed input is the browser data, a small JSON document binding the
//! ceremony type, server challenge, origin and TLS channel id.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::{Challenge, EncodedEnrollChallenge, EncodedSignChallenge, Version};

/// Ceremony a browser data document is produced for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserDataKind {
    Enroll,
    Sign,
}

impl BrowserDataKind {
    /// Value of the `typ` member
    pub fn typ(&self) -> &'static str {
        match self {
            BrowserDataKind::Enroll => "navigator.id.finishEnrollment",
            BrowserDataKind::Sign => "navigator.id.getAssertion",
        }
    }
}

#[derive(Serialize)]
struct BrowserData<'a> {
    typ: &'static str,
    challenge: &'a str,
    origin: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cid_pubkey: Option<Value>,
}

/// Version of a challenge, U2F_V1 when absent
pub fn normalize_version(challenge: &Challenge) -> Version {
    challenge.version.unwrap_or_default()
}

/// Hash data using SHA256
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// URL-safe base64 without padding
pub fn web_safe_b64(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Web-safe base64 SHA-256 of a string
pub fn hash_b64(input: &str) -> String {
    web_safe_b64(&sha256(input.as_bytes()))
}

/// Build the browser data JSON for a ceremony
///
/// The TLS channel id is included as `cid_pubkey` only when it parses as a
/// JSON object.
pub fn build_browser_data(
    kind: BrowserDataKind,
    server_challenge: &str,
    origin: &str,
    tls_channel_id: Option<&str>,
) -> String {
    let cid_pubkey = tls_channel_id
        .and_then(|id| serde_json::from_str::<Value>(id).ok())
        .filter(Value::is_object);

    let data = BrowserData {
        typ: kind.typ(),
        challenge: server_challenge,
        origin,
        cid_pubkey,
    };

    // Only strings and an already parsed Value are serialized here.
    serde_json::to_string(&data).unwrap_or_default()
}

/// Encode an enroll challenge
///
/// The challenge value is passed through unchanged; V2 callers substitute
/// the browser data hash before calling.
pub fn encode_enroll_challenge(challenge: &Challenge) -> EncodedEnrollChallenge {
    EncodedEnrollChallenge {
        version: normalize_version(challenge),
        challenge: challenge.challenge.clone(),
        app_id_hash: hash_b64(&challenge.app_id),
    }
}

/// Encode a sign challenge over `challenge_input` (raw challenge or browser data)
pub fn encode_sign_challenge(
    challenge_input: &str,
    app_id: &str,
    key_handle: Option<&str>,
    version: Version,
) -> EncodedSignChallenge {
    EncodedSignChallenge {
        version,
        challenge_hash: hash_b64(challenge_input),
        app_id_hash: hash_b64(app_id),
        key_handle: key_handle.map(str::to_owned),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_b64_known_vector() {
        // SHA-256("abc"), web-safe, unpadded
        assert_eq!(
            hash_b64("abc"),
            "ungWv48Bz-pBQUDeXa4iI7ADYaOWF3qctBD_YfIAFa0"
        );
    }

    #[test]
    fn test_browser_data_without_channel_id() {
        let data = build_browser_data(
            BrowserDataKind::Enroll,
            "srv1",
            "https://example.com",
            None,
        );
        assert_eq!(
            data,
            r#"{"typ":"navigator.id.finishEnrollment","challenge":"srv1","origin":"https://example.com"}"#
        );
    }

    #[test]
    fn test_browser_data_with_channel_id() {
        let data = build_browser_data(
            BrowserDataKind::Sign,
            "srv1",
            "https://example.com",
            Some(r#"{"kty":"EC","crv":"P-256"}"#),
        );
        let parsed: Value = serde_json::from_str(&data).unwrap();
        assert_eq!(parsed["typ"], "navigator.id.getAssertion");
        assert_eq!(parsed["cid_pubkey"]["kty"], "EC");
    }

    #[test]
    fn test_malformed_channel_id_omitted() {
        for bad in ["not json", "\"a string\"", "[1,2]"] {
            let data = build_browser_data(BrowserDataKind::Sign, "c", "https://o", Some(bad));
            assert!(!data.contains("cid_pubkey"), "{} should be dropped", bad);
        }
    }

    #[test]
    fn test_encode_enroll_defaults_to_v1() {
        let challenge = Challenge::new("https://a", "c1");
        let encoded = encode_enroll_challenge(&challenge);

        assert_eq!(encoded.version, Version::V1);
        assert_eq!(encoded.challenge, "c1");
        assert_eq!(encoded.app_id_hash, hash_b64("https://a"));
    }

    #[test]
    fn test_encode_sign_hashes_input() {
        let encoded = encode_sign_challenge("bd", "https://a", Some("kh1"), Version::V2);

        assert_eq!(encoded.challenge_hash, hash_b64("bd"));
        assert_eq!(encoded.app_id_hash, hash_b64("https://a"));
        assert_eq!(encoded.key_handle.as_deref(), Some("kh1"));
    }
}
