//! Property-based tests for gnubby-core using proptest
//!
//! These tests verify invariants that should hold for all valid inputs.

use proptest::prelude::*;
use gnubby_core::{
    build_browser_data, encode_enroll_challenge, encode_sign_challenge, hash_b64,
    BrowserDataKind, Challenge, EnrollRequest, SignRequest, Version,
};

// ============================================
// Strategies
// ============================================

fn arb_version() -> impl Strategy<Value = Option<Version>> {
    prop_oneof![Just(None), Just(Some(Version::V1)), Just(Some(Version::V2))]
}

fn arb_challenge() -> impl Strategy<Value = Challenge> {
    ("https://[a-z]{1,12}\\.example", "[A-Za-z0-9_-]{1,43}", arb_version()).prop_map(
        |(app_id, challenge, version)| {
            let mut c = Challenge::new(app_id, challenge);
            c.version = version;
            c
        },
    )
}

fn enroll_request(enroll_challenges: Vec<Challenge>) -> EnrollRequest {
    EnrollRequest {
        enroll_challenges,
        sign_data: vec![],
        timeout: None,
        log_msg_url: None,
        request_id: None,
    }
}

// ============================================
// Encoding
// ============================================

proptest! {
    #[test]
    fn app_id_hash_depends_only_on_app_id(a in arb_challenge(), b in arb_challenge()) {
        let mut b = b;
        b.app_id = a.app_id.clone();

        prop_assert_eq!(
            encode_enroll_challenge(&a).app_id_hash,
            encode_enroll_challenge(&b).app_id_hash
        );
    }

    #[test]
    fn hashes_are_unpadded_web_safe(input in ".*") {
        let hash = hash_b64(&input);

        prop_assert_eq!(hash.len(), 43);
        prop_assert!(hash.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn browser_data_is_deterministic_json(
        challenge in "[ -~]{0,40}",
        host in "[a-z]{1,12}",
    ) {
        let origin = format!("https://{}.example", host);
        let first = build_browser_data(BrowserDataKind::Sign, &challenge, &origin, None);
        let second = build_browser_data(BrowserDataKind::Sign, &challenge, &origin, None);
        prop_assert_eq!(&first, &second);

        let parsed: serde_json::Value = serde_json::from_str(&first).unwrap();
        prop_assert_eq!(parsed["challenge"].as_str(), Some(challenge.as_str()));
        prop_assert_eq!(parsed["origin"].as_str(), Some(origin.as_str()));
    }

    #[test]
    fn sign_encoding_separates_origins(challenge in "[A-Za-z0-9]{1,20}") {
        let a = build_browser_data(BrowserDataKind::Sign, &challenge, "https://a.example", None);
        let b = build_browser_data(BrowserDataKind::Sign, &challenge, "https://b.example", None);

        let ea = encode_sign_challenge(&a, "https://a.example", Some("kh"), Version::V2);
        let eb = encode_sign_challenge(&b, "https://a.example", Some("kh"), Version::V2);
        prop_assert_ne!(ea.challenge_hash, eb.challenge_hash);
    }
}

// ============================================
// Validation
// ============================================

proptest! {
    #[test]
    fn enroll_validation_matches_version_uniqueness(
        challenges in prop::collection::vec(arb_challenge(), 0..4)
    ) {
        let mut versions: Vec<Version> = challenges
            .iter()
            .map(|c| c.version.unwrap_or_default())
            .collect();
        versions.sort();
        let before = versions.len();
        versions.dedup();
        let expected_ok = before > 0 && versions.len() == before;

        prop_assert_eq!(enroll_request(challenges).validate().is_ok(), expected_ok);
    }

    #[test]
    fn sign_validation_requires_entries(
        challenges in prop::collection::vec(arb_challenge(), 0..4)
    ) {
        let expected_ok = !challenges.is_empty();
        let request = SignRequest { sign_data: challenges, timeout: None, log_msg_url: None };

        prop_assert_eq!(request.validate().is_ok(), expected_ok);
    }
}
