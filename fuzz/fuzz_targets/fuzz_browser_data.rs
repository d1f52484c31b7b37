#![no_main]

use arbitrary::Arbitrary;
use gnubby_core::{build_browser_data, hash_b64, BrowserDataKind};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    sign: bool,
    challenge: String,
    origin: String,
    tls_channel_id: Option<String>,
}

fuzz_target!(|input: Input| {
    let kind = if input.sign {
        BrowserDataKind::Sign
    } else {
        BrowserDataKind::Enroll
    };
    let browser_data = build_browser_data(
        kind,
        &input.challenge,
        &input.origin,
        input.tls_channel_id.as_deref(),
    );

    // Always valid JSON carrying the inputs back out
    let parsed: serde_json::Value = serde_json::from_str(&browser_data).unwrap();
    assert_eq!(parsed["typ"], kind.typ());
    assert_eq!(parsed["challenge"], input.challenge.as_str());
    assert_eq!(parsed["origin"], input.origin.as_str());
    if let Some(cid) = parsed.get("cid_pubkey") {
        assert!(cid.is_object());
    }

    // Deterministic
    assert_eq!(
        hash_b64(&browser_data),
        hash_b64(&build_browser_data(
            kind,
            &input.challenge,
            &input.origin,
            input.tls_channel_id.as_deref(),
        ))
    );
});
