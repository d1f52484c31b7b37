#![no_main]

use std::collections::HashSet;

use gnubby_core::{normalize_version, EnrollRequest, SignRequest};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    // Anything accepted must hold the shape the ceremonies rely on
    if let Ok(request) = EnrollRequest::from_value(value.clone()) {
        assert!(!request.enroll_challenges.is_empty());
        let versions: HashSet<_> = request
            .enroll_challenges
            .iter()
            .map(normalize_version)
            .collect();
        assert_eq!(versions.len(), request.enroll_challenges.len());
    }

    if let Ok(request) = SignRequest::from_value(value) {
        assert!(!request.sign_data.is_empty());
    }
});
