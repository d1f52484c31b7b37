//! Enrollment ceremony
//!
//! One [`Enroller`] runs one registration: encode the page's challenges,
//! authorize every app id they name, hand the encoded request to the device
//! helper, then map the helper's reply back onto the page's own challenge.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use gnubby_core::reply::enroll_response_data;
use gnubby_core::{
    build_browser_data, encode_enroll_challenge, encode_sign_challenge, enroll_error_for_status,
    hash_b64, normalize_version, BrowserDataKind, Challenge, EncodedEnrollChallenge,
    EncodedSignChallenge, ErrorCode, Version,
};

use crate::appid::{allow_http_for, AppIdAuthorizer, AppIdCheckerFactory};
use crate::ceremony::{CeremonyOutcome, CeremonyScope, Completion};
use crate::helper::{EnrollHelperReply, EnrollHelperRequest, Helper};

/// A single enrollment ceremony
pub struct Enroller {
    scope: CeremonyScope,
    authorizer: AppIdAuthorizer,
    helper: Box<dyn Helper>,
    completion: Completion<CeremonyOutcome>,

    /// Challenges as the page sent them
    enroll_challenges: Vec<Challenge>,

    /// Browser data of each V2 challenge, by version
    browser_data: HashMap<Version, String>,

    closed: bool,
}

impl Enroller {
    /// `on_complete` runs once with the ceremony's outcome, unless the
    /// enroller is closed first.
    pub fn new(
        scope: CeremonyScope,
        helper: Box<dyn Helper>,
        app_id_checkers: Arc<dyn AppIdCheckerFactory>,
        on_complete: impl FnOnce(CeremonyOutcome) + Send + 'static,
    ) -> Self {
        let authorizer = AppIdAuthorizer::new(app_id_checkers, &scope.timer);
        Self {
            scope,
            authorizer,
            helper,
            completion: Completion::new(on_complete),
            enroll_challenges: Vec::new(),
            browser_data: HashMap::new(),
            closed: false,
        }
    }

    /// Run the ceremony to completion
    pub async fn do_enroll(&mut self, enroll_challenges: &[Challenge], sign_challenges: &[Challenge]) {
        if self.closed || self.completion.is_completed() {
            return;
        }
        let outcome = self.run(enroll_challenges, sign_challenges).await;
        self.finish(outcome);
    }

    async fn run(
        &mut self,
        enroll_challenges: &[Challenge],
        sign_challenges: &[Challenge],
    ) -> CeremonyOutcome {
        self.enroll_challenges = enroll_challenges.to_vec();

        let encoded_enroll = self.encode_enroll_challenges(enroll_challenges);
        let encoded_sign = encode_existing_registrations(sign_challenges);

        let app_ids: Vec<String> = enroll_challenges
            .iter()
            .chain(sign_challenges)
            .map(|challenge| challenge.app_id.clone())
            .collect();
        let origin = &self.scope.origin;
        if !self
            .authorizer
            .check(
                &app_ids,
                origin,
                allow_http_for(origin),
                self.scope.log_msg_url.as_deref(),
            )
            .await
        {
            return Err(ErrorCode::BadAppId);
        }

        let request = EnrollHelperRequest::new(
            encoded_enroll,
            encoded_sign,
            self.scope.timer.remaining_secs(),
            self.scope.log_msg_url.clone(),
        );
        let reply = self.helper.do_enroll(request).await;
        self.map_reply(reply)
    }

    fn encode_enroll_challenges(&mut self, challenges: &[Challenge]) -> Vec<EncodedEnrollChallenge> {
        challenges
            .iter()
            .map(|challenge| {
                let version = normalize_version(challenge);
                if version != Version::V2 {
                    return encode_enroll_challenge(challenge);
                }

                let browser_data = build_browser_data(
                    BrowserDataKind::Enroll,
                    &challenge.challenge,
                    &self.scope.origin,
                    self.scope.tls_channel_id.as_deref(),
                );
                let mut substituted = challenge.clone();
                substituted.challenge = hash_b64(&browser_data);
                self.browser_data.insert(version, browser_data);
                encode_enroll_challenge(&substituted)
            })
            .collect()
    }

    fn map_reply(&self, reply: EnrollHelperReply) -> CeremonyOutcome {
        if let Some(code) = reply.code {
            warn!("Enroll helper failed with {} for {}", code, self.scope.origin);
            return Err(enroll_error_for_status(code));
        }

        let Some(version) = reply.version else {
            warn!("Enroll helper reply carries no version");
            return Err(ErrorCode::UnknownError);
        };
        let Some(challenge) = self
            .enroll_challenges
            .iter()
            .find(|challenge| normalize_version(challenge) == version)
        else {
            warn!("Enroll helper replied for {} which was never requested", version);
            return Err(ErrorCode::UnknownError);
        };
        let Some(enroll_data) = reply.enroll_data else {
            warn!("Enroll helper reply carries no enrollData");
            return Err(ErrorCode::UnknownError);
        };

        Ok(enroll_response_data(
            challenge,
            version,
            &enroll_data,
            self.browser_data.get(&version).map(String::as_str),
        ))
    }

    fn finish(&mut self, outcome: CeremonyOutcome) {
        self.completion.complete(outcome);
        self.teardown();
    }

    fn teardown(&mut self) {
        self.authorizer.close();
        self.helper.close();
    }

    /// Cancel the ceremony without reporting an outcome
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.completion.cancel() {
            debug!("Enroll request for {} closed before completion", self.scope.origin);
        }
        self.teardown();
    }
}

/// Registrations the page already holds, so the device can spot a re-enroll
fn encode_existing_registrations(challenges: &[Challenge]) -> Vec<EncodedSignChallenge> {
    challenges
        .iter()
        .map(|challenge| {
            encode_sign_challenge(
                &challenge.challenge,
                &challenge.app_id,
                challenge.key_handle.as_deref(),
                normalize_version(challenge),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appid::AppIdChecker;
    use crate::countdown::CountdownTimer;
    use crate::error::Result;
    use crate::helper::{SignHelperReply, SignHelperRequest};
    use async_trait::async_trait;
    use gnubby_core::DeviceStatus;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;

    struct Allow(bool);

    struct FixedChecker(bool);

    #[async_trait]
    impl AppIdChecker for FixedChecker {
        async fn do_check(&mut self) -> bool {
            self.0
        }

        fn close(&mut self) {}
    }

    impl AppIdCheckerFactory for Allow {
        fn create(
            &self,
            _timer: CountdownTimer,
            _origin: &str,
            _app_ids: Vec<String>,
            _allow_http: bool,
            _log_msg_url: Option<&str>,
        ) -> Box<dyn AppIdChecker> {
            Box::new(FixedChecker(self.0))
        }
    }

    /// Replies with a fixed enroll reply and records what it was sent
    struct ScriptedHelper {
        reply: EnrollHelperReply,
        seen: Arc<Mutex<Vec<EnrollHelperRequest>>>,
        closed: Arc<Mutex<u32>>,
    }

    #[async_trait]
    impl Helper for ScriptedHelper {
        async fn do_enroll(&mut self, request: EnrollHelperRequest) -> EnrollHelperReply {
            self.seen.lock().unwrap().push(request);
            self.reply.clone()
        }

        async fn do_sign(&mut self, _request: SignHelperRequest) -> Result<SignHelperReply> {
            unreachable!("enroller never signs")
        }

        fn close(&mut self) {
            *self.closed.lock().unwrap() += 1;
        }
    }

    struct Harness {
        enroller: Enroller,
        outcome: Arc<Mutex<Option<CeremonyOutcome>>>,
        seen: Arc<Mutex<Vec<EnrollHelperRequest>>>,
        helper_closed: Arc<Mutex<u32>>,
    }

    fn harness(reply: EnrollHelperReply, allow: bool) -> Harness {
        let outcome = Arc::new(Mutex::new(None));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let helper_closed = Arc::new(Mutex::new(0));
        let scope = CeremonyScope {
            timer: CountdownTimer::new(Duration::from_secs(30)),
            origin: "https://example.com".to_string(),
            tls_channel_id: None,
            log_msg_url: None,
        };
        let sink = Arc::clone(&outcome);
        let enroller = Enroller::new(
            scope,
            Box::new(ScriptedHelper {
                reply,
                seen: Arc::clone(&seen),
                closed: Arc::clone(&helper_closed),
            }),
            Arc::new(Allow(allow)),
            move |result| *sink.lock().unwrap() = Some(result),
        );
        Harness {
            enroller,
            outcome,
            seen,
            helper_closed,
        }
    }

    #[tokio::test]
    async fn test_v1_enroll_success() {
        let mut h = harness(EnrollHelperReply::success(Version::V1, "ED"), true);

        h.enroller
            .do_enroll(&[Challenge::new("https://a", "c1")], &[])
            .await;

        let data = h.outcome.lock().unwrap().take().unwrap().unwrap();
        assert_eq!(
            Value::Object(data),
            json!({"appId": "https://a", "challenge": "c1", "version": "U2F_V1", "enrollData": "ED"})
        );
        assert_eq!(h.seen.lock().unwrap()[0].enroll_challenges[0].challenge, "c1");
    }

    #[tokio::test]
    async fn test_v2_enroll_echoes_original_challenge() {
        let mut h = harness(EnrollHelperReply::success(Version::V2, "ED"), true);

        h.enroller
            .do_enroll(&[Challenge::new("https://a", "srv1").with_version(Version::V2)], &[])
            .await;

        let browser_data = build_browser_data(
            BrowserDataKind::Enroll,
            "srv1",
            "https://example.com",
            None,
        );
        let sent = h.seen.lock().unwrap()[0].enroll_challenges[0].clone();
        assert_eq!(sent.challenge, hash_b64(&browser_data));

        let data = h.outcome.lock().unwrap().take().unwrap().unwrap();
        assert_eq!(data["challenge"], "srv1");
        assert_eq!(data["browserData"], browser_data);
    }

    #[tokio::test]
    async fn test_denied_app_id_never_reaches_helper() {
        let mut h = harness(EnrollHelperReply::success(Version::V1, "ED"), false);

        h.enroller
            .do_enroll(&[Challenge::new("https://a", "c1")], &[])
            .await;

        assert_eq!(*h.outcome.lock().unwrap(), Some(Err(ErrorCode::BadAppId)));
        assert!(h.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_codes_are_mapped() {
        for (status, code) in [
            (DeviceStatus::OK, ErrorCode::AlreadyEnrolled),
            (DeviceStatus::WAIT_TOUCH, ErrorCode::WaitTouch),
            (DeviceStatus::TIMEOUT, ErrorCode::WaitTouch),
            (DeviceStatus(0x1234), ErrorCode::UnknownError),
        ] {
            let mut h = harness(EnrollHelperReply::error(status), true);
            h.enroller
                .do_enroll(&[Challenge::new("https://a", "c1")], &[])
                .await;
            assert_eq!(*h.outcome.lock().unwrap(), Some(Err(code)));
        }
    }

    #[tokio::test]
    async fn test_unrequested_version_is_unknown_error() {
        let mut h = harness(EnrollHelperReply::success(Version::V2, "ED"), true);

        h.enroller
            .do_enroll(&[Challenge::new("https://a", "c1")], &[])
            .await;

        assert_eq!(*h.outcome.lock().unwrap(), Some(Err(ErrorCode::UnknownError)));
    }

    #[tokio::test]
    async fn test_existing_registrations_sent_as_sign_data() {
        let mut h = harness(EnrollHelperReply::error(DeviceStatus::OK), true);
        let existing = Challenge::new("https://a", "old").with_key_handle("kh1");

        h.enroller
            .do_enroll(&[Challenge::new("https://a", "c1")], &[existing])
            .await;

        let sent = h.seen.lock().unwrap()[0].sign_data.clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].challenge_hash, hash_b64("old"));
        assert_eq!(sent[0].key_handle.as_deref(), Some("kh1"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_silent() {
        let mut h = harness(EnrollHelperReply::success(Version::V1, "ED"), true);

        h.enroller.close();
        h.enroller.close();
        h.enroller
            .do_enroll(&[Challenge::new("https://a", "c1")], &[])
            .await;

        assert!(h.outcome.lock().unwrap().is_none());
        assert!(h.seen.lock().unwrap().is_empty());
        assert_eq!(*h.helper_closed.lock().unwrap(), 1);
    }
}
