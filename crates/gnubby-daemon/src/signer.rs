//! Signing ceremony
//!
//! A [`Signer`] runs one already-admitted sign request. Every challenge is
//! signed over sign browser data; the helper's reply only names the key
//! handle and challenge hash it signed, so the browser data and the page's
//! original challenge are kept under that pair until the reply arrives.
//!
//! A watchdog armed at construction reports `WAIT_TOUCH` if the helper
//! never answers within the ceremony timeout plus a grace period.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use gnubby_core::reply::sign_response_data;
use gnubby_core::{
    build_browser_data, encode_sign_challenge, normalize_version, sign_error_for_status,
    BrowserDataKind, Challenge, DeviceStatus, ErrorCode,
};

use crate::appid::{allow_http_for, distinct_app_ids, AppIdAuthorizer, AppIdCheckerFactory};
use crate::ceremony::{CeremonyOutcome, CeremonyScope, Completion};
use crate::helper::{Helper, SignHelperReply, SignHelperRequest};

/// Where a signer is in its ceremony
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerState {
    Created,
    ChallengesSet,
    Authorizing,
    Signing,
    Succeeded,
    Failed,
    TimedOut,
    Closed,
}

impl SignerState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SignerState::Succeeded | SignerState::Failed | SignerState::TimedOut | SignerState::Closed
        )
    }
}

/// `(key handle, challenge hash)`; a missing key handle is the empty string
type PendingKey = (String, String);

struct PendingChallenge {
    browser_data: String,
    original: Challenge,
}

/// A single signing ceremony
pub struct Signer {
    scope: CeremonyScope,
    authorizer: AppIdAuthorizer,
    helper: Box<dyn Helper>,
    completion: Completion<CeremonyOutcome>,
    watchdog: Instant,
    state: SignerState,
    challenges: Vec<Challenge>,
    pending: HashMap<PendingKey, PendingChallenge>,
}

impl Signer {
    /// Build a signer and arm its watchdog
    ///
    /// The watchdog fires `watchdog_grace` after the ceremony timer expires.
    pub fn new(
        scope: CeremonyScope,
        helper: Box<dyn Helper>,
        app_id_checkers: Arc<dyn AppIdCheckerFactory>,
        watchdog_grace: Duration,
        on_complete: impl FnOnce(CeremonyOutcome) + Send + 'static,
    ) -> Self {
        let authorizer = AppIdAuthorizer::new(app_id_checkers, &scope.timer);
        let deadline = scope.timer.deadline();
        let watchdog = deadline.checked_add(watchdog_grace).unwrap_or(deadline);
        Self {
            scope,
            authorizer,
            helper,
            completion: Completion::new(on_complete),
            watchdog,
            state: SignerState::Created,
            challenges: Vec::new(),
            pending: HashMap::new(),
        }
    }

    pub fn state(&self) -> SignerState {
        self.state
    }

    pub fn watchdog_deadline(&self) -> Instant {
        self.watchdog
    }

    /// Provide the challenges to sign; false if already set or finished
    pub fn set_challenges(&mut self, challenges: Vec<Challenge>) -> bool {
        if self.state != SignerState::Created {
            return false;
        }
        self.challenges = challenges;
        self.state = SignerState::ChallengesSet;
        true
    }

    /// Run the ceremony until it succeeds, fails or the watchdog fires
    pub async fn sign(&mut self) {
        if self.state != SignerState::ChallengesSet {
            return;
        }

        let watchdog = self.watchdog;
        let outcome = tokio::select! {
            biased;
            outcome = self.run() => Some(outcome),
            _ = tokio::time::sleep_until(watchdog) => None,
        };

        match outcome {
            Some(outcome) => {
                self.state = if outcome.is_ok() {
                    SignerState::Succeeded
                } else {
                    SignerState::Failed
                };
                self.finish(outcome);
            }
            None => {
                warn!("Sign helper for {} never replied; reporting WAIT_TOUCH", self.scope.origin);
                self.state = SignerState::TimedOut;
                self.finish(Err(ErrorCode::WaitTouch));
            }
        }
    }

    async fn run(&mut self) -> CeremonyOutcome {
        self.state = SignerState::Authorizing;

        let app_ids = distinct_app_ids(
            self.challenges
                .iter()
                .map(|challenge| challenge.app_id.as_str())
                .filter(|app_id| !app_id.is_empty()),
        );
        if app_ids.is_empty() {
            warn!("Sign request from {} names no app id", self.scope.origin);
            return Err(ErrorCode::BadRequest);
        }

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

        self.state = SignerState::Signing;
        let request = SignHelperRequest::new(
            self.encode_challenges(),
            self.scope.timer.remaining_secs(),
            self.scope.log_msg_url.clone(),
        );

        match self.helper.do_sign(request).await {
            Ok(reply) => self.map_reply(reply),
            Err(e) => {
                warn!("Sign helper refused request: {}", e);
                Err(ErrorCode::BadRequest)
            }
        }
    }

    fn encode_challenges(&mut self) -> Vec<gnubby_core::EncodedSignChallenge> {
        let mut encoded = Vec::with_capacity(self.challenges.len());
        for challenge in &self.challenges {
            let browser_data = build_browser_data(
                BrowserDataKind::Sign,
                &challenge.challenge,
                &self.scope.origin,
                self.scope.tls_channel_id.as_deref(),
            );
            let entry = encode_sign_challenge(
                &browser_data,
                &challenge.app_id,
                challenge.key_handle.as_deref(),
                normalize_version(challenge),
            );

            let key = (
                challenge.key_handle.clone().unwrap_or_default(),
                entry.challenge_hash.clone(),
            );
            self.pending.insert(
                key,
                PendingChallenge {
                    browser_data,
                    original: challenge.clone(),
                },
            );
            encoded.push(entry);
        }
        encoded
    }

    fn map_reply(&self, reply: SignHelperReply) -> CeremonyOutcome {
        // OK_STATUS is no failure for sign; responseData decides
        if let Some(code) = reply.code.filter(|code| *code != DeviceStatus::OK) {
            warn!(
                "Sign helper failed with {} for {} (source {})",
                code,
                self.scope.origin,
                reply.source.as_deref().unwrap_or("unknown")
            );
            return Err(sign_error_for_status(code));
        }

        if let Some(source) = &reply.source {
            debug!("Sign response for {} from {}", self.scope.origin, source);
        }

        let Some(data) = reply.response_data else {
            warn!("Sign helper reply carries no responseData");
            return Err(ErrorCode::UnknownError);
        };

        let key = (data.key_handle.unwrap_or_default(), data.challenge_hash);
        match self.pending.get(&key) {
            Some(pending) => Ok(sign_response_data(
                &pending.original,
                &data.signature_data,
                &pending.browser_data,
            )),
            None => {
                warn!("Sign helper signed a challenge that was never sent");
                Err(ErrorCode::UnknownError)
            }
        }
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
        if self.state == SignerState::Closed {
            return;
        }
        if !self.state.is_terminal() {
            debug!("Sign request for {} closed in state {:?}", self.scope.origin, self.state);
            self.state = SignerState::Closed;
        }
        self.completion.cancel();
        self.teardown();
    }
}
