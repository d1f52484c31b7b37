//! A sign request waiting for its turn in the origin queue

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use gnubby_core::{Challenge, ErrorCode};

use crate::appid::AppIdCheckerFactory;
use crate::ceremony::{CeremonyOutcome, CeremonyScope, Completion};
use crate::helper::HelperFactory;
use crate::queue::QueueToken;
use crate::signer::Signer;

/// Couples a [`Signer`] to its slot in the [`OriginRequestQueue`]
///
/// The signer is only built once the slot is admitted. However the request
/// ends, the slot is released exactly once.
///
/// [`OriginRequestQueue`]: crate::queue::OriginRequestQueue
pub struct QueuedSignRequest {
    sign_data: Vec<Challenge>,
    scope: CeremonyScope,
    helpers: Arc<dyn HelperFactory>,
    app_id_checkers: Arc<dyn AppIdCheckerFactory>,
    watchdog_grace: Duration,
    token: QueueToken,
    signer: Option<Signer>,
    completion: Completion<CeremonyOutcome>,
    closed: bool,
}

impl QueuedSignRequest {
    /// `token` is the slot returned when the request was queued
    pub fn new(
        sign_data: Vec<Challenge>,
        scope: CeremonyScope,
        token: QueueToken,
        helpers: Arc<dyn HelperFactory>,
        app_id_checkers: Arc<dyn AppIdCheckerFactory>,
        watchdog_grace: Duration,
        on_complete: impl FnOnce(CeremonyOutcome) + Send + 'static,
    ) -> Self {
        Self {
            sign_data,
            scope,
            helpers,
            app_id_checkers,
            watchdog_grace,
            token,
            signer: None,
            completion: Completion::new(on_complete),
            closed: false,
        }
    }

    /// Wait for admission, then run the ceremony
    ///
    /// If the queue drops the request instead of admitting it, its timer ran
    /// out while waiting and the page is told to touch the key.
    pub async fn run(&mut self, admission: oneshot::Receiver<QueueToken>) {
        let token = match admission.await {
            Ok(token) => token,
            Err(_) => {
                warn!("Sign request for {} expired while queued", self.scope.origin);
                self.token.complete();
                self.completion.complete(Err(ErrorCode::WaitTouch));
                return;
            }
        };

        if self.begin(token) {
            if let Some(signer) = self.signer.as_mut() {
                signer.sign().await;
            }
        }
    }

    /// Build the signer for an admitted request
    ///
    /// Returns false if the request could not start; the slot is released
    /// and, unless closed, the page gets `BAD_REQUEST`.
    pub fn begin(&mut self, token: QueueToken) -> bool {
        if self.closed {
            token.complete();
            return false;
        }
        debug!("Sign request for {} admitted", self.scope.origin);

        let release = token.clone();
        let completion = self.completion.clone();
        let mut signer = Signer::new(
            self.scope.clone(),
            self.helpers.create_helper(),
            Arc::clone(&self.app_id_checkers),
            self.watchdog_grace,
            move |outcome| {
                release.complete();
                completion.complete(outcome);
            },
        );

        if !signer.set_challenges(self.sign_data.clone()) {
            token.complete();
            self.completion.complete(Err(ErrorCode::BadRequest));
            return false;
        }

        self.signer = Some(signer);
        true
    }

    /// Close the signer if started and release the slot
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(signer) = self.signer.as_mut() {
            signer.close();
        }
        self.token.complete();
        self.completion.cancel();
    }
}
