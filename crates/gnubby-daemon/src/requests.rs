//! Entry points for page requests
//!
//! Each handler validates the raw request, builds the ceremony and runs it
//! on its own task. Validation failures are answered with `BAD_REQUEST`
//! immediately and produce no handle.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use gnubby_core::{
    EnrollRequest, ErrorCode, SignRequest, WebReply, ENROLL_WEB_REPLY, SIGN_WEB_REPLY,
};

use crate::appid::{AppIdCheckerFactory, LocalAppIdCheckerFactory};
use crate::ceremony::{CeremonyOutcome, CeremonyScope};
use crate::config::DaemonConfig;
use crate::countdown::CountdownTimer;
use crate::enroller::Enroller;
use crate::helper::HelperFactory;
use crate::queue::OriginRequestQueue;
use crate::queued::QueuedSignRequest;
use crate::responder::Responder;

/// The page a request came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSender {
    pub url: String,

    /// TLS channel id of the page's connection, as JSON
    #[serde(rename = "tlsChannelId", default, skip_serializing_if = "Option::is_none")]
    pub tls_channel_id: Option<String>,
}

impl MessageSender {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tls_channel_id: None,
        }
    }

    /// Serialized origin of the sender, if its URL has one
    pub fn origin(&self) -> Option<String> {
        let origin = Url::parse(&self.url).ok()?.origin();
        origin.is_tuple().then(|| origin.ascii_serialization())
    }
}

/// Everything a request handler needs to build a ceremony
#[derive(Clone)]
pub struct RequestContext {
    pub helpers: Arc<dyn HelperFactory>,
    pub app_id_checkers: Arc<dyn AppIdCheckerFactory>,
    pub queue: OriginRequestQueue,
    pub default_timeout: Duration,
    pub watchdog_grace: Duration,
}

impl RequestContext {
    pub fn new(
        helpers: Arc<dyn HelperFactory>,
        app_id_checkers: Arc<dyn AppIdCheckerFactory>,
    ) -> Self {
        Self {
            helpers,
            app_id_checkers,
            queue: OriginRequestQueue::new(),
            default_timeout: Duration::from_secs(gnubby_core::DEFAULT_TIMEOUT_SECS),
            watchdog_grace: Duration::from_secs(1),
        }
    }

    /// Context using the configured timeouts and facet list
    pub fn from_config(config: &DaemonConfig, helpers: Arc<dyn HelperFactory>) -> Self {
        let checkers = LocalAppIdCheckerFactory::new(config.trusted_facets.clone());
        Self {
            default_timeout: config.default_timeout(),
            watchdog_grace: config.watchdog_grace(),
            ..Self::new(helpers, Arc::new(checkers))
        }
    }
}

/// Handle to a running ceremony
///
/// Closing the handle, or dropping it, cancels the ceremony: no reply is
/// sent and any queue slot is released.
#[derive(Debug)]
pub struct RequestHandle {
    close_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RequestHandle {
    /// Spawn `ceremony` with the receiving end of this handle's close signal
    fn spawn<F, Fut>(ceremony: F) -> Self
    where
        F: FnOnce(oneshot::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (close_tx, close_rx) = oneshot::channel();
        Self {
            close_tx: Some(close_tx),
            task: tokio::spawn(ceremony(close_rx)),
        }
    }

    pub fn close(&mut self) {
        if let Some(close_tx) = self.close_tx.take() {
            let _ = close_tx.send(());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the ceremony to end on its own
    pub async fn wait(self) {
        let Self { close_tx, task } = self;
        if let Err(e) = task.await {
            warn!("Ceremony task failed: {}", e);
        }
        drop(close_tx);
    }
}

fn web_reply(reply_type: &str, outcome: CeremonyOutcome, request_id: Option<Value>) -> WebReply {
    match outcome {
        Ok(data) => WebReply::success(reply_type, data, request_id),
        Err(code) => WebReply::error(reply_type, code, request_id),
    }
}

/// Start an enrollment for `sender`
pub fn handle_enroll_request(
    context: &RequestContext,
    sender: &MessageSender,
    request: Value,
    mut responder: Responder,
) -> Option<RequestHandle> {
    let request_id = request.get("requestId").cloned();

    let Some(origin) = sender.origin() else {
        warn!("Enroll request from {} has no origin", sender.url);
        responder.send(WebReply::error(ENROLL_WEB_REPLY, ErrorCode::BadRequest, request_id));
        return None;
    };
    let request = match EnrollRequest::from_value(request) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejecting enroll request from {}: {}", origin, e);
            responder.send(WebReply::error(ENROLL_WEB_REPLY, ErrorCode::BadRequest, request_id));
            return None;
        }
    };

    let scope = CeremonyScope {
        timer: CountdownTimer::new(request.timeout_or(context.default_timeout)),
        origin: origin.clone(),
        tls_channel_id: sender.tls_channel_id.clone(),
        log_msg_url: request.log_msg_url.clone(),
    };
    let mut enroller = Enroller::new(
        scope,
        context.helpers.create_helper(),
        Arc::clone(&context.app_id_checkers),
        move |outcome| responder.send(web_reply(ENROLL_WEB_REPLY, outcome, request_id)),
    );

    Some(RequestHandle::spawn(move |close_rx| async move {
        tokio::select! {
            _ = enroller.do_enroll(&request.enroll_challenges, &request.sign_data) => {}
            _ = close_rx => debug!("Enroll request for {} closed", origin),
        }
        enroller.close();
    }))
}

/// Queue a sign request for `sender`
pub fn handle_sign_request(
    context: &RequestContext,
    sender: &MessageSender,
    request: Value,
    mut responder: Responder,
) -> Option<RequestHandle> {
    let Some(origin) = sender.origin() else {
        warn!("Sign request from {} has no origin", sender.url);
        responder.send(WebReply::error(SIGN_WEB_REPLY, ErrorCode::BadRequest, None));
        return None;
    };
    let request = match SignRequest::from_value(request) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejecting sign request from {}: {}", origin, e);
            responder.send(WebReply::error(SIGN_WEB_REPLY, ErrorCode::BadRequest, None));
            return None;
        }
    };
    let Some(app_id) = request.sign_data.first().map(|challenge| challenge.app_id.clone()) else {
        responder.send(WebReply::error(SIGN_WEB_REPLY, ErrorCode::BadRequest, None));
        return None;
    };

    let timer = CountdownTimer::new(request.timeout_or(context.default_timeout));
    let (admit_tx, admit_rx) = oneshot::channel();
    let token = context.queue.queue_request(
        &app_id,
        &origin,
        move |token| {
            // The request is gone; hand the slot straight back.
            if let Err(token) = admit_tx.send(token) {
                token.complete();
            }
        },
        timer.clone_timer(),
    );

    let scope = CeremonyScope {
        timer,
        origin: origin.clone(),
        tls_channel_id: sender.tls_channel_id.clone(),
        log_msg_url: request.log_msg_url.clone(),
    };
    let mut queued = QueuedSignRequest::new(
        request.sign_data,
        scope,
        token,
        Arc::clone(&context.helpers),
        Arc::clone(&context.app_id_checkers),
        context.watchdog_grace,
        move |outcome| responder.send(web_reply(SIGN_WEB_REPLY, outcome, None)),
    );

    Some(RequestHandle::spawn(move |close_rx| async move {
        tokio::select! {
            _ = queued.run(admit_rx) => {}
            _ = close_rx => debug!("Sign request for {} closed", origin),
        }
        queued.close();
    }))
}
