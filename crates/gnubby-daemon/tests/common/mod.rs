//! Test doubles for the device helper and app id checker

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gnubby_core::{DeviceStatus, Version};
use gnubby_daemon::appid::AppIdChecker;
use gnubby_daemon::helper::{
    EnrollHelperReply, EnrollHelperRequest, SignHelperReply, SignHelperRequest, SignResponseData,
};
use gnubby_daemon::{
    AppIdCheckerFactory, CountdownTimer, Helper, HelperFactory, RequestContext, Responder,
};

/// How the fake device answers a sign request
#[derive(Debug, Clone)]
pub enum SignMode {
    /// Sign the first challenge after `delay`
    Sign { delay: Duration },
    /// Fail with a status code
    Fail(DeviceStatus),
    /// Never answer
    Stall,
}

/// Shared record of what the fake device was asked to do
#[derive(Debug, Default)]
pub struct DeviceLog {
    pub enroll_requests: Mutex<Vec<EnrollHelperRequest>>,
    pub sign_requests: Mutex<Vec<SignHelperRequest>>,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub closed: AtomicUsize,
}

impl DeviceLog {
    pub fn enroll_calls(&self) -> usize {
        self.enroll_requests.lock().unwrap().len()
    }

    pub fn sign_calls(&self) -> usize {
        self.sign_requests.lock().unwrap().len()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

pub struct FakeDevice {
    pub enroll_reply: EnrollHelperReply,
    pub sign_mode: SignMode,
    pub log: Arc<DeviceLog>,
}

impl FakeDevice {
    pub fn new(enroll_reply: EnrollHelperReply, sign_mode: SignMode) -> Arc<Self> {
        Arc::new(Self {
            enroll_reply,
            sign_mode,
            log: Arc::new(DeviceLog::default()),
        })
    }

    pub fn signing() -> Arc<Self> {
        Self::new(
            EnrollHelperReply::success(Version::V1, "ED"),
            SignMode::Sign {
                delay: Duration::ZERO,
            },
        )
    }
}

impl HelperFactory for FakeDevice {
    fn create_helper(&self) -> Box<dyn Helper> {
        Box::new(FakeHelper {
            enroll_reply: self.enroll_reply.clone(),
            sign_mode: self.sign_mode.clone(),
            log: Arc::clone(&self.log),
        })
    }
}

struct FakeHelper {
    enroll_reply: EnrollHelperReply,
    sign_mode: SignMode,
    log: Arc<DeviceLog>,
}

/// Decrements the active count however the sign future ends
struct ActiveGuard(Arc<DeviceLog>);

impl ActiveGuard {
    fn enter(log: &Arc<DeviceLog>) -> Self {
        let now = log.active.fetch_add(1, Ordering::SeqCst) + 1;
        log.max_active.fetch_max(now, Ordering::SeqCst);
        Self(Arc::clone(log))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Helper for FakeHelper {
    async fn do_enroll(&mut self, request: EnrollHelperRequest) -> EnrollHelperReply {
        self.log.enroll_requests.lock().unwrap().push(request);
        self.enroll_reply.clone()
    }

    async fn do_sign(
        &mut self,
        request: SignHelperRequest,
    ) -> gnubby_daemon::Result<SignHelperReply> {
        self.log.sign_requests.lock().unwrap().push(request.clone());
        let _active = ActiveGuard::enter(&self.log);

        match &self.sign_mode {
            SignMode::Sign { delay } => {
                tokio::time::sleep(*delay).await;
                let first = &request.sign_data[0];
                Ok(SignHelperReply::success(SignResponseData {
                    key_handle: first.key_handle.clone(),
                    challenge_hash: first.challenge_hash.clone(),
                    signature_data: "SIG".to_string(),
                }))
            }
            SignMode::Fail(status) => Ok(SignHelperReply::error(*status)),
            SignMode::Stall => std::future::pending().await,
        }
    }

    fn close(&mut self) {
        self.log.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// App id checker answering a fixed verdict
pub struct FixedVerdict(pub bool);

struct FixedChecker(bool);

#[async_trait]
impl AppIdChecker for FixedChecker {
    async fn do_check(&mut self) -> bool {
        self.0
    }

    fn close(&mut self) {}
}

impl AppIdCheckerFactory for FixedVerdict {
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

pub fn context(device: &Arc<FakeDevice>, allow: bool) -> RequestContext {
    RequestContext::new(
        Arc::clone(device) as Arc<dyn HelperFactory>,
        Arc::new(FixedVerdict(allow)),
    )
}

pub fn responder() -> (Responder, tokio::sync::mpsc::UnboundedReceiver<gnubby_core::WebReply>) {
    Responder::channel()
}
