//! Gnubby Daemon - U2F ceremonies between web pages and a security key
//!
//! This crate provides:
//! - Enroll and sign ceremonies with app id authorization
//! - Per-origin admission control for sign requests
//! - Watchdog and timeout handling
//! - A page-facing IPC server and a socket client for the device helper

pub mod appid;
pub mod ceremony;
pub mod config;
pub mod countdown;
pub mod enroller;
pub mod error;
pub mod helper;
pub mod ipc;
pub mod queue;
pub mod queued;
pub mod requests;
pub mod responder;
pub mod signer;

pub use appid::{AppIdAuthorizer, AppIdChecker, AppIdCheckerFactory, LocalAppIdCheckerFactory};
pub use ceremony::{CeremonyOutcome, CeremonyScope, Completion};
pub use config::DaemonConfig;
pub use countdown::CountdownTimer;
pub use enroller::Enroller;
pub use error::{DaemonError, Result};
pub use helper::{Helper, HelperFactory};
pub use ipc::{IpcServer, SocketHelperFactory};
pub use queue::{OriginRequestQueue, QueueToken};
pub use queued::QueuedSignRequest;
pub use requests::{
    handle_enroll_request, handle_sign_request, MessageSender, RequestContext, RequestHandle,
};
pub use responder::Responder;
pub use signer::{Signer, SignerState};
