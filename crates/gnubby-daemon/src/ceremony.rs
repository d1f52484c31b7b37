//! Plumbing shared by enroll and sign ceremonies

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value};

use gnubby_core::ErrorCode;

use crate::countdown::CountdownTimer;

/// Terminal result of a ceremony: page response fields or a page error
pub type CeremonyOutcome = Result<Map<String, Value>, ErrorCode>;

/// Who a ceremony runs for, and for how long
#[derive(Debug, Clone)]
pub struct CeremonyScope {
    /// Ceremony deadline
    pub timer: CountdownTimer,

    /// Serialized origin of the requesting page
    pub origin: String,

    /// TLS channel id of the page's connection, as JSON
    pub tls_channel_id: Option<String>,

    /// Where the helper may post diagnostics
    pub log_msg_url: Option<String>,
}

enum CompletionState<T> {
    Pending(Box<dyn FnOnce(T) + Send>),
    Completed,
}

/// A terminal callback that runs at most once
///
/// Clones share the same state, so whichever clone completes first wins and
/// every later `complete` or `cancel` is a no-op.
pub struct Completion<T> {
    state: Arc<Mutex<CompletionState<T>>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("completed", &self.is_completed())
            .finish()
    }
}

impl<T> Completion<T> {
    pub fn new(callback: impl FnOnce(T) + Send + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(CompletionState::Pending(Box::new(callback)))),
        }
    }

    fn take(&self) -> Option<Box<dyn FnOnce(T) + Send>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *state, CompletionState::Completed) {
            CompletionState::Pending(callback) => Some(callback),
            CompletionState::Completed => None,
        }
    }

    /// Invoke the callback with `value`; false if already completed
    pub fn complete(&self, value: T) -> bool {
        // The lock is released before the callback runs.
        match self.take() {
            Some(callback) => {
                callback(value);
                true
            }
            None => false,
        }
    }

    /// Mark completed without invoking the callback
    pub fn cancel(&self) -> bool {
        self.take().is_some()
    }

    pub fn is_completed(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        matches!(*state, CompletionState::Completed)
    }
}
