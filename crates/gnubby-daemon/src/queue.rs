//! Per-origin admission control for sign requests
//!
//! Many tabs sharing an app id would otherwise all prompt the security key
//! at once. Requests with the same `(app id, origin)` are admitted strictly
//! one at a time, in arrival order; different keys never wait on each other.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::countdown::CountdownTimer;

/// Key requests are serialized on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueKey {
    pub app_id: String,
    pub origin: String,
}

type StartFn = Box<dyn FnOnce(QueueToken) + Send>;

struct Entry {
    id: u64,
    timer: CountdownTimer,
    completed: Arc<AtomicBool>,
    /// Taken when the entry is admitted
    start: Option<StartFn>,
}

#[derive(Default)]
struct QueueState {
    queues: HashMap<QueueKey, VecDeque<Entry>>,
    next_id: u64,
}

fn lock(state: &Mutex<QueueState>) -> MutexGuard<'_, QueueState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Admit the head of `key`'s queue if nothing is running for it
///
/// Entries whose timer ran out while waiting are dropped without being
/// started; dropping the start function is how their owner learns of it.
fn admit_head(
    state: &Arc<Mutex<QueueState>>,
    guard: &mut QueueState,
    key: &QueueKey,
) -> Option<(StartFn, QueueToken)> {
    let queue = guard.queues.get_mut(key)?;

    let admitted = loop {
        let Some(head) = queue.front_mut() else {
            break None;
        };
        if head.start.is_none() {
            // Already running.
            return None;
        }
        if head.timer.expired() {
            debug!("Dropping expired sign request for {}", key.origin);
            queue.pop_front();
            continue;
        }

        let token = QueueToken {
            key: key.clone(),
            id: head.id,
            completed: Arc::clone(&head.completed),
            state: Arc::clone(state),
        };
        break head.start.take().map(|start| (start, token));
    };

    if queue.is_empty() {
        guard.queues.remove(key);
    }
    admitted
}

/// Origin-keyed FIFO of pending sign requests
#[derive(Clone, Default)]
pub struct OriginRequestQueue {
    state: Arc<Mutex<QueueState>>,
}

impl OriginRequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a request; `start` runs once it reaches the head of its key
    ///
    /// `start` receives the admission token and must not block. It runs
    /// synchronously on whichever caller admits it (this call, or the
    /// `complete` of the request ahead of it), after the queue lock is
    /// released, so it may queue further requests or complete tokens. The
    /// returned token refers to the same slot.
    pub fn queue_request<F>(
        &self,
        app_id: &str,
        origin: &str,
        start: F,
        timer: CountdownTimer,
    ) -> QueueToken
    where
        F: FnOnce(QueueToken) + Send + 'static,
    {
        let key = QueueKey {
            app_id: app_id.to_string(),
            origin: origin.to_string(),
        };
        let completed = Arc::new(AtomicBool::new(false));

        let (token, admitted) = {
            let mut guard = lock(&self.state);
            let id = guard.next_id;
            guard.next_id += 1;

            let queue = guard.queues.entry(key.clone()).or_default();
            queue.push_back(Entry {
                id,
                timer,
                completed: Arc::clone(&completed),
                start: Some(Box::new(start)),
            });
            debug!(
                "Queued sign request {} for {} ({} pending)",
                id,
                origin,
                queue.len()
            );

            let admitted = admit_head(&self.state, &mut guard, &key);
            let token = QueueToken {
                key,
                id,
                completed,
                state: Arc::clone(&self.state),
            };
            (token, admitted)
        };

        if let Some((start, head)) = admitted {
            start(head);
        }
        token
    }

    /// Requests waiting or running for a key
    pub fn pending(&self, app_id: &str, origin: &str) -> usize {
        let key = QueueKey {
            app_id: app_id.to_string(),
            origin: origin.to_string(),
        };
        lock(&self.state).queues.get(&key).map_or(0, VecDeque::len)
    }
}

/// A request's slot in the queue
///
/// Completing it releases the slot and admits the next request for the same
/// key. Clones refer to the same slot; only the first completion counts.
#[derive(Clone)]
pub struct QueueToken {
    key: QueueKey,
    id: u64,
    completed: Arc<AtomicBool>,
    state: Arc<Mutex<QueueState>>,
}

impl std::fmt::Debug for QueueToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueToken")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("completed", &self.is_completed())
            .finish()
    }
}

impl QueueToken {
    pub fn key(&self) -> &QueueKey {
        &self.key
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Release the slot
    pub fn complete(&self) {
        if self.completed.swap(true, Ordering::SeqCst) {
            return;
        }

        let admitted = {
            let mut guard = lock(&self.state);
            let Some(queue) = guard.queues.get_mut(&self.key) else {
                return;
            };
            let Some(position) = queue.iter().position(|entry| entry.id == self.id) else {
                return;
            };
            queue.remove(position);
            debug!("Released sign request {} for {}", self.id, self.key.origin);

            if position == 0 {
                admit_head(&self.state, &mut guard, &self.key)
            } else {
                None
            }
        };

        if let Some((start, head)) = admitted {
            start(head);
        }
    }
}
