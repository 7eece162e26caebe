//! The table of calls that are waiting for the host to report back.
//!
//! The host delivers every completion through the same pair of global entry
//! points, so the registry is the only thing that knows which caller a given
//! completion belongs to.

use std::collections::HashMap;

use tokio::sync::oneshot;
use webviewer_common::SharedCell;

use crate::{BridgeError, CallId};

/// How the host resolved a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The host reported success, carrying the raw result text
    Succeeded(String),
    /// The host reported failure, carrying the raw error text
    Failed(String),
}

/// A call that has been sent to the host and not yet resolved.
///
/// Resolving consumes the pending call, so its continuation can run at most
/// once.
#[derive(Debug)]
pub struct PendingCall {
    continuation: oneshot::Sender<Completion>,
}

impl PendingCall {
    /// Create a pending call together with the receiver its completion will
    /// be delivered to.
    pub fn channel() -> (Self, oneshot::Receiver<Completion>) {
        let (continuation, receiver) = oneshot::channel();
        (Self { continuation }, receiver)
    }

    fn resolve(self, completion: Completion) -> Result<(), Completion> {
        self.continuation.send(completion)
    }
}

/// Maps call identifiers to their [`PendingCall`]s.
#[derive(Debug, Default)]
pub struct CallRegistry {
    pending: SharedCell<HashMap<CallId, PendingCall>>,
}

impl CallRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a call. Fails if a call with the same identifier is
    /// still pending.
    pub fn register(&self, id: CallId, call: PendingCall) -> Result<(), BridgeError> {
        let mut pending = self.pending.lock();
        if pending.contains_key(&id) {
            return Err(BridgeError::DuplicateCall(id));
        }
        pending.insert(id, call);
        Ok(())
    }

    /// Resolve a call successfully. Returns `false` if no call with this
    /// identifier is pending, which covers both unknown identifiers and
    /// repeated deliveries.
    pub fn complete(&self, id: CallId, result: String) -> bool {
        self.settle(id, Completion::Succeeded(result))
    }

    /// Resolve a call with a failure. Returns `false` if no call with this
    /// identifier is pending.
    pub fn fail(&self, id: CallId, error: String) -> bool {
        self.settle(id, Completion::Failed(error))
    }

    /// Stop tracking a call without resolving it
    pub fn discard(&self, id: CallId) -> bool {
        self.pending.lock().remove(&id).is_some()
    }

    /// Whether a call with this identifier is waiting for the host
    pub fn is_pending(&self, id: CallId) -> bool {
        self.pending.lock().contains_key(&id)
    }

    /// The number of calls waiting for the host
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether no calls are waiting for the host
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn settle(&self, id: CallId, completion: Completion) -> bool {
        // The entry is removed before the continuation runs, so the guard is
        // released by the time the caller observes its result.
        let removed = self.pending.lock().remove(&id);
        let Some(call) = removed else {
            tracing::warn!(%id, "Ignoring completion for a call that is not pending");
            return false;
        };

        if call.resolve(completion).is_err() {
            tracing::debug!(%id, "Caller stopped waiting before the host completed the call");
        }

        true
    }
}
