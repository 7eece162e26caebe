//! An in-memory [`Host`] for tests and examples.
//!
//! The host records every call it receives. Completions are delivered
//! explicitly, usually with [`MemoryHost::answer`] running alongside the
//! call being tested:
//!
//! ```
//! # use std::sync::Arc;
//! # use webviewer_bridge::{Bridge, CallOptions, MemoryHost};
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let host = Arc::new(MemoryHost::new());
//! let bridge = Bridge::with_host(host.clone());
//!
//! let (result, call) = futures::join!(
//!     bridge.perform_script("Archive", &42, CallOptions::default()),
//!     host.answer(&bridge, |_call| Err("Archive is locked".into())),
//! );
//!
//! assert!(result.is_err());
//! assert_eq!(call.unwrap().parameter(), "42");
//! # }
//! ```

use tokio::sync::{Mutex, mpsc};
use webviewer_common::SharedCell;

use crate::{Bridge, BridgeError, CallEnvelope, CallId, Host, ScriptOption};

/// A call as the host received it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// The script the call was addressed to
    pub script_name: String,
    /// The decoded envelope
    pub envelope: CallEnvelope,
    /// The running-script disposition, if one was given
    pub option: Option<ScriptOption>,
}

impl RecordedCall {
    /// The identifier the completion must carry
    pub fn call_id(&self) -> CallId {
        self.envelope.metadata.call_id
    }

    /// The parameter text the caller sent
    pub fn parameter(&self) -> &str {
        &self.envelope.parameter
    }
}

/// A [`Host`] that records calls instead of running scripts
#[derive(Debug)]
pub struct MemoryHost {
    calls: SharedCell<Vec<RecordedCall>>,
    failure: SharedCell<Option<String>>,
    outbox: mpsc::UnboundedSender<RecordedCall>,
    inbox: Mutex<mpsc::UnboundedReceiver<RecordedCall>>,
}

impl MemoryHost {
    /// Create a host that accepts every call
    pub fn new() -> Self {
        let (outbox, inbox) = mpsc::unbounded_channel();
        Self {
            calls: SharedCell::new(Vec::new()),
            failure: SharedCell::new(None),
            outbox,
            inbox: Mutex::new(inbox),
        }
    }

    /// Make every later invocation fail synchronously with `message`
    pub fn refuse_calls(&self, message: &str) {
        *self.failure.lock() = Some(message.to_owned());
    }

    /// Every call received so far, oldest first
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Wait for the next call that has not been taken yet
    pub async fn next_call(&self) -> Option<RecordedCall> {
        self.inbox.lock().await.recv().await
    }

    /// Wait for the next call and complete it on `bridge` with whatever
    /// `respond` returns: `Ok` text as a success, `Err` text as a failure.
    pub async fn answer<H, F>(&self, bridge: &Bridge<H>, respond: F) -> Option<RecordedCall>
    where
        H: Host + 'static,
        F: FnOnce(&RecordedCall) -> Result<String, String>,
    {
        let call = self.next_call().await?;
        match respond(&call) {
            Ok(result) => bridge.on_call_succeeded(call.call_id(), result),
            Err(error) => bridge.on_call_failed(call.call_id(), error),
        };
        Some(call)
    }

    fn receive(
        &self,
        name: &str,
        parameter: &str,
        option: Option<ScriptOption>,
    ) -> Result<(), BridgeError> {
        if let Some(message) = self.failure.lock().clone() {
            return Err(BridgeError::Host(message));
        }

        let call = RecordedCall {
            script_name: name.to_owned(),
            envelope: CallEnvelope::decode(parameter)
                .map_err(|error| BridgeError::Host(format!("unreadable envelope: {error}")))?,
            option,
        };
        self.calls.lock().push(call.clone());
        // The receiving half lives as long as the host does
        let _ = self.outbox.send(call);
        Ok(())
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for MemoryHost {
    fn perform_script(&self, name: &str, parameter: &str) -> Result<(), BridgeError> {
        self.receive(name, parameter, None)
    }

    fn perform_script_with_option(
        &self,
        name: &str,
        parameter: &str,
        option: ScriptOption,
    ) -> Result<(), BridgeError> {
        self.receive(name, parameter, Some(option))
    }
}
