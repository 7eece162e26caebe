use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::{CallId, DataAction};

/// The common error type used by this crate
///
/// The type is [`Clone`] because a single acquisition failure is shared by
/// every call that was waiting on the host.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// The host's call interface never appeared
    #[error("Host interface was not available after {waited:?}")]
    HostUnavailable {
        /// How long the bridge waited before giving up
        waited: Duration,
    },

    /// The host explicitly reported failure for a call
    #[error("Call {call_id} was rejected by the host: {message}")]
    CallRejected {
        /// The call that failed
        call_id: CallId,
        /// A host supplied error code, when the payload was structured
        code: Option<String>,
        /// A human readable description of the failure
        message: String,
        /// The structured rejection payload, if it could be decoded
        detail: Option<Value>,
    },

    /// A data API response did not carry a usable message list
    #[error("Malformed data API response: {0}")]
    MalformedEnvelope(String),

    /// A data API response reported a non-success code
    #[error("Data API error {code}: {message}")]
    Application {
        /// The code reported in the first message of the response
        code: String,
        /// The text reported in the first message of the response
        message: String,
    },

    /// The host's SQL engine reported an error instead of rows
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Invoking the host's call interface failed synchronously
    #[error("Host call failed: {0}")]
    Host(String),

    /// A value could not be converted to or from its text representation
    #[error("Could not convert value: {0}")]
    Serialization(String),

    /// A local binding name cannot be used in a host expression
    #[error("Invalid binding name: {0:?}")]
    InvalidBinding(String),

    /// An identifier was registered while a call with the same identifier
    /// was still pending
    #[error("Call {0} is already pending")]
    DuplicateCall(CallId),

    /// The completion channel for a call was dropped without a result
    #[error("Call {0} was abandoned before it completed")]
    Abandoned(CallId),

    /// Records were requested from a response that does not carry any
    #[error("A {0} response does not contain records")]
    NotReadable(DataAction),
}

impl From<serde_json::Error> for BridgeError {
    fn from(value: serde_json::Error) -> Self {
        BridgeError::Serialization(format!("{value}"))
    }
}
