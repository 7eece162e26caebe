//! The text envelope every outbound call travels in.
//!
//! The host can only pass a single string to a script, so the bridge puts a
//! line of JSON metadata in front of the caller's parameter:
//!
//! ```text
//! {"scriptName":"Create Invoice","callId":7,"viewerName":"webviewer"}
//! <parameter text, which may itself span several lines>
//! ```
//!
//! Host-side scripts split the text at the first newline.

use serde::{Deserialize, Serialize};

use crate::{BridgeError, CallId};

/// Separates the metadata line from the parameter text
pub const ENVELOPE_SEPARATOR: char = '\n';

/// The metadata line of an outbound call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallMetadata {
    /// The script the call is addressed to
    pub script_name: String,
    /// The identifier the host must echo back on completion
    pub call_id: CallId,
    /// The web viewer the completion must be delivered to
    pub viewer_name: String,
    /// Set when the caller will not wait for a completion
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ignore_result: bool,
}

/// A complete outbound call: metadata plus the raw parameter text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEnvelope {
    /// The metadata line
    pub metadata: CallMetadata,
    /// The caller's parameter, already encoded as text
    pub parameter: String,
}

impl CallEnvelope {
    /// Render the envelope in its wire format
    pub fn encode(&self) -> Result<String, BridgeError> {
        // serde_json never emits a raw newline, so the metadata stays on one
        // line whatever the script or viewer names contain
        let mut encoded = serde_json::to_string(&self.metadata)?;
        encoded.push(ENVELOPE_SEPARATOR);
        encoded.push_str(&self.parameter);
        Ok(encoded)
    }

    /// Split wire text back into metadata and parameter
    pub fn decode(text: &str) -> Result<Self, BridgeError> {
        let (metadata, parameter) = text
            .split_once(ENVELOPE_SEPARATOR)
            .unwrap_or((text, ""));

        Ok(Self {
            metadata: serde_json::from_str(metadata)?,
            parameter: parameter.to_owned(),
        })
    }
}
