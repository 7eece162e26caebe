use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::BridgeError;

/// How the bridge waits for the host's call interface to appear
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AcquisitionStrategy {
    /// Check for the interface at a fixed interval
    #[default]
    Poll,
    /// Resolve the moment the interface is installed
    Trap,
}

/// Settings for a [`crate::Bridge`].
///
/// Every field has a default, so a configuration document only needs to
/// name the settings it changes:
///
/// ```
/// use webviewer_bridge::BridgeConfig;
///
/// let config = BridgeConfig::from_json(r#"{ "viewerName": "invoices" }"#).unwrap();
/// assert_eq!(config.viewer_name, "invoices");
/// assert_eq!(config.evaluate_script, "webviewer.evaluate");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    /// The name of the web viewer object hosting the page; the host uses it
    /// to route completions back to the right viewer
    pub viewer_name: String,
    /// The script the host runs to evaluate expressions
    pub evaluate_script: String,
    /// The global binding the host installs its call interface under
    pub host_global: String,
    /// How to wait for the host's call interface
    pub acquisition: AcquisitionStrategy,
    /// Milliseconds between checks while polling for the call interface
    pub poll_interval_ms: u64,
    /// Number of checks before the host is declared unavailable
    pub max_attempts: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            viewer_name: "webviewer".into(),
            evaluate_script: "webviewer.evaluate".into(),
            host_global: "FileMaker".into(),
            acquisition: AcquisitionStrategy::Poll,
            poll_interval_ms: 10,
            max_attempts: 300,
        }
    }
}

impl BridgeConfig {
    /// Parse a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self, BridgeError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The delay between two checks for the host interface
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// How long to wait for the host interface before giving up. Settings
    /// too large to represent wait for as long as a [`Duration`] can.
    pub fn acquisition_timeout(&self) -> Duration {
        self.poll_interval().saturating_mul(self.max_attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_waits_three_seconds_by_default() {
        let config = BridgeConfig::default();
        assert_eq!(config.acquisition_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn it_reads_partial_documents() {
        let config = BridgeConfig::from_json(
            r#"{ "acquisition": "trap", "pollIntervalMs": 50, "maxAttempts": 4 }"#,
        )
        .unwrap();

        assert_eq!(config.acquisition, AcquisitionStrategy::Trap);
        assert_eq!(config.acquisition_timeout(), Duration::from_millis(200));
        assert_eq!(config.viewer_name, "webviewer");
        assert_eq!(config.host_global, "FileMaker");
    }

    #[test]
    fn it_saturates_oversized_timeouts() {
        let config = BridgeConfig::from_json(
            r#"{ "acquisition": "trap", "pollIntervalMs": 18446744073709551615, "maxAttempts": 4000 }"#,
        )
        .unwrap();

        assert_eq!(config.acquisition_timeout(), Duration::MAX);

        let (bridge, _installer) = crate::Bridge::<crate::MemoryHost>::trapped(config);
        assert_eq!(bridge.config().max_attempts, 4000);
    }

    #[test]
    fn it_rejects_malformed_documents() {
        assert!(matches!(
            BridgeConfig::from_json("{ not json"),
            Err(BridgeError::Serialization(_))
        ));
    }
}
