use std::sync::Arc;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use webviewer_common::spawn_detached;

use crate::{
    BridgeConfig, BridgeError, CallEnvelope, CallId, CallIdGenerator, CallMetadata, CallRegistry,
    Completion, Host, HostHandle, HostInstaller, HostLocator, PendingCall, ScriptOption,
    normalize_rejection, normalize_result,
};

/// Per-call settings for [`Bridge::perform_script`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CallOptions {
    /// Hand back the raw result text without attempting to decode it
    pub always_return_string: bool,
    /// Do not wait for a completion. Used for scripts that tear down the
    /// page that called them; the call resolves to `null` once sent.
    pub ignore_result: bool,
    /// How the host should treat a script that is already running
    pub script_option: Option<ScriptOption>,
}

impl CallOptions {
    /// Return the raw result text
    pub fn always_return_string(mut self) -> Self {
        self.always_return_string = true;
        self
    }

    /// Resolve as soon as the call is sent
    pub fn ignore_result(mut self) -> Self {
        self.ignore_result = true;
        self
    }

    /// Send the call with a running-script disposition
    pub fn script_option(mut self, option: ScriptOption) -> Self {
        self.script_option = Some(option);
        self
    }
}

struct BridgeState<H> {
    config: BridgeConfig,
    host: HostHandle<H>,
    registry: CallRegistry,
    call_ids: CallIdGenerator,
}

/// Issues calls to the host and pairs them with the completions the host
/// delivers later.
///
/// Clones share the same host handle and registry, so a clone can be handed
/// to whatever receives the host's completions.
///
/// ```
/// # use std::sync::Arc;
/// # use webviewer_bridge::{Bridge, CallOptions, MemoryHost};
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), webviewer_bridge::BridgeError> {
/// let host = Arc::new(MemoryHost::new());
/// let bridge = Bridge::with_host(host.clone());
///
/// let (result, _call) = futures::join!(
///     bridge.perform_script("Count Invoices", "open", CallOptions::default()),
///     host.answer(&bridge, |_call| Ok(r#"{"total":3}"#.into())),
/// );
/// assert_eq!(result?["total"], 3);
/// # Ok(())
/// # }
/// ```
pub struct Bridge<H> {
    state: Arc<BridgeState<H>>,
}

impl<H> Clone for Bridge<H> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<H> std::fmt::Debug for Bridge<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("config", &self.state.config)
            .field("host", &self.state.host)
            .field("pending", &self.state.registry.len())
            .finish()
    }
}

impl<H> Bridge<H>
where
    H: Host + 'static,
{
    /// Create a bridge that sends calls through `host` once it resolves
    pub fn new(config: BridgeConfig, host: HostHandle<H>) -> Self {
        Self {
            state: Arc::new(BridgeState {
                config,
                host,
                registry: CallRegistry::new(),
                call_ids: CallIdGenerator::new(),
            }),
        }
    }

    /// Create a bridge with default settings for a host that is already
    /// available
    pub fn with_host(host: Arc<H>) -> Self {
        Self::new(BridgeConfig::default(), HostHandle::ready(host))
    }

    /// Create a bridge that polls `locator` for the host, as configured
    pub fn polling<L>(config: BridgeConfig, locator: L) -> Self
    where
        L: HostLocator<H> + 'static,
    {
        let host = HostHandle::poll(locator, config.poll_interval(), config.max_attempts);
        Self::new(config, host)
    }

    /// Create a bridge that waits for the host to be installed through the
    /// returned [`HostInstaller`]
    pub fn trapped(config: BridgeConfig) -> (Self, HostInstaller<H>) {
        let (host, installer) = HostHandle::trap(config.acquisition_timeout());
        (Self::new(config, host), installer)
    }

    /// The settings this bridge was created with
    pub fn config(&self) -> &BridgeConfig {
        &self.state.config
    }

    /// The calls currently waiting for the host
    pub fn registry(&self) -> &CallRegistry {
        &self.state.registry
    }

    /// The shared host acquisition
    pub fn host(&self) -> &HostHandle<H> {
        &self.state.host
    }

    /// Run a host script and wait for its result.
    ///
    /// Text parameters are sent verbatim; any other parameter, `null`
    /// included, is sent as JSON. Unless
    /// [`CallOptions::always_return_string`] is set, the result is decoded
    /// opportunistically (see [`normalize_result`]).
    pub async fn perform_script<P>(
        &self,
        name: &str,
        parameter: &P,
        options: CallOptions,
    ) -> Result<Value, BridgeError>
    where
        P: Serialize + ?Sized,
    {
        let parameter = encode_parameter(parameter)?;
        self.dispatch(name, parameter, options).await
    }

    /// Run a host script and decode its result into `T`
    pub async fn perform_script_as<T, P>(
        &self,
        name: &str,
        parameter: &P,
        options: CallOptions,
    ) -> Result<T, BridgeError>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let value = self.perform_script(name, parameter, options).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Run a host script without waiting for it. A failure is logged, since
    /// nobody is left to observe it.
    pub fn spawn_script<P>(&self, name: &str, parameter: &P, options: CallOptions)
    where
        P: Serialize + ?Sized,
    {
        let name = name.to_owned();
        let parameter = match encode_parameter(parameter) {
            Ok(parameter) => parameter,
            Err(error) => {
                tracing::error!(script = %name, %error, "Unobserved call could not be sent");
                return;
            }
        };
        let bridge = self.clone();

        spawn_detached(async move {
            if let Err(error) = bridge.dispatch(&name, parameter, options).await {
                tracing::error!(script = %name, %error, "Unobserved call failed");
            }
        });
    }

    async fn dispatch(
        &self,
        name: &str,
        parameter: String,
        options: CallOptions,
    ) -> Result<Value, BridgeError> {
        let host = self.state.host.acquire().await?;
        let call_id = self.state.call_ids.next_id();
        let envelope = CallEnvelope {
            metadata: CallMetadata {
                script_name: name.to_owned(),
                call_id,
                viewer_name: self.state.config.viewer_name.clone(),
                ignore_result: options.ignore_result,
            },
            parameter,
        }
        .encode()?;

        if options.ignore_result {
            tracing::debug!(%call_id, script = %name, "Sending call without waiting for a result");
            invoke(host.as_ref(), name, &envelope, options.script_option)?;
            return Ok(Value::Null);
        }

        // Registered before the host is invoked, since a host may complete
        // the call before returning.
        let (pending, completion) = PendingCall::channel();
        self.state.registry.register(call_id, pending)?;

        tracing::debug!(%call_id, script = %name, "Sending call");
        if let Err(error) = invoke(host.as_ref(), name, &envelope, options.script_option) {
            self.state.registry.discard(call_id);
            return Err(error);
        }

        match completion.await {
            Ok(Completion::Succeeded(raw)) if options.always_return_string => Ok(Value::String(raw)),
            Ok(Completion::Succeeded(raw)) => Ok(normalize_result(raw)),
            Ok(Completion::Failed(raw)) => Err(normalize_rejection(call_id, raw)),
            Err(_) => Err(BridgeError::Abandoned(call_id)),
        }
    }

    /// Inbound entry point: the host finished `call_id` successfully.
    /// Returns `false` for unknown or already completed calls.
    pub fn on_call_succeeded(&self, call_id: CallId, result: String) -> bool {
        tracing::debug!(%call_id, "Host reported success");
        self.state.registry.complete(call_id, result)
    }

    /// Inbound entry point: the host failed `call_id`. Returns `false` for
    /// unknown or already completed calls.
    pub fn on_call_failed(&self, call_id: CallId, error: String) -> bool {
        tracing::debug!(%call_id, "Host reported failure");
        self.state.registry.fail(call_id, error)
    }
}

fn invoke<H>(
    host: &H,
    name: &str,
    envelope: &str,
    option: Option<ScriptOption>,
) -> Result<(), BridgeError>
where
    H: Host + ?Sized,
{
    match option {
        Some(option) => host.perform_script_with_option(name, envelope, option),
        None => host.perform_script(name, envelope),
    }
}

/// Render a parameter as the text a host script receives
pub fn encode_parameter<P>(parameter: &P) -> Result<String, BridgeError>
where
    P: Serialize + ?Sized,
{
    Ok(match serde_json::to_value(parameter)? {
        Value::String(text) => text,
        value => serde_json::to_string(&value)?,
    })
}
