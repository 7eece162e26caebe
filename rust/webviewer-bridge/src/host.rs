//! The host's call interface and the machinery for waiting until it exists.
//!
//! The host injects its call interface into the page some time after the
//! page starts running. A [`HostHandle`] is the single shared future that
//! every call awaits before it is sent; it either resolves to the host or
//! fails permanently once the acquisition timeout passes.

use std::{fmt::Display, sync::Arc, time::Duration};

use futures::{
    FutureExt,
    future::{Either, Shared, select},
};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use webviewer_common::{BoxedFuture, ConditionalSend, ConditionalSync, SharedCell, boxed, sleep};

use crate::BridgeError;

/// How the host should treat a script that is already running when a new
/// call arrives
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScriptOption {
    /// Queue the new script behind the running one
    Continue = 0,
    /// Halt the running script and all scripts that called it
    Halt = 1,
    /// Exit the running script, letting its caller continue
    Exit = 2,
    /// Resume a paused script before running the new one
    Resume = 3,
    /// Pause the running script until the new one finishes
    Pause = 4,
    /// Interrupt the running script, then resume it afterwards
    Interrupt = 5,
}

impl ScriptOption {
    /// The numeric code understood by the host
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl Display for ScriptOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// The synchronous, string-only call interface exposed by the host.
///
/// Both methods return as soon as the host has accepted the call; the result
/// arrives later through [`crate::Bridge::on_call_succeeded`] or
/// [`crate::Bridge::on_call_failed`].
pub trait Host: ConditionalSend + ConditionalSync {
    /// Run the named script with a text parameter
    fn perform_script(&self, name: &str, parameter: &str) -> Result<(), BridgeError>;

    /// Run the named script, telling the host how to treat a script that is
    /// already running
    fn perform_script_with_option(
        &self,
        name: &str,
        parameter: &str,
        option: ScriptOption,
    ) -> Result<(), BridgeError>;
}

impl<H> Host for Arc<H>
where
    H: Host + ?Sized,
{
    fn perform_script(&self, name: &str, parameter: &str) -> Result<(), BridgeError> {
        H::perform_script(self, name, parameter)
    }

    fn perform_script_with_option(
        &self,
        name: &str,
        parameter: &str,
        option: ScriptOption,
    ) -> Result<(), BridgeError> {
        H::perform_script_with_option(self, name, parameter, option)
    }
}

/// Looks for the host's call interface at a known location
pub trait HostLocator<H>: ConditionalSend {
    /// The host, if it has been installed yet
    fn locate(&self) -> Option<Arc<H>>;
}

impl<H, F> HostLocator<H> for F
where
    F: Fn() -> Option<Arc<H>> + ConditionalSend,
{
    fn locate(&self) -> Option<Arc<H>> {
        self()
    }
}

type Acquisition<H> = Shared<BoxedFuture<'static, Result<Arc<H>, BridgeError>>>;

/// A shared, lazily driven future resolving to the host.
///
/// Cloning the handle shares the same acquisition: the host is located at
/// most once, and every clone observes the same outcome.
pub struct HostHandle<H> {
    acquisition: Acquisition<H>,
}

impl<H> Clone for HostHandle<H> {
    fn clone(&self) -> Self {
        Self {
            acquisition: self.acquisition.clone(),
        }
    }
}

impl<H> std::fmt::Debug for HostHandle<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostHandle")
            .field("settled", &self.acquisition.peek().is_some())
            .finish()
    }
}

impl<H> HostHandle<H>
where
    H: ConditionalSend + ConditionalSync + 'static,
{
    /// A handle for a host that is already available
    pub fn ready(host: Arc<H>) -> Self {
        Self::from_future(boxed(async move { Ok(host) }))
    }

    /// Check `locator` immediately and then once per `interval`, giving up
    /// after `max_attempts` intervals have passed.
    pub fn poll<L>(locator: L, interval: Duration, max_attempts: u32) -> Self
    where
        L: HostLocator<H> + 'static,
    {
        Self::from_future(boxed(async move {
            for _ in 0..max_attempts {
                if let Some(host) = locator.locate() {
                    return Ok(host);
                }
                sleep(interval).await;
            }

            match locator.locate() {
                Some(host) => Ok(host),
                None => {
                    let waited = interval.saturating_mul(max_attempts);
                    tracing::error!(?waited, "Host interface never became available");
                    Err(BridgeError::HostUnavailable { waited })
                }
            }
        }))
    }

    /// Resolve as soon as the returned [`HostInstaller`] is used, failing
    /// once `timeout` passes without an installation.
    pub fn trap(timeout: Duration) -> (Self, HostInstaller<H>) {
        let (sender, receiver) = oneshot::channel::<Arc<H>>();
        let handle = Self::from_future(boxed(async move {
            match select(receiver, Box::pin(sleep(timeout))).await {
                Either::Left((Ok(host), _)) => Ok(host),
                Either::Left((Err(_), _)) => {
                    tracing::error!("Host installer was dropped before installing a host");
                    Err(BridgeError::HostUnavailable { waited: timeout })
                }
                Either::Right(_) => {
                    tracing::error!(waited = ?timeout, "Host interface never became available");
                    Err(BridgeError::HostUnavailable { waited: timeout })
                }
            }
        }));

        (
            handle,
            HostInstaller {
                sender: SharedCell::new(Some(sender)),
            },
        )
    }

    fn from_future(future: BoxedFuture<'static, Result<Arc<H>, BridgeError>>) -> Self {
        Self {
            acquisition: future.shared(),
        }
    }

    /// Wait for the host. Every caller observes the same outcome.
    pub async fn acquire(&self) -> Result<Arc<H>, BridgeError> {
        self.acquisition.clone().await
    }

    /// The outcome of the acquisition, if it has settled
    pub fn peek(&self) -> Option<Result<Arc<H>, BridgeError>> {
        self.acquisition.peek().cloned()
    }
}

/// The write side of a trapped [`HostHandle`]
#[derive(Debug)]
pub struct HostInstaller<H> {
    sender: SharedCell<Option<oneshot::Sender<Arc<H>>>>,
}

impl<H> HostInstaller<H> {
    /// Hand the host to everything waiting on the handle. Only the first
    /// installation counts; later ones return `false`.
    pub fn install(&self, host: Arc<H>) -> bool {
        let sender = self.sender.lock().take();
        match sender {
            Some(sender) => sender.send(host).is_ok(),
            None => false,
        }
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::MemoryHost;

    #[tokio::test(start_paused = true)]
    async fn it_resolves_once_the_locator_finds_the_host() {
        let checks = Arc::new(AtomicU32::new(0));
        let counter = checks.clone();
        let host = Arc::new(MemoryHost::new());
        let located = host.clone();

        let handle = HostHandle::poll(
            move || {
                if counter.fetch_add(1, Ordering::SeqCst) >= 3 {
                    Some(located.clone())
                } else {
                    None
                }
            },
            Duration::from_millis(10),
            100,
        );

        let acquired = handle.acquire().await.unwrap();
        assert!(Arc::ptr_eq(&acquired, &host));
        assert_eq!(checks.load(Ordering::SeqCst), 4);

        // Later acquisitions reuse the settled outcome
        handle.acquire().await.unwrap();
        assert_eq!(checks.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn it_gives_up_after_the_last_attempt() {
        let handle: HostHandle<MemoryHost> =
            HostHandle::poll(|| None, Duration::from_millis(10), 300);

        let error = handle.acquire().await.unwrap_err();
        assert_eq!(
            error,
            BridgeError::HostUnavailable {
                waited: Duration::from_secs(3)
            }
        );
        assert!(matches!(handle.peek(), Some(Err(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn it_resolves_when_the_trap_is_sprung() {
        let (handle, installer) = HostHandle::trap(Duration::from_secs(3));
        let host = Arc::new(MemoryHost::new());

        assert!(installer.install(host.clone()));
        assert!(!installer.install(host.clone()));

        let acquired = handle.acquire().await.unwrap();
        assert!(Arc::ptr_eq(&acquired, &host));
    }

    #[tokio::test(start_paused = true)]
    async fn it_times_out_when_the_trap_is_never_sprung() {
        let (handle, _installer) = HostHandle::<MemoryHost>::trap(Duration::from_secs(3));

        assert!(matches!(
            handle.acquire().await,
            Err(BridgeError::HostUnavailable { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn it_reports_a_saturated_wait_for_oversized_intervals() {
        let handle: HostHandle<MemoryHost> = HostHandle::poll(|| None, Duration::MAX, 2);

        assert_eq!(
            handle.acquire().await.unwrap_err(),
            BridgeError::HostUnavailable {
                waited: Duration::MAX
            }
        );
    }

    #[test]
    fn it_reports_host_script_option_codes() {
        assert_eq!(ScriptOption::Continue.code(), 0);
        assert_eq!(ScriptOption::Interrupt.to_string(), "5");
    }
}
