//! Cross-platform timers.
//!
//! The bridge only ever needs to wait for a fixed duration, so this module
//! exposes a single [`sleep`] that works on both native and WASM targets.

pub use std::time::Duration;

/// Wait for the given duration without blocking the executor.
///
/// Uses `tokio::time::sleep` on native targets.
#[cfg(not(target_arch = "wasm32"))]
pub async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await
}

/// Wait for the given duration without blocking the executor.
///
/// Uses the global `setTimeout` on WASM, so it works in windows and workers
/// alike. If no `setTimeout` is reachable the future resolves immediately.
#[cfg(target_arch = "wasm32")]
pub async fn sleep(duration: Duration) {
    use js_sys::{Function, Promise, Reflect};
    use wasm_bindgen::{JsCast, JsValue};

    let millis = duration.as_millis().min(i32::MAX as u128) as i32;
    let promise = Promise::new(&mut |resolve, _reject| {
        let global = js_sys::global();
        let set_timeout = Reflect::get(&global, &JsValue::from_str("setTimeout"))
            .ok()
            .and_then(|value| value.dyn_into::<Function>().ok());

        match set_timeout {
            Some(set_timeout) => {
                if set_timeout
                    .call2(&global, &resolve, &JsValue::from(millis))
                    .is_err()
                {
                    let _ = resolve.call0(&JsValue::UNDEFINED);
                }
            }
            None => {
                let _ = resolve.call0(&JsValue::UNDEFINED);
            }
        }
    });

    let _ = wasm_bindgen_futures::JsFuture::from(promise).await;
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn it_waits_for_the_requested_duration() {
        let start = tokio::time::Instant::now();
        sleep(Duration::from_millis(250)).await;
        assert!(start.elapsed() >= Duration::from_millis(250));
    }
}
