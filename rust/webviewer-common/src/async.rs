use std::future::Future;

/// A boxed future that is `Send` wherever the target allows threads.
#[cfg(not(target_arch = "wasm32"))]
pub type BoxedFuture<'a, T> = futures::future::BoxFuture<'a, T>;

/// A boxed future that is `Send` wherever the target allows threads.
#[cfg(target_arch = "wasm32")]
pub type BoxedFuture<'a, T> = futures::future::LocalBoxFuture<'a, T>;

/// Box a future into a [`BoxedFuture`].
#[cfg(not(target_arch = "wasm32"))]
pub fn boxed<'a, F>(future: F) -> BoxedFuture<'a, F::Output>
where
    F: Future + Send + 'a,
{
    Box::pin(future)
}

/// Box a future into a [`BoxedFuture`].
#[cfg(target_arch = "wasm32")]
pub fn boxed<'a, F>(future: F) -> BoxedFuture<'a, F::Output>
where
    F: Future + 'a,
{
    Box::pin(future)
}

/// Schedule a future on the local executor without observing its output.
#[cfg(target_arch = "wasm32")]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}

/// Schedule a future on the local executor without observing its output.
///
/// Must be called from within a tokio runtime.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(future);
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    #[tokio::test]
    async fn it_runs_detached_futures() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        spawn_detached(async move { flag.store(true, Ordering::SeqCst) });

        tokio::task::yield_now().await;
        assert!(ran.load(Ordering::SeqCst));
    }
}
