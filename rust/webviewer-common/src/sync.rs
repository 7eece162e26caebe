//! Thread-safety bounds that only apply where threads exist.
//!
//! Inside the WebViewer the bridge runs on the page's single event loop and
//! JavaScript handles are neither `Send` nor `Sync`. Natively the bridge is
//! driven by tokio and its host may report completions from any thread. The
//! bounds below let one set of signatures serve both.

/// `Send` on native targets, no bound on `wasm32`
#[cfg(not(target_arch = "wasm32"))]
pub trait ConditionalSend: Send {}

#[cfg(not(target_arch = "wasm32"))]
impl<S> ConditionalSend for S where S: Send {}

/// `Send + Sync` on native targets, no bound on `wasm32`
#[cfg(not(target_arch = "wasm32"))]
pub trait ConditionalSync: Send + Sync {}

#[cfg(not(target_arch = "wasm32"))]
impl<S> ConditionalSync for S where S: Send + Sync {}

/// `Send` on native targets, no bound on `wasm32`
#[cfg(target_arch = "wasm32")]
pub trait ConditionalSend {}

#[cfg(target_arch = "wasm32")]
impl<S> ConditionalSend for S {}

/// `Send + Sync` on native targets, no bound on `wasm32`
#[cfg(target_arch = "wasm32")]
pub trait ConditionalSync {}

#[cfg(target_arch = "wasm32")]
impl<S> ConditionalSync for S {}

/// Interior mutability that is a `Mutex` natively and a `RefCell` on
/// `wasm32`.
///
/// Guards must never be held across an `.await` or while running a
/// caller-supplied continuation.
///
/// ```
/// use webviewer_common::SharedCell;
///
/// let cell = SharedCell::new(vec![1]);
/// cell.lock().push(2);
///
/// assert_eq!(*cell.lock(), vec![1, 2]);
/// ```
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Default)]
pub struct SharedCell<T>(std::sync::Mutex<T>);

#[cfg(not(target_arch = "wasm32"))]
impl<T> SharedCell<T> {
    /// Wrap `value`
    pub fn new(value: T) -> Self {
        Self(std::sync::Mutex::new(value))
    }

    /// Lock the cell. A panic while the lock was held does not poison it
    /// for later callers.
    pub fn lock(&self) -> std::sync::MutexGuard<'_, T> {
        self.0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Interior mutability that is a `Mutex` natively and a `RefCell` on
/// `wasm32`.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Default)]
pub struct SharedCell<T>(std::cell::RefCell<T>);

#[cfg(target_arch = "wasm32")]
impl<T> SharedCell<T> {
    /// Wrap `value`
    pub fn new(value: T) -> Self {
        Self(std::cell::RefCell::new(value))
    }

    /// Borrow the cell mutably. Panics on a re-entrant borrow, which the
    /// guard discipline above rules out.
    pub fn lock(&self) -> std::cell::RefMut<'_, T> {
        self.0.borrow_mut()
    }
}
