#![warn(missing_docs)]

//! Light weight helpers shared by the WebViewer bridge crates. They paper
//! over the differences between native targets (where a tokio runtime drives
//! the bridge, usually in tests) and `wasm32-unknown-unknown` (where the
//! browser's event loop inside the WebViewer drives it).

mod sync;
pub use sync::*;

mod r#async;
pub use r#async::*;

mod time;
pub use time::*;
