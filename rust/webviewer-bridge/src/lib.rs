#![warn(missing_docs)]

//! This crate lets a page running inside a host application's WebViewer
//! call the host's scripts as ordinary async functions.
//!
//! The host only offers a synchronous, string-only way to start a script,
//! and reports results later by calling one of two global functions with
//! the call's identifier. A [`Bridge`] gives every call an identifier,
//! remembers it in a [`CallRegistry`] until the host reports back, and turns
//! the result text into a [`serde_json::Value`] or a [`BridgeError`].
//!
//! On top of plain script calls the bridge offers:
//!
//! - [`Bridge::evaluate`]: evaluate a host expression with local bindings
//! - [`Bridge::execute_query`]: run SQL and get rows of columns back
//! - [`Bridge::execute_data_action`]: run a structured data API request
//!   and read its records through [`DataApiResponse::records`]
//!
//! ```ignore
//! // In the WebViewer (wasm32), once `install` has been called from JavaScript:
//! let rows = bridge
//!     .execute_query("SELECT name FROM customers WHERE region = ?", &[json!("North")])
//!     .await?;
//! ```

mod error;
pub use error::*;

mod config;
pub use config::*;

mod call;
pub use call::*;

mod registry;
pub use registry::*;

mod host;
pub use host::*;

mod envelope;
pub use envelope::*;

mod normalize;
pub use normalize::*;

mod bridge;
pub use bridge::*;

mod evaluate;
pub use evaluate::*;

mod query;
pub use query::*;

mod data_api;
pub use data_api::*;

mod memory;
pub use memory::*;

#[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
pub mod web;
