//! # Bidimap Core - WebDriver BiDi to CDP Mapper
//!
//! Core mapper logic that turns a single CDP connection to a Chromium
//! instance into a WebDriver BiDi session: incoming BiDi commands are
//! dispatched against a [`session::MapperSession`], which drives the
//! underlying browser over `bidimap-cdp` and turns its CDP events into
//! outgoing BiDi events.
//!
//! ## Module Organization
//!
//! - [`session`] - Top-level orchestrator: command dispatch and the CDP
//!   event listener task
//! - [`processor`] - `browsingContext.*`, `script.*`, and `cdp.*` command
//!   implementations
//! - [`browsing_context`] - The browsing-context tree and its navigation
//!   lifecycle state
//! - [`realm`] - Realm registry mapping CDP execution contexts to BiDi
//!   realms
//! - [`value`] - BiDi `RemoteValue` serialization and the script-handle
//!   registry
//! - [`target`] - Per-attached-target CDP session adapter
//! - [`preload`] - Preload-script bookkeeping
//! - [`events`] - Subscription tracking, buffering, and replay
//! - [`command`] - Wire-level command method and parameter types
//! - [`wire`] - BiDi message envelope parsing and serialization
//! - [`error`] - [`error::BidiError`], the mapper's error taxonomy
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use bidimap_cdp::CdpConnection;
//! use bidimap_core::session::{MapperSession, MapperSessionOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connection = Arc::new(CdpConnection::connect("ws://localhost:9222/devtools/browser/...").await?);
//! let session = MapperSession::new(connection, MapperSessionOptions::new("target-id"));
//!
//! let response = session.handle_message(serde_json::json!({
//!     "id": 1,
//!     "method": "session.status",
//!     "params": {},
//! })).await;
//! println!("{response}");
//! # Ok(())
//! # }
//! ```

pub mod browsing_context;
pub mod command;
pub mod error;
pub mod events;
pub mod preload;
pub mod processor;
pub mod realm;
pub mod session;
pub mod target;
pub mod value;
pub mod wire;

pub use error::BidiError;
pub use session::{MapperSession, MapperSessionOptions};
