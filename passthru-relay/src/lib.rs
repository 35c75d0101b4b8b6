//! # passthru-relay
//!
//! Rendezvous and streaming relay server for one-shot file handoff.
//!
//! A sender uploads a file to `/upload/{key}`; the upload blocks until a
//! receiver opens `/download/{key}`, and the bytes then flow straight from
//! the upload request into the download response. Nothing is stored and
//! only one chunk is held in memory at a time.
//!
//! ## Architecture
//!
//! ```text
//! Sender ──POST /upload/k──┐                 ┌──GET /download/k── Receiver
//!                          │                 │
//!                      ┌───┴─────────────────┴───┐
//!                      │     passthru-relay      │
//!                      │  registry: k → Session  │
//!                      │  Session: presence,     │
//!                      │           result        │
//!                      └─────────────────────────┘
//! ```
//!
//! ## Session protocol
//!
//! - upload registers a [`session::Session`] and waits for a peer (bounded)
//! - download claims it: "peer connected"
//! - the relay streams the `file` part: "finished(ok | failed)"
//! - the upload returns and its registration is dropped, freeing the key

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;

pub use config::Config;
pub use error::{RelayError, Result};
pub use server::{PassthruRelay, RelayMetrics};
