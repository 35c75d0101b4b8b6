//! # passthru-types
//!
//! Shared vocabulary for the passthru streaming relay.
//!
//! - [`SessionKey`] - One-time key pairing an uploader with a downloader
//! - [`TransferOutcome`], [`StatusReply`] - What the uploader is told
//! - [`RelayMetadata`] - Length, content type and filename forwarded to the downloader
//! - [`KeyError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod key;
mod metadata;
mod outcome;

pub use error::KeyError;
pub use key::SessionKey;
pub use metadata::{parse_declared_length, RelayMetadata};
pub use outcome::{StatusReply, TransferOutcome};
