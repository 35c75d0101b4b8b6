//! Transfer outcomes as reported to the uploader.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Final result of one session, from the uploader's point of view.
///
/// Deliberately coarse: receiver-side failure details never appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferOutcome {
    /// A downloader connected and the whole payload was relayed.
    Ok,
    /// A downloader connected but the relay did not complete.
    Failed,
    /// No downloader arrived within the wait bound.
    #[serde(rename = "timeout")]
    TimedOut,
    /// Another upload already holds the key.
    Conflict,
}

impl TransferOutcome {
    /// Short machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Failed => "failed",
            Self::TimedOut => "timeout",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimal structured status returned to programmatic uploaders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    /// Outcome of the transfer.
    pub result: TransferOutcome,
}

impl From<TransferOutcome> for StatusReply {
    fn from(result: TransferOutcome) -> Self {
        Self { result }
    }
}
