//! Per-key rendezvous sessions.
//!
//! A [`Session`] pairs one uploader with one downloader. The uploader keeps
//! the [`PeerWait`] half and blocks on it twice: first for the peer to show
//! up (or the wait bound to expire), then for the relay result. The
//! downloader claims the upload body with [`Session::claim`] and reports the
//! result through the returned [`PeerLink`].
//!
//! Both messages travel over one bounded channel, always in the order
//! "peer connected" then "finished".

use crate::error::{RelayError, Result};
use crate::relay::UploadBody;
use passthru_types::{SessionKey, TransferOutcome};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

/// Exactly two signals are ever sent per session.
const SIGNAL_CAPACITY: usize = 2;

/// Message from the downloader side to the waiting uploader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// A downloader claimed the session.
    PeerConnected,
    /// The relay finished with this outcome.
    Finished(TransferOutcome),
}

/// Session state machine states, as seen by the uploader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registered, no downloader yet.
    WaitingForPeer,
    /// A downloader claimed the upload; relay in progress.
    PeerConnected,
    /// The relay result arrived.
    ResultDelivered(TransferOutcome),
    /// The wait bound expired before any downloader arrived.
    TimedOut,
}

/// One pending or active transfer.
pub struct Session {
    key: SessionKey,
    upload: Mutex<Option<UploadBody>>,
    signals: mpsc::Sender<Signal>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("claimed", &self.lock_upload().is_none())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session for an upload, returning the uploader's wait handle.
    pub fn open(key: SessionKey, upload: UploadBody) -> (Arc<Session>, PeerWait) {
        let (signals, receiver) = mpsc::channel(SIGNAL_CAPACITY);
        let session = Arc::new(Session {
            key,
            upload: Mutex::new(Some(upload)),
            signals,
        });
        let wait = PeerWait {
            session: session.clone(),
            receiver,
            state: SessionState::WaitingForPeer,
        };
        (session, wait)
    }

    /// The session key.
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Whether a downloader (or the timeout) has already taken the upload.
    pub fn is_claimed(&self) -> bool {
        self.lock_upload().is_none()
    }

    /// Claim the upload as the downloading peer.
    ///
    /// Sends the presence signal without blocking. Returns `None` when the
    /// upload was already claimed by another downloader or withdrawn by the
    /// uploader's timeout.
    pub fn claim(&self) -> Option<(UploadBody, PeerLink)> {
        let upload = self.lock_upload().take()?;
        tracing::debug!("Peer claimed session {:?}", self.key);
        Some((upload, self.connect()))
    }

    /// Announce the peer and hand out its link.
    fn connect(&self) -> PeerLink {
        // Capacity 2 and at most two sends: this cannot be full.
        if self.signals.try_send(Signal::PeerConnected).is_err() {
            tracing::warn!("Uploader for {:?} is gone", self.key);
        }

        PeerLink {
            key: self.key.clone(),
            signals: self.signals.clone(),
            finished: false,
        }
    }

    /// Take the upload back after the wait bound expired.
    fn withdraw(&self) -> Option<UploadBody> {
        self.lock_upload().take()
    }

    fn lock_upload(&self) -> MutexGuard<'_, Option<UploadBody>> {
        self.upload.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Uploader half of a session.
#[derive(Debug)]
pub struct PeerWait {
    session: Arc<Session>,
    receiver: mpsc::Receiver<Signal>,
    state: SessionState,
}

impl PeerWait {
    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Block until a downloader connects or `timeout` elapses.
    ///
    /// When the timer fires, the uploader races the downloader for the
    /// upload body. Whoever takes it first wins; a peer that claimed the
    /// body at the last moment still counts as connected.
    pub async fn wait_for_peer(&mut self, timeout: Duration) -> Result<()> {
        if self.state != SessionState::WaitingForPeer {
            return Ok(());
        }

        tokio::select! {
            signal = self.receiver.recv() => {
                self.state = match signal {
                    Some(Signal::PeerConnected) => SessionState::PeerConnected,
                    Some(Signal::Finished(outcome)) => SessionState::ResultDelivered(outcome),
                    // The session we hold owns a sender, so the channel cannot close.
                    None => SessionState::ResultDelivered(TransferOutcome::Failed),
                };
                Ok(())
            }
            _ = tokio::time::sleep(timeout) => {
                if self.session.withdraw().is_some() {
                    self.state = SessionState::TimedOut;
                    return Err(RelayError::PeerTimeout {
                        waited_secs: timeout.as_secs(),
                    });
                }
                self.state = SessionState::PeerConnected;
                Ok(())
            }
        }
    }

    /// Block until the relay reports its outcome.
    ///
    /// Has no timeout of its own; it is bounded by the downloader's request.
    pub async fn wait_for_result(&mut self) -> TransferOutcome {
        match self.state {
            SessionState::ResultDelivered(outcome) => return outcome,
            SessionState::TimedOut => return TransferOutcome::TimedOut,
            SessionState::WaitingForPeer | SessionState::PeerConnected => {}
        }

        let outcome = loop {
            match self.receiver.recv().await {
                Some(Signal::PeerConnected) => continue,
                Some(Signal::Finished(outcome)) => break outcome,
                None => break TransferOutcome::Failed,
            }
        };
        self.state = SessionState::ResultDelivered(outcome);
        outcome
    }

    /// Run the whole uploader side: wait for a peer, then for the result.
    pub async fn run(&mut self, timeout: Duration) -> TransferOutcome {
        match self.wait_for_peer(timeout).await {
            Ok(()) => self.wait_for_result().await,
            Err(e) => e.outcome(),
        }
    }
}

/// Downloader half of a session.
///
/// Dropping the link without calling [`PeerLink::finish`] reports
/// [`TransferOutcome::Failed`], which covers a downloader that disconnects
/// mid-relay.
pub struct PeerLink {
    key: SessionKey,
    signals: mpsc::Sender<Signal>,
    finished: bool,
}

impl fmt::Debug for PeerLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerLink")
            .field("key", &self.key)
            .field("finished", &self.finished)
            .finish()
    }
}

impl PeerLink {
    /// Report the relay outcome to the uploader.
    pub fn finish(mut self, outcome: TransferOutcome) {
        self.send(outcome);
    }

    fn send(&mut self, outcome: TransferOutcome) {
        if self.finished {
            return;
        }
        self.finished = true;
        if self.signals.try_send(Signal::Finished(outcome)).is_err() {
            tracing::debug!("Uploader for {:?} left before the result", self.key);
        }
    }
}

impl Drop for PeerLink {
    fn drop(&mut self) {
        self.send(TransferOutcome::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn upload() -> UploadBody {
        UploadBody::new(None, Body::empty())
    }

    fn key(s: &str) -> SessionKey {
        SessionKey::new(s).unwrap()
    }

    #[tokio::test]
    async fn peer_then_result_in_order() {
        let (session, mut wait) = Session::open(key("abc"), upload());
        assert_eq!(wait.state(), SessionState::WaitingForPeer);

        let (_body, link) = session.claim().expect("first claim succeeds");
        wait.wait_for_peer(Duration::from_secs(5)).await.unwrap();
        assert_eq!(wait.state(), SessionState::PeerConnected);

        link.finish(TransferOutcome::Ok);
        assert_eq!(wait.wait_for_result().await, TransferOutcome::Ok);
        assert_eq!(
            wait.state(),
            SessionState::ResultDelivered(TransferOutcome::Ok)
        );
    }

    #[tokio::test]
    async fn second_claim_is_refused() {
        let (session, _wait) = Session::open(key("abc"), upload());
        let first = session.claim();
        assert!(first.is_some());
        assert!(session.claim().is_none());
        assert!(session.is_claimed());
    }

    #[tokio::test]
    async fn timeout_without_peer() {
        let (session, mut wait) = Session::open(key("abc"), upload());

        let err = wait
            .wait_for_peer(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::PeerTimeout { .. }));
        assert_eq!(wait.state(), SessionState::TimedOut);

        // The body was withdrawn, so a late downloader finds nothing.
        assert!(session.claim().is_none());
    }

    #[tokio::test]
    async fn timer_losing_to_claim_still_waits_for_result() {
        let (session, mut wait) = Session::open(key("abc"), upload());

        // The downloader has taken the body but not yet announced itself
        // when the timer fires.
        let body = session.lock_upload().take();
        assert!(body.is_some());

        wait.wait_for_peer(Duration::from_millis(20)).await.unwrap();
        assert_eq!(wait.state(), SessionState::PeerConnected);

        let link = session.connect();
        link.finish(TransferOutcome::Ok);
        assert_eq!(wait.run(Duration::from_millis(20)).await, TransferOutcome::Ok);
        assert_eq!(
            wait.state(),
            SessionState::ResultDelivered(TransferOutcome::Ok)
        );
    }

    #[tokio::test]
    async fn dropped_link_reports_failure() {
        let (session, mut wait) = Session::open(key("abc"), upload());
        let (_body, link) = session.claim().unwrap();
        drop(link);

        assert_eq!(
            wait.run(Duration::from_secs(5)).await,
            TransferOutcome::Failed
        );
    }

    #[tokio::test]
    async fn finish_is_reported_once() {
        let (session, mut wait) = Session::open(key("abc"), upload());
        let (_body, link) = session.claim().unwrap();
        link.finish(TransferOutcome::Ok);

        // The drop after finish must not queue a second result.
        assert_eq!(wait.run(Duration::from_secs(5)).await, TransferOutcome::Ok);
        assert!(wait.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn peer_arriving_later_wakes_uploader() {
        let (session, mut wait) = Session::open(key("abc"), upload());

        let downloader = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let (_body, link) = session.claim().unwrap();
            link.finish(TransferOutcome::Ok);
        });

        assert_eq!(wait.run(Duration::from_secs(5)).await, TransferOutcome::Ok);
        downloader.await.unwrap();
    }
}
