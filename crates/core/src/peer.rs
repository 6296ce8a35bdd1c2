//! The WebRTC peer collaborator.
//!
//! Sessions never build media pipelines. They ask a [`PeerFactory`] for a
//! [`WebRtcPeer`] bound to a URI and drive it through the offer/answer and
//! ICE exchange. Peers report back asynchronously, possibly from their own
//! threads, by sending [`PeerEvent`]s through the [`PeerEventSender`] they
//! were prepared with. The session owner drains the matching receiver and
//! hands each [`PeerNotification`] to the session on its own task.

use tokio::sync::mpsc;

use crate::protocol::MediaSessionId;

/// STUN/TURN server URLs handed to peers on `prepare`.
pub type IceServers = Vec<String>;

/// Asynchronous peer progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// Local SDP is available through [`WebRtcPeer::sdp`].
    Prepared,
    /// A local ICE candidate was discovered. An empty candidate is
    /// end-of-candidates.
    IceCandidate { mline_index: u32, candidate: String },
    /// The media stream ended.
    Eos,
}

/// A [`PeerEvent`] tagged with the media session whose peer produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerNotification {
    pub media_session: MediaSessionId,
    pub event: PeerEvent,
}

/// Channel endpoint a peer uses to report [`PeerEvent`]s.
///
/// Cloneable and `Send`, so a peer can move it to whatever thread its media
/// framework calls back on. Sending after the session is gone is a no-op.
#[derive(Debug, Clone)]
pub struct PeerEventSender {
    media_session: MediaSessionId,
    tx: mpsc::UnboundedSender<PeerNotification>,
}

impl PeerEventSender {
    pub(crate) fn new(media_session: &str, tx: mpsc::UnboundedSender<PeerNotification>) -> Self {
        Self {
            media_session: media_session.to_string(),
            tx,
        }
    }

    pub fn media_session(&self) -> &str {
        &self.media_session
    }

    pub fn send(&self, event: PeerEvent) {
        let notification = PeerNotification {
            media_session: self.media_session.clone(),
            event,
        };
        if self.tx.send(notification).is_err() {
            tracing::trace!(media_session = %self.media_session, "peer event after session closed");
        }
    }

    pub fn prepared(&self) {
        self.send(PeerEvent::Prepared);
    }

    pub fn ice_candidate(&self, mline_index: u32, candidate: &str) {
        self.send(PeerEvent::IceCandidate {
            mline_index,
            candidate: candidate.to_string(),
        });
    }

    pub fn eos(&self) {
        self.send(PeerEvent::Eos);
    }
}

/// One WebRTC endpoint bound to a media session.
pub trait WebRtcPeer: Send {
    /// Start gathering. Completion is reported as [`PeerEvent::Prepared`].
    fn prepare(&mut self, ice_servers: &IceServers, events: PeerEventSender);

    /// Local SDP. Only meaningful after [`PeerEvent::Prepared`].
    fn sdp(&self) -> String;

    fn set_remote_sdp(&mut self, sdp: &str);

    /// Apply a remote candidate. An empty candidate is end-of-candidates.
    fn add_ice_candidate(&mut self, mline_index: u32, candidate: &str);

    fn play(&mut self);

    fn stop(&mut self);
}

/// Creates peers for a URI. `None` means the URI cannot be served.
pub trait PeerFactory: Send {
    fn create_peer(&mut self, uri: &str) -> Option<Box<dyn WebRtcPeer>>;
}

impl<F> PeerFactory for F
where
    F: FnMut(&str) -> Option<Box<dyn WebRtcPeer>> + Send,
{
    fn create_peer(&mut self, uri: &str) -> Option<Box<dyn WebRtcPeer>> {
        self(uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_tags_events_with_media_session() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender = PeerEventSender::new("A1", tx);
        sender.ice_candidate(0, "candidate:1");
        sender.prepared();

        let first = rx.try_recv().unwrap();
        assert_eq!(first.media_session, "A1");
        assert_eq!(
            first.event,
            PeerEvent::IceCandidate {
                mline_index: 0,
                candidate: "candidate:1".to_string()
            }
        );
        assert_eq!(rx.try_recv().unwrap().event, PeerEvent::Prepared);
    }

    #[test]
    fn send_after_receiver_dropped_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        PeerEventSender::new("A1", tx).eos();
    }
}
