use crate::peer::WebRtcPeer;
use crate::protocol::params::IceCandidate;
use crate::protocol::{CSeq, MediaSessionId};

/// How a media session was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSessionKind {
    /// Client asked for our offer (DESCRIBE), answers with PLAY.
    Describe,
    /// Client pushed its offer to us (RECORD).
    Record,
    /// Client asked us to push toward it (SUBSCRIBE), we RECORD.
    Subscribe,
}

/// ```text
/// DESCRIBE  -> Negotiating --PLAY-------> Playing
/// RECORD    -> Playing (peer started on arrival)
/// SUBSCRIBE -> Negotiating --RECORD OK--> Playing
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaState {
    Negotiating,
    Playing,
}

/// One negotiated WebRTC exchange, owned by the session that minted its id.
pub struct MediaSession {
    id: MediaSessionId,
    kind: MediaSessionKind,
    uri: String,
    peer: Box<dyn WebRtcPeer>,
    state: MediaState,
    prepared: bool,
    buffered_candidates: Vec<IceCandidate>,
    /// Inbound request answered once the peer is prepared.
    pending_reply: Option<CSeq>,
}

impl MediaSession {
    pub fn new(id: &str, kind: MediaSessionKind, uri: &str, peer: Box<dyn WebRtcPeer>) -> Self {
        MediaSession {
            id: id.to_string(),
            kind,
            uri: uri.to_string(),
            peer,
            state: MediaState::Negotiating,
            prepared: false,
            buffered_candidates: Vec::new(),
            pending_reply: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> MediaSessionKind {
        self.kind
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn state(&self) -> MediaState {
        self.state
    }

    pub fn set_state(&mut self, state: MediaState) {
        tracing::debug!(media_session = %self.id, old_state = ?self.state, new_state = ?state, "state transition");
        self.state = state;
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn peer(&self) -> &dyn WebRtcPeer {
        self.peer.as_ref()
    }

    pub fn peer_mut(&mut self) -> &mut dyn WebRtcPeer {
        self.peer.as_mut()
    }

    pub(crate) fn set_pending_reply(&mut self, cseq: CSeq) {
        self.pending_reply = Some(cseq);
    }

    pub(crate) fn take_pending_reply(&mut self) -> Option<CSeq> {
        self.pending_reply.take()
    }

    /// Candidates wait here until the local SDP has been sent, since the
    /// remote side cannot use them before it has the description.
    /// Returns the candidate back when it can go out right away.
    pub fn queue_candidate(&mut self, candidate: IceCandidate) -> Option<IceCandidate> {
        if self.prepared {
            Some(candidate)
        } else {
            self.buffered_candidates.push(candidate);
            None
        }
    }

    /// Flip to prepared and hand out the buffered candidates in discovery
    /// order. Only the first call returns anything.
    pub fn mark_prepared(&mut self) -> Vec<IceCandidate> {
        if self.prepared {
            tracing::warn!(media_session = %self.id, "peer prepared twice");
            return Vec::new();
        }
        self.prepared = true;
        std::mem::take(&mut self.buffered_candidates)
    }

    pub fn buffered_candidates(&self) -> &[IceCandidate] {
        &self.buffered_candidates
    }

    pub fn stop(&mut self) {
        tracing::debug!(media_session = %self.id, uri = %self.uri, "stopping peer");
        self.peer.stop();
    }
}

impl std::fmt::Debug for MediaSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSession")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("uri", &self.uri)
            .field("state", &self.state)
            .field("prepared", &self.prepared)
            .field("buffered_candidates", &self.buffered_candidates.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::{IceServers, PeerEventSender};

    struct NullPeer;

    impl WebRtcPeer for NullPeer {
        fn prepare(&mut self, _: &IceServers, _: PeerEventSender) {}
        fn sdp(&self) -> String {
            String::new()
        }
        fn set_remote_sdp(&mut self, _: &str) {}
        fn add_ice_candidate(&mut self, _: u32, _: &str) {}
        fn play(&mut self) {}
        fn stop(&mut self) {}
    }

    #[test]
    fn candidates_buffer_until_prepared_then_flush_once() {
        let mut media = MediaSession::new("A", MediaSessionKind::Describe, "cam", Box::new(NullPeer));
        assert!(media.queue_candidate(IceCandidate::new(0, "c1")).is_none());
        assert!(media.queue_candidate(IceCandidate::new(1, "c2")).is_none());

        let flushed = media.mark_prepared();
        assert_eq!(flushed, vec![IceCandidate::new(0, "c1"), IceCandidate::new(1, "c2")]);
        assert!(media.buffered_candidates().is_empty());
        assert!(media.mark_prepared().is_empty());

        let late = media.queue_candidate(IceCandidate::new(0, "c3"));
        assert_eq!(late, Some(IceCandidate::new(0, "c3")));
        assert!(media.buffered_candidates().is_empty());
    }
}
