//! Server role: answers DESCRIBE/RECORD/SUBSCRIBE with WebRTC peers.

use std::collections::HashMap;

use tokio::sync::mpsc;

use super::handler::{MethodHandler, dispatch_request, expect_success};
use super::media::{MediaSession, MediaSessionKind, MediaState};
use super::Session;
use crate::error::{Result, WebRtspError};
use crate::peer::{PeerEvent, PeerEventSender, PeerFactory, PeerNotification, WebRtcPeer};
use crate::protocol::params::{self, IceCandidate};
use crate::protocol::{MediaSessionId, Method, Request, Response, content_type, header};

/// Per-URI switches and access control for a [`ServerSession`].
pub trait ServerPolicy: Send {
    fn list_enabled(&self, _uri: &str) -> bool {
        false
    }

    fn play_enabled(&self, _uri: &str) -> bool {
        true
    }

    fn record_enabled(&self, _uri: &str) -> bool {
        false
    }

    fn subscribe_enabled(&self, _uri: &str) -> bool {
        false
    }

    /// Decide on the bearer token presented for `uri`. A refusal is
    /// answered 401 when no token was sent and 403 otherwise.
    fn authorize(&self, _uri: &str, _token: Option<&str>) -> bool {
        true
    }

    /// `name: description` pairs returned by LIST.
    fn list(&self, _uri: &str) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// A fixed policy: global switches, an optional shared token, a static
/// stream list.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicy {
    pub list: bool,
    pub play: bool,
    pub record: bool,
    pub subscribe: bool,
    pub token: Option<String>,
    pub streams: Vec<(String, String)>,
}

impl StaticPolicy {
    /// Playback only, no token.
    pub fn playback() -> Self {
        StaticPolicy {
            play: true,
            ..Default::default()
        }
    }
}

impl ServerPolicy for StaticPolicy {
    fn list_enabled(&self, _uri: &str) -> bool {
        self.list
    }

    fn play_enabled(&self, _uri: &str) -> bool {
        self.play
    }

    fn record_enabled(&self, _uri: &str) -> bool {
        self.record
    }

    fn subscribe_enabled(&self, _uri: &str) -> bool {
        self.subscribe
    }

    fn authorize(&self, _uri: &str, token: Option<&str>) -> bool {
        match &self.token {
            Some(expected) => token == Some(expected.as_str()),
            None => true,
        }
    }

    fn list(&self, _uri: &str) -> Vec<(String, String)> {
        self.streams.clone()
    }
}

/// Server side of one connection.
///
/// Owns the media sessions opened on this connection, each bound to one
/// peer. Peer progress arrives through [`handle_peer_notification`]; the
/// owner feeds it from the receiver paired with the sender given to
/// [`new`](Self::new).
///
/// [`handle_peer_notification`]: Self::handle_peer_notification
pub struct ServerSession<P: ServerPolicy> {
    session: Session,
    policy: P,
    peers: Box<dyn PeerFactory>,
    record_peers: Option<Box<dyn PeerFactory>>,
    media_sessions: HashMap<MediaSessionId, MediaSession>,
    events: mpsc::UnboundedSender<PeerNotification>,
    id_salt: u32,
    id_counter: u32,
}

impl<P: ServerPolicy> ServerSession<P> {
    pub fn new(
        policy: P,
        peers: impl PeerFactory + 'static,
        events: mpsc::UnboundedSender<PeerNotification>,
    ) -> Self {
        ServerSession {
            session: Session::new(),
            policy,
            peers: Box::new(peers),
            record_peers: None,
            media_sessions: HashMap::new(),
            events,
            id_salt: rand::random::<u32>(),
            id_counter: 0,
        }
    }

    /// Enable RECORD by supplying the factory for receiving peers.
    pub fn with_record_peers(mut self, factory: impl PeerFactory + 'static) -> Self {
        self.record_peers = Some(Box::new(factory));
        self
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn media_session(&self, id: &str) -> Option<&MediaSession> {
        self.media_sessions.get(id)
    }

    pub fn media_session_count(&self) -> usize {
        self.media_sessions.len()
    }

    fn mint_media_session_id(&mut self) -> MediaSessionId {
        loop {
            self.id_counter = self.id_counter.wrapping_add(1);
            let id = format!("{:08X}{:08X}", self.id_salt, self.id_counter);
            if !self.media_sessions.contains_key(&id) {
                return id;
            }
        }
    }

    /// Methods offered for `uri` in the OPTIONS `Public` header.
    pub fn supported_methods(&self, uri: &str) -> Vec<Method> {
        let mut methods = Vec::new();
        if self.policy.list_enabled(uri) {
            methods.push(Method::List);
        }
        if self.policy.play_enabled(uri) {
            methods.extend([Method::Describe, Method::Play]);
        }
        if self.policy.record_enabled(uri) && self.record_peers.is_some() {
            methods.push(Method::Record);
        }
        if self.policy.subscribe_enabled(uri) {
            methods.push(Method::Subscribe);
        }
        if !methods.is_empty() {
            methods.extend([Method::Setup, Method::Teardown]);
        }
        methods
    }

    /// The 401/403 answer for a refused request, if it is refused.
    fn check_authorization(&self, request: &Request) -> Option<Response> {
        let token = request.bearer_token();
        if self.policy.authorize(&request.uri, token) {
            return None;
        }
        tracing::warn!(method = %request.method, uri = %request.uri, has_token = token.is_some(), "request not authorized");
        let response = match token {
            None => Response::unauthorized(),
            Some(_) => Response::forbidden(),
        };
        Some(response.reply_to(request))
    }

    fn create_peer(&mut self, kind: MediaSessionKind, uri: &str) -> Result<Box<dyn WebRtcPeer>> {
        let factory = match kind {
            MediaSessionKind::Record => self.record_peers.as_mut(),
            MediaSessionKind::Describe | MediaSessionKind::Subscribe => Some(&mut self.peers),
        };
        factory
            .and_then(|factory| factory.create_peer(uri))
            .ok_or_else(|| {
                tracing::warn!(uri, ?kind, "peer factory returned no peer");
                WebRtspError::PeerUnavailable(uri.to_string())
            })
    }

    /// Prepare `peer` and register it under `id`.
    fn open_media_session(
        &mut self,
        id: &str,
        kind: MediaSessionKind,
        uri: &str,
        mut peer: Box<dyn WebRtcPeer>,
    ) -> &mut MediaSession {
        let sender = PeerEventSender::new(id, self.events.clone());
        peer.prepare(self.session.ice_servers(), sender);
        tracing::info!(media_session = id, uri, ?kind, "media session opened");
        self.media_sessions
            .entry(id.to_string())
            .or_insert_with(|| MediaSession::new(id, kind, uri, peer))
    }

    fn media_session_for(&mut self, request: &Request) -> Result<&mut MediaSession> {
        let id = request
            .media_session()
            .ok_or(WebRtspError::MissingMediaSession(request.method))?;
        self.media_sessions
            .get_mut(id)
            .ok_or_else(|| WebRtspError::MediaSessionNotFound(id.to_string()))
    }

    /// Server-initiated RECORD toward the client, for SUBSCRIBE flows.
    /// The RECORD request goes out once the peer is prepared.
    pub fn start_record_to_client(&mut self, uri: &str, media_session: &str) -> Result<()> {
        if self.media_sessions.contains_key(media_session) {
            return Err(WebRtspError::MediaSessionMismatch {
                expected: None,
                actual: Some(media_session.to_string()),
            });
        }
        let peer = self.create_peer(MediaSessionKind::Subscribe, uri)?;
        self.open_media_session(media_session, MediaSessionKind::Subscribe, uri, peer);
        Ok(())
    }

    /// Stop the peer, tell the client, forget the media session.
    pub fn teardown_media_session(&mut self, id: &str) -> bool {
        let Some(mut media) = self.media_sessions.remove(id) else {
            return false;
        };
        media.stop();
        let request = self
            .session
            .create_request(Method::Teardown, media.uri(), Some(id));
        self.session.send_request(request);
        tracing::info!(media_session = id, "media session torn down");
        true
    }

    /// Agent side of the inverse proxy: announce ourselves under `name`.
    pub fn register_with_proxy(&mut self, name: &str, token: &str) -> u32 {
        let request = self
            .session
            .create_request(Method::SetParameter, "*", None)
            .add_header(header::AUTHORIZATION, &format!("Bearer {token}"))
            .with_body(content_type::PARAMETERS, params::render_parameters(&[("name", name)]));
        self.session.send_request(request)
    }

    /// Apply one peer event on the session's own context.
    pub fn handle_peer_notification(&mut self, notification: PeerNotification) -> Result<()> {
        let PeerNotification { media_session, event } = notification;
        if !self.media_sessions.contains_key(&media_session) {
            tracing::trace!(%media_session, ?event, "event for closed media session");
            return Ok(());
        }
        match event {
            PeerEvent::Prepared => self.on_peer_prepared(&media_session),
            PeerEvent::IceCandidate {
                mline_index,
                candidate,
            } => {
                self.on_local_candidate(&media_session, IceCandidate::new(mline_index, &candidate));
                Ok(())
            }
            PeerEvent::Eos => {
                tracing::info!(%media_session, "peer reached end of stream");
                self.teardown_media_session(&media_session);
                Ok(())
            }
        }
    }

    fn on_peer_prepared(&mut self, id: &str) -> Result<()> {
        let Some(media) = self.media_sessions.get_mut(id) else {
            return Ok(());
        };
        let flushed = media.mark_prepared();
        let sdp = media.peer().sdp();
        let uri = media.uri().to_string();

        match media.kind() {
            MediaSessionKind::Describe | MediaSessionKind::Record => {
                let Some(cseq) = media.take_pending_reply() else {
                    return Ok(());
                };
                let mut response = Response::ok().with_body(content_type::SDP, sdp);
                response.cseq = cseq;
                response.set_media_session(id);
                self.session.send_response(response);
            }
            MediaSessionKind::Subscribe => {
                let request = self
                    .session
                    .create_request(Method::Record, &uri, Some(id))
                    .with_body(content_type::SDP, sdp);
                self.session.send_request(request);
            }
        }

        if !flushed.is_empty() {
            tracing::debug!(media_session = id, count = flushed.len(), "flushing buffered candidates");
            self.send_candidates(&uri, id, &flushed);
        }
        Ok(())
    }

    fn on_local_candidate(&mut self, id: &str, candidate: IceCandidate) {
        let Some(media) = self.media_sessions.get_mut(id) else {
            return;
        };
        if let Some(candidate) = media.queue_candidate(candidate) {
            let uri = media.uri().to_string();
            self.send_candidates(&uri, id, &[candidate]);
        }
    }

    fn send_candidates(&mut self, uri: &str, id: &str, candidates: &[IceCandidate]) {
        let request = self
            .session
            .create_request(Method::Setup, uri, Some(id))
            .with_body(content_type::ICE_CANDIDATE, params::render_ice_candidates(candidates));
        self.session.send_request(request);
    }

    /// Stop every peer. Called by the owner when the connection is gone.
    pub fn shutdown(&mut self) {
        for (_, mut media) in self.media_sessions.drain() {
            media.stop();
        }
    }
}

fn require_content_type(actual: Option<&str>, expected: &'static str) -> Result<()> {
    match actual {
        Some(actual) if actual.eq_ignore_ascii_case(expected) => Ok(()),
        actual => Err(WebRtspError::ContentType {
            expected,
            actual: actual.map(str::to_string),
        }),
    }
}

/// Feed each candidate line to `peer` as it is read. A bad line fails the
/// request; candidates before it stay applied.
pub(crate) fn apply_candidates(peer: &mut dyn WebRtcPeer, request: &Request) -> Result<()> {
    require_content_type(request.content_type(), content_type::ICE_CANDIDATE)?;
    for candidate in params::ice_candidates(request.body_text()?) {
        let candidate = candidate?;
        peer.add_ice_candidate(candidate.mline_index, &candidate.candidate);
    }
    Ok(())
}

/// A non-empty `application/sdp` body.
pub(crate) fn sdp_text<'a>(actual: Option<&str>, body: Result<&'a str>) -> Result<&'a str> {
    require_content_type(actual, content_type::SDP)?;
    let sdp = body?;
    if sdp.is_empty() {
        return Err(WebRtspError::ContentType {
            expected: content_type::SDP,
            actual: None,
        });
    }
    Ok(sdp)
}

impl<P: ServerPolicy> MethodHandler for ServerSession<P> {
    fn session(&self) -> &Session {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Generic authorization gate. RECORD authorizes inside its own handler
    /// after its capability checks, and keepalives are never gated.
    fn handle_request(&mut self, request: Request) -> Result<()> {
        if !matches!(request.method, Method::Record | Method::GetParameter)
            && let Some(denied) = self.check_authorization(&request)
        {
            self.session.send_response(denied);
            return Ok(());
        }
        dispatch_request(self, request)
    }

    fn on_options_request(&mut self, request: Request) -> Result<()> {
        let methods = self.supported_methods(&request.uri);
        tracing::debug!(uri = %request.uri, ?methods, "OPTIONS");
        let response = Response::ok()
            .reply_to(&request)
            .add_header(header::PUBLIC, &params::render_public(&methods));
        self.session.send_response(response);
        Ok(())
    }

    /// A proxy asks every source it registers for a list, so a disabled
    /// LIST is answered 404 instead of closing the connection.
    fn on_list_request(&mut self, request: Request) -> Result<()> {
        if !self.policy.list_enabled(&request.uri) {
            tracing::debug!(uri = %request.uri, "LIST disabled");
            self.session.send_response(Response::not_found().reply_to(&request));
            return Ok(());
        }
        let list = self.policy.list(&request.uri);
        let response = Response::ok()
            .reply_to(&request)
            .with_body(content_type::LIST, params::render_parameters(&list));
        self.session.send_response(response);
        Ok(())
    }

    fn on_describe_request(&mut self, request: Request) -> Result<()> {
        if !self.policy.play_enabled(&request.uri) {
            return super::handler::unsupported(&request);
        }
        let peer = self.create_peer(MediaSessionKind::Describe, &request.uri)?;
        let id = self.mint_media_session_id();
        let media = self.open_media_session(&id, MediaSessionKind::Describe, &request.uri, peer);
        media.set_pending_reply(request.cseq);
        Ok(())
    }

    fn on_setup_request(&mut self, request: Request) -> Result<()> {
        let media = self.media_session_for(&request)?;
        apply_candidates(media.peer_mut(), &request)?;
        self.session.send_response(Response::ok().reply_to(&request));
        Ok(())
    }

    fn on_play_request(&mut self, request: Request) -> Result<()> {
        let sdp = sdp_text(request.content_type(), request.body_text())?.to_string();
        let media = self.media_session_for(&request)?;
        if media.kind() != MediaSessionKind::Describe || !media.is_prepared() {
            return super::handler::unsupported(&request);
        }
        media.peer_mut().set_remote_sdp(&sdp);
        media.peer_mut().play();
        media.set_state(MediaState::Playing);
        tracing::info!(media_session = %media.id(), "media session playing");
        self.session.send_response(Response::ok().reply_to(&request));
        Ok(())
    }

    fn on_record_request(&mut self, request: Request) -> Result<()> {
        if !self.policy.record_enabled(&request.uri) || self.record_peers.is_none() {
            return super::handler::unsupported(&request);
        }
        let sdp = sdp_text(request.content_type(), request.body_text())?.to_string();
        if let Some(denied) = self.check_authorization(&request) {
            self.session.send_response(denied);
            return Ok(());
        }
        let peer = self.create_peer(MediaSessionKind::Record, &request.uri)?;
        let id = self.mint_media_session_id();
        let media = self.open_media_session(&id, MediaSessionKind::Record, &request.uri, peer);
        media.set_pending_reply(request.cseq);
        media.peer_mut().set_remote_sdp(&sdp);
        media.peer_mut().play();
        media.set_state(MediaState::Playing);
        Ok(())
    }

    fn on_subscribe_request(&mut self, request: Request) -> Result<()> {
        if !self.policy.subscribe_enabled(&request.uri) {
            return super::handler::unsupported(&request);
        }
        // The grant follows the peer; its RECORD waits for `Prepared`.
        let id = self.mint_media_session_id();
        self.start_record_to_client(&request.uri, &id)?;
        let mut response = Response::ok().reply_to(&request);
        response.set_media_session(&id);
        self.session.send_response(response);
        Ok(())
    }

    /// Both ends may tear down at once, so an unknown id is answered 404
    /// rather than treated as a protocol violation.
    fn on_teardown_request(&mut self, request: Request) -> Result<()> {
        let id = request
            .media_session()
            .ok_or(WebRtspError::MissingMediaSession(Method::Teardown))?;
        let response = match self.media_sessions.remove(id) {
            Some(mut media) => {
                media.stop();
                tracing::info!(media_session = id, "media session terminated via TEARDOWN");
                Response::ok()
            }
            None => {
                tracing::debug!(media_session = id, "TEARDOWN for unknown media session");
                Response::not_found()
            }
        };
        self.session.send_response(response.reply_to(&request));
        Ok(())
    }

    fn on_get_parameter_request(&mut self, request: Request) -> Result<()> {
        tracing::trace!(cseq = request.cseq, "GET_PARAMETER keepalive");
        self.session.send_response(Response::ok().reply_to(&request));
        Ok(())
    }

    /// A refused candidate batch ends that media session only.
    fn on_setup_response(&mut self, request: Request, response: Response) -> Result<()> {
        if expect_success(&request, &response).is_err()
            && let Some(id) = request.media_session()
        {
            self.teardown_media_session(id);
        }
        Ok(())
    }

    fn on_teardown_response(&mut self, request: Request, response: Response) -> Result<()> {
        if !response.is_success() {
            tracing::debug!(media_session = ?request.media_session(), status = response.status_code, "TEARDOWN refused");
        }
        Ok(())
    }

    /// The client's answer to our RECORD carries its SDP. A refusal ends
    /// that media session only.
    fn on_record_response(&mut self, request: Request, response: Response) -> Result<()> {
        let id = request
            .media_session()
            .ok_or(WebRtspError::MissingMediaSession(Method::Record))?
            .to_string();
        if expect_success(&request, &response).is_err() {
            self.teardown_media_session(&id);
            return Ok(());
        }
        if response.media_session() != Some(id.as_str()) {
            return Err(WebRtspError::MediaSessionMismatch {
                expected: Some(id),
                actual: response.media_session().map(str::to_string),
            });
        }
        let Some(media) = self.media_sessions.get_mut(&id) else {
            tracing::debug!(media_session = %id, "RECORD answered after teardown");
            return Ok(());
        };
        let sdp = sdp_text(response.content_type(), response.body_text())?;
        media.peer_mut().set_remote_sdp(sdp);
        media.peer_mut().play();
        media.set_state(MediaState::Playing);
        Ok(())
    }
}
