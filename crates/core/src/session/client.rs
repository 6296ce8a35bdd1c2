//! Client role: OPTIONS, then DESCRIBE/PLAY or SUBSCRIBE/RECORD.

use tokio::sync::mpsc;

use super::handler::{MethodHandler, expect_success};
use super::media::{MediaSession, MediaSessionKind, MediaState};
use super::server::{apply_candidates, sdp_text};
use super::Session;
use crate::error::{Result, WebRtspError};
use crate::peer::{PeerEvent, PeerEventSender, PeerFactory, PeerNotification, WebRtcPeer};
use crate::protocol::params::{self, IceCandidate};
use crate::protocol::{MediaSessionId, Method, Request, Response, content_type, header};

/// Client side of one connection, viewing a single URI.
///
/// ```text
/// OPTIONS * -> Public has SUBSCRIBE?  -> SUBSCRIBE -> (server) RECORD -> OK + SDP
///                       DESCRIBE+PLAY? -> DESCRIBE -> PLAY + SDP
/// ```
pub struct ClientSession {
    session: Session,
    uri: String,
    token: Option<String>,
    peers: Box<dyn PeerFactory>,
    events: mpsc::UnboundedSender<PeerNotification>,
    /// Id granted by SUBSCRIBE, waiting for the server's RECORD.
    subscribed: Option<MediaSessionId>,
    media: Option<MediaSession>,
}

impl ClientSession {
    pub fn new(
        uri: &str,
        peers: impl PeerFactory + 'static,
        events: mpsc::UnboundedSender<PeerNotification>,
    ) -> Self {
        ClientSession {
            session: Session::new(),
            uri: uri.to_string(),
            token: None,
            peers: Box::new(peers),
            events,
            subscribed: None,
            media: None,
        }
    }

    /// Attach `Authorization: Bearer <token>` to every request.
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn media_session(&self) -> Option<&MediaSession> {
        self.media.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.media
            .as_ref()
            .is_some_and(|media| media.state() == MediaState::Playing)
    }

    fn send(&mut self, method: Method, uri: &str, media_session: Option<&str>, body: Option<(&str, String)>) {
        let mut request = self.session.create_request(method, uri, media_session);
        if let Some(token) = &self.token {
            request = request.add_header(header::AUTHORIZATION, &format!("Bearer {token}"));
        }
        if let Some((content_type, body)) = body {
            request = request.with_body(content_type, body);
        }
        self.session.send_request(request);
    }

    /// Start the exchange once the transport is up.
    pub fn on_connected(&mut self) {
        tracing::debug!(uri = %self.uri, "client connected");
        self.send(Method::Options, "*", None, None);
    }

    fn open_media(&mut self, id: &str, kind: MediaSessionKind) -> Result<&mut MediaSession> {
        let mut peer: Box<dyn WebRtcPeer> = self
            .peers
            .create_peer(&self.uri)
            .ok_or_else(|| WebRtspError::PeerUnavailable(self.uri.clone()))?;
        peer.prepare(
            self.session.ice_servers(),
            PeerEventSender::new(id, self.events.clone()),
        );
        tracing::info!(media_session = id, uri = %self.uri, ?kind, "client media session opened");
        Ok(self.media.insert(MediaSession::new(id, kind, &self.uri, peer)))
    }

    /// The media session addressed by `request`, if it is ours.
    fn media_for(&mut self, request: &Request) -> Result<&mut MediaSession> {
        let id = request.media_session();
        match self.media.as_mut() {
            Some(media) if Some(media.id()) == id => Ok(media),
            _ => Err(WebRtspError::MediaSessionNotFound(id.unwrap_or_default().to_string())),
        }
    }

    pub fn handle_peer_notification(&mut self, notification: PeerNotification) -> Result<()> {
        let PeerNotification { media_session, event } = notification;
        let Some(media) = self.media.as_mut().filter(|media| media.id() == media_session) else {
            tracing::trace!(%media_session, ?event, "event for closed media session");
            return Ok(());
        };
        match event {
            PeerEvent::Prepared => {
                let flushed = media.mark_prepared();
                let sdp = media.peer().sdp();
                if let Some(cseq) = media.take_pending_reply() {
                    media.peer_mut().play();
                    media.set_state(MediaState::Playing);
                    let mut response = Response::ok().with_body(content_type::SDP, sdp);
                    response.cseq = cseq;
                    response.set_media_session(&media_session);
                    self.session.send_response(response);
                } else {
                    let uri = self.uri.clone();
                    self.send(Method::Play, &uri, Some(&media_session), Some((content_type::SDP, sdp)));
                }
                self.send_candidates(&media_session, &flushed);
            }
            PeerEvent::IceCandidate {
                mline_index,
                candidate,
            } => {
                if let Some(candidate) = media.queue_candidate(IceCandidate::new(mline_index, &candidate)) {
                    self.send_candidates(&media_session, &[candidate]);
                }
            }
            PeerEvent::Eos => {
                tracing::info!(%media_session, "peer reached end of stream");
                media.stop();
                self.media = None;
                let uri = self.uri.clone();
                self.send(Method::Teardown, &uri, Some(&media_session), None);
            }
        }
        Ok(())
    }

    fn send_candidates(&mut self, id: &str, candidates: &[IceCandidate]) {
        if candidates.is_empty() {
            return;
        }
        let uri = self.uri.clone();
        let body = params::render_ice_candidates(candidates);
        self.send(Method::Setup, &uri, Some(id), Some((content_type::ICE_CANDIDATE, body)));
    }

    pub fn shutdown(&mut self) {
        if let Some(mut media) = self.media.take() {
            media.stop();
        }
    }
}

impl MethodHandler for ClientSession {
    fn session(&self) -> &Session {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    fn on_options_response(&mut self, request: Request, response: Response) -> Result<()> {
        expect_success(&request, &response)?;
        let public = response
            .header(header::PUBLIC)
            .map(params::parse_public)
            .unwrap_or_default();
        tracing::debug!(?public, "server methods");
        let uri = self.uri.clone();
        if public.contains(&Method::Subscribe) {
            self.send(Method::Subscribe, &uri, None, None);
        } else if public.contains(&Method::Describe) && public.contains(&Method::Play) {
            self.send(Method::Describe, &uri, None, None);
        } else {
            return Err(WebRtspError::Unsupported {
                method: Method::Describe,
                uri,
            });
        }
        Ok(())
    }

    fn on_describe_response(&mut self, request: Request, response: Response) -> Result<()> {
        expect_success(&request, &response)?;
        let id = response
            .media_session()
            .ok_or(WebRtspError::MissingMediaSession(Method::Describe))?
            .to_string();
        let sdp = sdp_text(response.content_type(), response.body_text())?;
        let media = self.open_media(&id, MediaSessionKind::Describe)?;
        media.peer_mut().set_remote_sdp(sdp);
        Ok(())
    }

    fn on_subscribe_response(&mut self, request: Request, response: Response) -> Result<()> {
        expect_success(&request, &response)?;
        let id = response
            .media_session()
            .ok_or(WebRtspError::MissingMediaSession(Method::Subscribe))?;
        tracing::debug!(media_session = id, "subscribed");
        self.subscribed = Some(id.to_string());
        Ok(())
    }

    /// Both ends may tear down at once; a refused TEARDOWN changes nothing.
    fn on_teardown_response(&mut self, request: Request, response: Response) -> Result<()> {
        if !response.is_success() {
            tracing::debug!(media_session = ?request.media_session(), status = response.status_code, "TEARDOWN refused");
        }
        Ok(())
    }

    fn on_play_response(&mut self, request: Request, response: Response) -> Result<()> {
        expect_success(&request, &response)?;
        let media = self.media_for(&request)?;
        media.peer_mut().play();
        media.set_state(MediaState::Playing);
        Ok(())
    }

    /// The server pushes its offer for a subscription.
    fn on_record_request(&mut self, request: Request) -> Result<()> {
        let id = request.media_session();
        if id.is_none() || id != self.subscribed.as_deref() || self.media.is_some() {
            return Err(WebRtspError::MediaSessionMismatch {
                expected: self.subscribed.clone(),
                actual: id.map(str::to_string),
            });
        }
        let sdp = sdp_text(request.content_type(), request.body_text())?.to_string();
        let id = id.unwrap_or_default().to_string();
        self.subscribed = None;
        let media = self.open_media(&id, MediaSessionKind::Subscribe)?;
        media.peer_mut().set_remote_sdp(&sdp);
        media.set_pending_reply(request.cseq);
        Ok(())
    }

    fn on_setup_request(&mut self, request: Request) -> Result<()> {
        let media = self.media_for(&request)?;
        apply_candidates(media.peer_mut(), &request)?;
        self.session.send_response(Response::ok().reply_to(&request));
        Ok(())
    }

    /// A server TEARDOWN may cross our own after `Eos`; an id we no longer
    /// hold is answered 404.
    fn on_teardown_request(&mut self, request: Request) -> Result<()> {
        let id = request
            .media_session()
            .ok_or(WebRtspError::MissingMediaSession(Method::Teardown))?;
        if self.subscribed.as_deref() == Some(id) {
            self.subscribed = None;
        }
        let response = match self.media.take_if(|media| media.id() == id) {
            Some(mut media) => {
                media.stop();
                tracing::info!(media_session = id, "media session torn down by server");
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
        self.session.send_response(Response::ok().reply_to(&request));
        Ok(())
    }
}
