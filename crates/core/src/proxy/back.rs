use std::collections::HashMap;

use super::ConnectionId;
use crate::error::{Result, WebRtspError};
use crate::protocol::{CSeq, MediaSessionId, Method, Request, Response, header};
use crate::session::Session;

/// Where a front request forwarded to this back came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FrontOrigin {
    pub front: ConnectionId,
    pub front_cseq: CSeq,
    pub front_media_session: Option<MediaSessionId>,
}

/// The front owning a media session granted by this back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRoute {
    pub front: ConnectionId,
    /// URI as the back sees it.
    pub uri: String,
}

/// Methods whose success creates a media session on the back.
pub(crate) fn is_grant(method: Method) -> bool {
    matches!(method, Method::Describe | Method::Subscribe | Method::Record)
}

/// Proxy session facing one source connection.
#[derive(Debug)]
pub struct BackSession {
    id: ConnectionId,
    pub(crate) session: Session,
    name: Option<String>,
    sources: Vec<(String, String)>,
    pub(crate) forwards: HashMap<CSeq, FrontOrigin>,
    pub(crate) media_routes: HashMap<MediaSessionId, MediaRoute>,
}

impl BackSession {
    pub(crate) fn new(id: ConnectionId) -> Self {
        BackSession {
            id,
            session: Session::new(),
            name: None,
            sources: Vec::new(),
            forwards: HashMap::new(),
            media_routes: HashMap::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Registered name, once `SET_PARAMETER` has been accepted.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = Some(name.to_string());
    }

    /// What the source answered to `LIST *` after registering.
    pub fn sources(&self) -> &[(String, String)] {
        &self.sources
    }

    pub(crate) fn set_sources(&mut self, sources: Vec<(String, String)>) {
        self.sources = sources;
    }

    pub fn media_route(&self, media_session: &str) -> Option<&MediaRoute> {
        self.media_routes.get(media_session)
    }

    pub fn in_flight(&self) -> usize {
        self.forwards.len()
    }

    /// Re-issue a front request on this connection under a back CSeq.
    /// The front request is consumed: its headers and body move over, minus
    /// the viewer's credentials.
    pub(crate) fn forward(&mut self, request: Request, front: ConnectionId, uri: &str) -> CSeq {
        let Request {
            method,
            headers,
            cseq: front_cseq,
            body,
            ..
        } = request;
        let mut outbound = self.session.create_request(method, uri, None);
        outbound.headers = headers;
        outbound.headers.remove(header::AUTHORIZATION);
        outbound.body = body;
        let front_media_session = outbound.media_session().map(str::to_string);
        self.forwards.insert(
            outbound.cseq,
            FrontOrigin {
                front,
                front_cseq,
                front_media_session,
            },
        );
        tracing::debug!(back = %self.id, %front, front_cseq, back_cseq = outbound.cseq, %method, uri, "forward to back");
        self.session.send_request(outbound)
    }

    /// Keep the media-session table in step with a forwarded exchange.
    ///
    /// Grants must not carry a session and, on success, must return one,
    /// which becomes routable to the originating front. A successful
    /// TEARDOWN drops the route. Everything else must answer with the same
    /// session it was asked about.
    pub(crate) fn manage_media_sessions(
        &mut self,
        request: &Request,
        response: &Response,
        origin: &FrontOrigin,
    ) -> Result<()> {
        let recorded = origin.front_media_session.as_deref();
        if is_grant(request.method) {
            if recorded.is_some() {
                return Err(WebRtspError::MediaSessionMismatch {
                    expected: None,
                    actual: recorded.map(str::to_string),
                });
            }
            if !response.is_success() {
                return Ok(());
            }
            let id = response
                .media_session()
                .ok_or(WebRtspError::MissingMediaSession(request.method))?;
            if self.media_routes.contains_key(id) {
                return Err(WebRtspError::MediaSessionMismatch {
                    expected: None,
                    actual: Some(id.to_string()),
                });
            }
            tracing::info!(back = %self.id, front = %origin.front, media_session = id, "media session routed");
            self.media_routes.insert(
                id.to_string(),
                MediaRoute {
                    front: origin.front,
                    uri: request.uri.clone(),
                },
            );
            return Ok(());
        }

        if response.media_session() != recorded {
            return Err(WebRtspError::MediaSessionMismatch {
                expected: recorded.map(str::to_string),
                actual: response.media_session().map(str::to_string),
            });
        }
        if request.method == Method::Teardown
            && response.is_success()
            && let Some(id) = recorded
        {
            self.media_routes.remove(id);
            tracing::info!(back = %self.id, media_session = id, "media session unrouted");
        }
        Ok(())
    }

    /// Media sessions owned by `front`, removed from the routing table.
    pub(crate) fn take_routes_of(&mut self, front: ConnectionId) -> Vec<(MediaSessionId, MediaRoute)> {
        let ids: Vec<MediaSessionId> = self
            .media_routes
            .iter()
            .filter(|(_, route)| route.front == front)
            .map(|(id, _)| id.clone())
            .collect();
        ids.into_iter()
            .filter_map(|id| self.media_routes.remove_entry(&id))
            .collect()
    }
}
