use std::collections::HashMap;

use super::back::is_grant;
use super::{
    BackSession, ConnectionId, ForwardContext, FrontSession, Side, join_source_uri, split_source_uri,
};
use crate::error::{ParseErrorKind, Result, WebRtspError};
use crate::protocol::params;
use crate::protocol::{Message, Method, Request, Response, content_type, header};
use crate::session::handler::unsupported;
use crate::session::{Outgoing, Session};

/// Methods a front may use against a source through the proxy.
const FRONT_PUBLIC: [Method; 5] = [
    Method::List,
    Method::Describe,
    Method::Play,
    Method::Setup,
    Method::Teardown,
];

/// Registry and router between front and back sessions.
///
/// Sans-IO like the sessions it owns: the transport reports connections
/// and frames, then drains [`poll_write`](Self::poll_write). A frame that
/// violates the protocol closes its connection and cascades to the
/// sessions depending on it.
#[derive(Debug)]
pub struct Forwarder {
    context: ForwardContext,
    next_id: u64,
    fronts: HashMap<ConnectionId, FrontSession>,
    backs: HashMap<ConnectionId, BackSession>,
    registry: HashMap<String, ConnectionId>,
    /// Closed sessions still flushing their last messages.
    draining: Vec<(ConnectionId, Session)>,
}

impl Forwarder {
    pub fn new(context: ForwardContext) -> Self {
        Forwarder {
            context,
            next_id: 1,
            fronts: HashMap::new(),
            backs: HashMap::new(),
            registry: HashMap::new(),
            draining: Vec::new(),
        }
    }

    pub fn context(&self) -> &ForwardContext {
        &self.context
    }

    fn allocate_id(&mut self) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        id
    }

    /// A viewer connected.
    pub fn connect_front(&mut self) -> ConnectionId {
        let id = self.allocate_id();
        self.fronts.insert(id, FrontSession::new(id));
        tracing::debug!(conn = %id, "front connected");
        id
    }

    /// A source agent connected. It is not addressable until it registers.
    pub fn connect_back(&mut self) -> ConnectionId {
        let id = self.allocate_id();
        self.backs.insert(id, BackSession::new(id));
        tracing::debug!(conn = %id, "back connected");
        id
    }

    pub fn side(&self, conn: ConnectionId) -> Option<Side> {
        if self.fronts.contains_key(&conn) {
            Some(Side::Front)
        } else if self.backs.contains_key(&conn) {
            Some(Side::Back)
        } else {
            None
        }
    }

    pub fn front(&self, conn: ConnectionId) -> Option<&FrontSession> {
        self.fronts.get(&conn)
    }

    pub fn back(&self, conn: ConnectionId) -> Option<&BackSession> {
        self.backs.get(&conn)
    }

    pub fn back_by_name(&self, name: &str) -> Option<&BackSession> {
        self.registry.get(name).and_then(|id| self.backs.get(id))
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.contains_key(name)
    }

    pub fn front_count(&self) -> usize {
        self.fronts.len()
    }

    pub fn back_count(&self) -> usize {
        self.backs.len()
    }

    /// The front currently owning media session `id` on source `name`.
    pub fn media_session_owner(&self, name: &str, id: &str) -> Option<ConnectionId> {
        self.back_by_name(name)?.media_route(id).map(|route| route.front)
    }

    /// Handle one frame from `conn`. On error the connection is closed
    /// (its Disconnect is queued) and the error returned for logging.
    pub fn handle_message(&mut self, conn: ConnectionId, buf: &[u8]) -> Result<()> {
        let result = self.route(conn, buf);
        if let Err(err) = &result {
            tracing::warn!(%conn, error = %err, "closing connection on protocol error");
            self.close(conn);
        }
        result
    }

    fn route(&mut self, conn: ConnectionId, buf: &[u8]) -> Result<()> {
        let Some(side) = self.side(conn) else {
            tracing::trace!(%conn, "frame for closed connection");
            return Ok(());
        };
        match (side, Message::parse(buf)?) {
            (Side::Front, Message::Request(request)) => self.front_request(conn, request),
            (Side::Front, Message::Response(response)) => self.front_response(conn, response),
            (Side::Back, Message::Request(request)) => self.back_request(conn, request),
            (Side::Back, Message::Response(response)) => self.back_response(conn, response),
        }
    }

    fn send_front_response(&mut self, conn: ConnectionId, response: Response) {
        if let Some(front) = self.fronts.get_mut(&conn) {
            front.session.send_response(response);
        }
    }

    fn send_back_response(&mut self, conn: ConnectionId, response: Response) {
        if let Some(back) = self.backs.get_mut(&conn) {
            back.session.send_response(response);
        }
    }

    fn front_request(&mut self, front_id: ConnectionId, request: Request) -> Result<()> {
        tracing::debug!(conn = %front_id, cseq = request.cseq, method = %request.method, uri = %request.uri, "front request");
        if request.method != Method::GetParameter
            && let Some(denied) = self.context.check_viewer(&request)
        {
            tracing::warn!(conn = %front_id, method = %request.method, "viewer not authorized");
            self.send_front_response(front_id, denied);
            return Ok(());
        }
        if request.uri == "*" {
            return self.answer_locally(front_id, request);
        }

        let (name, inner) = split_source_uri(&request.uri);
        let (name, inner) = (name.to_string(), inner.to_string());
        if !self.context.is_configured(&name) {
            tracing::debug!(conn = %front_id, source = %name, "unknown source");
            self.send_front_response(front_id, Response::not_found().reply_to(&request));
            return Ok(());
        }
        let Some(back_id) = self.registry.get(&name).copied() else {
            tracing::debug!(conn = %front_id, source = %name, "source not connected");
            self.send_front_response(front_id, Response::service_unavailable().reply_to(&request));
            return Ok(());
        };

        if let Some(id) = request.media_session() {
            if is_grant(request.method) {
                return Err(WebRtspError::MediaSessionMismatch {
                    expected: None,
                    actual: Some(id.to_string()),
                });
            }
            let owned = self
                .backs
                .get(&back_id)
                .and_then(|back| back.media_route(id))
                .is_some_and(|route| route.front == front_id);
            if !owned {
                tracing::debug!(conn = %front_id, media_session = id, "media session not owned by front");
                let response = Response::not_found().reply_to(&request);
                self.send_front_response(front_id, response);
                return Ok(());
            }
        }

        if let Some(back) = self.backs.get_mut(&back_id) {
            back.forward(request, front_id, &inner);
        }
        Ok(())
    }

    /// `*` requests never reach a source.
    fn answer_locally(&mut self, front_id: ConnectionId, request: Request) -> Result<()> {
        let response = match request.method {
            Method::Options => Response::ok()
                .reply_to(&request)
                .add_header(header::PUBLIC, &params::render_public(&FRONT_PUBLIC)),
            Method::List => Response::ok()
                .reply_to(&request)
                .with_body(content_type::LIST, params::render_parameters(&self.list_sources())),
            Method::GetParameter => Response::ok().reply_to(&request),
            _ => return unsupported(&request),
        };
        self.send_front_response(front_id, response);
        Ok(())
    }

    /// Registered sources, expanded by the list each one reported.
    fn list_sources(&self) -> Vec<(String, String)> {
        let mut names: Vec<&String> = self.registry.keys().collect();
        names.sort();
        let mut list = Vec::new();
        for name in names {
            let Some(back) = self.back_by_name(name) else {
                continue;
            };
            if back.sources().is_empty() {
                list.push((name.clone(), String::new()));
            }
            for (item, description) in back.sources() {
                list.push((join_source_uri(name, item), description.clone()));
            }
        }
        list
    }

    fn front_response(&mut self, front_id: ConnectionId, mut response: Response) -> Result<()> {
        let Some(front) = self.fronts.get_mut(&front_id) else {
            return Ok(());
        };
        let request = front.session.take_outstanding(response.cseq)?;
        let Some(origin) = front.forwards.remove(&response.cseq) else {
            if !response.is_success() {
                tracing::debug!(conn = %front_id, method = %request.method, status = response.status_code, "front refused proxy request");
            }
            return Ok(());
        };
        let Some(back) = self.backs.get_mut(&origin.back) else {
            tracing::trace!(conn = %front_id, back = %origin.back, "dropping response for closed back");
            return Ok(());
        };
        response.cseq = origin.back_cseq;
        back.session.send_response(response);
        Ok(())
    }

    fn back_request(&mut self, back_id: ConnectionId, request: Request) -> Result<()> {
        let Some(back) = self.backs.get(&back_id) else {
            return Ok(());
        };
        tracing::debug!(conn = %back_id, cseq = request.cseq, method = %request.method, uri = %request.uri, "back request");
        match (back.name().map(str::to_string), request.method) {
            (_, Method::GetParameter) => {
                self.send_back_response(back_id, Response::ok().reply_to(&request));
                Ok(())
            }
            (None, Method::SetParameter) => self.register_back_session(back_id, request),
            (Some(name), Method::SetParameter) => Err(WebRtspError::AlreadyRegistered(name)),
            (None, _) => Err(WebRtspError::NotRegistered),
            (Some(name), Method::Setup | Method::Teardown | Method::Record) => {
                self.route_to_front(back_id, &name, request)
            }
            (Some(_), _) => unsupported(&request),
        }
    }

    /// `SET_PARAMETER` with `name: <source>` and the source's bearer token.
    fn register_back_session(&mut self, back_id: ConnectionId, request: Request) -> Result<()> {
        let parameters = params::parse_parameters(request.body_text()?)?;
        let name = params::find_parameter(&parameters, "name")
            .filter(|name| !name.is_empty())
            .ok_or(ParseErrorKind::InvalidParameter)?;
        let expected = self
            .context
            .source_token(name)
            .ok_or_else(|| WebRtspError::UnknownSource(name.to_string()))?;
        if request.bearer_token() != Some(expected) {
            return Err(WebRtspError::InvalidToken(name.to_string()));
        }
        if self.registry.contains_key(name) {
            return Err(WebRtspError::AlreadyRegistered(name.to_string()));
        }
        let Some(back) = self.backs.get_mut(&back_id) else {
            return Ok(());
        };
        back.set_name(name);
        back.session.send_response(Response::ok().reply_to(&request));
        let list = back.session.create_request(Method::List, "*", None);
        back.session.send_request(list);
        self.registry.insert(name.to_string(), back_id);
        tracing::info!(conn = %back_id, source = name, "source registered");
        Ok(())
    }

    /// Route a back request to the front owning its media session.
    fn route_to_front(&mut self, back_id: ConnectionId, name: &str, request: Request) -> Result<()> {
        let Some(back) = self.backs.get_mut(&back_id) else {
            return Ok(());
        };
        let id = request
            .media_session()
            .ok_or(WebRtspError::MissingMediaSession(request.method))?
            .to_string();
        let owner = back
            .media_route(&id)
            .map(|route| route.front)
            .filter(|front| self.fronts.contains_key(front));
        let Some(front_id) = owner else {
            tracing::debug!(conn = %back_id, media_session = %id, "no front for media session");
            back.session.send_response(Response::not_found().reply_to(&request));
            return Ok(());
        };
        if request.method == Method::Teardown {
            back.media_routes.remove(&id);
            tracing::info!(conn = %back_id, media_session = %id, "source tore down media session");
        }
        let uri = join_source_uri(name, &request.uri);
        if let Some(front) = self.fronts.get_mut(&front_id) {
            front.forward(request, back_id, &uri);
        }
        Ok(())
    }

    fn back_response(&mut self, back_id: ConnectionId, mut response: Response) -> Result<()> {
        let Some(back) = self.backs.get_mut(&back_id) else {
            return Ok(());
        };
        let request = back.session.take_outstanding(response.cseq)?;
        let Some(origin) = back.forwards.remove(&response.cseq) else {
            match request.method {
                Method::List if response.is_success() => {
                    match response.body_text().and_then(params::parse_parameters) {
                        Ok(sources) => back.set_sources(sources),
                        Err(err) => tracing::warn!(conn = %back_id, error = %err, "unreadable source list"),
                    }
                }
                _ if !response.is_success() => {
                    tracing::debug!(conn = %back_id, method = %request.method, status = response.status_code, "source refused proxy request");
                }
                _ => {}
            }
            return Ok(());
        };

        if let Err(err) = back.manage_media_sessions(&request, &response, &origin) {
            if let Some(front) = self.fronts.get_mut(&origin.front) {
                let mut failed = Response::bad_gateway();
                failed.cseq = origin.front_cseq;
                front.session.send_response(failed);
            }
            return Err(err);
        }

        let Some(front) = self.fronts.get_mut(&origin.front) else {
            // The viewer left while its grant was in flight.
            if is_grant(request.method)
                && response.is_success()
                && let Some(id) = response.media_session()
            {
                tracing::info!(conn = %back_id, media_session = id, "tearing down orphaned grant");
                back.media_routes.remove(id);
                let teardown = back
                    .session
                    .create_request(Method::Teardown, &request.uri, Some(id));
                back.session.send_request(teardown);
            }
            return Ok(());
        };
        response.cseq = origin.front_cseq;
        if let Some(id) = &origin.front_media_session {
            response.set_media_session(id);
        }
        front.session.send_response(response);
        Ok(())
    }

    /// The transport lost `conn`, or it broke the protocol.
    pub fn close(&mut self, conn: ConnectionId) {
        if let Some(front) = self.fronts.remove(&conn) {
            self.close_front(front);
        } else if let Some(back) = self.backs.remove(&conn) {
            self.close_back(back);
        }
    }

    fn close_front(&mut self, mut front: FrontSession) {
        let front_id = front.id();
        tracing::info!(conn = %front_id, "front closed");
        for back in self.backs.values_mut() {
            for (id, route) in back.take_routes_of(front_id) {
                tracing::debug!(conn = %back.id(), media_session = %id, "tearing down media session of closed front");
                let teardown = back
                    .session
                    .create_request(Method::Teardown, &route.uri, Some(&id));
                back.session.send_request(teardown);
            }
        }
        // Sources waiting on this viewer get an answer after their TEARDOWN.
        for (cseq, origin) in front.forwards.drain() {
            let Some(back) = self.backs.get_mut(&origin.back) else {
                continue;
            };
            let mut response = match front.session.take_outstanding(cseq) {
                Ok(request) => Response::bad_gateway().reply_to(&request),
                Err(_) => Response::bad_gateway(),
            };
            response.cseq = origin.back_cseq;
            back.session.send_response(response);
        }
        front.session.disconnect();
        self.draining.push((front_id, front.session));
    }

    fn close_back(&mut self, mut back: BackSession) {
        let back_id = back.id();
        let name = back.name().unwrap_or_default().to_string();
        if self.registry.get(&name) == Some(&back_id) {
            self.registry.remove(&name);
        }
        tracing::info!(conn = %back_id, source = %name, in_flight = back.in_flight(), "back closed");

        for (_, origin) in back.forwards.drain() {
            let Some(front) = self.fronts.get_mut(&origin.front) else {
                continue;
            };
            let mut response = Response::bad_gateway();
            response.cseq = origin.front_cseq;
            if let Some(id) = &origin.front_media_session {
                response.set_media_session(id);
            }
            front.session.send_response(response);
        }
        for (id, route) in back.media_routes.drain() {
            let Some(front) = self.fronts.get_mut(&route.front) else {
                continue;
            };
            let uri = join_source_uri(&name, &route.uri);
            let teardown = front.session.create_request(Method::Teardown, &uri, Some(&id));
            front.session.send_request(teardown);
        }
        for front in self.fronts.values_mut() {
            front.forget_back(back_id);
        }
        back.session.disconnect();
        self.draining.push((back_id, back.session));
    }

    /// Keepalive on every connection.
    pub fn ping(&mut self) {
        for front in self.fronts.values_mut() {
            front.session.send_ping();
        }
        for back in self.backs.values_mut() {
            back.session.send_ping();
        }
    }

    /// Next message to put on the wire, tagged with its connection.
    pub fn poll_write(&mut self) -> Option<(ConnectionId, Outgoing)> {
        for (id, front) in self.fronts.iter_mut() {
            if let Some(outgoing) = front.session.poll_write() {
                return Some((*id, outgoing));
            }
        }
        for (id, back) in self.backs.iter_mut() {
            if let Some(outgoing) = back.session.poll_write() {
                return Some((*id, outgoing));
            }
        }
        while let Some((id, session)) = self.draining.first_mut() {
            let id = *id;
            match session.poll_write() {
                Some(Outgoing::Disconnect) => {
                    self.draining.remove(0);
                    return Some((id, Outgoing::Disconnect));
                }
                Some(outgoing) => return Some((id, outgoing)),
                None => {
                    self.draining.remove(0);
                }
            }
        }
        None
    }
}
