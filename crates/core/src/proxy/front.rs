use std::collections::HashMap;

use super::ConnectionId;
use crate::protocol::{CSeq, Request};
use crate::session::Session;

/// Where a back request forwarded to this front came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BackOrigin {
    pub back: ConnectionId,
    pub back_cseq: CSeq,
}

/// Proxy session facing one viewer connection.
#[derive(Debug)]
pub struct FrontSession {
    id: ConnectionId,
    pub(crate) session: Session,
    pub(crate) forwards: HashMap<CSeq, BackOrigin>,
}

impl FrontSession {
    pub(crate) fn new(id: ConnectionId) -> Self {
        FrontSession {
            id,
            session: Session::new(),
            forwards: HashMap::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn in_flight(&self) -> usize {
        self.forwards.len()
    }

    /// Re-issue a back request (SETUP, TEARDOWN, RECORD) toward the viewer
    /// under a front CSeq, with the URI as the viewer addresses it.
    pub(crate) fn forward(&mut self, request: Request, back: ConnectionId, uri: &str) -> CSeq {
        let Request {
            method,
            headers,
            cseq: back_cseq,
            body,
            ..
        } = request;
        let mut outbound = self.session.create_request(method, uri, None);
        outbound.headers = headers;
        outbound.body = body;
        self.forwards.insert(outbound.cseq, BackOrigin { back, back_cseq });
        tracing::debug!(front = %self.id, %back, back_cseq, front_cseq = outbound.cseq, %method, uri, "forward to front");
        self.session.send_request(outbound)
    }

    /// Pending back requests that were waiting on `back`, dropped.
    pub(crate) fn forget_back(&mut self, back: ConnectionId) -> usize {
        let before = self.forwards.len();
        self.forwards.retain(|_, origin| origin.back != back);
        before - self.forwards.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Method;

    #[test]
    fn forward_allocates_front_cseq() {
        let mut front = FrontSession::new(ConnectionId(3));
        // Make the front's CSeq space diverge from the back's.
        front.session.send_ping();

        let mut request = Request::new(Method::Setup, "main").add_header("Session", "S1");
        request.cseq = 1;
        let cseq = front.forward(request, ConnectionId(9), "cam1/main");
        assert_eq!(cseq, 2);
        assert_eq!(
            front.forwards[&cseq],
            BackOrigin {
                back: ConnectionId(9),
                back_cseq: 1
            }
        );
        let sent = front.session.take_outstanding(cseq).unwrap();
        assert_eq!(sent.uri, "cam1/main");
        assert_eq!(sent.media_session(), Some("S1"));

        assert_eq!(front.forget_back(ConnectionId(9)), 1);
        assert_eq!(front.in_flight(), 0);
    }
}
