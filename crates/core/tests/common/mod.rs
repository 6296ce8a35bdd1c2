#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use webrtsp::peer::IceServers;
use webrtsp::protocol::{Message, Request, Response};
use webrtsp::{MethodHandler, Outgoing, PeerEventSender, PeerFactory, PeerNotification, Session, WebRtcPeer};

/// Everything a [`MockPeer`] was asked to do.
#[derive(Default)]
pub struct PeerLog {
    pub uri: String,
    pub events: Option<PeerEventSender>,
    pub remote_sdp: Vec<String>,
    pub candidates: Vec<(u32, String)>,
    pub played: bool,
    pub stopped: bool,
}

pub type SharedLog = Arc<Mutex<PeerLog>>;

pub struct MockPeer {
    log: SharedLog,
    sdp: String,
}

impl WebRtcPeer for MockPeer {
    fn prepare(&mut self, _ice_servers: &IceServers, events: PeerEventSender) {
        self.log.lock().events = Some(events);
    }

    fn sdp(&self) -> String {
        self.sdp.clone()
    }

    fn set_remote_sdp(&mut self, sdp: &str) {
        self.log.lock().remote_sdp.push(sdp.to_string());
    }

    fn add_ice_candidate(&mut self, mline_index: u32, candidate: &str) {
        self.log.lock().candidates.push((mline_index, candidate.to_string()));
    }

    fn play(&mut self) {
        self.log.lock().played = true;
    }

    fn stop(&mut self) {
        self.log.lock().stopped = true;
    }
}

/// Factory handing out [`MockPeer`]s and keeping their logs.
#[derive(Clone)]
pub struct MockPeers {
    sdp: &'static str,
    created: Arc<Mutex<Vec<SharedLog>>>,
    available: bool,
}

impl MockPeers {
    pub fn new(sdp: &'static str) -> Self {
        Self {
            sdp,
            created: Arc::default(),
            available: true,
        }
    }

    /// A factory that never produces a peer.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new("")
        }
    }

    pub fn factory(&self) -> impl PeerFactory + 'static {
        let this = self.clone();
        move |uri: &str| -> Option<Box<dyn WebRtcPeer>> {
            if !this.available {
                return None;
            }
            let log = SharedLog::default();
            log.lock().uri = uri.to_string();
            this.created.lock().push(log.clone());
            Some(Box::new(MockPeer {
                log,
                sdp: this.sdp.to_string(),
            }))
        }
    }

    pub fn count(&self) -> usize {
        self.created.lock().len()
    }

    pub fn last(&self) -> SharedLog {
        self.created.lock().last().cloned().expect("no peer created")
    }

    /// Event sender the last peer was prepared with.
    pub fn events(&self) -> PeerEventSender {
        self.last().lock().events.clone().expect("peer not prepared")
    }
}

pub fn drain(session: &mut Session) -> Vec<Outgoing> {
    std::iter::from_fn(|| session.poll_write()).collect()
}

pub fn expect_request(outgoing: Outgoing) -> Request {
    match outgoing {
        Outgoing::Request(request) => request,
        other => panic!("expected request, got {other:?}"),
    }
}

pub fn expect_response(outgoing: Outgoing) -> Response {
    match outgoing {
        Outgoing::Response(response) => response,
        other => panic!("expected response, got {other:?}"),
    }
}

/// Drain `handler` and require exactly one queued message.
pub fn single<H: MethodHandler>(handler: &mut H) -> Outgoing {
    let mut out = drain(handler.session_mut());
    assert_eq!(out.len(), 1, "expected one message, got {out:?}");
    out.remove(0)
}

/// Feed queued peer notifications to a session.
pub fn pump<F>(rx: &mut mpsc::UnboundedReceiver<PeerNotification>, mut handle: F)
where
    F: FnMut(PeerNotification),
{
    while let Ok(notification) = rx.try_recv() {
        handle(notification);
    }
}

/// Wire round trip, so tests exercise the codec between roles.
pub fn over_wire(outgoing: &Outgoing) -> Vec<u8> {
    outgoing.serialize().expect("disconnect has no wire form")
}

pub fn reparse(bytes: &[u8]) -> Message {
    Message::parse(bytes).expect("own output parses")
}

pub fn request(text: &str) -> Vec<u8> {
    text.replace('\n', "\r\n").into_bytes()
}
