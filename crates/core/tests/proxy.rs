//! Forwarder routing, registration and disconnect cascades.

mod common;

use common::*;
use tokio::sync::mpsc;
use webrtsp::protocol::params::parse_parameters;
use webrtsp::protocol::{Method, Request, Response};
use webrtsp::{
    ClientSession, ConnectionId, ForwardContext, Forwarder, MethodHandler, Outgoing, ServerSession, StaticPolicy,
    WebRtspError,
};

const REGISTER: &str = "SET_PARAMETER * WEBRTSP/0.1\r\nCSeq: 1\r\nAuthorization: Bearer t\r\nContent-Type: text/parameters\r\n\r\nname: cam1\r\n";

fn outbox(forwarder: &mut Forwarder) -> Vec<(ConnectionId, Outgoing)> {
    std::iter::from_fn(|| forwarder.poll_write()).collect()
}

fn only_for(out: Vec<(ConnectionId, Outgoing)>, conn: ConnectionId) -> Vec<Outgoing> {
    out.into_iter()
        .map(|(to, outgoing)| {
            assert_eq!(to, conn, "unexpected message for {to}: {outgoing:?}");
            outgoing
        })
        .collect()
}

fn respond(to: &Request, status: u16, session: Option<&str>) -> Vec<u8> {
    let mut response = Response::new(status, "X");
    response.cseq = to.cseq;
    if let Some(id) = session {
        response.set_media_session(id);
    }
    response.serialize()
}

/// A forwarder with `cam1` registered on its own back connection.
fn registered() -> (Forwarder, ConnectionId) {
    let mut forwarder = Forwarder::new(ForwardContext::new().with_source("cam1", "t").with_source("cam2", "t2"));
    let back = forwarder.connect_back();
    forwarder.handle_message(back, REGISTER.as_bytes()).unwrap();
    let mut out = only_for(outbox(&mut forwarder), back);
    assert_eq!(out.len(), 2);
    assert_eq!(expect_response(out.remove(0)).status_code, 200);
    let list = expect_request(out.remove(0));
    assert_eq!((list.method, list.uri.as_str()), (Method::List, "*"));
    let answer = format!(
        "WEBRTSP/0.1 200 OK\r\nCSeq: {}\r\nContent-Type: text/list\r\n\r\nmain: Main stream\r\n",
        list.cseq
    );
    forwarder.handle_message(back, answer.as_bytes()).unwrap();
    assert!(forwarder.is_registered("cam1"));
    (forwarder, back)
}

/// Front DESCRIBE forwarded to the back; returns the request the back saw.
fn front_describe(forwarder: &mut Forwarder, front: ConnectionId, back: ConnectionId, cseq: u32) -> Request {
    let describe = format!("DESCRIBE cam1/main WEBRTSP/0.1\r\nCSeq: {cseq}\r\n");
    forwarder.handle_message(front, describe.as_bytes()).unwrap();
    let mut out = only_for(outbox(forwarder), back);
    expect_request(out.remove(0))
}

/// A granted media session `id` owned by a fresh front.
fn granted(forwarder: &mut Forwarder, back: ConnectionId, id: &str) -> ConnectionId {
    let front = forwarder.connect_front();
    let seen = front_describe(forwarder, front, back, 1);
    forwarder.handle_message(back, &respond(&seen, 200, Some(id))).unwrap();
    outbox(forwarder);
    front
}

#[test]
fn registration_collects_source_list() {
    let (forwarder, back) = registered();
    let entry = forwarder.back_by_name("cam1").unwrap();
    assert_eq!(entry.id(), back);
    assert_eq!(entry.sources(), &[("main".to_string(), "Main stream".to_string())]);
}

#[test]
fn registration_failures_close_the_back() {
    let cases = [
        (REGISTER.replace("cam1", "cam9"), "unknown"),
        (REGISTER.replace("Bearer t", "Bearer x"), "token"),
        ("DESCRIBE main WEBRTSP/0.1\r\nCSeq: 1\r\n".to_string(), "unregistered"),
    ];
    for (frame, case) in cases {
        let mut forwarder = Forwarder::new(ForwardContext::new().with_source("cam1", "t"));
        let back = forwarder.connect_back();
        let err = forwarder.handle_message(back, frame.as_bytes()).unwrap_err();
        match case {
            "unknown" => assert!(matches!(err, WebRtspError::UnknownSource(_))),
            "token" => assert!(matches!(err, WebRtspError::InvalidToken(_))),
            _ => assert!(matches!(err, WebRtspError::NotRegistered)),
        }
        assert_eq!(outbox(&mut forwarder), vec![(back, Outgoing::Disconnect)]);
        assert_eq!(forwarder.back_count(), 0);
    }
}

#[test]
fn duplicate_name_is_rejected() {
    let (mut forwarder, first) = registered();
    let second = forwarder.connect_back();
    assert!(matches!(
        forwarder.handle_message(second, REGISTER.as_bytes()),
        Err(WebRtspError::AlreadyRegistered(_))
    ));
    assert_eq!(forwarder.back_by_name("cam1").map(|b| b.id()), Some(first));
}

#[test]
fn describe_grant_enters_mapping_on_response() {
    let (mut forwarder, back) = registered();
    let front = forwarder.connect_front();
    let seen = front_describe(&mut forwarder, front, back, 5);
    assert_eq!(seen.uri, "main");
    assert_ne!(seen.cseq, 5);
    assert_eq!(forwarder.media_session_owner("cam1", "S1"), None);

    forwarder.handle_message(back, &respond(&seen, 200, Some("S1"))).unwrap();
    let mut out = only_for(outbox(&mut forwarder), front);
    let response = expect_response(out.remove(0));
    assert_eq!(response.cseq, 5);
    assert_eq!(response.media_session(), Some("S1"));
    assert_eq!(forwarder.media_session_owner("cam1", "S1"), Some(front));
}

#[test]
fn orphaned_grant_is_torn_down() {
    let (mut forwarder, back) = registered();
    let front = forwarder.connect_front();
    let seen = front_describe(&mut forwarder, front, back, 1);

    forwarder.close(front);
    assert_eq!(outbox(&mut forwarder), vec![(front, Outgoing::Disconnect)]);

    forwarder.handle_message(back, &respond(&seen, 200, Some("S1"))).unwrap();
    let mut out = only_for(outbox(&mut forwarder), back);
    assert_eq!(out.len(), 1);
    let teardown = expect_request(out.remove(0));
    assert_eq!(teardown.method, Method::Teardown);
    assert_eq!(teardown.uri, "main");
    assert_eq!(teardown.media_session(), Some("S1"));
    assert_eq!(forwarder.media_session_owner("cam1", "S1"), None);
}

#[test]
fn responses_correlate_out_of_order() {
    let (mut forwarder, back) = registered();
    let a = forwarder.connect_front();
    let b = forwarder.connect_front();
    let seen_a = front_describe(&mut forwarder, a, back, 1);
    let seen_b = front_describe(&mut forwarder, b, back, 1);
    assert_ne!(seen_a.cseq, seen_b.cseq);

    forwarder.handle_message(back, &respond(&seen_b, 200, Some("B"))).unwrap();
    forwarder.handle_message(back, &respond(&seen_a, 200, Some("A"))).unwrap();
    let out = outbox(&mut forwarder);
    assert_eq!(out.len(), 2);
    for (to, outgoing) in out {
        let response = expect_response(outgoing);
        assert_eq!(response.cseq, 1);
        let expected = if to == a { "A" } else { "B" };
        assert_eq!(response.media_session(), Some(expected));
    }

    // A repeated response is a protocol error for the back.
    assert!(matches!(
        forwarder.handle_message(back, &respond(&seen_a, 200, Some("A"))),
        Err(WebRtspError::UnknownCSeq(_))
    ));
}

#[test]
fn unknown_and_offline_sources() {
    let mut forwarder = Forwarder::new(ForwardContext::new().with_source("cam1", "t"));
    let front = forwarder.connect_front();
    forwarder
        .handle_message(front, b"DESCRIBE nowhere/main WEBRTSP/0.1\r\nCSeq: 1\r\n")
        .unwrap();
    forwarder
        .handle_message(front, b"DESCRIBE cam1/main WEBRTSP/0.1\r\nCSeq: 2\r\n")
        .unwrap();
    let statuses: Vec<(u32, u16)> = only_for(outbox(&mut forwarder), front)
        .into_iter()
        .map(expect_response)
        .map(|r| (r.cseq, r.status_code))
        .collect();
    assert_eq!(statuses, vec![(1, 404), (2, 503)]);
}

#[test]
fn back_close_answers_in_flight_and_tears_down_viewers() {
    let (mut forwarder, back) = registered();
    let owner = granted(&mut forwarder, back, "S1");
    let waiting = forwarder.connect_front();
    front_describe(&mut forwarder, waiting, back, 9);

    forwarder.close(back);
    assert!(!forwarder.is_registered("cam1"));
    let out = outbox(&mut forwarder);
    let mut saw_502 = false;
    let mut saw_teardown = false;
    for (to, outgoing) in out {
        match outgoing {
            Outgoing::Response(response) => {
                assert_eq!((to, response.cseq, response.status_code), (waiting, 9, 502));
                saw_502 = true;
            }
            Outgoing::Request(request) => {
                assert_eq!(to, owner);
                assert_eq!(request.method, Method::Teardown);
                assert_eq!(request.uri, "cam1/main");
                assert_eq!(request.media_session(), Some("S1"));
                saw_teardown = true;
            }
            Outgoing::Disconnect => assert_eq!(to, back),
        }
    }
    assert!(saw_502 && saw_teardown);

    forwarder
        .handle_message(owner, b"DESCRIBE cam1/main WEBRTSP/0.1\r\nCSeq: 2\r\n")
        .unwrap();
    let reply = expect_response(only_for(outbox(&mut forwarder), owner).remove(0));
    assert_eq!(reply.status_code, 503);
}

#[test]
fn front_close_tears_down_its_media_sessions() {
    let (mut forwarder, back) = registered();
    let front = granted(&mut forwarder, back, "S1");
    forwarder.close(front);
    let out = outbox(&mut forwarder);
    let teardown = out
        .into_iter()
        .find_map(|(to, outgoing)| match outgoing {
            Outgoing::Request(request) if to == back => Some(request),
            _ => None,
        })
        .unwrap();
    assert_eq!(teardown.method, Method::Teardown);
    assert_eq!(teardown.media_session(), Some("S1"));
    assert_eq!(forwarder.media_session_owner("cam1", "S1"), None);
}

#[test]
fn back_requests_reach_owning_front() {
    let (mut forwarder, back) = registered();
    let front = granted(&mut forwarder, back, "S1");

    let setup = "SETUP main WEBRTSP/0.1\r\nCSeq: 40\r\nSession: S1\r\nContent-Type: application/x-ice-candidate\r\n\r\n0/candidate:1\r\n";
    forwarder.handle_message(back, setup.as_bytes()).unwrap();
    let forwarded = expect_request(only_for(outbox(&mut forwarder), front).remove(0));
    assert_eq!(forwarded.method, Method::Setup);
    assert_eq!(forwarded.uri, "cam1/main");
    assert_eq!(forwarded.body, b"0/candidate:1\r\n");

    forwarder.handle_message(front, &respond(&forwarded, 200, Some("S1"))).unwrap();
    let answer = expect_response(only_for(outbox(&mut forwarder), back).remove(0));
    assert_eq!(answer.cseq, 40);

    // Unknown media sessions are refused without closing the source.
    forwarder
        .handle_message(back, b"SETUP main WEBRTSP/0.1\r\nCSeq: 41\r\nSession: S9\r\n")
        .unwrap();
    let refused = expect_response(only_for(outbox(&mut forwarder), back).remove(0));
    assert_eq!((refused.cseq, refused.status_code), (41, 404));
}

#[test]
fn back_teardown_unmaps_media_session() {
    let (mut forwarder, back) = registered();
    let front = granted(&mut forwarder, back, "S1");
    forwarder
        .handle_message(back, b"TEARDOWN main WEBRTSP/0.1\r\nCSeq: 3\r\nSession: S1\r\n")
        .unwrap();
    let forwarded = expect_request(only_for(outbox(&mut forwarder), front).remove(0));
    assert_eq!(forwarded.method, Method::Teardown);
    assert_eq!(forwarder.media_session_owner("cam1", "S1"), None);
}

#[test]
fn fronts_cannot_touch_foreign_media_sessions() {
    let (mut forwarder, back) = registered();
    granted(&mut forwarder, back, "S1");
    let intruder = forwarder.connect_front();
    forwarder
        .handle_message(intruder, b"TEARDOWN cam1/main WEBRTSP/0.1\r\nCSeq: 1\r\nSession: S1\r\n")
        .unwrap();
    let reply = expect_response(only_for(outbox(&mut forwarder), intruder).remove(0));
    assert_eq!(reply.status_code, 404);
    assert!(forwarder.media_session_owner("cam1", "S1").is_some());
}

#[test]
fn mismatched_session_closes_the_back() {
    let (mut forwarder, back) = registered();
    let front = granted(&mut forwarder, back, "S1");
    forwarder
        .handle_message(front, b"PLAY cam1/main WEBRTSP/0.1\r\nCSeq: 2\r\nSession: S1\r\nContent-Type: application/sdp\r\n\r\nv=0\r\n")
        .unwrap();
    let seen = expect_request(only_for(outbox(&mut forwarder), back).remove(0));

    assert!(matches!(
        forwarder.handle_message(back, &respond(&seen, 200, Some("S2"))),
        Err(WebRtspError::MediaSessionMismatch { .. })
    ));
    assert!(!forwarder.is_registered("cam1"));
    let to_front: Vec<u16> = outbox(&mut forwarder)
        .into_iter()
        .filter(|(to, _)| *to == front)
        .filter_map(|(_, outgoing)| match outgoing {
            Outgoing::Response(response) => Some(response.status_code),
            _ => None,
        })
        .collect();
    assert_eq!(to_front, vec![502]);
}

#[test]
fn local_options_and_list() {
    let (mut forwarder, _back) = registered();
    let front = forwarder.connect_front();
    forwarder
        .handle_message(front, b"OPTIONS * WEBRTSP/0.1\r\nCSeq: 1\r\n")
        .unwrap();
    forwarder.handle_message(front, b"LIST * WEBRTSP/0.1\r\nCSeq: 2\r\n").unwrap();
    let mut out = only_for(outbox(&mut forwarder), front);
    let options = expect_response(out.remove(0));
    assert_eq!(options.header("Public"), Some("LIST, DESCRIBE, PLAY, SETUP, TEARDOWN"));
    let list = expect_response(out.remove(0));
    assert_eq!(
        parse_parameters(list.body_text().unwrap()).unwrap(),
        vec![("cam1/main".to_string(), "Main stream".to_string())]
    );
}

#[test]
fn viewer_token_is_enforced() {
    let mut forwarder = Forwarder::new(ForwardContext::new().with_source("cam1", "t").with_viewer_token("v"));
    let front = forwarder.connect_front();
    forwarder
        .handle_message(front, b"DESCRIBE cam1/main WEBRTSP/0.1\r\nCSeq: 1\r\n")
        .unwrap();
    forwarder
        .handle_message(front, b"DESCRIBE cam1/main WEBRTSP/0.1\r\nCSeq: 2\r\nAuthorization: Bearer no\r\n")
        .unwrap();
    forwarder
        .handle_message(front, b"OPTIONS * WEBRTSP/0.1\r\nCSeq: 3\r\nAuthorization: Bearer v\r\n")
        .unwrap();
    let statuses: Vec<u16> = only_for(outbox(&mut forwarder), front)
        .into_iter()
        .map(|outgoing| expect_response(outgoing).status_code)
        .collect();
    assert_eq!(statuses, vec![401, 403, 200]);
}

#[test]
fn ping_reaches_every_connection() {
    let (mut forwarder, back) = registered();
    let front = forwarder.connect_front();
    forwarder.ping();
    let mut pinged: Vec<ConnectionId> = outbox(&mut forwarder)
        .into_iter()
        .map(|(to, outgoing)| {
            let ping = expect_request(outgoing);
            assert_eq!((ping.method, ping.uri.as_str()), (Method::GetParameter, "*"));
            to
        })
        .collect();
    pinged.sort();
    assert_eq!(pinged, vec![back, front]);
}

#[test]
fn garbage_closes_front() {
    let mut forwarder = Forwarder::new(ForwardContext::new());
    let front = forwarder.connect_front();
    assert!(forwarder.handle_message(front, b"HELLO\r\n").is_err());
    assert_eq!(outbox(&mut forwarder), vec![(front, Outgoing::Disconnect)]);
    // Late frames for the closed connection are ignored.
    forwarder.handle_message(front, b"HELLO\r\n").unwrap();
}

/// Viewer client and source server talking through the proxy.
#[test]
fn client_reaches_server_through_proxy() {
    let mut forwarder = Forwarder::new(ForwardContext::new().with_source("cam1", "t"));
    let back = forwarder.connect_back();
    let front = forwarder.connect_front();

    let (server_tx, mut server_rx) = mpsc::unbounded_channel();
    let server_peers = MockPeers::new("v=0\r\ns=source\r\n");
    let policy = StaticPolicy {
        list: true,
        streams: vec![("main".to_string(), "Main".to_string())],
        ..StaticPolicy::playback()
    };
    let mut server = ServerSession::new(policy, server_peers.factory(), server_tx);
    server.register_with_proxy("cam1", "t");

    let (client_tx, mut client_rx) = mpsc::unbounded_channel();
    let client_peers = MockPeers::new("v=0\r\ns=viewer\r\n");
    let mut client = ClientSession::new("cam1/main", client_peers.factory(), client_tx);
    client.on_connected();

    let settle = |forwarder: &mut Forwarder, server: &mut ServerSession<StaticPolicy>, client: &mut ClientSession| loop {
        let mut moved = false;
        for outgoing in drain(server.session_mut()) {
            forwarder.handle_message(back, &over_wire(&outgoing)).unwrap();
            moved = true;
        }
        for outgoing in drain(client.session_mut()) {
            forwarder.handle_message(front, &over_wire(&outgoing)).unwrap();
            moved = true;
        }
        for (to, outgoing) in outbox(forwarder) {
            let bytes = over_wire(&outgoing);
            if to == back {
                server.handle_message(&bytes).unwrap();
            } else {
                client.handle_message(&bytes).unwrap();
            }
            moved = true;
        }
        if !moved {
            break;
        }
    };

    settle(&mut forwarder, &mut server, &mut client);
    assert!(forwarder.is_registered("cam1"));
    assert_eq!(server_peers.last().lock().uri, "main");

    server_peers.events().ice_candidate(0, "candidate:1 1 udp 1 10.1.1.1 9000 typ host");
    server_peers.events().prepared();
    pump(&mut server_rx, |n| server.handle_peer_notification(n).unwrap());
    settle(&mut forwarder, &mut server, &mut client);

    client_peers.events().prepared();
    pump(&mut client_rx, |n| client.handle_peer_notification(n).unwrap());
    settle(&mut forwarder, &mut server, &mut client);

    assert!(client.is_playing());
    assert!(server_peers.last().lock().played);
    assert_eq!(client_peers.last().lock().candidates.len(), 1);
    let id = client.media_session().unwrap().id().to_string();
    assert_eq!(forwarder.media_session_owner("cam1", &id), Some(front));
}

/// A source with listing disabled refuses `LIST *` without dropping off.
#[test]
fn playback_only_source_stays_registered() {
    let mut forwarder = Forwarder::new(ForwardContext::new().with_source("cam1", "t"));
    let back = forwarder.connect_back();
    let (tx, _rx) = mpsc::unbounded_channel();
    let peers = MockPeers::new("v=0\r\n");
    let mut agent = ServerSession::new(StaticPolicy::playback(), peers.factory(), tx);
    agent.register_with_proxy("cam1", "t");

    loop {
        let mut moved = false;
        for outgoing in drain(agent.session_mut()) {
            forwarder.handle_message(back, &over_wire(&outgoing)).unwrap();
            moved = true;
        }
        for (to, outgoing) in outbox(&mut forwarder) {
            assert_eq!(to, back);
            agent.handle_message(&over_wire(&outgoing)).unwrap();
            moved = true;
        }
        if !moved {
            break;
        }
    }
    assert!(forwarder.is_registered("cam1"));
    assert!(forwarder.back_by_name("cam1").unwrap().sources().is_empty());

    let front = forwarder.connect_front();
    forwarder
        .handle_message(front, b"DESCRIBE cam1/main WEBRTSP/0.1\r\nCSeq: 1\r\n")
        .unwrap();
    let describe = expect_request(only_for(outbox(&mut forwarder), back).remove(0));
    agent.handle_message(&describe.serialize()).unwrap();
    assert_eq!(peers.count(), 1);
    assert_eq!(peers.last().lock().uri, "main");
}
