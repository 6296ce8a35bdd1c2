use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;

use crate::error::Result;
use crate::proxy::{ConnectionId, Forwarder, Side};
use crate::session::Outgoing;

/// What connection tasks tell the reactor.
#[derive(Debug)]
pub enum Event {
    Connected {
        side: Side,
        commands: mpsc::UnboundedSender<Command>,
        reply: oneshot::Sender<ConnectionId>,
    },
    Frame {
        conn: ConnectionId,
        data: Vec<u8>,
    },
    Closed {
        conn: ConnectionId,
    },
}

/// What the reactor tells a connection task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(Vec<u8>),
    Close,
}

/// WEBRTSP is text; anything else goes out as a binary frame.
fn frame(bytes: Vec<u8>) -> Message {
    match String::from_utf8(bytes) {
        Ok(text) => Message::Text(text.into()),
        Err(err) => Message::Binary(err.into_bytes().into()),
    }
}

/// Accept WebSocket connections for one side of the proxy until the
/// reactor goes away.
pub async fn accept_loop(
    listener: TcpListener,
    side: Side,
    events: mpsc::UnboundedSender<Event>,
    idle_timeout: Duration,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                if events.is_closed() {
                    break;
                }
                let events = events.clone();
                tokio::spawn(async move {
                    if let Err(err) = Connection::handle(stream, peer_addr, side, events, idle_timeout).await {
                        tracing::debug!(%peer_addr, error = %err, "connection ended with error");
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, ?side, "TCP accept error");
            }
        }
    }
    tracing::debug!(?side, "accept loop exited");
}

/// A single WebSocket connection, relaying frames between the socket and
/// the reactor.
struct Connection;

impl Connection {
    async fn handle(
        stream: TcpStream,
        peer_addr: SocketAddr,
        side: Side,
        events: mpsc::UnboundedSender<Event>,
        idle_timeout: Duration,
    ) -> Result<()> {
        let ws = tokio_tungstenite::accept_async(stream).await?;
        let (mut sink, mut stream) = ws.split();

        let (commands, mut command_rx) = mpsc::unbounded_channel();
        let (reply, reply_rx) = oneshot::channel();
        if events.send(Event::Connected { side, commands, reply }).is_err() {
            return Ok(());
        }
        let Ok(conn) = reply_rx.await else {
            return Ok(());
        };
        tracing::info!(%conn, %peer_addr, ?side, "websocket connected");

        let mut deadline = Instant::now() + idle_timeout;
        let result = loop {
            tokio::select! {
                msg = stream.next() => {
                    let data = match msg {
                        Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
                        Some(Ok(Message::Binary(data))) => data.to_vec(),
                        Some(Ok(Message::Close(_))) | None => break Ok(()),
                        Some(Ok(_)) => {
                            deadline = Instant::now() + idle_timeout;
                            continue;
                        }
                        Some(Err(err)) => break Err(err.into()),
                    };
                    deadline = Instant::now() + idle_timeout;
                    tracing::trace!(%conn, len = data.len(), "frame in");
                    if events.send(Event::Frame { conn, data }).is_err() {
                        break Ok(());
                    }
                }
                command = command_rx.recv() => match command {
                    Some(Command::Send(bytes)) => {
                        if let Err(err) = sink.send(frame(bytes)).await {
                            break Err(err.into());
                        }
                    }
                    Some(Command::Close) | None => {
                        let _ = sink.send(Message::Close(None)).await;
                        break Ok(());
                    }
                },
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(%conn, %peer_addr, "idle timeout");
                    let _ = sink.send(Message::Close(None)).await;
                    break Ok(());
                }
            }
        };

        tracing::info!(%conn, %peer_addr, "websocket disconnected");
        let _ = events.send(Event::Closed { conn });
        result
    }
}

/// Owns the [`Forwarder`]; every session runs on this one task.
pub async fn reactor(
    mut forwarder: Forwarder,
    mut events: mpsc::UnboundedReceiver<Event>,
    ping_interval: Duration,
) {
    let mut connections: HashMap<ConnectionId, mpsc::UnboundedSender<Command>> = HashMap::new();
    let mut ping = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(Event::Connected { side, commands, reply }) => {
                    let conn = match side {
                        Side::Front => forwarder.connect_front(),
                        Side::Back => forwarder.connect_back(),
                    };
                    if reply.send(conn).is_ok() {
                        connections.insert(conn, commands);
                    } else {
                        forwarder.close(conn);
                    }
                }
                Some(Event::Frame { conn, data }) => {
                    if let Err(err) = forwarder.handle_message(conn, &data) {
                        tracing::debug!(%conn, error = %err, "frame rejected");
                    }
                }
                Some(Event::Closed { conn }) => {
                    forwarder.close(conn);
                    connections.remove(&conn);
                }
                None => break,
            },
            _ = ping.tick() => forwarder.ping(),
        }
        flush(&mut forwarder, &mut connections);
    }
    tracing::debug!("reactor exited");
}

fn flush(forwarder: &mut Forwarder, connections: &mut HashMap<ConnectionId, mpsc::UnboundedSender<Command>>) {
    while let Some((conn, outgoing)) = forwarder.poll_write() {
        let command = match outgoing {
            Outgoing::Disconnect => {
                let Some(tx) = connections.remove(&conn) else {
                    continue;
                };
                let _ = tx.send(Command::Close);
                continue;
            }
            outgoing => match outgoing.serialize() {
                Some(bytes) => Command::Send(bytes),
                None => continue,
            },
        };
        if let Some(tx) = connections.get(&conn) {
            let _ = tx.send(command);
        }
    }
}
