//! Network transport for the inverse proxy.
//!
//! WEBRTSP messages travel one per WebSocket text frame. The proxy listens
//! twice, once for viewers (front) and once for source agents (back):
//!
//! - **Connection tasks** ([`ws::accept_loop`]): one per socket, relaying
//!   frames to the reactor and writing what it sends back. Each closes its
//!   socket after the configured idle window without inbound frames.
//!
//! - **Reactor** ([`ws::reactor`]): the single task owning the
//!   [`Forwarder`](crate::proxy::Forwarder), so every session runs on one
//!   execution context. It also pings every connection on an interval.

pub mod ws;
