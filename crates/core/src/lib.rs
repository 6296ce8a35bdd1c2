pub mod error;
pub mod peer;
pub mod protocol;
pub mod proxy;
pub mod server;
pub mod session;
pub mod transport;

pub use error::{Result, WebRtspError};
pub use peer::{PeerEvent, PeerEventSender, PeerFactory, PeerNotification, WebRtcPeer};
pub use proxy::{ConnectionId, ForwardContext, Forwarder};
pub use server::{ProxyConfig, ProxyServer};
pub use session::client::ClientSession;
pub use session::server::{ServerPolicy, ServerSession, StaticPolicy};
pub use session::{MethodHandler, Outgoing, Session};
