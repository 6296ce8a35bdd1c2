use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::proxy::{ForwardContext, Forwarder, Side};
use crate::transport::ws;

/// Inverse proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Listen address for viewers.
    pub front_bind: String,
    /// Listen address for source agents.
    pub back_bind: String,
    /// `(name, token)` of every source allowed to register.
    pub sources: Vec<(String, String)>,
    /// Bearer token viewers must present. `None` leaves the front open.
    pub viewer_token: Option<String>,
    /// How often every connection gets a `GET_PARAMETER *` keepalive.
    pub ping_interval: Duration,
    /// Connections silent for longer than this are closed.
    pub idle_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            front_bind: "0.0.0.0:5554".to_string(),
            back_bind: "0.0.0.0:5555".to_string(),
            sources: Vec::new(),
            viewer_token: None,
            ping_interval: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(30),
        }
    }
}

impl ProxyConfig {
    pub fn forward_context(&self) -> ForwardContext {
        let mut context = ForwardContext::new();
        for (name, token) in &self.sources {
            context.add_source(name, token);
        }
        if let Some(token) = &self.viewer_token {
            context = context.with_viewer_token(token);
        }
        context
    }
}

/// The inverse proxy bound to its two listeners.
///
/// Binding and serving are separate so callers can learn the actual
/// addresses (port 0) before traffic starts.
pub struct ProxyServer {
    config: ProxyConfig,
    front: TcpListener,
    back: TcpListener,
}

impl ProxyServer {
    pub async fn bind(config: ProxyConfig) -> Result<Self> {
        let front = TcpListener::bind(&config.front_bind).await?;
        let back = TcpListener::bind(&config.back_bind).await?;
        Ok(Self { config, front, back })
    }

    pub fn front_addr(&self) -> Result<SocketAddr> {
        Ok(self.front.local_addr()?)
    }

    pub fn back_addr(&self) -> Result<SocketAddr> {
        Ok(self.back.local_addr()?)
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Serve until the process ends.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` completes. Open connections are closed when
    /// the reactor goes away.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let front_addr = self.front_addr()?;
        let back_addr = self.back_addr()?;
        let ProxyServer { config, front, back } = self;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let forwarder = Forwarder::new(config.forward_context());
        let front_task = tokio::spawn(ws::accept_loop(front, Side::Front, events_tx.clone(), config.idle_timeout));
        let back_task = tokio::spawn(ws::accept_loop(back, Side::Back, events_tx, config.idle_timeout));

        tracing::info!(
            front = %front_addr,
            back = %back_addr,
            sources = config.sources.len(),
            viewer_auth = config.viewer_token.is_some(),
            "WEBRTSP proxy listening"
        );

        tokio::select! {
            _ = ws::reactor(forwarder, events_rx, config.ping_interval) => {}
            _ = shutdown => tracing::info!("proxy stopping"),
        }
        front_task.abort();
        back_task.abort();
        Ok(())
    }
}
