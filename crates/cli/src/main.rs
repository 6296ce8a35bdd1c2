use std::time::Duration;

use clap::Parser;
use webrtsp::{ProxyConfig, ProxyServer};

#[derive(Parser)]
#[command(
    name = "webrtsp-proxy",
    about = "WEBRTSP inverse proxy: viewers reach sources that dial in"
)]
struct Args {
    /// Listen address for viewers (host:port)
    #[arg(long, default_value = "0.0.0.0:5554")]
    front_bind: String,

    /// Listen address for source agents (host:port)
    #[arg(long, default_value = "0.0.0.0:5555")]
    back_bind: String,

    /// Source allowed to register, as NAME=TOKEN (repeatable)
    #[arg(long = "source", value_name = "NAME=TOKEN", value_parser = parse_source)]
    sources: Vec<(String, String)>,

    /// Bearer token viewers must present
    #[arg(long)]
    viewer_token: Option<String>,

    /// Seconds between keepalive pings
    #[arg(long, default_value_t = 10)]
    ping_interval: u64,

    /// Seconds of silence before a connection is dropped
    #[arg(long, default_value_t = 30)]
    idle_timeout: u64,
}

fn parse_source(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((name, token)) if !name.is_empty() && !token.is_empty() && !name.contains('/') => {
            Ok((name.to_string(), token.to_string()))
        }
        _ => Err(format!("expected NAME=TOKEN, got {value:?}")),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    if args.sources.is_empty() {
        tracing::warn!("no --source configured; no agent will be able to register");
    }

    let config = ProxyConfig {
        front_bind: args.front_bind,
        back_bind: args.back_bind,
        sources: args.sources,
        viewer_token: args.viewer_token,
        ping_interval: Duration::from_secs(args.ping_interval.max(1)),
        idle_timeout: Duration::from_secs(args.idle_timeout.max(1)),
    };

    let server = match ProxyServer::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Failed to start proxy: {}", e);
            std::process::exit(1);
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    if let Err(e) = server.run_until(shutdown).await {
        eprintln!("Proxy failed: {}", e);
        std::process::exit(1);
    }
}
