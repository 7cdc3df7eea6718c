use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use nanotunnel::adapters::{ConnectionTracker, TcpDialer, TunnelServer, UpstreamProxyDialer};
use nanotunnel::config::AppConfig;
use nanotunnel::domain::Interceptor;
use nanotunnel::ports::{DialerPort, TrackingPort};

#[derive(Parser, Debug)]
#[clap(version = env!("NANOTUNNEL_VERSION"), author = env!("CARGO_PKG_AUTHORS"))]
pub struct Opts {
    /// Upstream proxy server, as http://[user:password@]host[:port]
    #[clap(long, short = 'u')]
    upstream: Option<String>,

    /// listen on this network adress
    #[clap(long, short = 'b')]
    bind: Option<String>,

    /// Configuration file (defaults to the per-user nanotunnel config)
    #[clap(long, short = 'c')]
    config: Option<PathBuf>,

    /// Timeout for outbound connection attempts
    #[clap(long)]
    connect_timeout_ms: Option<u64>,

    /// Close tunnels that have been open for this long
    #[clap(long)]
    max_lifetime_secs: Option<u64>,
}

impl Opts {
    fn apply(self, mut config: AppConfig) -> AppConfig {
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if self.upstream.is_some() {
            config.upstream = self.upstream;
        }
        if let Some(timeout) = self.connect_timeout_ms {
            config.connect_timeout_ms = timeout;
        }
        if self.max_lifetime_secs.is_some() {
            config.max_lifetime_secs = self.max_lifetime_secs;
        }
        config
    }
}

fn build_dialer(config: &AppConfig) -> Result<Arc<dyn DialerPort>, Box<dyn std::error::Error>> {
    match &config.upstream {
        Some(upstream) => {
            let url = Url::parse(upstream)?;
            let dialer = UpstreamProxyDialer::from_url(&url)?.with_connect_timeout(config.connect_timeout());
            info!("Tunneling through upstream proxy {}", dialer.proxy_addr());
            Ok(Arc::new(dialer))
        }
        None => Ok(Arc::new(TcpDialer::new().with_connect_timeout(config.connect_timeout()))),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nanotunnel=info")))
        .init();

    let opts = Opts::parse();
    let config_path = opts.config.clone();
    let config = opts.apply(AppConfig::load(config_path.as_deref())?);

    match rlimit::increase_nofile_limit(u64::MAX) {
        Ok(limit) => info!("Open file limit set to {}", limit),
        Err(e) => warn!("Unable to raise open file limit: {}", e),
    }

    let tracker = Arc::new(ConnectionTracker::new());
    tracker.start_cleanup();
    let tracker_port: Arc<dyn TrackingPort> = tracker.clone();

    let shutdown = CancellationToken::new();
    let interceptor = Interceptor::new(build_dialer(&config)?, tracker_port)
        .with_config(config.tunnel_config())
        .with_shutdown(shutdown.clone());
    let server = Arc::new(TunnelServer::new(interceptor).with_max_head_bytes(config.max_head_bytes));

    let listener = TcpListener::bind(&config.bind).await?;
    info!("nanotunnel {} starting", env!("NANOTUNNEL_VERSION"));

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, closing tunnels");
        }
        signal.cancel();
    });

    server.serve(listener, shutdown).await?;
    Ok(())
}
