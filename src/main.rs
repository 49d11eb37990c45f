// MeshTail - main.rs
//
// Application entry point. Handles:
// 1. CLI argument parsing
// 2. config.toml loading (CLI flags override file values)
// 3. Mesh transport, live view and log recorder construction
// 4. Logging initialisation with the recorder as a second sink
// 5. Inbound, forwarder, announcer and HTTP tasks
// 6. Ctrl-C teardown

use clap::Parser;
use meshtail::app::forwarder::{run_forwarder, Forwarder};
use meshtail::app::node::{run_announcer, run_inbound, InboundHandler};
use meshtail::app::recorder::{LocalClock, LogRecorder};
use meshtail::app::view::{LiveView, ViewSettings};
use meshtail::core::model::{Label, NodeAddress, SourceIdentity};
use meshtail::core::wire::FrameStamper;
use meshtail::platform::config::{load_config, resolve_config_path, AppConfig};
use meshtail::platform::transport::{MeshControl, MeshTransport, UdpTransport};
use meshtail::util::error;
use meshtail::util::{constants, logging};
use meshtail::web;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// MeshTail - live log tailing for mesh nodes.
///
/// Keeps a bounded history of the selected node's log lines and serves
/// them to a browser over HTTP. Remote nodes stream their lines here on
/// request over a small UDP frame protocol.
#[derive(Parser, Debug)]
#[command(name = "meshtail", version, about)]
struct Cli {
    /// Path to config.toml (defaults to the platform config directory).
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// Local node address, 12 hex digits.
    #[arg(long = "address")]
    address: Option<NodeAddress>,

    /// Local node label.
    #[arg(long = "label")]
    label: Option<String>,

    /// HTTP listen address.
    #[arg(long = "http-bind")]
    http_bind: Option<SocketAddr>,

    /// Aggregator endpoint to announce this node to.
    #[arg(long = "aggregator")]
    aggregator: Option<SocketAddr>,

    /// Do not serve the HTTP viewer (peer-only node).
    #[arg(long = "no-http")]
    no_http: bool,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(address) = self.address {
            config.local_address = address;
        }
        if let Some(ref label) = self.label {
            config.local_label = Label::new(label);
        }
        if let Some(bind) = self.http_bind {
            config.http_bind = bind;
        }
        if let Some(aggregator) = self.aggregator {
            config.aggregator = Some(aggregator);
        }
        if self.no_http {
            config.http_enabled = false;
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> error::Result<()> {
    let config_path = resolve_config_path(cli.config.as_deref())?;
    let (mut config, warnings) = load_config(&config_path);
    cli.apply(&mut config);

    let transport = Arc::new(UdpTransport::bind(config.transport_bind).await?);
    for (node, endpoint) in &config.peers {
        transport.learn(*node, *endpoint);
    }

    let stamper = Arc::new(FrameStamper::new(config.local_address));
    let mesh: Arc<dyn MeshTransport> = transport.clone();
    let control = Arc::new(MeshControl::new(mesh.clone(), stamper.clone()));

    let local = SourceIdentity::new(config.local_address, config.local_label.clone());
    let settings = ViewSettings {
        ring_lines: config.ring_lines,
        max_snapshot_bytes: config.max_snapshot_bytes,
        max_nodes: config.max_nodes,
    };
    let view = Arc::new(LiveView::new(local, settings, control));

    let (forwarder, queue) = Forwarder::new(constants::FORWARD_QUEUE_DEPTH);
    let recorder = LogRecorder::new(view.clone(), Arc::new(LocalClock))
        .with_forwarder(forwarder.clone());

    logging::init(cli.debug, config.log_level.as_deref(), Some(recorder));

    tracing::info!(
        version = constants::APP_VERSION,
        node = %view.local(),
        config = %config_path.display(),
        "MeshTail starting"
    );
    for warning in &warnings {
        tracing::warn!("{}", warning);
    }
    if let Ok(addr) = transport.local_addr() {
        tracing::info!(%addr, peers = config.peers.len(), "Mesh transport bound");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    tasks.push(tokio::spawn(run_inbound(
        transport.clone(),
        InboundHandler::new(view.clone(), forwarder.clone()),
        shutdown_rx.clone(),
    )));
    tasks.push(tokio::spawn(run_forwarder(
        forwarder.clone(),
        queue,
        mesh.clone(),
        stamper.clone(),
        shutdown_rx.clone(),
    )));
    if let Some(aggregator) = config.aggregator {
        tasks.push(tokio::spawn(run_announcer(
            transport.clone(),
            stamper.clone(),
            config.local_label.clone(),
            aggregator,
            Duration::from_millis(config.announce_interval_ms),
            shutdown_rx.clone(),
        )));
    }

    if config.http_enabled {
        match tokio::net::TcpListener::bind(config.http_bind).await {
            Ok(listener) => {
                let app = web::router(web::WebState {
                    view: view.clone(),
                    poll_interval_ms: config.poll_interval_ms,
                });
                let mut rx = shutdown_rx.clone();
                tasks.push(tokio::spawn(async move {
                    let stop = async move {
                        let _ = rx.wait_for(|stop| *stop).await;
                    };
                    if let Err(e) = web::serve(listener, app, stop).await {
                        tracing::error!(error = %e, "HTTP server failed");
                    }
                }));
            }
            Err(e) => {
                tracing::error!(
                    bind = %config.http_bind,
                    error = %e,
                    "Could not bind HTTP viewer; continuing without it"
                );
            }
        }
    } else {
        tracing::info!("HTTP viewer disabled");
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C; shutting down");
    }

    tracing::info!(
        forwarded = forwarder.forwarded(),
        dropped = forwarder.dropped(),
        "Shutting down"
    );
    view.shutdown();
    let _ = shutdown_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}
