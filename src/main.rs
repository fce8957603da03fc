//! bleconfd: provisioning daemon entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Adapters                             │
//! │  TcpRpcListener / SimGattListener        SimWifi             │
//! │  (Listener → ConnectedClient)            (ConnectivityPort)  │
//! │                                                              │
//! │  ───────────────── ConnectionManager ────────────────────    │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                RpcServer (dispatch)                    │  │
//! │  │  registry · inbound queue · outbound · notifiers       │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │         device-info service            wifi service          │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info, warn};
use signal_hook::consts::signal::{SIGINT, SIGTERM};

use bleconfd::adapters::gatt::{SimCentral, SimGattListener};
use bleconfd::adapters::tcp_listener::TcpRpcListener;
use bleconfd::config::{DEFAULT_CONFIG_PATH, DaemonConfig, TransportKind};
use bleconfd::connection::ConnectionManager;
use bleconfd::rpc::server::RpcServer;
use bleconfd::rpc::service::RpcService;
use bleconfd::rpc::transport::Listener;
use bleconfd::services::builtin_services;

#[derive(Debug, Parser)]
#[command(name = "bleconfd", version, about = "JSON-RPC device provisioning over Bluetooth")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Validate the configuration, print it and exit
    #[arg(long)]
    check_config: bool,
}

fn init_logging(debug: bool) {
    let level = if debug { LevelFilter::Debug } else { LevelFilter::Info };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
}

/// Bridge stdin/stdout to a simulated GATT central: one JSON document
/// per input line, every notified document printed on its own line.
fn spawn_stdin_central(central: SimCentral, shutdown: Arc<AtomicBool>) -> io::Result<()> {
    thread::Builder::new().name("sim-central".into()).spawn(move || {
        let mut link = match central.connect() {
            Ok(link) => link,
            Err(e) => {
                warn!("Conn: simulated central failed to connect: {}", e);
                return;
            }
        };
        if !link.wait_attached(Duration::from_secs(5)) {
            warn!("Conn: simulated central was never accepted");
        }
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if shutdown.load(Ordering::Acquire) {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            if let Err(e) = link.write(line.as_bytes()) {
                warn!("Conn: simulated write failed: {}", e);
                continue;
            }
            let mut out = io::stdout().lock();
            while let Some(doc) = link.recv_timeout(Duration::from_millis(500)) {
                let _ = out.write_all(&doc);
                let _ = out.write_all(b"\n");
                let _ = out.flush();
            }
        }
        link.disconnect();
    })?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config = DaemonConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    if cli.check_config {
        let rendered = toml::to_string_pretty(&config).context("rendering config")?;
        println!("{rendered}");
        return Ok(());
    }

    info!("bleconfd v{} starting", env!("CARGO_PKG_VERSION"));
    let config = Arc::new(config);

    let mut server = RpcServer::new(Arc::clone(&config));
    for service in builtin_services(&config) {
        let name = service.name().to_owned();
        server
            .register_service(service)
            .with_context(|| format!("registering service `{name}`"))?;
    }
    info!(
        "RPC: {} methods from services {:?}",
        server.registry().len(),
        server.service_names()
    );
    let server = Arc::new(server);

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .with_context(|| format!("installing handler for signal {signal}"))?;
    }

    let listener: Box<dyn Listener> = match config.transport.kind {
        TransportKind::Tcp => Box::new(TcpRpcListener::from_config(&config)),
        TransportKind::GattSim => {
            let (listener, central) = SimGattListener::from_config(&config);
            spawn_stdin_central(central, Arc::clone(&shutdown)).context("starting simulated central")?;
            Box::new(listener)
        }
    };

    let mut manager = ConnectionManager::new(listener, Arc::clone(&server), shutdown);
    manager.run().context("connection manager")?;

    let stats = server.stats();
    info!(
        "bleconfd stopped: {} dispatched, {} sent, {} dropped, {} handler faults",
        stats.dispatched, stats.sent, stats.dropped, stats.handler_faults
    );
    Ok(())
}
