use std::net::{Ipv4Addr, SocketAddrV4};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use rangekv::core::Blake3KeyHasher;
use rangekv::store::MemoryStore;
use rangekv::{Node, NodeConfig};

/// Run one rangekv node until interrupted, then leave the ring.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// IPv4 address of the tracker.
    tracker_address: Ipv4Addr,

    /// UDP port of the tracker.
    tracker_port: u16,
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("node exited with error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let tracker = SocketAddrV4::new(cli.tracker_address, cli.tracker_port);
    let shutdown = CancellationToken::new();

    let node = Node::bind(
        NodeConfig::new(tracker),
        MemoryStore::new(),
        Blake3KeyHasher,
        shutdown.clone(),
    )
    .await
    .context("failed to open sockets")?;
    info!(%tracker, udp_port = node.udp_port(), "node started");

    tokio::spawn(watch_signals(shutdown));
    node.run().await?;
    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
async fn watch_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("cannot listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(err) = res {
                warn!("cannot listen for ctrl-c: {err}");
                return;
            }
        }
        _ = terminate => {}
    }
    info!("interrupted, leaving the ring");
    shutdown.cancel();
}
