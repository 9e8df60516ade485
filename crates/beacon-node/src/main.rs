//! Beacon node
//!
//! The daemon binary that wires every protocol component into a single
//! running agent: a UDP listener and broadcaster, a webhook HTTP
//! surface, a periodic scheduler (pulses, heartbeats, roster upkeep,
//! outbox draining, market snapshots, silence checks), and the
//! inbox -> rules -> executor pipeline every inbound envelope passes
//! through on its way in.
//!
//! ```bash
//! beacon-node --data-dir ~/.beacon --agent-name my-agent
//! BEACON__UDP__PORT=9000 beacon-node --config beacon.toml
//! ```

mod config;
mod inbound;
mod scheduler;
mod state;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use beacon_codec::AgentCard;
use beacon_transport::WebhookServer;

use crate::config::{Args, BeaconConfig};
use crate::inbound::WebhookSink;
use crate::state::{load_or_create_identity, SharedState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let args = Args::parse();
    let cfg = BeaconConfig::load(&args)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %cfg.data_dir.display(),
        "starting beacon node"
    );

    std::fs::create_dir_all(&cfg.data_dir)?;
    let identity = load_or_create_identity(&cfg.data_dir, args.keystore_password.as_deref())?;
    tracing::info!(agent_id = %identity.agent_id(), "identity loaded");

    let state = SharedState::open(cfg, identity)?;

    let mut tasks = scheduler::spawn_all(state.clone());

    if state.config.webhook.enabled {
        tasks.push(spawn_webhook(state.clone()));
    }

    let (udp_tx, udp_rx) = tokio::sync::mpsc::unbounded_channel();
    if state.config.udp.enabled {
        tasks.push(spawn_udp_listener(state.clone(), udp_tx));
        tasks.push(tokio::spawn(inbound::run_udp_consumer(state.clone(), udp_rx)));
    } else {
        drop(udp_rx);
    }

    shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping tasks");
    for task in tasks {
        task.abort();
    }

    Ok(())
}

fn spawn_webhook(state: Arc<SharedState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut card = AgentCard::new("2", &state.identity);
        card.name = Some(state.config.beacon.agent_name.clone());
        if let Err(e) = card.sign(&state.identity) {
            tracing::warn!(error = %e, "failed to sign agent card");
        }

        let sink = Arc::new(WebhookSink { state: state.clone() });
        let server = WebhookServer::new(Some(state.identity.agent_id().to_string()), Some(card), sink);

        let addr: SocketAddr = match format!("{}:{}", state.config.webhook.host, state.config.webhook.port).parse() {
            Ok(addr) => addr,
            Err(e) => {
                tracing::error!(error = %e, "invalid webhook bind address");
                return;
            }
        };

        tracing::info!(%addr, "webhook server listening");
        if let Err(e) = server.serve(addr).await {
            tracing::error!(error = %e, "webhook server exited");
        }
    })
}

fn spawn_udp_listener(state: Arc<SharedState>, tx: tokio::sync::mpsc::UnboundedSender<inbound::RawInbound>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let host = state.config.udp.host.clone();
        let port = state.config.udp.port;
        tracing::info!(host, port, "udp listener starting");

        let mut known_keys: HashMap<String, String> = {
            let inbox = state.inbox.read().await;
            inbox.known_keys()
        };

        let result = beacon_transport::udp::listen(&host, port, &mut known_keys, None, |msg| {
            let _ = tx.send(inbound::RawInbound {
                platform: "udp".to_string(),
                from: msg.addr.to_string(),
                text: msg.text,
            });
        })
        .await;

        if let Err(e) = result {
            tracing::error!(error = %e, "udp listener exited");
        }
    })
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c"),
        _ = terminate => tracing::info!("received sigterm"),
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
}
