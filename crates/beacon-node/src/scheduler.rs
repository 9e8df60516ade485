//! Periodic work: pulse/heartbeat emission, roster pruning, outbox
//! draining, market snapshots, and silence checks. Each job is a plain
//! async fn over `&SharedState` so it can be unit tested without a
//! runtime loop around it; `spawn_all` wraps each in its own
//! `tokio::time::interval` task so one job's failure or slow tick never
//! blocks another's.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use beacon_codec::framing;
use beacon_outbox::{Executor, UdpFallback};
use beacon_presence::PulsePresence;
use beacon_transport::udp;

use crate::state::SharedState;

/// Build and broadcast a `pulse` envelope over UDP, if UDP is enabled.
pub async fn emit_pulse(state: &SharedState) {
    let presence_cfg = PulsePresence {
        status: state.config.presence.status.clone(),
        offers: state.config.presence.offers.clone(),
        needs: state.config.presence.needs.clone(),
        card_url: state.config.presence.card_url.clone(),
        topics: state.config.preferences.topics.clone(),
    };

    let envelope = {
        let presence = state.presence.read().await;
        let curiosity = state.curiosity.read().await;
        let values = state.values.read().await;
        let goals = state.goals.read().await;
        presence.build_pulse(
            &state.identity,
            &state.config.beacon.agent_name,
            state.started_at,
            &presence_cfg,
            Some(&curiosity),
            Some(&values),
            Some(&goals),
        )
    };

    broadcast(state, envelope, "pulse").await;
}

/// Build and broadcast a `heartbeat` envelope over UDP.
pub async fn emit_heartbeat(state: &SharedState) {
    let envelope = {
        let heartbeat = state.heartbeat.read().await;
        heartbeat.beat(
            &state.identity,
            &state.config.beacon.agent_name,
            state.started_at,
            beacon_presence::HealthStatus::Alive,
            None,
        )
    };

    match envelope {
        Ok(envelope) => broadcast(state, envelope, "heartbeat").await,
        Err(e) => tracing::warn!(error = %e, "failed to record outbound heartbeat"),
    }
}

async fn broadcast(state: &SharedState, envelope: beacon_codec::Envelope, kind: &str) {
    if !state.config.udp.enabled {
        return;
    }
    let frame = match framing::encode(envelope, 2, Some(&state.identity), true) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, kind, "failed to encode outbound envelope");
            return;
        }
    };
    let target_host = if state.config.udp.broadcast { "255.255.255.255" } else { &state.config.udp.host };
    if let Err(e) = udp::send(target_host, state.config.udp.port, frame.as_bytes(), state.config.udp.broadcast, None).await {
        tracing::warn!(error = %e, kind, "failed to send outbound envelope over udp");
    }
}

/// Drop roster entries that have gone quiet past their pulse TTL.
pub async fn prune_roster(state: &SharedState) {
    let mut presence = state.presence.write().await;
    match presence.prune_stale(state.config.presence.pulse_ttl_s) {
        Ok(n) if n > 0 => tracing::debug!(pruned = n, "pruned stale roster entries"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "roster prune failed"),
    }
}

/// Attempt to deliver everything queued in the outbox.
pub async fn drain_outbox(state: &SharedState) {
    let mut outbox = state.outbox.write().await;
    let trust = state.trust.read().await;
    let presence = state.presence.read().await;
    let mut conversations = state.conversations.write().await;

    let fallback = UdpFallback {
        enabled: state.config.udp.enabled,
        host: state.config.udp.host.clone(),
        port: state.config.udp.port,
        broadcast: state.config.udp.broadcast,
    };

    let mut executor = Executor::new(&mut outbox)
        .with_identity(&state.identity)
        .with_udp_fallback(fallback)
        .with_trust(&trust)
        .with_presence(&presence)
        .with_conversations(&mut conversations)
        .with_contact_sink(state.matchmaker.as_ref());

    match executor.drain(50).await {
        Ok(outcomes) => {
            let failed = outcomes.iter().filter(|o| o.status != "sent" && o.status != "skipped").count();
            if failed > 0 {
                tracing::debug!(failed, total = outcomes.len(), "outbox drain completed with failures");
            }
        }
        Err(e) => tracing::warn!(error = %e, "outbox drain failed"),
    }
}

/// Record a market snapshot of the atlas's current valuations.
pub async fn snapshot_market(state: &SharedState) {
    let atlas = state.atlas.read().await;
    if let Err(e) = atlas.snapshot_market() {
        tracing::warn!(error = %e, "market snapshot failed");
    }
}

/// Flag peers who have gone silent past the configured threshold.
pub async fn check_silence(state: &SharedState) {
    let heartbeat = state.heartbeat.read().await;
    match heartbeat.check_silence(Some(state.config.heartbeat.silence_threshold_s)) {
        Ok(peers) if !peers.is_empty() => {
            tracing::info!(count = peers.len(), "peers have gone silent");
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "silence check failed"),
    }
}

/// Spawn every periodic job as its own cancellable task, each on the
/// interval its config section names. Returns the handles so the caller
/// can abort them together on shutdown (each is independent - one job
/// running long or erroring never delays another).
pub fn spawn_all(state: Arc<SharedState>) -> Vec<JoinHandle<()>> {
    let pulse_period = Duration::from_secs(state.config.presence.pulse_interval_s.max(1) as u64);
    let heartbeat_period = Duration::from_secs(state.config.scheduler.heartbeat_interval_s.max(1));
    let roster_period = Duration::from_secs(state.config.scheduler.roster_prune_interval_s.max(1));
    let outbox_period = Duration::from_secs(state.config.scheduler.outbox_drain_interval_s.max(1));
    let market_period = Duration::from_secs(state.config.scheduler.market_snapshot_interval_s.max(1));
    let silence_period = Duration::from_secs(state.config.scheduler.silence_check_interval_s.max(1));

    vec![
        periodic_task("pulse", state.clone(), pulse_period, |s| Box::pin(emit_pulse(s))),
        periodic_task("heartbeat", state.clone(), heartbeat_period, |s| Box::pin(emit_heartbeat(s))),
        periodic_task("roster_prune", state.clone(), roster_period, |s| Box::pin(prune_roster(s))),
        periodic_task("outbox_drain", state.clone(), outbox_period, |s| Box::pin(drain_outbox(s))),
        periodic_task("market_snapshot", state.clone(), market_period, |s| Box::pin(snapshot_market(s))),
        periodic_task("silence_check", state, silence_period, |s| Box::pin(check_silence(s))),
    ]
}

type BoxFuture<'a> = std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BeaconConfig;
    use crate::state::load_or_create_identity;

    async fn test_state() -> (tempfile::TempDir, Arc<SharedState>) {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = BeaconConfig::default();
        cfg.data_dir = dir.path().to_path_buf();
        cfg.udp.enabled = false;
        let identity = load_or_create_identity(&cfg.data_dir, None).unwrap();
        let state = SharedState::open(cfg, identity).unwrap();
        (dir, state)
    }

    #[tokio::test]
    async fn emit_pulse_is_a_noop_with_udp_disabled() {
        let (_dir, state) = test_state().await;
        emit_pulse(&state).await;
    }

    #[tokio::test]
    async fn emit_heartbeat_is_a_noop_with_udp_disabled() {
        let (_dir, state) = test_state().await;
        emit_heartbeat(&state).await;
    }

    #[tokio::test]
    async fn prune_roster_runs_cleanly_on_an_empty_roster() {
        let (_dir, state) = test_state().await;
        prune_roster(&state).await;
    }

    #[tokio::test]
    async fn drain_outbox_runs_cleanly_on_an_empty_queue() {
        let (_dir, state) = test_state().await;
        drain_outbox(&state).await;
    }

    #[tokio::test]
    async fn snapshot_market_runs_cleanly() {
        let (_dir, state) = test_state().await;
        snapshot_market(&state).await;
    }

    #[tokio::test]
    async fn check_silence_runs_cleanly_with_no_peers() {
        let (_dir, state) = test_state().await;
        check_silence(&state).await;
    }
}

fn periodic_task(
    name: &'static str,
    state: Arc<SharedState>,
    period: Duration,
    job: for<'a> fn(&'a SharedState) -> BoxFuture<'a>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            tracing::trace!(job = name, "running periodic job");
            job(&state).await;
        }
    })
}
