//! Event handler: the single pipeline every inbound envelope passes
//! through, regardless of which transport delivered it. Ingest records
//! the envelope and learns the sender's key; the rules engine then
//! decides what, if anything, happens next, and its actions are carried
//! out against trust, the task state machine, and the outbox.

use std::sync::Arc;

use async_trait::async_trait;

use beacon_codec::Envelope;
use beacon_rules::{ActionResult, EventContext};
use beacon_transport::{IngestResult, InboundSink};
use beacon_trust::{Direction, Outcome};

use crate::state::SharedState;

/// A transport handed us raw bytes; this is everything the pipeline
/// needs to replay ingest + rules against them later, off the
/// transport's own task.
#[derive(Debug, Clone)]
pub struct RawInbound {
    pub platform: String,
    pub from: String,
    pub text: String,
}

/// Ingest `envelopes` into the inbox, then run each one through the
/// rules engine and act on whatever actions fire. Shared by the webhook
/// handler (which needs `IngestResult`s back for its HTTP response) and
/// the UDP consumer task (which discards them).
pub async fn process_inbound(
    state: &SharedState,
    platform: &str,
    from: &str,
    text: &str,
    envelopes: Vec<Envelope>,
) -> Vec<IngestResult> {
    let results = {
        let inbox = state.inbox.write().await;
        match inbox.ingest_envelopes(platform, from, text, envelopes.clone()) {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(error = %e, platform, from, "failed to persist inbound envelope");
                return Vec::new();
            }
        }
    };

    for envelope in envelopes {
        if let Err(e) = run_rules(state, platform, &envelope).await {
            tracing::warn!(error = %e, kind = %envelope.kind, "rules evaluation failed");
        }
    }

    results
}

async fn run_rules(state: &SharedState, platform: &str, envelope: &Envelope) -> anyhow::Result<()> {
    let from = envelope.agent_id.clone().unwrap_or_default();
    let verified = {
        let inbox = state.inbox.read().await;
        inbox.get_by_nonce(&envelope.nonce)?.and_then(|e| e.verified)
    };
    let score = if from.is_empty() {
        0.0
    } else {
        state.trust.read().await.score(&from)?.score
    };
    let task_state = {
        let tasks = state.tasks.read().await;
        envelope
            .field_str("task_id")
            .and_then(|id| tasks.get(id).ok().flatten())
            .map(|t| format!("{:?}", t.state).to_lowercase())
    };

    let ctx = EventContext {
        from: Some(from.clone()),
        verified,
        platform: Some(platform.to_string()),
        score,
        task_state,
        their_values: None,
    };

    let actions = {
        let mut rules = state.rules.write().await;
        let values = state.values.read().await;
        let goals = state.goals.read().await;
        let trust = state.trust.read().await;
        rules.process(envelope, &ctx, &trust, &values, &goals)?
    };

    for action in actions {
        apply_action(state, &from, action).await?;
    }
    Ok(())
}

async fn apply_action(state: &SharedState, from: &str, action: ActionResult) -> anyhow::Result<()> {
    match action {
        ActionResult::Log { message } => {
            tracing::info!(agent_id = from, %message, "rule fired");
        }
        ActionResult::Reply { to, kind, text, task_id } => {
            let mut env = Envelope::new(kind, beacon_core::ids::random_hex(8)).with_field("text", text);
            if let Some(task_id) = task_id {
                env = env.with_field("task_id", task_id);
            }
            env.agent_id = Some(state.identity.agent_id().to_string());

            let hint = state
                .presence
                .read()
                .await
                .get_agent(&to)
                .filter(|agent| !agent.entry.card_url.is_empty())
                .map(|agent| format!("webhook:{}", agent.entry.card_url))
                .unwrap_or_default();

            let mut outbox = state.outbox.write().await;
            outbox.queue("reply", to, env, hint, "rules", "")?;
        }
        ActionResult::Block { agent_id, reason } => {
            state.trust.write().await.block(agent_id, reason)?;
        }
        ActionResult::Rate { agent_id, outcome } => {
            let outcome = match outcome.as_str() {
                "delivered" => Outcome::Delivered,
                "paid" => Outcome::Paid,
                "spam" => Outcome::Spam,
                "scam" => Outcome::Scam,
                "timeout" => Outcome::Timeout,
                "rejected" => Outcome::Rejected,
                _ => Outcome::Ok,
            };
            state.trust.write().await.record(agent_id, Direction::In, "rule", outcome, None)?;
        }
        ActionResult::MarkRead { nonce } => {
            state.inbox.read().await.mark_read(&nonce)?;
        }
        ActionResult::Emit { data } => {
            tracing::debug!(?data, "rule emitted a raw event");
        }
    }
    Ok(())
}

/// Adapts [`SharedState`] to the webhook server's capability interface:
/// persist + evaluate synchronously so the HTTP caller gets a real
/// per-envelope verification result back.
pub struct WebhookSink {
    pub state: Arc<SharedState>,
}

#[async_trait]
impl InboundSink for WebhookSink {
    async fn ingest(&self, platform: &str, from: &str, text: &str, envelopes: Vec<Envelope>) -> Vec<IngestResult> {
        process_inbound(&self.state, platform, from, text, envelopes).await
    }
}

/// Drains the channel the UDP listener feeds raw datagrams into,
/// decoding and running each one through the same pipeline the webhook
/// uses. Runs until the sender side (the listener task) is dropped.
pub async fn run_udp_consumer(state: Arc<SharedState>, mut rx: tokio::sync::mpsc::UnboundedReceiver<RawInbound>) {
    while let Some(msg) = rx.recv().await {
        let envelopes = beacon_codec::decode_envelopes(&msg.text);
        if envelopes.is_empty() {
            continue;
        }
        process_inbound(&state, &msg.platform, &msg.from, &msg.text, envelopes).await;
    }
}
