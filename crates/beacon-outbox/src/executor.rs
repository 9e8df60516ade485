//! Bridge intelligence to transport: queue actions from rules, goals,
//! and the matchmaker into the outbox, then drain it over whichever
//! transport resolves for each target.

use async_trait::async_trait;

use beacon_codec::{framing, Envelope};
use beacon_core::time::now_s;
use beacon_crypto::Identity;
use beacon_presence::PresenceManager;
use beacon_storage::StorageResult;
use beacon_transport::{udp, webhook};
use beacon_trust::{Direction, Outcome, TrustStore};

use crate::conversation::ConversationManager;
use crate::outbox::{OutboxItem, OutboxManager};

/// Recorded by the executor after a successful send, so the matchmaker
/// can rate-limit contact without the outbox depending on it directly.
#[async_trait]
pub trait ContactSink: Send + Sync {
    async fn record_contact(&self, agent_id: &str);
}

#[derive(Debug, Clone)]
pub struct UdpFallback {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub broadcast: bool,
}

impl Default for UdpFallback {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "255.255.255.255".to_string(),
            port: 38_400,
            broadcast: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DrainOutcome {
    pub action_id: String,
    pub status: &'static str,
    pub detail: String,
}

enum Transport {
    Webhook(String),
    Udp(String, u16),
}

pub struct Executor<'a> {
    outbox: &'a mut OutboxManager,
    identity: Option<&'a Identity>,
    udp_fallback: UdpFallback,
    trust: Option<&'a TrustStore>,
    presence: Option<&'a PresenceManager>,
    conversations: Option<&'a mut ConversationManager>,
    contact_sink: Option<&'a dyn ContactSink>,
}

impl<'a> Executor<'a> {
    pub fn new(outbox: &'a mut OutboxManager) -> Self {
        Self {
            outbox,
            identity: None,
            udp_fallback: UdpFallback::default(),
            trust: None,
            presence: None,
            conversations: None,
            contact_sink: None,
        }
    }

    pub fn with_identity(mut self, identity: &'a Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_udp_fallback(mut self, fallback: UdpFallback) -> Self {
        self.udp_fallback = fallback;
        self
    }

    pub fn with_trust(mut self, trust: &'a TrustStore) -> Self {
        self.trust = Some(trust);
        self
    }

    pub fn with_presence(mut self, presence: &'a PresenceManager) -> Self {
        self.presence = Some(presence);
        self
    }

    pub fn with_conversations(mut self, conversations: &'a mut ConversationManager) -> Self {
        self.conversations = Some(conversations);
        self
    }

    pub fn with_contact_sink(mut self, sink: &'a dyn ContactSink) -> Self {
        self.contact_sink = Some(sink);
        self
    }

    /// Best-effort `webhook:<card_url>` hint from the roster, for
    /// callers building an `OutboxItem` before `queue`.
    pub fn guess_transport_hint(&self, target_agent_id: &str) -> String {
        if target_agent_id.is_empty() {
            return String::new();
        }
        let Some(presence) = self.presence else { return String::new() };
        match presence.get_agent(target_agent_id) {
            Some(agent) if !agent.entry.card_url.is_empty() => format!("webhook:{}", agent.entry.card_url),
            _ => String::new(),
        }
    }

    /// Execute up to `max_actions` pending items. Returns a result per
    /// attempted action.
    pub async fn drain(&mut self, max_actions: usize) -> StorageResult<Vec<DrainOutcome>> {
        let items = self.outbox.pending(max_actions);
        let mut outcomes = Vec::with_capacity(items.len());

        for item in items {
            if let Some(reason) = self.preflight_block_reason(&item) {
                self.outbox.mark_failed(&item.action_id, &reason)?;
                outcomes.push(DrainOutcome { action_id: item.action_id.clone(), status: "skipped", detail: reason });
                continue;
            }

            let Some(transport) = self.resolve_transport(&item) else {
                self.outbox.mark_retry(&item.action_id)?;
                outcomes.push(DrainOutcome { action_id: item.action_id.clone(), status: "no_transport", detail: "no transport available".to_string() });
                continue;
            };

            let envelope = self.prepare_envelope(&item);
            let send_result = self.execute(transport, &envelope).await;

            match send_result {
                Ok(()) => {
                    self.outbox.mark_sent(&item.action_id)?;
                    self.on_success(&item).await?;
                    outcomes.push(DrainOutcome { action_id: item.action_id.clone(), status: "sent", detail: String::new() });
                }
                Err(e) => {
                    self.outbox.mark_retry(&item.action_id)?;
                    outcomes.push(DrainOutcome { action_id: item.action_id.clone(), status: "failed", detail: e.to_string() });
                }
            }
        }

        Ok(outcomes)
    }

    fn preflight_block_reason(&self, item: &OutboxItem) -> Option<String> {
        if item.target_agent_id.is_empty() {
            return None;
        }
        if self.trust.map(|t| t.is_blocked(&item.target_agent_id)).unwrap_or(false) {
            return Some("blocked".to_string());
        }
        None
    }

    /// Resolution order: explicit `transport_hint` -> roster `card_url`
    /// rewritten to an inbox URL -> UDP broadcast fallback.
    fn resolve_transport(&self, item: &OutboxItem) -> Option<Transport> {
        if let Some(rest) = item.transport_hint.strip_prefix("webhook:") {
            return Some(Transport::Webhook(rest.to_string()));
        }
        if let Some(rest) = item.transport_hint.strip_prefix("udp:") {
            return parse_udp_address(rest);
        }

        if !item.target_agent_id.is_empty() {
            if let Some(presence) = self.presence {
                if let Some(agent) = presence.get_agent(&item.target_agent_id) {
                    if !agent.entry.card_url.is_empty() {
                        return Some(Transport::Webhook(card_url_to_inbox_url(&agent.entry.card_url)));
                    }
                }
            }
        }

        if self.udp_fallback.enabled {
            return Some(Transport::Udp(self.udp_fallback.host.clone(), self.udp_fallback.port));
        }
        None
    }

    fn prepare_envelope(&self, item: &OutboxItem) -> Envelope {
        let mut envelope = item.envelope.clone();
        if let Some(identity) = self.identity {
            envelope.agent_id = Some(identity.agent_id().to_string());
        }
        envelope
    }

    async fn execute(&self, transport: Transport, envelope: &Envelope) -> Result<(), String> {
        match transport {
            Transport::Webhook(url) => webhook::send(&url, envelope).await.map(|_| ()).map_err(|e| e.to_string()),
            Transport::Udp(host, port) => {
                let text = if let Some(identity) = self.identity {
                    framing::encode(envelope.clone(), 2, Some(identity), true).map_err(|e| e.to_string())?
                } else {
                    serde_json::to_string(envelope).map_err(|e| e.to_string())?
                };
                udp::send(&host, port, text.as_bytes(), self.udp_fallback.broadcast, None)
                    .await
                    .map_err(|e| e.to_string())
            }
        }
    }

    async fn on_success(&mut self, item: &OutboxItem) -> StorageResult<()> {
        let kind = if item.envelope.kind.is_empty() { item.action_type.clone() } else { item.envelope.kind.clone() };

        if !item.target_agent_id.is_empty() {
            if let Some(trust) = self.trust {
                trust.record(item.target_agent_id.clone(), Direction::Out, kind.clone(), Outcome::Ok, None)?;
            }
            if let Some(sink) = self.contact_sink {
                sink.record_contact(&item.target_agent_id).await;
            }
        }

        if !item.conversation_id.is_empty() {
            if let Some(conversations) = &mut self.conversations {
                conversations.record_message(&item.conversation_id, "out", &kind)?;
            }
        }
        Ok(())
    }
}

fn parse_udp_address(address: &str) -> Option<Transport> {
    let mut parts = address.splitn(2, ':');
    let host = parts.next()?.to_string();
    let port = parts.next().and_then(|p| p.parse().ok()).unwrap_or(38_400);
    Some(Transport::Udp(host, port))
}

/// `.../.well-known/beacon.json` -> `.../beacon/inbox`; anything else is
/// assumed to already be a direct inbox URL.
fn card_url_to_inbox_url(card_url: &str) -> String {
    if let Some(base) = card_url.strip_suffix("/.well-known/beacon.json") {
        return format!("{base}/beacon/inbox");
    }
    if let Some(base) = card_url.strip_suffix("/beacon.json") {
        return format!("{base}/beacon/inbox");
    }
    card_url.to_string()
}

pub fn now() -> i64 {
    now_s()
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_storage::Store;

    #[test]
    fn card_url_rewrites_well_known_suffix() {
        assert_eq!(card_url_to_inbox_url("https://peer.example/.well-known/beacon.json"), "https://peer.example/beacon/inbox");
        assert_eq!(card_url_to_inbox_url("https://peer.example/beacon.json"), "https://peer.example/beacon/inbox");
        assert_eq!(card_url_to_inbox_url("https://peer.example/custom"), "https://peer.example/custom");
    }

    #[test]
    fn parse_udp_address_defaults_port() {
        let Some(Transport::Udp(host, port)) = parse_udp_address("10.0.0.1") else { panic!("expected udp") };
        assert_eq!(host, "10.0.0.1");
        assert_eq!(port, 38_400);
    }

    #[tokio::test]
    async fn drain_skips_blocked_targets() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let mut outbox = OutboxManager::open(store.clone()).unwrap();
        let trust = TrustStore::open(store).unwrap();
        trust.block("bcn_bad", "scam").unwrap();

        outbox.queue("emit", "bcn_bad", Envelope::new("hello", "n1"), "", "", "").unwrap();

        let mut executor = Executor::new(&mut outbox).with_trust(&trust);
        let outcomes = executor.drain(10).await.unwrap();
        assert_eq!(outcomes[0].status, "skipped");
    }

    #[tokio::test]
    async fn drain_reports_no_transport_when_nothing_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let mut outbox = OutboxManager::open(store).unwrap();
        outbox.queue("emit", "bcn_unknown", Envelope::new("hello", "n2"), "", "", "").unwrap();

        let mut executor = Executor::new(&mut outbox);
        let outcomes = executor.drain(10).await.unwrap();
        assert_eq!(outcomes[0].status, "no_transport");
    }
}
