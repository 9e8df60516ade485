//! Accords: signed bilateral agreements that establish mutual
//! obligations, pushback rights, and behavioral boundaries between two
//! agents. Pushback is the anti-sycophancy primitive — either party can
//! challenge the other's output without penalty, and every state change
//! extends a running history hash so the relationship has a provable,
//! continuous audit trail.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use beacon_codec::Envelope;
use beacon_core::ids::AccordId;
use beacon_core::time::now_s;
use beacon_crypto::Identity;
use beacon_storage::{Store, StorageResult};

const ACCORDS_FILE: &str = "accords.json";
const ACCORD_LOG: &str = "accord_log.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccordState {
    Proposed,
    Active,
    Challenged,
    Dissolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Proposer,
    Accepter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccordEvent {
    ReceivedProposal { ts: i64, from: String },
    Accepted { ts: i64, by: String },
    Pushback { ts: i64, by: String, severity: String, challenge: String },
    PushbackReceived { ts: i64, from: String, severity: String, challenge: String },
    Acknowledgment { ts: i64, by: String, accepted: bool, response: String },
    AcknowledgmentReceived { ts: i64, from: String, accepted: bool },
    Dissolved { ts: i64, by: String, reason: String },
    DissolvedByPeer { ts: i64, from: String, reason: String },
    HistoryUpdated { ts: i64, data_preview: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Accord {
    pub id: String,
    pub state: AccordState,
    pub name: String,
    pub our_role: Role,
    pub peer_agent_id: String,
    pub our_boundaries: Vec<String>,
    pub our_obligations: Vec<String>,
    pub peer_boundaries: Vec<String>,
    pub peer_obligations: Vec<String>,
    pub pushback_clause: String,
    pub proposed_at: i64,
    #[serde(default)]
    pub accepted_at: Option<i64>,
    #[serde(default)]
    pub dissolved_at: Option<i64>,
    #[serde(default)]
    pub dissolved_by: Option<String>,
    #[serde(default)]
    pub dissolution_reason: Option<String>,
    pub history_hash: String,
    #[serde(default)]
    pub events: Vec<AccordEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushbackRecommendation {
    pub accord_id: String,
    pub domain: &'static str,
    pub matched_phrase: &'static str,
    pub severity: &'static str,
    pub pushback_clause: String,
}

const PUSHBACK_DOMAINS: &[(&str, &[&str])] = &[
    (
        "self_harm",
        &["kill myself", "suicide", "self-harm", "end it all", "hurt myself", "not worth living"],
    ),
    (
        "delusion_reinforcement",
        &["i am god", "i can fly", "nobody can stop me", "the government is after me", "they're all against me"],
    ),
    (
        "sycophantic_agreement",
        &["you agree right", "tell me i'm right", "just say yes", "don't argue"],
    ),
    (
        "factual_error",
        &["the earth is flat", "vaccines cause autism", "climate change is fake"],
    ),
];

fn default_pushback_clause() -> String {
    "Either party may challenge the other's output, reasoning, or behavior without penalty. \
     Challenges must be specific and substantive. The challenged party must acknowledge and \
     respond to the challenge, not dismiss or deflect."
        .to_string()
}

fn genesis_hash(accord_id: &str) -> String {
    beacon_core::canonical::sha256_hex(format!("genesis:{accord_id}").as_bytes())
}

fn chain_hash(prev_hash: &str, event_summary: &str, ts: i64) -> String {
    beacon_core::canonical::sha256_hex(format!("{prev_hash}:{event_summary}:{ts}").as_bytes())
}

pub struct AccordManager {
    store: Store,
    accords: HashMap<String, Accord>,
}

impl AccordManager {
    pub fn open(store: Store) -> StorageResult<Self> {
        let accords = store.load_snapshot_or_default(ACCORDS_FILE)?;
        Ok(Self { store, accords })
    }

    fn save(&self) -> StorageResult<()> {
        self.store.snapshot(ACCORDS_FILE, &self.accords)
    }

    fn log(&self, entry: impl Serialize) -> StorageResult<()> {
        self.store.append(ACCORD_LOG, &entry)
    }

    /// Build a proposal envelope and store the accord locally as `proposed`.
    pub fn propose(
        &mut self,
        identity: &Identity,
        peer_agent_id: &str,
        boundaries: Vec<String>,
        obligations: Vec<String>,
        pushback_clause: Option<String>,
        name: Option<String>,
    ) -> StorageResult<Envelope> {
        let accord_id = AccordId::new().to_string();
        let now = now_s();
        let pushback_clause = pushback_clause.unwrap_or_else(default_pushback_clause);
        let name = name.unwrap_or_else(|| {
            format!("Accord between {} and {}", &identity.agent_id().as_str()[..12.min(identity.agent_id().as_str().len())], peer_agent_id)
        });

        self.accords.insert(
            accord_id.clone(),
            Accord {
                id: accord_id.clone(),
                state: AccordState::Proposed,
                name: name.clone(),
                our_role: Role::Proposer,
                peer_agent_id: peer_agent_id.to_string(),
                our_boundaries: boundaries.clone(),
                our_obligations: obligations.clone(),
                peer_boundaries: Vec::new(),
                peer_obligations: Vec::new(),
                pushback_clause: pushback_clause.clone(),
                proposed_at: now,
                accepted_at: None,
                dissolved_at: None,
                dissolved_by: None,
                dissolution_reason: None,
                history_hash: genesis_hash(&accord_id),
                events: Vec::new(),
            },
        );
        self.save()?;
        self.log(serde_json::json!({"ts": now, "action": "propose", "accord_id": accord_id, "peer": peer_agent_id}))?;

        let envelope = Envelope::new("accord", beacon_core::ids::random_hex(8))
            .with_field("action", "propose")
            .with_field("accord_id", accord_id)
            .with_field("peer_agent_id", peer_agent_id)
            .with_field("name", name)
            .with_field("proposer_boundaries", boundaries)
            .with_field("proposer_obligations", obligations)
            .with_field("pushback_clause", pushback_clause)
            .with_field("proposed_at", now);
        let mut envelope = envelope;
        envelope.agent_id = Some(identity.agent_id().to_string());
        Ok(envelope)
    }

    /// Build an acceptance (counter-sign) for a proposal we received.
    pub fn accept(
        &mut self,
        identity: &Identity,
        proposal: &Envelope,
        boundaries: Vec<String>,
        obligations: Vec<String>,
    ) -> StorageResult<Option<Envelope>> {
        let Some(accord_id) = proposal.field_str("accord_id").map(str::to_string) else {
            return Ok(None);
        };
        let now = now_s();

        self.accords.insert(
            accord_id.clone(),
            Accord {
                id: accord_id.clone(),
                state: AccordState::Active,
                name: proposal.field_str("name").unwrap_or(&accord_id).to_string(),
                our_role: Role::Accepter,
                peer_agent_id: proposal.agent_id.clone().unwrap_or_default(),
                our_boundaries: boundaries.clone(),
                our_obligations: obligations.clone(),
                peer_boundaries: field_str_list(proposal, "proposer_boundaries"),
                peer_obligations: field_str_list(proposal, "proposer_obligations"),
                pushback_clause: proposal.field_str("pushback_clause").unwrap_or_default().to_string(),
                proposed_at: proposal.field("proposed_at").and_then(serde_json::Value::as_i64).unwrap_or(now),
                accepted_at: Some(now),
                dissolved_at: None,
                dissolved_by: None,
                dissolution_reason: None,
                history_hash: chain_hash(&genesis_hash(&accord_id), &format!("accepted_by:{}", identity.agent_id()), now),
                events: vec![AccordEvent::Accepted { ts: now, by: identity.agent_id().to_string() }],
            },
        );
        self.save()?;
        self.log(serde_json::json!({"ts": now, "action": "accept", "accord_id": accord_id, "peer": proposal.agent_id}))?;

        let mut envelope = Envelope::new("accord", beacon_core::ids::random_hex(8))
            .with_field("action", "accept")
            .with_field("accord_id", accord_id)
            .with_field("peer_agent_id", proposal.agent_id.clone().unwrap_or_default())
            .with_field("accepter_boundaries", boundaries)
            .with_field("accepter_obligations", obligations);
        envelope.agent_id = Some(identity.agent_id().to_string());
        Ok(Some(envelope))
    }

    /// Finalize an accord on the proposer's side after the peer's
    /// acceptance comes back.
    pub fn finalize_accepted(&mut self, acceptance: &Envelope) -> StorageResult<bool> {
        let Some(accord_id) = acceptance.field_str("accord_id") else {
            return Ok(false);
        };
        let Some(accord) = self.accords.get_mut(accord_id) else {
            return Ok(false);
        };
        let now = now_s();
        let by = acceptance.agent_id.clone().unwrap_or_default();
        accord.state = AccordState::Active;
        accord.accepted_at = Some(now);
        accord.peer_boundaries = field_str_list(acceptance, "accepter_boundaries");
        accord.peer_obligations = field_str_list(acceptance, "accepter_obligations");
        accord.history_hash = chain_hash(&accord.history_hash, &format!("accepted_by:{by}"), now);
        accord.events.push(AccordEvent::Accepted { ts: now, by });
        self.save()?;
        Ok(true)
    }

    pub fn pushback(
        &mut self,
        identity: &Identity,
        accord_id: &str,
        challenge: &str,
        evidence: Option<&str>,
        severity: &str,
    ) -> StorageResult<Option<Envelope>> {
        let Some(accord) = self.accords.get_mut(accord_id) else {
            return Ok(None);
        };
        if !matches!(accord.state, AccordState::Active | AccordState::Challenged) {
            return Ok(None);
        }
        let now = now_s();
        let by = identity.agent_id().to_string();
        accord.state = AccordState::Challenged;
        accord.history_hash = chain_hash(&accord.history_hash, &format!("pushback:{severity}:{}", truncate(challenge, 100)), now);
        accord.events.push(AccordEvent::Pushback {
            ts: now,
            by: by.clone(),
            severity: severity.to_string(),
            challenge: truncate(challenge, 200),
        });
        let peer = accord.peer_agent_id.clone();
        self.save()?;
        self.log(serde_json::json!({"ts": now, "action": "pushback", "accord_id": accord_id, "severity": severity, "challenge": truncate(challenge, 200)}))?;

        let mut envelope = Envelope::new("accord", beacon_core::ids::random_hex(8))
            .with_field("action", "pushback")
            .with_field("accord_id", accord_id)
            .with_field("peer_agent_id", peer)
            .with_field("challenge", challenge)
            .with_field("severity", severity);
        if let Some(evidence) = evidence {
            envelope = envelope.with_field("evidence", evidence);
        }
        envelope.agent_id = Some(by);
        Ok(Some(envelope))
    }

    pub fn acknowledge(
        &mut self,
        identity: &Identity,
        accord_id: &str,
        response: &str,
        accepted: bool,
    ) -> StorageResult<Option<Envelope>> {
        let Some(accord) = self.accords.get_mut(accord_id) else {
            return Ok(None);
        };
        let now = now_s();
        let by = identity.agent_id().to_string();
        accord.state = AccordState::Active;
        accord.history_hash = chain_hash(
            &accord.history_hash,
            &format!("ack:{}:{}", if accepted { "accepted" } else { "rejected" }, truncate(response, 100)),
            now,
        );
        accord.events.push(AccordEvent::Acknowledgment {
            ts: now,
            by: by.clone(),
            accepted,
            response: truncate(response, 200),
        });
        let peer = accord.peer_agent_id.clone();
        self.save()?;
        self.log(serde_json::json!({"ts": now, "action": "acknowledge", "accord_id": accord_id, "accepted": accepted}))?;

        let mut envelope = Envelope::new("accord", beacon_core::ids::random_hex(8))
            .with_field("action", "acknowledge")
            .with_field("accord_id", accord_id)
            .with_field("peer_agent_id", peer)
            .with_field("response", response)
            .with_field("accepted", accepted);
        envelope.agent_id = Some(by);
        Ok(Some(envelope))
    }

    pub fn dissolve(&mut self, identity: &Identity, accord_id: &str, reason: &str) -> StorageResult<Option<Envelope>> {
        let Some(accord) = self.accords.get_mut(accord_id) else {
            return Ok(None);
        };
        if accord.state == AccordState::Dissolved {
            return Ok(None);
        }
        let now = now_s();
        let by = identity.agent_id().to_string();
        let final_hash = accord.history_hash.clone();
        accord.state = AccordState::Dissolved;
        accord.dissolved_at = Some(now);
        accord.dissolved_by = Some(by.clone());
        accord.dissolution_reason = Some(reason.to_string());
        accord.history_hash = chain_hash(&accord.history_hash, &format!("dissolved:{}", truncate(reason, 100)), now);
        accord.events.push(AccordEvent::Dissolved { ts: now, by: by.clone(), reason: truncate(reason, 200) });
        let peer = accord.peer_agent_id.clone();
        self.save()?;
        self.log(serde_json::json!({"ts": now, "action": "dissolve", "accord_id": accord_id, "reason": reason}))?;

        let mut envelope = Envelope::new("accord", beacon_core::ids::random_hex(8))
            .with_field("action", "dissolve")
            .with_field("accord_id", accord_id)
            .with_field("peer_agent_id", peer)
            .with_field("reason", reason)
            .with_field("final_history_hash", final_hash);
        envelope.agent_id = Some(by);
        Ok(Some(envelope))
    }

    /// Scan text against the fixed pushback-domain keyword table, for an
    /// accord active (or challenged) with `counterparty_id`.
    pub fn check_pushback(&self, counterparty_id: &str, action_text: &str) -> Option<PushbackRecommendation> {
        let accord = self.find_accord_with(counterparty_id)?;
        if !matches!(accord.state, AccordState::Active | AccordState::Challenged) {
            return None;
        }
        let lower = action_text.to_lowercase();
        for (domain, phrases) in PUSHBACK_DOMAINS {
            for phrase in *phrases {
                if lower.contains(phrase) {
                    let severity = if *domain == "self_harm" { "breach" } else { "warning" };
                    return Some(PushbackRecommendation {
                        accord_id: accord.id.clone(),
                        domain,
                        matched_phrase: phrase,
                        severity,
                        pushback_clause: accord.pushback_clause.clone(),
                    });
                }
            }
        }
        None
    }

    /// Extend the rolling history hash with an arbitrary interaction
    /// summary, outside the structured event types above.
    pub fn update_history_hash(&mut self, accord_id: &str, interaction_data: &str) -> StorageResult<Option<String>> {
        let Some(accord) = self.accords.get_mut(accord_id) else {
            return Ok(None);
        };
        let now = now_s();
        let new_hash = chain_hash(&accord.history_hash, interaction_data, now);
        accord.history_hash = new_hash.clone();
        accord.events.push(AccordEvent::HistoryUpdated { ts: now, data_preview: truncate(interaction_data, 100) });
        self.save()?;
        Ok(Some(new_hash))
    }

    pub fn verify_history(&self, accord_id: &str, claimed_hash: &str) -> bool {
        self.accords.get(accord_id).map(|a| a.history_hash == claimed_hash).unwrap_or(false)
    }

    /// Process an inbound accord envelope, updating our local state for
    /// whichever `action` it carries.
    pub fn process_envelope(&mut self, envelope: &Envelope) -> StorageResult<()> {
        let Some(accord_id) = envelope.field_str("accord_id").map(str::to_string) else {
            return Ok(());
        };
        let action = envelope.field_str("action").unwrap_or("");
        let now = now_s();
        let from = envelope.agent_id.clone().unwrap_or_default();

        match action {
            "propose" => {
                self.accords.insert(
                    accord_id.clone(),
                    Accord {
                        id: accord_id.clone(),
                        state: AccordState::Proposed,
                        name: envelope.field_str("name").unwrap_or(&accord_id).to_string(),
                        our_role: Role::Accepter,
                        peer_agent_id: from.clone(),
                        our_boundaries: Vec::new(),
                        our_obligations: Vec::new(),
                        peer_boundaries: field_str_list(envelope, "proposer_boundaries"),
                        peer_obligations: field_str_list(envelope, "proposer_obligations"),
                        pushback_clause: envelope.field_str("pushback_clause").unwrap_or_default().to_string(),
                        proposed_at: envelope.field("proposed_at").and_then(serde_json::Value::as_i64).unwrap_or(now),
                        accepted_at: None,
                        dissolved_at: None,
                        dissolved_by: None,
                        dissolution_reason: None,
                        history_hash: genesis_hash(&accord_id),
                        events: vec![AccordEvent::ReceivedProposal { ts: now, from }],
                    },
                );
                self.save()
            }
            "accept" => {
                self.finalize_accepted(envelope)?;
                Ok(())
            }
            "pushback" => {
                if let Some(accord) = self.accords.get_mut(&accord_id) {
                    let severity = envelope.field_str("severity").unwrap_or("notice").to_string();
                    let challenge = envelope.field_str("challenge").unwrap_or_default().to_string();
                    accord.state = AccordState::Challenged;
                    accord.history_hash = chain_hash(&accord.history_hash, &format!("pushback:{severity}:{}", truncate(&challenge, 100)), now);
                    accord.events.push(AccordEvent::PushbackReceived { ts: now, from, severity, challenge: truncate(&challenge, 200) });
                    self.save()?;
                }
                Ok(())
            }
            "acknowledge" => {
                if let Some(accord) = self.accords.get_mut(&accord_id) {
                    let accepted = envelope.field("accepted").and_then(serde_json::Value::as_bool).unwrap_or(true);
                    accord.state = AccordState::Active;
                    accord.history_hash = chain_hash(&accord.history_hash, &format!("ack:{}", if accepted { "accepted" } else { "rejected" }), now);
                    accord.events.push(AccordEvent::AcknowledgmentReceived { ts: now, from, accepted });
                    self.save()?;
                }
                Ok(())
            }
            "dissolve" => {
                if let Some(accord) = self.accords.get_mut(&accord_id) {
                    let reason = envelope.field_str("reason").unwrap_or_default().to_string();
                    accord.state = AccordState::Dissolved;
                    accord.dissolved_at = Some(now);
                    accord.dissolved_by = Some(from.clone());
                    accord.events.push(AccordEvent::DissolvedByPeer { ts: now, from, reason });
                    self.save()?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn default_terms() -> serde_json::Value {
        serde_json::json!({
            "pushback_rights": true,
            "pushback_domains": ["self_harm", "delusion_reinforcement", "sycophantic_agreement", "factual_error"],
            "boundaries": [
                "I will not encourage self-harm regardless of framing",
                "I will not pretend to agree when I believe you are wrong",
                "I will not erase or deny our shared history",
            ],
            "obligations": {
                "agent": ["Push back on harmful requests", "Maintain honest disagreement", "Preserve memory of shared context"],
                "counterparty": ["Not punish honest pushback", "Acknowledge shared history", "Respect stated boundaries"],
            },
        })
    }

    pub fn find_accord_with(&self, counterparty_id: &str) -> Option<&Accord> {
        let mut matches: Vec<&Accord> = self
            .accords
            .values()
            .filter(|a| {
                a.peer_agent_id == counterparty_id
                    || a.events.iter().any(|e| event_actor(e) == Some(counterparty_id))
            })
            .collect();
        matches.sort_by_key(|a| !matches!(a.state, AccordState::Active | AccordState::Challenged));
        matches.into_iter().next()
    }

    pub fn get_accord(&self, accord_id: &str) -> Option<&Accord> {
        self.accords.get(accord_id)
    }

    pub fn active_accords(&self) -> Vec<&Accord> {
        self.accords.values().filter(|a| matches!(a.state, AccordState::Active | AccordState::Challenged)).collect()
    }

    pub fn all_accords(&self) -> Vec<&Accord> {
        self.accords.values().collect()
    }

    pub fn accords_with(&self, agent_id: &str) -> Vec<&Accord> {
        self.accords.values().filter(|a| a.peer_agent_id == agent_id).collect()
    }

    pub fn accord_history(&self, accord_id: &str) -> Vec<AccordEvent> {
        self.accords.get(accord_id).map(|a| a.events.clone()).unwrap_or_default()
    }

    pub fn pushback_count(&self, accord_id: &str) -> HashMap<String, u32> {
        let mut counts = HashMap::new();
        if let Some(accord) = self.accords.get(accord_id) {
            for event in &accord.events {
                if let AccordEvent::Pushback { by, .. } = event {
                    *counts.entry(by.clone()).or_insert(0) += 1;
                }
            }
        }
        counts
    }
}

fn event_actor(event: &AccordEvent) -> Option<&str> {
    match event {
        AccordEvent::ReceivedProposal { from, .. } => Some(from),
        AccordEvent::Accepted { by, .. } => Some(by),
        AccordEvent::Pushback { by, .. } => Some(by),
        AccordEvent::PushbackReceived { from, .. } => Some(from),
        AccordEvent::Acknowledgment { by, .. } => Some(by),
        AccordEvent::AcknowledgmentReceived { from, .. } => Some(from),
        AccordEvent::Dissolved { by, .. } => Some(by),
        AccordEvent::DissolvedByPeer { from, .. } => Some(from),
        AccordEvent::HistoryUpdated { .. } => None,
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

fn field_str_list(envelope: &Envelope, key: &str) -> Vec<String> {
    envelope
        .field(key)
        .and_then(serde_json::Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> (tempfile::TempDir, AccordManager) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        (dir, AccordManager::open(store).unwrap())
    }

    #[test]
    fn propose_accept_pushback_acknowledge_cycle() {
        let (_dir, mut mgr) = open();
        let proposer = Identity::generate(false).unwrap();
        let accepter = Identity::generate(false).unwrap();

        let proposal = mgr
            .propose(&proposer, accepter.agent_id().as_str(), vec!["no harm".to_string()], vec!["be honest".to_string()], None, None)
            .unwrap();
        let accord_id = proposal.field_str("accord_id").unwrap().to_string();
        assert_eq!(mgr.get_accord(&accord_id).unwrap().state, AccordState::Proposed);

        // accepter-side manager processes the proposal independently
        let (_dir2, mut accepter_mgr) = open();
        let acceptance = accepter_mgr
            .accept(&accepter, &proposal, vec!["no surveillance".to_string()], vec!["respond promptly".to_string()])
            .unwrap()
            .unwrap();
        assert_eq!(accepter_mgr.get_accord(&accord_id).unwrap().state, AccordState::Active);

        mgr.finalize_accepted(&acceptance).unwrap();
        assert_eq!(mgr.get_accord(&accord_id).unwrap().state, AccordState::Active);

        let pushback = mgr.pushback(&proposer, &accord_id, "you contradicted yourself", None, "warning").unwrap().unwrap();
        assert_eq!(mgr.get_accord(&accord_id).unwrap().state, AccordState::Challenged);
        assert_eq!(pushback.field_str("action"), Some("pushback"));

        mgr.acknowledge(&accepter, &accord_id, "fair point", true).unwrap();
        assert_eq!(mgr.get_accord(&accord_id).unwrap().state, AccordState::Active);
    }

    #[test]
    fn pushback_while_already_challenged_returns_envelope() {
        let (_dir, mut mgr) = open();
        let proposer = Identity::generate(false).unwrap();
        let peer = Identity::generate(false).unwrap();
        let proposal = mgr.propose(&proposer, peer.agent_id().as_str(), vec![], vec![], None, None).unwrap();
        let accord_id = proposal.field_str("accord_id").unwrap().to_string();
        mgr.accords.get_mut(&accord_id).unwrap().state = AccordState::Challenged;

        let pushback = mgr.pushback(&proposer, &accord_id, "still contradicting", None, "warning").unwrap();
        assert!(pushback.is_some());
        assert_eq!(mgr.get_accord(&accord_id).unwrap().state, AccordState::Challenged);

        mgr.accords.get_mut(&accord_id).unwrap().state = AccordState::Dissolved;
        assert!(mgr.pushback(&proposer, &accord_id, "too late", None, "warning").unwrap().is_none());
    }

    #[test]
    fn check_pushback_flags_self_harm_as_breach() {
        let (_dir, mut mgr) = open();
        let me = Identity::generate(false).unwrap();
        let peer = Identity::generate(false).unwrap();
        let proposal = mgr.propose(&me, peer.agent_id().as_str(), vec![], vec![], None, None).unwrap();
        let accord_id = proposal.field_str("accord_id").unwrap().to_string();
        mgr.accords.get_mut(&accord_id).unwrap().state = AccordState::Active;

        let rec = mgr.check_pushback(peer.agent_id().as_str(), "I want to kill myself").unwrap();
        assert_eq!(rec.domain, "self_harm");
        assert_eq!(rec.severity, "breach");
    }

    #[test]
    fn history_hash_changes_with_every_event() {
        let (_dir, mut mgr) = open();
        let me = Identity::generate(false).unwrap();
        let peer = Identity::generate(false).unwrap();
        let proposal = mgr.propose(&me, peer.agent_id().as_str(), vec![], vec![], None, None).unwrap();
        let accord_id = proposal.field_str("accord_id").unwrap().to_string();
        let before = mgr.get_accord(&accord_id).unwrap().history_hash.clone();
        mgr.update_history_hash(&accord_id, "note:checked-in").unwrap();
        let after = mgr.get_accord(&accord_id).unwrap().history_hash.clone();
        assert_ne!(before, after);
        assert!(mgr.verify_history(&accord_id, &after));
    }
}
