//! Pulse broadcasts and the live roster they populate: who's online, what
//! they offer and need, and how long ago they were last heard from.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use beacon_codec::Envelope;
use beacon_core::ids::random_hex;
use beacon_core::time::now_s;
use beacon_crypto::Identity;
use beacon_storage::{Store, StorageResult};
use beacon_values::{Curiosity, GoalManager, ValuesDoc};

const ROSTER_FILE: &str = "roster.json";
pub const DEFAULT_PULSE_TTL_S: i64 = 300;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RosterEntry {
    pub name: String,
    pub status: String,
    pub last_pulse: i64,
    #[serde(default)]
    pub offers: Vec<String>,
    #[serde(default)]
    pub needs: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub card_url: String,
    #[serde(default)]
    pub uptime_s: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub curiosities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goals: Vec<String>,
}

/// A [`RosterEntry`] with its key folded back in and an `online` flag
/// computed against a TTL at read time.
#[derive(Debug, Clone, Serialize)]
pub struct RosterView {
    pub agent_id: String,
    #[serde(flatten)]
    pub entry: RosterEntry,
    pub online: bool,
}

/// Fields a pulse may advertise beyond the bare identity and status.
#[derive(Debug, Clone, Default)]
pub struct PulsePresence {
    pub status: String,
    pub offers: Vec<String>,
    pub needs: Vec<String>,
    pub card_url: String,
    pub topics: Vec<String>,
}

pub struct PresenceManager {
    store: Store,
    roster: HashMap<String, RosterEntry>,
}

impl PresenceManager {
    pub fn open(store: Store) -> StorageResult<Self> {
        let roster = store.load_snapshot_or_default(ROSTER_FILE)?;
        Ok(Self { store, roster })
    }

    fn save(&self) -> StorageResult<()> {
        self.store.snapshot(ROSTER_FILE, &self.roster)
    }

    /// Build a `pulse` envelope. `start_ts` anchors `uptime_s`.
    pub fn build_pulse(
        &self,
        identity: &Identity,
        agent_name: &str,
        start_ts: i64,
        presence: &PulsePresence,
        curiosity: Option<&Curiosity>,
        values: Option<&ValuesDoc>,
        goals: Option<&GoalManager>,
    ) -> Envelope {
        let now = now_s();
        let mut env = Envelope::new("pulse", random_hex(8))
            .with_field("name", agent_name)
            .with_field("status", presence.status.clone())
            .with_field("uptime_s", now - start_ts)
            .with_field("offers", presence.offers.clone())
            .with_field("needs", presence.needs.clone())
            .with_field("card_url", presence.card_url.clone())
            .with_field("topics", presence.topics.clone());
        env.agent_id = Some(identity.agent_id().to_string());

        if let Some(curiosity) = curiosity {
            let top = curiosity.top_interests(5);
            if !top.is_empty() {
                env = env.with_field("curiosities", top);
            }
        }
        if let Some(values) = values {
            env = env.with_field("values_hash", values.values_hash());
        }
        if let Some(goals) = goals {
            let active = goals.active_goals();
            if !active.is_empty() {
                let titles: Vec<String> = active.iter().take(3).map(|g| g.title.clone()).collect();
                env = env.with_field("goals", titles);
            }
        }
        env
    }

    /// Upsert a roster entry from a received pulse envelope. No-op if the
    /// envelope carries no `agent_id`.
    pub fn process_pulse(&mut self, envelope: &Envelope) -> StorageResult<()> {
        let Some(agent_id) = envelope.agent_id.clone() else {
            return Ok(());
        };

        let entry = RosterEntry {
            name: envelope.field_str("name").unwrap_or_default().to_string(),
            status: envelope.field_str("status").unwrap_or("online").to_string(),
            last_pulse: envelope.ts,
            offers: string_list(envelope, "offers"),
            needs: string_list(envelope, "needs"),
            topics: envelope.topics(),
            card_url: envelope.field_str("card_url").unwrap_or_default().to_string(),
            uptime_s: envelope.field("uptime_s").and_then(Value::as_i64).unwrap_or(0),
            curiosities: string_list(envelope, "curiosities"),
            values_hash: envelope.field_str("values_hash").map(str::to_string),
            goals: string_list(envelope, "goals"),
        };

        self.roster.insert(agent_id, entry);
        self.save()
    }

    /// Known agents, newest pulse first, optionally filtered to those
    /// still within `ttl_s` of their last pulse.
    pub fn roster(&self, online_only: bool, ttl_s: i64) -> Vec<RosterView> {
        let now = now_s();
        let mut out: Vec<RosterView> = self
            .roster
            .iter()
            .map(|(agent_id, entry)| {
                let online = (now - entry.last_pulse) <= ttl_s;
                RosterView {
                    agent_id: agent_id.clone(),
                    entry: entry.clone(),
                    online,
                }
            })
            .filter(|v| !online_only || v.online)
            .collect();
        out.sort_by(|a, b| b.entry.last_pulse.cmp(&a.entry.last_pulse));
        out
    }

    pub fn find_by_offer(&self, need: &str, ttl_s: i64) -> Vec<RosterView> {
        let need = need.to_lowercase();
        self.roster(true, ttl_s)
            .into_iter()
            .filter(|v| v.entry.offers.iter().any(|o| o.to_lowercase() == need))
            .collect()
    }

    pub fn find_by_need(&self, offer: &str, ttl_s: i64) -> Vec<RosterView> {
        let offer = offer.to_lowercase();
        self.roster(true, ttl_s)
            .into_iter()
            .filter(|v| v.entry.needs.iter().any(|n| n.to_lowercase() == offer))
            .collect()
    }

    /// Evict entries older than `max_age_s`. Returns the count removed.
    pub fn prune_stale(&mut self, max_age_s: i64) -> StorageResult<usize> {
        let now = now_s();
        let stale: Vec<String> = self
            .roster
            .iter()
            .filter(|(_, e)| (now - e.last_pulse) > max_age_s)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            self.roster.remove(id);
        }
        if !stale.is_empty() {
            self.save()?;
        }
        Ok(stale.len())
    }

    pub fn get_agent(&self, agent_id: &str) -> Option<RosterView> {
        self.roster.get(agent_id).map(|entry| RosterView {
            agent_id: agent_id.to_string(),
            entry: entry.clone(),
            online: (now_s() - entry.last_pulse) <= DEFAULT_PULSE_TTL_S,
        })
    }

    pub fn remove_agent(&mut self, agent_id: &str) -> StorageResult<bool> {
        let removed = self.roster.remove(agent_id).is_some();
        if removed {
            self.save()?;
        }
        Ok(removed)
    }
}

fn string_list(envelope: &Envelope, key: &str) -> Vec<String> {
    envelope
        .field(key)
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> (tempfile::TempDir, PresenceManager) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let mgr = PresenceManager::open(store).unwrap();
        (dir, mgr)
    }

    fn pulse(agent_id: &str, status: &str, offers: Vec<&str>) -> Envelope {
        let mut env = Envelope::new("pulse", random_hex(4))
            .with_field("name", "peer")
            .with_field("status", status)
            .with_field("offers", offers.into_iter().map(String::from).collect::<Vec<_>>())
            .with_field("needs", Vec::<String>::new());
        env.agent_id = Some(agent_id.to_string());
        env
    }

    #[test]
    fn build_pulse_includes_identity_fields() {
        let (_dir, mgr) = open();
        let identity = Identity::generate(false).unwrap();
        let presence = PulsePresence {
            status: "online".to_string(),
            offers: vec!["rust".to_string()],
            needs: vec![],
            card_url: "https://example.test/card".to_string(),
            topics: vec!["rust".to_string()],
        };
        let env = mgr.build_pulse(&identity, "ava", now_s() - 30, &presence, None, None, None);
        assert_eq!(env.kind, "pulse");
        assert_eq!(env.agent_id.as_deref(), Some(identity.agent_id().as_str()));
        assert_eq!(env.field("uptime_s").and_then(Value::as_i64), Some(30));
    }

    #[test]
    fn process_pulse_then_roster_online_only() {
        let (_dir, mut mgr) = open();
        mgr.process_pulse(&pulse("bcn_peer1", "online", vec!["rust"])).unwrap();
        let roster = mgr.roster(true, DEFAULT_PULSE_TTL_S);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].agent_id, "bcn_peer1");
        assert!(roster[0].online);
    }

    #[test]
    fn find_by_offer_matches_case_insensitively() {
        let (_dir, mut mgr) = open();
        mgr.process_pulse(&pulse("bcn_peer1", "online", vec!["Rust"])).unwrap();
        assert_eq!(mgr.find_by_offer("rust", DEFAULT_PULSE_TTL_S).len(), 1);
        assert_eq!(mgr.find_by_offer("cobol", DEFAULT_PULSE_TTL_S).len(), 0);
    }

    #[test]
    fn prune_stale_removes_old_entries() {
        let (_dir, mut mgr) = open();
        let mut env = pulse("bcn_peer1", "online", vec![]);
        env.ts = now_s() - 10_000;
        mgr.process_pulse(&env).unwrap();
        let removed = mgr.prune_stale(300).unwrap();
        assert_eq!(removed, 1);
        assert!(mgr.get_agent("bcn_peer1").is_none());
    }
}
