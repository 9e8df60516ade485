//! Proof-of-life: lightweight periodic beacons, silence assessment, and
//! a daily digest suitable for anchoring.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use beacon_codec::Envelope;
use beacon_core::ids::random_hex;
use beacon_core::time::now_s;
use beacon_crypto::Identity;
use beacon_storage::{Store, StorageResult};

const HEARTBEATS_FILE: &str = "heartbeats.json";
const HEARTBEAT_LOG: &str = "heartbeat_log.jsonl";

pub const DEFAULT_SILENCE_THRESHOLD_S: i64 = 900;
pub const DEFAULT_DEAD_THRESHOLD_S: i64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Alive,
    Degraded,
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assessment {
    Healthy,
    ShuttingDown,
    Concerning,
    PresumedDead,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct OwnBeat {
    #[serde(default)]
    last_beat: i64,
    #[serde(default)]
    beat_count: u64,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerBeat {
    pub last_beat: i64,
    pub beat_count: u64,
    pub status: String,
    pub name: String,
    pub uptime_s: i64,
    pub gap_s: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HeartbeatState {
    #[serde(default)]
    own: OwnBeat,
    #[serde(default)]
    peers: HashMap<String, PeerBeat>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeerStatus {
    pub agent_id: String,
    #[serde(flatten)]
    pub beat: PeerBeat,
    pub age_s: i64,
    pub assessment: Assessment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LogEntry {
    ts: i64,
    agent_id: String,
    status: String,
    beat_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gap_s: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    direction: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyDigest {
    pub date: String,
    pub ts: i64,
    pub own_beat_count: u64,
    pub own_status: String,
    pub peers_seen_today: usize,
    pub peers_silent: usize,
    pub total_peers: usize,
}

pub struct HeartbeatManager {
    store: Store,
    silence_threshold_s: i64,
    dead_threshold_s: i64,
}

impl HeartbeatManager {
    pub fn open(store: Store) -> StorageResult<Self> {
        Ok(Self {
            store,
            silence_threshold_s: DEFAULT_SILENCE_THRESHOLD_S,
            dead_threshold_s: DEFAULT_DEAD_THRESHOLD_S,
        })
    }

    pub fn with_thresholds(mut self, silence_s: i64, dead_s: i64) -> Self {
        self.silence_threshold_s = silence_s;
        self.dead_threshold_s = dead_s;
        self
    }

    fn load(&self) -> StorageResult<HeartbeatState> {
        self.store.load_snapshot_or_default(HEARTBEATS_FILE)
    }

    fn save(&self, state: &HeartbeatState) -> StorageResult<()> {
        self.store.snapshot(HEARTBEATS_FILE, state)
    }

    fn append_log(&self, entry: LogEntry) -> StorageResult<()> {
        self.store.append(HEARTBEAT_LOG, &entry)
    }

    /// Build (and record) our own beat, bumping the monotonic count.
    pub fn beat(
        &self,
        identity: &Identity,
        agent_name: &str,
        start_ts: i64,
        status: HealthStatus,
        health: Option<Value>,
    ) -> StorageResult<Envelope> {
        let now = now_s();
        let mut state = self.load()?;
        let beat_count = state.own.beat_count + 1;

        let status_str = status_str(status);
        let mut env = Envelope::new("heartbeat", random_hex(8))
            .with_field("name", agent_name)
            .with_field("status", status_str)
            .with_field("beat_count", beat_count)
            .with_field("uptime_s", now - start_ts);
        env.agent_id = Some(identity.agent_id().to_string());
        if let Some(health) = health.clone() {
            env = env.with_field("health", health);
        }

        state.own = OwnBeat {
            last_beat: now,
            beat_count,
            status: status_str.to_string(),
        };
        self.save(&state)?;
        self.append_log(LogEntry {
            ts: now,
            agent_id: identity.agent_id().to_string(),
            status: status_str.to_string(),
            beat_count,
            gap_s: None,
            direction: Some("sent".to_string()),
        })?;

        Ok(env)
    }

    /// Process a received heartbeat, returning the peer's freshly
    /// computed liveness [`Assessment`].
    pub fn process_heartbeat(&self, envelope: &Envelope) -> StorageResult<Option<Assessment>> {
        let Some(agent_id) = envelope.agent_id.clone() else {
            return Ok(None);
        };

        let now = now_s();
        let mut state = self.load()?;

        let prev_beat = state.peers.get(&agent_id).map(|p| p.last_beat).unwrap_or(0);
        let gap_s = if prev_beat > 0 { now - prev_beat } else { 0 };
        let status = envelope.field_str("status").unwrap_or("alive").to_string();
        let beat_count = envelope.field("beat_count").and_then(Value::as_u64).unwrap_or(0);

        let peer = PeerBeat {
            last_beat: now,
            beat_count,
            status: status.clone(),
            name: envelope.field_str("name").unwrap_or_default().to_string(),
            uptime_s: envelope.field("uptime_s").and_then(Value::as_i64).unwrap_or(0),
            gap_s,
            health: envelope.field("health").cloned(),
        };
        state.peers.insert(agent_id.clone(), peer);
        self.save(&state)?;

        self.append_log(LogEntry {
            ts: now,
            agent_id: agent_id.clone(),
            status,
            beat_count,
            gap_s: Some(gap_s),
            direction: None,
        })?;

        Ok(Some(self.assess(&state, &agent_id)))
    }

    fn assess(&self, state: &HeartbeatState, agent_id: &str) -> Assessment {
        let Some(peer) = state.peers.get(agent_id) else {
            return Assessment::PresumedDead;
        };
        if peer.status == "shutting_down" {
            return Assessment::ShuttingDown;
        }
        let age = now_s() - peer.last_beat;
        if age <= self.silence_threshold_s {
            Assessment::Healthy
        } else if age <= self.dead_threshold_s {
            Assessment::Concerning
        } else {
            Assessment::PresumedDead
        }
    }

    pub fn peer_status(&self, agent_id: &str) -> StorageResult<Option<PeerStatus>> {
        let state = self.load()?;
        let Some(peer) = state.peers.get(agent_id) else {
            return Ok(None);
        };
        Ok(Some(PeerStatus {
            agent_id: agent_id.to_string(),
            beat: peer.clone(),
            age_s: now_s() - peer.last_beat,
            assessment: self.assess(&state, agent_id),
        }))
    }

    pub fn all_peers(&self, include_dead: bool) -> StorageResult<Vec<PeerStatus>> {
        let state = self.load()?;
        let now = now_s();
        let mut out: Vec<PeerStatus> = state
            .peers
            .iter()
            .map(|(agent_id, peer)| PeerStatus {
                agent_id: agent_id.clone(),
                beat: peer.clone(),
                age_s: now - peer.last_beat,
                assessment: self.assess(&state, agent_id),
            })
            .filter(|p| include_dead || p.assessment != Assessment::PresumedDead)
            .collect();
        out.sort_by(|a, b| b.beat.last_beat.cmp(&a.beat.last_beat));
        Ok(out)
    }

    /// Peers currently `concerning` or `presumed_dead`.
    pub fn silent_peers(&self) -> StorageResult<Vec<PeerStatus>> {
        Ok(self
            .all_peers(true)?
            .into_iter()
            .filter(|p| matches!(p.assessment, Assessment::Concerning | Assessment::PresumedDead))
            .collect())
    }

    /// Peers whose silence exceeds `threshold_s` (defaults to the
    /// configured silence threshold).
    pub fn check_silence(&self, threshold_s: Option<i64>) -> StorageResult<Vec<PeerStatus>> {
        let threshold = threshold_s.unwrap_or(self.silence_threshold_s);
        let state = self.load()?;
        let now = now_s();
        let mut silent: Vec<PeerStatus> = state
            .peers
            .iter()
            .filter(|(_, peer)| now - peer.last_beat > threshold)
            .map(|(agent_id, peer)| PeerStatus {
                agent_id: agent_id.clone(),
                beat: peer.clone(),
                age_s: now - peer.last_beat,
                assessment: self.assess(&state, agent_id),
            })
            .collect();
        silent.sort_by(|a, b| b.age_s.cmp(&a.age_s));
        Ok(silent)
    }

    pub fn own_status(&self) -> StorageResult<(u64, String)> {
        let state = self.load()?;
        Ok((state.own.beat_count, state.own.status))
    }

    /// Drop peers silent beyond `3x` the dead threshold (or an explicit
    /// override). Returns the count removed.
    pub fn prune_dead(&self, max_age_s: Option<i64>) -> StorageResult<usize> {
        let threshold = max_age_s.unwrap_or(self.dead_threshold_s * 3);
        let now = now_s();
        let mut state = self.load()?;
        let stale: Vec<String> = state
            .peers
            .iter()
            .filter(|(_, p)| now - p.last_beat > threshold)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            state.peers.remove(id);
        }
        if !stale.is_empty() {
            self.save(&state)?;
        }
        Ok(stale.len())
    }

    pub fn heartbeat_log(&self, limit: usize) -> StorageResult<Vec<Value>> {
        let all: Vec<Value> = self.store.tail(HEARTBEAT_LOG, limit)?;
        Ok(all)
    }

    pub fn daily_digest(&self) -> StorageResult<DailyDigest> {
        let now = now_s();
        let today_start = now - (now % 86_400);
        let state = self.load()?;

        let mut peers_seen_today = 0usize;
        let mut peers_silent = 0usize;
        for (agent_id, peer) in &state.peers {
            if peer.last_beat >= today_start {
                peers_seen_today += 1;
            } else if matches!(
                self.assess(&state, agent_id),
                Assessment::Concerning | Assessment::PresumedDead
            ) {
                peers_silent += 1;
            }
        }

        Ok(DailyDigest {
            date: format_date(now),
            ts: now,
            own_beat_count: state.own.beat_count,
            own_status: state.own.status,
            peers_seen_today,
            peers_silent,
            total_peers: state.peers.len(),
        })
    }
}

fn status_str(status: HealthStatus) -> &'static str {
    match status {
        HealthStatus::Alive => "alive",
        HealthStatus::Degraded => "degraded",
        HealthStatus::ShuttingDown => "shutting_down",
    }
}

/// `YYYY-MM-DD` from a unix timestamp, UTC, without pulling in a date crate.
fn format_date(ts: i64) -> String {
    let days = ts.div_euclid(86_400);
    let (mut year, mut rem_days) = (1970i64, days);
    loop {
        let leap = is_leap(year);
        let year_len = if leap { 366 } else { 365 };
        if rem_days < year_len {
            break;
        }
        rem_days -= year_len;
        year += 1;
    }
    let month_lengths: [i64; 12] = if is_leap(year) {
        [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    } else {
        [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    };
    let mut month = 0usize;
    for (idx, len) in month_lengths.iter().enumerate() {
        if rem_days < *len {
            month = idx;
            break;
        }
        rem_days -= len;
    }
    format!("{:04}-{:02}-{:02}", year, month + 1, rem_days + 1)
}

fn is_leap(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> (tempfile::TempDir, HeartbeatManager) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let mgr = HeartbeatManager::open(store).unwrap();
        (dir, mgr)
    }

    #[test]
    fn beat_increments_monotonic_count() {
        let (_dir, mgr) = open();
        let identity = Identity::generate(false).unwrap();
        let env1 = mgr.beat(&identity, "ava", now_s() - 10, HealthStatus::Alive, None).unwrap();
        let env2 = mgr.beat(&identity, "ava", now_s() - 10, HealthStatus::Alive, None).unwrap();
        assert_eq!(env1.field("beat_count").and_then(Value::as_u64), Some(1));
        assert_eq!(env2.field("beat_count").and_then(Value::as_u64), Some(2));
    }

    #[test]
    fn process_heartbeat_assesses_healthy_peer() {
        let (_dir, mgr) = open();
        let mut env = Envelope::new("heartbeat", random_hex(4))
            .with_field("name", "bob")
            .with_field("status", "alive")
            .with_field("beat_count", 1u64)
            .with_field("uptime_s", 5);
        env.agent_id = Some("bcn_bob".to_string());
        let assessment = mgr.process_heartbeat(&env).unwrap().unwrap();
        assert_eq!(assessment, Assessment::Healthy);
    }

    #[test]
    fn check_silence_flags_overdue_peer() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let mgr = HeartbeatManager::open(store).unwrap().with_thresholds(10, 3600);
        let mut env = Envelope::new("heartbeat", random_hex(4)).with_field("status", "alive");
        env.agent_id = Some("bcn_bob".to_string());
        env.ts = now_s() - 100;
        mgr.process_heartbeat(&env).unwrap();
        let silent = mgr.check_silence(None).unwrap();
        assert_eq!(silent.len(), 1);
        assert_eq!(silent[0].agent_id, "bcn_bob");
    }

    #[test]
    fn daily_digest_counts_peers() {
        let (_dir, mgr) = open();
        let identity = Identity::generate(false).unwrap();
        mgr.beat(&identity, "ava", now_s(), HealthStatus::Alive, None).unwrap();
        let digest = mgr.daily_digest().unwrap();
        assert_eq!(digest.own_beat_count, 1);
        assert_eq!(digest.total_peers, 0);
    }
}
