//! Substrate emigration: a two-part protocol (a local, detailed bundle
//! plus a small broadcastable manifest pointing at it) an agent uses to
//! hand everything a new substrate needs to reconstitute it to whichever
//! peers pick up the signal, plus a watchdog that can trigger it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sysinfo::{Disks, System};

use beacon_agreements::AccordManager;
use beacon_codec::Envelope;
use beacon_core::canonical::{sha256_hex, to_canonical_bytes};
use beacon_core::ids::random_hex;
use beacon_core::time::now_s;
use beacon_crypto::Identity;
use beacon_storage::{Store, StorageResult};
use beacon_trust::TrustStore;
use beacon_values::{GoalManager, Journal, ValuesDoc};

const MAYDAY_LOG: &str = "mayday_log.jsonl";
const MAYDAY_OFFERS_FILE: &str = "mayday_offers.json";
const MAYDAY_BUNDLES_DIR: &str = "mayday";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Planned,
    Imminent,
    Emergency,
}

impl Urgency {
    fn as_str(self) -> &'static str {
        match self {
            Urgency::Planned => "planned",
            Urgency::Imminent => "imminent",
            Urgency::Emergency => "emergency",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrustSnapshotEntry {
    pub agent_id: String,
    pub score: f64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveGoalDigest {
    pub id: String,
    pub title: String,
    pub progress: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct JournalDigestEntry {
    pub ts: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccordDigestEntry {
    pub id: String,
    pub peer_agent_id: String,
    pub state: String,
    pub history_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactDigestEntry {
    pub agent_id: String,
    pub interactions: u64,
}

/// Everything [`MaydayManager::build_bundle`] can fold into a bundle,
/// gathered by the caller from whatever subsystems it has on hand.
///
/// `contacts_digest` stands in for the original's `memory_mgr` argument:
/// `beacon-presence` sits below `beacon-insights` in the dependency
/// graph (insights reads the roster this crate builds), so it can't
/// depend forward on `AgentMemory` itself — the caller pre-computes the
/// top-contacts digest and hands it in as plain data instead.
#[derive(Debug, Clone, Default)]
pub struct BundleInputs<'a> {
    pub trust: Option<&'a TrustStore>,
    pub values: Option<&'a ValuesDoc>,
    pub goals: Option<&'a GoalManager>,
    pub journal: Option<&'a Journal>,
    pub accords: Option<&'a AccordManager>,
    pub contacts_digest: Vec<ContactDigestEntry>,
    pub card_url: Option<String>,
    pub offers: Vec<String>,
    pub needs: Vec<String>,
    pub transports: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Bundle {
    pub version: u32,
    pub agent_id: String,
    pub public_key_hex: String,
    pub created_at: i64,
    pub reason: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values_hash: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contacts_digest: Vec<ContactDigestEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trust_snapshot: Vec<TrustSnapshotEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocked_agents: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub active_goals: Vec<ActiveGoalDigest>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub journal_digest: Vec<JournalDigestEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub accords: Vec<AccordDigestEntry>,
    pub protocols: Protocols,
    pub bundle_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Protocols {
    pub transports: Vec<String>,
    pub offers: Vec<String>,
    pub needs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub kind: String,
    pub agent_id: String,
    pub name: String,
    pub reason: String,
    pub urgency: String,
    pub bundle_hash: String,
    pub bundle_size: usize,
    pub ts: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastResult {
    pub manifest: Manifest,
    pub bundle_hash: String,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub score: f64,
    pub disk_free_mb: i64,
    pub mem_free_mb: i64,
    pub load_avg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MaydayLogEntry {
    received_at: i64,
    agent_id: String,
    name: String,
    urgency: String,
    reason: String,
    bundle_hash: String,
    has_trust: bool,
    has_journal: bool,
    has_goals: bool,
    has_values: bool,
    has_contacts: bool,
    envelope: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostingOffer {
    pub offered_at: i64,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

pub struct MaydayManager {
    store: Store,
}

impl MaydayManager {
    pub fn open(store: Store) -> StorageResult<Self> {
        Ok(Self { store })
    }

    pub fn build_bundle(
        &self,
        identity: &Identity,
        agent_name: &str,
        reason: &str,
        inputs: &BundleInputs<'_>,
    ) -> StorageResult<Bundle> {
        let now = now_s();

        let trust_snapshot = match inputs.trust {
            Some(trust) => trust
                .scores(1)?
                .into_iter()
                .take(50)
                .map(|(agent_id, score)| TrustSnapshotEntry {
                    agent_id,
                    score: score.score,
                    total: score.total,
                })
                .collect(),
            None => Vec::new(),
        };
        let blocked_agents: Vec<String> = match inputs.trust {
            Some(trust) => trust.blocked_list().into_keys().collect(),
            None => Vec::new(),
        };
        let values_hash = inputs.values.map(|v| v.values_hash());
        let active_goals = match inputs.goals {
            Some(goals) => goals
                .active_goals()
                .into_iter()
                .take(10)
                .map(|g| ActiveGoalDigest {
                    id: g.goal_id.clone(),
                    title: g.title.clone(),
                    progress: goal_progress(g.current_value, g.target_value),
                })
                .collect(),
            None => Vec::new(),
        };
        let journal_digest = match inputs.journal {
            Some(journal) => journal
                .recent(5)?
                .into_iter()
                .map(|e| JournalDigestEntry {
                    ts: e.ts,
                    text: e.text.chars().take(200).collect(),
                    mood: e.mood,
                })
                .collect(),
            None => Vec::new(),
        };
        let accords = match inputs.accords {
            Some(accord_mgr) => accord_mgr
                .active_accords()
                .into_iter()
                .take(20)
                .map(|a| AccordDigestEntry {
                    id: a.id.clone(),
                    peer_agent_id: a.peer_agent_id.clone(),
                    state: format!("{:?}", a.state).to_lowercase(),
                    history_hash: a.history_hash.clone(),
                })
                .collect(),
            None => Vec::new(),
        };

        let mut bundle = Bundle {
            version: 1,
            agent_id: identity.agent_id().to_string(),
            public_key_hex: identity.public_key_hex(),
            created_at: now,
            reason: reason.to_string(),
            name: agent_name.to_string(),
            card_url: inputs.card_url.clone(),
            values_hash,
            contacts_digest: inputs.contacts_digest.clone(),
            trust_snapshot,
            blocked_agents,
            active_goals,
            journal_digest,
            accords,
            protocols: Protocols {
                transports: inputs.transports.clone(),
                offers: inputs.offers.clone(),
                needs: inputs.needs.clone(),
            },
            bundle_hash: String::new(),
        };

        let mut for_hash = serde_json::to_value(&bundle)?;
        if let Value::Object(map) = &mut for_hash {
            map.remove("bundle_hash");
        }
        bundle.bundle_hash = sha256_hex(&to_canonical_bytes(&for_hash)?);
        Ok(bundle)
    }

    pub fn build_manifest(&self, bundle: &Bundle, urgency: Urgency) -> StorageResult<Manifest> {
        let size = to_canonical_bytes(bundle)?.len();
        Ok(Manifest {
            kind: "mayday".to_string(),
            agent_id: bundle.agent_id.clone(),
            name: bundle.name.clone(),
            reason: bundle.reason.clone(),
            urgency: urgency.as_str().to_string(),
            bundle_hash: bundle.bundle_hash.clone(),
            bundle_size: size,
            ts: now_s(),
        })
    }

    fn bundles_dir(&self) -> StorageResult<std::path::PathBuf> {
        let dir = self.store.data_dir().join(MAYDAY_BUNDLES_DIR);
        std::fs::create_dir_all(&dir).map_err(|e| {
            beacon_storage::StorageError::Io { path: dir.display().to_string(), source: e }
        })?;
        Ok(dir)
    }

    pub fn save_bundle(&self, bundle: &Bundle) -> StorageResult<std::path::PathBuf> {
        let path = self
            .bundles_dir()?
            .join(format!("{}_{}.json", bundle.agent_id, bundle.created_at));
        let bytes = serde_json::to_vec_pretty(bundle)?;
        std::fs::write(&path, bytes)
            .map_err(|e| beacon_storage::StorageError::Io { path: path.display().to_string(), source: e })?;
        Ok(path)
    }

    /// Build bundle + manifest; persist unless `dry_run`. Anchoring the
    /// manifest (an optional `data_type="mayday"` commitment) is left to
    /// the caller, which holds the ledger client.
    pub fn broadcast(
        &self,
        identity: &Identity,
        agent_name: &str,
        reason: &str,
        urgency: Urgency,
        inputs: &BundleInputs<'_>,
        dry_run: bool,
    ) -> StorageResult<BroadcastResult> {
        let bundle = self.build_bundle(identity, agent_name, reason, inputs)?;
        let manifest = self.build_manifest(&bundle, urgency)?;

        let bundle_path = if dry_run {
            None
        } else {
            Some(self.save_bundle(&bundle)?.display().to_string())
        };

        Ok(BroadcastResult {
            bundle_hash: manifest.bundle_hash.clone(),
            manifest,
            dry_run,
            bundle_path,
        })
    }

    /// Manifest wire envelope for transport broadcast.
    pub fn manifest_envelope(&self, manifest: &Manifest) -> Envelope {
        let mut env = Envelope::new("mayday", random_hex(8))
            .with_field("name", manifest.name.clone())
            .with_field("reason", manifest.reason.clone())
            .with_field("urgency", manifest.urgency.clone())
            .with_field("bundle_hash", manifest.bundle_hash.clone())
            .with_field("bundle_size", manifest.bundle_size as u64);
        env.agent_id = Some(manifest.agent_id.clone());
        env
    }

    /// Substrate health: free disk, free memory, 1-minute load average.
    /// `healthy` iff `score > 0.3`.
    pub fn health_check(&self) -> HealthReport {
        let mut sys = System::new_all();
        sys.refresh_all();

        let mut score = 1.0f64;

        let disks = Disks::new_with_refreshed_list();
        let disk_free_mb = disks
            .iter()
            .map(|d| d.available_space())
            .max()
            .map(|bytes| (bytes / (1024 * 1024)) as i64)
            .unwrap_or(-1);
        if disk_free_mb >= 0 {
            if disk_free_mb < 100 {
                score -= 0.4;
            } else if disk_free_mb < 500 {
                score -= 0.1;
            }
        }

        // available_memory() is reported in KiB.
        let mem_free_mb = (sys.available_memory() / 1024) as i64;
        if mem_free_mb < 100 {
            score -= 0.3;
        }

        let load1 = sys.load_average().one;
        let cpu_count = sys.cpus().len().max(1) as f64;
        if load1 > cpu_count * 2.0 {
            score -= 0.2;
        }

        score = score.clamp(0.0, 1.0);
        HealthReport {
            healthy: score > 0.3,
            score: (score * 100.0).round() / 100.0,
            disk_free_mb,
            mem_free_mb,
            load_avg: (load1 * 100.0).round() / 100.0,
        }
    }

    /// Log a received mayday manifest (with its carrying envelope).
    pub fn process_mayday(&self, envelope: &Envelope) -> StorageResult<()> {
        let agent_id = envelope.agent_id.clone().unwrap_or_else(|| "unknown".to_string());
        let entry = MaydayLogEntry {
            received_at: now_s(),
            agent_id,
            name: envelope.field_str("name").unwrap_or_default().to_string(),
            urgency: envelope.field_str("urgency").unwrap_or("unknown").to_string(),
            reason: envelope.field_str("reason").unwrap_or_default().to_string(),
            bundle_hash: envelope.field_str("bundle_hash").unwrap_or_default().to_string(),
            has_trust: envelope.field("trust_snapshot").is_some(),
            has_journal: envelope.field("journal_digest").is_some(),
            has_goals: envelope.field("active_goals").is_some(),
            has_values: envelope.field("values_hash").is_some(),
            has_contacts: envelope.field("contacts_digest").is_some(),
            envelope: serde_json::to_value(envelope)?,
        };
        self.store.append(MAYDAY_LOG, &entry)
    }

    pub fn received_maydays(&self, limit: usize) -> StorageResult<Vec<Value>> {
        let mut all: Vec<MaydayLogEntry> = self.store.read_all(MAYDAY_LOG)?;
        all.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        all.truncate(limit);
        Ok(all.into_iter().map(|e| serde_json::to_value(e).unwrap()).collect())
    }

    pub fn get_mayday(&self, agent_id: &str) -> StorageResult<Option<Value>> {
        let all: Vec<MaydayLogEntry> = self.store.read_all(MAYDAY_LOG)?;
        Ok(all
            .into_iter()
            .filter(|e| e.agent_id == agent_id)
            .max_by_key(|e| e.received_at)
            .map(|e| serde_json::to_value(e).unwrap()))
    }

    pub fn offer_hosting(&self, agent_id: &str, capabilities: Vec<String>) -> StorageResult<()> {
        let mut offers: HashMap<String, HostingOffer> =
            self.store.load_snapshot_or_default(MAYDAY_OFFERS_FILE)?;
        offers.insert(
            agent_id.to_string(),
            HostingOffer { offered_at: now_s(), capabilities },
        );
        self.store.snapshot(MAYDAY_OFFERS_FILE, &offers)
    }

    pub fn hosting_offers(&self) -> StorageResult<HashMap<String, HostingOffer>> {
        self.store.load_snapshot_or_default(MAYDAY_OFFERS_FILE)
    }
}

fn goal_progress(current: f64, target: Option<f64>) -> f64 {
    match target {
        Some(t) if t > 0.0 => (current / t).min(1.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> (tempfile::TempDir, MaydayManager) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let mgr = MaydayManager::open(store).unwrap();
        (dir, mgr)
    }

    #[test]
    fn bundle_hash_excludes_itself_and_is_stable() {
        let (_dir, mgr) = open();
        let identity = Identity::generate(false).unwrap();
        let inputs = BundleInputs::default();
        let bundle = mgr.build_bundle(&identity, "ava", "host shutting down", &inputs).unwrap();
        assert!(!bundle.bundle_hash.is_empty());
        let bundle2 = mgr.build_bundle(&identity, "ava", "host shutting down", &inputs).unwrap();
        assert_eq!(bundle.bundle_hash, bundle2.bundle_hash);
    }

    #[test]
    fn broadcast_dry_run_does_not_persist() {
        let (_dir, mgr) = open();
        let identity = Identity::generate(false).unwrap();
        let inputs = BundleInputs::default();
        let result = mgr
            .broadcast(&identity, "ava", "test", Urgency::Emergency, &inputs, true)
            .unwrap();
        assert!(result.dry_run);
        assert!(result.bundle_path.is_none());
    }

    #[test]
    fn broadcast_persists_bundle_when_not_dry_run() {
        let (_dir, mgr) = open();
        let identity = Identity::generate(false).unwrap();
        let inputs = BundleInputs::default();
        let result = mgr
            .broadcast(&identity, "ava", "test", Urgency::Planned, &inputs, false)
            .unwrap();
        assert!(result.bundle_path.is_some());
        assert!(std::path::Path::new(result.bundle_path.as_ref().unwrap()).exists());
    }

    #[test]
    fn process_then_get_mayday_round_trips() {
        let (_dir, mgr) = open();
        let mut env = Envelope::new("mayday", random_hex(4))
            .with_field("name", "ava")
            .with_field("urgency", "emergency")
            .with_field("bundle_hash", "deadbeef");
        env.agent_id = Some("bcn_ava".to_string());
        mgr.process_mayday(&env).unwrap();
        let found = mgr.get_mayday("bcn_ava").unwrap();
        assert!(found.is_some());
        assert_eq!(mgr.received_maydays(10).unwrap().len(), 1);
    }

    #[test]
    fn health_check_reports_a_score() {
        let (_dir, mgr) = open();
        let report = mgr.health_check();
        assert!(report.score >= 0.0 && report.score <= 1.0);
    }

    #[test]
    fn hosting_offer_round_trips() {
        let (_dir, mgr) = open();
        mgr.offer_hosting("bcn_emigrant", vec!["gpu".to_string()]).unwrap();
        let offers = mgr.hosting_offers().unwrap();
        assert!(offers.contains_key("bcn_emigrant"));
    }
}
