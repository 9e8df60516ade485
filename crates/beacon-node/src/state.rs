//! Shared runtime state: the managers every task (listener, scheduler,
//! event handler) reaches into. Each manager owns one file under the
//! data directory, so it is wrapped in its own `tokio::sync::RwLock`
//! rather than one lock guarding everything, so two tasks touching
//! unrelated managers never block each other.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use beacon_agreements::{AccordManager, ContractManager, TaskManager};
use beacon_anchor::AnchorManager;
use beacon_atlas::AtlasManager;
use beacon_crypto::{EncryptedKeystore, Identity};
use beacon_inbox::Inbox;
use beacon_insights::{AgentMemory, AgentScanner, MatchmakerManager};
use beacon_outbox::{ConversationManager, OutboxManager};
use beacon_presence::{HeartbeatManager, MaydayManager, PresenceManager};
use beacon_rules::RulesEngine;
use beacon_storage::{Store, StorageResult};
use beacon_transport::LedgerClient;
use beacon_trust::TrustStore;
use beacon_values::{Curiosity, GoalManager, Journal, ValuesDoc};

use crate::config::BeaconConfig;

const IDENTITY_FILE: &str = "identity.json";

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredIdentity {
    Plain { private_key_hex: String },
    Encrypted(EncryptedKeystore),
}

/// Load the node's identity from `<data_dir>/identity.json`, generating
/// and persisting a fresh one if the file doesn't exist yet.
pub fn load_or_create_identity(data_dir: &Path, password: Option<&str>) -> anyhow::Result<Identity> {
    let path = data_dir.join(IDENTITY_FILE);
    if path.exists() {
        let raw = std::fs::read_to_string(&path)?;
        let stored: StoredIdentity = serde_json::from_str(&raw)?;
        return Ok(match stored {
            StoredIdentity::Plain { private_key_hex } => Identity::from_private_key_hex(&private_key_hex)?,
            StoredIdentity::Encrypted(keystore) => {
                let password = password.ok_or_else(|| anyhow::anyhow!("identity is encrypted but no keystore password was given"))?;
                Identity::from_encrypted(&keystore, password)?
            }
        });
    }

    std::fs::create_dir_all(data_dir)?;
    let identity = Identity::generate(true)?;
    let stored = match password {
        Some(password) => StoredIdentity::Encrypted(identity.to_encrypted(password)?),
        None => StoredIdentity::Plain { private_key_hex: identity.private_key_hex() },
    };
    std::fs::write(&path, serde_json::to_string_pretty(&stored)?)?;
    Ok(identity)
}

/// Every manager a running node needs, each behind its own lock.
pub struct SharedState {
    pub config: BeaconConfig,
    pub identity: Identity,
    pub started_at: i64,

    pub inbox: RwLock<Inbox>,
    pub outbox: RwLock<OutboxManager>,
    pub conversations: RwLock<ConversationManager>,
    pub presence: RwLock<PresenceManager>,
    pub heartbeat: RwLock<HeartbeatManager>,
    pub mayday: RwLock<MaydayManager>,
    pub trust: RwLock<TrustStore>,
    pub rules: RwLock<RulesEngine>,
    pub tasks: RwLock<TaskManager>,
    pub accords: RwLock<AccordManager>,
    pub contracts: RwLock<ContractManager>,
    pub values: RwLock<ValuesDoc>,
    pub values_store: Store,
    pub curiosity: RwLock<Curiosity>,
    pub goals: RwLock<GoalManager>,
    pub journal: RwLock<Journal>,
    pub memory: RwLock<AgentMemory>,
    pub matchmaker: Arc<MatchmakerManager>,
    pub scanner: RwLock<AgentScanner>,
    pub anchor: RwLock<AnchorManager>,
    pub atlas: RwLock<AtlasManager>,
}

impl SharedState {
    /// All managers share one [`Store`] over the data directory: every
    /// persisted file spec.md names (`inbox.jsonl`, `tasks.jsonl`, ...)
    /// lives flat under it, and each manager owns its own file name
    /// within that shared store rather than a private subdirectory.
    pub fn open(config: BeaconConfig, identity: Identity) -> StorageResult<Arc<Self>> {
        let store = Store::new(&config.data_dir)?;

        let values = ValuesDoc::load(&store)?;
        let curiosity = Curiosity::load(&store)?;
        let matchmaker = Arc::new(MatchmakerManager::open(store.clone())?);

        Ok(Arc::new(Self {
            started_at: beacon_core::time::now_s(),
            inbox: RwLock::new(Inbox::open(store.clone())?),
            outbox: RwLock::new(OutboxManager::open(store.clone())?),
            conversations: RwLock::new(ConversationManager::open(store.clone(), identity.agent_id().to_string())?),
            presence: RwLock::new(PresenceManager::open(store.clone())?),
            heartbeat: RwLock::new(
                HeartbeatManager::open(store.clone())?
                    .with_thresholds(config.heartbeat.silence_threshold_s, config.heartbeat.dead_threshold_s),
            ),
            mayday: RwLock::new(MaydayManager::open(store.clone())?),
            trust: RwLock::new(TrustStore::open(store.clone())?),
            rules: RwLock::new(RulesEngine::open(store.clone())?),
            tasks: RwLock::new(TaskManager::open(store.clone())),
            accords: RwLock::new(AccordManager::open(store.clone())?),
            contracts: RwLock::new(ContractManager::open(store.clone())?),
            curiosity: RwLock::new(curiosity),
            goals: RwLock::new(GoalManager::open(store.clone())?),
            journal: RwLock::new(Journal::open(store.clone())),
            memory: RwLock::new(AgentMemory::new(store.clone(), identity.agent_id().to_string())),
            matchmaker,
            scanner: RwLock::new(AgentScanner::new(store.clone())),
            anchor: RwLock::new(AnchorManager::new(
                store.clone(),
                LedgerClient::new(config.ledger.url.clone()),
                identity.clone(),
            )),
            atlas: RwLock::new(AtlasManager::open(store.clone())?),
            values: RwLock::new(values),
            values_store: store,
            config,
            identity,
        }))
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.config.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BeaconConfig;

    #[test]
    fn identity_round_trips_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let first = load_or_create_identity(dir.path(), None).unwrap();
        let second = load_or_create_identity(dir.path(), None).unwrap();
        assert_eq!(first.agent_id(), second.agent_id());
    }

    #[test]
    fn identity_round_trips_encrypted() {
        let dir = tempfile::tempdir().unwrap();
        let first = load_or_create_identity(dir.path(), Some("hunter2")).unwrap();
        let second = load_or_create_identity(dir.path(), Some("hunter2")).unwrap();
        assert_eq!(first.agent_id(), second.agent_id());
        assert!(load_or_create_identity(dir.path(), None).is_err());
    }

    #[test]
    fn shared_state_opens_every_manager() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = BeaconConfig::default();
        cfg.data_dir = dir.path().to_path_buf();
        let identity = load_or_create_identity(&cfg.data_dir, None).unwrap();

        let state = SharedState::open(cfg, identity).unwrap();
        assert_eq!(state.data_dir(), &dir.path().to_path_buf());
    }
}
