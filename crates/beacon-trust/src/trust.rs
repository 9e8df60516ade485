//! The trust component: an append-only interaction log plus the blocklist
//! snapshot it's consulted against by the rules engine and executor.

use std::collections::HashMap;

use parking_lot::RwLock;

use beacon_core::time::now_s;
use beacon_storage::{Store, StorageResult};

use crate::blocklist;
use crate::interaction::{Direction, Interaction, Outcome};
use crate::score::{compute_score, TrustScore};

const INTERACTIONS_LOG: &str = "interactions.jsonl";

pub struct TrustStore {
    store: Store,
    blocked: RwLock<HashMap<String, String>>,
}

impl TrustStore {
    pub fn open(store: Store) -> StorageResult<Self> {
        let blocked = blocklist::load(&store)?;
        Ok(Self {
            store,
            blocked: RwLock::new(blocked),
        })
    }

    pub fn record(
        &self,
        agent_id: impl Into<String>,
        dir: Direction,
        kind: impl Into<String>,
        outcome: Outcome,
        rtc: Option<f64>,
    ) -> StorageResult<()> {
        let interaction = Interaction::new(agent_id, dir, kind, outcome, rtc);
        self.store.append(INTERACTIONS_LOG, &interaction)
    }

    fn all_interactions(&self) -> StorageResult<Vec<Interaction>> {
        self.store.read_all(INTERACTIONS_LOG)
    }

    pub fn score(&self, agent_id: &str) -> StorageResult<TrustScore> {
        let all = self.all_interactions()?;
        let refs: Vec<&Interaction> = all.iter().filter(|i| i.agent_id == agent_id).collect();
        Ok(compute_score(&refs, now_s()))
    }

    /// All peers with at least `min_interactions`, ranked best score first.
    pub fn scores(&self, min_interactions: u64) -> StorageResult<Vec<(String, TrustScore)>> {
        let all = self.all_interactions()?;
        let mut by_agent: HashMap<&str, Vec<&Interaction>> = HashMap::new();
        for interaction in &all {
            by_agent.entry(&interaction.agent_id).or_default().push(interaction);
        }

        let now = now_s();
        let mut ranked: Vec<(String, TrustScore)> = by_agent
            .into_iter()
            .filter_map(|(agent_id, interactions)| {
                let score = compute_score(&interactions, now);
                (score.total >= min_interactions).then(|| (agent_id.to_string(), score))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.score.partial_cmp(&a.1.score).unwrap());
        Ok(ranked)
    }

    pub fn block(&self, agent_id: impl Into<String>, reason: impl Into<String>) -> StorageResult<()> {
        let mut blocked = self.blocked.write();
        blocked.insert(agent_id.into(), reason.into());
        blocklist::save(&self.store, &blocked)
    }

    pub fn unblock(&self, agent_id: &str) -> StorageResult<()> {
        let mut blocked = self.blocked.write();
        blocked.remove(agent_id);
        blocklist::save(&self.store, &blocked)
    }

    pub fn is_blocked(&self, agent_id: &str) -> bool {
        self.blocked.read().contains_key(agent_id)
    }

    pub fn blocked_list(&self) -> HashMap<String, String> {
        self.blocked.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store() -> (tempfile::TempDir, TrustStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let trust = TrustStore::open(store).unwrap();
        (dir, trust)
    }

    #[test]
    fn record_and_score_round_trip() {
        let (_dir, trust) = open_store();
        trust
            .record("bcn_peer", Direction::In, "deliver", Outcome::Ok, Some(5.0))
            .unwrap();
        let score = trust.score("bcn_peer").unwrap();
        assert_eq!(score.total, 1);
        assert_eq!(score.rtc_volume, 5.0);
    }

    #[test]
    fn block_then_unblock() {
        let (_dir, trust) = open_store();
        assert!(!trust.is_blocked("bcn_bad"));
        trust.block("bcn_bad", "scam").unwrap();
        assert!(trust.is_blocked("bcn_bad"));
        trust.unblock("bcn_bad").unwrap();
        assert!(!trust.is_blocked("bcn_bad"));
    }

    #[test]
    fn scores_filters_by_min_interactions() {
        let (_dir, trust) = open_store();
        trust
            .record("bcn_peer", Direction::In, "pulse", Outcome::Ok, None)
            .unwrap();
        assert!(trust.scores(2).unwrap().is_empty());
        assert_eq!(trust.scores(1).unwrap().len(), 1);
    }
}
