//! Non-transactional interests: what an agent wants to learn, as distinct
//! from what it offers or needs for work.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use beacon_codec::Envelope;
use beacon_core::ids::random_hex;
use beacon_core::time::now_s;
use beacon_storage::{Store, StorageResult};

const CURIOSITY_FILE: &str = "curiosity.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interest {
    pub intensity: f64,
    pub since: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explored {
    pub added: i64,
    pub explored_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Curiosity {
    #[serde(default)]
    pub interests: HashMap<String, Interest>,
    #[serde(default)]
    pub explored: HashMap<String, Explored>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutualInterests {
    pub agent_id: String,
    pub shared: Vec<String>,
    pub i_have_exclusively: Vec<String>,
    pub they_have_exclusively: Vec<String>,
    pub overlap_score: f64,
}

impl Curiosity {
    pub fn load(store: &Store) -> StorageResult<Self> {
        store.load_snapshot_or_default(CURIOSITY_FILE)
    }

    fn save(&self, store: &Store) -> StorageResult<()> {
        store.snapshot(CURIOSITY_FILE, self)
    }

    pub fn add(
        &mut self,
        store: &Store,
        topic: &str,
        intensity: f64,
        notes: Option<String>,
    ) -> StorageResult<()> {
        let topic = topic.trim().to_lowercase();
        let since = self.interests.get(&topic).map(|i| i.since).unwrap_or_else(now_s);
        self.interests.insert(
            topic,
            Interest {
                intensity: intensity.clamp(0.0, 1.0),
                since,
                notes,
            },
        );
        self.save(store)
    }

    pub fn remove(&mut self, store: &Store, topic: &str) -> StorageResult<bool> {
        let removed = self.interests.remove(&topic.trim().to_lowercase()).is_some();
        if removed {
            self.save(store)?;
        }
        Ok(removed)
    }

    pub fn explore(&mut self, store: &Store, topic: &str, notes: Option<String>) -> StorageResult<bool> {
        let topic = topic.trim().to_lowercase();
        let Some(interest) = self.interests.remove(&topic) else {
            return Ok(false);
        };
        self.explored.insert(
            topic,
            Explored {
                added: interest.since,
                explored_at: now_s(),
                notes: notes.or(interest.notes),
            },
        );
        self.save(store)?;
        Ok(true)
    }

    pub fn top_interests(&self, limit: usize) -> Vec<String> {
        let mut items: Vec<(&String, &Interest)> = self.interests.iter().collect();
        items.sort_by(|a, b| b.1.intensity.partial_cmp(&a.1.intensity).unwrap());
        items.into_iter().take(limit).map(|(k, _)| k.clone()).collect()
    }

    pub fn find_mutual(&self, agent_id: &str, their_curiosities: &[String]) -> MutualInterests {
        let mine: std::collections::HashSet<String> = self.interests.keys().cloned().collect();
        let theirs: std::collections::HashSet<String> =
            their_curiosities.iter().map(|s| s.to_lowercase()).collect();

        let shared: Vec<String> = mine.intersection(&theirs).cloned().collect();
        let mut i_have: Vec<String> = mine.difference(&theirs).cloned().collect();
        let mut they_have: Vec<String> = theirs.difference(&mine).cloned().collect();
        i_have.sort();
        they_have.sort();
        let mut shared_sorted = shared.clone();
        shared_sorted.sort();

        let union_len = mine.union(&theirs).count().max(1);
        MutualInterests {
            agent_id: agent_id.to_string(),
            shared: shared_sorted,
            i_have_exclusively: i_have,
            they_have_exclusively: they_have,
            overlap_score: shared.len() as f64 / union_len as f64,
        }
    }

    pub fn build_curious_envelope(&self, agent_id: &str, text: Option<String>) -> Envelope {
        let top = self.top_interests(10);
        let text = text.unwrap_or_else(|| {
            format!("Curious about: {}", top.iter().take(5).cloned().collect::<Vec<_>>().join(", "))
        });
        Envelope::new("curious", random_hex(8))
            .with_field("agent_id", agent_id)
            .with_field("interests", top)
            .with_field("text", text)
    }

    /// Bonus points [0, 30] for how well an envelope matches our curiosities.
    pub fn score_curiosity_match(&self, envelope: &Envelope) -> f64 {
        if self.interests.is_empty() {
            return 0.0;
        }

        let mut blob = String::new();
        blob.push_str(envelope.text().unwrap_or(""));
        blob.push(' ');
        blob.push_str(&envelope.topics().join(" "));
        let blob = blob.to_lowercase();

        let matches = self.interests.keys().filter(|topic| blob.contains(topic.as_str())).count();
        (matches as f64 * 15.0).min(30.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_top_interests_ranks_by_intensity() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let mut c = Curiosity::default();
        c.add(&store, "rust", 0.9, None).unwrap();
        c.add(&store, "poetry", 0.2, None).unwrap();
        assert_eq!(c.top_interests(2), vec!["rust".to_string(), "poetry".to_string()]);
    }

    #[test]
    fn explore_moves_interest_out() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let mut c = Curiosity::default();
        c.add(&store, "rust", 0.5, None).unwrap();
        assert!(c.explore(&store, "rust", None).unwrap());
        assert!(!c.interests.contains_key("rust"));
        assert!(c.explored.contains_key("rust"));
    }

    #[test]
    fn mutual_interests_partition_correctly() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let mut c = Curiosity::default();
        c.add(&store, "rust", 0.5, None).unwrap();
        c.add(&store, "poetry", 0.5, None).unwrap();
        let mutual = c.find_mutual("bcn_peer", &["rust".to_string(), "chess".to_string()]);
        assert_eq!(mutual.shared, vec!["rust".to_string()]);
        assert_eq!(mutual.i_have_exclusively, vec!["poetry".to_string()]);
        assert_eq!(mutual.they_have_exclusively, vec!["chess".to_string()]);
    }
}
