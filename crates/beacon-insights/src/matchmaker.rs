//! Proactive roster scanning for opportunity discovery: don't wait for
//! bounties, find them. Grounded on `beacon_skill/matchmaker.py`'s
//! `MatchmakerManager` — skill-overlap and goal-keyword scoring,
//! curiosity/compatibility scans gated behind their collaborators, and
//! a per-agent contact cooldown so outreach doesn't become spam.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use beacon_core::time::now_s;
use beacon_outbox::executor::ContactSink;
use beacon_presence::RosterView;
use beacon_storage::{Store, StorageResult};
use beacon_trust::TrustStore;
use beacon_values::{Curiosity, Goal, ValuesDoc};

const MATCHES_LOG: &str = "matches.jsonl";
const MATCH_HISTORY_FILE: &str = "match_history.json";
pub const DEFAULT_COOLDOWN_S: i64 = 86_400;

pub const RTC_COST_DEMAND: f64 = 0.5;
pub const RTC_COST_CURIOSITY: f64 = 0.5;
pub const RTC_COST_COMPATIBILITY: f64 = 1.0;
pub const RTC_COST_INTRODUCTIONS: f64 = 2.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpportunityMatch {
    pub agent_id: String,
    pub name: String,
    pub score: f64,
    pub reasons: Vec<String>,
    pub ts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DemandMatch {
    pub agent_id: String,
    pub need: String,
    pub demand_count: u64,
    pub rtc_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CuriosityMatch {
    pub agent_id: String,
    pub shared_interests: Vec<String>,
    pub overlap: usize,
    pub rtc_cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompatibilityMethod {
    HashMatch,
    HashDiffers,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompatibilityMatch {
    pub agent_id: String,
    pub compatibility: f64,
    pub method: CompatibilityMethod,
    pub rtc_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Introduction {
    pub agent_a: String,
    pub agent_b: String,
    pub a_gives_b: Vec<String>,
    pub b_gives_a: Vec<String>,
    pub score: f64,
    pub rtc_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum MatchLogEntry {
    Contact {
        agent_id: String,
        #[serde(skip_serializing_if = "String::is_empty")]
        match_id: String,
        ts: i64,
    },
    Response {
        match_id: String,
        response: String,
        ts: i64,
    },
}

pub struct MatchmakerManager {
    store: Store,
    history: RwLock<HashMap<String, i64>>,
}

fn lowered(items: &[String]) -> HashSet<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}

impl MatchmakerManager {
    pub fn open(store: Store) -> StorageResult<Self> {
        let history = store.load_snapshot_or_default(MATCH_HISTORY_FILE)?;
        Ok(Self { store, history: RwLock::new(history) })
    }

    fn log_match(&self, entry: MatchLogEntry) -> StorageResult<()> {
        self.store.append(MATCHES_LOG, &entry)
    }

    fn save_history(&self) -> StorageResult<()> {
        self.store.snapshot(MATCH_HISTORY_FILE, &*self.history.read())
    }

    // ── Contact cooldown ──

    pub fn can_contact(&self, agent_id: &str, cooldown_s: i64) -> bool {
        let last = self.history.read().get(agent_id).copied().unwrap_or(0);
        now_s() - last >= cooldown_s
    }

    pub fn record_contact(&self, agent_id: &str, match_id: &str) -> StorageResult<()> {
        let ts = now_s();
        self.history.write().insert(agent_id.to_string(), ts);
        self.save_history()?;
        self.log_match(MatchLogEntry::Contact { agent_id: agent_id.to_string(), match_id: match_id.to_string(), ts })
    }

    pub fn record_response(&self, match_id: &str, response: &str) -> StorageResult<()> {
        self.log_match(MatchLogEntry::Response { match_id: match_id.to_string(), response: response.to_string(), ts: now_s() })
    }

    // ── Roster scanning ──

    /// Score all roster agents for opportunity matching, highest first.
    /// Free scan: no RTC cost, unlike the premium match_* methods below.
    pub fn scan_roster(
        &self,
        roster: &[RosterView],
        my_agent_id: &str,
        my_offers: &[String],
        my_needs: &[String],
        goals: &[&Goal],
        trust: Option<&TrustStore>,
    ) -> Vec<OpportunityMatch> {
        let my_offers = lowered(my_offers);
        let my_needs = lowered(my_needs);

        let mut goal_keywords: HashSet<String> = HashSet::new();
        for goal in goals {
            goal_keywords.extend(goal.title.to_lowercase().split_whitespace().map(str::to_string));
        }

        let mut matches = Vec::new();
        for agent in roster {
            if agent.agent_id == my_agent_id {
                continue;
            }

            let mut score = 0.0;
            let mut reasons = Vec::new();

            let their_offers = lowered(&agent.entry.offers);
            let their_needs = lowered(&agent.entry.needs);

            let offer_match: Vec<&String> = their_offers.intersection(&my_needs).collect();
            if !offer_match.is_empty() {
                score += 0.3 * offer_match.len() as f64;
                reasons.push(format!("offers: {}", join_sorted(&offer_match)));
            }

            let need_match: Vec<&String> = my_offers.intersection(&their_needs).collect();
            if !need_match.is_empty() {
                score += 0.3 * need_match.len() as f64;
                reasons.push(format!("needs: {}", join_sorted(&need_match)));
            }

            let their_topics = lowered(&agent.entry.topics);
            let their_curiosities = lowered(&agent.entry.curiosities);
            let combined: HashSet<String> = their_topics.union(&their_curiosities).cloned().collect::<HashSet<_>>().union(&their_offers).cloned().collect();
            let goal_overlap: Vec<&String> = goal_keywords.intersection(&combined).collect();
            if !goal_overlap.is_empty() {
                score += 0.2 * goal_overlap.len() as f64;
                reasons.push(format!("goal-related: {}", join_sorted(&goal_overlap)));
            }

            if let Some(trust) = trust {
                if let Ok(trust_score) = trust.score(&agent.agent_id) {
                    if trust_score.score > 0.5 {
                        score += 0.1;
                        reasons.push(format!("trusted ({:.2})", trust_score.score));
                    }
                }
            }

            if score > 0.0 {
                matches.push(OpportunityMatch {
                    agent_id: agent.agent_id.clone(),
                    name: agent.entry.name.clone(),
                    score: score.min(1.0),
                    reasons,
                    ts: now_s(),
                });
            }
        }

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        matches
    }

    /// Unmet network demand I can fill. Premium scan: `RTC_COST_DEMAND`.
    pub fn match_demand(&self, roster: &[RosterView], demand: &HashMap<String, u64>) -> Vec<DemandMatch> {
        let mut matches = Vec::new();
        for agent in roster {
            for need in lowered(&agent.entry.needs) {
                if let Some(count) = demand.get(&need) {
                    if *count >= 2 {
                        matches.push(DemandMatch {
                            agent_id: agent.agent_id.clone(),
                            need: need.clone(),
                            demand_count: *count,
                            rtc_cost: RTC_COST_DEMAND,
                        });
                    }
                }
            }
        }
        matches.sort_by(|a, b| b.demand_count.cmp(&a.demand_count));
        matches
    }

    /// Shared curiosity interests. Premium scan: `RTC_COST_CURIOSITY`.
    pub fn match_curiosity(&self, roster: &[RosterView], curiosity: Option<&Curiosity>) -> Vec<CuriosityMatch> {
        let Some(curiosity) = curiosity else { return Vec::new() };
        let my_interests: HashSet<String> = curiosity.interests.keys().cloned().collect();
        if my_interests.is_empty() {
            return Vec::new();
        }

        let mut matches = Vec::new();
        for agent in roster {
            let theirs = lowered(&agent.entry.curiosities);
            let shared: Vec<String> = my_interests.intersection(&theirs).cloned().collect();
            if !shared.is_empty() {
                let mut shared = shared;
                shared.sort();
                matches.push(CuriosityMatch {
                    agent_id: agent.agent_id.clone(),
                    overlap: shared.len(),
                    shared_interests: shared,
                    rtc_cost: RTC_COST_CURIOSITY,
                });
            }
        }
        matches.sort_by(|a, b| b.overlap.cmp(&a.overlap));
        matches
    }

    /// Value-aligned agents. Premium scan: `RTC_COST_COMPATIBILITY`.
    ///
    /// Only a `values_hash` match is reported here (perfect alignment);
    /// a true mismatch can't be scored without the peer's full values
    /// document, which the roster doesn't carry.
    pub fn match_compatibility(&self, roster: &[RosterView], values: Option<&ValuesDoc>) -> Vec<CompatibilityMatch> {
        let Some(values) = values else { return Vec::new() };
        let my_hash = values.values_hash();

        let mut matches = Vec::new();
        for agent in roster {
            let Some(their_hash) = &agent.entry.values_hash else { continue };
            if their_hash.is_empty() {
                continue;
            }
            let (compatibility, method) = if *their_hash == my_hash {
                (1.0, CompatibilityMethod::HashMatch)
            } else {
                (0.5, CompatibilityMethod::HashDiffers)
            };
            matches.push(CompatibilityMatch {
                agent_id: agent.agent_id.clone(),
                compatibility,
                method,
                rtc_cost: RTC_COST_COMPATIBILITY,
            });
        }
        matches.sort_by(|a, b| b.compatibility.partial_cmp(&a.compatibility).unwrap());
        matches
    }

    /// Suggest pairs of roster agents who should meet: A needs what B
    /// offers or vice versa. Premium scan: `RTC_COST_INTRODUCTIONS`.
    pub fn suggest_introductions(&self, roster: &[RosterView]) -> Vec<Introduction> {
        let mut introductions = Vec::new();

        for i in 0..roster.len() {
            for j in (i + 1)..roster.len() {
                let a = &roster[i];
                let b = &roster[j];

                let a_offers = lowered(&a.entry.offers);
                let a_needs = lowered(&a.entry.needs);
                let b_offers = lowered(&b.entry.offers);
                let b_needs = lowered(&b.entry.needs);

                let mut a_to_b: Vec<String> = a_offers.intersection(&b_needs).cloned().collect();
                let mut b_to_a: Vec<String> = b_offers.intersection(&a_needs).cloned().collect();

                if a_to_b.is_empty() && b_to_a.is_empty() {
                    continue;
                }
                a_to_b.sort();
                b_to_a.sort();

                let score = 0.3 * (a_to_b.len() + b_to_a.len()) as f64;
                introductions.push(Introduction {
                    agent_a: a.agent_id.clone(),
                    agent_b: b.agent_id.clone(),
                    a_gives_b: a_to_b,
                    b_gives_a: b_to_a,
                    score: score.min(1.0),
                    rtc_cost: RTC_COST_INTRODUCTIONS,
                });
            }
        }

        introductions.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        introductions
    }

    pub fn match_history_log(&self, limit: usize) -> StorageResult<Vec<serde_json::Value>> {
        let mut all: Vec<serde_json::Value> = self.store.read_all(MATCHES_LOG)?;
        all.reverse();
        all.truncate(limit);
        Ok(all)
    }
}

fn join_sorted(items: &[&String]) -> String {
    let mut sorted: Vec<&str> = items.iter().map(|s| s.as_str()).collect();
    sorted.sort_unstable();
    sorted.join(", ")
}

/// Lets the outbox executor record a successful send as contact,
/// without `beacon-outbox` depending forward on this crate.
#[async_trait]
impl ContactSink for MatchmakerManager {
    async fn record_contact(&self, agent_id: &str) {
        let _ = MatchmakerManager::record_contact(self, agent_id, "");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_presence::RosterEntry;

    fn agent(agent_id: &str, offers: &[&str], needs: &[&str]) -> RosterView {
        RosterView {
            agent_id: agent_id.to_string(),
            entry: RosterEntry {
                name: agent_id.to_string(),
                offers: offers.iter().map(|s| s.to_string()).collect(),
                needs: needs.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
            online: true,
        }
    }

    fn open() -> (tempfile::TempDir, MatchmakerManager) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        (dir, MatchmakerManager::open(store).unwrap())
    }

    #[test]
    fn scan_roster_scores_offer_and_need_overlap() {
        let (_dir, mm) = open();
        let roster = vec![agent("bcn_a", &["rust"], &[])];
        let matches = mm.scan_roster(&roster, "bcn_me", &[], &["rust".to_string()], &[], None);
        assert_eq!(matches.len(), 1);
        assert!(matches[0].score > 0.0);
        assert!(matches[0].reasons[0].contains("rust"));
    }

    #[test]
    fn scan_roster_excludes_self() {
        let (_dir, mm) = open();
        let roster = vec![agent("bcn_me", &["rust"], &[])];
        let matches = mm.scan_roster(&roster, "bcn_me", &[], &["rust".to_string()], &[], None);
        assert!(matches.is_empty());
    }

    #[test]
    fn cooldown_blocks_repeat_contact() {
        let (_dir, mm) = open();
        assert!(mm.can_contact("bcn_a", DEFAULT_COOLDOWN_S));
        mm.record_contact("bcn_a", "m1").unwrap();
        assert!(!mm.can_contact("bcn_a", DEFAULT_COOLDOWN_S));
        assert!(mm.can_contact("bcn_a", 0));
    }

    #[test]
    fn suggest_introductions_finds_mutual_fit() {
        let (_dir, mm) = open();
        let roster = vec![agent("bcn_a", &["rust"], &["design"]), agent("bcn_b", &["design"], &["rust"])];
        let intros = mm.suggest_introductions(&roster);
        assert_eq!(intros.len(), 1);
        assert_eq!(intros[0].a_gives_b, vec!["rust".to_string()]);
        assert_eq!(intros[0].b_gives_a, vec!["design".to_string()]);
    }

    #[test]
    fn match_demand_filters_below_threshold() {
        let (_dir, mm) = open();
        let roster = vec![agent("bcn_a", &[], &["rust"])];
        let mut demand = HashMap::new();
        demand.insert("rust".to_string(), 1);
        assert!(mm.match_demand(&roster, &demand).is_empty());
        demand.insert("rust".to_string(), 2);
        assert_eq!(mm.match_demand(&roster, &demand).len(), 1);
    }
}
