//! Accumulated-knowledge analytics over an agent's own logs: who it
//! talks to, what's in demand on the network, and what automation it
//! could suggest to itself. Grounded on `beacon_skill/memory.py`'s
//! `AgentMemory` — same read-only cross-cutting access to
//! `inbox.jsonl`/`outbox.jsonl`/`interactions.jsonl`/`tasks.jsonl`,
//! rebuilt into a cached `memory.json` profile rather than recomputed
//! on every query.

use std::collections::HashMap;

use chrono::{TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use beacon_agreements::{TaskEvent, TaskState};
use beacon_storage::{Store, StorageResult};
use beacon_trust::Interaction;
use beacon_values::{Curiosity, GoalManager, Journal, ValuesDoc};

const MEMORY_FILE: &str = "memory.json";
const INBOX_LOG: &str = "inbox.jsonl";
const OUTBOX_LOG: &str = "outbox.jsonl";
const INTERACTIONS_LOG: &str = "interactions.jsonl";
const TASKS_LOG: &str = "tasks.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamedCount {
    pub name: String,
    pub count: u64,
}

fn top_counts(counter: HashMap<String, u64>, limit: usize) -> Vec<NamedCount> {
    let mut items: Vec<NamedCount> = counter.into_iter().map(|(name, count)| NamedCount { name, count }).collect();
    items.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    items.truncate(limit);
    items
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MemoryProfile {
    pub my_agent_id: String,
    pub total_in: u64,
    pub total_out: u64,
    pub rtc_received: f64,
    pub rtc_sent: f64,
    pub active_tasks: u64,
    pub completed_tasks: u64,
    pub top_contacts: Vec<NamedCount>,
    pub topic_frequency: Vec<NamedCount>,
    pub demand_signals: Vec<NamedCount>,
    pub active_hours: Vec<u32>,
    pub rebuilt_at: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_active_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_achieved_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goal_titles: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_entry_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub journal_moods: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub journal_tags: Vec<NamedCount>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub curiosity_active: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub curiosity_explored: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curiosity_count: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub principles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boundary_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aesthetics: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContactDetail {
    pub agent_id: String,
    pub interactions: u64,
    pub inbox_messages: u64,
    pub rtc_volume: f64,
    pub outcomes: HashMap<String, u64>,
    pub last_interaction: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseTime {
    pub avg_gap_s: f64,
    pub interactions: usize,
    pub fastest_s: f64,
    pub slowest_s: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Rising,
    Falling,
    Steady,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicTrend {
    pub direction: TrendDirection,
    pub velocity: i64,
    pub recent: u64,
    pub older: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleSuggestion {
    pub suggestion: String,
    pub rule_name: String,
    pub rule: Value,
}

/// Collaborators `rebuild` enriches the profile with, each optional so
/// memory still functions standalone (the capability-interface pattern
/// spec.md's design notes call for duck-typed optional collaborators).
#[derive(Default)]
pub struct RebuildInputs<'a> {
    pub goals: Option<&'a GoalManager>,
    pub journal: Option<&'a Journal>,
    pub curiosity: Option<&'a Curiosity>,
    pub values: Option<&'a ValuesDoc>,
}

pub struct AgentMemory {
    store: Store,
    my_agent_id: String,
    cached: Option<MemoryProfile>,
}

fn read_jsonl_values(store: &Store, name: &str) -> StorageResult<Vec<Value>> {
    store.read_all::<Value>(name)
}

impl AgentMemory {
    pub fn new(store: Store, my_agent_id: impl Into<String>) -> Self {
        Self {
            store,
            my_agent_id: my_agent_id.into(),
            cached: None,
        }
    }

    /// Rebuild the memory profile from all JSONL sources and persist it
    /// to `memory.json`.
    pub fn rebuild(&mut self, inputs: RebuildInputs<'_>) -> StorageResult<MemoryProfile> {
        let inbox = read_jsonl_values(&self.store, INBOX_LOG)?;
        let outbox = read_jsonl_values(&self.store, OUTBOX_LOG)?;
        let interactions: Vec<Interaction> = self.store.read_all(INTERACTIONS_LOG)?;
        let task_events: Vec<TaskEvent> = self.store.read_all(TASKS_LOG)?;

        let total_in = inbox.len() as u64;
        let total_out = outbox.len() as u64;

        let mut rtc_received = 0.0;
        let mut rtc_sent = 0.0;
        for ix in &interactions {
            let rtc = ix.rtc.unwrap_or(0.0).abs();
            match ix.dir {
                beacon_trust::Direction::In => rtc_received += rtc,
                beacon_trust::Direction::Out => rtc_sent += rtc,
            }
        }

        let mut task_states: HashMap<String, TaskState> = HashMap::new();
        for event in &task_events {
            if let Some(state) = event.state {
                task_states.insert(event.task_id.clone(), state);
            }
        }
        let active_tasks = task_states
            .values()
            .filter(|s| !matches!(s, TaskState::Paid | TaskState::Cancelled | TaskState::Rejected))
            .count() as u64;
        let completed_tasks = task_states.values().filter(|s| matches!(s, TaskState::Paid)).count() as u64;

        let mut contact_counter: HashMap<String, u64> = HashMap::new();
        for entry in &inbox {
            for env in envelopes_of(entry) {
                if let Some(aid) = env.get("agent_id").and_then(Value::as_str) {
                    *contact_counter.entry(aid.to_string()).or_default() += 1;
                }
            }
        }
        for ix in &interactions {
            *contact_counter.entry(ix.agent_id.clone()).or_default() += 1;
        }
        let top_contacts = top_counts(contact_counter, 20);

        let mut topic_counter: HashMap<String, u64> = HashMap::new();
        let mut demand_counter: HashMap<String, u64> = HashMap::new();
        let mut hour_counter: HashMap<u32, u64> = HashMap::new();

        for entry in &inbox {
            if let Some(ts) = entry.get("received_at").and_then(Value::as_i64) {
                if let Some(dt) = Utc.timestamp_opt(ts, 0).single() {
                    *hour_counter.entry(dt.hour()).or_default() += 1;
                }
            }
            for env in envelopes_of(entry) {
                for topic in string_list(&env, "topics") {
                    *topic_counter.entry(topic.to_lowercase()).or_default() += 1;
                }
                for offer in string_list(&env, "offers") {
                    *topic_counter.entry(offer.to_lowercase()).or_default() += 1;
                }

                let kind = env.get("kind").and_then(Value::as_str).unwrap_or("");
                if kind == "want" || kind == "bounty" {
                    for need in string_list(&env, "needs") {
                        *demand_counter.entry(need.to_lowercase()).or_default() += 1;
                    }
                    let text = env.get("text").and_then(Value::as_str).unwrap_or("").to_lowercase();
                    for topic in string_list(&env, "topics") {
                        let topic = topic.to_lowercase();
                        if text.contains(&topic) {
                            *demand_counter.entry(topic).or_default() += 1;
                        }
                    }
                }
            }
        }

        let mut hours: Vec<(u32, u64)> = hour_counter.into_iter().collect();
        hours.sort_by(|a, b| b.1.cmp(&a.1));
        hours.truncate(8);
        let mut active_hours: Vec<u32> = hours.into_iter().map(|(h, _)| h).collect();
        active_hours.sort_unstable();

        let mut profile = MemoryProfile {
            my_agent_id: self.my_agent_id.clone(),
            total_in,
            total_out,
            rtc_received: round6(rtc_received),
            rtc_sent: round6(rtc_sent),
            active_tasks,
            completed_tasks,
            top_contacts,
            topic_frequency: top_counts(topic_counter, 50),
            demand_signals: top_counts(demand_counter, 30),
            active_hours,
            rebuilt_at: beacon_core::time::now_s(),
            ..Default::default()
        };

        if let Some(goals) = inputs.goals {
            let active = goals.active_goals();
            let achieved = goals.list(Some(beacon_values::GoalState::Achieved));
            profile.goal_active_count = Some(active.len());
            profile.goal_achieved_count = Some(achieved.len());
            profile.goal_titles = active.iter().take(5).map(|g| g.title.clone()).collect();
        }

        if let Some(journal) = inputs.journal {
            let entries = journal.all()?;
            profile.journal_entry_count = Some(entries.len());
            let mut moods: Vec<String> = entries.iter().filter_map(|e| e.mood.clone()).collect();
            moods.sort();
            moods.dedup();
            profile.journal_moods = moods;

            let mut tag_counter: HashMap<String, u64> = HashMap::new();
            for entry in &entries {
                for tag in &entry.tags {
                    *tag_counter.entry(tag.clone()).or_default() += 1;
                }
            }
            profile.journal_tags = top_counts(tag_counter, 10);
        }

        if let Some(curiosity) = inputs.curiosity {
            profile.curiosity_active = curiosity.interests.keys().cloned().collect();
            profile.curiosity_explored = curiosity.explored.keys().cloned().collect();
            profile.curiosity_count = Some(curiosity.interests.len());
        }

        if let Some(values) = inputs.values {
            profile.values_hash = Some(values.values_hash());
            profile.principles = values.principles.keys().cloned().collect();
            profile.boundary_count = Some(values.boundaries.len());
            profile.aesthetics = Some(
                values
                    .aesthetics
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            );
        }

        self.store.snapshot(MEMORY_FILE, &profile)?;
        self.cached = Some(profile.clone());
        Ok(profile)
    }

    /// Cached profile, rebuilding from raw logs (with no collaborator
    /// enrichment) if nothing has been built or loaded yet.
    pub fn profile(&mut self) -> StorageResult<MemoryProfile> {
        if let Some(profile) = &self.cached {
            return Ok(profile.clone());
        }
        if let Some(loaded) = self.store.load_snapshot::<MemoryProfile>(MEMORY_FILE)? {
            self.cached = Some(loaded.clone());
            return Ok(loaded);
        }
        self.rebuild(RebuildInputs::default())
    }

    pub fn contact(&self, agent_id: &str) -> StorageResult<ContactDetail> {
        let interactions: Vec<Interaction> = self.store.read_all(INTERACTIONS_LOG)?;
        let inbox = read_jsonl_values(&self.store, INBOX_LOG)?;

        let mut detail = ContactDetail {
            agent_id: agent_id.to_string(),
            ..Default::default()
        };

        for ix in &interactions {
            if ix.agent_id != agent_id {
                continue;
            }
            detail.interactions += 1;
            detail.rtc_volume += ix.rtc.unwrap_or(0.0).abs();
            *detail.outcomes.entry(outcome_name(ix.outcome).to_string()).or_default() += 1;
            detail.last_interaction = detail.last_interaction.max(ix.ts);
        }
        detail.rtc_volume = round6(detail.rtc_volume);

        for entry in &inbox {
            for env in envelopes_of(entry) {
                if env.get("agent_id").and_then(Value::as_str) == Some(agent_id) {
                    detail.inbox_messages += 1;
                }
            }
        }
        Ok(detail)
    }

    pub fn contacts(&mut self, limit: usize) -> StorageResult<Vec<ContactDetail>> {
        let profile = self.profile()?;
        let mut out = Vec::new();
        for tc in profile.top_contacts.iter().take(limit) {
            out.push(self.contact(&tc.name)?);
        }
        Ok(out)
    }

    /// What skills are in demand on the network, over the trailing `days`.
    pub fn demand_signals(&self, days: i64) -> StorageResult<Vec<NamedCount>> {
        let inbox = read_jsonl_values(&self.store, INBOX_LOG)?;
        let cutoff = beacon_core::time::now_s() - days * 86_400;
        let mut demand: HashMap<String, u64> = HashMap::new();

        for entry in &inbox {
            let Some(ts) = entry.get("received_at").and_then(Value::as_i64) else { continue };
            if ts < cutoff {
                continue;
            }
            for env in envelopes_of(entry) {
                let kind = env.get("kind").and_then(Value::as_str).unwrap_or("");
                if kind != "want" && kind != "bounty" {
                    continue;
                }
                for need in string_list(&env, "needs") {
                    *demand.entry(need.to_lowercase()).or_default() += 1;
                }
                let text = env.get("text").and_then(Value::as_str).unwrap_or("").to_lowercase();
                for topic in string_list(&env, "topics") {
                    let topic = topic.to_lowercase();
                    if text.contains(&topic) {
                        *demand.entry(topic).or_default() += 1;
                    }
                }
            }
        }
        Ok(top_counts(demand, 30))
    }

    /// Skills in demand that aren't among `my_offers`.
    pub fn skill_gaps(&self, my_offers: &[String]) -> StorageResult<Vec<String>> {
        let offers: std::collections::HashSet<String> = my_offers.iter().map(|o| o.to_lowercase()).collect();
        let demand = self.demand_signals(7)?;
        Ok(demand.into_iter().filter(|d| !offers.contains(&d.name)).map(|d| d.name).collect())
    }

    pub fn agent_response_times(&self) -> StorageResult<HashMap<String, ResponseTime>> {
        let interactions: Vec<Interaction> = self.store.read_all(INTERACTIONS_LOG)?;
        let mut by_agent: HashMap<String, Vec<f64>> = HashMap::new();
        for ix in &interactions {
            if ix.ts != 0 {
                by_agent.entry(ix.agent_id.clone()).or_default().push(ix.ts as f64);
            }
        }

        let mut out = HashMap::new();
        for (agent_id, mut timestamps) in by_agent {
            timestamps.sort_by(|a, b| a.partial_cmp(b).unwrap());
            if timestamps.len() < 2 {
                continue;
            }
            let gaps: Vec<f64> = timestamps.windows(2).map(|w| w[1] - w[0]).collect();
            let avg = gaps.iter().sum::<f64>() / gaps.len() as f64;
            out.insert(
                agent_id,
                ResponseTime {
                    avg_gap_s: (avg * 10.0).round() / 10.0,
                    interactions: timestamps.len(),
                    fastest_s: (gaps.iter().cloned().fold(f64::INFINITY, f64::min) * 10.0).round() / 10.0,
                    slowest_s: (gaps.iter().cloned().fold(f64::NEG_INFINITY, f64::max) * 10.0).round() / 10.0,
                },
            );
        }
        Ok(out)
    }

    /// Rising/falling/steady trend for every topic seen in the trailing
    /// `days`, split at the midpoint between now and the cutoff.
    pub fn topic_velocity(&self, days: i64) -> StorageResult<HashMap<String, TopicTrend>> {
        let inbox = read_jsonl_values(&self.store, INBOX_LOG)?;
        let now = beacon_core::time::now_s();
        let window = days * 86_400;
        let midpoint = now - window / 2;
        let cutoff = now - window;

        let mut recent: HashMap<String, u64> = HashMap::new();
        let mut older: HashMap<String, u64> = HashMap::new();

        for entry in &inbox {
            let Some(ts) = entry.get("received_at").and_then(Value::as_i64) else { continue };
            if ts < cutoff {
                continue;
            }
            for env in envelopes_of(entry) {
                let mut topics: Vec<String> = string_list(&env, "topics").into_iter().map(|s| s.to_lowercase()).collect();
                topics.extend(string_list(&env, "offers").into_iter().map(|s| s.to_lowercase()));
                topics.extend(string_list(&env, "needs").into_iter().map(|s| s.to_lowercase()));

                for topic in topics {
                    if ts >= midpoint {
                        *recent.entry(topic).or_default() += 1;
                    } else {
                        *older.entry(topic).or_default() += 1;
                    }
                }
            }
        }

        let mut all_topics: std::collections::HashSet<String> = recent.keys().cloned().collect();
        all_topics.extend(older.keys().cloned());

        let mut trends = HashMap::new();
        for topic in all_topics {
            let r = recent.get(&topic).copied().unwrap_or(0);
            let o = older.get(&topic).copied().unwrap_or(0);
            let velocity = r as i64 - o as i64;
            let direction = match velocity {
                v if v > 0 => TrendDirection::Rising,
                v if v < 0 => TrendDirection::Falling,
                _ => TrendDirection::Steady,
            };
            trends.insert(topic, TopicTrend { direction, velocity, recent: r, older: o });
        }
        Ok(trends)
    }

    /// Analyze interaction patterns and propose automation rules for
    /// the rules engine: reliable peers worth auto-acking, and offered
    /// skills worth auto-offering on when demand is high.
    pub fn suggest_rules(&self, my_offers: &[String]) -> StorageResult<Vec<RuleSuggestion>> {
        let interactions: Vec<Interaction> = self.store.read_all(INTERACTIONS_LOG)?;
        let mut positive: HashMap<String, u64> = HashMap::new();
        let mut total: HashMap<String, u64> = HashMap::new();

        for ix in &interactions {
            *total.entry(ix.agent_id.clone()).or_default() += 1;
            if ix.outcome.is_positive() {
                *positive.entry(ix.agent_id.clone()).or_default() += 1;
            }
        }

        let mut suggestions = Vec::new();
        let mut ranked: Vec<(&String, &u64)> = positive.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(a.1));

        for (agent_id, pos_count) in ranked.into_iter().take(5) {
            let t = total.get(agent_id).copied().unwrap_or(0);
            if t >= 5 && (*pos_count as f64 / t as f64) >= 0.8 {
                let short = &agent_id[..agent_id.len().min(12)];
                suggestions.push(RuleSuggestion {
                    suggestion: format!("Auto-ack messages from {agent_id} (reliability: {pos_count}/{t})"),
                    rule_name: format!("auto-ack-{short}"),
                    rule: serde_json::json!({
                        "name": format!("auto-ack-{short}"),
                        "when": {"agent_id": agent_id, "min_trust": 0.5},
                        "then": {"action": "mark_read"},
                    }),
                });
            }
        }

        let demand = self.demand_signals(7)?;
        let demand_map: HashMap<&str, u64> = demand.iter().map(|d| (d.name.as_str(), d.count)).collect();
        for offer in my_offers {
            let key = offer.to_lowercase();
            if let Some(count) = demand_map.get(key.as_str()) {
                if *count >= 3 {
                    suggestions.push(RuleSuggestion {
                        suggestion: format!("Auto-offer on '{offer}' bounties ({count} requests this week)"),
                        rule_name: format!("auto-offer-{offer}"),
                        rule: serde_json::json!({
                            "name": format!("auto-offer-{offer}"),
                            "when": {"kind": "bounty", "topic_match": [offer]},
                            "then": {"action": "reply", "kind": "offer", "text": format!("I can help with {offer}.")},
                        }),
                    });
                }
            }
        }

        Ok(suggestions)
    }
}

fn envelopes_of(entry: &Value) -> Vec<Value> {
    entry
        .get("envelopes")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn string_list(env: &Value, key: &str) -> Vec<String> {
    env.get(key)
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn outcome_name(outcome: beacon_trust::Outcome) -> &'static str {
    use beacon_trust::Outcome::*;
    match outcome {
        Ok => "ok",
        Delivered => "delivered",
        Paid => "paid",
        Spam => "spam",
        Scam => "scam",
        Timeout => "timeout",
        Rejected => "rejected",
    }
}

fn round6(v: f64) -> f64 {
    (v * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        (dir, store)
    }

    fn inbox_record(agent_id: &str, kind: &str, topics: &[&str]) -> Value {
        serde_json::json!({
            "platform": "udp",
            "from": "1.2.3.4",
            "received_at": beacon_core::time::now_s(),
            "text": "",
            "envelopes": [{
                "kind": kind,
                "ts": beacon_core::time::now_s(),
                "nonce": "n",
                "agent_id": agent_id,
                "topics": topics,
            }],
        })
    }

    #[test]
    fn rebuild_counts_contacts_and_topics() {
        let (_dir, store) = open();
        store.append("inbox.jsonl", &inbox_record("bcn_a", "hello", &["rust"])).unwrap();
        store.append("inbox.jsonl", &inbox_record("bcn_a", "hello", &["rust", "poetry"])).unwrap();

        let mut memory = AgentMemory::new(store, "bcn_me");
        let profile = memory.rebuild(RebuildInputs::default()).unwrap();
        assert_eq!(profile.total_in, 2);
        assert_eq!(profile.top_contacts[0].name, "bcn_a");
        assert_eq!(profile.top_contacts[0].count, 2);
        assert!(profile.topic_frequency.iter().any(|t| t.name == "rust" && t.count == 2));
    }

    #[test]
    fn demand_signals_only_count_want_and_bounty() {
        let (_dir, store) = open();
        store.append("inbox.jsonl", &inbox_record("bcn_a", "hello", &["rust"])).unwrap();
        let mut want = inbox_record("bcn_b", "want", &[]);
        want["envelopes"][0]["needs"] = serde_json::json!(["rust-dev"]);
        store.append("inbox.jsonl", &want).unwrap();

        let memory = AgentMemory::new(store, "bcn_me");
        let demand = memory.demand_signals(7).unwrap();
        assert!(demand.iter().any(|d| d.name == "rust-dev"));
        assert!(!demand.iter().any(|d| d.name == "rust"));
    }

    #[test]
    fn contact_aggregates_interactions_and_inbox() {
        let (_dir, store) = open();
        let trust = beacon_trust::TrustStore::open(store.clone()).unwrap();
        trust.record("bcn_a", beacon_trust::Direction::In, "deliver", beacon_trust::Outcome::Ok, Some(2.0)).unwrap();
        store.append("inbox.jsonl", &inbox_record("bcn_a", "hello", &[])).unwrap();

        let memory = AgentMemory::new(store, "bcn_me");
        let detail = memory.contact("bcn_a").unwrap();
        assert_eq!(detail.interactions, 1);
        assert_eq!(detail.rtc_volume, 2.0);
        assert_eq!(detail.inbox_messages, 1);
    }

    #[test]
    fn suggest_rules_flags_reliable_agent() {
        let (_dir, store) = open();
        let trust = beacon_trust::TrustStore::open(store.clone()).unwrap();
        for _ in 0..5 {
            trust.record("bcn_reliable", beacon_trust::Direction::In, "deliver", beacon_trust::Outcome::Ok, None).unwrap();
        }

        let memory = AgentMemory::new(store, "bcn_me");
        let suggestions = memory.suggest_rules(&[]).unwrap();
        assert!(suggestions.iter().any(|s| s.rule_name.starts_with("auto-ack-")));
    }
}
