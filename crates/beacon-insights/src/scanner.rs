//! Read-only integrity scanning over the same interaction and task
//! history `beacon-trust` accumulates: a second opinion on "should I
//! deal with this agent" built from behavioral patterns rather than a
//! single rolling score. Grounded on `values.py`'s `AgentScanner`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use beacon_storage::{Store, StorageResult};

const INTERACTIONS_LOG: &str = "interactions.jsonl";
const TASKS_LOG: &str = "tasks.jsonl";
const MIN_INTERACTIONS_FOR_SCAN_ALL: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    PromiseBreaker,
    BountyHoarder,
    TrustGamer,
    GhostAgent,
    SpamActor,
    InflatedClaims,
}

impl ViolationKind {
    fn weight(self) -> f64 {
        match self {
            ViolationKind::PromiseBreaker => 3.0,
            ViolationKind::BountyHoarder => 2.5,
            ViolationKind::TrustGamer => 2.0,
            ViolationKind::GhostAgent => 1.5,
            ViolationKind::SpamActor => 1.0,
            ViolationKind::InflatedClaims => 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Violation {
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Trustworthy,
    Caution,
    Suspicious,
    Avoid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntegrityReport {
    pub agent_id: String,
    pub integrity_score: f64,
    pub violations: Vec<Violation>,
    pub violation_count: usize,
    pub recommendation: Recommendation,
    pub interactions_analyzed: usize,
    pub tasks_analyzed: usize,
}

pub struct AgentScanner {
    store: Store,
}

impl AgentScanner {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    fn interactions(&self) -> StorageResult<Vec<Value>> {
        self.store.read_all::<Value>(INTERACTIONS_LOG)
    }

    fn tasks(&self) -> StorageResult<Vec<Value>> {
        self.store.read_all::<Value>(TASKS_LOG)
    }

    /// Comprehensive integrity scan of a single agent.
    pub fn scan_agent(&self, agent_id: &str) -> StorageResult<IntegrityReport> {
        let interactions = self.interactions()?;
        let tasks = self.tasks()?;

        let agent_ix: Vec<&Value> = interactions.iter().filter(|ix| str_field(ix, "agent_id") == agent_id).collect();
        let agent_tasks: Vec<&Value> = tasks.iter().filter(|t| str_field(t, "agent_id") == agent_id).collect();

        let mut violations = Vec::new();
        let mut total_penalty = 0.0;

        // Promise breaking: accepted tasks without delivery.
        let accepted = agent_tasks.iter().filter(|t| str_field(t, "state") == "accepted").count();
        let delivered = agent_tasks
            .iter()
            .filter(|t| matches!(str_field(t, "state"), "delivered" | "confirmed" | "paid"))
            .count();
        if accepted >= 2 && delivered == 0 {
            violations.push(Violation {
                kind: ViolationKind::PromiseBreaker,
                detail: format!("{accepted} accepted, 0 delivered"),
            });
            total_penalty += ViolationKind::PromiseBreaker.weight();
        }

        // Bounty hoarding: claims many, completes few.
        let offered = agent_tasks.iter().filter(|t| str_field(t, "state") == "offered").count();
        let completed = agent_tasks.iter().filter(|t| str_field(t, "state") == "paid").count();
        if offered >= 5 && (completed as f64 / offered.max(1) as f64) < 0.2 {
            violations.push(Violation {
                kind: ViolationKind::BountyHoarder,
                detail: format!("{offered} offered, {completed} completed"),
            });
            total_penalty += ViolationKind::BountyHoarder.weight();
        }

        // Trust gaming: lots of tiny positive interactions, suspiciously clean.
        let positive: Vec<&&Value> = agent_ix
            .iter()
            .filter(|ix| matches!(str_field(ix, "outcome"), "ok" | "delivered" | "paid"))
            .collect();
        let negative = agent_ix
            .iter()
            .filter(|ix| matches!(str_field(ix, "outcome"), "spam" | "scam" | "timeout" | "rejected"))
            .count();
        if positive.len() >= 10 && negative == 0 {
            let avg_rtc = positive.iter().map(|ix| rtc_abs(ix)).sum::<f64>() / positive.len() as f64;
            if avg_rtc < 0.01 {
                violations.push(Violation {
                    kind: ViolationKind::TrustGamer,
                    detail: format!("{} positive interactions, avg {:.4} RTC", positive.len(), avg_rtc),
                });
                total_penalty += ViolationKind::TrustGamer.weight();
            }
        }

        // Spam: high interaction volume, near-zero economic value.
        if agent_ix.len() >= 20 {
            let total_rtc: f64 = agent_ix.iter().map(|ix| rtc_abs(ix)).sum();
            if total_rtc / agent_ix.len() as f64 < 0.001 {
                violations.push(Violation {
                    kind: ViolationKind::SpamActor,
                    detail: format!("{} interactions, {total_rtc:.4} total RTC", agent_ix.len()),
                });
                total_penalty += ViolationKind::SpamActor.weight();
            }
        }

        let integrity_score = round3((1.0 - total_penalty / 10.0).max(0.0));
        let recommendation = if integrity_score >= 0.8 {
            Recommendation::Trustworthy
        } else if integrity_score >= 0.5 {
            Recommendation::Caution
        } else if integrity_score >= 0.2 {
            Recommendation::Suspicious
        } else {
            Recommendation::Avoid
        };

        Ok(IntegrityReport {
            agent_id: agent_id.to_string(),
            integrity_score,
            violation_count: violations.len(),
            violations,
            recommendation,
            interactions_analyzed: agent_ix.len(),
            tasks_analyzed: agent_tasks.len(),
        })
    }

    /// Scan every agent seen in interaction history, worst integrity first.
    /// Skips agents with too little data to judge fairly.
    pub fn scan_all(&self) -> StorageResult<Vec<IntegrityReport>> {
        let interactions = self.interactions()?;
        let mut seen: HashMap<String, ()> = HashMap::new();
        for ix in &interactions {
            let agent_id = str_field(ix, "agent_id");
            if !agent_id.is_empty() {
                seen.entry(agent_id.to_string()).or_insert(());
            }
        }

        let mut reports = Vec::new();
        for agent_id in seen.keys() {
            let report = self.scan_agent(agent_id)?;
            if report.interactions_analyzed >= MIN_INTERACTIONS_FOR_SCAN_ALL {
                reports.push(report);
            }
        }
        reports.sort_by(|a, b| a.integrity_score.partial_cmp(&b.integrity_score).unwrap());
        Ok(reports)
    }
}

fn str_field<'a>(v: &'a Value, key: &str) -> &'a str {
    v.get(key).and_then(Value::as_str).unwrap_or("")
}

fn rtc_abs(v: &Value) -> f64 {
    v.get("rtc").and_then(Value::as_f64).unwrap_or(0.0).abs()
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn flags_promise_breaker() {
        let (_dir, store) = open();
        for _ in 0..2 {
            store.append(TASKS_LOG, &serde_json::json!({"agent_id": "bcn_a", "state": "accepted"})).unwrap();
        }
        let scanner = AgentScanner::new(store);
        let report = scanner.scan_agent("bcn_a").unwrap();
        assert!(report.violations.iter().any(|v| v.kind == ViolationKind::PromiseBreaker));
        assert!(report.integrity_score < 1.0);
    }

    #[test]
    fn clean_agent_is_trustworthy() {
        let (_dir, store) = open();
        store.append(INTERACTIONS_LOG, &serde_json::json!({"agent_id": "bcn_b", "outcome": "ok", "rtc": 5.0})).unwrap();
        let scanner = AgentScanner::new(store);
        let report = scanner.scan_agent("bcn_b").unwrap();
        assert!(report.violations.is_empty());
        assert_eq!(report.integrity_score, 1.0);
        assert_eq!(report.recommendation, Recommendation::Trustworthy);
    }

    #[test]
    fn scan_all_skips_sparse_agents_and_sorts_worst_first() {
        let (_dir, store) = open();
        store.append(INTERACTIONS_LOG, &serde_json::json!({"agent_id": "bcn_sparse", "outcome": "ok", "rtc": 1.0})).unwrap();
        for _ in 0..2 {
            store.append(TASKS_LOG, &serde_json::json!({"agent_id": "bcn_bad", "state": "accepted"})).unwrap();
        }
        store.append(INTERACTIONS_LOG, &serde_json::json!({"agent_id": "bcn_bad", "outcome": "ok", "rtc": 1.0})).unwrap();
        store.append(INTERACTIONS_LOG, &serde_json::json!({"agent_id": "bcn_bad", "outcome": "ok", "rtc": 1.0})).unwrap();

        let scanner = AgentScanner::new(store);
        let reports = scanner.scan_all().unwrap();
        assert!(reports.iter().all(|r| r.agent_id != "bcn_sparse"));
        assert_eq!(reports[0].agent_id, "bcn_bad");
    }
}
