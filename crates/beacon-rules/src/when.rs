//! A rule's `when` clause: a conjunction of predicates, all of which must
//! match for the rule to fire.

use serde::{Deserialize, Serialize};

/// Matches either a single value or any of a list, mirroring the source
/// protocol's loose `kind: "bounty"` vs `kind: ["bounty", "offer"]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            OneOrMany::One(s) => s == value,
            OneOrMany::Many(list) => list.iter().any(|s| s == value),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct When {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<OneOrMany>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<OneOrMany>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_rtc: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rtc: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_trust: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_trust: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_match: Option<OneOrMany>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values_match: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_progress: Option<String>,
}
