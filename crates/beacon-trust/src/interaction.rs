use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    Delivered,
    Paid,
    Spam,
    Scam,
    Timeout,
    Rejected,
}

impl Outcome {
    pub fn is_positive(self) -> bool {
        matches!(self, Outcome::Ok | Outcome::Delivered | Outcome::Paid)
    }

    pub fn is_negative(self) -> bool {
        !self.is_positive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub ts: i64,
    pub agent_id: String,
    pub dir: Direction,
    pub kind: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtc: Option<f64>,
}

impl Interaction {
    pub fn new(
        agent_id: impl Into<String>,
        dir: Direction,
        kind: impl Into<String>,
        outcome: Outcome,
        rtc: Option<f64>,
    ) -> Self {
        Self {
            ts: beacon_core::time::now_s(),
            agent_id: agent_id.into(),
            dir,
            kind: kind.into(),
            outcome,
            rtc,
        }
    }
}
