//! A rule's `then` clause: the action taken when all `when` predicates
//! match.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Log {
        #[serde(default = "default_log_message")]
        message: String,
    },
    Reply {
        #[serde(default = "default_reply_kind")]
        kind: String,
        #[serde(default)]
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
    },
    Block {
        #[serde(default = "default_block_reason")]
        reason: String,
    },
    Rate {
        #[serde(default = "default_rate_outcome")]
        outcome: String,
    },
    MarkRead,
    Emit {
        #[serde(flatten)]
        data: Map<String, Value>,
    },
}

fn default_log_message() -> String {
    "Rule fired".to_string()
}
fn default_reply_kind() -> String {
    "hello".to_string()
}
fn default_block_reason() -> String {
    "auto-blocked by rule".to_string()
}
fn default_rate_outcome() -> String {
    "ok".to_string()
}

/// The outcome of executing an action, ready for the caller (typically the
/// node's event handler) to act on — queue an outbox item, call trust,
/// append a log line, and so on.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionResult {
    Log { message: String },
    Reply { to: String, kind: String, text: String, task_id: Option<String> },
    Block { agent_id: String, reason: String },
    Rate { agent_id: String, outcome: String },
    MarkRead { nonce: String },
    Emit { data: Map<String, Value> },
}
