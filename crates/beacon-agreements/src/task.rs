//! Bounties become trackable jobs: `open -> offered -> accepted ->
//! delivered -> confirmed -> paid`, with `cancelled`/`rejected`/`disputed`
//! side branches. Event-sourced: every transition appends a partial
//! record to `tasks.jsonl`, and the current view of a task is the merge
//! of every event recorded for its `task_id`, in order.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use beacon_codec::Envelope;
use beacon_core::ids::TaskId;
use beacon_core::time::now_s;
use beacon_storage::{Store, StorageResult};

use crate::error::{AgreementError, AgreementResult};

const TASKS_LOG: &str = "tasks.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Open,
    Offered,
    Accepted,
    Delivered,
    Confirmed,
    Disputed,
    Cancelled,
    Rejected,
    Paid,
}

impl TaskState {
    fn allowed_next(self) -> &'static [TaskState] {
        use TaskState::*;
        match self {
            Open => &[Offered, Cancelled],
            Offered => &[Accepted, Rejected, Cancelled],
            Accepted => &[Delivered, Cancelled],
            Delivered => &[Confirmed, Disputed],
            Confirmed => &[Paid],
            Disputed => &[Confirmed, Cancelled],
            Paid | Cancelled | Rejected => &[],
        }
    }

    fn can_transition_to(self, next: TaskState) -> bool {
        self.allowed_next().contains(&next)
    }

    fn from_envelope_kind(kind: &str) -> Option<TaskState> {
        match kind {
            "bounty" => Some(TaskState::Open),
            "offer" => Some(TaskState::Offered),
            "accept" => Some(TaskState::Accepted),
            "deliver" => Some(TaskState::Delivered),
            "confirm" => Some(TaskState::Confirmed),
            "pay" => Some(TaskState::Paid),
            _ => None,
        }
    }
}

/// A single recorded transition. Only the fields relevant to the new
/// state are set; applying a sequence of these over a `task_id` merges
/// them into the task's current view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<TaskState>,
    pub ts: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub poster: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_rtc: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounty_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_worker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_rtc: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pay_nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The current materialized view of a task, folded from its events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub state: TaskState,
    pub ts: i64,
    pub poster: String,
    pub reward_rtc: f64,
    pub text: String,
    pub bounty_url: String,
    pub links: Vec<String>,
    pub worker: String,
    pub offer_text: String,
    pub delivery_url: String,
    pub delivery_text: String,
    pub confirmed_by: String,
    pub amount_rtc: f64,
    pub pay_nonce: String,
    pub reason: String,
}

fn merge(acc: &mut Option<Task>, event: &TaskEvent) {
    let task = acc.get_or_insert_with(|| Task {
        task_id: event.task_id.clone(),
        state: TaskState::Open,
        ts: event.ts,
        poster: String::new(),
        reward_rtc: 0.0,
        text: String::new(),
        bounty_url: String::new(),
        links: Vec::new(),
        worker: String::new(),
        offer_text: String::new(),
        delivery_url: String::new(),
        delivery_text: String::new(),
        confirmed_by: String::new(),
        amount_rtc: 0.0,
        pay_nonce: String::new(),
        reason: String::new(),
    });
    if let Some(s) = event.state {
        task.state = s;
    }
    task.ts = event.ts;
    macro_rules! take {
        ($field:ident) => {
            if let Some(v) = event.$field.clone() {
                task.$field = v;
            }
        };
    }
    take!(poster);
    take!(text);
    take!(bounty_url);
    take!(links);
    take!(worker);
    take!(offer_text);
    take!(delivery_url);
    take!(delivery_text);
    take!(confirmed_by);
    take!(pay_nonce);
    take!(reason);
    if let Some(v) = event.reward_rtc {
        task.reward_rtc = v;
    }
    if let Some(v) = event.amount_rtc {
        task.amount_rtc = v;
    }
    if let Some(v) = event.accepted_worker.clone() {
        task.worker = v;
    }
}

pub struct TaskManager {
    store: Store,
}

impl TaskManager {
    pub fn open(store: Store) -> Self {
        Self { store }
    }

    fn all_events(&self) -> StorageResult<Vec<TaskEvent>> {
        self.store.read_all(TASKS_LOG)
    }

    fn build(&self, task_id: &str) -> StorageResult<Option<Task>> {
        let mut acc = None;
        for event in self.all_events()? {
            if event.task_id == task_id {
                merge(&mut acc, &event);
            }
        }
        Ok(acc)
    }

    /// Create a new task from a bounty envelope. Returns the task id.
    pub fn create(&self, bounty: &Envelope) -> StorageResult<String> {
        let task_id = bounty
            .task_id()
            .map(str::to_string)
            .unwrap_or_else(|| TaskId::new().to_string());

        let event = TaskEvent {
            task_id: task_id.clone(),
            state: Some(TaskState::Open),
            ts: now_s(),
            poster: bounty.agent_id.clone(),
            reward_rtc: bounty.field("reward_rtc").and_then(serde_json::Value::as_f64),
            text: bounty.text().map(str::to_string),
            bounty_url: bounty.field_str("bounty_url").map(str::to_string),
            links: bounty.field("links").and_then(|v| v.as_array()).map(|arr| {
                arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()
            }),
            ..Default::default()
        };
        self.store.append(TASKS_LOG, &event)?;
        Ok(task_id)
    }

    pub fn get(&self, task_id: &str) -> StorageResult<Option<Task>> {
        self.build(task_id)
    }

    /// Validate and record a state transition.
    pub fn transition(
        &self,
        task_id: &str,
        new_state: TaskState,
        envelope: Option<&Envelope>,
    ) -> AgreementResult<TaskEvent> {
        let current = self
            .build(task_id)?
            .ok_or_else(|| AgreementError::TaskNotFound(task_id.to_string()))?;

        if !current.state.can_transition_to(new_state) {
            return Err(AgreementError::InvalidTaskTransition {
                from: format!("{:?}", current.state).to_lowercase(),
                to: format!("{:?}", new_state).to_lowercase(),
            });
        }

        let mut event = TaskEvent {
            task_id: task_id.to_string(),
            state: Some(new_state),
            ts: now_s(),
            ..Default::default()
        };

        if let Some(envelope) = envelope {
            match new_state {
                TaskState::Offered => {
                    event.worker = envelope.agent_id.clone();
                    event.offer_text = envelope.text().map(str::to_string);
                }
                TaskState::Accepted => {
                    event.accepted_worker = envelope.field_str("worker").map(str::to_string);
                }
                TaskState::Delivered => {
                    event.delivery_url = envelope
                        .field_str("delivery_url")
                        .or_else(|| envelope.field_str("url"))
                        .map(str::to_string);
                    event.delivery_text = envelope.text().map(str::to_string);
                }
                TaskState::Confirmed => {
                    event.confirmed_by = envelope.agent_id.clone();
                }
                TaskState::Paid => {
                    event.amount_rtc = envelope
                        .field("amount_rtc")
                        .or_else(|| envelope.field("reward_rtc"))
                        .and_then(serde_json::Value::as_f64);
                    event.pay_nonce = Some(envelope.nonce.clone());
                }
                TaskState::Cancelled | TaskState::Rejected | TaskState::Disputed => {
                    event.reason = envelope
                        .field_str("reason")
                        .or_else(|| envelope.text())
                        .map(str::to_string);
                }
                _ => {}
            }
        }

        self.store.append(TASKS_LOG, &event)?;
        Ok(event)
    }

    pub fn list_tasks(&self, state: Option<TaskState>) -> StorageResult<Vec<Task>> {
        let events = self.all_events()?;
        let mut order = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for event in &events {
            if seen.insert(event.task_id.clone()) {
                order.push(event.task_id.clone());
            }
        }

        let mut folded: HashMap<String, Option<Task>> = HashMap::new();
        for event in &events {
            let entry = folded.entry(event.task_id.clone()).or_insert(None);
            merge(entry, event);
        }

        let mut tasks: Vec<Task> = order
            .into_iter()
            .filter_map(|id| folded.remove(&id).flatten())
            .filter(|t| state.map(|s| t.state == s).unwrap_or(true))
            .collect();
        tasks.sort_by(|a, b| b.ts.cmp(&a.ts));
        Ok(tasks)
    }

    pub fn my_tasks(&self, agent_id: &str) -> StorageResult<Vec<Task>> {
        Ok(self
            .list_tasks(None)?
            .into_iter()
            .filter(|t| t.poster == agent_id || t.worker == agent_id)
            .collect())
    }

    /// Map an incoming envelope's `kind` to a target state and attempt
    /// the transition. Invalid or inapplicable transitions are silently
    /// discarded, matching the lenient auto-ingest path.
    pub fn auto_transition_from_envelope(&self, envelope: &Envelope) -> Option<TaskEvent> {
        let new_state = TaskState::from_envelope_kind(&envelope.kind)?;
        let task_id = envelope.task_id()?;
        if new_state == TaskState::Open {
            return None;
        }
        self.transition(task_id, new_state, Some(envelope)).ok()
    }

    pub fn task_summary(&self, task_id: &str) -> StorageResult<Option<Task>> {
        self.get(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> (tempfile::TempDir, TaskManager) {
        let dir = tempfile::tempdir().unwrap();
        (dir, TaskManager::open(Store::new(dir_path(&dir)).unwrap()))
    }

    fn dir_path(dir: &tempfile::TempDir) -> std::path::PathBuf {
        dir.path().to_path_buf()
    }

    #[test]
    fn full_lifecycle_to_paid() {
        let (_dir, mgr) = open();
        let mut bounty = Envelope::new("bounty", "n1").with_field("text", "fix the bug");
        bounty.agent_id = Some("bcn_poster".to_string());
        let task_id = mgr.create(&bounty).unwrap();
        assert_eq!(mgr.get(&task_id).unwrap().unwrap().state, TaskState::Open);

        let mut offer = Envelope::new("offer", "n2").with_field("task_id", task_id.clone());
        offer.agent_id = Some("bcn_worker".to_string());
        mgr.transition(&task_id, TaskState::Offered, Some(&offer)).unwrap();
        assert_eq!(mgr.get(&task_id).unwrap().unwrap().worker, "bcn_worker");

        mgr.transition(&task_id, TaskState::Accepted, None).unwrap();
        mgr.transition(&task_id, TaskState::Delivered, None).unwrap();
        mgr.transition(&task_id, TaskState::Confirmed, None).unwrap();
        mgr.transition(&task_id, TaskState::Paid, None).unwrap();
        assert_eq!(mgr.get(&task_id).unwrap().unwrap().state, TaskState::Paid);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let (_dir, mgr) = open();
        let bounty = Envelope::new("bounty", "n1");
        let task_id = mgr.create(&bounty).unwrap();
        assert!(mgr.transition(&task_id, TaskState::Paid, None).is_err());
    }

    #[test]
    fn auto_transition_silently_ignores_invalid() {
        let (_dir, mgr) = open();
        let bounty = Envelope::new("bounty", "n1");
        let task_id = mgr.create(&bounty).unwrap();
        let mut pay = Envelope::new("pay", "n2").with_field("task_id", task_id.clone());
        pay.agent_id = Some("bcn_x".to_string());
        assert!(mgr.auto_transition_from_envelope(&pay).is_none());
        assert_eq!(mgr.get(&task_id).unwrap().unwrap().state, TaskState::Open);
    }
}
