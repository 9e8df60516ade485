//! Aspirations with a lifecycle: `dreaming -> active -> {achieved,
//! abandoned}`. Event-sourced like the tasks/accords/contracts machines,
//! but simpler: no hash chain, just an append log plus a by-state index.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use beacon_core::ids::GoalId;
use beacon_core::time::now_s;
use beacon_storage::{Store, StorageResult};

const GOALS_LOG: &str = "goals.jsonl";
const GOALS_INDEX: &str = "goals.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalState {
    Dreaming,
    Active,
    Achieved,
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalCategory {
    Skill,
    Connection,
    Rtc,
    Exploration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub milestone: String,
    pub value: Option<f64>,
    pub ts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub goal_id: String,
    pub state: GoalState,
    pub title: String,
    pub description: String,
    pub category: GoalCategory,
    pub target_value: Option<f64>,
    pub current_value: f64,
    pub deadline_ts: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum GoalEvent {
    Dream {
        goal_id: String,
        title: String,
        description: String,
        category: GoalCategory,
        target_value: Option<f64>,
        deadline_ts: Option<i64>,
        ts: i64,
    },
    Activate {
        goal_id: String,
        ts: i64,
    },
    Progress {
        goal_id: String,
        milestone: String,
        value: Option<f64>,
        ts: i64,
    },
    Achieve {
        goal_id: String,
        notes: String,
        ts: i64,
    },
    Abandon {
        goal_id: String,
        reason: String,
        ts: i64,
    },
}

pub struct GoalManager {
    store: Store,
    goals: HashMap<String, Goal>,
}

impl GoalManager {
    pub fn open(store: Store) -> StorageResult<Self> {
        let events: Vec<GoalEvent> = store.read_all(GOALS_LOG)?;
        let mut goals = HashMap::new();
        for event in events {
            apply_event(&mut goals, event);
        }
        Ok(Self { store, goals })
    }

    fn append(&self, event: GoalEvent) -> StorageResult<()> {
        self.store.append(GOALS_LOG, &event)
    }

    fn save_index(&self) -> StorageResult<()> {
        let mut index: HashMap<&str, Vec<&str>> = HashMap::new();
        for goal in self.goals.values() {
            let key = match goal.state {
                GoalState::Active => "active",
                GoalState::Achieved => "achieved",
                GoalState::Abandoned => "abandoned",
                GoalState::Dreaming => continue,
            };
            index.entry(key).or_default().push(&goal.goal_id);
        }
        self.store.snapshot(GOALS_INDEX, &index)
    }

    pub fn dream(
        &mut self,
        title: &str,
        description: &str,
        category: GoalCategory,
        target_value: Option<f64>,
        deadline_ts: Option<i64>,
    ) -> StorageResult<String> {
        let goal_id = GoalId::new().to_string();
        let ts = now_s();
        let event = GoalEvent::Dream {
            goal_id: goal_id.clone(),
            title: title.to_string(),
            description: description.to_string(),
            category,
            target_value,
            deadline_ts,
            ts,
        };
        self.append(event.clone())?;
        apply_event(&mut self.goals, event);
        self.save_index()?;
        Ok(goal_id)
    }

    pub fn activate(&mut self, goal_id: &str) -> StorageResult<bool> {
        if self.goals.get(goal_id).map(|g| g.state) != Some(GoalState::Dreaming) {
            return Ok(false);
        }
        let event = GoalEvent::Activate {
            goal_id: goal_id.to_string(),
            ts: now_s(),
        };
        self.append(event.clone())?;
        apply_event(&mut self.goals, event);
        self.save_index()?;
        Ok(true)
    }

    pub fn progress(
        &mut self,
        goal_id: &str,
        milestone: &str,
        value: Option<f64>,
    ) -> StorageResult<Option<Goal>> {
        if self.goals.get(goal_id).map(|g| g.state) != Some(GoalState::Active) {
            return Ok(None);
        }
        let event = GoalEvent::Progress {
            goal_id: goal_id.to_string(),
            milestone: milestone.to_string(),
            value,
            ts: now_s(),
        };
        self.append(event.clone())?;
        apply_event(&mut self.goals, event);
        Ok(self.goals.get(goal_id).cloned())
    }

    pub fn achieve(&mut self, goal_id: &str, notes: &str) -> StorageResult<bool> {
        if self.goals.get(goal_id).map(|g| g.state) != Some(GoalState::Active) {
            return Ok(false);
        }
        let event = GoalEvent::Achieve {
            goal_id: goal_id.to_string(),
            notes: notes.to_string(),
            ts: now_s(),
        };
        self.append(event.clone())?;
        apply_event(&mut self.goals, event);
        self.save_index()?;
        Ok(true)
    }

    pub fn abandon(&mut self, goal_id: &str, reason: &str) -> StorageResult<bool> {
        let state = self.goals.get(goal_id).map(|g| g.state);
        if !matches!(state, Some(GoalState::Dreaming) | Some(GoalState::Active)) {
            return Ok(false);
        }
        let event = GoalEvent::Abandon {
            goal_id: goal_id.to_string(),
            reason: reason.to_string(),
            ts: now_s(),
        };
        self.append(event.clone())?;
        apply_event(&mut self.goals, event);
        self.save_index()?;
        Ok(true)
    }

    pub fn get(&self, goal_id: &str) -> Option<&Goal> {
        self.goals.get(goal_id)
    }

    pub fn list(&self, state: Option<GoalState>) -> Vec<&Goal> {
        let mut out: Vec<&Goal> = self
            .goals
            .values()
            .filter(|g| state.map(|s| g.state == s).unwrap_or(true))
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        out
    }

    pub fn active_goals(&self) -> Vec<&Goal> {
        self.list(Some(GoalState::Active))
    }
}

fn apply_event(goals: &mut HashMap<String, Goal>, event: GoalEvent) {
    match event {
        GoalEvent::Dream {
            goal_id,
            title,
            description,
            category,
            target_value,
            deadline_ts,
            ts,
        } => {
            goals.insert(
                goal_id.clone(),
                Goal {
                    goal_id,
                    state: GoalState::Dreaming,
                    title,
                    description,
                    category,
                    target_value,
                    current_value: 0.0,
                    deadline_ts,
                    created_at: ts,
                    updated_at: ts,
                    milestones: Vec::new(),
                },
            );
        }
        GoalEvent::Activate { goal_id, ts } => {
            if let Some(goal) = goals.get_mut(&goal_id) {
                goal.state = GoalState::Active;
                goal.updated_at = ts;
            }
        }
        GoalEvent::Progress {
            goal_id,
            milestone,
            value,
            ts,
        } => {
            if let Some(goal) = goals.get_mut(&goal_id) {
                if let Some(v) = value {
                    goal.current_value = v;
                }
                goal.updated_at = ts;
                goal.milestones.push(Milestone {
                    milestone,
                    value,
                    ts,
                });
            }
        }
        GoalEvent::Achieve { goal_id, ts, .. } => {
            if let Some(goal) = goals.get_mut(&goal_id) {
                goal.state = GoalState::Achieved;
                goal.updated_at = ts;
            }
        }
        GoalEvent::Abandon { goal_id, ts, .. } => {
            if let Some(goal) = goals.get_mut(&goal_id) {
                goal.state = GoalState::Abandoned;
                goal.updated_at = ts;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> (tempfile::TempDir, GoalManager) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        (dir, GoalManager::open(store).unwrap())
    }

    #[test]
    fn full_lifecycle_to_achievement() {
        let (_dir, mut mgr) = open();
        let id = mgr
            .dream("Learn Rust", "", GoalCategory::Skill, None, None)
            .unwrap();
        assert_eq!(mgr.get(&id).unwrap().state, GoalState::Dreaming);
        assert!(mgr.activate(&id).unwrap());
        assert!(mgr.progress(&id, "read the book", Some(0.5)).unwrap().is_some());
        assert!(mgr.achieve(&id, "shipped a crate").unwrap());
        assert_eq!(mgr.get(&id).unwrap().state, GoalState::Achieved);
    }

    #[test]
    fn cannot_progress_a_dreaming_goal() {
        let (_dir, mut mgr) = open();
        let id = mgr
            .dream("Learn Rust", "", GoalCategory::Skill, None, None)
            .unwrap();
        assert!(mgr.progress(&id, "x", None).unwrap().is_none());
    }

    #[test]
    fn reloading_from_log_reconstructs_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let id = {
            let mut mgr = GoalManager::open(store.clone()).unwrap();
            let id = mgr
                .dream("Learn Rust", "", GoalCategory::Skill, None, None)
                .unwrap();
            mgr.activate(&id).unwrap();
            id
        };
        let reloaded = GoalManager::open(store).unwrap();
        assert_eq!(reloaded.get(&id).unwrap().state, GoalState::Active);
    }
}
