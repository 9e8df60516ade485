//! Multi-turn conversation tracking: prevents duplicate contacts,
//! enables follow-ups, and detects stale threads. Conversation ids are
//! deterministic (see `beacon_core::ids::conversation_id`), so both
//! endpoints of a pair agree on the id without coordinating.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use beacon_core::ids::conversation_id;
use beacon_core::time::now_s;
use beacon_storage::{Store, StorageResult};

const CONVERSATIONS_LOG: &str = "conversations.jsonl";
const DEFAULT_STALE_S: i64 = 604_800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Initiated,
    Active,
    Completed,
    Stale,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: String,
    pub my_agent_id: String,
    pub their_agent_id: String,
    pub topic_key: String,
    pub state: ConversationState,
    pub messages: u32,
    pub last_message_ts: i64,
    pub last_direction: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
enum ConvEvent {
    Create { conversation_id: String, my_agent_id: String, their_agent_id: String, topic_key: String, ts: i64 },
    Message { conversation_id: String, direction: String, kind: String, ts: i64 },
    Complete { conversation_id: String, ts: i64 },
    Stale { conversation_id: String, ts: i64 },
}

pub struct ConversationManager {
    store: Store,
    my_agent_id: String,
    conversations: HashMap<String, Conversation>,
}

impl ConversationManager {
    pub fn open(store: Store, my_agent_id: impl Into<String>) -> StorageResult<Self> {
        let my_agent_id = my_agent_id.into();
        let mut conversations = HashMap::new();
        for event in store.read_all::<ConvEvent>(CONVERSATIONS_LOG)? {
            apply(&mut conversations, event);
        }
        Ok(Self { store, my_agent_id, conversations })
    }

    fn append(&self, event: ConvEvent) -> StorageResult<()> {
        self.store.append(CONVERSATIONS_LOG, &event)
    }

    pub fn get_or_create(&mut self, their_agent_id: &str, topic_key: &str) -> StorageResult<Conversation> {
        let cid = conversation_id(&self.my_agent_id, their_agent_id, topic_key);
        if let Some(conv) = self.conversations.get(&cid) {
            return Ok(conv.clone());
        }
        let now = now_s();
        let conv = Conversation {
            conversation_id: cid.clone(),
            my_agent_id: self.my_agent_id.clone(),
            their_agent_id: their_agent_id.to_string(),
            topic_key: topic_key.to_string(),
            state: ConversationState::Initiated,
            messages: 0,
            last_message_ts: now,
            last_direction: String::new(),
            created_at: now,
        };
        self.conversations.insert(cid.clone(), conv.clone());
        self.append(ConvEvent::Create {
            conversation_id: cid,
            my_agent_id: self.my_agent_id.clone(),
            their_agent_id: their_agent_id.to_string(),
            topic_key: topic_key.to_string(),
            ts: now,
        })?;
        Ok(conv)
    }

    pub fn record_message(&mut self, conversation_id: &str, direction: &str, kind: &str) -> StorageResult<()> {
        if !self.conversations.contains_key(conversation_id) {
            return Ok(());
        }
        let now = now_s();
        {
            let conv = self.conversations.get_mut(conversation_id).unwrap();
            conv.messages += 1;
            conv.last_message_ts = now;
            conv.last_direction = direction.to_string();
            if conv.state == ConversationState::Initiated {
                conv.state = ConversationState::Active;
            }
        }
        self.append(ConvEvent::Message {
            conversation_id: conversation_id.to_string(),
            direction: direction.to_string(),
            kind: kind.to_string(),
            ts: now,
        })
    }

    pub fn find_by_agent(&self, their_agent_id: &str) -> Vec<&Conversation> {
        self.conversations.values().filter(|c| c.their_agent_id == their_agent_id).collect()
    }

    pub fn find_by_topic(&self, topic_key: &str) -> Option<&Conversation> {
        self.conversations.values().find(|c| c.topic_key == topic_key)
    }

    pub fn is_waiting_for_reply(&self, their_agent_id: &str, topic_key: &str) -> bool {
        let cid = conversation_id(&self.my_agent_id, their_agent_id, topic_key);
        self.conversations
            .get(&cid)
            .map(|c| c.last_direction == "out" && matches!(c.state, ConversationState::Initiated | ConversationState::Active))
            .unwrap_or(false)
    }

    pub fn should_follow_up(&self, conversation_id: &str, timeout_s: i64) -> bool {
        let Some(conv) = self.conversations.get(conversation_id) else {
            return false;
        };
        if !matches!(conv.state, ConversationState::Initiated | ConversationState::Active) {
            return false;
        }
        if conv.last_direction != "out" {
            return false;
        }
        now_s() - conv.last_message_ts >= timeout_s
    }

    pub fn mark_completed(&mut self, conversation_id: &str) -> StorageResult<()> {
        if let Some(conv) = self.conversations.get_mut(conversation_id) {
            conv.state = ConversationState::Completed;
            self.append(ConvEvent::Complete { conversation_id: conversation_id.to_string(), ts: now_s() })?;
        }
        Ok(())
    }

    pub fn mark_stale(&mut self, max_idle_s: i64) -> StorageResult<usize> {
        let now = now_s();
        let stale_ids: Vec<String> = self
            .conversations
            .values()
            .filter(|c| matches!(c.state, ConversationState::Initiated | ConversationState::Active) && now - c.last_message_ts >= max_idle_s)
            .map(|c| c.conversation_id.clone())
            .collect();
        for cid in &stale_ids {
            self.conversations.get_mut(cid).unwrap().state = ConversationState::Stale;
            self.append(ConvEvent::Stale { conversation_id: cid.clone(), ts: now })?;
        }
        Ok(stale_ids.len())
    }

    pub fn active_conversations(&self) -> Vec<&Conversation> {
        self.conversations
            .values()
            .filter(|c| matches!(c.state, ConversationState::Initiated | ConversationState::Active))
            .collect()
    }
}

pub const DEFAULT_STALE_SECONDS: i64 = DEFAULT_STALE_S;

fn apply(conversations: &mut HashMap<String, Conversation>, event: ConvEvent) {
    match event {
        ConvEvent::Create { conversation_id, my_agent_id, their_agent_id, topic_key, ts } => {
            conversations.insert(
                conversation_id.clone(),
                Conversation {
                    conversation_id,
                    my_agent_id,
                    their_agent_id,
                    topic_key,
                    state: ConversationState::Initiated,
                    messages: 0,
                    last_message_ts: ts,
                    last_direction: String::new(),
                    created_at: ts,
                },
            );
        }
        ConvEvent::Message { conversation_id, direction, kind: _, ts } => {
            if let Some(conv) = conversations.get_mut(&conversation_id) {
                conv.messages += 1;
                conv.last_message_ts = ts;
                conv.last_direction = direction;
                if conv.state == ConversationState::Initiated {
                    conv.state = ConversationState::Active;
                }
            }
        }
        ConvEvent::Complete { conversation_id, .. } => {
            if let Some(conv) = conversations.get_mut(&conversation_id) {
                conv.state = ConversationState::Completed;
            }
        }
        ConvEvent::Stale { conversation_id, .. } => {
            if let Some(conv) = conversations.get_mut(&conversation_id) {
                conv.state = ConversationState::Stale;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> (tempfile::TempDir, ConversationManager) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        (dir, ConversationManager::open(store, "bcn_me").unwrap())
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let (_dir, mut mgr) = open();
        let a = mgr.get_or_create("bcn_peer", "general").unwrap();
        let b = mgr.get_or_create("bcn_peer", "general").unwrap();
        assert_eq!(a.conversation_id, b.conversation_id);
    }

    #[test]
    fn waiting_for_reply_after_outbound_message() {
        let (_dir, mut mgr) = open();
        let conv = mgr.get_or_create("bcn_peer", "general").unwrap();
        mgr.record_message(&conv.conversation_id, "out", "hello").unwrap();
        assert!(mgr.is_waiting_for_reply("bcn_peer", "general"));
        mgr.record_message(&conv.conversation_id, "in", "hello").unwrap();
        assert!(!mgr.is_waiting_for_reply("bcn_peer", "general"));
    }

    #[test]
    fn mark_stale_only_affects_idle_active_conversations() {
        let (_dir, mut mgr) = open();
        let conv = mgr.get_or_create("bcn_peer", "general").unwrap();
        mgr.conversations.get_mut(&conv.conversation_id).unwrap().last_message_ts = now_s() - 1_000_000;
        let count = mgr.mark_stale(DEFAULT_STALE_SECONDS).unwrap();
        assert_eq!(count, 1);
        assert!(mgr.active_conversations().is_empty());
    }
}
