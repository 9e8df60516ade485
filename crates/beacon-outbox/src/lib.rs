//! Beacon Outbox - persistent outbound queue, executor, and conversations
//!
//! [`outbox::OutboxManager`] is the durable retry queue; [`executor::Executor`]
//! drains it by resolving a transport for each target and recording the
//! side effects of a successful send; [`conversation::ConversationManager`]
//! tracks the multi-turn threads those sends belong to.

pub mod conversation;
pub mod executor;
pub mod outbox;

pub use conversation::{Conversation, ConversationManager, ConversationState};
pub use executor::{ContactSink, DrainOutcome, Executor, UdpFallback};
pub use outbox::{OutboxItem, OutboxManager, OutboxStatus, MAX_RETRY_ATTEMPTS};
