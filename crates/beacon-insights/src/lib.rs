//! Beacon Insights - agent memory analytics and proactive peer
//! matchmaking over the accumulated logs
//!
//! [`memory::AgentMemory`] rebuilds a [`memory::MemoryProfile`] from
//! trust interactions, inbox traffic, journal entries, and agreement
//! history - the agent's answer to "what have I learned about this
//! network so far?" [`matchmaker::MatchmakerManager`] turns that
//! picture into action, scanning the roster for skill and goal
//! overlap and gating premium scans and outreach behind an RTC cost
//! and a per-agent contact cooldown.

pub mod matchmaker;
pub mod memory;
pub mod scanner;

pub use matchmaker::{
    CompatibilityMatch, CompatibilityMethod, CuriosityMatch, DemandMatch, Introduction,
    MatchmakerManager, OpportunityMatch, DEFAULT_COOLDOWN_S, RTC_COST_COMPATIBILITY,
    RTC_COST_CURIOSITY, RTC_COST_DEMAND, RTC_COST_INTRODUCTIONS,
};
pub use memory::{
    AgentMemory, ContactDetail, MemoryProfile, NamedCount, RebuildInputs, ResponseTime,
    RuleSuggestion, TopicTrend, TrendDirection,
};
pub use scanner::{AgentScanner, IntegrityReport, Recommendation, Violation, ViolationKind};
