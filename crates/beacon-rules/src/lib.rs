//! Beacon Rules - declarative match+action automation over inbound events.
//!
//! A [`Rule`] pairs a [`When`] predicate with a [`then`](Action) action.
//! [`RulesEngine::process`] evaluates every enabled rule against an event,
//! honoring boundary precedence (a values violation always wins and
//! short-circuits user rules) and a per-`(rule, agent)` cooldown, then
//! executes the matches into [`ActionResult`]s for the caller to act on.

pub mod action;
pub mod engine;
pub mod when;

pub use action::{Action, ActionResult};
pub use engine::{EventContext, Match, Rule, RulesEngine, BOUNDARY_RULE_NAME};
pub use when::{OneOrMany, When};
