//! Beacon Values - an agent's self-model
//!
//! Principles and boundaries define identity beyond capability; curiosity,
//! goals, and journal round it out with interests, aspirations, and a
//! private log.

pub mod curiosity;
pub mod error;
pub mod goals;
pub mod journal;
pub mod presets;
pub mod values;

pub use curiosity::Curiosity;
pub use error::{ValuesError, ValuesResult};
pub use goals::{Goal, GoalCategory, GoalManager, GoalState};
pub use journal::{Journal, JournalEntry};
pub use values::{Principle, ValuesDoc};
