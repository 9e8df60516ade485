//! Beacon Core - shared IDs, canonical serialization, and error plumbing
//!
//! Every other Beacon crate depends on this one for:
//! - `AgentId` derivation and the other opaque record IDs
//! - canonical JSON serialization (the only form ever signed or hashed)
//! - the shared `BeaconError`/`Result` pair
//!
//! Nothing in this crate touches the filesystem or the network; it is
//! pure data modeling.

pub mod canonical;
pub mod error;
pub mod ids;
pub mod time;

pub use canonical::*;
pub use error::*;
pub use ids::*;
pub use time::*;
