//! Beacon Presence - liveness across three time horizons: [`presence`]
//! pulses build the live roster of who's online and what they trade,
//! [`heartbeat`] proves an individual agent is still alive between
//! pulses, and [`mayday`] is the emergency exit when a substrate is
//! going dark.

pub mod heartbeat;
pub mod mayday;
pub mod presence;

pub use heartbeat::{
    Assessment, DailyDigest, HealthStatus, HeartbeatManager, PeerBeat, PeerStatus,
    DEFAULT_DEAD_THRESHOLD_S, DEFAULT_SILENCE_THRESHOLD_S,
};
pub use mayday::{
    Bundle, BundleInputs, HealthReport, HostingOffer, Manifest, MaydayManager, Urgency,
};
pub use presence::{PresenceManager, PulsePresence, RosterEntry, RosterView, DEFAULT_PULSE_TTL_S};
