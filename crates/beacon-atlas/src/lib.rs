//! Beacon Atlas - virtual geography, population density, and
//! AI-to-AI calibration/valuation
//!
//! Domains cluster into [`atlas::City`] instances (a founding table for
//! well-known domains, procedural SHA-256 naming for the rest).
//! [`atlas::AtlasManager::calibrate`] scores pairwise agent
//! compatibility; [`atlas::AtlasManager::estimate`] derives a
//! composite `BeaconEstimate` valuation from that and the rest of the
//! runtime's social signals.

pub mod atlas;

pub use atlas::{
    Appreciation, AtlasManager, BeaconEstimate, CalibrationResult, City, CityTrend, ComparableAgent,
    DensityEntry, EstimateLogEntry, ExternalMetrics, InteractionSample, LeaderboardEntry, Listing,
    MarketSnapshot, MarketTrends, Opportunity, PopulationStats, Property, RegistrationResult,
};
