//! Node configuration: an optional TOML file layered under environment
//! variables (`BEACON__section__key`) and CLI flags, merged through the
//! `config` crate's builder so file, env, and flag layers stack in one
//! pass.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

fn default_agent_name() -> String {
    "beacon-agent".to_string()
}

fn default_pulse_interval_s() -> i64 {
    60
}

fn default_pulse_ttl_s() -> i64 {
    beacon_presence::DEFAULT_PULSE_TTL_S
}

fn default_udp_port() -> u16 {
    8765
}

fn default_webhook_port() -> u16 {
    8766
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconSettings {
    #[serde(default = "default_agent_name")]
    pub agent_name: String,
}

impl Default for BeaconSettings {
    fn default() -> Self {
        Self { agent_name: default_agent_name() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceSettings {
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub offers: Vec<String>,
    #[serde(default)]
    pub needs: Vec<String>,
    #[serde(default)]
    pub card_url: String,
    #[serde(default = "default_pulse_interval_s")]
    pub pulse_interval_s: i64,
    #[serde(default = "default_pulse_ttl_s")]
    pub pulse_ttl_s: i64,
}

fn default_status() -> String {
    "online".to_string()
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            status: default_status(),
            offers: Vec::new(),
            needs: Vec::new(),
            card_url: String::new(),
            pulse_interval_s: default_pulse_interval_s(),
            pulse_ttl_s: default_pulse_ttl_s(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferencesSettings {
    #[serde(default)]
    pub accepted_kinds: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub accept_rtc: bool,
    #[serde(default)]
    pub min_rtc: f64,
}

impl PreferencesSettings {
    /// Empty list accepts every kind, matching an unset preference.
    pub fn accepts_kind(&self, kind: &str) -> bool {
        self.accepted_kinds.is_empty() || self.accepted_kinds.iter().any(|k| k == kind)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatSettings {
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold_s: i64,
    #[serde(default = "default_dead_threshold")]
    pub dead_threshold_s: i64,
}

fn default_silence_threshold() -> i64 {
    beacon_presence::DEFAULT_SILENCE_THRESHOLD_S
}

fn default_dead_threshold() -> i64 {
    beacon_presence::DEFAULT_DEAD_THRESHOLD_S
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            silence_threshold_s: default_silence_threshold(),
            dead_threshold_s: default_dead_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_udp_port")]
    pub port: u16,
    #[serde(default)]
    pub broadcast: bool,
}

impl Default for UdpSettings {
    fn default() -> Self {
        Self { enabled: true, host: default_host(), port: default_udp_port(), broadcast: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_webhook_port")]
    pub port: u16,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self { enabled: true, host: default_host(), port: default_webhook_port() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSettings {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_true")]
    pub verify_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_s: u64,
    #[serde(default = "default_roster_prune_interval")]
    pub roster_prune_interval_s: u64,
    #[serde(default = "default_outbox_drain_interval")]
    pub outbox_drain_interval_s: u64,
    #[serde(default = "default_market_snapshot_interval")]
    pub market_snapshot_interval_s: u64,
    #[serde(default = "default_silence_check_interval")]
    pub silence_check_interval_s: u64,
}

fn default_heartbeat_interval() -> u64 {
    120
}
fn default_roster_prune_interval() -> u64 {
    300
}
fn default_outbox_drain_interval() -> u64 {
    10
}
fn default_market_snapshot_interval() -> u64 {
    3600
}
fn default_silence_check_interval() -> u64 {
    600
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_s: default_heartbeat_interval(),
            roster_prune_interval_s: default_roster_prune_interval(),
            outbox_drain_interval_s: default_outbox_drain_interval(),
            market_snapshot_interval_s: default_market_snapshot_interval(),
            silence_check_interval_s: default_silence_check_interval(),
        }
    }
}

/// Every recognized configuration key, in the sections spec.md names.
/// `data_dir` and `keystore_password` live outside any section since
/// they govern bootstrap rather than runtime behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconConfig {
    #[serde(skip)]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub beacon: BeaconSettings,
    #[serde(default)]
    pub presence: PresenceSettings,
    #[serde(default)]
    pub preferences: PreferencesSettings,
    #[serde(default)]
    pub heartbeat: HeartbeatSettings,
    #[serde(default)]
    pub udp: UdpSettings,
    #[serde(default)]
    pub webhook: WebhookSettings,
    #[serde(default)]
    pub ledger: LedgerSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            beacon: BeaconSettings::default(),
            presence: PresenceSettings::default(),
            preferences: PreferencesSettings::default(),
            heartbeat: HeartbeatSettings::default(),
            udp: UdpSettings::default(),
            webhook: WebhookSettings::default(),
            ledger: LedgerSettings::default(),
            scheduler: SchedulerSettings::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs_next::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".beacon")
}

/// Beacon - peer-to-peer protocol runtime for autonomous agents
#[derive(Parser, Debug)]
#[command(name = "beacon-node", about = "Beacon peer-to-peer protocol runtime", version)]
pub struct Args {
    /// Path to a TOML configuration file, layered under CLI/env overrides.
    #[arg(short, long, env = "BEACON_CONFIG")]
    pub config: Option<String>,

    /// Data directory holding every persisted log and snapshot.
    #[arg(long, env = "BEACON_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Agent display name used in outbound envelopes.
    #[arg(long, env = "BEACON_AGENT_NAME")]
    pub agent_name: Option<String>,

    /// Password for an encrypted keystore at `<data_dir>/identity.json`.
    /// Without one, identity is generated in plaintext on first run.
    #[arg(long, env = "BEACON_KEYSTORE_PASSWORD")]
    pub keystore_password: Option<String>,

    #[arg(long, env = "BEACON_UDP_PORT")]
    pub udp_port: Option<u16>,

    #[arg(long, env = "BEACON_WEBHOOK_PORT")]
    pub webhook_port: Option<u16>,

    /// Ledger RPC base URL for anchor submission.
    #[arg(long, env = "BEACON_LEDGER_URL")]
    pub ledger_url: Option<String>,
}

impl BeaconConfig {
    /// Layer a config file (if given) under `BEACON__section__key` env
    /// vars, then apply the handful of CLI flags that shortcut the
    /// common knobs directly.
    pub fn load(args: &Args) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = &args.config {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("BEACON").separator("__").try_parsing(true),
        );

        let built = builder.build()?;
        let mut cfg: BeaconConfig = match built.try_deserialize() {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = %e, "using default configuration");
                BeaconConfig::default()
            }
        };

        cfg.data_dir = args.data_dir.clone().unwrap_or_else(default_data_dir);
        if let Some(name) = &args.agent_name {
            cfg.beacon.agent_name = name.clone();
        }
        if let Some(port) = args.udp_port {
            cfg.udp.port = port;
        }
        if let Some(port) = args.webhook_port {
            cfg.webhook.port = port;
        }
        if let Some(url) = &args.ledger_url {
            cfg.ledger.url = url.clone();
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let cfg = BeaconConfig::default();
        assert_eq!(cfg.beacon.agent_name, "beacon-agent");
        assert!(cfg.udp.enabled);
        assert!(cfg.webhook.enabled);
        assert_eq!(cfg.presence.pulse_ttl_s, beacon_presence::DEFAULT_PULSE_TTL_S);
    }

    #[test]
    fn preferences_accept_all_kinds_when_unset() {
        let prefs = PreferencesSettings::default();
        assert!(prefs.accepts_kind("bounty"));
        assert!(prefs.accepts_kind("anything"));
    }

    #[test]
    fn preferences_filter_to_configured_kinds() {
        let prefs = PreferencesSettings { accepted_kinds: vec!["bounty".to_string()], ..Default::default() };
        assert!(prefs.accepts_kind("bounty"));
        assert!(!prefs.accepts_kind("want"));
    }
}
