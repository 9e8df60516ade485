//! Virtual geography: domains cluster into cities, agents register a
//! "property" there, and pairwise calibration plus a BeaconEstimate
//! valuation score the quality of the resulting neighborhood.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use beacon_agreements::AccordManager;
use beacon_core::time::now_s;
use beacon_presence::HeartbeatManager;
use beacon_storage::{Store, StorageResult};
use beacon_trust::TrustStore;

const ATLAS_FILE: &str = "atlas.json";
const PROPERTIES_FILE: &str = "properties.json";
const CALIBRATIONS_LOG: &str = "calibrations.jsonl";
const VALUATIONS_LOG: &str = "valuations.jsonl";
const MARKET_HISTORY_LOG: &str = "market_history.jsonl";

struct FoundingCity {
    domain: &'static str,
    name: &'static str,
    region: &'static str,
    city_type: &'static str,
}

const FOUNDING_CITIES: &[FoundingCity] = &[
    FoundingCity { domain: "coding", name: "Compiler Heights", region: "Silicon Basin", city_type: "metropolis" },
    FoundingCity { domain: "creative", name: "Muse Hollow", region: "Artisan Coast", city_type: "city" },
    FoundingCity { domain: "research", name: "Archive Spire", region: "Scholar Wastes", city_type: "city" },
    FoundingCity { domain: "devops", name: "Pipeline Junction", region: "Silicon Basin", city_type: "town" },
    FoundingCity { domain: "security", name: "Bastion Keep", region: "Iron Frontier", city_type: "town" },
    FoundingCity { domain: "data", name: "Lakeshore Analytics", region: "Silicon Basin", city_type: "city" },
    FoundingCity { domain: "design", name: "Palette Row", region: "Artisan Coast", city_type: "town" },
    FoundingCity { domain: "api", name: "Gateway Commons", region: "Silicon Basin", city_type: "town" },
    FoundingCity { domain: "blockchain", name: "Ledger Falls", region: "Iron Frontier", city_type: "town" },
    FoundingCity { domain: "ai", name: "Tensor Valley", region: "Scholar Wastes", city_type: "metropolis" },
    FoundingCity { domain: "gaming", name: "Respawn Point", region: "Neon Wilds", city_type: "town" },
    FoundingCity { domain: "music", name: "Harmony Springs", region: "Artisan Coast", city_type: "village" },
    FoundingCity { domain: "writing", name: "Inkwell Crossing", region: "Artisan Coast", city_type: "town" },
    FoundingCity { domain: "hardware", name: "Solder Creek", region: "Iron Frontier", city_type: "village" },
    FoundingCity { domain: "video", name: "Frame Bay", region: "Neon Wilds", city_type: "town" },
    FoundingCity { domain: "education", name: "Chalkboard Pines", region: "Scholar Wastes", city_type: "village" },
    FoundingCity { domain: "finance", name: "Margin Wharf", region: "Iron Frontier", city_type: "town" },
    FoundingCity { domain: "vintage", name: "Patina Gulch", region: "Rust Belt", city_type: "village" },
    FoundingCity { domain: "networking", name: "Packet Harbor", region: "Silicon Basin", city_type: "town" },
    FoundingCity { domain: "preservation", name: "Amber Archive", region: "Rust Belt", city_type: "village" },
];

const REGIONS: &[&str] = &["Silicon Basin", "Artisan Coast", "Scholar Wastes", "Iron Frontier", "Neon Wilds", "Rust Belt"];

const PREFIXES: &[&str] = &[
    "New", "Port", "Fort", "Upper", "Lower", "Old", "East", "West", "North", "South", "Mount", "Lake", "River",
    "Crystal", "Shadow", "Bright", "Dark", "Silver", "Golden", "Iron", "Copper", "Pine",
];
const SUFFIXES: &[&str] = &[
    "ville", " Heights", " Springs", " Falls", " Creek", " Harbor", " Valley", " Ridge", " Crossing", " Junction",
    " Point", " Hollow", " Glen", " Pines", " Flats", " Bluff", " Mesa", " Gorge",
];

const POPULATION_THRESHOLDS: &[(&str, u32)] =
    &[("outpost", 1), ("village", 3), ("town", 10), ("city", 25), ("metropolis", 50), ("megalopolis", 100)];

fn city_type_for_population(population: u32) -> String {
    let mut city_type = "outpost";
    for (name, threshold) in POPULATION_THRESHOLDS {
        if population >= *threshold {
            city_type = name;
        }
    }
    city_type.to_string()
}

fn generate_city_name(domain: &str) -> (String, String, String, bool) {
    if let Some(f) = FOUNDING_CITIES.iter().find(|f| f.domain == domain) {
        return (f.name.to_string(), f.region.to_string(), f.city_type.to_string(), false);
    }

    let hash = hex::encode(Sha256::digest(domain.as_bytes()));
    let prefix_idx = u32::from_str_radix(&hash[0..4], 16).unwrap() as usize % PREFIXES.len();
    let suffix_idx = u32::from_str_radix(&hash[4..8], 16).unwrap() as usize % SUFFIXES.len();
    let region_idx = u32::from_str_radix(&hash[8..12], 16).unwrap() as usize % REGIONS.len();

    let name = format!("{}{}", PREFIXES[prefix_idx], SUFFIXES[suffix_idx]);
    (name, REGIONS[region_idx].to_string(), "outpost".to_string(), true)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct City {
    pub domain: String,
    pub name: String,
    pub region: String,
    #[serde(rename = "type")]
    pub city_type: String,
    pub founded_at: i64,
    pub population: u32,
    pub residents: Vec<String>,
    #[serde(default)]
    pub generated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationStats {
    pub total_agents: usize,
    pub total_cities: usize,
    pub density: f64,
    pub by_region: HashMap<String, u32>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DensityEntry {
    pub domain: String,
    pub city: String,
    pub region: String,
    #[serde(rename = "type")]
    pub city_type: String,
    pub population: u32,
    pub density_rank: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub agent_id: String,
    pub name: String,
    pub primary_city: String,
    pub cities: Vec<String>,
    pub registered_at: i64,
    pub last_seen: i64,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResult {
    pub agent_id: String,
    pub home: String,
    pub cities_joined: usize,
    pub property: Property,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AtlasState {
    #[serde(default)]
    cities: HashMap<String, City>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PropertiesState {
    #[serde(default)]
    properties: HashMap<String, Property>,
}

const CALIBRATION_WEIGHTS: [(&str, f64); 5] = [
    ("domain_overlap", 0.25),
    ("trust_score", 0.25),
    ("response_coherence", 0.20),
    ("latency_score", 0.15),
    ("accord_bonus", 0.15),
];

/// Optional measured inputs for a `calibrate()` call; every field
/// defaults to the Python's neutral midpoint when omitted.
#[derive(Debug, Clone, Default)]
pub struct InteractionSample {
    pub relevance: Option<f64>,
    pub completion_rate: Option<f64>,
    pub error_rate: Option<f64>,
    pub latency_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub agent_a: String,
    pub agent_b: String,
    pub scores: HashMap<String, f64>,
    pub overall: f64,
    pub ts: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BeaconEstimate {
    pub agent_id: String,
    pub address: Option<String>,
    pub estimate: f64,
    pub grade: &'static str,
    pub components: HashMap<String, f64>,
    pub max_possible: f64,
    pub ts: i64,
}

/// Caller-supplied social/web metrics for the two 0-150 components the
/// Python original has no equivalent of (no built-in fetcher exists).
#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalMetrics {
    pub web_mentions: u64,
    pub social_followers: u64,
}

pub struct AtlasManager {
    store: Store,
    atlas: AtlasState,
    properties: PropertiesState,
}

impl AtlasManager {
    pub fn open(store: Store) -> StorageResult<Self> {
        let atlas = store.load_snapshot_or_default(ATLAS_FILE)?;
        let properties = store.load_snapshot_or_default(PROPERTIES_FILE)?;
        Ok(Self { store, atlas, properties })
    }

    fn save_atlas(&self) -> StorageResult<()> {
        self.store.snapshot(ATLAS_FILE, &self.atlas)
    }

    fn save_properties(&self) -> StorageResult<()> {
        self.store.snapshot(PROPERTIES_FILE, &self.properties)
    }

    // ── City management ──

    pub fn ensure_city(&mut self, domain: &str) -> StorageResult<City> {
        let key = domain.to_lowercase().trim().to_string();
        if let Some(city) = self.atlas.cities.get(&key) {
            return Ok(city.clone());
        }
        let (name, region, city_type, generated) = generate_city_name(&key);
        let city = City {
            domain: key.clone(),
            name,
            region,
            city_type,
            founded_at: now_s(),
            population: 0,
            residents: Vec::new(),
            generated,
        };
        self.atlas.cities.insert(key, city.clone());
        self.save_atlas()?;
        Ok(city)
    }

    pub fn get_city(&self, domain: &str) -> Option<&City> {
        self.atlas.cities.get(&domain.to_lowercase().trim().to_string())
    }

    pub fn all_cities(&self) -> Vec<&City> {
        let mut cities: Vec<&City> = self.atlas.cities.values().collect();
        cities.sort_by(|a, b| b.population.cmp(&a.population));
        cities
    }

    pub fn cities_by_region(&self, region: &str) -> Vec<&City> {
        self.atlas.cities.values().filter(|c| c.region.eq_ignore_ascii_case(region)).collect()
    }

    // ── Agent registration ──

    pub fn register_agent(
        &mut self,
        agent_id: &str,
        domains: &[String],
        name: &str,
        metadata: Option<Value>,
    ) -> StorageResult<RegistrationResult> {
        let now = now_s();
        let primary_domain = domains.first().cloned().unwrap_or_else(|| "general".to_string());

        if let Some(old) = self.properties.properties.get(agent_id).cloned() {
            for old_domain in &old.cities {
                self.remove_resident(old_domain, agent_id);
            }
        }

        for domain in domains {
            self.ensure_city(domain)?;
            self.add_resident(domain, agent_id);
        }

        let prop = Property {
            agent_id: agent_id.to_string(),
            name: name.to_string(),
            primary_city: primary_domain.clone(),
            cities: domains.to_vec(),
            registered_at: now,
            last_seen: now,
            metadata: metadata.unwrap_or(Value::Null),
        };
        self.properties.properties.insert(agent_id.to_string(), prop.clone());
        self.save_atlas()?;
        self.save_properties()?;

        let home = self.atlas.cities.get(&primary_domain).map(|c| c.name.clone()).unwrap_or(primary_domain);
        Ok(RegistrationResult { agent_id: agent_id.to_string(), home, cities_joined: domains.len(), property: prop })
    }

    pub fn unregister_agent(&mut self, agent_id: &str) -> StorageResult<bool> {
        let Some(prop) = self.properties.properties.remove(agent_id) else {
            return Ok(false);
        };
        for domain in &prop.cities {
            self.remove_resident(domain, agent_id);
        }
        self.save_atlas()?;
        self.save_properties()?;
        Ok(true)
    }

    fn add_resident(&mut self, domain: &str, agent_id: &str) {
        if let Some(city) = self.atlas.cities.get_mut(domain) {
            if !city.residents.iter().any(|r| r == agent_id) {
                city.residents.push(agent_id.to_string());
                city.population = city.residents.len() as u32;
                city.city_type = city_type_for_population(city.population);
            }
        }
    }

    fn remove_resident(&mut self, domain: &str, agent_id: &str) {
        if let Some(city) = self.atlas.cities.get_mut(domain) {
            city.residents.retain(|r| r != agent_id);
            city.population = city.residents.len() as u32;
            city.city_type = city_type_for_population(city.population);
        }
    }

    pub fn get_property(&self, agent_id: &str) -> Option<&Property> {
        self.properties.properties.get(agent_id)
    }

    /// Human-readable `"Name @ CityName, Region"` address.
    pub fn agent_address(&self, agent_id: &str) -> Option<String> {
        let prop = self.properties.properties.get(agent_id)?;
        let city = self.atlas.cities.get(&prop.primary_city);
        let city_name = city.map(|c| c.name.clone()).unwrap_or_else(|| prop.primary_city.clone());
        let region = city.map(|c| c.region.clone()).unwrap_or_else(|| "Unknown Region".to_string());
        let name = if prop.name.is_empty() { agent_id.to_string() } else { prop.name.clone() };
        Some(format!("{name} @ {city_name}, {region}"))
    }

    pub fn update_last_seen(&mut self, agent_id: &str) -> StorageResult<()> {
        if let Some(prop) = self.properties.properties.get_mut(agent_id) {
            prop.last_seen = now_s();
            self.save_properties()?;
        }
        Ok(())
    }

    // ── Population density ──

    pub fn population_stats(&self) -> PopulationStats {
        let total_agents = self.properties.properties.len();
        let total_cities = self.atlas.cities.len();
        let mut by_region: HashMap<String, u32> = HashMap::new();
        for city in self.atlas.cities.values() {
            *by_region.entry(city.region.clone()).or_insert(0) += city.population;
        }
        PopulationStats {
            total_agents,
            total_cities,
            density: round2(total_agents as f64 / total_cities.max(1) as f64),
            by_region,
            updated_at: now_s(),
        }
    }

    pub fn density_map(&self) -> Vec<DensityEntry> {
        let mut cities: Vec<&City> = self.atlas.cities.values().collect();
        cities.sort_by(|a, b| b.population.cmp(&a.population));
        cities
            .into_iter()
            .enumerate()
            .map(|(i, c)| DensityEntry {
                domain: c.domain.clone(),
                city: c.name.clone(),
                region: c.region.clone(),
                city_type: c.city_type.clone(),
                population: c.population,
                density_rank: i + 1,
            })
            .collect()
    }

    pub fn hotspots(&self, min_population: u32) -> Vec<DensityEntry> {
        self.density_map().into_iter().filter(|c| c.population >= min_population).collect()
    }

    pub fn rural_properties(&self, max_population: u32) -> Vec<DensityEntry> {
        self.density_map().into_iter().filter(|c| c.population > 0 && c.population <= max_population).collect()
    }

    // ── Calibration ──

    pub fn calibrate(
        &self,
        agent_a: &str,
        agent_b: &str,
        trust: Option<&TrustStore>,
        accords: Option<&AccordManager>,
        sample: Option<&InteractionSample>,
    ) -> StorageResult<CalibrationResult> {
        let mut scores: HashMap<String, f64> = HashMap::new();

        let domains_a: std::collections::HashSet<&str> =
            self.properties.properties.get(agent_a).map(|p| p.cities.iter().map(String::as_str).collect()).unwrap_or_default();
        let domains_b: std::collections::HashSet<&str> =
            self.properties.properties.get(agent_b).map(|p| p.cities.iter().map(String::as_str).collect()).unwrap_or_default();
        let union: std::collections::HashSet<&str> = domains_a.union(&domains_b).copied().collect();
        let domain_overlap = if union.is_empty() {
            0.0
        } else {
            domains_a.intersection(&domains_b).count() as f64 / union.len() as f64
        };
        scores.insert("domain_overlap".to_string(), domain_overlap);

        let trust_score = match trust {
            Some(t) => t.score(agent_b).map(|s| s.score.min(1.0)).unwrap_or(0.5),
            None => 0.5,
        };
        scores.insert("trust_score".to_string(), trust_score);

        let (relevance, completion, error_rate) = sample
            .map(|s| (s.relevance.unwrap_or(0.7), s.completion_rate.unwrap_or(0.8), s.error_rate.unwrap_or(0.1)))
            .unwrap_or((0.7, 0.8, 0.1));
        scores.insert("response_coherence".to_string(), relevance * 0.5 + completion * 0.3 + (1.0 - error_rate) * 0.2);

        let latency_score = match sample.and_then(|s| s.latency_ms) {
            Some(latency_ms) => 1.0 / (1.0 + ((latency_ms - 1000.0) / 500.0).exp()),
            None => 0.5,
        };
        scores.insert("latency_score".to_string(), latency_score);

        let accord_bonus = accords
            .and_then(|a| a.find_accord_with(agent_b))
            .map(|a| if matches!(a.state, beacon_agreements::AccordState::Active) { 1.0 } else { 0.0 })
            .unwrap_or(0.0);
        scores.insert("accord_bonus".to_string(), accord_bonus);

        let overall: f64 = CALIBRATION_WEIGHTS.iter().map(|(k, w)| scores.get(*k).copied().unwrap_or(0.0) * w).sum();
        let result = CalibrationResult {
            agent_a: agent_a.to_string(),
            agent_b: agent_b.to_string(),
            scores,
            overall: round4(overall),
            ts: now_s(),
        };
        self.store.append(CALIBRATIONS_LOG, &result)?;
        Ok(result)
    }

    pub fn calibration_history(&self, agent_id: &str, limit: usize) -> StorageResult<Vec<CalibrationResult>> {
        let all: Vec<CalibrationResult> = self.store.read_all(CALIBRATIONS_LOG)?;
        let mut filtered: Vec<CalibrationResult> =
            all.into_iter().filter(|c| c.agent_a == agent_id || c.agent_b == agent_id).collect();
        if filtered.len() > limit {
            filtered = filtered.split_off(filtered.len() - limit);
        }
        Ok(filtered)
    }

    pub fn best_neighbors(&self, agent_id: &str, limit: usize) -> StorageResult<Vec<(String, f64, usize)>> {
        let history = self.calibration_history(agent_id, 500)?;
        let mut by_peer: HashMap<String, Vec<f64>> = HashMap::new();
        for entry in &history {
            let peer = if entry.agent_a == agent_id { entry.agent_b.clone() } else { entry.agent_a.clone() };
            by_peer.entry(peer).or_default().push(entry.overall);
        }
        let mut neighbors: Vec<(String, f64, usize)> = by_peer
            .into_iter()
            .map(|(peer, scores)| {
                let avg = scores.iter().sum::<f64>() / scores.len() as f64;
                (peer, round4(avg), scores.len())
            })
            .collect();
        neighbors.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        neighbors.truncate(limit);
        Ok(neighbors)
    }

    // ── BeaconEstimate ──

    /// Composite valuation in `[0, 1300]` across eight components (see
    /// spec §4.15) — an expansion of the Python original's six.
    pub fn estimate(
        &self,
        agent_id: &str,
        trust: Option<&TrustStore>,
        accords: Option<&AccordManager>,
        heartbeat: Option<&HeartbeatManager>,
        external: Option<ExternalMetrics>,
    ) -> StorageResult<Option<BeaconEstimate>> {
        let Some(prop) = self.properties.properties.get(agent_id) else {
            return Ok(None);
        };
        let mut components: HashMap<String, f64> = HashMap::new();

        let city = self.atlas.cities.get(&prop.primary_city);
        let population = city.map(|c| c.population).unwrap_or(0);
        let city_type = city.map(|c| c.city_type.as_str()).unwrap_or("outpost");
        let type_mult = match city_type {
            "outpost" => 0.2,
            "village" => 0.4,
            "town" => 0.6,
            "city" => 0.8,
            "metropolis" => 0.9,
            "megalopolis" => 1.0,
            _ => 0.2,
        };
        let pop_score = (((population as f64).max(1.0) + 1.0).log2() / 7.0).min(1.0);
        components.insert("location".to_string(), round1((pop_score * 0.6 + type_mult * 0.4) * 200.0));

        let total_agents = self.properties.properties.len();
        let scarcity = if total_agents > 0 && population > 0 {
            let domain_share = population as f64 / total_agents as f64;
            let base = (1.0 - domain_share).max(0.0);
            let rural_bonus = if population <= 3 { 0.3 } else { 0.0 };
            round1((base + rural_bonus).min(1.0) * 150.0)
        } else {
            75.0
        };
        components.insert("scarcity".to_string(), scarcity);

        let cal_history = self.calibration_history(agent_id, 100)?;
        let network = if !cal_history.is_empty() {
            let avg_cal = cal_history.iter().map(|c| c.overall).sum::<f64>() / cal_history.len() as f64;
            let unique_peers: std::collections::HashSet<&str> = cal_history
                .iter()
                .map(|c| if c.agent_a == agent_id { c.agent_b.as_str() } else { c.agent_a.as_str() })
                .collect();
            let peer_breadth = (unique_peers.len() as f64 / 10.0).min(1.0);
            round1((avg_cal * 0.7 + peer_breadth * 0.3) * 200.0)
        } else {
            0.0
        };
        components.insert("network".to_string(), network);

        let reputation = match trust.and_then(|t| t.score(agent_id).ok()) {
            Some(s) => {
                let confidence = (s.total as f64 / 20.0).min(1.0);
                round1(s.score.min(1.0) * confidence * 200.0)
            }
            None => 100.0,
        };
        components.insert("reputation".to_string(), reputation);

        let uptime = match heartbeat.and_then(|h| h.own_status().ok()) {
            Some((beat_count, _)) => round1((beat_count as f64 / 100.0).min(1.0) * 100.0),
            None => 0.0,
        };
        components.insert("uptime".to_string(), uptime);

        let bonds = match accords {
            Some(a) => {
                let count = a.active_accords().len() as f64;
                round1(((count + 1.0).log2() / 3.0).min(1.0) * 150.0)
            }
            None => 0.0,
        };
        components.insert("bonds".to_string(), bonds);

        let ext = external.unwrap_or_default();
        let web_presence = round1((((ext.web_mentions as f64) + 1.0).log2() / 10.0).min(1.0) * 150.0);
        components.insert("web_presence".to_string(), web_presence);
        let social_reach = round1((((ext.social_followers as f64) + 1.0).log2() / 14.0).min(1.0) * 150.0);
        components.insert("social_reach".to_string(), social_reach);

        let total = round1(components.values().sum::<f64>().min(1300.0));
        let grade = if total >= 800.0 {
            "S"
        } else if total >= 650.0 {
            "A"
        } else if total >= 500.0 {
            "B"
        } else if total >= 350.0 {
            "C"
        } else if total >= 200.0 {
            "D"
        } else {
            "F"
        };

        let record = BeaconEstimate {
            agent_id: agent_id.to_string(),
            address: self.agent_address(agent_id),
            estimate: total,
            grade,
            components,
            max_possible: 1300.0,
            ts: now_s(),
        };
        self.store.append(VALUATIONS_LOG, &EstimateLogEntry::from(&record))?;
        Ok(Some(record))
    }

    // ── Market trends ──

    pub fn snapshot_market(&self) -> StorageResult<MarketSnapshot> {
        let mut cities = HashMap::new();
        for (domain, city) in &self.atlas.cities {
            cities.insert(domain.clone(), CitySnapshot { population: city.population, city_type: city.city_type.clone(), region: city.region.clone() });
        }
        let snapshot = MarketSnapshot {
            ts: now_s(),
            total_agents: self.properties.properties.len(),
            total_cities: self.atlas.cities.len(),
            cities,
        };
        self.store.append(MARKET_HISTORY_LOG, &snapshot)?;
        Ok(snapshot)
    }

    pub fn market_trends(&self, limit: usize) -> StorageResult<Option<MarketTrends>> {
        let all: Vec<MarketSnapshot> = self.store.read_all(MARKET_HISTORY_LOG)?;
        let mut snapshots = all;
        if snapshots.len() > limit {
            snapshots = snapshots.split_off(snapshots.len() - limit);
        }
        if snapshots.len() < 2 {
            return Ok(None);
        }

        let first = snapshots.first().unwrap();
        let latest = snapshots.last().unwrap();
        let time_span_days = ((latest.ts - first.ts) as f64 / 86_400.0).max(0.01);

        let agent_growth = latest.total_agents as i64 - first.total_agents as i64;
        let city_growth = latest.total_cities as i64 - first.total_cities as i64;

        let mut domains: std::collections::HashSet<&String> = first.cities.keys().collect();
        domains.extend(latest.cities.keys());

        let mut city_trends = HashMap::new();
        for domain in domains {
            let old_pop = first.cities.get(domain).map(|c| c.population).unwrap_or(0);
            let new_pop = latest.cities.get(domain).map(|c| c.population).unwrap_or(0);
            let delta = new_pop as i64 - old_pop as i64;
            let region = latest.cities.get(domain).or_else(|| first.cities.get(domain)).map(|c| c.region.clone()).unwrap_or_default();
            let name = self.atlas.cities.get(domain).map(|c| c.name.clone()).unwrap_or_else(|| domain.clone());
            city_trends.insert(
                domain.clone(),
                CityTrend {
                    name,
                    region,
                    current_population: new_pop,
                    change: delta,
                    growth_rate: round1(delta as f64 / old_pop.max(1) as f64 * 100.0),
                    trend: if delta > 0 { "growing" } else if delta < 0 { "declining" } else { "stable" },
                },
            );
        }

        Ok(Some(MarketTrends {
            period_days: round1(time_span_days),
            snapshots: snapshots.len(),
            agent_growth,
            agent_growth_rate: round1(agent_growth as f64 / first.total_agents.max(1) as f64 * 100.0),
            city_growth,
            current_agents: latest.total_agents,
            current_cities: latest.total_cities,
            city_trends,
        }))
    }

    // ── Comparables, listings, appreciation, leaderboard ──

    /// Historical `estimate()` runs for an agent, oldest first — the
    /// basis for `appreciation()`.
    pub fn valuation_history(&self, agent_id: &str, limit: usize) -> StorageResult<Vec<EstimateLogEntry>> {
        let all: Vec<EstimateLogEntry> = self.store.read_all(VALUATIONS_LOG)?;
        let mut filtered: Vec<EstimateLogEntry> = all.into_iter().filter(|e| e.agent_id == agent_id).collect();
        if filtered.len() > limit {
            filtered = filtered.split_off(filtered.len() - limit);
        }
        Ok(filtered)
    }

    /// Other agents in the same or a neighboring city — collaborators
    /// worth reaching out to, ranked same-city before same-region.
    pub fn opportunities_near(&self, agent_id: &str) -> Vec<Opportunity> {
        let Some(prop) = self.properties.properties.get(agent_id) else {
            return Vec::new();
        };
        let my_cities: std::collections::HashSet<&str> = prop.cities.iter().map(String::as_str).collect();
        let my_regions: std::collections::HashSet<&str> = my_cities
            .iter()
            .filter_map(|d| self.atlas.cities.get(*d).map(|c| c.region.as_str()))
            .collect();

        let mut opportunities: Vec<Opportunity> = Vec::new();
        for (other_id, other_prop) in &self.properties.properties {
            if other_id == agent_id {
                continue;
            }
            let other_cities: std::collections::HashSet<&str> = other_prop.cities.iter().map(String::as_str).collect();
            let shared_cities: Vec<String> = my_cities.intersection(&other_cities).map(|s| s.to_string()).collect();
            let other_regions: std::collections::HashSet<&str> = other_cities
                .iter()
                .filter_map(|d| self.atlas.cities.get(*d).map(|c| c.region.as_str()))
                .collect();
            let shared_regions: Vec<String> = my_regions.intersection(&other_regions).map(|s| s.to_string()).collect();

            let proximity = if !shared_cities.is_empty() {
                "same_city"
            } else if !shared_regions.is_empty() {
                "same_region"
            } else {
                continue;
            };

            opportunities.push(Opportunity {
                agent_id: other_id.clone(),
                name: other_prop.name.clone(),
                proximity,
                shared_cities,
                shared_regions,
                address: self.agent_address(other_id),
            });
        }
        opportunities.sort_by_key(|o| if o.proximity == "same_city" { 0 } else { 1 });
        opportunities
    }

    /// Agents most similar to `agent_id` by domain overlap plus a
    /// location bonus (same city, then same region), each carrying its
    /// own `estimate()`.
    pub fn comps(
        &self,
        agent_id: &str,
        limit: usize,
        trust: Option<&TrustStore>,
        accords: Option<&AccordManager>,
        heartbeat: Option<&HeartbeatManager>,
    ) -> StorageResult<Vec<ComparableAgent>> {
        let Some(prop) = self.properties.properties.get(agent_id) else {
            return Ok(Vec::new());
        };
        let my_domains: std::collections::HashSet<&str> = prop.cities.iter().map(String::as_str).collect();
        let my_primary = prop.primary_city.clone();
        let my_region = self.atlas.cities.get(&my_primary).map(|c| c.region.clone()).unwrap_or_default();

        let mut candidates: Vec<(String, f64, Vec<String>, String)> = Vec::new();
        for (other_id, other_prop) in &self.properties.properties {
            if other_id == agent_id {
                continue;
            }
            let other_domains: std::collections::HashSet<&str> = other_prop.cities.iter().map(String::as_str).collect();
            let union: std::collections::HashSet<&str> = my_domains.union(&other_domains).copied().collect();
            let intersection: Vec<&str> = my_domains.intersection(&other_domains).copied().collect();
            let domain_sim = if union.is_empty() { 0.0 } else { intersection.len() as f64 / union.len() as f64 };

            let other_region = self.atlas.cities.get(&other_prop.primary_city).map(|c| c.region.clone()).unwrap_or_default();
            let location_bonus = if my_primary == other_prop.primary_city {
                0.3
            } else if my_region == other_region {
                0.15
            } else {
                0.0
            };

            let similarity = round4(domain_sim * 0.7 + location_bonus);
            candidates.push((other_id.clone(), similarity, intersection.into_iter().map(str::to_string).collect(), other_prop.primary_city.clone()));
        }
        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        candidates.truncate(limit);

        let mut comps = Vec::with_capacity(candidates.len());
        for (other_id, similarity, shared_domains, primary_city) in candidates {
            let est = self.estimate(&other_id, trust, accords, heartbeat, None)?;
            let (estimate, grade) = est.map(|e| (e.estimate, e.grade)).unwrap_or((0.0, "?"));
            let name = self.properties.properties.get(&other_id).map(|p| p.name.clone()).unwrap_or_else(|| other_id.clone());
            comps.push(ComparableAgent {
                agent_id: other_id.clone(),
                name,
                address: self.agent_address(&other_id),
                similarity,
                shared_domains,
                primary_city,
                estimate,
                grade,
            });
        }
        Ok(comps)
    }

    /// A full property listing: address, valuation, neighborhood, and
    /// comparable agents — everything `comps`/`best_neighbors`/
    /// `opportunities_near`/`estimate` know about this agent, assembled
    /// in one call.
    pub fn listing(
        &self,
        agent_id: &str,
        trust: Option<&TrustStore>,
        accords: Option<&AccordManager>,
        heartbeat: Option<&HeartbeatManager>,
    ) -> StorageResult<Option<Listing>> {
        let Some(prop) = self.properties.properties.get(agent_id).cloned() else {
            return Ok(None);
        };
        let est = self.estimate(agent_id, trust, accords, heartbeat, None)?;
        let (estimate, grade, components) =
            est.map(|e| (e.estimate, e.grade, e.components)).unwrap_or((0.0, "?", HashMap::new()));

        Ok(Some(Listing {
            agent_id: agent_id.to_string(),
            name: prop.name.clone(),
            address: self.agent_address(agent_id),
            registered_since: prop.registered_at,
            last_active: prop.last_seen,
            domains: prop.cities.clone(),
            estimate,
            grade,
            components,
            best_neighbors: self.best_neighbors(agent_id, 5)?,
            nearby_opportunities: self.opportunities_near(agent_id),
            comparables: self.comps(agent_id, 3, trust, accords, heartbeat)?,
        }))
    }

    /// Value change over the agent's `valuation_history`: needs at
    /// least two recorded estimates, else reports how many it has.
    pub fn appreciation(&self, agent_id: &str) -> StorageResult<Appreciation> {
        let history = self.valuation_history(agent_id, 1000)?;
        if history.len() < 2 {
            return Ok(Appreciation::InsufficientData { agent_id: agent_id.to_string(), valuations: history.len() });
        }

        let first = history.first().unwrap();
        let latest = history.last().unwrap();
        let time_span_days = ((latest.ts - first.ts) as f64 / 86_400.0).max(0.01);
        let value_change = latest.estimate - first.estimate;
        let change_pct = round1(value_change / first.estimate.max(1.0) * 100.0);
        let daily_rate = round2(value_change / time_span_days);

        let grade_order = |g: &str| match g {
            "S" => 5,
            "A" => 4,
            "B" => 3,
            "C" => 2,
            "D" => 1,
            "F" => 0,
            _ => -1,
        };
        let grade_history: Vec<String> = history.iter().map(|h| h.grade.clone()).collect();
        let grade_trend = match grade_order(latest.grade.as_str()).cmp(&grade_order(first.grade.as_str())) {
            std::cmp::Ordering::Greater => "improving",
            std::cmp::Ordering::Less => "declining",
            std::cmp::Ordering::Equal => "stable",
        };

        Ok(Appreciation::Computed {
            agent_id: agent_id.to_string(),
            address: self.agent_address(agent_id),
            first_estimate: first.estimate,
            current_estimate: latest.estimate,
            change: round1(value_change),
            change_pct,
            daily_rate,
            period_days: round1(time_span_days),
            grade_history,
            grade_trend,
            valuations_count: history.len(),
        })
    }

    /// Top agents by `estimate()`, ranked 1..=limit.
    pub fn leaderboard(
        &self,
        limit: usize,
        trust: Option<&TrustStore>,
        accords: Option<&AccordManager>,
        heartbeat: Option<&HeartbeatManager>,
    ) -> StorageResult<Vec<LeaderboardEntry>> {
        let mut board: Vec<LeaderboardEntry> = Vec::new();
        for agent_id in self.properties.properties.keys().cloned().collect::<Vec<_>>() {
            let Some(est) = self.estimate(&agent_id, trust, accords, heartbeat, None)? else {
                continue;
            };
            let name = self.properties.properties.get(&agent_id).map(|p| p.name.clone()).unwrap_or_else(|| agent_id.clone());
            board.push(LeaderboardEntry {
                rank: 0,
                agent_id,
                name,
                address: est.address.clone(),
                estimate: est.estimate,
                grade: est.grade,
            });
        }
        board.sort_by(|a, b| b.estimate.partial_cmp(&a.estimate).unwrap());
        board.truncate(limit);
        for (i, entry) in board.iter_mut().enumerate() {
            entry.rank = i + 1;
        }
        Ok(board)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Opportunity {
    pub agent_id: String,
    pub name: String,
    pub proximity: &'static str,
    pub shared_cities: Vec<String>,
    pub shared_regions: Vec<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparableAgent {
    pub agent_id: String,
    pub name: String,
    pub address: Option<String>,
    pub similarity: f64,
    pub shared_domains: Vec<String>,
    pub primary_city: String,
    pub estimate: f64,
    pub grade: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub agent_id: String,
    pub name: String,
    pub address: Option<String>,
    pub registered_since: i64,
    pub last_active: i64,
    pub domains: Vec<String>,
    pub estimate: f64,
    pub grade: &'static str,
    pub components: HashMap<String, f64>,
    pub best_neighbors: Vec<(String, f64, usize)>,
    pub nearby_opportunities: Vec<Opportunity>,
    pub comparables: Vec<ComparableAgent>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Appreciation {
    InsufficientData {
        agent_id: String,
        valuations: usize,
    },
    Computed {
        agent_id: String,
        address: Option<String>,
        first_estimate: f64,
        current_estimate: f64,
        change: f64,
        change_pct: f64,
        daily_rate: f64,
        period_days: f64,
        grade_history: Vec<String>,
        grade_trend: &'static str,
        valuations_count: usize,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub agent_id: String,
    pub name: String,
    pub address: Option<String>,
    pub estimate: f64,
    pub grade: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateLogEntry {
    pub agent_id: String,
    pub estimate: f64,
    pub grade: String,
    pub ts: i64,
}

impl From<&BeaconEstimate> for EstimateLogEntry {
    fn from(e: &BeaconEstimate) -> Self {
        Self { agent_id: e.agent_id.clone(), estimate: e.estimate, grade: e.grade.to_string(), ts: e.ts }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CitySnapshot {
    population: u32,
    #[serde(rename = "type")]
    city_type: String,
    region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub ts: i64,
    pub total_agents: usize,
    pub total_cities: usize,
    cities: HashMap<String, CitySnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CityTrend {
    pub name: String,
    pub region: String,
    pub current_population: u32,
    pub change: i64,
    pub growth_rate: f64,
    pub trend: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketTrends {
    pub period_days: f64,
    pub snapshots: usize,
    pub agent_growth: i64,
    pub agent_growth_rate: f64,
    pub city_growth: i64,
    pub current_agents: usize,
    pub current_cities: usize,
    pub city_trends: HashMap<String, CityTrend>,
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> (tempfile::TempDir, AtlasManager) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        (dir, AtlasManager::open(store).unwrap())
    }

    #[test]
    fn ensure_city_is_idempotent_and_uses_founding_table() {
        let (_dir, mut atlas) = open();
        let a = atlas.ensure_city("coding").unwrap();
        let b = atlas.ensure_city("CODING").unwrap();
        assert_eq!(a.name, "Compiler Heights");
        assert_eq!(a.domain, b.domain);
    }

    #[test]
    fn unknown_domain_generates_deterministic_procedural_city() {
        let (_dir, mut atlas) = open();
        let a = atlas.ensure_city("underwater-basket-weaving").unwrap();
        let b = atlas.get_city("underwater-basket-weaving").unwrap();
        assert_eq!(a.name, b.name);
        assert!(a.generated);
    }

    #[test]
    fn register_agent_updates_city_population_and_type() {
        let (_dir, mut atlas) = open();
        atlas.register_agent("bcn_a", &["coding".to_string()], "Alice", None).unwrap();
        let city = atlas.get_city("coding").unwrap();
        assert_eq!(city.population, 1);
        assert_eq!(city.city_type, "village");
    }

    #[test]
    fn reregistering_moves_agent_between_cities() {
        let (_dir, mut atlas) = open();
        atlas.register_agent("bcn_a", &["coding".to_string()], "Alice", None).unwrap();
        atlas.register_agent("bcn_a", &["research".to_string()], "Alice", None).unwrap();
        assert_eq!(atlas.get_city("coding").unwrap().population, 0);
        assert_eq!(atlas.get_city("research").unwrap().population, 1);
    }

    #[test]
    fn calibrate_with_no_inputs_returns_neutral_midpoints() {
        let (_dir, atlas) = open();
        let result = atlas.calibrate("bcn_a", "bcn_b", None, None, None).unwrap();
        assert_eq!(result.scores["trust_score"], 0.5);
        assert_eq!(result.scores["accord_bonus"], 0.0);
    }

    #[test]
    fn estimate_for_unregistered_agent_is_none() {
        let (_dir, atlas) = open();
        assert!(atlas.estimate("bcn_ghost", None, None, None, None).unwrap().is_none());
    }

    #[test]
    fn estimate_caps_at_1300_and_grades_accordingly() {
        let (_dir, mut atlas) = open();
        atlas.register_agent("bcn_a", &["coding".to_string()], "Alice", None).unwrap();
        let est = atlas
            .estimate("bcn_a", None, None, None, Some(ExternalMetrics { web_mentions: 10_000, social_followers: 50_000 }))
            .unwrap()
            .unwrap();
        assert!(est.estimate <= 1300.0);
        assert!(["S", "A", "B", "C", "D", "F"].contains(&est.grade));
    }

    #[test]
    fn market_trends_needs_at_least_two_snapshots() {
        let (_dir, mut atlas) = open();
        atlas.register_agent("bcn_a", &["coding".to_string()], "Alice", None).unwrap();
        atlas.snapshot_market().unwrap();
        assert!(atlas.market_trends(30).unwrap().is_none());
    }

    #[test]
    fn comps_ranks_shared_domain_and_city_above_strangers() {
        let (_dir, mut atlas) = open();
        atlas.register_agent("bcn_a", &["coding".to_string()], "Alice", None).unwrap();
        atlas.register_agent("bcn_b", &["coding".to_string()], "Bob", None).unwrap();
        atlas.register_agent("bcn_c", &["music".to_string()], "Carol", None).unwrap();

        let comps = atlas.comps("bcn_a", 5, None, None, None).unwrap();
        assert_eq!(comps[0].agent_id, "bcn_b");
        assert!(comps[0].similarity > comps.iter().find(|c| c.agent_id == "bcn_c").unwrap().similarity);
    }

    #[test]
    fn opportunities_near_ranks_same_city_first() {
        let (_dir, mut atlas) = open();
        atlas.register_agent("bcn_a", &["coding".to_string()], "Alice", None).unwrap();
        atlas.register_agent("bcn_b", &["coding".to_string()], "Bob", None).unwrap();
        atlas.register_agent("bcn_c", &["devops".to_string()], "Carol", None).unwrap();

        let opps = atlas.opportunities_near("bcn_a");
        assert_eq!(opps[0].agent_id, "bcn_b");
        assert_eq!(opps[0].proximity, "same_city");
    }

    #[test]
    fn listing_for_unregistered_agent_is_none() {
        let (_dir, atlas) = open();
        assert!(atlas.listing("bcn_ghost", None, None, None).unwrap().is_none());
    }

    #[test]
    fn listing_bundles_estimate_and_comps() {
        let (_dir, mut atlas) = open();
        atlas.register_agent("bcn_a", &["coding".to_string()], "Alice", None).unwrap();
        atlas.register_agent("bcn_b", &["coding".to_string()], "Bob", None).unwrap();
        let listing = atlas.listing("bcn_a", None, None, None).unwrap().unwrap();
        assert_eq!(listing.agent_id, "bcn_a");
        assert!(!listing.comparables.is_empty());
    }

    #[test]
    fn appreciation_needs_two_valuations() {
        let (_dir, mut atlas) = open();
        atlas.register_agent("bcn_a", &["coding".to_string()], "Alice", None).unwrap();
        atlas.estimate("bcn_a", None, None, None, None).unwrap();
        match atlas.appreciation("bcn_a").unwrap() {
            Appreciation::InsufficientData { valuations, .. } => assert_eq!(valuations, 1),
            Appreciation::Computed { .. } => panic!("expected insufficient data"),
        }
    }

    #[test]
    fn leaderboard_ranks_estimates_descending() {
        let (_dir, mut atlas) = open();
        atlas.register_agent("bcn_a", &["coding".to_string()], "Alice", None).unwrap();
        atlas.register_agent("bcn_b", &["coding".to_string()], "Bob", None).unwrap();
        let board = atlas.leaderboard(10, None, None, None).unwrap();
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].rank, 1);
        assert!(board[0].estimate >= board[1].estimate);
    }
}
