//! TOML-based simulation configuration and factorial-design presets.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Fractional safety margin added on top of expected demand-during-lead-time
/// when sizing a replenishment order.
pub const SAFETY_MARGIN: f64 = 0.20;
/// Maximum number of orders that may be in transit simultaneously.
pub const MAX_CONCURRENT_ORDERS: usize = 3;

/// Status-quo hub capacity (metric tons), the smaller of the two factorial
/// capacity levels.
pub const CAPACITY_STATUS_QUO: f64 = 431.0;
/// Proposed hub capacity (metric tons), the larger factorial capacity level.
pub const CAPACITY_PROPOSED: f64 = 681.0;
/// Baseline daily demand (metric tons) used by every built-in preset.
pub const BASE_DAILY_DEMAND: f64 = 52.5;
/// Nominal (unblocked) lead time in days used by every built-in preset.
pub const NOMINAL_LEAD_TIME: f64 = 6.0;

/// Immutable parameter set for one simulation run.
///
/// All invariants are checked by [`SimulationConfig::validate`]; construct
/// through [`SimulationConfig::new`] or [`SimulationConfig::baseline`]
/// rather than building the struct literal directly in library code, since
/// the literal form is not guaranteed valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SimulationConfig {
    /// Storage capacity Cmax (metric tons, > 0).
    pub capacity_tm: f64,
    /// Reorder point R (metric tons, `0 < R < capacity_tm`).
    pub reorder_point_tm: f64,
    /// Nominal order quantity Q (metric tons, > 0). Carried for reporting
    /// and the factorial preset; the kernel sizes orders dynamically (see
    /// `sim::kernel`) and does not read this field directly.
    pub order_quantity_tm: f64,
    /// Initial inventory I0 (metric tons, `0 <= I0 <= capacity_tm`).
    pub initial_inventory_tm: f64,
    /// Base daily demand d̄ (metric tons, > 0).
    pub base_daily_demand_tm: f64,
    /// Demand variability (coefficient of variation of the daily noise, in `[0, 1)`).
    pub demand_variability: f64,
    /// Seasonal amplitude A, in `[0, 1)`.
    pub seasonal_amplitude: f64,
    /// Day of year (1..=365) at which seasonal demand peaks.
    pub peak_winter_day: u32,
    /// Whether seasonal modulation is applied to daily demand.
    pub use_seasonality: bool,
    /// Nominal (unblocked) lead time L̄ in days (> 0, fractional allowed).
    pub nominal_lead_time_days: f64,
    /// Annual disruption arrival rate λ_y (>= 0, disruptions/year).
    pub annual_disruption_rate: f64,
    /// Minimum disruption duration in days (triangular distribution).
    pub disruption_min_days: f64,
    /// Modal disruption duration in days (triangular distribution).
    pub disruption_mode_days: f64,
    /// Maximum disruption duration in days (triangular distribution).
    pub disruption_max_days: f64,
    /// Simulation horizon T, in days (> 0).
    pub simulation_days: u32,
    /// 64-bit seed for the replica's RNG stream.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            capacity_tm: CAPACITY_STATUS_QUO,
            reorder_point_tm: 394.0,
            order_quantity_tm: 230.0,
            initial_inventory_tm: 258.6,
            base_daily_demand_tm: BASE_DAILY_DEMAND,
            demand_variability: 0.15,
            seasonal_amplitude: 0.30,
            peak_winter_day: 200,
            use_seasonality: true,
            nominal_lead_time_days: NOMINAL_LEAD_TIME,
            annual_disruption_rate: 4.0,
            disruption_min_days: 3.0,
            disruption_mode_days: 7.0,
            disruption_max_days: 21.0,
            simulation_days: 365,
            seed: 42,
        }
    }
}

/// Configuration parse/load error with a field path and message.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path, or `"toml"`/`"scenario"` for file-level failures.
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {} — {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl SimulationConfig {
    /// Returns the built-in baseline configuration (status-quo capacity).
    pub fn baseline() -> Self {
        Self::default()
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read or the TOML is
    /// invalid or contains unknown fields.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "scenario".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the TOML is invalid or contains unknown
    /// fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all invariants and returns a list of violations. An empty
    /// vector means the configuration is admissible.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.capacity_tm <= 0.0 {
            errors.push(ValidationError::new("capacity_tm", "must be > 0"));
        }
        if !(self.reorder_point_tm > 0.0 && self.reorder_point_tm < self.capacity_tm) {
            errors.push(ValidationError::new(
                "reorder_point_tm",
                "must satisfy 0 < reorder_point_tm < capacity_tm",
            ));
        }
        if self.order_quantity_tm <= 0.0 {
            errors.push(ValidationError::new("order_quantity_tm", "must be > 0"));
        }
        if !(0.0..=self.capacity_tm).contains(&self.initial_inventory_tm) {
            errors.push(ValidationError::new(
                "initial_inventory_tm",
                "must satisfy 0 <= initial_inventory_tm <= capacity_tm",
            ));
        }
        if self.base_daily_demand_tm <= 0.0 {
            errors.push(ValidationError::new("base_daily_demand_tm", "must be > 0"));
        }
        if !(0.0..1.0).contains(&self.demand_variability) {
            errors.push(ValidationError::new(
                "demand_variability",
                "must be in [0, 1)",
            ));
        }
        if !(0.0..1.0).contains(&self.seasonal_amplitude) {
            errors.push(ValidationError::new(
                "seasonal_amplitude",
                "must be in [0, 1)",
            ));
        }
        if !(1..=365).contains(&self.peak_winter_day) {
            errors.push(ValidationError::new("peak_winter_day", "must be in 1..=365"));
        }
        if self.nominal_lead_time_days <= 0.0 {
            errors.push(ValidationError::new(
                "nominal_lead_time_days",
                "must be > 0",
            ));
        }
        if self.annual_disruption_rate < 0.0 {
            errors.push(ValidationError::new(
                "annual_disruption_rate",
                "must be >= 0",
            ));
        }
        if !(self.disruption_min_days <= self.disruption_mode_days
            && self.disruption_mode_days <= self.disruption_max_days)
        {
            errors.push(ValidationError::new(
                "disruption_mode_days",
                "must satisfy disruption_min_days <= disruption_mode_days <= disruption_max_days",
            ));
        }
        if self.disruption_min_days < 0.0 {
            errors.push(ValidationError::new("disruption_min_days", "must be >= 0"));
        }
        if self.simulation_days == 0 {
            errors.push(ValidationError::new("simulation_days", "must be > 0"));
        }

        errors
    }

    /// Soft warnings: conditions that are admissible but likely
    /// misconfigurations. Unlike [`Self::validate`], these never block
    /// construction or a simulation run.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let demand_during_lead_time = self.base_daily_demand_tm * self.nominal_lead_time_days;
        if self.reorder_point_tm < demand_during_lead_time {
            warnings.push(format!(
                "reorder_point_tm ({:.2}) is below expected demand during lead time ({:.2}); \
                 the policy cannot reliably cover lead-time demand",
                self.reorder_point_tm, demand_during_lead_time
            ));
        }
        warnings
    }

    /// Theoretical autonomy at full capacity: `capacity_tm / base_daily_demand_tm`.
    pub fn theoretical_autonomy_days(&self) -> f64 {
        self.capacity_tm / self.base_daily_demand_tm
    }

    /// Safety-stock days implied by the reorder point above expected
    /// lead-time demand.
    pub fn safety_stock_days(&self) -> f64 {
        let demand_during_lead_time = self.base_daily_demand_tm * self.nominal_lead_time_days;
        (self.reorder_point_tm - demand_during_lead_time) / self.base_daily_demand_tm
    }

    /// Names of the built-in presets [`Self::from_preset`] accepts.
    pub const PRESETS: &[&str] = &[
        "baseline", "SQ_Short", "SQ_Medium", "SQ_Long", "P_Short", "P_Medium", "P_Long",
    ];

    /// Loads a configuration from a named preset: `"baseline"` or one of the
    /// six factorial-design cells produced by [`factorial_configs`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        if name == "baseline" {
            return Ok(Self::baseline());
        }
        factorial_configs(Self::default().seed, Self::default().simulation_days)
            .into_iter()
            .find(|(cell_name, _)| cell_name == name)
            .map(|(_, cfg)| cfg)
            .ok_or_else(|| ConfigError {
                field: "preset".to_string(),
                message: format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            })
    }
}

/// A named triangular disruption-duration profile for the factorial design.
#[derive(Debug, Clone, Copy)]
pub struct DisruptionProfile {
    /// Profile label (`"Short"`, `"Medium"`, `"Long"`).
    pub name: &'static str,
    /// Minimum duration in days.
    pub min_days: f64,
    /// Modal duration in days.
    pub mode_days: f64,
    /// Maximum duration in days.
    pub max_days: f64,
}

/// Short-disruption profile (3–5–7 days).
pub const DISRUPTION_SHORT: DisruptionProfile = DisruptionProfile {
    name: "Short",
    min_days: 3.0,
    mode_days: 5.0,
    max_days: 7.0,
};
/// Medium-disruption profile (3–7–14 days).
pub const DISRUPTION_MEDIUM: DisruptionProfile = DisruptionProfile {
    name: "Medium",
    min_days: 3.0,
    mode_days: 7.0,
    max_days: 14.0,
};
/// Long-disruption profile (3–10.5–21 days).
pub const DISRUPTION_LONG: DisruptionProfile = DisruptionProfile {
    name: "Long",
    min_days: 3.0,
    mode_days: 10.5,
    max_days: 21.0,
};

/// Builds the six `{SQ|P}_{Short|Medium|Long}` configurations of the 2×3
/// factorial design (capacity × disruption duration).
///
/// Labels follow the mapping the ANOVA endpoint's category coercion
/// expects: capacity `<= 450.0` is the status-quo level, disruption
/// `max_days <= 7.0` is "Corta", `<= 14.0` is "Media", otherwise "Larga"
/// (see [`crate::experiment::anova`]).
pub fn factorial_configs(base_seed: u64, simulation_days: u32) -> Vec<(String, SimulationConfig)> {
    let capacities: [(&str, f64); 2] = [("SQ", CAPACITY_STATUS_QUO), ("P", CAPACITY_PROPOSED)];
    let disruptions = [DISRUPTION_SHORT, DISRUPTION_MEDIUM, DISRUPTION_LONG];

    let mut configs = Vec::with_capacity(capacities.len() * disruptions.len());
    for (cap_name, cap_value) in capacities {
        for dis in disruptions {
            let name = format!("{cap_name}_{}", dis.name);
            let config = SimulationConfig {
                capacity_tm: cap_value,
                reorder_point_tm: cap_value * 0.91,
                order_quantity_tm: cap_value * 0.53,
                initial_inventory_tm: cap_value * 0.60,
                disruption_min_days: dis.min_days,
                disruption_mode_days: dis.mode_days,
                disruption_max_days: dis.max_days,
                simulation_days,
                seed: base_seed,
                ..SimulationConfig::default()
            };
            configs.push((name, config));
        }
    }
    configs
}

/// A named, stored configuration — the unit the HTTP configuration CRUD
/// endpoints and an experiment's `configuracion_id` reference point at.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigRecord {
    pub id: u64,
    pub name: String,
    pub config: SimulationConfig,
}

/// CRUD surface over stored configurations. Shaped like
/// `experiment::store::ExperimentStore`, but kept as its own trait:
/// configurations and experiments have independent lifecycles, and deleting
/// a configuration must not cascade to experiments that already captured a
/// copy of it.
pub trait ConfigStore: Send + Sync {
    /// Inserts a new named configuration and returns its assigned id.
    fn insert(&self, name: String, config: SimulationConfig) -> u64;
    /// Fetches a single configuration record by id.
    fn get(&self, id: u64) -> Result<ConfigRecord, crate::error::NotFoundError>;
    /// Lists all stored configurations, lowest id first.
    fn list(&self) -> Vec<ConfigRecord>;
    /// Removes a configuration, returning an error if it does not exist.
    fn delete(&self, id: u64) -> Result<(), crate::error::NotFoundError>;
}

/// A process-local, mutex-guarded configuration registry.
#[derive(Default)]
pub struct InMemoryConfigStore {
    inner: std::sync::Mutex<InMemoryConfigState>,
}

#[derive(Default)]
struct InMemoryConfigState {
    next_id: u64,
    records: std::collections::HashMap<u64, ConfigRecord>,
}

impl InMemoryConfigStore {
    /// Creates an empty registry, wrapped for sharing across request handlers.
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            inner: std::sync::Mutex::new(InMemoryConfigState {
                next_id: 1,
                records: std::collections::HashMap::new(),
            }),
        })
    }

    /// Creates a registry pre-seeded with the baseline configuration at id
    /// 1, so a freshly started server always has at least one
    /// `configuracion_id` to reference.
    pub fn with_baseline() -> std::sync::Arc<Self> {
        let store = Self::new();
        store.insert("baseline".to_string(), SimulationConfig::baseline());
        store
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn insert(&self, name: String, config: SimulationConfig) -> u64 {
        let mut state = self.inner.lock().expect("config store mutex poisoned");
        let id = state.next_id;
        state.next_id += 1;
        state.records.insert(id, ConfigRecord { id, name, config });
        id
    }

    fn get(&self, id: u64) -> Result<ConfigRecord, crate::error::NotFoundError> {
        let state = self.inner.lock().expect("config store mutex poisoned");
        state
            .records
            .get(&id)
            .cloned()
            .ok_or(crate::error::NotFoundError {
                resource: "configuration".to_string(),
                id,
            })
    }

    fn list(&self) -> Vec<ConfigRecord> {
        let state = self.inner.lock().expect("config store mutex poisoned");
        let mut records: Vec<ConfigRecord> = state.records.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    fn delete(&self, id: u64) -> Result<(), crate::error::NotFoundError> {
        let mut state = self.inner.lock().expect("config store mutex poisoned");
        state
            .records
            .remove(&id)
            .map(|_| ())
            .ok_or(crate::error::NotFoundError {
                resource: "configuration".to_string(),
                id,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_is_valid() {
        let cfg = SimulationConfig::baseline();
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn validation_catches_reorder_point_above_capacity() {
        let mut cfg = SimulationConfig::baseline();
        cfg.reorder_point_tm = cfg.capacity_tm;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "reorder_point_tm"));
    }

    #[test]
    fn validation_catches_initial_inventory_above_capacity() {
        let mut cfg = SimulationConfig::baseline();
        cfg.initial_inventory_tm = cfg.capacity_tm + 1.0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "initial_inventory_tm"));
    }

    #[test]
    fn validation_catches_disordered_triangular_params() {
        let mut cfg = SimulationConfig::baseline();
        cfg.disruption_min_days = 10.0;
        cfg.disruption_mode_days = 5.0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "disruption_mode_days"));
    }

    #[test]
    fn soft_warning_when_reorder_point_below_lead_time_demand() {
        let mut cfg = SimulationConfig::baseline();
        cfg.reorder_point_tm = 1.0;
        let warnings = cfg.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(cfg.validate().is_empty(), "a low reorder point is a warning, not an error");
    }

    #[test]
    fn factorial_configs_has_six_cells_all_valid() {
        let configs = factorial_configs(42, 365);
        assert_eq!(configs.len(), 6);
        let names: Vec<&str> = configs.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"SQ_Short"));
        assert!(names.contains(&"P_Long"));
        for (_, cfg) in &configs {
            assert!(cfg.validate().is_empty());
        }
    }

    #[test]
    fn toml_round_trip_with_partial_overrides() {
        let toml = "capacity_tm = 900.0\nseed = 7\n";
        let cfg = SimulationConfig::from_toml_str(toml).expect("valid TOML");
        assert_eq!(cfg.capacity_tm, 900.0);
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.base_daily_demand_tm, BASE_DAILY_DEMAND);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let toml = "capacity_tm = 900.0\nbogus_field = true\n";
        assert!(SimulationConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn config_store_with_baseline_seeds_id_one() {
        let store = InMemoryConfigStore::with_baseline();
        let record = store.get(1).expect("baseline should exist at id 1");
        assert_eq!(record.name, "baseline");
        assert_eq!(record.config, SimulationConfig::baseline());
    }

    #[test]
    fn from_preset_baseline_matches_default() {
        let cfg = SimulationConfig::from_preset("baseline").expect("baseline preset exists");
        assert_eq!(cfg, SimulationConfig::baseline());
    }

    #[test]
    fn from_preset_factorial_cell_matches_capacity() {
        let cfg = SimulationConfig::from_preset("P_Long").expect("P_Long preset exists");
        assert_eq!(cfg.capacity_tm, CAPACITY_PROPOSED);
        assert_eq!(cfg.disruption_max_days, DISRUPTION_LONG.max_days);
    }

    #[test]
    fn from_preset_unknown_is_an_error() {
        assert!(SimulationConfig::from_preset("nonexistent").is_err());
    }

    #[test]
    fn config_store_insert_list_delete_round_trip() {
        let store = InMemoryConfigStore::new();
        let id = store.insert("custom".to_string(), SimulationConfig::baseline());
        assert_eq!(store.list().len(), 1);
        assert!(store.delete(id).is_ok());
        assert!(store.get(id).is_err());
    }
}
