//! API request/response bodies.
//!
//! Field names mostly mirror the internal Rust types directly; the handful
//! the external contract names in Spanish (`progreso`,
//! `replicas_completadas`, `tiempo_transcurrido_segundos`, ...) are kept
//! verbatim since they are part of the documented wire format.

use serde::{Deserialize, Serialize};

use crate::config::SimulationConfig;
use crate::experiment::{AnovaInputRow, Experiment, ExperimentStatus, ReplicaRecord};
use crate::sim::kpi::Kpis;
use crate::sim::types::TimeSeriesPoint;

/// Body of `POST /v1/monte-carlo/start`.
#[derive(Debug, Deserialize)]
pub struct StartExperimentRequest {
    pub configuracion_id: u64,
    pub num_replicas: u32,
    pub max_workers: usize,
    pub nombre: Option<String>,
}

/// Pagination query parameters for `GET /v1/monte-carlo/experiments`.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

/// Query parameters for `GET /v1/monte-carlo/experiments/{id}/series-temporales`.
#[derive(Debug, Deserialize)]
pub struct SeriesQuery {
    pub num_muestras: Option<u32>,
}

/// Error response body for 4xx/5xx responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { error: message.into() }
    }
}

/// Progress snapshot for `GET /v1/monte-carlo/experiments/{id}/progress`.
#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub experiment_id: u64,
    pub status: ExperimentStatus,
    pub progreso: u32,
    pub replicas_completadas: u32,
    pub replicas_totales: u32,
    pub tiempo_transcurrido_segundos: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiempo_estimado_restante_segundos: Option<f64>,
}

/// Response to `POST /v1/simulation/run`: one KPI record plus its time
/// series.
#[derive(Debug, Serialize)]
pub struct SimulationRunResponse {
    pub kpis: Kpis,
    pub series: Vec<TimeSeriesPoint>,
}

/// A stored configuration, as returned by the configuration CRUD endpoints.
#[derive(Debug, Serialize)]
pub struct ConfigurationResponse {
    pub id: u64,
    pub name: String,
    pub config: SimulationConfig,
}

impl From<crate::config::ConfigRecord> for ConfigurationResponse {
    fn from(record: crate::config::ConfigRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            config: record.config,
        }
    }
}

/// Body of `POST /v1/configurations`.
#[derive(Debug, Deserialize)]
pub struct CreateConfigurationRequest {
    pub name: String,
    pub config: SimulationConfig,
}

impl Experiment {
    /// Builds the `AnovaInputRow`s this experiment's own completed replicas
    /// contribute. A single experiment has exactly one configuration, so
    /// every row shares the same factor levels — real statistical power
    /// requires pooling across a factorial sweep of experiments (see
    /// `experiment::anova_rows_from_sweep`), not a single experiment alone.
    pub fn anova_rows(&self) -> Vec<AnovaInputRow> {
        let capacity_level = crate::experiment::anova::capacity_level(self.config.capacity_tm).to_string();
        let disruption_level =
            crate::experiment::anova::disruption_level(self.config.disruption_max_days).to_string();
        self.replicas
            .iter()
            .filter_map(|r: &ReplicaRecord| {
                r.kpis.map(|k| AnovaInputRow {
                    capacity_level: capacity_level.clone(),
                    disruption_level: disruption_level.clone(),
                    response: k.service_level_pct,
                })
            })
            .collect()
    }
}
