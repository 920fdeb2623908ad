//! Monte Carlo experiment executor: runs N independent replicas of a
//! [`crate::config::SimulationConfig`] across a bounded worker pool,
//! aggregates their KPIs, and exposes the ANOVA collaborator over a
//! factorial sweep of such experiments.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::config::{self, SimulationConfig};
use crate::error::{ExecutorFailure, ValidationError};
use crate::replica::{run_replica, ReplicaOutcome};
use crate::sim::kpi::Kpis;

pub mod anova;
pub mod series;
pub mod stats;
pub mod store;

pub use anova::AnovaInputRow;
pub use stats::KpiAggregates;
pub use store::{ExperimentStore, InMemoryExperimentStore};

/// Minimum/maximum replica count accepted by [`validate_request`].
pub const MIN_REPLICAS: u32 = 100;
pub const MAX_REPLICAS: u32 = 100_000;
/// Minimum/maximum worker pool size accepted by [`validate_request`].
pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 16;

/// Derives the seed for replica `replica_num` (1-based) of a Monte Carlo
/// experiment from its base seed. `K = 100_000` comfortably exceeds
/// [`MAX_REPLICAS`], so replica seeds never collide within one experiment.
pub fn mc_seed(seed_base: u64, replica_num: u32) -> u64 {
    seed_base * 100_000 + replica_num as u64
}

/// Derives the seed for replica `replica` (1-based) of cell `config_id`
/// (1-based) in a factorial sweep. Uses a disjoint derivation from
/// [`mc_seed`] — the two conventions come from different drivers in the
/// source this crate was modeled on and are kept distinct rather than
/// unified, per `DESIGN.md`.
pub fn factorial_seed(base_seed: u64, config_id: u32, replica: u32) -> u64 {
    base_seed + (config_id as u64 - 1) * 1_000_000 + replica as u64
}

/// Lifecycle state of an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Outcome of one replica, retained on the experiment record.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReplicaRecord {
    pub replica_index: u32,
    pub seed: u64,
    pub completed: bool,
    pub elapsed_secs: f64,
    pub error_message: Option<String>,
    pub kpis: Option<Kpis>,
}

impl From<ReplicaOutcome> for ReplicaRecord {
    fn from(outcome: ReplicaOutcome) -> Self {
        let elapsed_secs = outcome.elapsed.as_secs_f64();
        match outcome.result {
            Ok((kpis, _series)) => Self {
                replica_index: outcome.replica_index,
                seed: outcome.seed,
                completed: true,
                elapsed_secs,
                error_message: None,
                kpis: Some(kpis),
            },
            Err(failure) => Self {
                replica_index: outcome.replica_index,
                seed: outcome.seed,
                completed: false,
                elapsed_secs,
                error_message: Some(failure.message),
                kpis: None,
            },
        }
    }
}

/// A Monte Carlo experiment: one configuration, run `num_replicas` times.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Experiment {
    pub id: u64,
    pub name: String,
    pub config: SimulationConfig,
    pub num_replicas: u32,
    pub max_workers: usize,
    pub seed_base: u64,
    pub status: ExperimentStatus,
    pub progress_pct: u8,
    pub replicas: Vec<ReplicaRecord>,
    pub aggregates: Option<KpiAggregates>,
    pub error_message: Option<String>,
    /// Unix epoch milliseconds when the executor started running replicas.
    pub started_at_unix_ms: Option<u64>,
    /// Unix epoch milliseconds when aggregation finished (completed or cancelled).
    pub ended_at_unix_ms: Option<u64>,
    /// Total wall-clock duration of the run, once terminal.
    pub duration_secs: Option<f64>,
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A new experiment's parameters, prior to validation and storage.
#[derive(Debug, Clone)]
pub struct ExperimentRequest {
    pub name: Option<String>,
    pub config: SimulationConfig,
    pub num_replicas: u32,
    pub max_workers: usize,
    pub seed_base: u64,
}

/// Validates an experiment request: replica/worker bounds plus the
/// underlying configuration's own invariants.
pub fn validate_request(request: &ExperimentRequest) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if !(MIN_REPLICAS..=MAX_REPLICAS).contains(&request.num_replicas) {
        errors.push(ValidationError::new(
            "num_replicas",
            format!("must be in [{MIN_REPLICAS}, {MAX_REPLICAS}]"),
        ));
    }
    if !(MIN_WORKERS..=MAX_WORKERS).contains(&request.max_workers) {
        errors.push(ValidationError::new(
            "max_workers",
            format!("must be in [{MIN_WORKERS}, {MAX_WORKERS}]"),
        ));
    }
    errors.extend(request.config.validate());
    errors
}

/// Creates a `Pending` experiment record (after validation) and inserts it
/// into `store`, returning its assigned id.
pub fn create_experiment(
    store: &dyn ExperimentStore,
    request: ExperimentRequest,
) -> Result<u64, Vec<ValidationError>> {
    let errors = validate_request(&request);
    if !errors.is_empty() {
        return Err(errors);
    }
    let name = request
        .name
        .unwrap_or_else(|| format!("MC-{}rep", request.num_replicas));
    let experiment = Experiment {
        id: 0,
        name,
        config: request.config,
        num_replicas: request.num_replicas,
        max_workers: request.max_workers,
        seed_base: request.seed_base,
        status: ExperimentStatus::Pending,
        progress_pct: 0,
        replicas: Vec::new(),
        aggregates: None,
        error_message: None,
        started_at_unix_ms: None,
        ended_at_unix_ms: None,
        duration_secs: None,
    };
    Ok(store.insert(experiment))
}

/// Shared handle a caller uses to poll progress and request cancellation
/// of a running execution. Not persisted — lives only as long as the
/// background task driving [`execute`].
#[derive(Clone)]
pub struct ExecutionHandle {
    pub cancel: Arc<AtomicBool>,
    pub completed: Arc<AtomicU32>,
}

impl ExecutionHandle {
    pub fn new() -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
            completed: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Requests cancellation. Replicas already running to completion are
    /// retained; no replica not yet started will run.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

impl Default for ExecutionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs every replica of experiment `id` across a bounded worker pool and
/// commits the final record to `store`.
///
/// Blocking and CPU-bound — callers on an async runtime should run this
/// inside `spawn_blocking`. Replicas skipped after a cancellation request
/// are simply absent from the final record, not marked failed; completed
/// replicas and their aggregates are kept even if cancellation cuts the
/// run short, matching the retained-subset behavior a caller polling
/// progress mid-run expects.
pub fn execute(
    store: &dyn ExperimentStore,
    id: u64,
    handle: &ExecutionHandle,
) -> Result<(), ExecutorFailure> {
    let mut experiment = store.get(id).map_err(|e| ExecutorFailure {
        message: e.to_string(),
    })?;

    experiment.status = ExperimentStatus::Running;
    experiment.started_at_unix_ms = Some(now_unix_ms());
    store.update(experiment.clone());
    let started = Instant::now();

    let pool = ThreadPoolBuilder::new()
        .num_threads(experiment.max_workers)
        .build()
        .map_err(|e| ExecutorFailure {
            message: format!("building worker pool: {e}"),
        })?;

    let config = experiment.config.clone();
    let seed_base = experiment.seed_base;
    let total = experiment.num_replicas;
    let cancel = Arc::clone(&handle.cancel);
    let completed_counter = Arc::clone(&handle.completed);

    let records: Vec<ReplicaRecord> = pool.install(|| {
        (1..=total)
            .into_par_iter()
            .filter_map(|replica_num| {
                if cancel.load(Ordering::Relaxed) {
                    return None;
                }
                let mut replica_config = config.clone();
                replica_config.seed = mc_seed(seed_base, replica_num);
                let outcome = run_replica(&replica_config, replica_num, false);
                completed_counter.fetch_add(1, Ordering::Relaxed);
                Some(ReplicaRecord::from(outcome))
            })
            .collect()
    });

    let was_cancelled = cancel.load(Ordering::Relaxed);
    let completed_kpis: Vec<Kpis> = records.iter().filter_map(|r| r.kpis).collect();

    experiment.progress_pct = ((100 * records.len() as u64) / total.max(1) as u64).min(100) as u8;
    experiment.replicas = records;
    experiment.aggregates = KpiAggregates::from_kpis(&completed_kpis);
    experiment.status = if was_cancelled {
        ExperimentStatus::Failed
    } else {
        ExperimentStatus::Completed
    };
    if was_cancelled {
        experiment.error_message = Some("experiment cancelled by caller".to_string());
    }
    experiment.ended_at_unix_ms = Some(now_unix_ms());
    experiment.duration_secs = Some(started.elapsed().as_secs_f64());

    store.update(experiment);
    Ok(())
}

/// Estimated time remaining given elapsed wall-clock time and replica
/// completion counts: `elapsed * (total - done) / done`, or `None` if no
/// replica has completed yet.
pub fn estimate_remaining(elapsed: Duration, done: u32, total: u32) -> Option<Duration> {
    if done == 0 {
        return None;
    }
    let per_replica = elapsed.as_secs_f64() / done as f64;
    let remaining = (total.saturating_sub(done)) as f64 * per_replica;
    Some(Duration::from_secs_f64(remaining.max(0.0)))
}

/// One cell of a factorial sweep: its label, configuration, and the
/// replicas run against it.
#[derive(Debug, Clone)]
pub struct FactorialCell {
    pub name: String,
    pub config: SimulationConfig,
    pub replicas: Vec<ReplicaRecord>,
}

/// Runs the full 2×3 factorial sweep (see [`config::factorial_configs`]),
/// `replicas_per_cell` replicas each, across a single shared worker pool.
pub fn run_factorial_sweep(
    base_seed: u64,
    simulation_days: u32,
    replicas_per_cell: u32,
    max_workers: usize,
) -> Result<Vec<FactorialCell>, ExecutorFailure> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(max_workers)
        .build()
        .map_err(|e| ExecutorFailure {
            message: format!("building worker pool: {e}"),
        })?;

    let configs = config::factorial_configs(base_seed, simulation_days);
    let cells = pool.install(|| {
        configs
            .into_par_iter()
            .enumerate()
            .map(|(idx, (name, cell_config))| {
                let config_id = (idx + 1) as u32;
                let replicas: Vec<ReplicaRecord> = (1..=replicas_per_cell)
                    .into_par_iter()
                    .map(|replica_num| {
                        let mut replica_config = cell_config.clone();
                        replica_config.seed = factorial_seed(base_seed, config_id, replica_num);
                        ReplicaRecord::from(run_replica(&replica_config, replica_num, false))
                    })
                    .collect();
                FactorialCell {
                    name,
                    config: cell_config,
                    replicas,
                }
            })
            .collect()
    });
    Ok(cells)
}

/// Flattens a factorial sweep's completed replicas into the ANOVA
/// collaborator's input shape, using `service_level_pct` as the response
/// (matching the default the factorial statistics routine was built
/// around).
pub fn anova_rows_from_sweep(cells: &[FactorialCell]) -> Vec<anova::AnovaInputRow> {
    cells
        .iter()
        .flat_map(|cell| {
            let capacity_level = anova::capacity_level(cell.config.capacity_tm).to_string();
            let disruption_level =
                anova::disruption_level(cell.config.disruption_max_days).to_string();
            cell.replicas.iter().filter_map(move |r| {
                r.kpis.as_ref().map(|k| anova::AnovaInputRow {
                    capacity_level: capacity_level.clone(),
                    disruption_level: disruption_level.clone(),
                    response: k.service_level_pct,
                })
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::InMemoryExperimentStore;

    #[test]
    fn mc_seed_is_disjoint_across_replicas() {
        assert_ne!(mc_seed(42, 1), mc_seed(42, 2));
        assert_eq!(mc_seed(42, 1), 42 * 100_000 + 1);
    }

    #[test]
    fn factorial_seed_matches_formula() {
        assert_eq!(factorial_seed(42, 1, 1), 42 + 0 * 1_000_000 + 1);
        assert_eq!(factorial_seed(42, 2, 1), 42 + 1_000_000 + 1);
    }

    #[test]
    fn validate_request_rejects_too_few_replicas() {
        let req = ExperimentRequest {
            name: None,
            config: SimulationConfig::baseline(),
            num_replicas: 5,
            max_workers: 2,
            seed_base: 1,
        };
        assert!(!validate_request(&req).is_empty());
    }

    #[test]
    fn create_and_execute_small_experiment() {
        let store = InMemoryExperimentStore::new();
        let req = ExperimentRequest {
            name: Some("smoke".to_string()),
            config: SimulationConfig {
                simulation_days: 30,
                ..SimulationConfig::baseline()
            },
            num_replicas: 100,
            max_workers: 2,
            seed_base: 7,
        };
        let id = create_experiment(store.as_ref(), req).unwrap();
        let handle = ExecutionHandle::new();
        execute(store.as_ref(), id, &handle).unwrap();

        let experiment = store.get(id).unwrap();
        assert_eq!(experiment.status, ExperimentStatus::Completed);
        assert_eq!(experiment.replicas.len(), 100);
        assert!(experiment.aggregates.is_some());
        assert_eq!(handle.completed.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn cancellation_retains_completed_replicas_only() {
        let store = InMemoryExperimentStore::new();
        let req = ExperimentRequest {
            name: None,
            config: SimulationConfig {
                simulation_days: 30,
                ..SimulationConfig::baseline()
            },
            num_replicas: 100,
            max_workers: 1,
            seed_base: 3,
        };
        let id = create_experiment(store.as_ref(), req).unwrap();
        let handle = ExecutionHandle::new();
        handle.cancel();
        execute(store.as_ref(), id, &handle).unwrap();

        let experiment = store.get(id).unwrap();
        assert_eq!(experiment.status, ExperimentStatus::Failed);
        assert!(experiment.error_message.is_some());
        assert!(experiment.replicas.len() <= 100);
    }

    #[test]
    fn estimate_remaining_is_none_before_first_completion() {
        assert!(estimate_remaining(Duration::from_secs(10), 0, 100).is_none());
    }

    #[test]
    fn estimate_remaining_scales_linearly() {
        let remaining = estimate_remaining(Duration::from_secs(10), 50, 100).unwrap();
        assert!((remaining.as_secs_f64() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn factorial_sweep_has_six_cells() {
        let cells = run_factorial_sweep(42, 30, 4, 2).unwrap();
        assert_eq!(cells.len(), 6);
        for cell in &cells {
            assert_eq!(cell.replicas.len(), 4);
        }
    }

    #[test]
    fn anova_rows_cover_all_completed_sweep_replicas() {
        let cells = run_factorial_sweep(42, 30, 4, 2).unwrap();
        let rows = anova_rows_from_sweep(&cells);
        assert_eq!(rows.len(), 24);
        let result = anova::two_way_anova(&rows);
        assert!(result.is_ok());
    }
}
