//! Pure, side-effect-free single-replica driver.
//!
//! Wraps one [`crate::sim::kernel::Kernel`] run and its KPI calculation
//! behind a panic-free interface the executor can call from any worker
//! thread without special handling.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use crate::config::SimulationConfig;
use crate::error::ReplicaFailure;
use crate::sim::kernel::Kernel;
use crate::sim::kpi::Kpis;
use crate::sim::types::TimeSeriesPoint;

/// The result of running exactly one replica.
#[derive(Debug, Clone)]
pub struct ReplicaOutcome {
    /// 1-based index of this replica within its experiment.
    pub replica_index: u32,
    /// Seed the replica's RNG stream was constructed with.
    pub seed: u64,
    /// Wall-clock time the replica took to run.
    pub elapsed: Duration,
    /// `Ok` with the computed KPIs and, if requested, the time series; `Err`
    /// if the kernel panicked.
    pub result: Result<(Kpis, Option<Vec<TimeSeriesPoint>>), ReplicaFailure>,
}

impl ReplicaOutcome {
    /// Whether this replica completed without error.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs one replica of `config` to completion.
///
/// `config.seed` is used as given — the executor is responsible for
/// deriving a distinct seed per replica before calling this function, since
/// the kernel itself has no notion of "which replica am I".
///
/// `keep_series` controls whether the day-by-day time series is retained;
/// experiments with many replicas typically discard it to bound memory.
///
/// A kernel panic is caught and reported as a [`ReplicaFailure`] rather
/// than propagated, so one bad replica cannot bring down a worker pool
/// running the rest of the experiment.
pub fn run_replica(config: &SimulationConfig, replica_index: u32, keep_series: bool) -> ReplicaOutcome {
    let started = Instant::now();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let output = Kernel::new(config).run();
        Kpis::from_kernel_output(&output, config.initial_inventory_tm)
    }));

    let result = match outcome {
        Ok(Some((kpis, series))) => Ok((kpis, keep_series.then_some(series))),
        Ok(None) => Err(ReplicaFailure {
            replica_index,
            message: "kernel produced no daily metrics".to_string(),
        }),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "replica panicked with a non-string payload".to_string());
            Err(ReplicaFailure {
                replica_index,
                message,
            })
        }
    };

    ReplicaOutcome {
        replica_index,
        seed: config.seed,
        elapsed: started.elapsed(),
        result,
    }
}
