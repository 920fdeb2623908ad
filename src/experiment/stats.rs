//! Descriptive statistics aggregated across a Monte Carlo experiment's
//! completed replicas.

use crate::sim::kpi::Kpis;

/// Mean, standard deviation, extrema, and quartile/95th-percentile summary
/// for one KPI field across all completed replicas.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct AggregateStats {
    pub n: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

impl AggregateStats {
    /// Computes the aggregate from a slice of samples. Population standard
    /// deviation (`ddof=0`), matching `numpy.std`'s default.
    pub fn from_samples(values: &[f64]) -> Self {
        let n = values.len();
        if n == 0 {
            return Self {
                n: 0,
                mean: 0.0,
                std: 0.0,
                min: 0.0,
                max: 0.0,
                p25: 0.0,
                p50: 0.0,
                p75: 0.0,
                p95: 0.0,
            };
        }
        let mean = values.iter().sum::<f64>() / n as f64;
        let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        Self {
            n,
            mean,
            std: variance.sqrt(),
            min: sorted[0],
            max: sorted[n - 1],
            p25: percentile(&sorted, 25.0),
            p50: percentile(&sorted, 50.0),
            p75: percentile(&sorted, 75.0),
            p95: percentile(&sorted, 95.0),
        }
    }
}

/// Linear-interpolation percentile over an already-sorted slice, matching
/// `numpy.percentile`'s default (`"linear"`) method.
pub(crate) fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = pct / 100.0 * (n - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] + frac * (sorted[upper] - sorted[lower])
    }
}

/// Aggregate statistics for every KPI field across the completed replicas
/// of one experiment.
#[derive(Debug, Clone, serde::Serialize)]
pub struct KpiAggregates {
    pub service_level_pct: AggregateStats,
    pub stockout_probability_pct: AggregateStats,
    pub stockout_days: AggregateStats,
    pub avg_inventory_tm: AggregateStats,
    pub min_inventory_tm: AggregateStats,
    pub max_inventory_tm: AggregateStats,
    pub std_inventory_tm: AggregateStats,
    pub final_inventory_tm: AggregateStats,
    pub initial_inventory_tm: AggregateStats,
    pub avg_autonomy_days: AggregateStats,
    pub min_autonomy_days: AggregateStats,
    pub total_demand_tm: AggregateStats,
    pub satisfied_demand_tm: AggregateStats,
    pub unsatisfied_demand_tm: AggregateStats,
    pub avg_daily_demand_tm: AggregateStats,
    pub max_daily_demand_tm: AggregateStats,
    pub min_daily_demand_tm: AggregateStats,
    pub total_received_tm: AggregateStats,
    pub total_dispatched_tm: AggregateStats,
    pub total_disruptions: AggregateStats,
    pub total_blocked_days: AggregateStats,
    pub blocked_time_pct: AggregateStats,
    pub simulated_days: AggregateStats,
}

macro_rules! aggregate_field {
    ($kpis:expr, $field:ident) => {
        AggregateStats::from_samples(&$kpis.iter().map(|k| k.$field as f64).collect::<Vec<f64>>())
    };
}

impl KpiAggregates {
    /// Aggregates every tracked field across the given completed replicas'
    /// KPIs. Returns `None` if `kpis` is empty.
    pub fn from_kpis(kpis: &[Kpis]) -> Option<Self> {
        if kpis.is_empty() {
            return None;
        }
        Some(Self {
            service_level_pct: aggregate_field!(kpis, service_level_pct),
            stockout_probability_pct: aggregate_field!(kpis, stockout_probability_pct),
            stockout_days: aggregate_field!(kpis, stockout_days),
            avg_inventory_tm: aggregate_field!(kpis, avg_inventory_tm),
            min_inventory_tm: aggregate_field!(kpis, min_inventory_tm),
            max_inventory_tm: aggregate_field!(kpis, max_inventory_tm),
            std_inventory_tm: aggregate_field!(kpis, std_inventory_tm),
            final_inventory_tm: aggregate_field!(kpis, final_inventory_tm),
            initial_inventory_tm: aggregate_field!(kpis, initial_inventory_tm),
            avg_autonomy_days: aggregate_field!(kpis, avg_autonomy_days),
            min_autonomy_days: aggregate_field!(kpis, min_autonomy_days),
            total_demand_tm: aggregate_field!(kpis, total_demand_tm),
            satisfied_demand_tm: aggregate_field!(kpis, satisfied_demand_tm),
            unsatisfied_demand_tm: aggregate_field!(kpis, unsatisfied_demand_tm),
            avg_daily_demand_tm: aggregate_field!(kpis, avg_daily_demand_tm),
            max_daily_demand_tm: aggregate_field!(kpis, max_daily_demand_tm),
            min_daily_demand_tm: aggregate_field!(kpis, min_daily_demand_tm),
            total_received_tm: aggregate_field!(kpis, total_received_tm),
            total_dispatched_tm: aggregate_field!(kpis, total_dispatched_tm),
            total_disruptions: aggregate_field!(kpis, total_disruptions),
            total_blocked_days: aggregate_field!(kpis, total_blocked_days),
            blocked_time_pct: aggregate_field!(kpis, blocked_time_pct),
            simulated_days: aggregate_field!(kpis, simulated_days),
        })
    }
}
