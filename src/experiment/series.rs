//! Aggregate-across-replicas daily time series, sampled on demand.
//!
//! The executor discards each replica's day-by-day series once its KPIs are
//! computed ([`crate::replica::run_replica`] is called with `keep_series =
//! false`) to bound memory on large experiments. Because a replica is a
//! pure function of its configuration and seed, this module reproduces a
//! sample of series deterministically instead of keeping every replica's
//! series on the experiment record.

use rayon::prelude::*;

use crate::config::SimulationConfig;
use crate::experiment::mc_seed;
use crate::experiment::stats::percentile;
use crate::replica::run_replica;
use crate::sim::types::TimeSeriesPoint;

/// One day's aggregate statistics across a sample of replicas.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SeriesAggregatePoint {
    pub day: u32,
    pub inventory_mean: f64,
    pub inventory_std: f64,
    pub inventory_p5: f64,
    pub inventory_p25: f64,
    pub inventory_p50: f64,
    pub inventory_p75: f64,
    pub inventory_p95: f64,
    pub demand_mean: f64,
    pub demand_std: f64,
    pub demand_p5: f64,
    pub demand_p25: f64,
    pub demand_p50: f64,
    pub demand_p75: f64,
    pub demand_p95: f64,
    pub satisfied_demand_mean: f64,
    pub supply_received_mean: f64,
    pub autonomy_days_mean: f64,
    pub pending_orders_mean: f64,
    pub stockout_probability: f64,
    pub route_blocked_probability: f64,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn population_std(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Runs `num_samples` independent replicas of `config` (seeded from
/// `seed_base` via [`mc_seed`], replicas 1..=num_samples) retaining their
/// time series, then aggregates them day by day. Replicas that fail to
/// complete are skipped; an empty result means none of the sampled
/// replicas succeeded.
pub fn sample_aggregate_series(
    config: &SimulationConfig,
    seed_base: u64,
    num_samples: u32,
) -> Vec<SeriesAggregatePoint> {
    let samples: Vec<Vec<TimeSeriesPoint>> = (1..=num_samples)
        .into_par_iter()
        .filter_map(|replica_num| {
            let mut replica_config = config.clone();
            replica_config.seed = mc_seed(seed_base, replica_num);
            run_replica(&replica_config, replica_num, true)
                .result
                .ok()
                .and_then(|(_, series)| series)
        })
        .collect();

    let Some(days) = samples.first().map(Vec::len) else {
        return Vec::new();
    };

    (0..days)
        .map(|day_idx| {
            let mut inventories: Vec<f64> = samples.iter().map(|s| s[day_idx].inventory_tm).collect();
            let mut demands: Vec<f64> = samples.iter().map(|s| s[day_idx].demand_tm).collect();
            inventories.sort_by(f64::total_cmp);
            demands.sort_by(f64::total_cmp);

            let inv_mean = mean(&inventories);
            let dem_mean = mean(&demands);
            let n = samples.len() as f64;

            SeriesAggregatePoint {
                day: samples[0][day_idx].day,
                inventory_mean: inv_mean,
                inventory_std: population_std(&inventories, inv_mean),
                inventory_p5: percentile(&inventories, 5.0),
                inventory_p25: percentile(&inventories, 25.0),
                inventory_p50: percentile(&inventories, 50.0),
                inventory_p75: percentile(&inventories, 75.0),
                inventory_p95: percentile(&inventories, 95.0),
                demand_mean: dem_mean,
                demand_std: population_std(&demands, dem_mean),
                demand_p5: percentile(&demands, 5.0),
                demand_p25: percentile(&demands, 25.0),
                demand_p50: percentile(&demands, 50.0),
                demand_p75: percentile(&demands, 75.0),
                demand_p95: percentile(&demands, 95.0),
                satisfied_demand_mean: mean(
                    &samples.iter().map(|s| s[day_idx].satisfied_demand_tm).collect::<Vec<_>>(),
                ),
                supply_received_mean: mean(
                    &samples.iter().map(|s| s[day_idx].supply_received_tm).collect::<Vec<_>>(),
                ),
                autonomy_days_mean: mean(
                    &samples.iter().map(|s| s[day_idx].autonomy_days).collect::<Vec<_>>(),
                ),
                pending_orders_mean: mean(
                    &samples
                        .iter()
                        .map(|s| s[day_idx].pending_orders as f64)
                        .collect::<Vec<_>>(),
                ),
                stockout_probability: samples.iter().filter(|s| s[day_idx].stockout).count() as f64 / n,
                route_blocked_probability: samples.iter().filter(|s| s[day_idx].route_blocked).count() as f64 / n,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_series_has_one_point_per_day() {
        let cfg = SimulationConfig {
            simulation_days: 20,
            ..SimulationConfig::baseline()
        };
        let series = sample_aggregate_series(&cfg, 1, 10);
        assert_eq!(series.len(), 20);
        assert_eq!(series[0].day, 0);
        assert_eq!(series[19].day, 19);
    }

    #[test]
    fn probabilities_are_fractions() {
        let cfg = SimulationConfig {
            simulation_days: 30,
            ..SimulationConfig::baseline()
        };
        let series = sample_aggregate_series(&cfg, 5, 10);
        for point in &series {
            assert!((0.0..=1.0).contains(&point.stockout_probability));
            assert!((0.0..=1.0).contains(&point.route_blocked_probability));
        }
    }

    #[test]
    fn zero_samples_yields_empty_series() {
        let cfg = SimulationConfig::baseline();
        let series = sample_aggregate_series(&cfg, 1, 0);
        assert!(series.is_empty());
    }
}
