//! Post-hoc key performance indicators computed from a completed kernel run.

use crate::sim::kernel::KernelOutput;
use crate::sim::types::TimeSeriesPoint;

/// The 23 summary indicators reported for one completed replica.
///
/// Percentages are rounded to 4 decimal places; every other quantity is
/// rounded to 2. Computed once, post-hoc, from the kernel's daily metrics —
/// nothing here re-derives state the kernel already owns.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct Kpis {
    pub service_level_pct: f64,
    pub stockout_probability_pct: f64,
    pub stockout_days: u32,
    pub avg_inventory_tm: f64,
    pub min_inventory_tm: f64,
    pub max_inventory_tm: f64,
    pub std_inventory_tm: f64,
    pub final_inventory_tm: f64,
    pub initial_inventory_tm: f64,
    pub avg_autonomy_days: f64,
    pub min_autonomy_days: f64,
    pub total_demand_tm: f64,
    pub satisfied_demand_tm: f64,
    pub unsatisfied_demand_tm: f64,
    pub avg_daily_demand_tm: f64,
    pub max_daily_demand_tm: f64,
    pub min_daily_demand_tm: f64,
    pub total_received_tm: f64,
    pub total_dispatched_tm: f64,
    pub total_disruptions: u32,
    pub total_blocked_days: f64,
    pub blocked_time_pct: f64,
    pub simulated_days: u32,
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn population_std(xs: &[f64], mean: f64) -> f64 {
    let variance = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / xs.len() as f64;
    variance.sqrt()
}

fn round_to(x: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (x * factor).round() / factor
}

impl Kpis {
    /// Computes the indicator set and the parallel time series from a
    /// kernel run and the initial inventory used to configure it.
    ///
    /// Returns `None` if the kernel produced no daily metrics — a
    /// `simulation_days` of 0, which [`crate::config::SimulationConfig`]
    /// already rejects, but the calculator stays total rather than
    /// panicking on an adversarial caller.
    pub fn from_kernel_output(
        output: &KernelOutput,
        initial_inventory_tm: f64,
    ) -> Option<(Self, Vec<TimeSeriesPoint>)> {
        if output.daily_metrics.is_empty() {
            return None;
        }

        let inventories: Vec<f64> = output.daily_metrics.iter().map(|m| m.inventory_tm).collect();
        let autonomies: Vec<f64> = output.daily_metrics.iter().map(|m| m.autonomy_days).collect();
        let demands: Vec<f64> = output.daily_metrics.iter().map(|m| m.demand_tm).collect();
        let stockout_days = output.daily_metrics.iter().filter(|m| m.stockout).count() as u32;
        let total_days = output.daily_metrics.len() as u32;

        let service_level = if output.total_demand_tm > 0.0 {
            output.satisfied_demand_tm / output.total_demand_tm * 100.0
        } else {
            0.0
        };
        let stockout_prob = if total_days > 0 {
            stockout_days as f64 / total_days as f64 * 100.0
        } else {
            0.0
        };
        let blocked_pct = output.total_blocked_days / total_days as f64 * 100.0;

        let inv_mean = mean(&inventories);
        let autonomy_mean = mean(&autonomies);
        let demand_mean = mean(&demands);

        let kpis = Self {
            service_level_pct: round_to(service_level, 4),
            stockout_probability_pct: round_to(stockout_prob, 4),
            stockout_days,
            avg_inventory_tm: round_to(inv_mean, 2),
            min_inventory_tm: round_to(inventories.iter().cloned().fold(f64::INFINITY, f64::min), 2),
            max_inventory_tm: round_to(
                inventories.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                2,
            ),
            std_inventory_tm: round_to(population_std(&inventories, inv_mean), 2),
            final_inventory_tm: round_to(output.final_inventory_tm, 2),
            initial_inventory_tm: round_to(initial_inventory_tm, 2),
            avg_autonomy_days: round_to(autonomy_mean, 2),
            min_autonomy_days: round_to(autonomies.iter().cloned().fold(f64::INFINITY, f64::min), 2),
            total_demand_tm: round_to(output.total_demand_tm, 2),
            satisfied_demand_tm: round_to(output.satisfied_demand_tm, 2),
            unsatisfied_demand_tm: round_to(output.total_demand_tm - output.satisfied_demand_tm, 2),
            avg_daily_demand_tm: round_to(demand_mean, 2),
            max_daily_demand_tm: round_to(demands.iter().cloned().fold(f64::NEG_INFINITY, f64::max), 2),
            min_daily_demand_tm: round_to(demands.iter().cloned().fold(f64::INFINITY, f64::min), 2),
            total_received_tm: round_to(output.total_received_tm, 2),
            total_dispatched_tm: round_to(output.total_dispatched_tm, 2),
            total_disruptions: output.total_disruptions,
            total_blocked_days: round_to(output.total_blocked_days, 2),
            blocked_time_pct: round_to(blocked_pct, 2),
            simulated_days: total_days,
        };

        let time_series = output.daily_metrics.iter().map(TimeSeriesPoint::from).collect();
        Some((kpis, time_series))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::sim::kernel::Kernel;

    #[test]
    fn from_kernel_output_matches_row_count() {
        let cfg = SimulationConfig {
            simulation_days: 90,
            ..SimulationConfig::baseline()
        };
        let output = Kernel::new(&cfg).run();
        let (kpis, series) = Kpis::from_kernel_output(&output, cfg.initial_inventory_tm).unwrap();
        assert_eq!(kpis.simulated_days, 90);
        assert_eq!(series.len(), 90);
    }

    #[test]
    fn service_level_is_between_0_and_100() {
        let cfg = SimulationConfig::baseline();
        let output = Kernel::new(&cfg).run();
        let (kpis, _) = Kpis::from_kernel_output(&output, cfg.initial_inventory_tm).unwrap();
        assert!((0.0..=100.0).contains(&kpis.service_level_pct));
        assert!((0.0..=100.0).contains(&kpis.stockout_probability_pct));
    }

    #[test]
    fn unsatisfied_demand_is_difference_of_totals() {
        let cfg = SimulationConfig::baseline();
        let output = Kernel::new(&cfg).run();
        let (kpis, _) = Kpis::from_kernel_output(&output, cfg.initial_inventory_tm).unwrap();
        assert!(
            (kpis.unsatisfied_demand_tm - (kpis.total_demand_tm - kpis.satisfied_demand_tm)).abs()
                < 1e-6
        );
    }

    #[test]
    fn blocked_time_pct_can_exceed_100_under_heavy_overlap() {
        let cfg = SimulationConfig {
            simulation_days: 365,
            annual_disruption_rate: 40.0,
            disruption_min_days: 20.0,
            disruption_mode_days: 25.0,
            disruption_max_days: 30.0,
            ..SimulationConfig::baseline()
        };
        let output = Kernel::new(&cfg).run();
        let (kpis, _) = Kpis::from_kernel_output(&output, cfg.initial_inventory_tm).unwrap();
        assert!(kpis.blocked_time_pct > 0.0);
    }
}
