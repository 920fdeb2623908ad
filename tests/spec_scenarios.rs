//! End-to-end scenarios and quantified invariants drawn directly from the
//! external contract: no-disruption high-capacity service levels, permanent
//! route blockage, seasonality-off autonomy baselines, determinism, and
//! mass-conservation / non-negativity across a kernel run.

use glp_hub_sim::config::SimulationConfig;
use glp_hub_sim::replica::run_replica;

fn completed(cfg: &SimulationConfig, replica_index: u32) -> glp_hub_sim::sim::kpi::Kpis {
    run_replica(cfg, replica_index, false)
        .result
        .expect("replica should complete")
        .0
}

/// S1: no disruptions, high capacity relative to demand.
#[test]
fn s1_no_disruptions_high_capacity_has_near_perfect_service() {
    let cfg = SimulationConfig {
        capacity_tm: 10_000.0,
        reorder_point_tm: 5_000.0,
        order_quantity_tm: 5_000.0,
        initial_inventory_tm: 6_000.0,
        base_daily_demand_tm: 52.5,
        simulation_days: 365,
        annual_disruption_rate: 0.0,
        use_seasonality: false,
        seed: 11_111,
        ..SimulationConfig::baseline()
    };
    let kpis = completed(&cfg, 1);
    assert!(kpis.service_level_pct >= 99.99);
    assert_eq!(kpis.stockout_days, 0);
    assert_eq!(kpis.total_disruptions, 0);
}

/// S2: a route blocked almost immediately for a duration spanning the rest
/// of the horizon, with finite initial stock, ships little to nothing
/// further and eventually stocks out. The spec's own S2 pins a single seed
/// against the original Python PRNG stream; this crate fixes a different
/// generator (`rand::StdRng`, per §4.1's "choose a specific algorithm"), so
/// the qualitative pattern is checked across many seeds instead of
/// replaying one seed's exact numbers.
#[test]
fn s2_near_permanent_blockage_starves_the_hub() {
    let n = 30u64;
    let mut total_received = 0.0;
    let mut stockout_runs = 0u32;
    for seed in 0..n {
        let cfg = SimulationConfig {
            capacity_tm: 431.0,
            reorder_point_tm: 392.0,
            order_quantity_tm: 228.0,
            initial_inventory_tm: 258.0,
            simulation_days: 365,
            annual_disruption_rate: 5000.0,
            disruption_min_days: 400.0,
            disruption_mode_days: 400.0,
            disruption_max_days: 400.0,
            seed,
            ..SimulationConfig::baseline()
        };
        let kpis = completed(&cfg, 1);
        total_received += kpis.total_received_tm;
        if kpis.stockout_days > 0 {
            stockout_runs += 1;
        }
    }
    assert!(
        total_received / n as f64 <= 228.0,
        "near-immediate, horizon-spanning blockage should admit at most a trickle of receipts"
    );
    assert!(stockout_runs >= (n * 9 / 10) as u32, "most runs under near-permanent blockage should stock out");
}

/// S3: with seasonality off and no disruptions, average autonomy tracks the
/// static ratio `capacity / base_daily_demand` within 10%.
#[test]
fn s3_zero_seasonality_baseline_autonomy_matches_static_ratio() {
    let capacity = 431.0;
    let base_demand = 52.5;
    let expected = capacity / base_demand;

    let mut autonomies = Vec::new();
    for seed in 0..20u64 {
        let cfg = SimulationConfig {
            capacity_tm: capacity,
            reorder_point_tm: capacity * 0.91,
            order_quantity_tm: capacity * 0.53,
            initial_inventory_tm: capacity * 0.60,
            base_daily_demand_tm: base_demand,
            simulation_days: 365,
            annual_disruption_rate: 0.0,
            use_seasonality: false,
            seed,
            ..SimulationConfig::baseline()
        };
        autonomies.push(completed(&cfg, 1).avg_autonomy_days);
    }
    let mean = autonomies.iter().sum::<f64>() / autonomies.len() as f64;
    let tolerance = expected * 0.10;
    assert!(
        (mean - expected).abs() <= tolerance,
        "mean autonomy {mean} not within 10% of {expected}"
    );
}

/// S4: identical configuration and seed produce a bitwise-equal KPI record.
#[test]
fn s4_determinism_same_seed_same_kpis() {
    let cfg = SimulationConfig {
        seed: 12_345,
        ..SimulationConfig::baseline()
    };
    let a = completed(&cfg, 1);
    let b = completed(&cfg, 1);
    assert_eq!(a.service_level_pct, b.service_level_pct);
    assert_eq!(a.total_disruptions, b.total_disruptions);
    assert_eq!(a.final_inventory_tm, b.final_inventory_tm);
    assert_eq!(a.avg_inventory_tm, b.avg_inventory_tm);
}

/// Property 1: mass conservation within the documented tolerance.
#[test]
fn mass_conservation_holds_across_varied_configs() {
    for seed in 0..10u64 {
        let cfg = SimulationConfig {
            seed,
            annual_disruption_rate: 6.0,
            ..SimulationConfig::baseline()
        };
        let kpis = completed(&cfg, 1);
        let balance = (kpis.initial_inventory_tm + kpis.total_received_tm)
            - (kpis.final_inventory_tm + kpis.total_dispatched_tm);
        assert!(balance.abs() < 1e-2, "mass not conserved for seed {seed}: {balance}");
    }
}

/// Property 5: differing seeds diverge with overwhelming probability.
#[test]
fn seed_sensitivity_diverges_across_many_seeds() {
    let base = SimulationConfig {
        annual_disruption_rate: 6.0,
        ..SimulationConfig::baseline()
    };
    let mut distinct = std::collections::HashSet::new();
    for seed in 0..30u64 {
        let cfg = SimulationConfig { seed, ..base.clone() };
        let kpis = completed(&cfg, 1);
        distinct.insert((kpis.total_disruptions, kpis.service_level_pct.to_bits()));
    }
    assert!(distinct.len() > 1, "30 distinct seeds should not all collide");
}

/// Property 6: averaged over many replicas, increasing capacity never
/// decreases mean service level.
#[test]
fn monotone_in_capacity() {
    let low = mean_service_level(431.0, 21.0);
    let high = mean_service_level(681.0, 21.0);
    assert!(high >= low - 1e-6, "higher capacity should not reduce mean service level ({high} < {low})");
}

/// Property 7: averaged over many replicas, increasing disruption duration
/// never increases mean service level.
#[test]
fn monotone_in_disruption_duration() {
    let short = mean_service_level(431.0, 7.0);
    let long = mean_service_level(431.0, 21.0);
    assert!(short >= long - 1e-6, "longer disruptions should not raise mean service level ({short} < {long})");
}

fn mean_service_level(capacity: f64, disruption_max_days: f64) -> f64 {
    let n = 30u64;
    let mut total = 0.0;
    for seed in 0..n {
        let cfg = SimulationConfig {
            capacity_tm: capacity,
            reorder_point_tm: capacity * 0.91,
            order_quantity_tm: capacity * 0.53,
            initial_inventory_tm: capacity * 0.60,
            annual_disruption_rate: 4.0,
            disruption_min_days: 3.0,
            disruption_mode_days: disruption_max_days / 2.0,
            disruption_max_days,
            seed,
            ..SimulationConfig::baseline()
        };
        total += completed(&cfg, 1).service_level_pct;
    }
    total / n as f64
}

/// Property 8: Poisson arrival rate — over many replicas with lambda=4 and
/// T=365, mean total_disruptions falls within a 95% Wald CI of 4.
#[test]
fn poisson_arrival_rate_matches_lambda() {
    let n = 600usize;
    let counts: Vec<f64> = (0..n as u64)
        .map(|seed| {
            let cfg = SimulationConfig {
                annual_disruption_rate: 4.0,
                simulation_days: 365,
                seed,
                ..SimulationConfig::baseline()
            };
            completed(&cfg, 1).total_disruptions as f64
        })
        .collect();
    let mean = counts.iter().sum::<f64>() / n as f64;
    let variance = counts.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n as f64;
    let se = (variance / n as f64).sqrt();
    let lower = mean - 1.96 * se;
    let upper = mean + 1.96 * se;
    assert!(lower <= 4.0 && 4.0 <= upper, "95% CI [{lower}, {upper}] should cover 4.0, got mean {mean}");
}
