//! LPG hub supply-chain simulator — CLI entry point.

mod cli;

use std::path::Path;
use std::process;
use std::sync::atomic::Ordering;

use glp_hub_sim::config::SimulationConfig;
use glp_hub_sim::experiment::{self, ExecutionHandle, ExperimentRequest, ExperimentStore, InMemoryExperimentStore};
use glp_hub_sim::io::export::export_daily_csv;
use glp_hub_sim::replica::run_replica;

use cli::Command;

fn load_config(opts: &cli::CliOptions) -> SimulationConfig {
    let mut config = if let Some(ref path) = opts.scenario {
        match SimulationConfig::from_toml_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else if let Some(ref name) = opts.preset {
        match SimulationConfig::from_preset(name) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else {
        SimulationConfig::baseline()
    };

    if let Some(seed) = opts.seed {
        config.seed = seed;
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }
    for warning in config.warnings() {
        eprintln!("warning: {warning}");
    }

    config
}

fn run_once(config: &SimulationConfig, telemetry_out: Option<&Path>) {
    let outcome = run_replica(config, 1, telemetry_out.is_some());
    match outcome.result {
        Ok((kpis, series)) => {
            println!("{kpis:#?}");
            if let Some(path) = telemetry_out {
                let series = series.unwrap_or_default();
                if let Err(e) = export_daily_csv(&series, path) {
                    eprintln!("error: failed to write CSV: {e}");
                    process::exit(1);
                }
                eprintln!("Telemetry written to {}", path.display());
            }
        }
        Err(failure) => {
            eprintln!("error: {failure}");
            process::exit(1);
        }
    }
}

fn run_experiment(config: &SimulationConfig, replicas: u32, workers: usize, factorial: bool) {
    if factorial {
        run_factorial_experiment(config, replicas, workers);
        return;
    }

    eprintln!("Running {replicas} replicas across {workers} workers...");
    let store = InMemoryExperimentStore::new();
    let request = ExperimentRequest {
        name: None,
        config: config.clone(),
        num_replicas: replicas,
        max_workers: workers,
        seed_base: config.seed,
    };
    let id = match experiment::create_experiment(store.as_ref(), request) {
        Ok(id) => id,
        Err(errors) => {
            for e in &errors {
                eprintln!("{e}");
            }
            process::exit(1);
        }
    };

    let handle = ExecutionHandle::new();
    let progress_handle = handle.clone();
    let monitor = std::thread::spawn(move || loop {
        let done = progress_handle.completed.load(Ordering::Relaxed);
        eprint!("\r  {done}/{replicas} replicas completed");
        if done >= replicas {
            eprintln!();
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(200));
    });

    if let Err(e) = experiment::execute(store.as_ref(), id, &handle) {
        eprintln!("error: {e}");
        process::exit(1);
    }
    let _ = monitor.join();

    let completed = store.get(id).expect("experiment was just created");
    match completed.aggregates {
        Some(aggregates) => {
            println!(
                "\n{:<28} {:>10} {:>10} {:>10} {:>10}",
                "metric", "mean", "std", "p50", "p95"
            );
            print_stat_row("service_level_pct", &aggregates.service_level_pct);
            print_stat_row("stockout_probability_pct", &aggregates.stockout_probability_pct);
            print_stat_row("avg_inventory_tm", &aggregates.avg_inventory_tm);
            print_stat_row("avg_autonomy_days", &aggregates.avg_autonomy_days);
            print_stat_row("blocked_time_pct", &aggregates.blocked_time_pct);
        }
        None => eprintln!("no replicas completed"),
    }
}

fn run_factorial_experiment(config: &SimulationConfig, replicas_per_cell: u32, workers: usize) {
    eprintln!("Running factorial sweep: {replicas_per_cell} replicas/cell across {workers} workers...");
    let cells =
        match experiment::run_factorial_sweep(config.seed, config.simulation_days, replicas_per_cell, workers) {
            Ok(cells) => cells,
            Err(e) => {
                eprintln!("error: {e}");
                process::exit(1);
            }
        };

    for cell in &cells {
        let kpis: Vec<_> = cell.replicas.iter().filter_map(|r| r.kpis).collect();
        match experiment::KpiAggregates::from_kpis(&kpis) {
            Some(aggregates) => println!(
                "{}: service_level={:.2}% (n={}) stockout_probability={:.2}%",
                cell.name,
                aggregates.service_level_pct.mean,
                aggregates.service_level_pct.n,
                aggregates.stockout_probability_pct.mean,
            ),
            None => eprintln!("{}: no replicas completed", cell.name),
        }
    }

    let rows = experiment::anova_rows_from_sweep(&cells);
    match experiment::anova::two_way_anova(&rows) {
        Ok(result) => {
            println!("\nTwo-way ANOVA (response = service_level_pct):");
            for row in &result.table {
                println!(
                    "  {:<20} SS={:>12.3} df={:>5.1} MS={:>12.3} F={} p={}",
                    row.source,
                    row.sum_sq,
                    row.df,
                    row.mean_sq,
                    row.f_stat.map_or("n/a".to_string(), |f| format!("{f:.3}")),
                    row.p_value.map_or("n/a".to_string(), |p| format!("{p:.4}")),
                );
            }
        }
        Err(e) => eprintln!("ANOVA not available: {e}"),
    }
}

fn print_stat_row(name: &str, stats: &glp_hub_sim::experiment::stats::AggregateStats) {
    println!(
        "{name:<28} {:>10.3} {:>10.3} {:>10.3} {:>10.3}",
        stats.mean, stats.std, stats.p50, stats.p95
    );
}

fn main() {
    let opts = match cli::parse_args() {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("error: {e}");
            cli::print_usage();
            process::exit(1);
        }
    };

    let config = load_config(&opts);

    match opts.command {
        Command::Run { telemetry_out } => run_once(&config, telemetry_out.as_deref()),
        Command::Experiment {
            replicas,
            workers,
            factorial,
        } => run_experiment(&config, replicas, workers, factorial),
        #[cfg(feature = "api")]
        Command::Serve { api_bind } => {
            use std::net::SocketAddr;

            let addr: SocketAddr = api_bind.parse().unwrap_or_else(|e| {
                eprintln!("error: invalid --api-bind address \"{api_bind}\": {e}");
                process::exit(1);
            });
            let state = glp_hub_sim::api::AppState::new();
            let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
                eprintln!("error: failed to create tokio runtime: {e}");
                process::exit(1);
            });
            rt.block_on(glp_hub_sim::api::serve(state, addr));
        }
        #[cfg(not(feature = "api"))]
        Command::Serve { .. } => {
            eprintln!("error: this binary was built without the \"api\" feature");
            process::exit(1);
        }
    }
}
