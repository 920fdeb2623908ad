use std::env;
use std::path::PathBuf;

/// Which of the three top-level actions to perform, plus its own options.
#[derive(Debug, PartialEq)]
pub enum Command {
    /// Run one simulation, print the KPI report, optionally export telemetry.
    Run { telemetry_out: Option<PathBuf> },
    /// Run a Monte Carlo experiment synchronously to completion on the CLI.
    Experiment {
        replicas: u32,
        workers: usize,
        factorial: bool,
    },
    /// Start the HTTP control surface (feature `api`).
    Serve { api_bind: String },
}

#[derive(Debug, PartialEq)]
pub struct CliOptions {
    pub scenario: Option<PathBuf>,
    pub preset: Option<String>,
    pub seed: Option<u64>,
    pub command: Command,
}

pub fn parse_args() -> Result<CliOptions, String> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_args_from(args)
}

fn parse_args_from(args: Vec<String>) -> Result<CliOptions, String> {
    if args.len() == 1 && (args[0] == "--help" || args[0] == "-h") {
        print_usage();
        std::process::exit(0);
    }
    parse_options(&args)
}

fn parse_options(args: &[String]) -> Result<CliOptions, String> {
    let (command_name, rest) = match args.first() {
        Some(first) if !first.starts_with('-') => (first.as_str(), &args[1..]),
        _ => ("run", args),
    };
    if !["run", "experiment", "serve"].contains(&command_name) {
        return Err(format!(
            "unknown command \"{command_name}\"; expected \"run\", \"experiment\", or \"serve\""
        ));
    }

    let mut i = 0usize;
    let mut scenario = None;
    let mut preset = None;
    let mut seed = None;
    let mut telemetry_out = None;
    let mut api_bind = None;
    let mut replicas = None;
    let mut workers = None;
    let mut factorial = false;

    while i < rest.len() {
        match rest[i].as_str() {
            "--scenario" => {
                i += 1;
                let path = rest.next_or_err(
                    i,
                    "missing value for --scenario (expected a TOML file path)",
                )?;
                if scenario.replace(PathBuf::from(path)).is_some() {
                    return Err("--scenario provided more than once".to_string());
                }
            }
            "--preset" => {
                i += 1;
                let name =
                    rest.next_or_err(i, "missing value for --preset (expected a preset name)")?;
                if preset.replace(name.to_string()).is_some() {
                    return Err("--preset provided more than once".to_string());
                }
            }
            "--seed" => {
                i += 1;
                let raw = rest.next_or_err(i, "missing value for --seed (expected a u64)")?;
                let parsed: u64 = raw
                    .parse()
                    .map_err(|_| format!("--seed value \"{raw}\" is not a valid u64"))?;
                if seed.replace(parsed).is_some() {
                    return Err("--seed provided more than once".to_string());
                }
            }
            "--telemetry-out" => {
                i += 1;
                let path = rest.next_or_err(
                    i,
                    "missing value for --telemetry-out (expected a file path)",
                )?;
                if telemetry_out.replace(PathBuf::from(path)).is_some() {
                    return Err("--telemetry-out provided more than once".to_string());
                }
            }
            "--api-bind" => {
                i += 1;
                let addr = rest.next_or_err(i, "missing value for --api-bind (expected host:port)")?;
                if api_bind.replace(addr.to_string()).is_some() {
                    return Err("--api-bind provided more than once".to_string());
                }
            }
            "--replicas" => {
                i += 1;
                let raw = rest.next_or_err(i, "missing value for --replicas (expected a u32)")?;
                let parsed: u32 = raw
                    .parse()
                    .map_err(|_| format!("--replicas value \"{raw}\" is not a valid u32"))?;
                if replicas.replace(parsed).is_some() {
                    return Err("--replicas provided more than once".to_string());
                }
            }
            "--workers" => {
                i += 1;
                let raw = rest.next_or_err(i, "missing value for --workers (expected a usize)")?;
                let parsed: usize = raw
                    .parse()
                    .map_err(|_| format!("--workers value \"{raw}\" is not a valid usize"))?;
                if workers.replace(parsed).is_some() {
                    return Err("--workers provided more than once".to_string());
                }
            }
            "--factorial" => {
                factorial = true;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    if scenario.is_some() && preset.is_some() {
        return Err(
            "arguments `--scenario` and `--preset` are mutually exclusive; choose one source"
                .to_string(),
        );
    }
    if scenario.is_none() && preset.is_none() {
        preset = Some("baseline".to_string());
    }

    let command = match command_name {
        "run" => Command::Run { telemetry_out },
        "experiment" => Command::Experiment {
            replicas: replicas.unwrap_or(1_000),
            workers: workers.unwrap_or(4),
            factorial,
        },
        "serve" => Command::Serve {
            api_bind: api_bind.unwrap_or_else(|| "127.0.0.1:3000".to_string()),
        },
        _ => unreachable!("validated above"),
    };

    Ok(CliOptions {
        scenario,
        preset,
        seed,
        command,
    })
}

trait SliceArgExt {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String>;
}

impl SliceArgExt for [String] {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String> {
        self.get(index)
            .map(String::as_str)
            .ok_or_else(|| err.to_string())
    }
}

pub fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  glp-hub-sim [run] [--scenario <path> | --preset <name>] [--seed <u64>] [--telemetry-out <path>]");
    eprintln!("  glp-hub-sim experiment [--replicas N] [--workers W] [--factorial] [--seed <u64>]");
    eprintln!("  glp-hub-sim serve [--api-bind <host:port>] [--preset <name>]");
}
