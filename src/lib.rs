//! Single-hub LPG supply-chain Monte Carlo simulator.
//!
//! A stochastic discrete-event simulation of an (s, Q)-controlled storage
//! hub under seasonal demand and Markov-modulated route disruptions, a
//! replicated Monte Carlo experiment driver running the simulation across a
//! bounded worker pool, and an HTTP control surface over the two.

/// Typed error kinds shared across the kernel, executor, and API layers.
pub mod error;

/// Seeded RNG and the sampling distributions the kernel draws from.
pub mod rng;

/// TOML-based simulation configuration and factorial-design presets.
pub mod config;

/// Discrete-event simulation kernel, KPI calculator, and domain types.
pub mod sim;

/// Pure, side-effect-free single-replica driver.
pub mod replica;

/// Monte Carlo experiment executor, aggregation, and the ANOVA collaborator.
pub mod experiment;

/// CSV export of simulation time series and KPI reports.
pub mod io;

/// REST API for starting and querying Monte Carlo experiments (feature-gated behind `api`).
#[cfg(feature = "api")]
pub mod api;
