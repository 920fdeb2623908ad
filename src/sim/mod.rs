//! Discrete-event kernel, its domain types, and the KPI calculator.

/// Bounded hub inventory.
pub mod container;
/// Discrete-event scheduler and the three cooperating processes.
pub mod kernel;
/// Post-hoc KPI calculation.
pub mod kpi;
/// Route availability / disruption state machine.
pub mod route;
/// Orders in transit and per-day metrics records.
pub mod types;
