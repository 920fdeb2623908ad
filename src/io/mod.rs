//! CSV export for simulation output.

pub mod export;

pub use export::{export_daily_csv, export_kpi_summary_csv, write_daily_csv, write_kpi_summary_csv, KpiRow};
