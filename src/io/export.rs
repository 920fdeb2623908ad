//! CSV export for simulation daily metrics and replica KPIs.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::types::TimeSeriesPoint;

/// Schema v1 column header for the daily-metrics CSV export.
const DAILY_HEADER: &str = "day,inventory_tm,demand_tm,satisfied_demand_tm,\
                             supply_received_tm,stockout,route_blocked,\
                             pending_orders,autonomy_days";

/// Exports one replica's day-by-day time series to a CSV file.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_daily_csv(series: &[TimeSeriesPoint], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_daily_csv(series, buf)
}

/// Writes a replica's day-by-day time series as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_daily_csv(series: &[TimeSeriesPoint], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(DAILY_HEADER.split(','))?;

    for point in series {
        wtr.write_record(&[
            point.day.to_string(),
            format!("{:.4}", point.inventory_tm),
            format!("{:.4}", point.demand_tm),
            format!("{:.4}", point.satisfied_demand_tm),
            format!("{:.4}", point.supply_received_tm),
            point.stockout.to_string(),
            point.route_blocked.to_string(),
            point.pending_orders.to_string(),
            format!("{:.4}", point.autonomy_days),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Schema v1 column header for the per-replica KPI summary CSV export.
const KPI_HEADER: &str = "replica_index,seed,service_level_pct,stockout_probability_pct,\
                           stockout_days,avg_inventory_tm,min_inventory_tm,max_inventory_tm,\
                           final_inventory_tm,avg_autonomy_days,min_autonomy_days,\
                           total_disruptions,total_blocked_days,blocked_time_pct";

/// One exportable row of the KPI summary table: a replica's identity plus
/// the subset of its KPIs worth a flat CSV view.
pub struct KpiRow<'a> {
    pub replica_index: u32,
    pub seed: u64,
    pub kpis: &'a crate::sim::kpi::Kpis,
}

/// Exports a set of replicas' KPI summaries to a CSV file, one row each.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_kpi_summary_csv(rows: &[KpiRow<'_>], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_kpi_summary_csv(rows, buf)
}

/// Writes a set of replicas' KPI summaries as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_kpi_summary_csv(rows: &[KpiRow<'_>], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(KPI_HEADER.split(','))?;

    for row in rows {
        let k = row.kpis;
        wtr.write_record(&[
            row.replica_index.to_string(),
            row.seed.to_string(),
            format!("{:.4}", k.service_level_pct),
            format!("{:.4}", k.stockout_probability_pct),
            k.stockout_days.to_string(),
            format!("{:.2}", k.avg_inventory_tm),
            format!("{:.2}", k.min_inventory_tm),
            format!("{:.2}", k.max_inventory_tm),
            format!("{:.2}", k.final_inventory_tm),
            format!("{:.2}", k.avg_autonomy_days),
            format!("{:.2}", k.min_autonomy_days),
            k.total_disruptions.to_string(),
            format!("{:.2}", k.total_blocked_days),
            format!("{:.4}", k.blocked_time_pct),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::replica::run_replica;

    #[test]
    fn daily_header_matches_schema_v1() {
        let mut buf = Vec::new();
        write_daily_csv(&[], &mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        assert_eq!(
            output.lines().next().unwrap(),
            "day,inventory_tm,demand_tm,satisfied_demand_tm,\
             supply_received_tm,stockout,route_blocked,\
             pending_orders,autonomy_days"
        );
    }

    #[test]
    fn daily_row_count_matches_series_length() {
        let cfg = SimulationConfig {
            simulation_days: 10,
            ..SimulationConfig::baseline()
        };
        let outcome = run_replica(&cfg, 1, true);
        let (_, series) = outcome.result.unwrap();
        let series = series.unwrap();

        let mut buf = Vec::new();
        write_daily_csv(&series, &mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        assert_eq!(output.lines().count(), series.len() + 1);
    }

    #[test]
    fn kpi_summary_round_trip_parseable() {
        let cfg = SimulationConfig {
            simulation_days: 30,
            ..SimulationConfig::baseline()
        };
        let outcome = run_replica(&cfg, 3, false);
        let (kpis, _) = outcome.result.unwrap();
        let rows = vec![KpiRow {
            replica_index: 3,
            seed: cfg.seed,
            kpis: &kpis,
        }];

        let mut buf = Vec::new();
        write_kpi_summary_csv(&rows, &mut buf).unwrap();

        let mut rdr = csv::ReaderBuilder::new().from_reader(buf.as_slice());
        let headers = rdr.headers().unwrap().clone();
        assert_eq!(headers.len(), 14);
        let mut count = 0;
        for record in rdr.records() {
            assert!(record.is_ok());
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[test]
    fn empty_rows_produce_header_only() {
        let mut buf = Vec::new();
        write_kpi_summary_csv(&[], &mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        assert_eq!(output.lines().count(), 1);
    }
}
