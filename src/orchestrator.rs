use crate::aggregator::aggregate_chunks;
use crate::extractor::extract_trace;
use crate::model_builder::build_model;
use crate::models::{BatteryConfig, Formulation, HorizonData, PriceRow, PriceTable, TraceRow};
use crate::solver::{solve, SolveSettings, SolveStatus};
use anyhow::Result;
use chrono::Datelike;
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Everything the rolling solve needs besides the price table itself.
#[derive(Debug, Clone)]
pub struct RollingConfig {
    pub battery: BatteryConfig,
    pub formulation: Formulation,
    pub solve: SolveSettings,
    /// Coarse evaluation interval; `None` solves at base resolution.
    pub chunk_minutes: Option<u32>,
}

impl Default for RollingConfig {
    fn default() -> Self {
        Self {
            battery: BatteryConfig::default(),
            formulation: Formulation::Committed,
            solve: SolveSettings::default(),
            chunk_minutes: None,
        }
    }
}

/// Per-horizon diagnostic, one per calendar month processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorizonReport {
    /// "YYYY-MM"
    pub label: String,
    pub status: SolveStatus,
    pub objective: Option<f64>,
    pub rows_emitted: usize,
    /// SoC handed to the next horizon; equals the carried-in value when the
    /// horizon produced no solution.
    pub terminal_soc: f64,
}

#[derive(Debug, Clone)]
pub struct RollingResult {
    pub trace: Vec<TraceRow>,
    pub reports: Vec<HorizonReport>,
    pub final_soc: f64,
}

/// Partitions the dataset into monthly horizons and solves them in order,
/// carrying the terminal SoC of each month into the next.
pub struct RollingScheduler {
    config: RollingConfig,
}

impl RollingScheduler {
    pub fn new(config: RollingConfig) -> Self {
        Self { config }
    }

    /// Runs the full rolling solve. Input validation failures are fatal;
    /// per-horizon solver failures are reported and skipped, never allowed
    /// to halt the remaining months.
    pub fn run(&self, table: &PriceTable) -> Result<RollingResult> {
        table.validate()?;

        let battery = &self.config.battery;
        let mut trace = Vec::new();
        let mut reports = Vec::new();
        let mut soc_carry = battery.initial_soc;

        for (label, rows) in month_partitions(&table.rows) {
            let mut horizon = HorizonData::from_rows(rows, battery.slot_minutes);
            if let Some(chunk_minutes) = self.config.chunk_minutes {
                horizon = aggregate_chunks(&horizon, chunk_minutes)?;
            }

            info!(
                "solving horizon {} ({} slots, initial SoC {:.3})",
                label,
                horizon.len(),
                soc_carry
            );

            let model = build_model(&horizon, battery, self.config.formulation, soc_carry);
            let outcome = solve(model, &self.config.solve);

            match outcome.assignment {
                Some(assignment) => {
                    let rows_out = extract_trace(&horizon, &assignment, battery);
                    soc_carry = assignment.soc.last().copied().unwrap_or(soc_carry);
                    info!(
                        "horizon {}: {} (objective {:.2}, terminal SoC {:.3})",
                        label, outcome.status, assignment.objective, soc_carry
                    );
                    reports.push(HorizonReport {
                        label,
                        status: outcome.status,
                        objective: Some(assignment.objective),
                        rows_emitted: rows_out.len(),
                        terminal_soc: soc_carry,
                    });
                    trace.extend(rows_out);
                }
                None => {
                    warn!(
                        "horizon {} contributed no trace rows ({}); carrying SoC {:.3} forward",
                        label, outcome.status, soc_carry
                    );
                    reports.push(HorizonReport {
                        label,
                        status: outcome.status,
                        objective: None,
                        rows_emitted: 0,
                        terminal_soc: soc_carry,
                    });
                }
            }
        }

        Ok(RollingResult {
            trace,
            reports,
            final_soc: soc_carry,
        })
    }
}

/// Splits the time-sorted rows into contiguous calendar-month runs.
fn month_partitions(rows: &[PriceRow]) -> Vec<(String, &[PriceRow])> {
    let mut partitions = Vec::new();
    let mut start = 0;
    for i in 1..=rows.len() {
        let boundary = i == rows.len() || month_key(&rows[i]) != month_key(&rows[start]);
        if boundary {
            let (year, month) = month_key(&rows[start]);
            partitions.push((format!("{:04}-{:02}", year, month), &rows[start..i]));
            start = i;
        }
    }
    partitions
}

fn month_key(row: &PriceRow) -> (i32, u32) {
    (row.timestamp.year(), row.timestamp.month())
}
