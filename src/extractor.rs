use crate::models::{BatteryConfig, HorizonData, Mode, TraceRow, ALL_PRODUCTS, N_PRODUCTS};
use crate::solver::SolvedAssignment;
use log::warn;

/// Indicator value above which a product counts as selected. Solver output
/// for a binary is never exactly 1.0.
const SELECTED_THRESHOLD: f64 = 0.9;

/// Reads a solved assignment back into one trace row per slot: the active
/// product, its price, the SoC value, and the signed charge amount.
pub fn extract_trace(
    horizon: &HorizonData,
    assignment: &SolvedAssignment,
    battery: &BatteryConfig,
) -> Vec<TraceRow> {
    let mut trace = Vec::with_capacity(horizon.len());
    for (t, slot) in horizon.slots.iter().enumerate() {
        let p = active_product(&assignment.state[t], slot.timestamp);
        let product = ALL_PRODUCTS[p];

        let charge_amount = if product.mode == Mode::Idle {
            None
        } else {
            let flow = assignment.flow[t].iter().find(|(fp, _)| *fp == p);
            match flow {
                Some(&(_, magnitude)) => Some(product.mode.polarity() * magnitude),
                None => Some(product.energy_delta(battery)),
            }
        };

        trace.push(TraceRow {
            timestamp: slot.timestamp,
            soc: assignment.soc[t],
            product: product.label().to_string(),
            price: horizon.prices[t][p],
            charge_amount,
        });
    }
    trace
}

/// The single-assignment constraint guarantees exactly one indicator near 1;
/// if numerical noise leaves none above the threshold, fall back to the
/// largest one.
fn active_product(indicators: &[f64], timestamp: chrono::NaiveDateTime) -> usize {
    for p in 0..N_PRODUCTS {
        if indicators[p] >= SELECTED_THRESHOLD {
            return p;
        }
    }
    let fallback = indicators
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(p, _)| p)
        .unwrap_or(0);
    warn!(
        "no indicator above {} at {}; falling back to {}",
        SELECTED_THRESHOLD,
        timestamp,
        ALL_PRODUCTS[fallback].label()
    );
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Market, PriceRow, Product};
    use chrono::{Duration, NaiveDate};

    fn horizon_with_prices(prices: Vec<[f64; N_PRODUCTS]>) -> HorizonData {
        let start = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let rows: Vec<PriceRow> = prices
            .into_iter()
            .enumerate()
            .map(|(t, prices)| PriceRow {
                timestamp: start + Duration::minutes(60 * t as i64),
                prices,
            })
            .collect();
        HorizonData::from_rows(&rows, 60)
    }

    fn battery() -> BatteryConfig {
        BatteryConfig {
            slot_minutes: 60,
            ..BatteryConfig::default()
        }
    }

    fn indicator_row(selected: usize) -> Vec<f64> {
        let mut row = vec![0.0; N_PRODUCTS];
        row[selected] = 1.0;
        row
    }

    #[test]
    fn test_extracts_selected_products_and_amounts() {
        let charge = Product { market: Market::RealTime, mode: Mode::Charge }.index();
        let discharge = Product { market: Market::RealTime, mode: Mode::Discharge }.index();

        let mut prices = vec![[0.0; N_PRODUCTS]; 3];
        prices[0][charge] = -4.0;
        prices[2][discharge] = 55.0;
        let horizon = horizon_with_prices(prices);

        let assignment = SolvedAssignment {
            state: vec![
                indicator_row(charge),
                indicator_row(0), // idle
                indicator_row(discharge),
            ],
            soc: vec![0.39, 0.39, 0.22],
            flow: vec![Vec::new(); 3],
            objective: 51.0,
        };

        let trace = extract_trace(&horizon, &assignment, &battery());
        assert_eq!(trace.len(), 3);

        assert_eq!(trace[0].product, "charge");
        assert_eq!(trace[0].price, -4.0);
        let expected_charge = 0.85 * 60.0 / 360.0;
        assert!((trace[0].charge_amount.unwrap() - expected_charge).abs() < 1e-12);

        assert_eq!(trace[1].product, "idle");
        assert_eq!(trace[1].charge_amount, None);

        assert_eq!(trace[2].product, "discharge");
        assert!((trace[2].charge_amount.unwrap() + 60.0 / 360.0).abs() < 1e-12);
        assert_eq!(trace[2].soc, 0.22);
    }

    #[test]
    fn test_flow_value_overrides_full_delta() {
        let da_charge = Product { market: Market::DayAhead, mode: Mode::Charge }.index();
        let horizon = horizon_with_prices(vec![[0.0; N_PRODUCTS]]);

        let assignment = SolvedAssignment {
            state: vec![indicator_row(da_charge)],
            soc: vec![0.3],
            flow: vec![vec![(da_charge, 0.05)]],
            objective: 0.0,
        };

        let trace = extract_trace(&horizon, &assignment, &battery());
        assert!((trace[0].charge_amount.unwrap() - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_falls_back_to_largest_indicator() {
        let horizon = horizon_with_prices(vec![[0.0; N_PRODUCTS]]);
        let mut row = vec![0.1; N_PRODUCTS];
        row[5] = 0.6;

        let assignment = SolvedAssignment {
            state: vec![row],
            soc: vec![0.25],
            flow: vec![Vec::new(); 1],
            objective: 0.0,
        };

        let trace = extract_trace(&horizon, &assignment, &battery());
        assert_eq!(trace[0].product, ALL_PRODUCTS[5].label());
    }
}
