use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Operating mode a battery can serve in a single time slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Idle,
    Charge,
    Discharge,
    SpinningReserve,
    SupplementalReserve,
    RegulationUp,
    RegulationDown,
}

impl Mode {
    pub const ALL: [Mode; 7] = [
        Mode::Idle,
        Mode::Charge,
        Mode::Discharge,
        Mode::SpinningReserve,
        Mode::SupplementalReserve,
        Mode::RegulationUp,
        Mode::RegulationDown,
    ];

    /// Sign of the energy flow into the battery: +1 charging, -1 discharging.
    pub fn polarity(self) -> f64 {
        match self {
            Mode::Idle => 0.0,
            Mode::Charge | Mode::RegulationDown => 1.0,
            Mode::Discharge
            | Mode::SpinningReserve
            | Mode::SupplementalReserve
            | Mode::RegulationUp => -1.0,
        }
    }

    /// Fraction of the rated power actually cycled while serving this mode.
    /// Reserve products mostly stand by, so their throughput is small.
    pub fn throughput_efficiency(self) -> f64 {
        match self {
            Mode::Idle => 0.0,
            Mode::Charge | Mode::Discharge => 1.0,
            Mode::SpinningReserve => 0.1,
            Mode::SupplementalReserve => 0.0,
            Mode::RegulationUp | Mode::RegulationDown => 0.2,
        }
    }

    pub fn is_charging(self) -> bool {
        self.polarity() > 0.0
    }

    pub fn is_discharging(self) -> bool {
        self.polarity() < 0.0
    }
}

/// Which market a product clears in. Day-ahead products carry an hourly
/// commitment rule that real-time products do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Market {
    RealTime,
    DayAhead,
}

/// One sellable product: a (market, mode) pair. Idle exists only in the
/// real-time set and never carries a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Product {
    pub market: Market,
    pub mode: Mode,
}

pub const N_PRODUCTS: usize = 13;

/// The fixed product set: 7 real-time products followed by the 6 non-idle
/// day-ahead products. Indices into per-slot price and indicator arrays
/// follow this ordering.
pub const ALL_PRODUCTS: [Product; N_PRODUCTS] = [
    Product { market: Market::RealTime, mode: Mode::Idle },
    Product { market: Market::RealTime, mode: Mode::Charge },
    Product { market: Market::RealTime, mode: Mode::Discharge },
    Product { market: Market::RealTime, mode: Mode::SpinningReserve },
    Product { market: Market::RealTime, mode: Mode::SupplementalReserve },
    Product { market: Market::RealTime, mode: Mode::RegulationUp },
    Product { market: Market::RealTime, mode: Mode::RegulationDown },
    Product { market: Market::DayAhead, mode: Mode::Charge },
    Product { market: Market::DayAhead, mode: Mode::Discharge },
    Product { market: Market::DayAhead, mode: Mode::SpinningReserve },
    Product { market: Market::DayAhead, mode: Mode::SupplementalReserve },
    Product { market: Market::DayAhead, mode: Mode::RegulationUp },
    Product { market: Market::DayAhead, mode: Mode::RegulationDown },
];

pub const IDLE_INDEX: usize = 0;

impl Product {
    pub fn index(self) -> usize {
        ALL_PRODUCTS
            .iter()
            .position(|p| *p == self)
            .expect("product outside the fixed set")
    }

    /// Stable label used for price columns and trace rows.
    pub fn label(self) -> &'static str {
        match (self.market, self.mode) {
            (Market::RealTime, Mode::Idle) => "idle",
            (Market::RealTime, Mode::Charge) => "charge",
            (Market::RealTime, Mode::Discharge) => "discharge",
            (Market::RealTime, Mode::SpinningReserve) => "spinning_reserve",
            (Market::RealTime, Mode::SupplementalReserve) => "supplemental_reserve",
            (Market::RealTime, Mode::RegulationUp) => "regulation_up",
            (Market::RealTime, Mode::RegulationDown) => "regulation_down",
            (Market::DayAhead, Mode::Idle) => unreachable!("no day-ahead idle product"),
            (Market::DayAhead, Mode::Charge) => "da_charge",
            (Market::DayAhead, Mode::Discharge) => "da_discharge",
            (Market::DayAhead, Mode::SpinningReserve) => "da_spinning_reserve",
            (Market::DayAhead, Mode::SupplementalReserve) => "da_supplemental_reserve",
            (Market::DayAhead, Mode::RegulationUp) => "da_regulation_up",
            (Market::DayAhead, Mode::RegulationDown) => "da_regulation_down",
        }
    }

    pub fn has_price(self) -> bool {
        self.mode != Mode::Idle
    }

    /// Signed SoC change per slot while serving this product, as a fraction
    /// of rated capacity. Round-trip losses are booked on the charging side.
    pub fn energy_delta(self, battery: &BatteryConfig) -> f64 {
        let eff = if self.mode.is_charging() {
            battery.round_trip_efficiency
        } else {
            1.0
        };
        self.mode.polarity()
            * self.mode.throughput_efficiency()
            * eff
            * (battery.slot_minutes as f64 / battery.duration_minutes as f64)
    }
}

/// Physical battery parameters. SoC quantities are fractions of rated
/// capacity; `duration_minutes` is the time to discharge from full at rated
/// power.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatteryConfig {
    pub soc_min: f64,
    pub soc_cap: f64,
    pub initial_soc: f64,
    pub round_trip_efficiency: f64,
    pub duration_minutes: u32,
    pub slot_minutes: u32,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            soc_min: 0.2,
            soc_cap: 0.95,
            initial_soc: 0.25,
            round_trip_efficiency: 0.85,
            duration_minutes: 360,
            slot_minutes: 5,
        }
    }
}

/// Which MILP formulation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Formulation {
    /// Binary indicators only; a selected product always moves its full
    /// per-slot energy delta. This is the baseline formulation.
    Committed,
    /// Adds a continuous charge-amount per (slot, product), gated by the
    /// indicator, so the solver can cycle less than the full delta when the
    /// daily budget or SoC headroom binds.
    DecoupledFlow,
}

/// One input row: a base time slot with one price per non-idle product,
/// indexed by `ALL_PRODUCTS` ordering (the idle cell is always zero).
#[derive(Debug, Clone)]
pub struct PriceRow {
    pub timestamp: NaiveDateTime,
    pub prices: [f64; N_PRODUCTS],
}

/// The full time-sorted input table, spanning all horizons.
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    pub rows: Vec<PriceRow>,
}

impl PriceTable {
    /// Global input validation: runs once, before any horizon is built.
    pub fn validate(&self) -> Result<()> {
        if self.rows.is_empty() {
            anyhow::bail!("price table is empty");
        }
        for pair in self.rows.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                anyhow::bail!(
                    "price table is not strictly increasing at {}",
                    pair[1].timestamp
                );
            }
        }
        for row in &self.rows {
            for (product, price) in ALL_PRODUCTS.iter().zip(row.prices.iter()) {
                if !price.is_finite() {
                    anyhow::bail!(
                        "non-finite {} price at {}",
                        product.label(),
                        row.timestamp
                    );
                }
            }
        }
        Ok(())
    }
}

/// A single slot's calendar coordinates within a horizon.
#[derive(Debug, Clone, Copy)]
pub struct Slot {
    pub timestamp: NaiveDateTime,
    pub date: NaiveDate,
    pub hour: u32,
}

/// Immutable per-horizon input: slots, dense prices, and the optional chunk
/// grouping produced by the aggregator. Built once, then only read.
#[derive(Debug, Clone)]
pub struct HorizonData {
    pub slots: Vec<Slot>,
    /// `prices[t][p]` for p in `ALL_PRODUCTS` ordering.
    pub prices: Vec<[f64; N_PRODUCTS]>,
    /// Chunk id per slot when coarse evaluation intervals are in use.
    pub chunks: Option<Vec<usize>>,
    pub slot_minutes: u32,
}

impl HorizonData {
    pub fn from_rows(rows: &[PriceRow], slot_minutes: u32) -> Self {
        let slots = rows
            .iter()
            .map(|r| Slot {
                timestamp: r.timestamp,
                date: r.timestamp.date(),
                hour: r.timestamp.hour(),
            })
            .collect();
        let prices = rows.iter().map(|r| r.prices).collect();
        Self {
            slots,
            prices,
            chunks: None,
            slot_minutes,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// One output row of the operating trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRow {
    pub timestamp: NaiveDateTime,
    pub soc: f64,
    pub product: String,
    pub price: f64,
    pub charge_amount: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn battery() -> BatteryConfig {
        BatteryConfig::default()
    }

    #[test]
    fn test_product_indices_match_ordering() {
        for (i, product) in ALL_PRODUCTS.iter().enumerate() {
            assert_eq!(product.index(), i);
        }
        assert_eq!(ALL_PRODUCTS[IDLE_INDEX].mode, Mode::Idle);
    }

    #[test]
    fn test_energy_deltas() {
        let b = battery();
        let dt = 5.0 / 360.0;

        let charge = Product { market: Market::RealTime, mode: Mode::Charge };
        assert!((charge.energy_delta(&b) - 0.85 * dt).abs() < 1e-12);

        let discharge = Product { market: Market::RealTime, mode: Mode::Discharge };
        assert!((discharge.energy_delta(&b) + dt).abs() < 1e-12);

        let regd = Product { market: Market::DayAhead, mode: Mode::RegulationDown };
        assert!((regd.energy_delta(&b) - 0.2 * 0.85 * dt).abs() < 1e-12);

        let supr = Product { market: Market::RealTime, mode: Mode::SupplementalReserve };
        assert_eq!(supr.energy_delta(&b), 0.0);

        let idle = ALL_PRODUCTS[IDLE_INDEX];
        assert_eq!(idle.energy_delta(&b), 0.0);
    }

    #[test]
    fn test_charging_direction_split() {
        let charging: Vec<_> = Mode::ALL.iter().filter(|m| m.is_charging()).collect();
        assert_eq!(charging, [&Mode::Charge, &Mode::RegulationDown]);
        assert!(Mode::SpinningReserve.is_discharging());
        assert!(!Mode::Idle.is_charging() && !Mode::Idle.is_discharging());
    }

    #[test]
    fn test_validate_rejects_unsorted_rows() {
        let ts = |s: &str| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap();
        let row = |s: &str| PriceRow { timestamp: ts(s), prices: [0.0; N_PRODUCTS] };

        let table = PriceTable { rows: vec![row("2024-01-01 00:05:00"), row("2024-01-01 00:00:00")] };
        assert!(table.validate().is_err());

        let table = PriceTable { rows: vec![row("2024-01-01 00:00:00"), row("2024-01-01 00:05:00")] };
        assert!(table.validate().is_ok());

        assert!(PriceTable::default().validate().is_err());
    }
}
