use crate::models::{HorizonData, N_PRODUCTS};
use anyhow::Result;
use chrono::Timelike;
use log::debug;

/// Groups base slots into coarser evaluation intervals and replaces each
/// product's per-slot price with the chunk mean.
///
/// Chunks are keyed by (calendar day, interval index within the day), so a
/// chunk never spans midnight. Chunk ids are dense and assigned in time
/// order; every slot maps to exactly one id.
pub fn aggregate_chunks(data: &HorizonData, chunk_minutes: u32) -> Result<HorizonData> {
    if chunk_minutes < data.slot_minutes {
        anyhow::bail!(
            "chunk length {} min is below the base resolution of {} min",
            chunk_minutes,
            data.slot_minutes
        );
    }
    if chunk_minutes % data.slot_minutes != 0 {
        anyhow::bail!(
            "chunk length {} min is not a multiple of the {} min base resolution",
            chunk_minutes,
            data.slot_minutes
        );
    }

    // Dense ids: slots are time-sorted, so slots of one chunk are contiguous.
    let mut ids = Vec::with_capacity(data.len());
    let mut prev_key = None;
    let mut next_id = 0usize;
    for slot in &data.slots {
        let minutes_into_day = slot.hour * 60 + slot.timestamp.minute();
        let key = (slot.date, minutes_into_day / chunk_minutes);
        if prev_key != Some(key) {
            if prev_key.is_some() {
                next_id += 1;
            }
            prev_key = Some(key);
        }
        ids.push(next_id);
    }
    let n_chunks = next_id + 1;

    // Per-chunk mean price for every product.
    let mut sums = vec![[0.0f64; N_PRODUCTS]; n_chunks];
    let mut counts = vec![0usize; n_chunks];
    for (t, &id) in ids.iter().enumerate() {
        for p in 0..N_PRODUCTS {
            sums[id][p] += data.prices[t][p];
        }
        counts[id] += 1;
    }

    let mut prices = data.prices.clone();
    for (t, &id) in ids.iter().enumerate() {
        for p in 0..N_PRODUCTS {
            prices[t][p] = sums[id][p] / counts[id] as f64;
        }
    }

    debug!(
        "aggregated {} slots into {} chunks of {} min",
        data.len(),
        n_chunks,
        chunk_minutes
    );

    Ok(HorizonData {
        slots: data.slots.clone(),
        prices,
        chunks: Some(ids),
        slot_minutes: data.slot_minutes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PriceRow, PriceTable, Product, Market, Mode};
    use chrono::{Duration, NaiveDate};

    fn horizon(start_day: u32, n: usize, step_minutes: i64, charge_prices: &[f64]) -> HorizonData {
        let charge = Product { market: Market::RealTime, mode: Mode::Charge }.index();
        let start = NaiveDate::from_ymd_opt(2024, 3, start_day)
            .unwrap()
            .and_hms_opt(23, 0, 0)
            .unwrap();
        let rows: Vec<PriceRow> = (0..n)
            .map(|t| {
                let mut prices = [0.0; N_PRODUCTS];
                prices[charge] = charge_prices[t];
                PriceRow {
                    timestamp: start + Duration::minutes(step_minutes * t as i64),
                    prices,
                }
            })
            .collect();
        let table = PriceTable { rows };
        HorizonData::from_rows(&table.rows, step_minutes as u32)
    }

    #[test]
    fn test_chunks_never_span_midnight() {
        // 23:00 through 00:55 next day in 5-min slots, 60-min chunks.
        let data = horizon(1, 24, 5, &vec![1.0; 24]);
        let chunked = aggregate_chunks(&data, 60).unwrap();
        let ids = chunked.chunks.unwrap();
        // First 12 slots are 23:00-23:55 of day 1, next 12 are 00:00-00:55 of day 2.
        assert!(ids[..12].iter().all(|&id| id == 0));
        assert!(ids[12..].iter().all(|&id| id == 1));
    }

    #[test]
    fn test_chunk_mean_prices() {
        let charge = Product { market: Market::RealTime, mode: Mode::Charge }.index();
        let data = horizon(1, 4, 15, &[10.0, 20.0, 30.0, 40.0]);
        let chunked = aggregate_chunks(&data, 60).unwrap();
        // All four 15-min slots fall in hour 23 of the same day.
        assert_eq!(chunked.chunks.as_ref().unwrap(), &vec![0, 0, 0, 0]);
        for t in 0..4 {
            assert!((chunked.prices[t][charge] - 25.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_rejects_bad_chunk_lengths() {
        let data = horizon(1, 4, 15, &[0.0; 4]);
        assert!(aggregate_chunks(&data, 5).is_err());
        assert!(aggregate_chunks(&data, 40).is_err());
        assert!(aggregate_chunks(&data, 30).is_ok());
    }
}
