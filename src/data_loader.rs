use crate::models::{PriceRow, PriceTable, ALL_PRODUCTS, N_PRODUCTS};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use log::{debug, info};
use std::path::Path;

pub const TIMESTAMP_COLUMN: &str = "timestamp";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Loads the price table from a CSV file with a `timestamp` column and one
/// column per non-idle product label (`charge`, `da_charge`, ...).
///
/// A missing product column invalidates every horizon, so it fails fast.
/// A blank, unparseable, or non-finite cell is a missing opportunity, not an
/// error, and loads as 0.0.
pub fn load_price_table<P: AsRef<Path>>(path: P) -> Result<PriceTable> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening price table {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let timestamp_idx = headers
        .iter()
        .position(|h| h == TIMESTAMP_COLUMN)
        .with_context(|| format!("price table has no '{}' column", TIMESTAMP_COLUMN))?;

    let mut columns = [None; N_PRODUCTS];
    for (p, product) in ALL_PRODUCTS.iter().enumerate() {
        if !product.has_price() {
            continue;
        }
        let idx = headers
            .iter()
            .position(|h| h == product.label())
            .with_context(|| format!("price table has no '{}' column", product.label()))?;
        columns[p] = Some(idx);
    }

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading row {}", i + 2))?;
        let raw = record.get(timestamp_idx).unwrap_or("").trim();
        let timestamp = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
            .with_context(|| format!("bad timestamp '{}' on row {}", raw, i + 2))?;

        let mut prices = [0.0; N_PRODUCTS];
        for (p, column) in columns.iter().enumerate() {
            let Some(column) = column else { continue };
            let cell = record.get(*column).unwrap_or("").trim();
            if cell.is_empty() {
                continue;
            }
            match cell.parse::<f64>() {
                Ok(value) if value.is_finite() => prices[p] = value,
                _ => {
                    debug!(
                        "unparseable {} price '{}' on row {}; using 0",
                        ALL_PRODUCTS[p].label(),
                        cell,
                        i + 2
                    );
                }
            }
        }

        rows.push(PriceRow { timestamp, prices });
    }

    let table = PriceTable { rows };
    table.validate()?;
    info!(
        "loaded {} price rows from {}",
        table.rows.len(),
        path.display()
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Market, Mode, Product};
    use std::io::Write;

    fn price_header() -> String {
        let mut columns = vec![TIMESTAMP_COLUMN.to_string()];
        columns.extend(
            ALL_PRODUCTS
                .iter()
                .filter(|p| p.has_price())
                .map(|p| p.label().to_string()),
        );
        columns.join(",")
    }

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_loads_rows_and_blank_cells() {
        let csv = format!(
            "{}\n2024-01-01 00:00:00,10.5,,0,0,0,0,0,0,0,0,0,0\n\
             2024-01-01 00:05:00,0,20,0,0,0,0,0,0,0,0,0,0\n",
            price_header()
        );
        let file = write_csv(&csv);
        let table = load_price_table(file.path()).unwrap();
        assert_eq!(table.rows.len(), 2);

        let charge = Product { market: Market::RealTime, mode: Mode::Charge }.index();
        let discharge = Product { market: Market::RealTime, mode: Mode::Discharge }.index();
        assert_eq!(table.rows[0].prices[charge], 10.5);
        // Blank discharge cell loads as zero.
        assert_eq!(table.rows[0].prices[discharge], 0.0);
        assert_eq!(table.rows[1].prices[discharge], 20.0);
    }

    #[test]
    fn test_non_finite_cells_load_as_zero() {
        let csv = format!(
            "{}\n2024-01-01 00:00:00,NaN,inf,0,0,0,0,0,0,0,0,0,0\n",
            price_header()
        );
        let file = write_csv(&csv);
        let table = load_price_table(file.path()).unwrap();
        assert_eq!(table.rows.len(), 1);

        let charge = Product { market: Market::RealTime, mode: Mode::Charge }.index();
        let discharge = Product { market: Market::RealTime, mode: Mode::Discharge }.index();
        assert_eq!(table.rows[0].prices[charge], 0.0);
        assert_eq!(table.rows[0].prices[discharge], 0.0);
    }

    #[test]
    fn test_missing_product_column_fails_fast() {
        let csv = "timestamp,charge\n2024-01-01 00:00:00,10\n";
        let file = write_csv(csv);
        let err = load_price_table(file.path()).unwrap_err();
        assert!(err.to_string().contains("no 'discharge' column"));
    }

    #[test]
    fn test_bad_timestamp_is_fatal() {
        let csv = format!(
            "{}\nnot-a-time,0,0,0,0,0,0,0,0,0,0,0,0\n",
            price_header()
        );
        let file = write_csv(&csv);
        assert!(load_price_table(file.path()).is_err());
    }
}
