use crate::models::TraceRow;
use anyhow::{Context, Result};
use log::info;
use std::io::Write;
use std::path::Path;

/// Writes the cumulative operating trace as CSV, one row per processed slot.
pub fn write_csv<W: Write>(writer: W, trace: &[TraceRow]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in trace {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_csv_file<P: AsRef<Path>>(path: P, trace: &[TraceRow]) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating trace file {}", path.display()))?;
    write_csv(file, trace)?;
    info!("wrote {} trace rows to {}", trace.len(), path.display());
    Ok(())
}

/// Writes the trace as pretty-printed JSON.
pub fn write_json<W: Write>(writer: W, trace: &[TraceRow]) -> Result<()> {
    serde_json::to_writer_pretty(writer, trace)?;
    Ok(())
}
