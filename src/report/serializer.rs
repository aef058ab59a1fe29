use std::{fs::File, io, path::Path};

use chrono::{DateTime, Timelike, Utc};
use csv::{Terminator, Writer, WriterBuilder};
use rust_decimal::Decimal;
use serde::Serialize;

use super::AggregatedRecord;

pub const HEADER: [&str; 2] = ["Datetime", "Volume"];

#[derive(Serialize)]
struct Row<'a> {
    datetime: String,
    volume: &'a Decimal,
}

/// Round-trip ISO 8601 rendering in UTC, with 100ns precision.
pub fn format_datetime(time: DateTime<Utc>) -> String {
    format!(
        "{}.{:07}Z",
        time.format("%Y-%m-%dT%H:%M:%S"),
        time.nanosecond() / 100
    )
}

/// Write `records` as CSV in the order given.
pub fn write_records<W: io::Write>(
    writer: W,
    records: &[AggregatedRecord],
) -> Result<(), csv::Error> {
    let mut csv = writer_for(writer);
    csv.write_record(HEADER)?;
    for record in records {
        csv.serialize(Row {
            datetime: format_datetime(record.utc_hour()),
            volume: &record.volume,
        })?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_file(path: &Path, records: &[AggregatedRecord]) -> Result<(), csv::Error> {
    let file = File::create(path)?;
    write_records(file, records)
}

fn writer_for<W: io::Write>(writer: W) -> Writer<W> {
    WriterBuilder::new()
        .has_headers(false)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(writer)
}
