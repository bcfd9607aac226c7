//! Rewrites the `TIMESTAMP` column of a CSV file so the recording starts
//! relative to a new reference time.
//!
//! The offset is derived once from the first data row and added to every
//! row, so the relative spacing of the whole file is preserved.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, Datelike, TimeDelta, Utc};
use csv::{ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use log::debug;
use thiserror::Error;

use crate::clock::{format_instant, parse_instant};

/// Name of the header field holding the timestamps to shift.
pub const TIMESTAMP_COLUMN: &str = "TIMESTAMP";

// Clients aren't consistent about padding, so accept it either way.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("payload is not valid base64: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),
    #[error("malformed CSV: {0}")]
    MalformedCsv(#[from] csv::Error),
    #[error("provided CSV file has no data rows")]
    EmptyInput,
    #[error("no TIMESTAMP column was found in the header")]
    MissingTimestampColumn,
    #[error("row {row}: invalid timestamp {value:?}")]
    InvalidTimestamp { row: usize, value: String },
    #[error("row {row} has no field at index {index}")]
    IndexOutOfRange { row: usize, index: usize },
}

/// What a successful conversion did, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionSummary {
    pub data_rows: usize,
    pub timestamp_column: usize,
    pub offset_millis: i64,
}

/// Decode a base64 CSV payload, shift its timestamps against `reference`,
/// and return the rewritten CSV.
pub fn convert(payload: &[u8], reference: DateTime<Utc>) -> Result<Vec<u8>, ConvertError> {
    let csv_bytes = decode_payload(payload)?;
    shift_csv(&csv_bytes, reference)
}

pub fn decode_payload(payload: &[u8]) -> Result<Vec<u8>, ConvertError> {
    Ok(PAYLOAD_ENGINE.decode(payload.trim_ascii())?)
}

/// Shift the timestamps of an already decoded CSV file.
pub fn shift_csv(csv_bytes: &[u8], reference: DateTime<Utc>) -> Result<Vec<u8>, ConvertError> {
    shift_csv_with_summary(csv_bytes, reference).map(|(output, _)| output)
}

pub fn shift_csv_with_summary(
    csv_bytes: &[u8],
    reference: DateTime<Utc>,
) -> Result<(Vec<u8>, ConversionSummary), ConvertError> {
    // Rows of a different length than the header make the reader error out,
    // which is what we want: a short row would otherwise be written back
    // with its timestamp silently missing.
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(csv_bytes);
    let header = reader.headers()?.clone();
    let mut records = reader
        .records()
        .collect::<Result<Vec<StringRecord>, csv::Error>>()?;

    if records.is_empty() {
        return Err(ConvertError::EmptyInput);
    }
    let timestamp_column =
        find_timestamp_column(&header).ok_or(ConvertError::MissingTimestampColumn)?;

    let offset_millis = shift_records(&mut records, timestamp_column, reference)?;

    let mut writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::with_capacity(csv_bytes.len()));
    writer.write_record(&header)?;
    for record in &records {
        writer.write_record(record)?;
    }
    let output = writer
        .into_inner()
        .map_err(|err| ConvertError::MalformedCsv(err.into_error().into()))?;

    let summary = ConversionSummary {
        data_rows: records.len(),
        timestamp_column,
        offset_millis,
    };
    debug!("shifted CSV: {summary:?}");
    Ok((output, summary))
}

/// Index of the first header field that is exactly `TIMESTAMP`.
pub fn find_timestamp_column(header: &StringRecord) -> Option<usize> {
    header.iter().position(|field| field == TIMESTAMP_COLUMN)
}

/// Rewrite the timestamp field of every record in place and return the
/// offset that was applied. Nothing is written back unless every row parses.
fn shift_records(
    records: &mut [StringRecord],
    column: usize,
    reference: DateTime<Utc>,
) -> Result<i64, ConvertError> {
    let mut offset_millis = None;
    let mut shifted = Vec::with_capacity(records.len());

    for (idx, record) in records.iter().enumerate() {
        // 1-based data row number, not counting the header
        let row = idx + 1;
        // unreachable while the reader enforces row length
        let raw = record
            .get(column)
            .ok_or(ConvertError::IndexOutOfRange { row, index: column })?;
        let invalid = || ConvertError::InvalidTimestamp {
            row,
            value: raw.to_string(),
        };
        let instant = parse_instant(raw).map_err(|_| invalid())?;

        let offset = *offset_millis
            .get_or_insert_with(|| instant.timestamp_millis() - reference.timestamp_millis());
        let new_instant = instant
            .checked_add_signed(TimeDelta::milliseconds(offset))
            .filter(|shifted| (0..=9999).contains(&shifted.year()))
            .ok_or_else(invalid)?;
        shifted.push(format_instant(&new_instant));
    }

    for (record, timestamp) in records.iter_mut().zip(shifted) {
        *record = replace_field(record, column, &timestamp);
    }
    Ok(offset_millis.unwrap_or_default())
}

fn replace_field(record: &StringRecord, column: usize, value: &str) -> StringRecord {
    record
        .iter()
        .enumerate()
        .map(|(idx, field)| if idx == column { value } else { field })
        .collect()
}
