use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeDelta, Utc};
use csv::{ReaderBuilder, StringRecord};
use timeshift::clock::{format_instant, parse_instant, ReferenceClock};
use timeshift::convert::{convert, ConvertError};

const RECORDING: &str = "LAT,LON,TIMESTAMP,NAME\n\
    38.9,-77.0,2023-05-04T10:15:00.125Z,alpha\n\
    38.8,-77.1,2023-05-04T10:15:01Z,\"bravo, two\"\n\
    38.7,-77.2,2023-05-04T10:16:30.500Z,charlie\n\
    38.6,-77.3,2023-05-04T12:00:00Z,\"delta \"\"quoted\"\"\"\n";

fn read_all(csv: &[u8]) -> Vec<StringRecord> {
    ReaderBuilder::new()
        .has_headers(false)
        .from_reader(csv)
        .records()
        .map(Result::unwrap)
        .collect()
}

fn convert_str(csv: &str, reference: DateTime<Utc>) -> Result<Vec<u8>, ConvertError> {
    convert(BASE64_STANDARD.encode(csv).as_bytes(), reference)
}

fn instant(value: &str) -> DateTime<Utc> {
    parse_instant(value).unwrap()
}

#[test]
fn test_every_timestamp_shifted_by_first_row_offset() {
    let reference = instant("2025-01-01T00:00:00Z");
    let output = convert_str(RECORDING, reference).unwrap();

    let input_rows = read_all(RECORDING.as_bytes());
    let output_rows = read_all(&output);
    assert_eq!(input_rows.len(), output_rows.len());
    assert_eq!(input_rows[0], output_rows[0]);

    let first = instant(&input_rows[1][2]);
    let offset = TimeDelta::milliseconds(first.timestamp_millis() - reference.timestamp_millis());

    for (input, output) in input_rows.iter().zip(&output_rows).skip(1) {
        assert_eq!(input.len(), output.len());
        assert_eq!(instant(&output[2]), instant(&input[2]) + offset);
        for idx in [0, 1, 3] {
            assert_eq!(input[idx], output[idx]);
        }
    }
}

#[test]
fn test_converting_back_restores_first_row() {
    let original_first = instant("2023-05-04T10:15:00.125Z");
    let reference = instant("2025-01-01T00:00:00Z");
    let shifted = convert_str(RECORDING, reference).unwrap();

    // the first shifted row sits at 2F - R; aligning it back onto F needs a
    // reference of 3F - 2R
    let delta = original_first - reference;
    let inverse_reference = original_first + delta + delta;
    let restored = convert(
        BASE64_STANDARD.encode(&shifted).as_bytes(),
        inverse_reference,
    )
    .unwrap();

    let input_rows = read_all(RECORDING.as_bytes());
    let restored_rows = read_all(&restored);
    assert_eq!(input_rows, restored_rows);
}

#[test]
fn test_reference_clock_drives_conversion() {
    let clock = ReferenceClock::default();
    clock.set_from_str("2024-01-01T00:00:00").unwrap();

    let csv = "TIMESTAMP,VALUE\n2024-01-01T00:00:10Z,5\n2024-01-01T00:00:20Z,7\n";
    let output = convert_str(csv, clock.get()).unwrap();
    assert_eq!(
        String::from_utf8(output).unwrap(),
        "TIMESTAMP,VALUE\n2024-01-01T00:00:20Z,5\n2024-01-01T00:00:30Z,7\n"
    );
}

#[test]
fn test_millisecond_precision_round_trips() {
    let reference = instant("2024-01-01T00:00:00Z");
    let first = reference + Duration::milliseconds(1);
    let csv = format!(
        "TIMESTAMP\n{}\n{}\n",
        format_instant(&first),
        format_instant(&(first + Duration::milliseconds(998)))
    );
    let output = String::from_utf8(convert_str(&csv, reference).unwrap()).unwrap();
    assert_eq!(
        output,
        "TIMESTAMP\n2024-01-01T00:00:00.002Z\n2024-01-01T00:00:01Z\n"
    );
}

#[test]
fn test_failures_produce_no_output() {
    let reference = instant("2024-01-01T00:00:00Z");
    assert!(matches!(
        convert(b"@@@@", reference),
        Err(ConvertError::InvalidEncoding(_))
    ));
    assert!(matches!(
        convert_str("NAME,VALUE\na,1\n", reference),
        Err(ConvertError::MissingTimestampColumn)
    ));
    assert!(matches!(
        convert_str("TIMESTAMP,VALUE\n", reference),
        Err(ConvertError::EmptyInput)
    ));
    assert!(matches!(
        convert_str("TIMESTAMP,VALUE\n2024-01-01T00:00:10Z\n", reference),
        Err(ConvertError::MalformedCsv(_))
    ));
}
