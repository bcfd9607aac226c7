use std::path::PathBuf;

use clap::Parser;
use log::info;

use timeshift::clock::{format_instant, parse_reference_time};
use timeshift::convert::shift_csv_with_summary;
use timeshift::error::TimeshiftError;

/// Shift the TIMESTAMP column of a CSV file on disk
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// CSV file to convert
    input: PathBuf,

    /// Reference time to align against, e.g. 2024-01-01T00:00:00Z (UTC when
    /// no designator is given). Defaults to now.
    #[arg(short, long)]
    start_date: Option<String>,

    /// Where to write the result
    #[arg(short, long, default_value = "modified.csv")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), TimeshiftError> {
    env_logger::init();

    let args = Args::parse();
    let reference = match &args.start_date {
        Some(start_date) => parse_reference_time(start_date)?,
        None => chrono::Utc::now(),
    };

    let input = tokio::fs::read(&args.input).await?;
    let (output, summary) = shift_csv_with_summary(&input, reference)?;
    tokio::fs::write(&args.output, output).await?;

    info!(
        "shifted {} rows of {:?} by {}ms against {}, wrote {:?}",
        summary.data_rows,
        args.input,
        summary.offset_millis,
        format_instant(&reference),
        args.output
    );
    Ok(())
}
