// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use chrono::{DateTime, Utc};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use driver_settlement_rs::{
    ConfigError, DateRange, DenominationPayload, Dispatch, DispatchId, DriverId,
    SettlementConfig, SettlementEngine, SubmissionPayload,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use thiserror::Error;
use tracing::{debug, error, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Driver Settlement - Reconcile end-of-day cash collections
///
/// Reads dispatch snapshots and collection rows from CSV files and writes the
/// settled collections (or per-driver summaries) to stdout.
#[derive(Parser, Debug)]
#[command(name = "driver-settlement-rs")]
#[command(about = "Settles driver cash collections against dispatches", long_about = None)]
struct Args {
    /// Path to CSV file with collections
    ///
    /// Expected format: dispatch,driver,collected_at,denominations,coins,cheque,
    /// online,credit_given,credit_received_cash,credit_received_cheque,
    /// bounce_received_cash,bounce_received_cheque,returned_full,returned_empty,
    /// expected_cash,notes
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Path to CSV file with dispatches
    ///
    /// Expected format: dispatch,driver,issued_at,expected_value,crates_loaded
    #[arg(long, value_name = "FILE")]
    dispatches: PathBuf,

    /// Write one summary row per driver instead of one row per collection
    #[arg(long)]
    drivers: bool,

    /// JSON file with tolerance and penalty parameters
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Absolute variance tolerance
    #[arg(long)]
    tolerance_amount: Option<Decimal>,

    /// Variance tolerance as a fraction of the expected value
    #[arg(long)]
    tolerance_ratio: Option<Decimal>,

    /// Penalty per missing empty crate
    #[arg(long)]
    penalty_per_crate: Option<Decimal>,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("cannot open '{path}': {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl Args {
    /// Config file (or defaults) with command-line overrides applied.
    fn settlement_config(&self) -> Result<SettlementConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => SettlementConfig::load(path)?,
            None => SettlementConfig::default(),
        };
        if let Some(amount) = self.tolerance_amount {
            config.tolerance_amount = amount;
        }
        if let Some(ratio) = self.tolerance_ratio {
            config.tolerance_ratio = ratio;
        }
        if let Some(penalty) = self.penalty_per_crate {
            config.penalty_per_crate = penalty;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    // Logs go to stderr so stdout stays a clean CSV
    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        error!("{e}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), CliError> {
    let config = args.settlement_config()?;
    let dispatches = open(&args.dispatches)?;
    let collections = open(&args.input)?;

    let engine = process_collections(dispatches, collections, config)?;

    if args.drivers {
        write_drivers(&engine, std::io::stdout())?;
    } else {
        write_collections(&engine, std::io::stdout())?;
    }
    Ok(())
}

fn open(path: &Path) -> Result<BufReader<File>, CliError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| CliError::Open {
            path: path.to_path_buf(),
            source,
        })
}

/// Raw dispatch row.
///
/// Fields: `dispatch, driver, issued_at, expected_value, crates_loaded`
#[derive(Debug, Deserialize)]
struct DispatchRecord {
    dispatch: u32,
    driver: u32,
    issued_at: DateTime<Utc>,
    expected_value: Decimal,
    crates_loaded: u32,
}

impl From<DispatchRecord> for Dispatch {
    fn from(record: DispatchRecord) -> Self {
        Dispatch {
            id: DispatchId(record.dispatch),
            driver_id: DriverId(record.driver),
            issued_at: record.issued_at,
            expected_value: record.expected_value,
            crates_loaded: record.crates_loaded,
        }
    }
}

/// Raw collection row. Empty or unparsable amounts are read as absent.
#[derive(Debug, Deserialize)]
struct CollectionRecord {
    dispatch: u32,
    driver: u32,
    #[serde(deserialize_with = "csv::invalid_option")]
    collected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    denominations: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    coins: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    cheque: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    online: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    credit_given: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    credit_received_cash: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    credit_received_cheque: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    bounce_received_cash: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    bounce_received_cheque: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    returned_full: Option<i64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    returned_empty: Option<i64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    expected_cash: Option<Decimal>,
    #[serde(default)]
    notes: Option<String>,
}

impl CollectionRecord {
    /// Converts the row into a wire payload.
    ///
    /// Returns `None` when the denominations column cannot be parsed.
    fn into_payload(self) -> Option<SubmissionPayload> {
        Some(SubmissionPayload {
            dispatch_id: Some(DispatchId(self.dispatch)),
            driver_id: Some(DriverId(self.driver)),
            collection_date: self.collected_at,
            denominations: parse_denominations(&self.denominations)?,
            coins: self.coins,
            total_cheque_received: self.cheque,
            total_online_received: self.online,
            total_credit_given: self.credit_given,
            credit_received_cash: self.credit_received_cash,
            credit_received_cheque: self.credit_received_cheque,
            bounce_received_cash: self.bounce_received_cash,
            bounce_received_cheque: self.bounce_received_cheque,
            returned_full_crates: self.returned_full,
            returned_empty_crates: self.returned_empty,
            expected_cash: self.expected_cash,
            notes: self.notes.filter(|notes| !notes.is_empty()),
        })
    }
}

/// Parses a denominations column such as `500x3 100x2`.
fn parse_denominations(column: &str) -> Option<Vec<DenominationPayload>> {
    column
        .split_whitespace()
        .map(|item| {
            let (value, count) = item.split_once(['x', 'X'])?;
            Some(DenominationPayload {
                note_value: value.parse().ok()?,
                note_count: count.parse().ok()?,
                total_value: None,
            })
        })
        .collect()
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader)
}

/// Registers dispatches, then submits every collection row in file order.
///
/// Malformed rows and rejected collections are logged and skipped. A
/// collection dated before earlier rows of the same driver is placed at its
/// chronological position and the later cumulative figures are recomputed.
///
/// # Errors
///
/// Returns a CSV error if a reader fails or a header row is missing.
pub fn process_collections<D: Read, R: Read>(
    dispatches: D,
    collections: R,
    config: SettlementConfig,
) -> Result<SettlementEngine, csv::Error> {
    let engine = SettlementEngine::with_config(config);

    for (row, result) in csv_reader(dispatches)
        .deserialize::<DispatchRecord>()
        .enumerate()
    {
        match result {
            Ok(record) => {
                if let Err(e) = engine.register_dispatch(record.into()) {
                    warn!(row = row + 1, "skipping dispatch: {e}");
                }
            }
            Err(e) => warn!(row = row + 1, "skipping malformed dispatch row: {e}"),
        }
    }

    let received_at = Utc::now();
    for (row, result) in csv_reader(collections)
        .deserialize::<CollectionRecord>()
        .enumerate()
    {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(row = row + 1, "skipping malformed collection row: {e}");
                continue;
            }
        };
        let dispatch = record.dispatch;
        let Some(payload) = record.into_payload() else {
            warn!(row = row + 1, dispatch, "skipping collection: unreadable denominations");
            continue;
        };

        match engine.submit_payload(payload, received_at) {
            Ok(accepted) => debug!(row = row + 1, submission = %accepted.id, "accepted"),
            Err(e) => warn!(row = row + 1, dispatch, kind = ?e.kind(), "skipping collection: {e}"),
        }
    }

    Ok(engine)
}

/// Output row for one settled collection.
#[derive(Debug, Serialize)]
struct CollectionRow {
    submission: u32,
    dispatch: u32,
    driver: u32,
    collected_at: DateTime<Utc>,
    expected_cash: Decimal,
    cash: Decimal,
    total_received: Decimal,
    credit_given: Decimal,
    variance: Decimal,
    variance_pct: Option<Decimal>,
    status: String,
    cumulative_variance: Decimal,
    crates_sold: u32,
    missing_empties: u32,
    penalty: Decimal,
    warnings: usize,
}

/// Output row for one driver.
#[derive(Debug, Serialize)]
struct DriverRow {
    driver: u32,
    collections: usize,
    cash_collected: Decimal,
    expected_cash: Decimal,
    total_variance: Decimal,
    cumulative_variance: Decimal,
    total_penalty: Decimal,
}

const DECIMAL_PRECISION: u32 = 2;

/// Currency figure with exactly two decimal places.
fn money(mut value: Decimal) -> Decimal {
    value.rescale(DECIMAL_PRECISION);
    value
}

/// Writes accepted collections in submission order.
///
/// # CSV Format
///
/// ```csv
/// submission,dispatch,driver,collected_at,expected_cash,cash,total_received,credit_given,variance,variance_pct,status,cumulative_variance,crates_sold,missing_empties,penalty,warnings
/// 1,10,7,2025-03-01T18:00:00Z,5000.00,4000.00,4950.00,0.00,-50.00,-1.00,WITHIN_TOLERANCE,-50.00,50,5,250.00,0
/// ```
pub fn write_collections<W: Write>(engine: &SettlementEngine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for record in engine.collections() {
        let result = &record.reconciliation;
        wtr.serialize(CollectionRow {
            submission: record.id.0,
            dispatch: record.submission.dispatch_id.0,
            driver: record.submission.driver_id.0,
            collected_at: record.submission.collected_at,
            expected_cash: money(result.expected_cash),
            cash: money(result.cash_subtotal),
            total_received: money(result.total_received),
            credit_given: money(result.credit_given),
            variance: money(result.raw_variance),
            variance_pct: result.variance_percentage,
            status: result.variance_status.to_string(),
            cumulative_variance: money(record.cumulative_variance_after),
            crates_sold: result.crates.actual_sold,
            missing_empties: result.crates.missing_empties,
            penalty: money(result.crates.penalty_amount),
            warnings: result.warnings.len(),
        })?;
    }

    wtr.flush()?;
    Ok(())
}

/// Writes one summary row per driver, ordered by driver.
pub fn write_drivers<W: Write>(engine: &SettlementEngine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for ledger in engine.drivers() {
        let driver_id = ledger.driver_id();
        let stats = engine.driver_stats(driver_id, DateRange::all());
        wtr.serialize(DriverRow {
            driver: driver_id.0,
            collections: stats.total_collections,
            cash_collected: money(stats.total_cash_collected),
            expected_cash: money(stats.total_expected_cash),
            total_variance: money(stats.total_variance),
            cumulative_variance: money(stats.cumulative_variance),
            total_penalty: money(stats.total_penalty),
        })?;
    }

    wtr.flush()?;
    Ok(())
}
