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

use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use point_ledger_rs::{
    InMemoryBalanceStore, InMemoryHistoryStore, LedgerConfig, MAX_POINT, PointError,
    PointService, UserId, UserPoint,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::warn;

type MemoryService = PointService<InMemoryBalanceStore, InMemoryHistoryStore>;

/// Point Ledger - Replay charge/use CSV files
///
/// Reads operations from a CSV file, applies them to an in-memory ledger and
/// writes the resulting balances (or histories) to stdout.
#[derive(Parser, Debug)]
#[command(name = "point-ledger-rs")]
#[command(about = "Replays point charge/use CSVs against an in-memory ledger", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: type,user,amount
    /// Example: cargo run -- operations.csv > balances.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Largest balance a charge may produce
    #[arg(long, default_value_t = MAX_POINT)]
    max_point: u64,

    /// Print the history log instead of balances
    #[arg(long)]
    histories: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args = Args::parse();

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let config = LedgerConfig::with_max_point(args.max_point);
    let service = match process_operations(BufReader::new(file), config).await {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Error processing operations: {}", e);
            process::exit(1);
        }
    };

    let written = if args.histories {
        write_histories(&service, std::io::stdout())
    } else {
        write_balances(&service, std::io::stdout())
    };
    if let Err(e) = written {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `type, user, amount`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    op_type: String,
    user: u64,
    amount: u64,
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Charge { user_id: UserId, amount: u64 },
    Use { user_id: UserId, amount: u64 },
}

impl CsvRecord {
    /// Returns `None` for unknown operation types.
    fn into_operation(self) -> Option<Operation> {
        let user_id = UserId(self.user);
        match self.op_type.to_lowercase().as_str() {
            "charge" => Some(Operation::Charge {
                user_id,
                amount: self.amount,
            }),
            "use" => Some(Operation::Use {
                user_id,
                amount: self.amount,
            }),
            _ => None,
        }
    }
}

async fn apply(service: &MemoryService, operation: Operation) -> Result<UserPoint, PointError> {
    match operation {
        Operation::Charge { user_id, amount } => service.charge(user_id, amount).await,
        Operation::Use { user_id, amount } => service.use_point(user_id, amount).await,
    }
}

/// Applies every operation of a CSV reader to a fresh ledger.
///
/// All operations are submitted together. Each one queues on its user's lock
/// when first polled, and `join_all` polls in input order, so rows for the same
/// user apply in file order while different users interleave. Malformed rows
/// and rejected operations are skipped with a warning.
///
/// # Example
///
/// ```csv
/// type,user,amount
/// charge,1,100
/// use,1,30
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
pub async fn process_operations<R: Read>(
    reader: R,
    config: LedgerConfig,
) -> Result<MemoryService, csv::Error> {
    let service = PointService::with_config(
        Arc::new(InMemoryBalanceStore::new()),
        Arc::new(InMemoryHistoryStore::new()),
        config,
    );

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(reader);

    let mut operations = Vec::new();
    for result in rdr.deserialize::<CsvRecord>() {
        match result {
            Ok(record) => match record.into_operation() {
                Some(operation) => operations.push(operation),
                None => warn!("skipping record with unknown operation type"),
            },
            Err(e) => warn!(error = %e, "skipping malformed row"),
        }
    }

    let outcomes = futures::future::join_all(
        operations
            .iter()
            .map(|operation| apply(&service, *operation)),
    )
    .await;

    for (operation, outcome) in operations.iter().zip(outcomes) {
        if let Err(e) = outcome {
            warn!(?operation, code = e.code(), "skipping rejected operation");
        }
    }

    Ok(service)
}

#[derive(Debug, Serialize)]
struct BalanceRow {
    user: u64,
    point: u64,
}

#[derive(Debug, Serialize)]
struct HistoryRow {
    id: u64,
    user: u64,
    #[serde(rename = "type")]
    op_type: String,
    amount: u64,
}

/// Writes `user,point` rows, ordered by user.
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_balances<W: Write>(service: &MemoryService, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for point in service.balances().snapshot() {
        wtr.serialize(BalanceRow {
            user: point.id.0,
            point: point.point,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes `id,user,type,amount` rows in insertion order.
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_histories<W: Write>(service: &MemoryService, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for entry in service.histories().snapshot() {
        wtr.serialize(HistoryRow {
            id: entry.id.0,
            user: entry.user_id.0,
            op_type: entry.kind.to_string(),
            amount: entry.amount,
        })?;
    }
    wtr.flush()?;
    Ok(())
}
