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

use clap::{Parser, ValueEnum};
use csv::{ReaderBuilder, Trim, Writer};
use potion_shop::{
    Barrel, CartId, ColorMl, Customer, Engine, LedgerEntry, Potion, ShopConfig, ShopError, Sku,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Potion Shop - Replay shop operation CSV files
///
/// Runs each operation against a freshly reset shop, checks that the
/// snapshot still reconciles with the ledger, and writes the requested view
/// of the final state to stdout.
#[derive(Parser, Debug)]
#[command(name = "potion-shop")]
#[command(about = "Replays potion shop operations from a CSV file", long_about = None)]
struct Args {
    /// Path to CSV file with shop operations
    ///
    /// Expected format: op,cart,sku,quantity,price,detail
    /// Example: cargo run -- ops.csv > potions.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// TOML file with shop settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Gold granted on reset
    #[arg(long)]
    initial_gold: Option<i64>,

    /// Milliliters per ml capacity unit
    #[arg(long)]
    ml_per_unit: Option<i64>,

    /// Potions per potion capacity unit
    #[arg(long)]
    potions_per_unit: Option<i64>,

    /// What to write to stdout
    #[arg(long, value_enum, default_value_t = Output::Potions)]
    output: Output,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Output {
    Potions,
    Catalog,
    State,
    Ledger,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "potion_shop=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    };

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let engine = match Engine::new(config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error initializing shop: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = replay(&engine, BufReader::new(file)) {
        eprintln!("Error reading operations: {}", e);
        process::exit(1);
    }

    match engine.reconcile() {
        Ok(reconciliation) if reconciliation.is_consistent() => {}
        Ok(reconciliation) => {
            for discrepancy in &reconciliation.discrepancies {
                eprintln!("Reconciliation failed: {}", discrepancy);
            }
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error reconciling: {}", e);
            process::exit(1);
        }
    }

    if let Err(e) = write_output(&engine, args.output, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

fn load_config(args: &Args) -> Result<ShopConfig, potion_shop::ConfigError> {
    let mut config = match &args.config {
        Some(path) => ShopConfig::load(path)?,
        None => ShopConfig::default(),
    };
    if let Some(gold) = args.initial_gold {
        config.initial_gold = gold;
    }
    if let Some(ml) = args.ml_per_unit {
        config.ml_per_unit = ml;
    }
    if let Some(potions) = args.potions_per_unit {
        config.potions_per_unit = potions;
    }
    config.validate()?;
    Ok(config)
}

/// Raw CSV record matching the input format.
///
/// Fields: `op, cart, sku, quantity, price, detail`. Which fields an
/// operation reads depends on `op`; the rest are left empty.
#[derive(Debug, Deserialize)]
struct OpRecord {
    op: String,
    #[serde(default)]
    cart: Option<String>,
    #[serde(default)]
    sku: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    quantity: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    price: Option<i64>,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Error, Debug)]
enum RowError {
    #[error(transparent)]
    Shop(#[from] ShopError),

    #[error("missing {0}")]
    Missing(&'static str),

    #[error("malformed {0}")]
    Malformed(&'static str),

    #[error("unknown cart alias {0}")]
    UnknownCart(String),

    #[error("unknown operation {0}")]
    UnknownOp(String),
}

fn required<T>(field: Option<T>, name: &'static str) -> Result<T, RowError> {
    field.ok_or(RowError::Missing(name))
}

/// Parses `name:class:level`.
fn parse_customer(input: &str) -> Result<Customer, RowError> {
    let mut parts = input.split(':').map(str::trim);
    let (Some(name), Some(class), Some(level), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(RowError::Malformed("customer"));
    };
    Ok(Customer {
        customer_name: name.to_string(),
        character_class: class.to_string(),
        level: level.parse().map_err(|_| RowError::Malformed("customer level"))?,
    })
}

/// Parses `color:ml_per_barrel`, for example `red:500`.
fn parse_barrel_detail(input: &str) -> Result<([i64; 4], i64), RowError> {
    let (color, ml) = input
        .split_once(':')
        .ok_or(RowError::Malformed("barrel detail"))?;
    let potion_type = match color.trim().to_lowercase().as_str() {
        "red" => [1, 0, 0, 0],
        "green" => [0, 1, 0, 0],
        "blue" => [0, 0, 1, 0],
        "dark" => [0, 0, 0, 1],
        _ => return Err(RowError::Malformed("barrel color")),
    };
    let ml = ml
        .trim()
        .parse()
        .map_err(|_| RowError::Malformed("barrel ml"))?;
    Ok((potion_type, ml))
}

/// Replays operations against `engine`, keeping the cart aliases the input
/// uses.
struct Replay<'e> {
    engine: &'e Engine,
    carts: HashMap<String, CartId>,
}

impl<'e> Replay<'e> {
    fn new(engine: &'e Engine) -> Self {
        Self {
            engine,
            carts: HashMap::new(),
        }
    }

    fn cart(&self, record: &OpRecord) -> Result<CartId, RowError> {
        let alias = required(record.cart.as_deref(), "cart")?;
        self.carts
            .get(alias)
            .copied()
            .ok_or_else(|| RowError::UnknownCart(alias.to_string()))
    }

    fn apply(&mut self, record: OpRecord) -> Result<(), RowError> {
        let engine = self.engine;
        match record.op.to_lowercase().as_str() {
            "reset" => {
                engine.reset()?;
                self.carts.clear();
            }
            "time" => {
                let day = required(record.detail.as_deref(), "detail")?;
                let hour = required(record.quantity, "quantity")?;
                let hour = u8::try_from(hour).map_err(|_| RowError::Malformed("hour"))?;
                engine.set_current_time(day, hour)?;
            }
            "visit" => {
                let customers = record
                    .detail
                    .as_deref()
                    .unwrap_or_default()
                    .split(';')
                    .filter(|part| !part.trim().is_empty())
                    .map(parse_customer)
                    .collect::<Result<Vec<_>, _>>()?;
                let external_id = u64::from(record.quantity.unwrap_or_default());
                engine.record_visit(external_id, &customers, engine.current_time()?)?;
            }
            "cart" => {
                let alias = required(record.cart, "cart")?;
                let customer = parse_customer(required(record.detail.as_deref(), "detail")?)?;
                let visit = engine.latest_visit()?;
                let cart_id = engine.create_cart(customer, engine.current_time()?, visit.visit_id)?;
                self.carts.insert(alias, cart_id);
            }
            "item" => {
                let cart_id = self.cart(&record)?;
                let sku = Sku::new(required(record.sku, "sku")?);
                let quantity = required(record.quantity, "quantity")?;
                engine.set_item_quantity(cart_id, &sku, quantity, engine.current_time()?)?;
            }
            "checkout" => {
                let cart_id = self.cart(&record)?;
                let payment = record.detail.as_deref().unwrap_or("gold");
                engine.checkout(cart_id, payment, engine.current_time()?)?;
            }
            "barrel" => {
                let (potion_type, ml_per_barrel) =
                    parse_barrel_detail(required(record.detail.as_deref(), "detail")?)?;
                let barrel = Barrel {
                    sku: required(record.sku, "sku")?,
                    ml_per_barrel,
                    potion_type,
                    price: required(record.price, "price")?,
                    quantity: i64::from(required(record.quantity, "quantity")?),
                };
                engine.deliver_barrels(&[barrel], engine.current_time()?)?;
            }
            "bottle" => {
                let sku = Sku::new(required(record.sku, "sku")?);
                let quantity = required(record.quantity, "quantity")?;
                engine.bottle_potions(&sku, quantity, engine.current_time()?)?;
            }
            "capacity" => {
                let units = required(record.quantity, "quantity")?;
                let (potion_units, ml_units) =
                    match required(record.detail.as_deref(), "detail")?.trim() {
                        "potion" => (units, 0),
                        "ml" => (0, units),
                        _ => return Err(RowError::Malformed("capacity kind")),
                    };
                engine.purchase_capacity(potion_units, ml_units, engine.current_time()?)?;
            }
            "strategy" => {
                let name = required(record.detail.as_deref(), "detail")?;
                engine.activate_strategy(name, engine.current_time()?)?;
            }
            other => return Err(RowError::UnknownOp(other.to_string())),
        }
        Ok(())
    }
}

/// Replays operations from a CSV reader.
///
/// Rows are streamed, so input size is not limited by memory. A row that is
/// malformed or that the shop rejects is logged and skipped; the shop state is
/// unchanged by it.
///
/// # CSV Format
///
/// Expected columns: `op, cart, sku, quantity, price, detail`
/// - `reset`: reset the shop
/// - `time`: `detail` day, `quantity` hour
/// - `visit`: `quantity` external visit id, `detail` `name:class:level;...`
/// - `cart`: `cart` alias, `detail` customer
/// - `item`: `cart`, `sku`, `quantity`
/// - `checkout`: `cart`, optional `detail` payment method
/// - `barrel`: `sku`, `quantity`, `price`, `detail` `color:ml_per_barrel`
/// - `bottle`: `sku`, `quantity`
/// - `capacity`: `quantity` units, `detail` `potion` or `ml`
/// - `strategy`: `detail` name
///
/// # Example
///
/// ```csv
/// op,cart,sku,quantity,price,detail
/// barrel,,SMALL_RED_BARREL,1,60,red:500
/// bottle,,RED_POTION,5,,
/// visit,,,1,,Ada:Wizard:7
/// cart,c1,,,,Ada:Wizard:7
/// item,c1,RED_POTION,2,,
/// checkout,c1,,,,gold
/// ```
///
/// Returns the number of rows applied and skipped.
///
/// # Errors
///
/// Returns a CSV error if the header cannot be read.
pub fn replay<R: Read>(engine: &Engine, reader: R) -> Result<(usize, usize), csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);
    rdr.headers()?;

    let mut replay = Replay::new(engine);
    let (mut applied, mut skipped) = (0, 0);
    for (index, result) in rdr.deserialize::<OpRecord>().enumerate() {
        let row = index + 2;
        let outcome = result
            .map_err(|e| e.to_string())
            .and_then(|record| replay.apply(record).map_err(|e| e.to_string()));
        match outcome {
            Ok(()) => applied += 1,
            Err(error) => {
                tracing::warn!(row, %error, "skipping row");
                skipped += 1;
            }
        }
    }
    tracing::info!(applied, skipped, "replay finished");
    Ok((applied, skipped))
}

#[derive(Debug, Serialize)]
struct PotionRow {
    sku: Sku,
    name: String,
    price: i64,
    quantity: i64,
    red_ml: i64,
    green_ml: i64,
    blue_ml: i64,
    dark_ml: i64,
}

impl From<Potion> for PotionRow {
    fn from(potion: Potion) -> Self {
        let ColorMl {
            red,
            green,
            blue,
            dark,
        } = potion.recipe;
        Self {
            sku: potion.sku,
            name: potion.name,
            price: potion.price,
            quantity: potion.current_quantity,
            red_ml: red,
            green_ml: green,
            blue_ml: blue,
            dark_ml: dark,
        }
    }
}

#[derive(Debug, Serialize)]
struct LedgerRow {
    entry_id: u64,
    time_reference: u32,
    entry_type: &'static str,
    gold_change: i64,
    red_ml: i64,
    green_ml: i64,
    blue_ml: i64,
    dark_ml: i64,
    potion_change: i64,
    potion_capacity_change: i64,
    ml_capacity_change: i64,
}

impl From<LedgerEntry> for LedgerRow {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            entry_id: entry.entry_id.0,
            time_reference: entry.time_reference.0,
            entry_type: entry.entry_type.as_str(),
            gold_change: entry.gold_change,
            red_ml: entry.ml_changes.red,
            green_ml: entry.ml_changes.green,
            blue_ml: entry.ml_changes.blue,
            dark_ml: entry.ml_changes.dark,
            potion_change: entry.potion_change,
            potion_capacity_change: entry.potion_capacity_change,
            ml_capacity_change: entry.ml_capacity_change,
        }
    }
}

#[derive(Error, Debug)]
enum OutputError {
    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Shop(#[from] ShopError),
}

/// Writes the selected view of the shop as CSV.
fn write_output<W: Write>(engine: &Engine, output: Output, writer: W) -> Result<(), OutputError> {
    let mut wtr = Writer::from_writer(writer);

    match output {
        Output::Potions => {
            for potion in engine.potions() {
                wtr.serialize(PotionRow::from(potion))?;
            }
        }
        Output::Catalog => {
            for item in engine.catalog() {
                wtr.serialize(PotionRow::from(engine.potion(&item.sku)?))?;
            }
        }
        Output::State => wtr.serialize(engine.snapshot()?)?,
        Output::Ledger => {
            for entry in engine.ledger()? {
                wtr.serialize(LedgerRow::from(entry))?;
            }
        }
    }

    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use potion_shop::EntryType;
    use std::io::Cursor;

    const HEADER: &str = "op,cart,sku,quantity,price,detail\n";

    fn run(rows: &str) -> (Engine, usize, usize) {
        let engine = Engine::new(ShopConfig::default()).unwrap();
        let input = format!("{HEADER}{rows}");
        let (applied, skipped) = replay(&engine, Cursor::new(input)).unwrap();
        (engine, applied, skipped)
    }

    fn quantity(engine: &Engine, sku: &str) -> i64 {
        engine.potion(&Sku::from(sku)).unwrap().current_quantity
    }

    #[test]
    fn replay_full_sale() {
        let (engine, applied, skipped) = run("barrel,,SMALL_RED_BARREL,1,60,red:500\n\
             bottle,,RED_POTION,5,,\n\
             visit,,,1,,Ada:Wizard:7\n\
             cart,c1,,,,Ada:Wizard:7\n\
             item,c1,RED_POTION,2,,\n\
             checkout,c1,,,,gold\n");
        assert_eq!((applied, skipped), (6, 0));
        assert_eq!(quantity(&engine, "RED_POTION"), 3);

        let state = engine.snapshot().unwrap();
        assert_eq!(state.gold, 100 - 60 + 100);
        assert_eq!(state.red_ml, 0);
        assert_eq!(state.total_potions, 3);
        assert!(engine.reconcile().unwrap().is_consistent());
    }

    #[test]
    fn overflowing_barrel_row_is_skipped() {
        let (engine, applied, skipped) = run("barrel,,SMALL_RED_BARREL,4,4611686018427387904,red:1\n\
             barrel,,SMALL_RED_BARREL,1,60,red:500\n");
        assert_eq!((applied, skipped), (1, 1));

        let state = engine.snapshot().unwrap();
        assert_eq!(state.gold, 40);
        assert_eq!(state.red_ml, 500);
        assert!(engine.reconcile().unwrap().is_consistent());
    }

    #[test]
    fn rejected_rows_are_skipped() {
        let (engine, applied, skipped) = run("visit,,,1,,Ada:Wizard:7\n\
             cart,c1,,,,Ada:Wizard:7\n\
             item,c1,RED_POTION,1,,\n\
             checkout,c1,,,,gold\n\
             item,c2,RED_POTION,1,,\n\
             brew,,,,,\n\
             barrel,,SMALL_RED_BARREL,1,60,pink:500\n");
        assert_eq!((applied, skipped), (3, 4));
        assert_eq!(engine.state().unwrap().gold, 100);
        assert!(engine.cart(CartId(1)).is_ok());
    }

    #[test]
    fn time_and_capacity_rows() {
        let (engine, applied, skipped) = run("time,,,4,,Crownday\n\
             capacity,,,1,,ml\n");
        assert_eq!((applied, skipped), (1, 1));
        assert_ne!(engine.current_time().unwrap().0, 1);
        assert_eq!(engine.snapshot().unwrap().ml_capacity_units, 1);
    }

    #[test]
    fn reset_row_restores_initial_state() {
        let (engine, _, _) = run("barrel,,SMALL_RED_BARREL,1,60,red:500\n\
             reset,,,,,\n");
        assert!(engine.verify_reset_state());
        let ledger = engine.ledger().unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].entry_type, EntryType::AdminChange);
    }

    #[test]
    fn parse_customer_rejects_bad_level() {
        assert!(parse_customer("Ada:Wizard:7").is_ok());
        assert!(matches!(
            parse_customer("Ada:Wizard:seven"),
            Err(RowError::Malformed("customer level"))
        ));
        assert!(matches!(
            parse_customer("Ada:Wizard"),
            Err(RowError::Malformed("customer"))
        ));
    }

    #[test]
    fn write_state_to_csv() {
        let (engine, _, _) = run("");
        let mut output = Vec::new();
        write_output(&engine, Output::State, &mut output).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert!(output.starts_with("gold,red_ml,green_ml,blue_ml,dark_ml,total_ml"));
        assert!(output.contains("100,0,0,0,0,0,0,1,1"));
    }

    #[test]
    fn write_ledger_to_csv() {
        let (engine, _, _) = run("barrel,,SMALL_RED_BARREL,2,60,red:500\n");
        let mut output = Vec::new();
        write_output(&engine, Output::Ledger, &mut output).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("1,1,ADMIN_CHANGE,100,0,0,0,0,0,0,0"));
        assert!(output.contains("2,1,BARREL_PURCHASE,-120,1000,0,0,0,0,0,0"));
    }
}
