use std::str::FromStr;
use anyhow::{bail, Context, Result};
use clap::{App, AppSettings, ArgMatches, SubCommand};
use env_logger::Env;
use log::{info, warn};
use ledger::Ledger;
use model::config::Parameters;
use model::transaction::SALE;
use storage::Storage;

mod demo;
mod seed;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = App::new("parcel-ledger")
        .version("1.0")
        .about("Hash linked ownership history of land parcels")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .args_from_usage(
            "--config=[FILE] 'JSON file with the ledger parameters'
            --store=[PATH] 'RocksDB directory of the ledger, in memory if omitted'",
        )
        .subcommand(SubCommand::with_name("seed").about("Register the sample parcels"))
        .subcommand(
            SubCommand::with_name("register")
                .about("Record the first owner of a parcel")
                .args_from_usage(
                    "--parcel=<INT> 'Parcel id'
                    --owner=<INT> 'Owner id'",
                ),
        )
        .subcommand(
            SubCommand::with_name("transfer")
                .about("Move a parcel to a new owner")
                .args_from_usage(
                    "--parcel=<INT> 'Parcel id'
                    --to=<INT> 'New owner id'
                    --type=[LABEL] 'Transaction type'
                    --price=[NUM] 'Price paid'",
                ),
        )
        .subcommand(
            SubCommand::with_name("history")
                .about("Print the transactions of a parcel, newest first")
                .args_from_usage("--parcel=<INT> 'Parcel id'"),
        )
        .subcommand(
            SubCommand::with_name("verify")
                .about("Audit the chain of a parcel")
                .args_from_usage("--parcel=<INT> 'Parcel id'"),
        )
        .subcommand(SubCommand::with_name("demo").about("Run the walkthrough on an in-memory ledger"))
        .get_matches();

    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let parameters = match matches.value_of("config") {
        Some(path) => Parameters::from_file(path).context("Failed to load the parameters")?,
        None => Parameters::default(),
    };
    parameters.log();

    if let ("demo", Some(_)) = matches.subcommand() {
        let outcome = demo::run(parameters).await?;
        info!("Demo finished: {:?}", outcome);
        return Ok(());
    }

    let storage = open_storage(matches.value_of("store"), parameters.channel_capacity)?;
    let ledger = Ledger::new(storage, parameters);

    match matches.subcommand() {
        ("seed", Some(_)) => {
            let registered = seed::seed(&ledger, &seed::SampleParcels::new()).await?;
            info!("Seeded {} parcel(s)", registered);
        }
        ("register", Some(sub_matches)) => {
            let tx = ledger
                .register(parse(sub_matches, "parcel")?, parse(sub_matches, "owner")?)
                .await?;
            println!("{}", tx);
        }
        ("transfer", Some(sub_matches)) => {
            let price = match sub_matches.value_of("price") {
                Some(_) => Some(parse::<f64>(sub_matches, "price")?),
                None => None,
            };
            let tx = ledger
                .transfer(
                    parse(sub_matches, "parcel")?,
                    sub_matches.value_of("type").unwrap_or(SALE),
                    parse(sub_matches, "to")?,
                    price,
                )
                .await?;
            println!("{}", tx);
        }
        ("history", Some(sub_matches)) => {
            let parcel_id = parse(sub_matches, "parcel")?;
            for tx in ledger.history(parcel_id).await? {
                let linked = ledger.verify_link(&tx).await?;
                println!("{} [{}]", tx, if linked { "linked" } else { "BROKEN" });
            }
        }
        ("verify", Some(sub_matches)) => {
            let parcel_id = parse(sub_matches, "parcel")?;
            let report = ledger.audit(parcel_id).await?;
            print!("{}", report);
            let mut chain_intact = true;
            if let Some(head) = ledger.latest(parcel_id).await? {
                let status = ledger.verify_chain(&head).await?;
                println!("Chain from head {}: {:?}", head.short_hash(), status);
                chain_intact = status.is_intact();
            }
            if !report.is_clean() || !chain_intact {
                bail!("Parcel {} failed verification", parcel_id);
            }
        }
        _ => unreachable!(),
    }
    Ok(())
}

fn parse<T>(matches: &ArgMatches<'_>, name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = matches
        .value_of(name)
        .with_context(|| format!("Missing --{}", name))?;
    value
        .parse::<T>()
        .with_context(|| format!("Invalid value '{}' for --{}", value, name))
}

fn open_storage(path: Option<&str>, capacity: usize) -> Result<Storage> {
    match path {
        Some(path) => open_persistent(path, capacity),
        None => {
            warn!("No --store given, the ledger lives in memory and is lost on exit");
            Ok(Storage::in_memory(capacity))
        }
    }
}

#[cfg(feature = "rocksdb")]
fn open_persistent(path: &str, capacity: usize) -> Result<Storage> {
    Storage::open(path, capacity).with_context(|| format!("Failed to open the ledger store at {}", path))
}

#[cfg(not(feature = "rocksdb"))]
fn open_persistent(path: &str, _capacity: usize) -> Result<Storage> {
    bail!("Cannot open {}: built without the `rocksdb` feature", path)
}
