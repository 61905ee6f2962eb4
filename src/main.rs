//! Techem consumption CLI
//!
//! Fetches tenant consumption data and prints it as JSON.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;

use techem_readings::api::PeriodKind;
use techem_readings::client::{DEFAULT_DAY_OFFSET, DEFAULT_KPI_DAYS_BACK};
use techem_readings::readings::{kpi_readings, period_readings, Reading};
use techem_readings::{logging, Config, ProviderClient};

#[derive(Parser, Debug)]
#[command(name = "techem-readings")]
#[command(author, version, about = "Techem tenant consumption client", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Also write logs to this file
    #[arg(long)]
    trace_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the configured credentials can log in
    Login,

    /// Consumption since January 1st, compared with last year
    Yearly {
        /// Days between today and the end of the period
        #[arg(long, default_value_t = DEFAULT_DAY_OFFSET)]
        day_offset: u32,
    },

    /// Consumption over the last seven days, compared with the week before
    Weekly {
        /// Days between today and the end of the period
        #[arg(long, default_value_t = DEFAULT_DAY_OFFSET)]
        day_offset: u32,
    },

    /// Heat KPI breakdown by room and meter
    Kpi {
        /// Length of the window in days, ending yesterday
        #[arg(long, default_value_t = DEFAULT_KPI_DAYS_BACK)]
        days_back: u32,
    },

    /// All dashboard readings
    Readings,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn all_readings(client: &ProviderClient) -> Vec<Reading> {
    let (yearly, weekly, kpi) = tokio::join!(
        client.fetch_period_row(PeriodKind::Yearly, DEFAULT_DAY_OFFSET),
        client.fetch_period_row(PeriodKind::Weekly, DEFAULT_DAY_OFFSET),
        client.fetch_kpi_snapshot(DEFAULT_KPI_DAYS_BACK),
    );

    let object_id = client.object_id();
    let mut readings = Vec::new();
    if let Some(row) = yearly {
        readings.extend(period_readings(object_id, PeriodKind::Yearly, &row));
    }
    if let Some(row) = weekly {
        readings.extend(period_readings(object_id, PeriodKind::Weekly, &row));
    }
    if let Some(snapshot) = kpi {
        readings.extend(kpi_readings(object_id, DEFAULT_KPI_DAYS_BACK, &snapshot));
    }
    readings
}

async fn run(args: Args, client: ProviderClient) -> anyhow::Result<bool> {
    match args.command {
        Command::Login => match client.authenticate().await {
            Ok(_) => {
                print_json(&serde_json::json!({ "authenticated": true }))?;
                Ok(true)
            }
            Err(e) => {
                tracing::error!(error = %e, "Invalid credentials");
                Ok(false)
            }
        },
        Command::Yearly { day_offset } => {
            match client.fetch_period_row(PeriodKind::Yearly, day_offset).await {
                Some(row) => print_json(&row).map(|_| true),
                None => Ok(false),
            }
        }
        Command::Weekly { day_offset } => {
            match client.fetch_period_row(PeriodKind::Weekly, day_offset).await {
                Some(row) => print_json(&row).map(|_| true),
                None => Ok(false),
            }
        }
        Command::Kpi { days_back } => match client.fetch_kpi_snapshot(days_back).await {
            Some(snapshot) => print_json(&snapshot).map(|_| true),
            None => Ok(false),
        },
        Command::Readings => {
            let readings = all_readings(&client).await;
            if readings.is_empty() {
                return Ok(false);
            }
            print_json(&readings).map(|_| true)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args.config)?;
    logging::init(args.debug || config.debug, args.trace_file.as_deref())?;

    tracing::debug!(
        config = %args.config.display(),
        country = %config.country,
        object_id = %config.object_id,
        cache_token = config.cache_token,
        "Techem client starting"
    );

    let client = ProviderClient::from_config(&config)?;

    if run(args, client).await? {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
