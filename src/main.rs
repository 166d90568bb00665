use anyhow::{Context, Result};
use clap::Parser;
use log::info;

mod config;
mod datetime;
mod error;
mod fastbill;
mod logger;
mod month;
mod pdf;
mod time_entry;
mod timesheet;
mod timesheet_command;

use config::Config;
use fastbill::FastBillClient;
use timesheet_command::{TimesheetArgs, TimesheetCommand};

/// FastBillのタイムエントリーから月次のPDFタイムシートを作成するCLIアプリケーション。
///
/// # Examples
/// ```
/// $ cargo run -- 42
/// $ cargo run -- 42 2024-03 --layout auto
/// ```
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    #[clap(flatten)]
    timesheet: TimesheetArgs,

    #[clap(short = 'v', long = "verbose", help = "Show debug logs")]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    logger::init(args.verbose)?;

    let config = Config::from_env().context("Failed to load configuration")?;
    let client = FastBillClient::new(&config);

    let command = TimesheetCommand::new(&client, &config.username);
    let path = command.run(args.timesheet).await?;
    info!("Timesheet written to {}", path.display());

    Ok(())
}
