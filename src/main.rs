use anyhow::Result;
use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use factorlens::core::log::init_logging;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    /// First date of the analysis (YYYY-MM-DD or DD/MM/YYYY)
    #[arg(long, global = true, value_parser = parse_date)]
    start_date: Option<NaiveDate>,

    /// Last date of the analysis (YYYY-MM-DD or DD/MM/YYYY)
    #[arg(long, global = true, value_parser = parse_date)]
    end_date: Option<NaiveDate>,

    /// Directory for the JSON reports
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for factorlens::AppCommand {
    fn from(cmd: Commands) -> factorlens::AppCommand {
        match cmd {
            Commands::Factors => factorlens::AppCommand::Factors,
            Commands::Geography => factorlens::AppCommand::Geography,
            Commands::Analyze => factorlens::AppCommand::Analyze,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Compare factor ETF performance and risk
    Factors,
    /// Compare regional ETFs and track allocation drift
    Geography,
    /// Run both the factor and the geographic analysis
    Analyze,
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%d/%m/%Y"))
        .map_err(|_| format!("invalid date '{value}', expected YYYY-MM-DD or DD/MM/YYYY"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let options = factorlens::RunOptions {
        config_path: cli.config_path,
        start_date: cli.start_date,
        end_date: cli.end_date,
        output_dir: cli.output_dir,
    };

    let result = match cli.command {
        Some(Commands::Setup) => match options.config_path.as_deref() {
            Some(path) => factorlens::cli::setup::setup_at_path(path),
            None => factorlens::cli::setup::setup(),
        },
        Some(cmd) => factorlens::run_command(cmd.into(), &options).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
