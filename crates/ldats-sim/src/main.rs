use std::error::Error;

use clap::{Parser, Subcommand};
use ldats_sim::commands::{
    check_config::{self, CheckConfigArgs},
    fit::{self, FitArgs},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ldats-sim", about = "Changepoint multinomial regression sampler CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fit one model per changepoint count and select the best.
    Fit(FitArgs),
    /// Validate a control configuration and print it with defaults applied.
    CheckConfig(CheckConfigArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Fit(args) => {
            let report = fit::run(&args)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::CheckConfig(args) => {
            let resolved = check_config::run(&args)?;
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }
    }
    Ok(())
}
