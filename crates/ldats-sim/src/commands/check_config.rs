use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use ldats_mcmc::tempering::build_ladder;
use ldats_mcmc::ControlConfig;
use serde_json::json;

#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    /// YAML control configuration to validate.
    #[arg(long)]
    pub config: PathBuf,
}

/// Validates a configuration and returns it with defaults filled in and the
/// resolved temperature ladder.
pub fn run(args: &CheckConfigArgs) -> Result<serde_json::Value, Box<dyn Error>> {
    let config = ControlConfig::load(&args.config)?;
    let temperatures = build_ladder(&config.ladder)?;
    Ok(json!({
        "config": config,
        "temperatures": temperatures,
        "retained_draws": config.retained_draws(),
    }))
}
