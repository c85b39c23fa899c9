use clap::Args;
use color_eyre::eyre::{Result, WrapErr};
use ironfly_conductor::Config;
use std::path::PathBuf;
use tracing::warn;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// YAML config file; defaults apply when neither this nor IRONFLY_CONFIG is set
    #[arg(long, env = "IRONFLY_CONFIG")]
    pub config: Option<PathBuf>,
}

pub fn run(args: ConfigArgs) -> Result<()> {
    let config = Config::resolve(args.config.as_deref()).wrap_err("Failed to load configuration")?;
    let warnings = config.validate()?;
    for warning in &warnings {
        warn!("{}", warning);
    }
    print!("{}", config.to_yaml()?);
    Ok(())
}
