use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use std::io::stderr;
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

mod cmd;

use cmd::check::CheckArgs;
use cmd::config::ConfigArgs;
use cmd::demo::DemoArgs;
use cmd::states::StatesArgs;

#[derive(Parser, Debug)]
#[command(author, version, about = "Ironfly bare-metal conductor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output - shows more detailed logs
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Prints the provisioning state machine, or the verbs legal from one state.
    States(StatesArgs),
    /// Evaluates a provisioning request against a node in the given state.
    Check(CheckArgs),
    /// Prints the resolved configuration and anything missing from it.
    Config(ConfigArgs),
    /// Walks an in-memory node through deploy, tear-down and cleaning.
    Demo(DemoArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // Respect RUST_LOG, fall back to info (debug with --verbose) for our crates
    let level = if cli.verbose { "debug" } else { "info" };
    let default_directives = format!(
        "ironfly={level},ironfly_conductor={level},ironfly_network={level},ironfly_dhcp={level},ironfly_task={level},reqwest=warn,hyper=warn",
        level = level
    );
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));
    registry().with(filter).with(fmt::layer().with_writer(stderr)).init();

    match cli.command {
        Commands::States(args) => cmd::states::run(args),
        Commands::Check(args) => {
            if !cmd::check::run(args)? {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Config(args) => cmd::config::run(args),
        Commands::Demo(args) => cmd::demo::run(args).await,
    }
}
