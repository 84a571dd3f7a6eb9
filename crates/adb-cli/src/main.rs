//! adb - ADB container maintainer tool

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use adb_cli::cmd;
use adb_cli::config::Settings;
use adb_cli::{Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen {
            name,
            output_dir,
            force,
        } => cmd::keygen::keygen(&name, &output_dir, force),
        Commands::Blocks { file } => cmd::blocks::blocks(&file),
        Commands::Dump { file } => cmd::dump::dump(&file),
        Commands::Verify { file } => {
            let settings = Settings::load(&cli.keys)?;
            cmd::verify::verify(&file, &settings)
        }
        Commands::Resign { file, output } => {
            let settings = Settings::load(&cli.keys)?;
            cmd::rewrite::resign(&file, output.as_deref(), &settings)
        }
        Commands::Strip { file, output } => cmd::rewrite::strip(&file, output.as_deref()),
    }
}
