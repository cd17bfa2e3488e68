//! Entrypoint for the `cgnn` trainer.
use clap::Parser;
mod cli;
mod commands;
mod logging;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()?;
    Ok(())
}
