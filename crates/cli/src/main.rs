use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;

#[derive(Debug, Parser)]
#[command(name = "bap")]
#[command(about = "Offline BAP/AIP inspection tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Decompose a raw transaction and show how each output parses.
    Inspect(cmd::inspect::InspectArgs),
    /// Check a Bitcoin Signed Message signature against an address.
    SignCheck(cmd::sign_check::SignCheckArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Inspect(args) => cmd::inspect::run(args)?,
        Command::SignCheck(args) => cmd::sign_check::run(args)?,
    }

    Ok(())
}
