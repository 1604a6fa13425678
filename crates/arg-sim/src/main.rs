use std::error::Error;

use clap::{Parser, Subcommand};
use commands::{
    sample::{self, SampleArgs},
    validate::{self, ValidateArgs},
    version::{self, VersionArgs},
};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "arg-sample", about = "Gibbs sampler for ancestral recombination graphs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sample ARGs for an alignment.
    Sample(SampleArgs),
    /// Check an ARG file and report its structure and score.
    Validate(ValidateArgs),
    /// Print version information.
    Version(VersionArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    match cli.command {
        Command::Sample(args) => sample::run(&args),
        Command::Validate(args) => validate::run(&args),
        Command::Version(args) => version::run(&args),
    }
}
