use anyhow::Result;
use clap::{Parser, Subcommand};
use taxpin::algorithm::rpa;

#[derive(Parser)]
#[command(name = "taxpin")]
#[command(version = "0.1.0")]
#[command(about = "Taxonomic range placement for DNA segments from local alignments", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Place query segments on the taxonomy using candidate alignments
    Predict(rpa::PredictArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Predict(args) => {
            rpa::run(args)?;
        }
    }
    Ok(())
}
