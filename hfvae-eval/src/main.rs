mod evaluate;

use anyhow::Result;
use clap::{Parser, Subcommand};
use evaluate::EvaluateArgs;

#[derive(Parser)]
#[command(name = "hfvae-eval")]
#[command(about = "Evaluate a Householder-flow VAE by ELBO and importance-sampled likelihood")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run both estimators on a simulated Bernoulli dataset
    Evaluate(EvaluateArgs),
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Evaluate(args) => {
            evaluate::run(args)?;
        }
    }

    Ok(())
}
