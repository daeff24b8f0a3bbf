use clap::Parser;
use evidence_cli::{
    cli::{self, commands::Commands, handlers},
    error::Result,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Configuration file (YAML or JSON)
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    evidence_cli::init_logging()?;

    let cli = Cli::parse();

    let result = handlers::load_config(cli.config.as_deref())
        .and_then(|config| handlers::handle_command(cli.command, &config));

    if let Err(ref e) = result {
        eprintln!("{}", cli::format_error(e));
    }

    result
}
