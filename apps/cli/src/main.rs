//! evmanual CLI: grounded Q&A over EV service manuals.
//!
//! Routes a question to a manual section and document, retrieves passages
//! from the libSQL index and prints an answer that refuses to go beyond them.

mod commands;
mod render;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
