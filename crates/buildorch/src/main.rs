use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod logging;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init()?;

    let parsed = cli::Cli::parse();
    let code = parsed.dispatch().await?;
    std::process::exit(code);
}
