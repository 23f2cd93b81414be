use anyhow::Result;
use clap::Parser;

mod cli;
mod console;

fn main() -> Result<()> {
    env_logger::init();
    let args = cli::Cli::parse();
    console::run(args)
}
