use std::process::ExitCode;

use clap::Parser;
use thumbfe::cli::{self, CliArgs};
use thumbfe::logger;

fn main() -> ExitCode {
    // Initialize session log (overwrites previous session log)
    logger::init();

    let args = CliArgs::parse();
    cli::run(args)
}
