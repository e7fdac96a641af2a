use crate::cli::RelayCli;
use clap::Parser;

/// Initialise the CLI and logging for the relay.
pub fn init() -> RelayCli {
    env_logger::init();

    RelayCli::parse()
}
