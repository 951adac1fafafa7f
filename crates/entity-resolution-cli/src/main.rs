#![forbid(unsafe_code)]

mod args;
mod batch;
mod error;
mod logging;
mod subcommand;

use error_stack::Result;

use self::{args::Args, error::CliError};

fn main() -> Result<(), CliError> {
    let Args { logging, subcommand } = Args::parse_args();
    logging.init();

    subcommand.execute()
}
