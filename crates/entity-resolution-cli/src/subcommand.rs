mod completions;
mod run;

use error_stack::Result;

pub use self::{
    completions::{completions, CompletionsArgs},
    run::{run, RunArgs},
};
use crate::error::CliError;

/// Subcommand for the program.
#[derive(Debug, clap::Subcommand)]
pub enum Subcommand {
    /// Push a batch of entity/relationship records through the pipeline.
    Run(RunArgs),
    /// Generate a completion script for the given shell and outputs it to stdout.
    Completions(CompletionsArgs),
}

fn block_on(future: impl core::future::Future<Output = Result<(), CliError>>) -> Result<(), CliError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create runtime")
        .block_on(future)
}

impl Subcommand {
    pub fn execute(self) -> Result<(), CliError> {
        match self {
            Self::Run(args) => block_on(run(args)),
            Self::Completions(ref args) => {
                completions(args);
                Ok(())
            }
        }
    }
}
