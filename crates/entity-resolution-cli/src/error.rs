use core::fmt;

use error_stack::Context;

#[derive(Debug)]
pub struct CliError;

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("the entity-resolution CLI encountered an error during execution")
    }
}

impl Context for CliError {}
