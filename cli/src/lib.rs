mod commands;
mod logging;

pub use commands::{Cli, CliError};
