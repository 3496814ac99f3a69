//! Subcommand implementations.

mod chains;
mod config;
mod read;

pub use chains::chains;
pub use config::{ConfigArgs, config};
pub use read::{ReadArgs, read};
