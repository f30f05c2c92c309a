//! CLI subcommands.

pub mod files;
pub mod generate;
