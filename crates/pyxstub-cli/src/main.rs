//! pyxstub command-line tool
//!
//! Generates `.pyi` stubs next to the `.pyx` modules of a Cython package.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::generate::{self, GenerateOptions};

#[derive(Parser)]
#[command(name = "pyxstub")]
#[command(about = "Generate Python stub files for Cython packages", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate stubs for every module of a package
    Generate {
        /// Package root directory
        package_dir: PathBuf,
        /// Configuration file (defaults to pyxstub.toml in the package root)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Diagnostic output format
        #[arg(long, value_enum, default_value_t = Format::Pretty)]
        format: Format,
        /// When to use colors
        #[arg(long, value_parser = ["auto", "always", "never"])]
        color: Option<String>,
        /// Print stubs instead of writing them
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Pretty,
    Json,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Generate {
            package_dir,
            config,
            format,
            color,
            dry_run,
        } => {
            let succeeded = generate::execute(GenerateOptions {
                package_dir,
                config,
                format,
                color,
                dry_run,
            })?;
            if !succeeded {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
