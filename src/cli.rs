use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::markers::Side;

#[derive(Debug, Clone, Parser)]
#[command(name = "event-scanner")]
#[command(about = "Find annotated event listeners and bus events in compiled JVM classes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Mod count at which scans run in parallel.
    #[arg(long, value_name = "N", global = true)]
    pub threads_at: Option<usize>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Scan class directories or jars as one mod.
    Scan {
        #[arg(value_name = "ROOT", required = true)]
        roots: Vec<PathBuf>,

        /// Scan only these classes (`a.b.C`) instead of every class.
        #[arg(long = "only", value_name = "CLASS")]
        only: Vec<String>,

        /// Library roots used to resolve classes the mod's roots lack.
        #[arg(long, value_name = "ROOT")]
        classpath: Vec<PathBuf>,

        #[arg(long, value_enum, default_value_t = Side::Client)]
        side: Side,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        #[arg(long = "mod-id", value_name = "ID")]
        mod_ids: Vec<String>,
    },
    /// Scan every mod that opts in with a `common-events.json`.
    Mods {
        #[arg(value_name = "MOD", required = true)]
        mods: Vec<PathBuf>,

        #[arg(long, value_name = "ROOT")]
        classpath: Vec<PathBuf>,

        #[arg(long, value_enum, default_value_t = Side::Client)]
        side: Side,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}
