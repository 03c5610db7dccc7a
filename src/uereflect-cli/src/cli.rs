//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "uereflect")]
#[command(
    about = "Inspect Unreal Engine reflection data in a process or memory dump",
    long_about = None
)]
pub struct Cli {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Discovery configuration (TOML)
    #[arg(long, short = 'c', global = true, env = "UEREFLECT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log discovery steps (repeat for trace output)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where memory is read from
#[derive(Args, Debug, Default)]
pub struct TargetArgs {
    /// Attach to a running process by pid
    #[arg(long, short = 'p', global = true, conflicts_with_all = ["process", "dump"])]
    pub pid: Option<u32>,

    /// Attach to a running process by name
    #[arg(long, global = true, conflicts_with = "dump")]
    pub process: Option<String>,

    /// Read from a memory dump file instead of a live process
    #[arg(long, short = 'd', global = true)]
    pub dump: Option<PathBuf>,

    /// Path to maps file for the dump (defaults to <dump>.maps)
    #[arg(long, global = true, requires = "dump")]
    pub maps: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the module, object table and name table
    Info,

    /// Run the full discovery and print every field offset
    Discover {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List objects, optionally filtered by class name
    Objects {
        /// Class name to filter by (e.g. "Class", "ScriptStruct")
        #[arg(short = 'C', long)]
        class: Option<String>,

        /// Maximum number of objects to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Find an object by name or full name ("Class /Script/Engine.Actor")
    Find {
        name: String,
    },

    /// Look up an FName by comparison index
    Fname {
        index: u32,
    },

    /// Find the comparison index of a name
    FnameSearch {
        query: String,
    },

    /// Print the members of a struct or class
    Members {
        /// Struct, class or function name
        name: String,

        /// Include members of super structs
        #[arg(long)]
        inherited: bool,
    },

    /// Print the enumerators of an enum
    Enum {
        name: String,
    },

    /// Print the effective discovery configuration as TOML
    Config,
}
