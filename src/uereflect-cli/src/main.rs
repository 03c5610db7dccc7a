mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "uereflect=info",
        1 => "uereflect=debug",
        _ => "uereflect=trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = commands::load_config(cli.config.as_deref())?;
    let target = &cli.target;
    let schema = |config| commands::discover(commands::open_source(target)?, config);

    match cli.command {
        Commands::Info => commands::handle_info(commands::open_source(target)?, config)?,
        Commands::Discover { json } => commands::handle_discover(&schema(config)?, json)?,
        Commands::Objects { class, limit } => {
            commands::handle_objects(&schema(config)?, class.as_deref(), limit)?
        }
        Commands::Find { name } => commands::handle_find(&schema(config)?, &name)?,
        Commands::Fname { index } => {
            commands::handle_fname(commands::open_source(target)?, config, index)?
        }
        Commands::FnameSearch { query } => {
            commands::handle_fname_search(commands::open_source(target)?, config, &query)?
        }
        Commands::Members { name, inherited } => {
            commands::handle_members(&schema(config)?, &name, inherited)?
        }
        Commands::Enum { name } => commands::handle_enum(&schema(config)?, &name)?,
        Commands::Config => commands::handle_config(&config)?,
    }

    Ok(())
}
