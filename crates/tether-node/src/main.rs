//! Tether node binary.

use anyhow::Result;
use clap::Parser;
use tether_node::cli::{Cli, Commands, RemoteCommands};
use tether_node::commands;
use tether_node::config::NodeConfig;
use tether_node::observability::{init_logging, level_for_verbosity, LogFormat};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = NodeConfig::load(cli.config.as_deref())?;

    let level = if cli.verbose > 0 {
        level_for_verbosity(cli.verbose)
    } else {
        config.log_level.as_str()
    };
    let format = if cli.log_json || config.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_logging(level, format);

    let folder = cli.repo.as_path();
    match cli.command {
        Commands::Init { name, addr } => commands::init(folder, &name, &addr),
        Commands::Whoami => commands::whoami(folder),
        Commands::Remote { command } => match command {
            RemoteCommands::Add {
                id,
                name,
                addr,
                display_name,
            } => commands::remote_add(folder, &id, &name, &addr, display_name.as_deref()),
            RemoteCommands::Rm { peer } => commands::remote_rm(folder, &peer),
            RemoteCommands::List => commands::remote_list(folder),
        },
        Commands::Serve => runtime()?.block_on(commands::serve(folder, &config, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
        })),
        Commands::Query { peer, count } => runtime()?
            .block_on(commands::query(folder, &config, &peer, count))
            .map(drop),
    }
}

fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
}
