// src/main.rs

mod cli;

use anyhow::Result;
use blackarch_aio::{AioConfig, FlowOutcome, Orchestrator, RunReport, RunStatus};
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use tracing::{error, warn};

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(orchestrator: &Orchestrator, command: &Commands) -> FlowOutcome {
    match command {
        Commands::Install => orchestrator.run_install().await,
        Commands::Update => orchestrator.run_update().await,
        Commands::FixHelpers => orchestrator.run_helper_ensure().await,
        Commands::Mirrors { country } => orchestrator.run_mirror_optimize(country.as_deref()).await,
        Commands::KernelUpgrade => orchestrator.run_kernel_upgrade().await,
        Commands::SystemFixes => orchestrator.run_system_fixes().await,
        Commands::Completions { .. } => FlowOutcome::ok(),
    }
}

async fn run(cli: &Cli, command: &Commands) -> RunReport {
    let name = command.name();

    let config = match AioConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return RunReport::error(name, RunStatus::Error, e.to_string());
        }
    };
    let orchestrator = match Orchestrator::from_system(config) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("{}", e);
            return RunReport::error(name, RunStatus::Error, e.to_string());
        }
    };

    tokio::select! {
        outcome = dispatch(&orchestrator, command) => RunReport::from_outcome(name, outcome),
        _ = tokio::signal::ctrl_c() => {
            warn!("Operation cancelled by user");
            if matches!(command, Commands::Update) {
                orchestrator.mark_complete(RunStatus::Aborted);
            }
            RunReport::error(name, RunStatus::Aborted, "Operation cancelled by user")
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut command = Cli::command();
        clap_complete::generate(*shell, &mut command, "blackarch-aio", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing(cli.verbose);

    let report = match &cli.command {
        Some(command) => {
            let runtime = tokio::runtime::Runtime::new()?;
            // Dropping the runtime waits for blocking workers, so a post
            // checkpoint started by a cancelled scope still completes
            runtime.block_on(run(&cli, command))
        }
        None => {
            Cli::command().print_help()?;
            println!();
            RunReport::new("none", RunStatus::NoCommand, Default::default())
        }
    };

    println!("{}", report.to_json_pretty()?);

    if matches!(report.status, RunStatus::Success | RunStatus::NoCommand) {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
