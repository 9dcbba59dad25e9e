//! Harbor CLI - run integration tests and deployment pipelines from the command line
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::print_stdout,
        reason = "Allow for tests"
    )
)]

use anyhow::Result;
use clap::Parser as _;
use std::io;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _};

use cli::{Cli, Commands};
use handlers::ListFilter;

mod cli;
mod handlers;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // stdout carries JSON results only
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "harbor=info,harbor_runners=info,harbor_pipeline=info,harbor_client=info".into()
        }))
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .init();

    let cli = Cli::parse();
    let config = handlers::load_config(cli.config.as_deref(), cli.poll_interval)?;

    let succeeded = match cli.command {
        Commands::Run { file, progress } => handlers::handle_run(&config, &file, progress).await?,
        Commands::Pipeline { file } => handlers::handle_pipeline(&config, &file).await?,
        Commands::Health => {
            handlers::handle_health(&config)?;
            true
        }
        Commands::CheckConnection => {
            handlers::handle_check_connection(&config).await?;
            true
        }
        Commands::List {
            kind,
            environment,
            component,
            process,
            limit,
        } => {
            let filter = ListFilter {
                environment,
                component,
                process,
                limit,
            };
            handlers::handle_list(&config, kind, &filter).await?;
            true
        }
        Commands::Get { kind, id } => {
            handlers::handle_get(&config, kind, &id).await?;
            true
        }
        Commands::Lookup {
            name,
            any_component,
        } => {
            handlers::handle_lookup(&config, &name, any_component).await?;
            true
        }
        Commands::Undeploy { deployment_id } => {
            handlers::handle_undeploy(&config, &deployment_id).await?;
            true
        }
        Commands::Scripts {
            component,
            version,
            environment,
            tool,
        } => {
            handlers::handle_scripts(&config, component, version, environment, tool)?;
            true
        }
    };

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
