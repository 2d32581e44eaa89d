mod cli;
mod commands;

use std::io;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::error;

use tenet_bundle::ManifestOptions;
use tenet_core::config::{load_dotenv, Config};

use crate::cli::{BundleCommand, CliArgs, Command};

fn main() -> Result<ExitCode> {
    load_dotenv();
    let args = CliArgs::parse();
    let config = match args.profile.as_deref() {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };

    // RUST_LOG wins; otherwise -v flags, then the configured filter.
    let fallback = args
        .verbosity_filter()
        .unwrap_or(config.log_filter.as_str())
        .to_string();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();
    config.log_summary();

    match run(args.command) {
        Ok(code) => Ok(code),
        Err(e) => {
            error!(error = %format!("{e:#}"), "command failed");
            Err(e)
        }
    }
}

fn run(command: Command) -> Result<ExitCode> {
    match command {
        Command::Bundle(BundleCommand::Create {
            dir,
            output,
            revision,
            vcs_type,
            vcs_uri,
        }) => {
            let mut options = ManifestOptions::new();
            if let Some(revision) = revision {
                options = options.with_revision(revision);
            }
            if let Some(kind) = vcs_type {
                options = options.with_vcs_type(kind);
            }
            if let Some(uri) = vcs_uri {
                options = options.with_vcs_uri(uri);
            }
            commands::create(&dir, &output, options)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Bundle(BundleCommand::Validate { targets }) => {
            let failed = commands::validate(&targets, &mut io::stdout().lock())?;
            if failed > 0 {
                error!(failed, total = targets.len(), "bundle validation failed");
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Command::Bundle(BundleCommand::Show { target }) => {
            let summary = commands::show(&target)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}
