pub mod commands;

use clap::{Parser, Subcommand};
use imprest_core::config::{AppConfig, LoadOptions, LogFormat};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "imprest",
    about = "Imprest operator CLI",
    long_about = "Operate the Imprest advance backend: migrations, demo data, config \
                  inspection, readiness checks, sessions, and operator decisions.",
    after_help = "Examples:\n  imprest doctor --json\n  imprest seed --reset\n  \
                  imprest token --profile u-ana\n  \
                  imprest approve adv-demo-pending --actor u-maria"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo organisation, teams, and advances")]
    Seed {
        #[arg(long, help = "Remove previously seeded rows before loading")]
        reset: bool,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, DB connectivity, and migration state")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Issue a bearer session token for an existing profile")]
    Token {
        #[arg(long, help = "Profile id the session authenticates as")]
        profile: String,
    },
    #[command(about = "Approve a pending advance as the given approver")]
    Approve {
        advance: String,
        #[arg(long, help = "Profile id of the deciding approver")]
        actor: String,
    },
    #[command(about = "Reject a pending advance as the given approver")]
    Reject {
        advance: String,
        #[arg(long, help = "Profile id of the deciding approver")]
        actor: String,
        #[arg(long, help = "Reason shown to the requester")]
        reason: String,
    },
}

/// Logs go to stderr so stdout carries only the JSON outcome. A config that
/// fails to load falls back to `info`; the command itself reports the error.
fn init_logging() {
    let (level, format) = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => (config.logging.level, config.logging.format),
        Err(_) => ("info".to_string(), LogFormat::Compact),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // Another subscriber may already be installed; keep it.
    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed { reset } => commands::seed::run(reset),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            let (passed, output) = commands::doctor::run(json);
            commands::CommandResult { exit_code: if passed { 0 } else { 1 }, output }
        }
        Command::Token { profile } => commands::token::run(&profile),
        Command::Approve { advance, actor } => commands::decide::approve(&advance, &actor),
        Command::Reject { advance, actor, reason } => {
            commands::decide::reject(&advance, &actor, &reason)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
