//! `skirmish` – combat decision service.
//!
//! Startup order matters:
//!
//! 1. Initialise `tracing` (`RUST_LOG`, `SKIRMISH_LOG_FORMAT=json`).
//! 2. Resolve configuration: defaults, `~/.skirmish/config.toml` (or
//!    `--config`), `SKIRMISH_*` env vars, then flags.
//! 3. Select the policy. This may probe the model endpoint with a blocking
//!    HTTP client, so it happens before the Tokio runtime exists.
//! 4. Build the runtime and serve until Ctrl-C.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use skirmish_policy::{PolicyKind, select_policy};
use skirmish_server::DecisionServer;
use skirmish_types::{Decision, Observation, SkirmishError};
use tracing::{error, info};

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "skirmish", version, about = "Combat decision service for game agents")]
struct Cli {
    /// TCP port on 127.0.0.1.
    #[arg(long)]
    port: Option<u16>,

    /// Decision policy: `heuristic` or `model` (alias `vpt`).
    #[arg(long)]
    policy: Option<PolicyKind>,

    /// Config file (defaults to ~/.skirmish/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Let a successfully loaded model answer requests.
    #[arg(long)]
    route_model: bool,

    /// Base URL of the external model server.
    #[arg(long)]
    model_endpoint: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
enum Command {
    /// Run the decision server (default).
    Serve,
    /// Print the JSON Schema of the request and response records.
    Schema,
}

impl Cli {
    /// Apply command-line flags on top of `cfg`.
    fn apply(&self, cfg: &mut Config) {
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if let Some(policy) = self.policy {
            cfg.policy = policy;
        }
        if self.route_model {
            cfg.model.route_decisions = true;
        }
        if let Some(endpoint) = &self.model_endpoint {
            cfg.model.endpoint = endpoint.clone();
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Schema => match print_schema() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = %e, "schema rendering failed");
                ExitCode::FAILURE
            }
        },
        Command::Serve => match serve(&cli) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = %e, "skirmish stopped");
                ExitCode::FAILURE
            }
        },
    }
}

/// Initialise tracing-subscriber using RUST_LOG (defaults to "info").
/// Set SKIRMISH_LOG_FORMAT=json for newline-delimited JSON logs.
fn init_tracing() {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("SKIRMISH_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }
}

fn serve(cli: &Cli) -> Result<(), SkirmishError> {
    let mut cfg = config::resolve(cli.config.as_deref())?;
    cli.apply(&mut cfg);
    info!(?cfg, "configuration resolved");

    let selection = select_policy(cfg.policy, &cfg.model);
    let server = DecisionServer::new(Arc::clone(&selection.policy))
        .with_port(cfg.port)
        .with_read_timeout(cfg.read_timeout());
    info!(
        port = server.port(),
        read_timeout = ?server.read_timeout(),
        policy = selection.active(),
        degraded = selection.degraded(),
        "starting decision server"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| SkirmishError::Io(format!("tokio runtime: {e}")))?;

    let result = runtime.block_on(async {
        tokio::select! {
            res = server.run() => res,
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received; shutting down");
                Ok(())
            }
        }
    });

    // In-flight connections are abandoned; model calls get a short grace.
    runtime.shutdown_timeout(Duration::from_secs(1));
    // The selection outlives the runtime so the policy is dropped off the
    // async workers.
    drop(selection);
    result
}

fn print_schema() -> Result<(), SkirmishError> {
    let schemas = serde_json::json!({
        "request": schemars::schema_for!(Observation),
        "response": schemars::schema_for!(Decision),
    });
    let rendered = serde_json::to_string_pretty(&schemas)
        .map_err(|e| SkirmishError::Decode(e.to_string()))?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_flags_means_serve_with_file_settings() {
        let cli = Cli::parse_from(["skirmish"]);
        assert!(cli.command.is_none());
        let mut cfg = Config::default();
        cli.apply(&mut cfg);
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "skirmish",
            "--port",
            "4000",
            "--policy",
            "vpt",
            "--route-model",
            "--model-endpoint",
            "http://gpu:9000",
        ]);
        let mut cfg = Config::default();
        cli.apply(&mut cfg);
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.policy, PolicyKind::Model);
        assert!(cfg.model.route_decisions);
        assert_eq!(cfg.model.endpoint, "http://gpu:9000");
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert!(Cli::try_parse_from(["skirmish", "--policy", "neural"]).is_err());
    }

    #[test]
    fn schema_subcommand_parses() {
        let cli = Cli::parse_from(["skirmish", "schema"]);
        assert_eq!(cli.command, Some(Command::Schema));
    }

    #[test]
    fn schema_renders() {
        assert!(print_schema().is_ok());
    }
}
