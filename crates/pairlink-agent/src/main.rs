//! PairLink agent — entry point.
//!
//! Links the machine this binary runs on to a messaging account as a
//! companion device. `link` opens a session against the link gateway,
//! prints a scannable QR artifact, and waits until the user's primary
//! device approves the link (or the attempt fails or expires). The
//! resulting credentials land in a small JSON file that `status` reads and
//! `unlink` removes.
//!
//! # Usage
//!
//! ```text
//! pairlink-agent [--config FILE] [--gateway-url URL] <COMMAND>
//!
//! Commands:
//!   link    Start a login and wait for the QR scan to complete
//!   status  Show whether this device is linked and to which account
//!   unlink  Remove this device's persisted link credentials
//!
//! Link options:
//!   --force                      Relink even when credentials already exist
//!   --verbose                    Log every gateway frame at debug level
//!   --code-timeout-ms <MS>       Budget for the gateway to issue a code
//!   --completion-timeout-ms <MS> Budget for one completion poll
//!   --out <FILE>                 Write the QR artifact to FILE
//! ```
//!
//! # Environment variable overrides
//!
//! CLI args take precedence when both are present.
//!
//! | Variable               | Overrides           |
//! |------------------------|---------------------|
//! | `PAIRLINK_CONFIG`      | `--config`          |
//! | `PAIRLINK_GATEWAY_URL` | `--gateway-url`     |
//! | `RUST_LOG`             | config `log_level`  |
//!
//! # Output streams
//!
//! The QR artifact is the only thing written to stdout, so
//! `pairlink-agent link > qr.uri` captures exactly the artifact. Progress
//! lines, log output, and the final outcome all go to stderr.
//!
//! # What happens during `link`
//!
//! 1. The TOML config is loaded (platform default path or `--config`).
//! 2. `tracing_subscriber` is initialised; `RUST_LOG` wins over the config
//!    file's `log_level`.
//! 3. The storage, gateway, renderer, and notifier adapters are wired into
//!    a [`LinkDeviceUseCase`].
//! 4. `start` obtains and prints the QR artifact, then `wait_for_completion`
//!    is polled until the attempt settles. Ctrl+C abandons the attempt and
//!    closes its gateway session.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pairlink_agent::infrastructure::storage::config::{self, AgentConfig};
use pairlink_agent::infrastructure::storage::credentials::{self, FileCredentialStore};
use pairlink_agent::infrastructure::{ConsoleNotifier, SvgCodeRenderer, WsGateway};
use pairlink_core::{
    LinkDeviceUseCase, LoginSessionStore, Notifier, StartOptions, WaitOptions,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// PairLink device-linking agent.
///
/// Links this machine to a messaging account by showing a QR code that the
/// account's primary device scans.
#[derive(Debug, Parser)]
#[command(
    name = "pairlink-agent",
    about = "Links this machine to a messaging account via a scannable QR code",
    version
)]
struct Cli {
    /// Path to the agent config file.
    ///
    /// Defaults to the platform config location, e.g.
    /// `~/.config/pairlink/config.toml` on Linux. The credential file is
    /// kept in the same directory as whichever config file is in use.
    #[arg(long, global = true, env = "PAIRLINK_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Link gateway WebSocket URL, overriding the config file.
    #[arg(long, global = true, env = "PAIRLINK_GATEWAY_URL", value_name = "URL")]
    gateway_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a login and wait for the QR scan to complete.
    Link {
        /// Start a new login even when this device is already linked.
        #[arg(long)]
        force: bool,

        /// Log every gateway frame at debug level while the session is open.
        #[arg(long)]
        verbose: bool,

        /// Budget for the gateway to issue a linking code, in milliseconds.
        ///
        /// Values below the 5000 ms floor are raised to it.
        #[arg(long, value_name = "MS")]
        code_timeout_ms: Option<u64>,

        /// Budget for one completion poll, in milliseconds.
        ///
        /// Values below the 1000 ms floor are raised to it. The agent keeps
        /// polling until the attempt settles or expires, so this only
        /// controls how often the "still waiting" line appears.
        #[arg(long, value_name = "MS")]
        completion_timeout_ms: Option<u64>,

        /// Write the QR artifact to FILE instead of printing it to stdout.
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Show whether this device is linked and to which account.
    Status,

    /// Remove this device's persisted link credentials.
    Unlink,
}

/// Options collected from the `link` subcommand.
struct LinkRun {
    force: bool,
    verbose: bool,
    code_timeout_ms: Option<u64>,
    completion_timeout_ms: Option<u64>,
    out: Option<PathBuf>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config::config_file_path()?,
    };
    let mut cfg = config::load_config_from(&config_path)
        .with_context(|| format!("could not load config from {}", config_path.display()))?;
    if let Some(url) = &cli.gateway_url {
        cfg.gateway.url = url.clone();
    }

    // Logs go to stderr so stdout stays reserved for the QR artifact.
    // `RUST_LOG` wins; the config file's log level is the fallback.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.agent.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Link {
            force,
            verbose,
            code_timeout_ms,
            completion_timeout_ms,
            out,
        } => {
            run_link(
                &cfg,
                &config_path,
                LinkRun {
                    force,
                    verbose,
                    code_timeout_ms,
                    completion_timeout_ms,
                    out,
                },
            )
            .await
        }
        Command::Status => run_status(&config_path),
        Command::Unlink => run_unlink(&config_path),
    }
}

// ── Subcommand drivers ────────────────────────────────────────────────────────

/// Wires the adapters into the use case and drives `link` to an outcome.
async fn run_link(cfg: &AgentConfig, config_path: &Path, run: LinkRun) -> anyhow::Result<()> {
    let notifier = Arc::new(ConsoleNotifier::new());
    let store = Arc::new(LoginSessionStore::new(Arc::clone(&notifier) as Arc<dyn Notifier>));
    let credentials = Arc::new(FileCredentialStore::new(
        credentials::sibling_credentials_path(config_path),
    ));
    let gateway = Arc::new(WsGateway::new(
        cfg.gateway.url.clone(),
        cfg.gateway.handshake_timeout(),
        Arc::clone(&credentials),
    ));
    let use_case = LinkDeviceUseCase::new(
        Arc::clone(&store),
        gateway,
        Arc::clone(&credentials) as Arc<dyn pairlink_core::CredentialStore>,
        Arc::new(SvgCodeRenderer),
        Arc::clone(&notifier) as Arc<dyn Notifier>,
    );

    info!("starting device link against {}", cfg.gateway.url);

    tokio::select! {
        result = drive_link(&use_case, &store, &credentials, notifier.as_ref(), cfg, run) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C — abandoning the login attempt");
            store.reset(Some("Login interrupted.")).await;
            Ok(())
        }
    }
}

/// Starts the attempt, emits the artifact, and polls until a terminal
/// outcome.
///
/// Returns `Err` (process exit code 1) when the attempt ends without a
/// link; the error message is the outcome line the flow produced.
async fn drive_link(
    use_case: &LinkDeviceUseCase,
    store: &LoginSessionStore,
    credentials: &FileCredentialStore,
    notifier: &ConsoleNotifier,
    cfg: &AgentConfig,
    run: LinkRun,
) -> anyhow::Result<()> {
    // `start` folds every failure into its message, so record up front
    // whether a missing artifact will mean "already linked" or "failed".
    let already_linked = !run.force && credentials.load()?.is_some();

    let started = use_case
        .start(StartOptions {
            verbose: run.verbose,
            timeout_ms: run.code_timeout_ms.or(Some(cfg.login.code_timeout_ms)),
            force: run.force,
        })
        .await;

    let Some(artifact) = started.artifact else {
        if already_linked {
            notifier.info(&started.message);
            return Ok(());
        }
        anyhow::bail!(started.message);
    };

    match &run.out {
        Some(path) => {
            std::fs::write(path, &artifact)
                .with_context(|| format!("could not write QR artifact to {}", path.display()))?;
            notifier.info(&format!("QR artifact written to {}", path.display()));
        }
        None => println!("{artifact}"),
    }
    notifier.info(&started.message);

    let completion_budget = run
        .completion_timeout_ms
        .or(Some(cfg.login.completion_timeout_ms));
    loop {
        let outcome = use_case
            .wait_for_completion(WaitOptions {
                timeout_ms: completion_budget,
            })
            .await;
        if outcome.connected {
            return Ok(());
        }
        if store.is_active().await {
            // The poll budget lapsed with the attempt still pending.
            notifier.info(&outcome.message);
            continue;
        }
        // Terminal without a link: expired, failed, or logged out.
        anyhow::bail!(outcome.message);
    }
}

/// Reports the linked identity from the credential file.
fn run_status(config_path: &Path) -> anyhow::Result<()> {
    let store = FileCredentialStore::new(credentials::sibling_credentials_path(config_path));
    match store.load()? {
        Some(record) => println!(
            "Linked as {} (device {}).",
            record.display_id, record.device_id
        ),
        None => println!("Not linked."),
    }
    Ok(())
}

/// Removes the credential file, tolerating one that is unreadable.
fn run_unlink(config_path: &Path) -> anyhow::Result<()> {
    let store = FileCredentialStore::new(credentials::sibling_credentials_path(config_path));
    if !store.path().exists() {
        println!("Nothing to unlink.");
        return Ok(());
    }

    // Unlink is also the recovery path for a corrupt file, so a failed
    // parse must not stop the removal.
    let display = store.load().ok().flatten().map(|record| record.display_id);
    store.remove()?;
    match display {
        Some(display) => println!("Unlinked {display}."),
        None => println!("Removed unreadable credential file."),
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
