// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # docgate Node
//!
//! Entry point for the `docgate-node` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the database and serves the HTTP
//! API.
//!
//! The binary supports four subcommands:
//!
//! - `run`        — serve the API and metrics endpoints
//! - `init`       — create the data directory, optionally with demo data
//! - `statements` — list, add or remove cataloged statements
//! - `version`    — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use docgate::catalog::demo_statements;
use docgate::{
    GateConfig, GateDB, LogNotifier, Location, MailConfig, MailNotifier, Notifier, OtpIssuer,
    OtpVerifier, ResourceCatalog, SystemClock,
};

use cli::{Commands, DocgateCli, MailArgs, StatementsCommand};
use logging::{LogFormat, DEFAULT_DIRECTIVES};
use metrics::{MeteredNotifier, NodeMetrics};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DocgateCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Statements(cmd) => manage_statements(cmd),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the node: API server and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(DEFAULT_DIRECTIVES, args.log_format);

    let config = GateConfig {
        credential_ttl: Duration::from_secs(args.credential_ttl_secs),
        single_use: !args.allow_replay,
    };
    config.validate().context("invalid gate configuration")?;

    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data.data_dir.display(),
        ttl_secs = args.credential_ttl_secs,
        single_use = config.single_use,
        "starting docgate-node"
    );

    // --- Persistent storage ---
    let db = Arc::new(open_db(&args.data.data_dir)?);
    if db.resource_count() == 0 {
        tracing::warn!("statement catalog is empty; seed it with `init --demo` or `statements add`");
    }

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);

    // --- Access flow ---
    let notifier = Arc::new(MeteredNotifier::new(
        build_notifier(&args.mail)?,
        Arc::clone(&node_metrics),
    ));
    let clock = Arc::new(SystemClock);
    let issuer = OtpIssuer::new(
        db.clone(),
        db.clone(),
        notifier,
        clock.clone(),
        config.clone(),
    )
    .context("invalid gate configuration")?;
    let verifier = OtpVerifier::new(db.clone(), db.clone(), clock, config)
        .context("invalid gate configuration")?;

    // --- Application state ---
    let app_state = api::AppState {
        version: format!("{} (gate {})", env!("CARGO_PKG_VERSION"), docgate::config::GATE_VERSION),
        issuer: Arc::new(issuer),
        verifier: Arc::new(verifier),
        db: Arc::clone(&db),
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("{}:{}", args.bind, args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("{}:{}", args.bind, args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    db.flush().context("failed to flush database on shutdown")?;
    tracing::info!("docgate-node stopped");
    Ok(())
}

/// Picks the code delivery channel: the mail API when a key and sender are
/// configured, the log only when `--dev-log-codes` asks for it.
fn build_notifier(args: &MailArgs) -> Result<Arc<dyn Notifier>> {
    if args.dev_log_codes {
        tracing::warn!("--dev-log-codes is set: codes are written to the log, not emailed");
        return Ok(Arc::new(LogNotifier));
    }

    let (api_key, from) = match (&args.mail_api_key, &args.mail_from) {
        (Some(key), Some(from)) => (key.clone(), from.clone()),
        _ => anyhow::bail!(
            "no code delivery configured: set --mail-api-key and --mail-from, \
             or pass --dev-log-codes for local development"
        ),
    };

    let notifier = MailNotifier::new(MailConfig {
        api_url: args.mail_api_url.clone(),
        api_key,
        from,
        site_url: args.site_url.clone(),
        timeout: Duration::from_secs(args.mail_timeout_secs),
    })
    .context("failed to configure mail delivery")?;
    tracing::info!(api_url = %args.mail_api_url, "codes delivered by email");
    Ok(Arc::new(notifier))
}

/// Creates the data directory and, with `--demo`, seeds the two demo
/// statements. Re-running is harmless: demo rows are written under fixed ids.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("docgate_node=info", LogFormat::Pretty);

    let data_dir = &args.data.data_dir;
    tracing::info!(data_dir = %data_dir.display(), demo = args.demo, "initializing node");

    let db = open_db(data_dir)?;
    if args.demo {
        for statement in demo_statements() {
            db.put_resource(&statement)
                .with_context(|| format!("failed to seed statement {}", statement.id))?;
        }
        tracing::info!(count = db.resource_count(), "demo statements seeded");
    }

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Database       : {}", db_path(data_dir).display());
    println!("  Statements     : {}", db.resource_count());

    Ok(())
}

/// Runs one of the `statements` maintenance commands against the database.
fn manage_statements(cmd: StatementsCommand) -> Result<()> {
    logging::init_logging("docgate_node=warn", LogFormat::Pretty);

    match cmd {
        StatementsCommand::List(data) => {
            let db = open_db(&data.data_dir)?;
            let statements = db.list().context("failed to read statement catalog")?;
            if statements.is_empty() {
                println!("No statements cataloged.");
            }
            for s in statements {
                println!(
                    "{:>4}  {}  {:<28}  {:<24}  {}",
                    s.id,
                    s.date,
                    s.title,
                    s.location,
                    s.contact.as_deref().unwrap_or("-")
                );
            }
        }
        StatementsCommand::Add(args) => {
            let db = open_db(&args.data.data_dir)?;
            let statement = db
                .add_resource(args.title, args.date, Location::new(args.location), args.contact)
                .context("failed to add statement")?;
            println!("Added statement {} ({})", statement.id, statement.title);
        }
        StatementsCommand::Remove(args) => {
            let db = open_db(&args.data.data_dir)?;
            match db
                .remove_resource(args.id)
                .with_context(|| format!("failed to remove statement {}", args.id))?
            {
                Some(statement) => println!("Removed statement {} ({})", statement.id, statement.title),
                None => anyhow::bail!("statement {} not found", args.id),
            }
        }
    }
    Ok(())
}

fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("db")
}

/// Opens (creating if needed) the database under `data_dir`.
fn open_db(data_dir: &Path) -> Result<GateDB> {
    let path = db_path(data_dir);
    std::fs::create_dir_all(&path)
        .with_context(|| format!("failed to create database directory: {}", path.display()))?;
    let db = GateDB::open(&path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;
    tracing::debug!(path = %path.display(), "database opened");
    Ok(db)
}

/// Prints version information to stdout.
fn print_version() {
    println!("docgate-node {}", env!("CARGO_PKG_VERSION"));
    println!("gate         {}", docgate::config::GATE_VERSION);
    println!("rustc        {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_db_creates_missing_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = dir.path().join("nested").join("data");

        let db = open_db(&data_dir).unwrap();
        assert!(db_path(&data_dir).is_dir());
        assert_eq!(db.resource_count(), 0);
    }

    #[test]
    fn statements_persist_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let db = open_db(dir.path()).unwrap();
            for statement in demo_statements() {
                db.put_resource(&statement).unwrap();
            }
            let added = db
                .add_resource(
                    "March 2025 Statement",
                    chrono::NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
                    Location::new("/files/mar2025.pdf"),
                    Some("patient@example.com".to_string()),
                )
                .unwrap();
            assert_eq!(added.id, 3);
        }

        let db = open_db(dir.path()).unwrap();
        let titles: Vec<String> = db.list().unwrap().into_iter().map(|s| s.title).collect();
        assert_eq!(
            titles,
            ["January 2025 Statement", "February 2025 Statement", "March 2025 Statement"]
        );
        assert_eq!(
            db.get_resource(3).unwrap().and_then(|s| s.contact).as_deref(),
            Some("patient@example.com")
        );
        assert_eq!(db.resource_count(), 3);
    }

    fn mail_args() -> MailArgs {
        MailArgs {
            dev_log_codes: false,
            mail_api_url: docgate::mail::DEFAULT_MAIL_API_URL.to_string(),
            mail_api_key: None,
            mail_from: None,
            site_url: None,
            mail_timeout_secs: 10,
        }
    }

    #[test]
    fn notifier_requires_explicit_choice() {
        let err = build_notifier(&mail_args()).err().expect("no delivery configured");
        assert!(err.to_string().contains("--dev-log-codes"));

        let partial = MailArgs {
            mail_api_key: Some("re_live_key".into()),
            ..mail_args()
        };
        assert!(build_notifier(&partial).is_err());
    }

    #[test]
    fn notifier_builds_for_mail_and_dev_log() {
        let mail = MailArgs {
            mail_api_key: Some("re_live_key".into()),
            mail_from: Some("statements@example.com".into()),
            ..mail_args()
        };
        assert!(build_notifier(&mail).is_ok());

        let dev = MailArgs {
            dev_log_codes: true,
            ..mail_args()
        };
        assert!(build_notifier(&dev).is_ok());
    }

    #[test]
    fn invalid_mail_key_is_reported() {
        let bad = MailArgs {
            mail_api_key: Some("re_\nkey".into()),
            mail_from: Some("statements@example.com".into()),
            ..mail_args()
        };
        let err = build_notifier(&bad).err().expect("bad key refused");
        assert!(format!("{err:#}").contains("invalid API key characters"));
    }
}
