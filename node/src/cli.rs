//! # CLI Interface
//!
//! Defines the command-line argument structure for `docgate-node` using
//! `clap` derive. Subcommands: `run`, `init`, `statements`, and `version`.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use docgate::config::{DEFAULT_CREDENTIAL_TTL_SECS, DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT};
use docgate::mail::DEFAULT_MAIL_API_URL;

use crate::logging::LogFormat;

/// docgate statement access node.
///
/// Serves the statement list, issues one-time codes by email, and unlocks
/// a statement's download location for whoever presents a valid code.
#[derive(Parser, Debug)]
#[command(
    name = "docgate-node",
    about = "One-time-code gated statement access",
    version,
    propagate_version = true
)]
pub struct DocgateCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the docgate node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP API and metrics servers.
    Run(RunArgs),
    /// Create the data directory, optionally seeding demo statements.
    Init(InitArgs),
    /// Inspect or edit the statement catalog.
    #[command(subcommand)]
    Statements(StatementsCommand),
    /// Print version information and exit.
    Version,
}

/// Location of the node's database. Shared by every subcommand that
/// touches storage.
#[derive(Args, Debug, Clone)]
pub struct DataDirArg {
    /// Directory holding the sled database.
    #[arg(long, short = 'd', env = "DOCGATE_DATA_DIR", default_value = "./docgate-data")]
    pub data_dir: PathBuf,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub data: DataDirArg,

    /// Address the HTTP servers bind to.
    #[arg(long, env = "DOCGATE_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Port for the REST API.
    #[arg(long, env = "DOCGATE_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "DOCGATE_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Lifetime of an issued code, in seconds.
    #[arg(long, env = "DOCGATE_CREDENTIAL_TTL_SECS", default_value_t = DEFAULT_CREDENTIAL_TTL_SECS)]
    pub credential_ttl_secs: u64,

    /// Let a valid code be reused until it expires instead of burning it on
    /// first use.
    #[arg(long, env = "DOCGATE_ALLOW_REPLAY")]
    pub allow_replay: bool,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "DOCGATE_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,

    #[command(flatten)]
    pub mail: MailArgs,
}

/// How codes reach requesters. Either the mail API key and sender are set,
/// or `--dev-log-codes` is passed explicitly.
#[derive(Args, Debug, Clone)]
pub struct MailArgs {
    /// Write codes to the log instead of emailing them. Development only:
    /// anyone with log access can read every code.
    #[arg(long, env = "DOCGATE_DEV_LOG_CODES", conflicts_with = "mail_api_key")]
    pub dev_log_codes: bool,

    /// Base URL of the transactional mail API.
    #[arg(long, env = "DOCGATE_MAIL_API_URL", default_value = DEFAULT_MAIL_API_URL)]
    pub mail_api_url: String,

    /// Bearer key for the mail API.
    #[arg(long, env = "DOCGATE_MAIL_API_KEY", hide_env_values = true)]
    pub mail_api_key: Option<String>,

    /// Sender address for code emails.
    #[arg(long, env = "DOCGATE_MAIL_FROM")]
    pub mail_from: Option<String>,

    /// Public base URL of the statement site, linked from code emails.
    #[arg(long, env = "DOCGATE_SITE_URL")]
    pub site_url: Option<String>,

    /// Per-request timeout for the mail API, in seconds.
    #[arg(long, env = "DOCGATE_MAIL_TIMEOUT_SECS", default_value_t = 10)]
    pub mail_timeout_secs: u64,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    #[command(flatten)]
    pub data: DataDirArg,

    /// Seed the catalog with the January and February 2025 demo statements.
    #[arg(long)]
    pub demo: bool,
}

/// Catalog maintenance.
#[derive(Subcommand, Debug)]
pub enum StatementsCommand {
    /// Print every cataloged statement.
    List(DataDirArg),
    /// Add a statement under the next free id.
    Add(AddStatementArgs),
    /// Remove a statement. Codes already issued for it stop working.
    Remove(RemoveStatementArgs),
}

/// Arguments for `statements add`.
#[derive(Parser, Debug)]
pub struct AddStatementArgs {
    #[command(flatten)]
    pub data: DataDirArg,

    /// Human-readable title, e.g. "March 2025 Statement".
    #[arg(long)]
    pub title: String,

    /// Statement date, `YYYY-MM-DD`.
    #[arg(long)]
    pub date: chrono::NaiveDate,

    /// Where the document is served from once unlocked.
    #[arg(long)]
    pub location: String,

    /// Email address batch sends deliver this statement's code to.
    #[arg(long)]
    pub contact: Option<String>,
}

/// Arguments for `statements remove`.
#[derive(Parser, Debug)]
pub struct RemoveStatementArgs {
    #[command(flatten)]
    pub data: DataDirArg,

    /// Id of the statement to remove.
    #[arg(long)]
    pub id: u64,
}
