//! `dualrc`: read and write a dualrc configuration file from the shell.
//!
//! ```text
//! dualrc get port                # 4005
//! dualrc get port,host           # {"port": 4005, "host": null}
//! dualrc set verbose true        # VALUE is JSON, or a plain string
//! dualrc show                    # the whole map
//! dualrc profiles                # one registered profile name per line
//! dualrc use-profile fast        # merge a profile's bundle and save
//! ```
//!
//! The file defaults to `~/.dualrc` and can be changed with `--file` or
//! `DUALRC_FILE`.  Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `warn`).

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use dualrc_core::{ConfigSource, ConfigStore, LoadPolicy, Lookup};

/// Command-line front end for a dualrc configuration file.
#[derive(Debug, Parser)]
#[command(name = "dualrc", about = "Read and write a dualrc configuration file", version)]
struct Cli {
    /// Config file to operate on; a leading `~/` is expanded against HOME.
    #[arg(long, default_value = "~/.dualrc", env = "DUALRC_FILE")]
    file: String,

    /// Fail on unreadable files, malformed documents and failing scripts
    /// instead of treating them as an empty configuration.
    #[arg(long, env = "DUALRC_STRICT")]
    strict: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
enum Command {
    /// Print one value, or a key → value object for a comma-separated list.
    Get { query: String },
    /// Store a value; VALUE is parsed as JSON and falls back to a string.
    Set { key: String, value: String },
    /// Print the whole configuration.
    Show,
    /// List registered profile names.
    Profiles,
    /// Apply a registered profile; unknown names are ignored.
    UseProfile { name: String },
}

/// How a command finished, short of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Done,
    /// A single-key `get` found nothing.
    Missing,
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Done => ExitCode::SUCCESS,
            Outcome::Missing => ExitCode::FAILURE,
        }
    }
}

impl Cli {
    fn load_policy(&self) -> LoadPolicy {
        if self.strict {
            LoadPolicy::Strict
        } else {
            LoadPolicy::UseEmptyMap
        }
    }
}

/// Interprets a command-line value: JSON when it parses, otherwise the raw
/// text as a string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Runs `command` against `source`, writing results to `out`.
async fn execute<S, W>(source: &S, command: Command, out: &mut W) -> anyhow::Result<Outcome>
where
    S: ConfigSource + ?Sized,
    W: Write,
{
    match command {
        Command::Get { query } => {
            let lookup = source.get(&query).await?;
            if lookup == Lookup::One(None) {
                debug!("key {query:?} is not set");
                return Ok(Outcome::Missing);
            }
            writeln!(out, "{:#}", lookup.to_json())?;
        }
        Command::Set { key, value } => {
            source.set_one(&key, parse_value(&value)).await?;
        }
        Command::Show => {
            let config = source.load_config().await?;
            writeln!(out, "{:#}", Value::Object(config))?;
        }
        Command::Profiles => {
            for name in source.profile_names().await? {
                writeln!(out, "{name}")?;
            }
        }
        Command::UseProfile { name } => {
            source.use_profile(&name).await?;
        }
    }
    Ok(Outcome::Done)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let store = ConfigStore::open(&cli.file).with_policy(cli.load_policy());
    debug!("using config file {}", store.path().display());

    let path = store.path();
    let mut stdout = io::stdout().lock();
    let outcome = execute(&store, cli.command, &mut stdout)
        .await
        .with_context(|| format!("config file {}", path.display()))?;
    Ok(outcome.into())
}
