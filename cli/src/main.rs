//! Portal CLI - issue a single request through the portal API client.
//!
//! ```text
//! portal GET /api/v1/cases
//! portal PUT /api/users/{id}/profile '{"phone":"+1 555 0100"}' --user jdoe
//! ```
//!
//! The response body is printed to stdout as pretty JSON. Logs go to stderr
//! (`RUST_LOG`, default `warn`) so stdout stays machine-readable.
//!
//! Exit codes: 0 on success, 1 on request failure, 2 on usage error.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use portal_client::{ApiClient, ApiError};
use portal_config::PortalConfig;
use portal_types::{ApiPath, HttpMethod, RequestDescriptor};

#[derive(Parser, Debug)]
#[command(name = "portal")]
#[command(about = "Send a request to the partner portal backend through its proxy")]
struct Cli {
    /// HTTP method (GET, POST, PUT, PATCH, DELETE)
    method: HttpMethod,
    /// Backend path, e.g. /api/v1/cases
    path: String,
    /// JSON request body
    body: Option<String>,
    /// Config file (defaults to $PORTAL_CONFIG or ~/.portal/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Resolve this user's GUID and substitute it for `{id}` in the path
    #[arg(long)]
    user: Option<String>,
    /// Send once; do not retry server errors
    #[arg(long)]
    no_retry: bool,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn load_config(explicit: Option<&PathBuf>) -> Result<PortalConfig> {
    if let Some(path) = explicit {
        return PortalConfig::load_from(path)
            .with_context(|| format!("loading {}", path.display()));
    }
    Ok(PortalConfig::load()?.unwrap_or_default())
}

fn parse_body(raw: Option<&str>) -> Result<Option<serde_json::Value>> {
    raw.map(|raw| serde_json::from_str(raw).context("request body is not valid JSON"))
        .transpose()
}

/// A fully validated invocation.
struct Invocation {
    client: ApiClient,
    descriptor: RequestDescriptor,
    user: Option<String>,
}

fn prepare(cli: Cli) -> Result<Invocation> {
    let config = load_config(cli.config.as_ref())?;
    let client = ApiClient::from_portal_config(&config)?;

    let mut descriptor = RequestDescriptor::new(cli.method, ApiPath::new(cli.path)?);
    descriptor.body = parse_body(cli.body.as_deref())?;
    if cli.no_retry {
        descriptor = descriptor.without_retry();
    }

    Ok(Invocation {
        client,
        descriptor,
        user: cli.user,
    })
}

async fn send(invocation: Invocation) -> Result<serde_json::Value, ApiError> {
    let Invocation {
        client,
        descriptor,
        user,
    } = invocation;

    match user.as_deref() {
        Some(user) => {
            client
                .request_for_user(&descriptor.path, user, descriptor.method, descriptor.body)
                .await
        }
        None => client.request(&descriptor).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_tracing();

    let invocation = match prepare(cli) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(2);
        }
    };

    match send(invocation).await {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {e}");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            tracing::debug!(error = ?e, "Request failed");
            eprintln!("Error: {e}");
            if e.is_session_expired() {
                eprintln!("Hint: update the [session] table or sign in again.");
            }
            ExitCode::FAILURE
        }
    }
}
