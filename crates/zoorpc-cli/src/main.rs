//! # zoorpc CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Call a method (outputs raw JSON)
//! zoorpc call -c zoorpc.json users findUser -a '[42]'
//!
//! # Show the providers of one dependency
//! zoorpc providers -c zoorpc.json users
//!
//! # Wait for discovery and summarize every dependency
//! zoorpc wait -c zoorpc.json
//! ```
//!
//! The registry in the configuration file can be overridden with the
//! `ZOORPC_REGISTRY` environment variable.

use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;

#[derive(FromArgs)]
/// zoorpc - call dubbo services discovered through ZooKeeper
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
///
/// - **Call**: Make a single call (unix-friendly JSON output)
/// - **Providers**: Print the discovered providers of a dependency
/// - **Wait**: Block until discovery completes and print a summary
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Call(CallArgs),
    Providers(ProvidersArgs),
    Wait(WaitArgs),
}

/// Arguments for the `call` subcommand.
///
/// # Example
///
/// ```bash
/// zoorpc call -c zoorpc.json users findUser -a '[{"$class": "java.lang.Long", "$": 42}]'
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call a method of a configured dependency
struct CallArgs {
    /// path to the JSON configuration file
    #[argh(option, short = 'c')]
    config: String,

    /// name of the dependency as configured
    #[argh(positional)]
    service: String,

    /// name of the method to call
    ///
    /// Must be one of the methods advertised by the providers.
    #[argh(positional)]
    method: String,

    /// JSON array of positional arguments
    ///
    /// Defaults to `[]`.
    #[argh(option, short = 'a', long = "args", default = "\"[]\".into()")]
    args: String,

    /// milliseconds to wait for discovery before giving up
    #[argh(option, long = "ready-timeout-ms", default = "10000")]
    ready_timeout_ms: u64,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "providers")]
/// print the providers of a configured dependency
struct ProvidersArgs {
    /// path to the JSON configuration file
    #[argh(option, short = 'c')]
    config: String,

    /// name of the dependency as configured
    #[argh(positional)]
    service: String,

    /// milliseconds to wait for discovery before giving up
    #[argh(option, long = "ready-timeout-ms", default = "10000")]
    ready_timeout_ms: u64,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "wait")]
/// wait for discovery of every dependency and print a summary
struct WaitArgs {
    /// path to the JSON configuration file
    #[argh(option, short = 'c')]
    config: String,

    /// milliseconds to wait for discovery before giving up
    #[argh(option, long = "ready-timeout-ms", default = "10000")]
    ready_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // call: keep output clean for unix tool usage (piping to jq, etc.)
    if !matches!(cli.command, Commands::Call(_)) {
        // Set default log level to INFO, but allow RUST_LOG env var to override
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Call(args) => run_call(args).await,
        Commands::Providers(args) => run_providers(args).await,
        Commands::Wait(args) => run_wait(args).await,
    }
}

/// Executes the `call` subcommand.
///
/// No tracing is initialized for this command; the result is the only
/// thing written to stdout.
///
/// # Errors
///
/// Returns an error if:
/// - The configuration cannot be loaded
/// - The args string is not a JSON array
/// - Discovery does not complete in time
/// - The call itself fails
async fn run_call(args: CallArgs) -> Result<()> {
    let config = zoorpc_cli::load_config(&args.config)?;
    let call_args = zoorpc_cli::parse_call_args(&args.args)?;

    let client =
        zoorpc_cli::connect(config, Duration::from_millis(args.ready_timeout_ms)).await?;
    let result = client.invoke(&args.service, &args.method, call_args).await?;

    println!("{}", serde_json::to_string(&result.to_json())?);

    Ok(())
}

async fn run_providers(args: ProvidersArgs) -> Result<()> {
    let config = zoorpc_cli::load_config(&args.config)?;
    let client =
        zoorpc_cli::connect(config, Duration::from_millis(args.ready_timeout_ms)).await?;

    let proxy = client
        .service(&args.service)
        .ok_or_else(|| anyhow::anyhow!("no dependency named '{}' is configured", args.service))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&zoorpc_cli::service_summary(&proxy))?
    );
    Ok(())
}

async fn run_wait(args: WaitArgs) -> Result<()> {
    let config = zoorpc_cli::load_config(&args.config)?;
    let client =
        zoorpc_cli::connect(config, Duration::from_millis(args.ready_timeout_ms)).await?;

    let summary: Vec<serde_json::Value> = client
        .services()
        .map(|(_, proxy)| zoorpc_cli::service_summary(proxy))
        .collect();
    tracing::info!(dependencies = summary.len(), "discovery complete");

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
