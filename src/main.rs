//! Spacelift block host - drives block instance passes from the command line

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use spacelift_block::block::BlockDefinition;
use spacelift_block::config::SpaceliftConfig;
use spacelift_block::store::{BlockStore, JsonFileStore, MemoryStore};
use spacelift_block::{drain, reconcile, Context, Instance, SyncOutcome};

/// Spacelift block - provisions and tracks one Spacelift stack per instance
#[derive(Parser, Debug)]
#[command(name = "spacelift-block", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one synchronization pass and print the outcome
    Sync(PassArgs),

    /// Delete the instance's stack and print the outcome
    Drain(PassArgs),

    /// Run passes until the instance stops requesting re-invocation
    ///
    /// Sleeps for the delay each outcome requests between passes.
    Run {
        #[command(flatten)]
        pass: PassArgs,

        /// Give up after this many passes
        #[arg(long, default_value = "240")]
        max_passes: u32,
    },

    /// Print the block input schema
    Schema,
}

/// Account and instance arguments shared by every pass
#[derive(Args, Debug)]
struct PassArgs {
    /// Spacelift API key id
    #[arg(long, env = "SPACELIFT_API_KEY_ID")]
    api_key_id: String,

    /// Spacelift API key secret
    #[arg(long, env = "SPACELIFT_API_KEY_SECRET", hide_env_values = true)]
    api_key_secret: String,

    /// Spacelift account endpoint, e.g. `acme.app.spacelift.io`
    #[arg(long, env = "SPACELIFT_ENDPOINT")]
    endpoint: String,

    /// Space new stacks are created in
    #[arg(long, env = "SPACELIFT_SPACE_ID")]
    space_id: String,

    /// Instance id; scopes the persisted state
    #[arg(long)]
    instance: String,

    /// Instance display name
    #[arg(long, default_value = "Storage Bucket")]
    name: String,

    /// Inputs as a JSON object
    #[arg(long, conflicts_with = "inputs_file")]
    inputs: Option<String>,

    /// Path to a JSON file holding the inputs
    #[arg(long)]
    inputs_file: Option<PathBuf>,

    /// Directory for persisted state (in-memory when omitted)
    #[arg(long, env = "SPACELIFT_BLOCK_STATE_DIR")]
    state_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Outcomes go to stdout; logs stay on stderr
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sync(args) => {
            let (instance, ctx) = prepare(args).await?;
            print_outcome(&reconcile(&instance, &ctx).await)
        }
        Commands::Drain(args) => {
            let (instance, ctx) = prepare(args).await?;
            print_outcome(&drain(&instance, &ctx).await)
        }
        Commands::Run { pass, max_passes } => run_until_settled(pass, max_passes).await,
        Commands::Schema => {
            let schema = BlockDefinition::storage_bucket().json_schema();
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
    }
}

/// Repeat passes, honoring each requested delay
async fn run_until_settled(args: PassArgs, max_passes: u32) -> anyhow::Result<()> {
    let (instance, ctx) = prepare(args).await?;

    for pass in 1..=max_passes {
        let outcome = reconcile(&instance, &ctx).await;
        print_outcome(&outcome)?;

        let Some(delay) = outcome.sync_after else {
            info!(pass, status = %outcome.status, "instance settled");
            return Ok(());
        };
        info!(pass, delay_ms = delay.as_millis() as u64, "waiting for next pass");
        tokio::time::sleep(delay).await;
    }

    anyhow::bail!("instance did not settle within {} passes", max_passes)
}

async fn prepare(args: PassArgs) -> anyhow::Result<(Instance, Context)> {
    let config = SpaceliftConfig::new(
        args.api_key_id,
        args.api_key_secret,
        args.endpoint,
        args.space_id,
    )?;

    let inputs = match (args.inputs, args.inputs_file) {
        (Some(raw), _) => parse_inputs(&raw)?,
        (None, Some(path)) => {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to read inputs file {:?}: {}", path, e))?;
            parse_inputs(&raw)?
        }
        (None, None) => Map::new(),
    };

    let store: Arc<dyn BlockStore> = match args.state_dir {
        Some(dir) => Arc::new(JsonFileStore::new(dir)),
        None => Arc::new(MemoryStore::new()),
    };

    let ctx = Context::builder(config).store(store).build()?;
    Ok((Instance::new(args.instance, args.name).with_inputs(inputs), ctx))
}

fn parse_inputs(raw: &str) -> anyhow::Result<Map<String, Value>> {
    match serde_json::from_str(raw)? {
        Value::Object(inputs) => Ok(inputs),
        other => anyhow::bail!("inputs must be a JSON object, got {}", other),
    }
}

fn print_outcome(outcome: &SyncOutcome) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(outcome)?);
    Ok(())
}
