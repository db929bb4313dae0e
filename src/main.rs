//! bassbox-rpc - issue a single JSON-RPC call against a Bassbox engine.
//!
//! Launches the engine with piped stdio, routes the requested method through
//! the namespace, prints the JSON result on stdout and stops the engine.
//!
//! ```text
//! bassbox-rpc audioGraph.get
//! bassbox-rpc audioPlayer.enqueueFile song.mp3
//! bassbox-rpc --timeout-ms 2000 audioPlayer.setVolume 0.5
//! ```

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::Value;
use tokio::process::Command;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bassbox_rpc::config::Config;
use bassbox_rpc::engine::Bassbox;
use bassbox_rpc::ipc::RpcClient;

#[derive(Debug, Parser)]
#[command(name = "bassbox-rpc", version, about = "Call a method on the Bassbox audio engine")]
struct Cli {
    /// Engine executable (overrides BASSBOX_PATH)
    #[arg(long)]
    engine: Option<PathBuf>,

    /// Per-call deadline in milliseconds (overrides BASSBOX_CALL_TIMEOUT_MS)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    show_config: bool,

    /// Dotted method path, e.g. audioPlayer.setVolume
    method: Option<String>,

    /// Positional parameters; each is parsed as JSON, falling back to a string
    params: Vec<String>,
}

impl Cli {
    fn apply(&self, mut config: Config) -> Config {
        if let Some(engine) = &self.engine {
            config.engine_path = engine.clone();
        }
        if let Some(ms) = self.timeout_ms {
            config.call_timeout_ms = (ms > 0).then_some(ms);
        }
        config
    }
}

/// `0.5` → number, `true` → bool, `song.mp3` → string.
fn parse_param(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the result
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "bassbox_rpc=info".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.apply(Config::from_env());

    if cli.show_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let Some(method) = cli.method.as_deref() else {
        bail!("No method given (try `bassbox-rpc audioGraph.get`)");
    };
    let params: Vec<Value> = cli.params.iter().map(|p| parse_param(p)).collect();

    tracing::info!(
        "Starting engine: {} {}",
        config.engine_path.display(),
        config.engine_args.join(" ")
    );
    let mut child = Command::new(&config.engine_path)
        .args(&config.engine_args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn engine {}", config.engine_path.display()))?;

    let stdin = child
        .stdin
        .take()
        .context("Failed to get stdin handle for engine")?;
    let stdout = child
        .stdout
        .take()
        .context("Failed to get stdout handle for engine")?;

    let (mut client, _pump) = RpcClient::spawn(stdout, stdin);
    client.set_timeout(config.call_timeout());
    let bassbox = Bassbox::with_scopes(client, config.scopes.iter().cloned());

    let result = bassbox.namespace().call_path(method, params).await;

    if let Err(e) = child.kill().await {
        tracing::warn!("Failed to stop engine: {}", e);
    }

    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Call to {} failed: {}", method, e);
            Err(e).with_context(|| format!("Call to {} failed", method))
        }
    }
}
