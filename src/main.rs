use std::sync::Arc;

use clap::Parser;
use etcd_watcher::EtcdWatcher;
use etcd_watcher::Error;
use etcd_watcher::Listener;
use etcd_watcher::Result;
use etcd_watcher::WatcherConfig;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tracing::error;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "etcd-watcher")]
#[command(version)]
#[command(about = "Watch etcd keys and log every change", long_about = None)]
struct Args {
    /// Extra configuration file layered over `CONFIG_PATH`
    #[arg(short, long)]
    config: Option<String>,

    /// Store endpoints; replaces `client.endpoints` when given
    #[arg(short, long)]
    endpoints: Vec<String>,

    /// Treat every key as a prefix
    #[arg(long, default_value_t = false)]
    prefix: bool,

    /// Write KEY=VALUE before watching; may be repeated
    #[arg(long = "put", value_parser = parse_key_value)]
    puts: Vec<(String, String)>,

    /// Keys (or prefixes) to watch
    #[arg(required = true)]
    keys: Vec<String>,
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))
}

/// Logs every notification it receives.
struct LoggingListener {
    watch: String,
}

impl Listener for LoggingListener {
    fn observed(
        &self,
        key: &[u8],
        value: &[u8],
        version: i64,
    ) {
        info!(watch = %self.watch, key = %String::from_utf8_lossy(key), value = %String::from_utf8_lossy(value), version, "observed");
    }

    fn created(
        &self,
        key: &[u8],
        value: &[u8],
        version: i64,
    ) {
        info!(watch = %self.watch, key = %String::from_utf8_lossy(key), value = %String::from_utf8_lossy(value), version, "created");
    }

    fn modified(
        &self,
        key: &[u8],
        value: &[u8],
        version: i64,
    ) {
        info!(watch = %self.watch, key = %String::from_utf8_lossy(key), value = %String::from_utf8_lossy(value), version, "modified");
    }

    fn deleted(
        &self,
        key: &[u8],
        version: i64,
    ) {
        info!(watch = %self.watch, key = %String::from_utf8_lossy(key), version, "deleted");
    }

    fn exited(
        &self,
        reason: &str,
    ) {
        info!(watch = %self.watch, reason, "exited");
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let settings = load_settings(&args)?;

    let watcher = EtcdWatcher::from_config(&settings).await?;

    for (key, value) in &args.puts {
        watcher.put(key, value).await?;
        info!(key = %key, value = %value, "seeded");
    }

    for key in &args.keys {
        let listener = Arc::new(LoggingListener { watch: key.clone() });
        if !watcher.add_watch(key, args.prefix, listener)? {
            info!(key = %key, "already watching");
        }
    }

    info!(watches = watcher.watch_count(), "Watching. Waiting for CTRL+C signal...");
    if let Err(e) = wait_for_shutdown().await {
        error!("Failed to listen for shutdown: {:?}", e);
    }

    watcher.close();
    info!("Shutdown completed");
    Ok(())
}

fn load_settings(args: &Args) -> Result<WatcherConfig> {
    let mut settings = WatcherConfig::new()?;
    if let Some(path) = &args.config {
        settings = settings.with_override_config(path)?;
    }
    if !args.endpoints.is_empty() {
        settings.client.endpoints = args.endpoints.clone();
    }
    settings.validate()
}

async fn wait_for_shutdown() -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).map_err(|e| Error::Fatal(format!("SIGINT handler: {e}")))?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(|e| Error::Fatal(format!("SIGTERM handler: {e}")))?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }
    Ok(())
}
