//! tiercache - command-line access to a tiered cache.
//!
//! Values live in the on-disk cache directory and, when `TIERCACHE_REMOTE_URL`
//! is set, are synchronised with a remote document service. Without a remote
//! the CLI works offline against the local tiers only.

use std::io;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Value};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tiercache_core::{
    CacheConfig, CacheOrchestrator, HttpBackend, MemoryBackend, Priority, RemoteBackend,
    SetOptions,
};

// ============================================================================
// Constants
// ============================================================================

const REMOTE_URL_VAR: &str = "TIERCACHE_REMOTE_URL";
const REMOTE_TOKEN_VAR: &str = "TIERCACHE_REMOTE_TOKEN";
const LOG_DIR_VAR: &str = "TIERCACHE_LOG_DIR";

const USAGE: &str = "\
Usage: tiercache <command> [args]

Commands:
  get <key>                       Print the cached value as JSON
  set <key> <json> [options]      Store a value
      --ttl <ms>                  Time to live in milliseconds
      --priority <high|normal|low>
      --skip-remote               Keep the value on this device only
  delete <key>                    Remove a key from every tier
  clear                           Empty every tier
  sync                            Push pending writes to the remote now
  stats                           Print tier statistics
  purge                           Drop expired entries from every tier

Environment:
  TIERCACHE_REMOTE_URL            Base URL of the remote document service
  TIERCACHE_REMOTE_TOKEN          Bearer token for the remote service
  TIERCACHE_LOG_DIR               Also write daily log files here
  RUST_LOG                        Log filter (default: warn)";

/// Initialize the tracing subscriber for logging.
///
/// The returned guard must stay alive for file logs to be flushed.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_VAR) {
        Ok(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "tiercache.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };
    if command == "-h" || command == "--help" || command == "help" {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = CacheConfig::load()?;
    let (backend, has_remote) = remote_backend()?;
    let cache: CacheOrchestrator<Value> = CacheOrchestrator::with_file_store(config, backend)?;
    if !has_remote {
        cache.network().set_online(false);
    }
    info!(command = %command, remote = has_remote, "tiercache starting");

    let output = run(&cache, has_remote, command, &args[1..]).await?;

    // The sync queue lives in memory, so hand queued writes to the remote before exiting
    if has_remote && matches!(command.as_str(), "set" | "delete") {
        let result = cache.force_sync().await;
        debug!(synced = result.synced, failed = result.failed, "Final drain");
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Remote backend from the environment, or an offline in-process stand-in.
fn remote_backend() -> Result<(Arc<dyn RemoteBackend>, bool)> {
    match std::env::var(REMOTE_URL_VAR) {
        Ok(url) if !url.is_empty() => {
            let mut backend = HttpBackend::new(&url)
                .with_context(|| format!("Invalid {} '{}'", REMOTE_URL_VAR, url))?;
            if let Ok(token) = std::env::var(REMOTE_TOKEN_VAR) {
                backend.set_token(token);
            }
            Ok((Arc::new(backend), true))
        }
        _ => Ok((Arc::new(MemoryBackend::new()), false)),
    }
}

async fn run(
    cache: &CacheOrchestrator<Value>,
    has_remote: bool,
    command: &str,
    args: &[String],
) -> Result<Value> {
    match command {
        "get" => {
            let key = required(args, 0, "key")?;
            match cache.get_entry(key).await {
                Some(entry) => Ok(json!({
                    "key": entry.key,
                    "value": entry.data,
                    "origin": entry.origin_tier,
                    "syncStatus": entry.sync_status,
                    "age": entry.age_display(),
                    "remainingTtlMs": entry.remaining_ttl_ms(),
                })),
                None => Ok(Value::Null),
            }
        }
        "set" => {
            let key = required(args, 0, "key")?;
            let raw = required(args, 1, "value")?;
            // Bare words are stored as JSON strings
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()));
            let options = parse_set_options(&args[2..])?;
            let ok = cache.set(key, value, options).await;
            Ok(json!({ "key": cache.canonical_key(key), "stored": ok }))
        }
        "delete" => {
            let key = required(args, 0, "key")?;
            Ok(json!({ "deleted": cache.delete(key).await }))
        }
        "clear" => {
            // Without a remote there is nothing beyond this device to clear
            let cleared = if has_remote {
                cache.clear().await
            } else {
                cache.clear_local()
            };
            Ok(json!({ "cleared": cleared }))
        }
        "sync" => Ok(serde_json::to_value(cache.force_sync().await)?),
        "stats" => Ok(serde_json::to_value(cache.get_detailed_stats().await)?),
        "purge" => Ok(json!({ "purged": cache.purge_expired().await })),
        other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    }
}

fn required<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a String> {
    args.get(index)
        .ok_or_else(|| anyhow!("Missing <{}>\n\n{}", name, USAGE))
}

fn parse_set_options(args: &[String]) -> Result<SetOptions> {
    let mut options = SetOptions::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--ttl" => {
                let raw = iter.next().ok_or_else(|| anyhow!("--ttl needs a value"))?;
                let ttl: u64 = raw
                    .parse()
                    .with_context(|| format!("Invalid --ttl '{}'", raw))?;
                options.ttl_ms = Some(ttl);
            }
            "--priority" => {
                let raw = iter.next().ok_or_else(|| anyhow!("--priority needs a value"))?;
                let priority: Priority = raw.parse()?;
                options = options.with_priority(priority);
            }
            "--skip-remote" => options = options.skip_remote(),
            other => bail!("Unknown option '{}'", other),
        }
    }

    Ok(options)
}
