//! Workers binary: run one task through the pool from the command line

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use shared::{logging, process_debug, process_info, CountdownEntry, ProcessRole};
use workers::{
    GoogleTranslator, PoolConfig, PoolError, PoolResult, TaskRegistry, TranslateConfig, WorkerRuntime,
};

/// Bot worker pool utilities
#[derive(Parser)]
#[command(name = "workers")]
#[command(about = "Run translate and rate-limit tasks through the in-process worker pool")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Maximum concurrent workers per kind
    #[arg(long, default_value = "4", global = true)]
    max_workers: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Translate a piece of text
    Translate {
        #[arg(long, default_value = "en")]
        from: String,

        #[arg(long)]
        to: String,

        text: String,
    },

    /// Decrement a countdown batch read from a JSON file `{users: [...], limits: [...]}`
    Ratelimit {
        file: PathBuf,

        /// Milliseconds to subtract from every countdown
        #[arg(long)]
        decrement: i64,
    },

    /// Start one worker per kind, ping them and print pool statistics
    Stats,
}

#[derive(serde::Deserialize)]
struct CountdownFile {
    #[serde(default)]
    users: Vec<CountdownEntry>,
    #[serde(default)]
    limits: Vec<CountdownEntry>,
}

#[tokio::main]
async fn main() -> PoolResult<()> {
    let args = Args::parse();

    ProcessRole::init_bot();
    logging::init_tracing(Some(&args.log_level));

    let translate_config = TranslateConfig::default();
    let translator = GoogleTranslator::new(translate_config.timeout)
        .map_err(|e| PoolError::config(e.to_string()))?;
    let registry = TaskRegistry::with_defaults(Arc::new(translator), translate_config);
    let config = PoolConfig::default().with_max_workers_per_kind(args.max_workers);

    logging::log_startup(
        ProcessRole::current(),
        &format!("worker pool (up to {} workers per kind)", config.max_workers_per_kind),
    );

    let runtime = WorkerRuntime::start(registry.clone(), config)?;
    let result = run(&runtime, &registry, args.command).await;

    logging::log_shutdown(ProcessRole::current(), "command finished");
    runtime.shutdown().await;

    match &result {
        Ok(()) => logging::log_success(ProcessRole::current(), "Worker pool drained"),
        Err(e) => logging::log_error(ProcessRole::current(), "Worker command", e),
    }
    result
}

async fn run(runtime: &WorkerRuntime, registry: &TaskRegistry, command: Command) -> PoolResult<()> {
    let client = runtime.client();

    match command {
        Command::Translate { from, to, text } => {
            process_debug!(ProcessRole::current(), "🌐 Translating {} chars {} → {}", text.len(), from, to);
            let translation = client.translate(&text, &from, &to).await?;
            println!("{translation}");
        }
        Command::Ratelimit { file, decrement } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .map_err(|e| PoolError::config(format!("cannot read {}: {}", file.display(), e)))?;
            let batch: CountdownFile = serde_json::from_str(&raw)
                .map_err(|e| PoolError::config(format!("invalid countdown file {}: {}", file.display(), e)))?;

            let outcome = client.process_rate_limits(batch.users, batch.limits, decrement).await?;
            print_json(&outcome)?;
        }
        Command::Stats => {
            for kind in registry.kinds() {
                runtime.pool().create_worker(&kind)?;
            }
            let answered = client.ping_all().await;
            process_info!(ProcessRole::current(), "🩺 {} workers answered ping", answered);
            print_json(&client.stats())?;
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> PoolResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| shared::SharedError::SerializationError { message: e.to_string() })?;
    println!("{rendered}");
    Ok(())
}
