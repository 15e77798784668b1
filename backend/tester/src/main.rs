use std::{fs::read_to_string, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use client::{config::ClientConfig, connect, reaction::Reaction};
use server::{
    auth::SessionKeys,
    database::{RedisStore, init_redis},
    notifier::Notifier,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, default_value = "http://localhost:1111")]
    url: String,

    #[arg(long, default_value = "redis://localhost:6379")]
    redis_url: String,

    #[arg(long, default_value = "sync")]
    namespace: String,

    #[arg(long, default_value_t = 1000)]
    event_limit: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the server like an open browser tab and print every reaction.
    Watch {
        #[arg(long)]
        token: Option<String>,

        #[arg(long, default_value_t = 5)]
        interval_secs: u64,
    },

    /// Bump a domain key (and `global`) directly in the store.
    Bump { key: String },

    /// Append an event and bump the given keys, as a committed mutation would.
    Emit {
        event_type: String,

        #[arg(long, default_value = "{}")]
        payload: String,

        #[arg(long = "key")]
        keys: Vec<String>,
    },

    /// Print every version record in the store.
    State,

    /// Mint a session token signed with the server secret.
    Token {
        sub: String,

        #[arg(long, default_value = "/run/secrets/SESSION_SECRET")]
        secret_file: PathBuf,

        #[arg(long)]
        role: Option<String>,

        #[arg(long, default_value_t = 3600)]
        ttl_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();

    match args.command {
        Command::Watch {
            token,
            interval_secs,
        } => {
            let interval = Duration::from_secs(interval_secs);
            let mut config = ClientConfig::new(&args.url).with_intervals(interval, interval);
            config.token = token;

            watch(&config).await
        }
        Command::Bump { key } => {
            let notifier = notifier(&args.redis_url, &args.namespace, args.event_limit).await?;
            notifier.bump_version(&key).await;

            print_state(&notifier).await;
            Ok(())
        }
        Command::Emit {
            event_type,
            payload,
            keys,
        } => {
            let payload = serde_json::from_str(&payload).context("Payload is not JSON")?;
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();

            let notifier = notifier(&args.redis_url, &args.namespace, args.event_limit).await?;
            notifier.record_mutation(&event_type, payload, &keys).await;

            print_state(&notifier).await;
            Ok(())
        }
        Command::State => {
            let notifier = notifier(&args.redis_url, &args.namespace, args.event_limit).await?;

            print_state(&notifier).await;
            Ok(())
        }
        Command::Token {
            sub,
            secret_file,
            role,
            ttl_secs,
        } => {
            let secret = read_to_string(&secret_file)
                .with_context(|| format!("Failed to read {}", secret_file.display()))?;

            let token = SessionKeys::new(secret.trim()).issue(
                &sub,
                role.as_deref(),
                Duration::from_secs(ttl_secs),
            )?;

            println!("{token}");
            Ok(())
        }
    }
}

async fn notifier(redis_url: &str, namespace: &str, event_limit: usize) -> Result<Notifier> {
    let connection = init_redis(redis_url)
        .await
        .with_context(|| format!("Failed to connect to {redis_url}"))?;

    Ok(Notifier::new(
        Arc::new(RedisStore::new(connection, namespace)),
        event_limit,
    ))
}

async fn print_state(notifier: &Notifier) {
    let mut records = notifier.get_version_records().await;
    records.sort_by(|a, b| a.key.cmp(&b.key));

    for record in records {
        println!(
            "{:<12} {}  {}",
            record.key,
            record.version,
            record.last_updated.to_rfc3339()
        );
    }
}

async fn watch(config: &ClientConfig) -> Result<()> {
    let (handle, mut reactions) = connect(config, Utc::now())?;
    info!("Watching {}", config.base_url);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            reaction = reactions.recv() => match reaction {
                Some(Reaction::SessionExpired) => {
                    println!("session expired, stopping");
                    break;
                }
                Some(reaction) => println!("{reaction:?}"),
                None => break,
            },
        }
    }

    handle.shutdown().await;
    Ok(())
}
