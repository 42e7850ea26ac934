//! courier - ship a session recording to object storage and announce it.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use courier_core::domain::ConnectionContext;
use courier_core::{LifecycleEvent, LifecycleHandler, PipelineBuilder, Settings};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "courier", version, about = "Reliable recording and event delivery")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a settings file and print what it resolves to.
    Check {
        #[arg(short, long, env = "COURIER_CONFIG")]
        config: PathBuf,
    },

    /// Run one finished recording through the pipeline, then drain.
    Deliver {
        #[arg(short, long, env = "COURIER_CONFIG")]
        config: PathBuf,

        #[arg(short, long)]
        session: String,

        #[arg(short, long)]
        file: PathBuf,

        /// Connection metadata, repeatable.
        #[arg(short, long = "meta", value_name = "KEY=VALUE", value_parser = parse_meta)]
        meta: Vec<(String, String)>,

        /// Bucket override for this connection.
        #[arg(long)]
        bucket: Option<String>,
    },
}

fn parse_meta(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match Cli::parse().command {
        Command::Check { config } => check(config),
        Command::Deliver {
            config,
            session,
            file,
            meta,
            bucket,
        } => deliver(config, session, file, meta, bucket).await,
    }
}

fn load(path: &Path) -> anyhow::Result<Settings> {
    Settings::load(path).with_context(|| format!("loading {}", path.display()))
}

fn check(config: PathBuf) -> anyhow::Result<()> {
    let settings = load(&config)?;
    let pipeline = PipelineBuilder::new(settings)
        .build()
        .context("invalid settings")?;
    println!("{:#?}", pipeline.settings());
    Ok(())
}

async fn deliver(
    config: PathBuf,
    session: String,
    file: PathBuf,
    meta: Vec<(String, String)>,
    bucket: Option<String>,
) -> anyhow::Result<()> {
    let pipeline = PipelineBuilder::new(load(&config)?)
        .build()
        .context("invalid settings")?;

    let mut context = meta
        .into_iter()
        .fold(ConnectionContext::new(), |ctx, (k, v)| ctx.with_meta(k, v));
    if let Some(bucket) = bucket {
        context = context.with_bucket(bucket);
    }

    info!(session = %session, file = %file.display(), "delivering recording");
    let shipped = pipeline
        .handle(LifecycleEvent::RecordingCompleted {
            session_id: session.clone(),
            context: context.clone(),
            path: file,
        })
        .await;
    let closed = pipeline
        .handle(LifecycleEvent::SessionClosed {
            session_id: session,
            context,
        })
        .await;

    let status = pipeline.shutdown().await;
    println!("{}", serde_json::to_string_pretty(&status)?);

    shipped.context("recording not enqueued")?;
    closed.context("session.ended not enqueued")?;
    if status.uploads.abandoned > 0 || status.notifications.abandoned > 0 {
        bail!("some deliveries were abandoned");
    }
    Ok(())
}
