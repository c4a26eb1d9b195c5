//! stagelined - the Stageline daemon and operator CLI.
//!
//! Assembles the promotion controller from its collaborators:
//! - Cluster provider (Kubernetes)
//! - History ledger (redb)
//! - Version setter (GitHub pin file)
//! - Notifier (incoming webhook, or the log)
//!
//! # Usage
//!
//! ```text
//! stagelined --config stageline.toml serve --port 8088
//! stagelined promote qa web
//! stagelined rollback prod web --no-wait
//! stagelined diff web
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use stageline_core::StagelineConfig;
use stageline_gitops::GitHubPinFile;
use stageline_ledger::{HistoryLedger, LedgerStore};
use stageline_observer::{ClusterProvider, KubeCluster, RetryPolicy, WorkloadObserver};
use stageline_promote::{
    ConfirmationWatcher, Notifier, NotifyContext, PromoteResult, PromotionEngine,
    PromotionOutcome, TracingNotifier, WatchOutcome, WebhookNotifier,
};

#[derive(Parser)]
#[command(name = "stagelined", about = "Stageline promotion controller")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, short, global = true, default_value = "stageline.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the REST API.
    Serve {
        /// Port to listen on; overrides `api.port`.
        #[arg(long)]
        port: Option<u16>,
    },
    /// List instances in a namespace with version and status.
    List { namespace: String },
    /// Compare a label's running version across all stages.
    Diff { label: String },
    /// Show recorded promotions for a label in a namespace.
    History { namespace: String, label: String },
    /// Promote a label from its upstream stage.
    Promote {
        namespace: String,
        label: String,
        /// Name recorded as the initiator.
        #[arg(long)]
        initiator: Option<String>,
        /// Exit once the change is committed instead of following confirmation.
        #[arg(long)]
        no_wait: bool,
    },
    /// Roll a label back to the version recorded before the current one.
    Rollback {
        namespace: String,
        label: String,
        #[arg(long)]
        initiator: Option<String>,
        #[arg(long)]
        no_wait: bool,
    },
    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,stageline=debug,stagelined=debug")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        Command::Serve { port } => {
            let port = port.unwrap_or(config.api.port);
            let engine = build_engine(&config).await?;
            serve(engine, port).await
        }
        Command::List { namespace } => {
            config.pipeline().ensure_known(&namespace)?;
            let observer = build_observer(&config, connect_cluster().await?);
            let rows = observer.list_with_status(&namespace).await?;
            println!("Namespace: `{namespace}`");
            for row in rows {
                println!(
                    "Pod: `{}`, Version: `{}`, Status: `{}`, Label: `{}`",
                    row.name, row.version, row.status, row.label
                );
            }
            Ok(())
        }
        Command::Diff { label } => {
            let observer = build_observer(&config, connect_cluster().await?);
            let report = observer.drift(config.pipeline().stages(), &label).await?;
            println!("{}", report.summary());
            Ok(())
        }
        Command::History { namespace, label } => {
            config.pipeline().ensure_known(&namespace)?;
            let ledger = LedgerStore::open(&config.ledger.path)?;
            for entry in ledger.entries(&namespace, &label)? {
                println!(
                    "#{:<6} {:<24} recorded_at={}",
                    entry.sequence, entry.version, entry.recorded_at
                );
            }
            Ok(())
        }
        Command::Promote {
            namespace,
            label,
            initiator,
            no_wait,
        } => {
            let engine = build_engine(&config).await?;
            let context = cli_context("promote", &namespace, &label, initiator);
            let result = engine.promote(&namespace, &label, &context).await;
            finish(&engine, &context, result, !no_wait).await
        }
        Command::Rollback {
            namespace,
            label,
            initiator,
            no_wait,
        } => {
            let engine = build_engine(&config).await?;
            let context = cli_context("rollback", &namespace, &label, initiator);
            let result = engine.rollback(&namespace, &label, &context).await;
            finish(&engine, &context, result, !no_wait).await
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<StagelineConfig> {
    if path.exists() {
        let config = StagelineConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    } else {
        info!(path = %path.display(), "no configuration file, using defaults");
        Ok(StagelineConfig::default())
    }
}

async fn connect_cluster() -> anyhow::Result<Arc<dyn ClusterProvider>> {
    let cluster = KubeCluster::connect().await?;
    info!("cluster client initialized");
    Ok(Arc::new(cluster))
}

fn build_observer(config: &StagelineConfig, cluster: Arc<dyn ClusterProvider>) -> WorkloadObserver {
    WorkloadObserver::new(cluster)
        .with_label_key(config.observer.label_key.clone())
        .with_retry(RetryPolicy {
            max_attempts: config.observer.max_attempts,
            delay: config.observer.retry_delay(),
        })
}

async fn build_engine(config: &StagelineConfig) -> anyhow::Result<PromotionEngine> {
    let cluster = connect_cluster().await?;

    let ledger = LedgerStore::open(&config.ledger.path)?;
    info!(path = ?config.ledger.path, "history ledger opened");

    let setter = GitHubPinFile::from_config(config.gitops.clone())?;
    info!(owner = %config.gitops.owner, repo = %config.gitops.repo, "version setter initialized");

    let notifier: Arc<dyn Notifier> = match &config.notify.webhook_url_env {
        Some(var) => match std::env::var(var) {
            Ok(url) => Arc::new(WebhookNotifier::new(url)?),
            Err(_) => {
                warn!(env = %var, "webhook variable unset, notifications go to the log");
                Arc::new(TracingNotifier)
            }
        },
        None => Arc::new(TracingNotifier),
    };

    let observer = build_observer(config, cluster.clone());
    let watcher = ConfirmationWatcher::new(cluster, notifier)
        .with_label_key(config.observer.label_key.clone());

    Ok(PromotionEngine::new(
        config.pipeline(),
        observer,
        Arc::new(ledger),
        Arc::new(setter),
        watcher,
    ))
}

async fn serve(engine: PromotionEngine, port: u16) -> anyhow::Result<()> {
    let router = stageline_api::build_router(engine);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // In-flight confirmation watchers are abandoned on shutdown.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("Stageline daemon stopped");
    Ok(())
}

fn cli_context(command: &str, namespace: &str, label: &str, initiator: Option<String>) -> NotifyContext {
    let initiator = initiator
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "Unknown user".to_string());
    NotifyContext::new(format!("/{command} {namespace} {label}"), initiator)
}

async fn finish(
    engine: &PromotionEngine,
    context: &NotifyContext,
    result: PromoteResult<PromotionOutcome>,
    wait: bool,
) -> anyhow::Result<()> {
    engine.report(context, &result).await;
    match result {
        Ok(outcome) => {
            println!("{}", outcome.message);
            if !wait {
                warn!(
                    namespace = %outcome.namespace,
                    version = %outcome.version,
                    "exiting without following confirmation"
                );
                println!("Not waiting for confirmation; no rollout notification will be sent.");
                return Ok(());
            }
            match outcome.confirmation.await? {
                WatchOutcome::Confirmed { instance } => {
                    println!("Confirmed: `{instance}` is running `{}`.", outcome.version);
                    Ok(())
                }
                WatchOutcome::Aborted { reason } => {
                    anyhow::bail!("confirmation watch ended before the change was confirmed: {reason}");
                }
                WatchOutcome::SetupFailed { reason } => {
                    anyhow::bail!("could not watch namespace `{}`: {reason}", outcome.namespace);
                }
            }
        }
        Err(e) if e.is_noop() => {
            println!("{e}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
