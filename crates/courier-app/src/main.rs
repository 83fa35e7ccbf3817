//! Courier application binary - composition root.
//!
//! 1. Parse the CLI and load configuration from TOML
//! 2. Open the vault, creating any missing stage folders
//! 3. Build the executor (client, rate limits, mapper, audit log)
//! 4. Run the requested pass or poll loop until Ctrl-C

mod cli;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use courier_action::{
    ingest_inbox, ActionClient, ActionMapper, ApprovalWatcher, AuditLog, Classifier, DraftStore,
    DryRunClient, Executor, FolderTaskStore, ProcessClient, QuotaBook, RateLimiterState,
    SlidingWindowLimiter, TaskStore, VaultLayout,
};
use courier_core::config::CourierConfig;

use cli::{CliArgs, Command, WatchArgs};

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

/// A missing file means defaults; an unreadable or invalid one is fatal.
fn load_config(path: &Path) -> courier_core::Result<CourierConfig> {
    if path.exists() {
        CourierConfig::load(path)
    } else {
        Ok(CourierConfig::default())
    }
}

fn build_executor(
    config: &CourierConfig,
    layout: &VaultLayout,
    audit: Arc<AuditLog>,
    dry_run: bool,
) -> Executor {
    let client: Arc<dyn ActionClient> = if dry_run {
        Arc::new(DryRunClient::new())
    } else {
        Arc::new(ProcessClient::new(&config.servers))
    };
    let quotas = if dry_run {
        QuotaBook::in_memory(config.quotas.clone())
    } else {
        QuotaBook::persistent(config.quotas.clone(), &layout.quota_dir())
    };
    let limits = RateLimiterState::new(
        SlidingWindowLimiter::new(
            config.executor.max_actions_per_window,
            Duration::from_secs(config.executor.window_secs),
        ),
        quotas,
    );
    let mapper = ActionMapper::new(
        DraftStore::new(layout.drafts_dir()),
        config.executor.max_post_length,
    );
    Executor::new(client, mapper, limits, audit, &config.executor)
}

async fn watch(
    config: &CourierConfig,
    layout: &VaultLayout,
    store: Arc<dyn TaskStore>,
    audit: Arc<AuditLog>,
    args: &WatchArgs,
    with_intake: bool,
) -> AppResult<()> {
    let executor = build_executor(config, layout, Arc::clone(&audit), args.dry_run);
    let interval = args.resolve_interval(config.watcher.poll_interval_secs);
    let mut watcher = ApprovalWatcher::new(Arc::clone(&store), executor, Arc::clone(&audit), interval);
    if with_intake {
        watcher = watcher.with_intake(Classifier::new(store, audit).with_dry_run(args.dry_run));
    }

    if args.once {
        let report = watcher.poll_once().await?;
        tracing::info!(
            dispatched = report.dispatched(),
            executed = report.executed,
            failed = report.failed,
            deferred = report.deferred,
            errors = report.errors,
            "Single cycle complete"
        );
        return Ok(());
    }

    let shutdown = watcher.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested, finishing current cycle");
                shutdown.notify_one();
            }
            Err(e) => tracing::warn!(error = %e, "Could not listen for Ctrl-C"),
        }
    });

    watcher.run().await;
    Ok(())
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = CliArgs::parse();

    // Config is read before tracing so its log level can seed the filter.
    let config_file = cli.resolve_config_path();
    let loaded = load_config(&config_file);
    let level = match &loaded {
        Ok(config) => cli.resolve_log_level(&config.general.log_level),
        Err(_) => cli.resolve_log_level("info"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .init();

    tracing::info!("Starting Courier v{}", env!("CARGO_PKG_VERSION"));

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %config_file.display(), error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    let layout = VaultLayout::new(cli.resolve_vault(config.general.vault_path()));
    let store = match FolderTaskStore::open(layout.clone()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(vault = %layout.root().display(), error = %e, "Failed to prepare vault");
            return Err(e.into());
        }
    };
    tracing::info!(vault = %layout.root().display(), "Vault ready");

    let audit = Arc::new(AuditLog::new(layout.logs_dir()));
    if cli.is_dry_run() {
        tracing::info!("DRY RUN: no remote calls, moves or writes");
    }

    match &cli.command {
        Command::Ingest(args) => {
            let summary = ingest_inbox(store.as_ref(), &audit, args.dry_run)?;
            tracing::info!(moved = summary.moved, errors = summary.errors, "Ingestion complete");
        }
        Command::Classify(args) => {
            let summary = Classifier::new(store, audit)
                .with_dry_run(args.dry_run)
                .run()?;
            tracing::info!(
                processed = summary.processed,
                skipped = summary.skipped,
                errors = summary.errors,
                "Classification complete"
            );
        }
        Command::Run(args) => watch(&config, &layout, store, audit, args, true).await?,
        Command::Execute(args) => watch(&config, &layout, store, audit, args, false).await?,
    }

    tracing::info!("Courier stopped");
    Ok(())
}
