mod args;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use reaper_core::app::shutdown::{self, ShutdownHandle};
use reaper_core::impls::{InMemoryCatalog, PosixDriver};
use reaper_core::ports::{Clock, SystemClock};
use reaper_core::{ReaperBuilder, ReaperConfig, ReaperConfigLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use args::Args;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn load_config(args: &Args) -> anyhow::Result<ReaperConfig> {
    let mut layer = match &args.config {
        Some(path) => ReaperConfigLayer::load(path).await?,
        None => ReaperConfigLayer::default(),
    };
    layer.merge(args.layer());
    let config = layer.finalize();
    config.validate()?;
    Ok(config)
}

/// Resolves when `listener` reports its signal. A listener that fails to
/// install never resolves, so the daemon keeps running instead of stopping.
async fn until_signal(listener: impl Future<Output = std::io::Result<()>>, name: &str) {
    if let Err(err) = listener.await {
        warn!(signal = name, error = %err, "cannot listen for signal");
        std::future::pending::<()>().await;
    }
}

async fn ctrl_c() {
    until_signal(tokio::signal::ctrl_c(), "ctrl-c").await;
}

/// SIGINT or SIGTERM raises the stop flag; in-flight batches still finish.
async fn forward_signals(handle: ShutdownHandle) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    Some(()) = term.recv() => {}
                }
            }
            Err(err) => {
                warn!(error = %err, "cannot listen for SIGTERM, only ctrl-c will stop");
                ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c().await;
    }

    info!("stop requested, finishing in-flight batches");
    handle.request();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = load_config(&args).await.context("loading configuration")?;
    if config.greedy {
        warn!("global greedy mode is deprecated; set greedy on the rse instead");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let catalog = Arc::new(
        InMemoryCatalog::load(&args.catalog, Arc::clone(&clock))
            .await
            .with_context(|| format!("loading catalog {}", args.catalog.display()))?,
    );

    let mut posix = PosixDriver::new();
    if let Some(root) = &args.posix_root {
        posix = posix.with_root(root);
    }

    let (handle, stop) = shutdown::channel();
    tokio::spawn(forward_signals(handle));

    info!(
        threads = config.threads,
        chunk_size = config.chunk_size,
        run_once = config.run_once,
        "starting reaper"
    );
    let controller = ReaperBuilder::new(config)
        .catalog(catalog.clone())
        .driver(Arc::new(posix))?
        .clock(clock)
        .shutdown(stop)
        .build()
        .context("invalid reaper setup")?;
    let summary = controller.run().await?;

    info!(
        cycles = summary.cycles,
        deleted = summary.tally.deleted,
        transient = summary.tally.transient,
        permanent = summary.tally.permanent,
        bytes = summary.tally.bytes_freed,
        excluded = summary.endpoints.iter().filter(|h| h.is_excluded()).count(),
        "reaper finished"
    );

    if let Some(path) = &args.dump_catalog {
        catalog
            .dump(path)
            .await
            .with_context(|| format!("writing catalog {}", path.display()))?;
        info!(path = %path.display(), "catalog written");
    }
    Ok(())
}
