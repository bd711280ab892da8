//! Daemon wiring: tracker client, caches, worker, gateway.

use crate::audit::AuditWriter;
use crate::config::Config;
use crate::directory::UserDirectory;
use crate::dispatch::{Dedup, Stats, run_worker};
use crate::gateway::{self, AppState};
use crate::monitor::TaskMonitor;
use crate::snapshot::SnapshotStore;
use crate::tracker::{HttpTracker, Tracker};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Depth of the notification queue between gateway and worker. The gateway
/// answers the provider before processing happens, so a short buffer absorbs
/// bursts without unbounded growth.
const QUEUE_DEPTH: usize = 256;

pub async fn serve(
    config: Config,
    host_override: Option<String>,
    port_override: Option<u16>,
) -> Result<()> {
    config.validate()?;

    let tracker: Arc<dyn Tracker> = Arc::new(HttpTracker::from_config(&config.tracker)?);
    let directory = UserDirectory::load(tracker.as_ref(), &config.collections.people).await;

    let store = SnapshotStore::new(config.snapshot_path());
    match store.len().await {
        Ok(0) => tracing::warn!(
            "snapshot store is empty — run `sprintguard setup` to seed it, \
             monitored tasks will be skipped until then"
        ),
        Ok(n) => tracing::info!("snapshot store loaded: {n} task(s)"),
        Err(e) => tracing::warn!("snapshot store unreadable: {e}"),
    }

    let audit = AuditWriter::new(Arc::clone(&tracker), config.collections.audit_log.clone());
    let monitor = TaskMonitor::new(
        Arc::clone(&tracker),
        store,
        audit,
        directory,
        config.policy.clone(),
    );

    let (queue, rx) = mpsc::channel(QUEUE_DEPTH);
    let stats = Arc::new(Stats::default());
    let dedup = Dedup::new(Duration::from_secs_f64(config.policy.dup_window_secs));
    let worker = tokio::spawn(run_worker(rx, monitor, dedup, Arc::clone(&stats)));

    let state = AppState {
        queue,
        stats,
        webhook_secret: config.gateway.webhook_secret.as_deref().map(Arc::from),
        monitored_collection: Arc::from(config.collections.tasks.as_str()),
    };

    let host = host_override.unwrap_or_else(|| config.gateway.host.clone());
    let port = port_override.unwrap_or(config.gateway.port);

    tokio::select! {
        served = gateway::run_gateway(&host, port, state) => served?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    worker.abort();
    Ok(())
}
