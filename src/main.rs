// Entry point of the moderation daemon.
//
// The forum embeds the library and calls the trigger and moderator
// operations directly. This binary owns the shared database and runs the
// periodic maintenance sweeps:
// 1. Load configuration
// 2. Initialize stores and services (dependency injection)
// 3. Spawn the cleanup and recalculation loops
// 4. Wait for Ctrl-C

use mod_queue::core::detection::{DuplicateDetector, SpamScorer};
use mod_queue::core::moderation::{ModerationConfig, ModerationService};
use mod_queue::core::queue::ReviewQueue;
use mod_queue::core::trust::TrustLevelTracker;
use mod_queue::infra::cache::MokaDetectionCache;
use mod_queue::infra::content::SqliteContentStore;
use mod_queue::infra::queue::SqliteQueueStore;
use mod_queue::infra::sqlite;
use mod_queue::infra::trust::SqliteTrustStore;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();
    let config = ModerationConfig::from_env();

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================

    let pool = sqlite::connect(&config.database_url).await?;

    let trust_store = SqliteTrustStore::new(pool.clone());
    trust_store.migrate().await?;
    let queue_store = SqliteQueueStore::new(pool.clone());
    queue_store.migrate().await?;
    let content_store = Arc::new(SqliteContentStore::new(pool));
    content_store.migrate().await?;

    let service = Arc::new(ModerationService::new(
        ReviewQueue::new(queue_store),
        TrustLevelTracker::new(trust_store),
        SpamScorer::new(),
        DuplicateDetector::with_config(Arc::clone(&content_store), config.duplicate_config()),
        content_store,
        Arc::new(MokaDetectionCache::new(config.cache_capacity)),
        config.clone(),
    ));

    match service.queue_stats().await {
        Ok(stats) => tracing::info!(
            pending = stats.pending_count,
            escalated = stats.escalated_count,
            needs_info = stats.needs_info_count,
            database = %config.database_url,
            "Moderation queue ready"
        ),
        Err(e) => tracing::warn!("Could not read queue stats at startup: {}", e),
    }

    // ========================================================================
    // MAINTENANCE SWEEPS
    // ========================================================================

    let cleanup_service = Arc::clone(&service);
    let cleanup_every = config.cleanup_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cleanup_every);
        loop {
            ticker.tick().await;
            tracing::debug!("Resolved-item cleanup starting");
            match cleanup_service.cleanup_resolved().await {
                Ok(0) => tracing::debug!("No resolved items past retention"),
                Ok(deleted) => tracing::info!(deleted, "Resolved-item cleanup completed"),
                Err(e) => tracing::error!("Resolved-item cleanup failed: {}", e),
            }
        }
    });

    let recalc_service = Arc::clone(&service);
    let recalc_every = config.recalculate_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(recalc_every);
        loop {
            ticker.tick().await;
            if let Err(e) = recalc_service.recalculate_priorities().await {
                tracing::error!("Priority recalculation failed: {}", e);
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    Ok(())
}
