//! The probabilistic maintenance trigger fired after every write (§4.7):
//! rolls `autoCompact`/`autoVacuum`, runs whichever fires as a detached
//! background task with retry-with-backoff, and logs (rather than
//! propagates) any failure, since the caller's write already succeeded and
//! durability does not depend on maintenance running promptly.
use crate::compactor::{compact, vacuum};
use crate::config::{CollectionConfig, MaintenancePolicy};
use crate::retry::{retry_with_backoff, RetryOptions};
use crate::Error;
use coldbase_store::BlobStore;
use log::{error, warn};
use std::sync::Arc;

fn should_fire(policy: &MaintenancePolicy, mutation_count_hint: usize) -> bool {
    match policy {
        MaintenancePolicy::Disabled => false,
        MaintenancePolicy::Always => true,
        MaintenancePolicy::Probabilistic {
            probability,
            mutation_threshold,
            ..
        } => {
            (*mutation_threshold == 0 || mutation_count_hint >= *mutation_threshold)
                && roll(*probability)
        }
    }
}

fn roll(probability: f64) -> bool {
    rand::random::<f64>() < probability
}

fn retry_options_for(policy: &MaintenancePolicy) -> RetryOptions {
    match policy {
        MaintenancePolicy::Probabilistic {
            max_retries,
            retry_delay_ms,
            ..
        } => RetryOptions {
            max_attempts: max_retries + 1,
            base_delay_ms: *retry_delay_ms,
        },
        _ => RetryOptions {
            max_attempts: 1,
            base_delay_ms: 0,
        },
    }
}

/// Evaluates `autoCompact`/`autoVacuum` after a write and, if either fires,
/// spawns the maintenance run as a detached background task. Never awaited
/// by the caller.
pub fn after_write(
    store: Arc<dyn BlobStore>,
    config: Arc<CollectionConfig>,
    session_id: String,
    mutation_count_hint: usize,
) {
    let fire_compact = should_fire(config.auto_compact(), mutation_count_hint);
    let fire_vacuum_directly = !fire_compact && should_fire(config.auto_vacuum(), mutation_count_hint);

    if !fire_compact && !fire_vacuum_directly {
        return;
    }

    tokio::spawn(async move {
        if fire_compact {
            let compacted = run_compact(&*store, &config, &session_id).await;
            let should_vacuum_after = compacted
                && (matches!(config.auto_vacuum(), MaintenancePolicy::Always)
                    || roll(config.after_compact_probability()));
            if should_vacuum_after {
                run_vacuum(&*store, &config, &session_id).await;
            }
        } else {
            run_vacuum(&*store, &config, &session_id).await;
        }
    });
}

async fn run_compact(store: &dyn BlobStore, config: &CollectionConfig, session_id: &str) -> bool {
    let options = retry_options_for(config.auto_compact());
    let result = retry_with_backoff(&options, || compact(store, config, session_id)).await;
    match result {
        Ok(_) => true,
        Err(Error::LockActive) => {
            warn!("skipping auto-compaction of {}: lock is held by another session", config.name());
            false
        }
        Err(e) => {
            error!("auto-compaction of {} failed after retries: {}", config.name(), e);
            false
        }
    }
}

async fn run_vacuum(store: &dyn BlobStore, config: &CollectionConfig, session_id: &str) {
    let options = retry_options_for(config.auto_vacuum());
    let result = retry_with_backoff(&options, || vacuum(store, config, session_id)).await;
    match result {
        Ok(_) => {}
        Err(Error::LockActive) => {
            warn!("skipping auto-vacuum of {}: lock is held by another session", config.name())
        }
        Err(e) => error!("auto-vacuum of {} failed after retries: {}", config.name(), e),
    }
}
