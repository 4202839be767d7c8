//! Orphaned-sandbox reaper.
//!
//! The registry does not survive process restarts, but sandboxes do. This
//! background sweep rediscovers them by naming convention and force-removes
//! any old enough that no live session could still own them, working purely
//! from the runtime's own listing rather than in-memory state.

use chrono::Utc;
use tracing::{debug, info, warn};

use super::models::{SANDBOX_PREFIX, volume_for};
use super::service::SandboxService;

/// Spawn the reaper task.
///
/// It waits for the probe's first positive verdict, sweeps immediately, then
/// sweeps on the configured interval. If the runtime never turns up, the
/// task idles forever without touching anything.
pub fn spawn(service: SandboxService) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut availability = service.probe.subscribe();
        if availability.wait_for(|available| *available).await.is_err() {
            return;
        }

        info!(
            interval_secs = service.config.reap_interval.as_secs(),
            "orphan reaper started"
        );

        let mut ticker = tokio::time::interval(service.config.reap_interval);
        loop {
            // The first tick completes immediately, so the startup sweep runs
            // as soon as the runtime is detected.
            ticker.tick().await;
            sweep(&service).await;
        }
    })
}

/// One sweep: list sandboxes by name prefix and force-remove expired ones.
///
/// A sandbox is expired when its age exceeds idle timeout + extension
/// window. Every failure in here is logged and swallowed; one bad entry must
/// never abort the rest of the sweep.
pub async fn sweep(service: &SandboxService) {
    let max_age = match chrono::Duration::from_std(service.config.orphan_max_age()) {
        Ok(duration) => duration,
        Err(_) => {
            warn!("orphan age threshold out of range, skipping sweep");
            return;
        }
    };

    let listings = match service.runtime.list_sandboxes(SANDBOX_PREFIX).await {
        Ok(listings) => listings,
        Err(e) => {
            warn!(error = %e, "sandbox listing failed, skipping sweep");
            return;
        }
    };

    debug!(candidates = listings.len(), "orphan sweep");

    let now = Utc::now();
    for listing in listings {
        let age = now.signed_duration_since(listing.created_at);
        if age <= max_age {
            continue;
        }

        info!(
            container = %listing.name,
            age_minutes = age.num_minutes(),
            "removing expired sandbox"
        );

        if let Err(e) = service.runtime.remove(&listing.name, true).await {
            warn!(container = %listing.name, error = %e, "failed to remove expired sandbox");
        }

        let volume = volume_for(&listing.name);
        if let Err(e) = service.runtime.remove_volume(&volume).await {
            warn!(volume = %volume, error = %e, "failed to remove expired sandbox volume");
        }
    }
}
