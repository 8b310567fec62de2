//! Builds the orchestrator matching a client's multi-tracker behaviour.

use std::sync::Arc;

use super::{
    AllOrchestrator, AllTierAnnouncer, AnnounceDelegate, AnnounceError, FallbackOrchestrator,
    FallbackTierAnnouncer, Orchestrator, TierAnnouncer, TrackerAnnouncer,
};
use crate::config::AnnounceConfig;
use crate::seed::ClientCapabilities;
use crate::torrent::tracker::TrackerClientProvider;

/// Creates per-torrent orchestrators from announce-list tiers.
#[derive(Clone)]
pub struct AnnouncerFactory {
    provider: Arc<dyn TrackerClientProvider>,
    config: AnnounceConfig,
}

impl AnnouncerFactory {
    pub fn new(provider: Arc<dyn TrackerClientProvider>, config: AnnounceConfig) -> Self {
        Self { provider, config }
    }

    /// Builds the orchestrator for `tiers` with the client's strategy flags.
    ///
    /// Empty tiers are skipped. Without announce-list support only the first
    /// tracker of the first tier is used.
    ///
    /// # Errors
    ///
    /// - `AnnounceError::EmptyTierList` - No tracker URL at all
    /// - `AnnounceError::UnsupportedScheme` / `InvalidTrackerUrl` - Unusable URL
    pub fn build(
        &self,
        tiers: &[Vec<String>],
        capabilities: &ClientCapabilities,
        delegate: Arc<dyn AnnounceDelegate>,
    ) -> Result<Orchestrator, AnnounceError> {
        let mut tiers: Vec<&[String]> = tiers
            .iter()
            .filter(|tier| !tier.is_empty())
            .map(Vec::as_slice)
            .collect();
        if tiers.is_empty() {
            return Err(AnnounceError::EmptyTierList);
        }
        if !capabilities.support_announce_list {
            let primary: &[String] = tiers[0];
            tiers = vec![&primary[..1]];
        }

        let mut tier_announcers = Vec::with_capacity(tiers.len());
        for (index, urls) in tiers.iter().enumerate() {
            let trackers = urls
                .iter()
                .map(|url| {
                    let client = self.provider.tracker_client(url)?;
                    Ok::<_, AnnounceError>(Arc::new(TrackerAnnouncer::new(
                        client,
                        Arc::clone(&delegate),
                        self.config.clone(),
                    )))
                })
                .collect::<Result<Vec<_>, AnnounceError>>()?;

            let tier = if capabilities.announce_to_all_trackers_in_tier {
                TierAnnouncer::All(AllTierAnnouncer::new(index, trackers, self.config.clone())?)
            } else {
                TierAnnouncer::Fallback(FallbackTierAnnouncer::new(
                    index,
                    trackers,
                    self.config.clone(),
                )?)
            };
            tier_announcers.push(Arc::new(tier));
        }

        tracing::debug!(
            "Built {} orchestrator over {} tier(s)",
            if capabilities.announce_to_all_tiers { "all-tiers" } else { "fallback" },
            tier_announcers.len()
        );

        if capabilities.announce_to_all_tiers {
            Ok(Orchestrator::All(AllOrchestrator::new(tier_announcers)?))
        } else {
            Ok(Orchestrator::Fallback(FallbackOrchestrator::new(
                tier_announcers,
                self.config.clone(),
            )?))
        }
    }
}
