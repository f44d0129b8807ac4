//! Provider event ingestion: deduplication, bulk-gift correlation and normalization into
//! [`Adjustment`]s for the timer engine.

pub mod dedupe;
pub mod gift_link;
pub mod normalizer;

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::{
    dto::provider::RawProviderEvent,
    sanitize,
    state::timer::{Adjustment, TimerState},
};

pub use self::{
    dedupe::Deduplicator,
    gift_link::GiftLinkCorrelator,
    normalizer::{SupportEvent, adjustment_for},
};

/// Interval between expiry sweeps of the dedupe and gift-link tables.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Only events for this account are counted when the provider tags them.
const ACCEPTED_ACCOUNT: &str = "twitch_account";

/// Chains the deduplicator, the gift-link correlator and the normalizer.
///
/// Owned exclusively by the ingestion path; its tables are never exposed.
#[derive(Debug, Default)]
pub struct IngestPipeline {
    dedupe: Deduplicator,
    gifts: GiftLinkCorrelator,
}

impl IngestPipeline {
    /// Create a pipeline with empty tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn a raw provider event into an adjustment, or `None` when it must not count.
    ///
    /// `config` supplies the scoring configuration (`eventSeconds`, `happyHour`) and is only read.
    pub fn process(
        &mut self,
        event: &RawProviderEvent,
        config: &TimerState,
        now: Instant,
    ) -> Option<Adjustment> {
        if let Some(target) = event.target.as_ref().map(sanitize::text) {
            if !target.is_empty() && target != ACCEPTED_ACCOUNT {
                debug!(target = %target, "ignoring event for another account");
                return None;
            }
        }

        if self.dedupe.is_duplicate(event, now) {
            info!("ignoring duplicate provider event");
            return None;
        }

        let Some(decoded) = SupportEvent::decode(event) else {
            info!(event_type = ?event.event_type, "ignoring unrecognized provider event");
            return None;
        };

        match &decoded {
            SupportEvent::GiftedSubscription { gifter, .. } => {
                if self.gifts.try_consume(gifter, now) {
                    info!(gifter = %gifter, "gift already counted through its bulk gift");
                    return None;
                }
            }
            SupportEvent::BulkGift { gifter, count, .. } => {
                self.gifts.register(gifter, *count, now);
            }
            SupportEvent::Subscription { .. } | SupportEvent::Bits { .. } => {}
        }

        adjustment_for(&decoded, config)
    }

    /// Expire stale dedupe entries and gift links.
    pub fn sweep(&mut self, now: Instant) {
        let keys = self.dedupe.sweep(now);
        let links = self.gifts.sweep(now);
        if keys > 0 || links > 0 {
            debug!(keys, links, "swept expired ingestion entries");
        }
    }
}
