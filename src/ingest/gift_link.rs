use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use tracing::debug;

use crate::sanitize;

/// How long a bulk gift waits for its per-recipient events.
pub const LINK_TTL: Duration = Duration::from_secs(120);

/// Outstanding per-recipient events expected from one gifter's bulk gift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MysteryGiftLink {
    pub remaining: u64,
    pub expires_at: Instant,
}

/// Suppresses per-recipient gift events already counted through their bulk gift.
///
/// Links are keyed by the case-folded, trimmed gifter name only. Two gifters sharing a
/// display name, or a provider spelling the name differently between the bulk event and
/// its children, will be attributed wrongly; there is no stronger identity to match on.
#[derive(Debug, Default)]
pub struct GiftLinkCorrelator {
    links: HashMap<String, MysteryGiftLink>,
}

impl GiftLinkCorrelator {
    /// Create an empty correlator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect `count` per-recipient events from `gifter`.
    ///
    /// A second bulk gift from the same gifter while a link is still open adds to the
    /// outstanding count and restarts the expiry window.
    pub fn register(&mut self, gifter: &str, count: u64, now: Instant) {
        if count == 0 {
            return;
        }
        let key = sanitize::identity(gifter);
        let expires_at = now + LINK_TTL;
        let link = self
            .links
            .entry(key.clone())
            .and_modify(|link| {
                if link.expires_at > now {
                    link.remaining = link.remaining.saturating_add(count);
                } else {
                    link.remaining = count;
                }
                link.expires_at = expires_at;
            })
            .or_insert(MysteryGiftLink {
                remaining: count,
                expires_at,
            });
        debug!(gifter = %key, remaining = link.remaining, "registered bulk gift link");
    }

    /// Consume one expected child event from `gifter`. Returns `true` when the event must be
    /// suppressed.
    pub fn try_consume(&mut self, gifter: &str, now: Instant) -> bool {
        let key = sanitize::identity(gifter);
        let Some(link) = self.links.get_mut(&key) else {
            return false;
        };

        if link.expires_at <= now || link.remaining == 0 {
            self.links.remove(&key);
            return false;
        }

        link.remaining -= 1;
        debug!(gifter = %key, remaining = link.remaining, "suppressed gift covered by bulk gift");
        if link.remaining == 0 {
            self.links.remove(&key);
        }
        true
    }

    /// Outstanding link for `gifter`, if any.
    pub fn link(&self, gifter: &str) -> Option<&MysteryGiftLink> {
        self.links.get(&sanitize::identity(gifter))
    }

    /// Drop expired links, returning how many were removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.links.len();
        self.links.retain(|_, link| link.expires_at > now);
        before - self.links.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumes_exactly_the_registered_count() {
        let mut gifts = GiftLinkCorrelator::new();
        let now = Instant::now();
        gifts.register("Alice", 3, now);

        assert!(gifts.try_consume("alice", now));
        assert!(gifts.try_consume(" ALICE", now));
        assert!(gifts.try_consume("alice", now));
        assert!(!gifts.try_consume("alice", now));
        assert!(gifts.link("alice").is_none());
    }

    #[test]
    fn expired_link_does_not_suppress() {
        let mut gifts = GiftLinkCorrelator::new();
        let now = Instant::now();
        gifts.register("alice", 2, now);
        assert!(!gifts.try_consume("alice", now + LINK_TTL));
        assert!(gifts.link("alice").is_none());
    }

    #[test]
    fn other_gifters_are_not_matched() {
        let mut gifts = GiftLinkCorrelator::new();
        let now = Instant::now();
        gifts.register("alice", 2, now);
        assert!(!gifts.try_consume("bob", now));
        assert_eq!(gifts.link("alice").unwrap().remaining, 2);
    }

    #[test]
    fn repeated_bulk_gifts_accumulate() {
        let mut gifts = GiftLinkCorrelator::new();
        let now = Instant::now();
        gifts.register("alice", 2, now);
        gifts.register("alice", 5, now + Duration::from_secs(60));

        let link = gifts.link("alice").unwrap();
        assert_eq!(link.remaining, 7);
        assert_eq!(link.expires_at, now + Duration::from_secs(60) + LINK_TTL);
    }

    #[test]
    fn sweep_removes_stale_links() {
        let mut gifts = GiftLinkCorrelator::new();
        let now = Instant::now();
        gifts.register("alice", 2, now);
        gifts.register("bob", 2, now + Duration::from_secs(100));
        assert_eq!(gifts.sweep(now + Duration::from_secs(150)), 1);
        assert!(gifts.link("bob").is_some());
    }
}
