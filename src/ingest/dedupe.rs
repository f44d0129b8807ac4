use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use serde_json::Value;

use crate::{dto::provider::RawProviderEvent, sanitize};

/// How long an explicit provider identity is remembered.
pub const IDENTITY_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// How long a derived fingerprint is remembered; only meant to absorb transport redelivery.
pub const FINGERPRINT_TTL: Duration = Duration::from_secs(15);

const FINGERPRINT_SEPARATOR: &str = "|";

/// Key under which an event is remembered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupeKey {
    /// Provider-assigned identity.
    Identity(String),
    /// Fingerprint derived from the event's descriptive fields.
    Fingerprint(String),
}

impl DedupeKey {
    /// Derive the key for `event`, or `None` when the event carries no usable information.
    pub fn for_event(event: &RawProviderEvent) -> Option<Self> {
        let message = event.first_message();

        let identity = sanitize::first_non_empty([
            event.event_id.as_ref(),
            message.and_then(|m| m.underscore_id.as_ref()),
            message.and_then(|m| m.id.as_ref()),
            message.and_then(|m| m.event_id.as_ref()),
        ]);
        if let Some(identity) = identity {
            return Some(Self::Identity(identity));
        }

        let field = |value: Option<&Value>| {
            value
                .map(sanitize::text)
                .map(|text| sanitize::identity(&text))
                .unwrap_or_default()
        };
        let parts = [
            field(event.event_type.as_ref()),
            field(message.and_then(|m| m.sub_type.as_ref())),
            field(message.and_then(|m| m.name.as_ref())),
            field(message.and_then(|m| m.gifter.as_ref())),
            field(message.and_then(|m| m.receiver.as_ref())),
            field(message.and_then(|m| m.amount.as_ref())),
            field(message.and_then(|m| m.months.as_ref())),
            field(message.and_then(|m| m.sub_plan.as_ref())),
        ];
        if parts.iter().all(String::is_empty) {
            return None;
        }
        Some(Self::Fingerprint(parts.join(FINGERPRINT_SEPARATOR)))
    }

    /// Retention window for this kind of key.
    pub fn ttl(&self) -> Duration {
        match self {
            Self::Identity(_) => IDENTITY_TTL,
            Self::Fingerprint(_) => FINGERPRINT_TTL,
        }
    }

    /// Table key, namespaced by kind.
    pub fn as_table_key(&self) -> String {
        match self {
            Self::Identity(identity) => format!("id:{identity}"),
            Self::Fingerprint(fingerprint) => format!("fp:{fingerprint}"),
        }
    }
}

/// Remembers recently applied events so redeliveries are dropped.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashMap<String, Instant>,
}

impl Deduplicator {
    /// Create an empty deduplicator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `event` against the table, recording it on first sighting.
    pub fn is_duplicate(&mut self, event: &RawProviderEvent, now: Instant) -> bool {
        let Some(key) = DedupeKey::for_event(event) else {
            return false;
        };
        let expires_at = now + key.ttl();
        let table_key = key.as_table_key();

        match self.seen.get_mut(&table_key) {
            Some(existing) if *existing > now => true,
            Some(existing) => {
                *existing = expires_at;
                false
            }
            None => {
                self.seen.insert(table_key, expires_at);
                false
            }
        }
    }

    /// Drop expired entries, returning how many were removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.seen.len();
        self.seen.retain(|_, expires_at| *expires_at > now);
        before - self.seen.len()
    }

    /// Number of remembered keys.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether no key is remembered.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: Value) -> RawProviderEvent {
        serde_json::from_value(value).unwrap()
    }

    fn cheer() -> RawProviderEvent {
        event(json!({
            "type": "bits",
            "message": [{ "name": "Bob", "amount": 100 }]
        }))
    }

    #[test]
    fn identity_takes_priority_over_fingerprint() {
        let raw = event(json!({
            "type": "bits",
            "message": [{ "_id": " abc ", "name": "Bob", "amount": 100 }]
        }));
        assert_eq!(
            DedupeKey::for_event(&raw),
            Some(DedupeKey::Identity("abc".into()))
        );

        let raw = event(json!({ "type": "bits", "event_id": "evt-1", "message": [{ "_id": "abc" }] }));
        assert_eq!(
            DedupeKey::for_event(&raw).unwrap().as_table_key(),
            "id:evt-1"
        );
    }

    #[test]
    fn fingerprint_normalizes_fields() {
        let raw = event(json!({
            "type": "Bits",
            "message": [{ "name": " BOB ", "amount": 100 }]
        }));
        assert_eq!(
            DedupeKey::for_event(&raw).unwrap().as_table_key(),
            "fp:bits||bob|||100||"
        );
    }

    #[test]
    fn empty_fingerprint_always_passes() {
        let mut dedupe = Deduplicator::new();
        let raw = event(json!({}));
        let now = Instant::now();
        assert!(!dedupe.is_duplicate(&raw, now));
        assert!(!dedupe.is_duplicate(&raw, now));
        assert!(dedupe.is_empty());
    }

    #[test]
    fn identity_is_remembered_for_a_day() {
        let mut dedupe = Deduplicator::new();
        let raw = event(json!({ "type": "subscription", "message": [{ "_id": "sub-1" }] }));
        let now = Instant::now();

        assert!(!dedupe.is_duplicate(&raw, now));
        assert!(dedupe.is_duplicate(&raw, now + Duration::from_secs(23 * 60 * 60)));
        assert!(!dedupe.is_duplicate(&raw, now + IDENTITY_TTL + Duration::from_secs(1)));
    }

    #[test]
    fn fingerprint_window_is_fifteen_seconds() {
        let now = Instant::now();

        let mut dedupe = Deduplicator::new();
        assert!(!dedupe.is_duplicate(&cheer(), now));
        assert!(dedupe.is_duplicate(&cheer(), now + Duration::from_secs(5)));

        let mut dedupe = Deduplicator::new();
        assert!(!dedupe.is_duplicate(&cheer(), now));
        assert!(!dedupe.is_duplicate(&cheer(), now + Duration::from_secs(20)));
    }

    #[test]
    fn sweep_drops_only_expired_entries() {
        let mut dedupe = Deduplicator::new();
        let now = Instant::now();
        dedupe.is_duplicate(&cheer(), now);
        dedupe.is_duplicate(
            &event(json!({ "type": "bits", "message": [{ "_id": "x" }] })),
            now,
        );

        assert_eq!(dedupe.sweep(now + Duration::from_secs(60)), 1);
        assert_eq!(dedupe.len(), 1);
    }
}
