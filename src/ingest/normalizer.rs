use tracing::{debug, info};

use crate::{
    dto::provider::{RawEventMessage, RawProviderEvent},
    sanitize,
    state::timer::{Adjustment, AdjustmentDebug, EventCategory, TimerState},
};

/// Decoded provider event, one variant per category the timer reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupportEvent {
    /// A viewer subscribed or renewed.
    Subscription { tier: EventCategory, resub: bool },
    /// One gifted subscription for one recipient.
    GiftedSubscription { tier: EventCategory, gifter: String },
    /// One gifter bought `count` subscriptions at once.
    BulkGift {
        tier: EventCategory,
        gifter: String,
        count: u64,
        /// Reported as a subscription sub-type rather than a top-level event.
        community: bool,
    },
    /// Cheer with the given number of bits.
    Bits { amount: u64 },
}

impl SupportEvent {
    /// Decode a raw provider event. Unknown shapes yield `None`.
    pub fn decode(event: &RawProviderEvent) -> Option<Self> {
        let event_type = event
            .event_type
            .as_ref()
            .map(|value| sanitize::token(&sanitize::text(value)))
            .unwrap_or_default();
        let message = event.first_message()?;

        match event_type.as_str() {
            "subscription" | "resub" => decode_subscription(&event_type, message),
            "submysterygift" | "communitygift" | "communitygiftpurchase" | "mysterygift" => {
                Some(bulk_gift(message, false))
            }
            "bits" | "cheer" => Some(Self::Bits {
                amount: sanitize::opt_non_negative_int(message.amount.as_ref()),
            }),
            _ => None,
        }
    }

    /// Short label used for reasons and diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Subscription { resub: false, .. } => "subscription:new",
            Self::Subscription { resub: true, .. } => "subscription:resub",
            Self::GiftedSubscription { .. } => "subscription:gift",
            Self::BulkGift {
                community: true, ..
            } => "subscription:community-gift",
            Self::BulkGift {
                community: false, ..
            } => "bulk-gift",
            Self::Bits { .. } => "bits",
        }
    }
}

fn decode_subscription(event_type: &str, message: &RawEventMessage) -> Option<SupportEvent> {
    let sub_type = message
        .sub_type
        .as_ref()
        .map(|value| sanitize::token(&sanitize::text(value)))
        .unwrap_or_default();
    let tier = classify_tier(message);

    match sub_type.as_str() {
        "" if event_type == "resub" => Some(SupportEvent::Subscription { tier, resub: true }),
        "" | "sub" | "new" | "prime" => Some(SupportEvent::Subscription { tier, resub: false }),
        "resub" => Some(SupportEvent::Subscription { tier, resub: true }),
        "gift" | "subgift" | "anonsubgift" => Some(SupportEvent::GiftedSubscription {
            tier,
            gifter: gifter_of(message),
        }),
        "communitygift" | "submysterygift" | "anonsubmysterygift" | "mysterygift" => {
            Some(bulk_gift(message, true))
        }
        _ => None,
    }
}

fn bulk_gift(message: &RawEventMessage, community: bool) -> SupportEvent {
    let declared = [message.amount.as_ref(), message.repeat.as_ref()]
        .into_iter()
        .map(sanitize::opt_non_negative_int)
        .find(|count| *count > 0);
    SupportEvent::BulkGift {
        tier: classify_tier(message),
        gifter: gifter_of(message),
        count: declared.unwrap_or(1),
        community,
    }
}

/// Normalized identity of whoever paid for a gift.
fn gifter_of(message: &RawEventMessage) -> String {
    sanitize::first_non_empty([message.gifter.as_ref(), message.name.as_ref()])
        .map(|name| sanitize::identity(&name))
        .unwrap_or_default()
}

/// Map the plan code or plan name onto a tier category.
pub fn classify_tier(message: &RawEventMessage) -> EventCategory {
    let code = message
        .sub_plan
        .as_ref()
        .map(sanitize::text)
        .unwrap_or_default();
    let code = code.trim();
    let names = [message.sub_plan.as_ref(), message.sub_plan_name.as_ref()]
        .into_iter()
        .flatten()
        .map(|value| sanitize::text(value).to_lowercase())
        .collect::<Vec<_>>();
    let mentions = |needle: &str| names.iter().any(|name| name.contains(needle));

    if code == "3000" || mentions("tier 3") || mentions("tier3") {
        EventCategory::T3
    } else if code == "2000" || mentions("tier 2") || mentions("tier2") {
        EventCategory::T2
    } else {
        EventCategory::PrimeT1
    }
}

/// Compute the adjustment for a decoded event under the current scoring configuration.
///
/// Pure: gift-link bookkeeping happens in the pipeline before this is called.
pub fn adjustment_for(event: &SupportEvent, config: &TimerState) -> Option<Adjustment> {
    let multiplier = config.multiplier();
    let seconds_for = |category: EventCategory| {
        config
            .event_seconds
            .get(category)
            .saturating_mul(multiplier)
    };

    let (sub_seconds, bonus_seconds, add_subs, add_bits) = match *event {
        SupportEvent::Subscription { tier, .. } | SupportEvent::GiftedSubscription { tier, .. } => {
            (seconds_for(tier), 0, 1, 0)
        }
        SupportEvent::BulkGift { tier, count, .. } => {
            let bonus = EventCategory::bomb_for_count(count)
                .map(seconds_for)
                .unwrap_or(0);
            (seconds_for(tier).saturating_mul(count), bonus, count, 0)
        }
        SupportEvent::Bits { amount: 0 } => {
            info!("ignoring bits event without an amount");
            return None;
        }
        SupportEvent::Bits { amount } => (seconds_for(EventCategory::Bits), 0, 0, amount),
    };

    let total = sub_seconds.saturating_add(bonus_seconds);
    let label = event.label();
    debug!(event = label, sub_seconds, bonus_seconds, total, "mapped provider event");

    Some(Adjustment {
        add_seconds: total,
        add_subs,
        add_bits,
        reason: label.to_string(),
        debug: Some(AdjustmentDebug {
            event: label.to_string(),
            sub_seconds,
            bonus_seconds,
            total,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn decode(value: Value) -> Option<SupportEvent> {
        let raw: RawProviderEvent = serde_json::from_value(value).unwrap();
        SupportEvent::decode(&raw)
    }

    fn config() -> TimerState {
        let mut state = TimerState::default();
        state.event_seconds.prime_t1 = 300;
        state.event_seconds.t2 = 600;
        state.event_seconds.t3 = 900;
        state.event_seconds.bits = 0;
        state.event_seconds.bomb10 = 100;
        state.event_seconds.bomb20 = 200;
        state.event_seconds.bomb50 = 500;
        state.event_seconds.bomb100 = 1000;
        state
    }

    fn bulk(count: u64) -> SupportEvent {
        SupportEvent::BulkGift {
            tier: EventCategory::PrimeT1,
            gifter: "alice".into(),
            count,
            community: false,
        }
    }

    #[test]
    fn tiers_follow_plan_code_or_name() {
        let tier = |message: Value| {
            let message: RawEventMessage = serde_json::from_value(message).unwrap();
            classify_tier(&message)
        };
        assert_eq!(tier(json!({ "sub_plan": "3000" })), EventCategory::T3);
        assert_eq!(tier(json!({ "sub_plan": 2000 })), EventCategory::T2);
        assert_eq!(tier(json!({ "sub_plan_name": "Channel Sub (Tier 3)" })), EventCategory::T3);
        assert_eq!(tier(json!({ "sub_plan_name": "tier2 sub" })), EventCategory::T2);
        assert_eq!(tier(json!({ "sub_plan": "Prime" })), EventCategory::PrimeT1);
        assert_eq!(tier(json!({})), EventCategory::PrimeT1);
    }

    #[test]
    fn decodes_subscription_sub_types() {
        assert_eq!(
            decode(json!({ "type": "subscription", "message": [{ "sub_type": "resub", "sub_plan": "1000" }] })),
            Some(SupportEvent::Subscription { tier: EventCategory::PrimeT1, resub: true })
        );
        assert_eq!(
            decode(json!({ "type": "subscription", "message": [{ "name": "bob" }] })),
            Some(SupportEvent::Subscription { tier: EventCategory::PrimeT1, resub: false })
        );
        assert_eq!(
            decode(json!({ "type": "subscription", "message": [{ "sub_type": "subgift", "gifter": " Alice ", "name": "bob" }] })),
            Some(SupportEvent::GiftedSubscription { tier: EventCategory::PrimeT1, gifter: "alice".into() })
        );
        assert_eq!(
            decode(json!({ "type": "subscription", "message": [{ "sub_type": "Community Gift", "name": "Alice", "amount": 10, "sub_plan": "2000" }] })),
            Some(SupportEvent::BulkGift { tier: EventCategory::T2, gifter: "alice".into(), count: 10, community: true })
        );
        assert_eq!(
            decode(json!({ "type": "subscription", "message": [{ "sub_type": "extension" }] })),
            None
        );
    }

    #[test]
    fn decodes_standalone_bulk_gift_and_bits() {
        assert_eq!(
            decode(json!({ "type": "subMysteryGift", "message": [{ "name": "Alice", "amount": "5" }] })),
            Some(bulk(5))
        );
        assert_eq!(
            decode(json!({ "type": "bits", "message": [{ "amount": "250" }] })),
            Some(SupportEvent::Bits { amount: 250 })
        );
        assert_eq!(decode(json!({ "type": "donation", "message": [{ "amount": 5 }] })), None);
        assert_eq!(decode(json!({ "type": "bits" })), None);
    }

    #[test]
    fn tier_one_resub_adds_configured_seconds() {
        let event = SupportEvent::Subscription {
            tier: EventCategory::PrimeT1,
            resub: true,
        };
        let adjustment = adjustment_for(&event, &config()).unwrap();
        assert_eq!(adjustment.add_seconds, 300);
        assert_eq!(adjustment.add_subs, 1);
        assert_eq!(adjustment.add_bits, 0);
    }

    #[test]
    fn happy_hour_doubles_every_category() {
        let mut config = config();
        config.happy_hour = true;

        let event = SupportEvent::Subscription {
            tier: EventCategory::T3,
            resub: false,
        };
        assert_eq!(adjustment_for(&event, &config).unwrap().add_seconds, 1800);

        let adjustment = adjustment_for(&bulk(10), &config).unwrap();
        assert_eq!(adjustment.add_seconds, 300 * 2 * 10 + 100 * 2);
    }

    #[test]
    fn bulk_gift_bonus_only_on_exact_thresholds() {
        let config = config();
        for (count, bonus) in [(10, 100), (20, 200), (50, 500), (100, 1000), (15, 0)] {
            let adjustment = adjustment_for(&bulk(count), &config).unwrap();
            assert_eq!(adjustment.add_subs, count);
            assert_eq!(adjustment.add_seconds, 300 * count + bonus, "count {count}");
            assert_eq!(adjustment.debug.unwrap().bonus_seconds, bonus);
        }
    }

    #[test]
    fn bits_add_flat_seconds_and_count_amount() {
        let adjustment = adjustment_for(&SupportEvent::Bits { amount: 100 }, &config()).unwrap();
        assert_eq!(adjustment.add_seconds, 0);
        assert_eq!(adjustment.add_bits, 100);
        assert!(adjustment_for(&SupportEvent::Bits { amount: 0 }, &config()).is_none());
    }
}
