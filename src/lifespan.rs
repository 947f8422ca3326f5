/// Lifespan math: expiry, remaining time and staleness
use serde::{Deserialize, Serialize};

use crate::item::{Item, Timestamp};

pub const DEFAULT_LIFESPAN_DAYS: u32 = 30;

pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StalenessTier {
    Fresh,
    Aging,
    Stale,
    Expired,
}

/// Saturates at the ends of the timestamp range; `createdAt` comes from
/// imported data and is not trusted.
pub fn calculate_expires_at(created_at: Timestamp, lifespan_days: u32) -> Timestamp {
    created_at.saturating_add(i64::from(lifespan_days).saturating_mul(DAY_MS))
}

/// `later - earlier` without overflow
fn span(later: Timestamp, earlier: Timestamp) -> i128 {
    i128::from(later) - i128::from(earlier)
}

fn lifespan_of(item: &Item) -> u32 {
    item.lifespan_days.unwrap_or(DEFAULT_LIFESPAN_DAYS)
}

/// Whole days until expiry, rounded up; negative once expired
pub fn remaining_days(item: &Item, now: Timestamp) -> i64 {
    match item.expires_at {
        Some(expires_at) => (span(expires_at, now) as f64 / DAY_MS as f64).ceil() as i64,
        None => i64::from(DEFAULT_LIFESPAN_DAYS),
    }
}

/// Share of the lifespan already used, clamped to 0..=100
pub fn progress_percent(item: &Item, now: Timestamp) -> f64 {
    let total = i64::from(lifespan_of(item)) * DAY_MS;
    if total == 0 {
        return 100.0;
    }
    let elapsed = span(now, item.created_at);
    (elapsed as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

pub fn is_expired(item: &Item, now: Timestamp) -> bool {
    item.expires_at.is_some_and(|expires_at| now > expires_at)
}

/// Tier boundaries sit at exactly 50, 80 and 100 percent of the lifespan.
/// Compared in integer milliseconds so the edges are not blurred by rounding.
pub fn staleness_tier(item: &Item, now: Timestamp) -> StalenessTier {
    let total = i128::from(lifespan_of(item)) * i128::from(DAY_MS);
    let elapsed = span(now, item.created_at);
    let scaled = elapsed * 100;

    if scaled >= total * 100 {
        StalenessTier::Expired
    } else if scaled >= total * 80 {
        StalenessTier::Stale
    } else if scaled >= total * 50 {
        StalenessTier::Aging
    } else {
        StalenessTier::Fresh
    }
}

/// Add `extra_days` to the lifespan. Expiry is recomputed from the creation
/// time, so extensions compose additively.
pub fn extend_lifespan(item: &mut Item, extra_days: u32) {
    let lifespan_days = lifespan_of(item).saturating_add(extra_days);
    item.lifespan_days = Some(lifespan_days);
    item.expires_at = Some(calculate_expires_at(item.created_at, lifespan_days));
}

/// Everything the UI shows about an item's remaining life
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifespanReport {
    pub remaining_days: i64,
    pub progress_percent: f64,
    pub tier: StalenessTier,
    pub expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LifespanReport {
    pub fn for_item(item: &Item, now: Timestamp) -> LifespanReport {
        LifespanReport {
            remaining_days: remaining_days(item, now),
            progress_percent: progress_percent(item, now),
            tier: staleness_tier(item, now),
            expired: is_expired(item, now),
            message: staleness_message(item, now),
        }
    }
}

const EXPIRED_MESSAGES: &[&str] = &[
    "This link has expired. Time to let it go?",
    "Expired! Either read it now or set it free.",
    "This tab has left the building. Archive time?",
    "It's been too long. This one's ready for the archive.",
];

const STALE_MESSAGES: &[&str] = &[
    "Only {days} days left! Will you actually read this?",
    "{days} days remaining. Time's ticking...",
    "Getting crusty! {days} days until this expires.",
    "Tick tock! {days} days before this disappears.",
];

const AGING_MESSAGES: &[&str] = &[
    "{days} days left. Maybe give it a read?",
    "Half-life reached. {days} days to go.",
    "Getting older... {days} days remain.",
];

/// A light-hearted nudge for items past the fresh tier
pub fn staleness_message(item: &Item, now: Timestamp) -> Option<String> {
    let pool = match staleness_tier(item, now) {
        StalenessTier::Fresh => return None,
        StalenessTier::Aging => AGING_MESSAGES,
        StalenessTier::Stale => STALE_MESSAGES,
        StalenessTier::Expired => EXPIRED_MESSAGES,
    };
    let days = remaining_days(item, now);
    Some(pool[random_index(pool.len())].replace("{days}", &days.to_string()))
}

fn random_index(len: usize) -> usize {
    let mut buf = [0u8; 4];
    if getrandom::getrandom(&mut buf).is_err() {
        return 0;
    }
    u32::from_le_bytes(buf) as usize % len
}
