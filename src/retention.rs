use chrono::{DateTime, Utc};

use crate::config::SweepConfig;
use crate::resource::ResourceRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetainReason {
    Whitelisted,
    TooRecent,
    InUse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    Reclaimable,
    Retained(RetainReason),
}

pub fn is_whitelisted(record: &ResourceRecord, config: &SweepConfig) -> bool {
    let prefixed = config
        .whitelist_prefixes
        .iter()
        .filter(|prefix| !prefix.is_empty())
        .any(|prefix| record.id.starts_with(prefix.as_str()) || record.name.starts_with(prefix.as_str()));
    prefixed
        || config
            .whitelist_tag_keys
            .iter()
            .any(|key| record.tags.contains_key(key))
}

/// Records without a timestamp count as old enough.
pub fn is_old_enough(
    created_at: Option<DateTime<Utc>>,
    age_threshold_days: i64,
    now: DateTime<Utc>,
) -> bool {
    match created_at {
        Some(created_at) => now.signed_duration_since(created_at).num_days() >= age_threshold_days,
        None => true,
    }
}

pub fn evaluate(record: &ResourceRecord, config: &SweepConfig, now: DateTime<Utc>) -> Retention {
    if is_whitelisted(record, config) {
        return Retention::Retained(RetainReason::Whitelisted);
    }
    if !is_old_enough(record.created_at, config.age_threshold_days, now) {
        return Retention::Retained(RetainReason::TooRecent);
    }
    if record.detail.in_use() {
        return Retention::Retained(RetainReason::InUse);
    }
    Retention::Reclaimable
}

pub fn is_reclaimable(record: &ResourceRecord, config: &SweepConfig, now: DateTime<Utc>) -> bool {
    evaluate(record, config, now) == Retention::Reclaimable
}
