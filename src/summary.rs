use std::collections::BTreeMap;

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Utc};
use serde::ser::Error;
use serde::{Serialize, Serializer};

use crate::resource::ResourceKind;

/// Accumulator for one sweep invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepSummary {
    pub timestamp: DateTime<Utc>,
    pub dry_run: bool,
    pub region: String,
    pub resources_found: BTreeMap<ResourceKind, usize>,
    pub resources_deleted: BTreeMap<ResourceKind, usize>,
    #[serde(serialize_with = "serialize_savings")]
    pub estimated_monthly_savings: BigDecimal,
    pub errors: Vec<String>,
}

impl SweepSummary {
    pub fn new(timestamp: DateTime<Utc>, dry_run: bool, region: &str) -> Self {
        SweepSummary {
            timestamp,
            dry_run,
            region: region.to_string(),
            resources_found: BTreeMap::new(),
            resources_deleted: BTreeMap::new(),
            estimated_monthly_savings: BigDecimal::from(0),
            errors: vec![],
        }
    }

    pub fn record_kind(&mut self, kind: ResourceKind, found: usize, deleted: usize) {
        self.resources_found.insert(kind, found);
        self.resources_deleted.insert(kind, deleted);
    }

    pub fn add_savings(&mut self, amount: BigDecimal) {
        self.estimated_monthly_savings = &self.estimated_monthly_savings + amount;
    }

    pub fn push_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn found(&self, kind: ResourceKind) -> usize {
        self.resources_found.get(&kind).copied().unwrap_or(0)
    }

    pub fn deleted(&self, kind: ResourceKind) -> usize {
        self.resources_deleted.get(&kind).copied().unwrap_or(0)
    }

    pub fn savings_as_f64(&self) -> f64 {
        self.estimated_monthly_savings.to_f64().unwrap_or(0.0)
    }
}

/// Half-up rounding to two decimals. Savings are never negative.
fn round_to_cents(amount: &BigDecimal) -> BigDecimal {
    let half = BigDecimal::from(1) / BigDecimal::from(2);
    let cents = (amount.clone() * BigDecimal::from(100) + half).with_scale(0);
    cents / BigDecimal::from(100)
}

fn serialize_savings<S>(savings: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let value = round_to_cents(savings)
        .to_f64()
        .ok_or_else(|| S::Error::custom("savings do not fit in f64"))?;
    serializer.serialize_f64(value)
}

#[cfg(test)]
mod tests {
    use crate::resource::ResourceKind;
    use crate::summary::{round_to_cents, SweepSummary};
    use bigdecimal::BigDecimal;
    use chrono::{DateTime, Utc};
    use std::str::FromStr;

    #[test]
    fn test_serialize_summary() {
        let timestamp = DateTime::<Utc>::from_str("2021-01-12T00:00:00Z").unwrap();
        let mut summary = SweepSummary::new(timestamp, true, "ap-northeast-2");
        summary.record_kind(ResourceKind::BlockVolume, 2, 0);
        summary.add_savings(BigDecimal::from(1250) / BigDecimal::from(100));
        summary.push_error("NAT gateway cleanup error: throttled".to_string());

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["dry_run"], true);
        assert_eq!(value["resources_found"]["ebs_volumes"], 2);
        assert_eq!(value["resources_deleted"]["ebs_volumes"], 0);
        assert_eq!(value["estimated_monthly_savings"], 12.5);
        assert_eq!(value["errors"][0], "NAT gateway cleanup error: throttled");
    }

    #[test]
    fn test_unrecorded_kind_counts_zero() {
        let summary = SweepSummary::new(Utc::now(), false, "us-east-1");
        assert_eq!(summary.found(ResourceKind::Bucket), 0);
        assert_eq!(summary.deleted(ResourceKind::Bucket), 0);
        assert_eq!(summary.savings_as_f64(), 0.0);
    }

    #[test]
    fn test_savings_round_half_up() {
        let amount = BigDecimal::from(12345) / BigDecimal::from(1000);
        assert_eq!(round_to_cents(&amount), BigDecimal::from(1235) / BigDecimal::from(100));
        let amount = BigDecimal::from(12344) / BigDecimal::from(1000);
        assert_eq!(round_to_cents(&amount), BigDecimal::from(1234) / BigDecimal::from(100));

        let mut summary = SweepSummary::new(Utc::now(), true, "us-east-1");
        summary.add_savings(BigDecimal::from(12345) / BigDecimal::from(1000));
        let value = serde_json::to_value(&summary).unwrap();
        let savings = value["estimated_monthly_savings"].as_f64().unwrap();
        assert!((savings - 12.35).abs() < 1e-9);
    }
}
