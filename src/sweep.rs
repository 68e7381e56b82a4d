//! Runs every enabled [`ResourceSource`] in turn and accumulates a
//! [`SweepSummary`].
//!
//! Nothing raised by a single kind stops the sweep: a failed listing aborts
//! that kind only, and a failed reclaim is recorded against that record.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::SweepConfig;
use crate::error::SweeperError;
use crate::notifier::Notifier;
use crate::report;
use crate::resource::Listing;
use crate::retention::{evaluate, Retention};
use crate::sources::ResourceSource;
use crate::summary::SweepSummary;

async fn sweep_kind(
    source: &dyn ResourceSource,
    config: &SweepConfig,
    now: DateTime<Utc>,
    summary: &mut SweepSummary,
) -> Result<(), SweeperError> {
    let kind = source.kind();
    let listings = source.list().await?;

    let mut found = 0;
    let mut deleted = 0;
    let mut savings = BigDecimal::from(0);
    for listing in listings {
        let record = match listing {
            Listing::Record(record) => record,
            Listing::Skipped { id, reason } => {
                warn!(event = "sweep.record.skipped", kind = kind.key(), id = %id, reason = %reason);
                continue;
            }
        };

        if let Retention::Retained(reason) = evaluate(&record, config, now) {
            debug!(event = "sweep.record.retained", kind = kind.key(), id = %record.id, reason = ?reason);
            continue;
        }

        found += 1;
        savings = savings + record.estimated_monthly_cost();
        if config.dry_run {
            info!(event = "sweep.record.reclaimable", kind = kind.key(), id = %record.id);
            continue;
        }

        match source.reclaim(&record).await {
            Ok(()) => {
                deleted += 1;
                info!(event = "sweep.record.reclaimed", kind = kind.key(), id = %record.id);
            }
            Err(error) => {
                warn!(event = "sweep.record.reclaim_failed", kind = kind.key(), id = %record.id, error = %error);
                summary.push_error(format!("Failed to delete {} {}: {}", kind, record.id, error));
            }
        }
    }

    summary.record_kind(kind, found, deleted);
    summary.add_savings(savings);
    Ok(())
}

/// Sweeps the enabled kinds, notifies if a notifier is configured and
/// returns the finished summary.
pub async fn run_sweep(
    config: &SweepConfig,
    sources: &[Box<dyn ResourceSource>],
    notifier: Option<&dyn Notifier>,
    now: DateTime<Utc>,
) -> SweepSummary {
    info!(
        event = "sweep.started",
        dry_run = config.dry_run,
        region = config.region.name(),
        age_threshold_days = config.age_threshold_days
    );

    let mut summary = SweepSummary::new(now, config.dry_run, config.region.name());
    for source in sources.iter().filter(|source| config.is_enabled(source.kind())) {
        let kind = source.kind();
        if let Err(error) = sweep_kind(source.as_ref(), config, now, &mut summary).await {
            error!(event = "sweep.kind.failed", kind = kind.key(), error = %error);
            summary.push_error(format!("{} cleanup error: {}", kind, error));
        }
    }

    if let Some(notifier) = notifier {
        let report = report::render(&summary);
        match notifier.publish(&report.subject, &report.message).await {
            Ok(()) => info!(event = "sweep.notification.sent", subject = %report.subject),
            Err(error) => warn!(event = "sweep.notification.failed", error = %error),
        }
    }

    match serde_json::to_string(&summary) {
        Ok(serialized) => info!(event = "sweep.completed", summary = %serialized),
        Err(error) => warn!(event = "sweep.completed", error = %error),
    }
    summary
}

#[cfg(test)]
mod tests {
    use crate::config::SweepConfig;
    use crate::error::SweeperError;
    use crate::notifier::Notifier;
    use crate::resource::{Listing, ResourceDetail, ResourceKind, ResourceRecord};
    use crate::sources::ResourceSource;
    use crate::summary::SweepSummary;
    use crate::sweep::run_sweep;
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;
    use chrono::{DateTime, Duration, Utc};
    use std::collections::{BTreeSet, HashMap};
    use std::str::FromStr;
    use std::sync::Mutex;

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::from_str("2021-01-12T00:00:00Z").unwrap()
    }

    struct FakeSource {
        kind: ResourceKind,
        listings: Vec<Listing>,
        list_error: bool,
        failing: Vec<String>,
        reclaimed: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn new(kind: ResourceKind, records: Vec<ResourceRecord>) -> Self {
            FakeSource {
                kind,
                listings: records.into_iter().map(Listing::Record).collect(),
                list_error: false,
                failing: vec![],
                reclaimed: Mutex::new(vec![]),
            }
        }

        fn broken(kind: ResourceKind) -> Self {
            FakeSource {
                list_error: true,
                ..FakeSource::new(kind, vec![])
            }
        }
    }

    #[async_trait]
    impl ResourceSource for FakeSource {
        fn kind(&self) -> ResourceKind {
            self.kind
        }

        async fn list(&self) -> Result<Vec<Listing>, SweeperError> {
            if self.list_error {
                return Err(SweeperError::provider("Describe", "Throttling: Rate exceeded"));
            }
            Ok(self.listings.clone())
        }

        async fn reclaim(&self, record: &ResourceRecord) -> Result<(), SweeperError> {
            if self.failing.contains(&record.id) {
                return Err(SweeperError::provider("Delete", "DependencyViolation"));
            }
            self.reclaimed.lock().unwrap().push(record.id.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        fail: bool,
        published: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn publish(&self, subject: &str, message: &str) -> Result<(), SweeperError> {
            if self.fail {
                return Err(SweeperError::provider("Publish", "AuthorizationError"));
            }
            self.published
                .lock()
                .unwrap()
                .push((subject.to_string(), message.to_string()));
            Ok(())
        }
    }

    fn volume(id: &str, age_days: i64, size_gb: i64) -> ResourceRecord {
        ResourceRecord::new(id, ResourceDetail::BlockVolume { attached: false })
            .created_at(Some(now() - Duration::days(age_days)))
            .sized(size_gb)
    }

    fn address(id: &str) -> ResourceRecord {
        ResourceRecord::new(
            id,
            ResourceDetail::StaticAddress {
                allocation_id: Some(id.to_string()),
                public_ip: None,
                associated: false,
            },
        )
    }

    fn boxed(sources: Vec<FakeSource>) -> Vec<Box<dyn ResourceSource>> {
        sources
            .into_iter()
            .map(|source| Box::new(source) as Box<dyn ResourceSource>)
            .collect()
    }

    fn active() -> SweepConfig {
        SweepConfig {
            dry_run: false,
            ..SweepConfig::default()
        }
    }

    #[tokio::test]
    async fn test_dry_run_counts_without_deleting() {
        let sources = vec![FakeSource::new(
            ResourceKind::BlockVolume,
            vec![volume("vol-old", 90, 100), volume("vol-new", 2, 100)],
        )];
        let sources = boxed(sources);

        let summary = run_sweep(&SweepConfig::default(), &sources, None, now()).await;

        assert_eq!(summary.found(ResourceKind::BlockVolume), 1);
        assert_eq!(summary.deleted(ResourceKind::BlockVolume), 0);
        assert_eq!(summary.estimated_monthly_savings, BigDecimal::from(10));
        assert!(summary.errors.is_empty());
    }

    #[tokio::test]
    async fn test_whitelisted_volume_is_not_counted() {
        let mut tags = HashMap::new();
        tags.insert("Name".to_string(), "keep-me".to_string());
        let sources = boxed(vec![FakeSource::new(
            ResourceKind::BlockVolume,
            vec![volume("vol-keep", 500, 8).tagged(tags)],
        )]);
        let config = SweepConfig {
            whitelist_tag_keys: vec!["Name".to_string()],
            ..SweepConfig::default()
        };

        let summary = run_sweep(&config, &sources, None, now()).await;

        assert_eq!(summary.found(ResourceKind::BlockVolume), 0);
    }

    #[tokio::test]
    async fn test_active_run_reclaims_and_records_failures() {
        let mut source = FakeSource::new(
            ResourceKind::BlockVolume,
            vec![volume("vol-1", 90, 10), volume("vol-2", 90, 10), volume("vol-3", 90, 10)],
        );
        source.failing = vec!["vol-2".to_string()];
        let sources = boxed(vec![source]);

        let summary = run_sweep(&active(), &sources, None, now()).await;

        assert_eq!(summary.found(ResourceKind::BlockVolume), 3);
        assert_eq!(summary.deleted(ResourceKind::BlockVolume), 2);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].starts_with("Failed to delete EBS volume vol-2"));
    }

    #[tokio::test]
    async fn test_list_failure_aborts_only_that_kind() {
        let sources = boxed(vec![
            FakeSource::broken(ResourceKind::NatGateway),
            FakeSource::new(ResourceKind::StaticAddress, vec![address("eipalloc-1")]),
        ]);

        let summary = run_sweep(&active(), &sources, None, now()).await;

        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].starts_with("NAT gateway cleanup error"));
        assert_eq!(summary.found(ResourceKind::StaticAddress), 1);
        assert_eq!(summary.deleted(ResourceKind::StaticAddress), 1);
        assert_eq!(
            summary.estimated_monthly_savings,
            BigDecimal::from(360) / BigDecimal::from(100)
        );
    }

    #[tokio::test]
    async fn test_disabled_kind_is_not_listed() {
        let sources = boxed(vec![FakeSource::broken(ResourceKind::Bucket)]);
        let config = SweepConfig {
            enabled_kinds: BTreeSet::new(),
            ..SweepConfig::default()
        };

        let summary = run_sweep(&config, &sources, None, now()).await;

        assert!(summary.errors.is_empty());
        assert!(summary.resources_found.is_empty());
    }

    #[tokio::test]
    async fn test_skipped_listing_is_not_an_error() {
        let mut source = FakeSource::new(ResourceKind::Bucket, vec![]);
        source.listings = vec![Listing::Skipped {
            id: "eu-logs".to_string(),
            reason: "PermanentRedirect".to_string(),
        }];
        let sources = boxed(vec![source]);

        let summary = run_sweep(&active(), &sources, None, now()).await;

        assert!(summary.errors.is_empty());
        assert_eq!(summary.found(ResourceKind::Bucket), 0);
    }

    #[tokio::test]
    async fn test_repeated_dry_run_is_identical() {
        let sources = boxed(vec![
            FakeSource::new(ResourceKind::BlockVolume, vec![volume("vol-1", 90, 10)]),
            FakeSource::new(ResourceKind::StaticAddress, vec![address("eipalloc-1")]),
        ]);
        let config = SweepConfig::default();

        let first: SweepSummary = run_sweep(&config, &sources, None, now()).await;
        let mut second = run_sweep(&config, &sources, None, now() + Duration::hours(1)).await;
        second.timestamp = first.timestamp;

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_notification_is_published() {
        let sources = boxed(vec![FakeSource::new(
            ResourceKind::BlockVolume,
            vec![volume("vol-1", 90, 10)],
        )]);
        let notifier = RecordingNotifier::default();

        run_sweep(&SweepConfig::default(), &sources, Some(&notifier), now()).await;

        let published = notifier.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "AWS Cleanup Report - DRY RUN");
        assert!(published[0].1.contains("Ebs Volumes: 1"));
    }

    #[tokio::test]
    async fn test_notification_failure_is_not_raised() {
        let sources = boxed(vec![FakeSource::new(
            ResourceKind::BlockVolume,
            vec![volume("vol-1", 90, 10)],
        )]);
        let notifier = RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        };

        let summary = run_sweep(&SweepConfig::default(), &sources, Some(&notifier), now()).await;

        assert_eq!(summary.found(ResourceKind::BlockVolume), 1);
        assert!(summary.errors.is_empty());
    }
}
