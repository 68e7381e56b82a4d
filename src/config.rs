use std::collections::BTreeSet;
use std::env;
use std::str::FromStr;

use rusoto_core::Region;

use crate::error::SweeperError;
use crate::resource::ResourceKind;

pub const DEFAULT_REGION: &str = "ap-northeast-2";
pub const DEFAULT_AGE_THRESHOLD_DAYS: i64 = 30;

/// Process-wide sweep settings, fixed for the lifetime of a cold start.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    pub dry_run: bool,
    pub age_threshold_days: i64,
    pub enabled_kinds: BTreeSet<ResourceKind>,
    pub whitelist_tag_keys: Vec<String>,
    pub whitelist_prefixes: Vec<String>,
    pub region: Region,
    pub notification_topic: Option<String>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            age_threshold_days: DEFAULT_AGE_THRESHOLD_DAYS,
            enabled_kinds: ResourceKind::ALL.iter().copied().collect(),
            whitelist_tag_keys: vec![],
            whitelist_prefixes: vec![],
            region: Region::ApNortheast2,
            notification_topic: None,
        }
    }
}

impl SweepConfig {
    pub fn from_env() -> Result<Self, SweeperError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, SweeperError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dry_run = parse_flag("DRY_RUN", lookup("DRY_RUN"), true)?;

        let age_threshold_days = match lookup("AGE_THRESHOLD_DAYS") {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|days| *days >= 0)
                .ok_or_else(|| SweeperError::invalid_config("AGE_THRESHOLD_DAYS", &raw))?,
            None => DEFAULT_AGE_THRESHOLD_DAYS,
        };

        let mut enabled_kinds = BTreeSet::new();
        for kind in ResourceKind::ALL.iter() {
            let flag = kind.enable_flag();
            if parse_flag(flag, lookup(flag), true)? {
                enabled_kinds.insert(*kind);
            }
        }

        let region_name = lookup("REGION").unwrap_or_else(|| DEFAULT_REGION.to_string());
        let region = Region::from_str(region_name.trim())
            .map_err(|_| SweeperError::invalid_config("REGION", &region_name))?;

        Ok(SweepConfig {
            dry_run,
            age_threshold_days,
            enabled_kinds,
            whitelist_tag_keys: split_list(lookup("WHITELIST_TAGS")),
            whitelist_prefixes: split_list(lookup("WHITELIST_PREFIXES")),
            region,
            notification_topic: lookup("SNS_TOPIC_ARN")
                .map(|topic| topic.trim().to_string())
                .filter(|topic| !topic.is_empty()),
        })
    }

    pub fn is_enabled(&self, kind: ResourceKind) -> bool {
        self.enabled_kinds.contains(&kind)
    }
}

pub(crate) fn parse_flag(
    key: &str,
    raw: Option<String>,
    default: bool,
) -> Result<bool, SweeperError> {
    let raw = match raw {
        Some(raw) => raw,
        None => return Ok(default),
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(SweeperError::invalid_config(key, &raw)),
    }
}

pub(crate) fn split_list(raw: Option<String>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use crate::config::SweepConfig;
    use crate::error::SweeperError;
    use crate::resource::ResourceKind;
    use rusoto_core::Region;

    #[test]
    fn test_defaults_without_environment() {
        let config = SweepConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, SweepConfig::default());
        assert!(config.dry_run);
        assert_eq!(config.enabled_kinds.len(), 12);
    }

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            vec![
                ("DRY_RUN", Some("False")),
                ("AGE_THRESHOLD_DAYS", Some("45")),
                ("CLEAN_S3_BUCKETS", Some("false")),
                ("WHITELIST_TAGS", Some("Name, keep,,")),
                ("WHITELIST_PREFIXES", Some("prod-")),
                ("REGION", Some("us-east-1")),
                ("SNS_TOPIC_ARN", Some("arn:aws:sns:us-east-1:123456789012:cleanup")),
            ],
            || {
                let config = SweepConfig::from_env().unwrap();
                assert!(!config.dry_run);
                assert_eq!(config.age_threshold_days, 45);
                assert!(!config.is_enabled(ResourceKind::Bucket));
                assert!(config.is_enabled(ResourceKind::BlockVolume));
                assert_eq!(config.whitelist_tag_keys, vec!["Name", "keep"]);
                assert_eq!(config.whitelist_prefixes, vec!["prod-"]);
                assert_eq!(config.region, Region::UsEast1);
                assert_eq!(
                    config.notification_topic.as_deref(),
                    Some("arn:aws:sns:us-east-1:123456789012:cleanup")
                );
            },
        );
    }

    #[test]
    fn test_misspelled_dry_run_is_rejected() {
        let result = SweepConfig::from_lookup(|key| match key {
            "DRY_RUN" => Some("flase".to_string()),
            _ => None,
        });
        assert_eq!(
            result.err().unwrap(),
            SweeperError::invalid_config("DRY_RUN", "flase")
        );
    }

    #[test]
    fn test_negative_age_threshold_is_rejected() {
        let result = SweepConfig::from_lookup(|key| match key {
            "AGE_THRESHOLD_DAYS" => Some("-3".to_string()),
            _ => None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_blank_topic_disables_notification() {
        let config = SweepConfig::from_lookup(|key| match key {
            "SNS_TOPIC_ARN" => Some("  ".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.notification_topic, None);
    }
}
