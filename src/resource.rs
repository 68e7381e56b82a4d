use std::collections::HashMap;
use std::fmt;

use bigdecimal::BigDecimal;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Serialize, Serializer};

/// Every kind of AWS resource the sweep knows how to reclaim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    BlockVolume,
    BlockSnapshot,
    StaticAddress,
    LoadBalancer,
    NatGateway,
    DatabaseSnapshot,
    MachineImage,
    RegistryImage,
    LogGroup,
    Bucket,
    SecurityGroup,
    FunctionVersion,
}

/// How a kind's monthly cost is estimated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceBasis {
    PerGigabyte(i64),
    PerUnit(i64),
    Free,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 12] = [
        ResourceKind::BlockVolume,
        ResourceKind::BlockSnapshot,
        ResourceKind::StaticAddress,
        ResourceKind::LoadBalancer,
        ResourceKind::NatGateway,
        ResourceKind::DatabaseSnapshot,
        ResourceKind::MachineImage,
        ResourceKind::RegistryImage,
        ResourceKind::LogGroup,
        ResourceKind::Bucket,
        ResourceKind::SecurityGroup,
        ResourceKind::FunctionVersion,
    ];

    /// Key used in the summary and the notification.
    pub fn key(self) -> &'static str {
        match self {
            ResourceKind::BlockVolume => "ebs_volumes",
            ResourceKind::BlockSnapshot => "ebs_snapshots",
            ResourceKind::StaticAddress => "elastic_ips",
            ResourceKind::LoadBalancer => "load_balancers",
            ResourceKind::NatGateway => "nat_gateways",
            ResourceKind::DatabaseSnapshot => "rds_snapshots",
            ResourceKind::MachineImage => "ami_images",
            ResourceKind::RegistryImage => "ecr_images",
            ResourceKind::LogGroup => "cloudwatch_logs",
            ResourceKind::Bucket => "s3_buckets",
            ResourceKind::SecurityGroup => "security_groups",
            ResourceKind::FunctionVersion => "lambda_versions",
        }
    }

    /// Environment variable that switches the kind on or off.
    pub fn enable_flag(self) -> &'static str {
        match self {
            ResourceKind::BlockVolume => "CLEAN_EBS_VOLUMES",
            ResourceKind::BlockSnapshot => "CLEAN_EBS_SNAPSHOTS",
            ResourceKind::StaticAddress => "CLEAN_ELASTIC_IPS",
            ResourceKind::LoadBalancer => "CLEAN_LOAD_BALANCERS",
            ResourceKind::NatGateway => "CLEAN_NAT_GATEWAYS",
            ResourceKind::DatabaseSnapshot => "CLEAN_RDS_SNAPSHOTS",
            ResourceKind::MachineImage => "CLEAN_AMI_IMAGES",
            ResourceKind::RegistryImage => "CLEAN_ECR_IMAGES",
            ResourceKind::LogGroup => "CLEAN_CLOUDWATCH_LOGS",
            ResourceKind::Bucket => "CLEAN_S3_BUCKETS",
            ResourceKind::SecurityGroup => "CLEAN_SECURITY_GROUPS",
            ResourceKind::FunctionVersion => "CLEAN_LAMBDA_FUNCTIONS",
        }
    }

    pub fn price_basis(self) -> PriceBasis {
        // cents per month
        match self {
            ResourceKind::BlockVolume => PriceBasis::PerGigabyte(10),
            ResourceKind::BlockSnapshot => PriceBasis::PerGigabyte(5),
            ResourceKind::StaticAddress => PriceBasis::PerUnit(360),
            ResourceKind::LoadBalancer => PriceBasis::PerUnit(2250),
            ResourceKind::NatGateway => PriceBasis::PerUnit(4500),
            ResourceKind::DatabaseSnapshot => PriceBasis::PerUnit(500),
            ResourceKind::MachineImage => PriceBasis::PerUnit(200),
            ResourceKind::RegistryImage
            | ResourceKind::LogGroup
            | ResourceKind::Bucket
            | ResourceKind::SecurityGroup
            | ResourceKind::FunctionVersion => PriceBasis::Free,
        }
    }
}

impl Serialize for ResourceKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.key())
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            ResourceKind::BlockVolume => "EBS volume",
            ResourceKind::BlockSnapshot => "EBS snapshot",
            ResourceKind::StaticAddress => "Elastic IP",
            ResourceKind::LoadBalancer => "load balancer",
            ResourceKind::NatGateway => "NAT gateway",
            ResourceKind::DatabaseSnapshot => "RDS snapshot",
            ResourceKind::MachineImage => "AMI",
            ResourceKind::RegistryImage => "ECR image",
            ResourceKind::LogGroup => "log group",
            ResourceKind::Bucket => "S3 bucket",
            ResourceKind::SecurityGroup => "security group",
            ResourceKind::FunctionVersion => "Lambda version",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseScope {
    Instance,
    Cluster,
}

/// Kind-specific state, including the occupancy signal.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceDetail {
    BlockVolume {
        attached: bool,
    },
    BlockSnapshot {
        image_backing: bool,
    },
    StaticAddress {
        allocation_id: Option<String>,
        public_ip: Option<String>,
        associated: bool,
    },
    LoadBalancer {
        registered_targets: usize,
    },
    NatGateway {
        state: String,
    },
    DatabaseSnapshot {
        scope: DatabaseScope,
    },
    MachineImage {
        backing_snapshots: Vec<String>,
    },
    RegistryImage {
        repository: String,
        digest: String,
        tags: Vec<String>,
        recency_rank: usize,
    },
    LogGroup {
        stream_count: usize,
    },
    Bucket {
        object_count: usize,
    },
    SecurityGroup {
        attached: bool,
        is_default: bool,
    },
    FunctionVersion {
        function: String,
        version: String,
        recency_rank: usize,
    },
}

pub const PROTECTED_IMAGE_TAGS: [&str; 4] = ["latest", "prod", "production", "stable"];
pub const RETAINED_REGISTRY_IMAGES: usize = 10;
pub const RETAINED_FUNCTION_VERSIONS: usize = 3;
pub const CURRENT_FUNCTION_VERSION: &str = "$LATEST";

impl ResourceDetail {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceDetail::BlockVolume { .. } => ResourceKind::BlockVolume,
            ResourceDetail::BlockSnapshot { .. } => ResourceKind::BlockSnapshot,
            ResourceDetail::StaticAddress { .. } => ResourceKind::StaticAddress,
            ResourceDetail::LoadBalancer { .. } => ResourceKind::LoadBalancer,
            ResourceDetail::NatGateway { .. } => ResourceKind::NatGateway,
            ResourceDetail::DatabaseSnapshot { .. } => ResourceKind::DatabaseSnapshot,
            ResourceDetail::MachineImage { .. } => ResourceKind::MachineImage,
            ResourceDetail::RegistryImage { .. } => ResourceKind::RegistryImage,
            ResourceDetail::LogGroup { .. } => ResourceKind::LogGroup,
            ResourceDetail::Bucket { .. } => ResourceKind::Bucket,
            ResourceDetail::SecurityGroup { .. } => ResourceKind::SecurityGroup,
            ResourceDetail::FunctionVersion { .. } => ResourceKind::FunctionVersion,
        }
    }

    /// Whether the resource is currently in active use.
    pub fn in_use(&self) -> bool {
        match self {
            ResourceDetail::BlockVolume { attached } => *attached,
            ResourceDetail::BlockSnapshot { image_backing } => *image_backing,
            ResourceDetail::StaticAddress { associated, .. } => *associated,
            ResourceDetail::LoadBalancer { registered_targets } => *registered_targets > 0,
            ResourceDetail::NatGateway { state } => state != "available",
            ResourceDetail::DatabaseSnapshot { .. } => false,
            ResourceDetail::MachineImage { .. } => false,
            ResourceDetail::RegistryImage {
                tags, recency_rank, ..
            } => {
                tags.iter()
                    .any(|tag| PROTECTED_IMAGE_TAGS.contains(&tag.as_str()))
                    || *recency_rank < RETAINED_REGISTRY_IMAGES
            }
            ResourceDetail::LogGroup { stream_count } => *stream_count > 0,
            ResourceDetail::Bucket { object_count } => *object_count > 0,
            ResourceDetail::SecurityGroup {
                attached,
                is_default,
            } => *attached || *is_default,
            ResourceDetail::FunctionVersion {
                version,
                recency_rank,
                ..
            } => version == CURRENT_FUNCTION_VERSION || *recency_rank < RETAINED_FUNCTION_VERSIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    pub id: String,
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub tags: HashMap<String, String>,
    pub size_gb: i64,
    pub detail: ResourceDetail,
}

impl ResourceRecord {
    pub fn new(id: impl Into<String>, detail: ResourceDetail) -> Self {
        let id = id.into();
        ResourceRecord {
            name: id.clone(),
            id,
            created_at: None,
            tags: HashMap::new(),
            size_gb: 0,
            detail,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn created_at(mut self, created_at: Option<DateTime<Utc>>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn tagged(mut self, tags: HashMap<String, String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn sized(mut self, size_gb: i64) -> Self {
        self.size_gb = size_gb;
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.detail.kind()
    }

    pub fn estimated_monthly_cost(&self) -> BigDecimal {
        let cents = match self.kind().price_basis() {
            PriceBasis::PerGigabyte(cents) => cents * self.size_gb.max(0),
            PriceBasis::PerUnit(cents) => cents,
            PriceBasis::Free => 0,
        };
        BigDecimal::from(cents) / BigDecimal::from(100)
    }
}

/// Outcome of listing one provider item.
#[derive(Debug, Clone, PartialEq)]
pub enum Listing {
    Record(ResourceRecord),
    Skipped { id: String, reason: String },
}

/// Parses the ISO-8601 variants AWS services return. Unparsable values
/// come back as `None` and fall under the fail-open age policy.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z")
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

pub fn from_epoch_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    from_epoch_millis((seconds * 1000.0) as i64)
}

pub fn tag_map<I>(tags: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (Option<String>, Option<String>)>,
{
    tags.into_iter()
        .filter_map(|(key, value)| key.map(|key| (key, value.unwrap_or_default())))
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::resource::{
        parse_timestamp, tag_map, ResourceDetail, ResourceKind, ResourceRecord,
    };
    use bigdecimal::BigDecimal;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_parse_timestamp_variants() {
        let expected = Utc.ymd(2020, 11, 30).and_hms(15, 0, 0);
        assert_eq!(parse_timestamp("2020-11-30T15:00:00.000Z"), Some(expected));
        assert_eq!(parse_timestamp("2020-11-30T15:00:00+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2020-11-30T15:00:00.000+0000"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_estimated_monthly_cost_per_gigabyte() {
        let volume = ResourceRecord::new("vol-1", ResourceDetail::BlockVolume { attached: false })
            .sized(80);
        assert_eq!(volume.estimated_monthly_cost(), BigDecimal::from(8));
    }

    #[test]
    fn test_estimated_monthly_cost_per_unit() {
        let address = ResourceRecord::new(
            "eipalloc-1",
            ResourceDetail::StaticAddress {
                allocation_id: Some("eipalloc-1".to_string()),
                public_ip: None,
                associated: false,
            },
        );
        assert_eq!(
            address.estimated_monthly_cost(),
            BigDecimal::from(360) / BigDecimal::from(100)
        );
    }

    #[test]
    fn test_registry_image_protected_tag_is_in_use() {
        let detail = ResourceDetail::RegistryImage {
            repository: "api".to_string(),
            digest: "sha256:1".to_string(),
            tags: vec!["latest".to_string()],
            recency_rank: 40,
        };
        assert!(detail.in_use());
        assert_eq!(detail.kind(), ResourceKind::RegistryImage);
    }

    #[test]
    fn test_function_version_current_alias_is_in_use() {
        let detail = ResourceDetail::FunctionVersion {
            function: "worker".to_string(),
            version: "$LATEST".to_string(),
            recency_rank: usize::MAX,
        };
        assert!(detail.in_use());
    }

    #[test]
    fn test_tag_map_drops_keyless_tags() {
        let tags = tag_map(vec![
            (Some("Name".to_string()), Some("keep-me".to_string())),
            (None, Some("orphan".to_string())),
            (Some("Team".to_string()), None),
        ]);
        assert_eq!(tags.len(), 2);
        assert_eq!(tags["Name"], "keep-me");
        assert_eq!(tags["Team"], "");
    }

    #[test]
    fn test_keys_are_unique() {
        let mut keys: Vec<&str> = ResourceKind::ALL.iter().map(|kind| kind.key()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), ResourceKind::ALL.len());
    }

    #[test]
    fn test_kind_serializes_as_key() {
        for kind in ResourceKind::ALL.iter() {
            assert_eq!(serde_json::to_value(kind).unwrap(), kind.key());
        }
    }
}
