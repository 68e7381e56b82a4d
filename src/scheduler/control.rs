use async_trait::async_trait;
use rusoto_autoscaling::{
    AutoScalingGroupNamesType, Autoscaling, AutoscalingClient, CreateOrUpdateTagsType, Tag,
    UpdateAutoScalingGroupType,
};
use rusoto_ec2::{
    Ec2, Ec2Client, InstanceStateChange, StartInstancesRequest, StopInstancesRequest,
};
use rusoto_rds::{
    DescribeDBClustersMessage, Filter, Rds, RdsClient, StartDBClusterMessage,
    StartDBInstanceMessage, StopDBClusterMessage, StopDBInstanceMessage,
};
use serde::Serialize;

use crate::error::SweeperError;
use crate::resource::DatabaseScope;

pub const SAVED_CAPACITY_TAG: &str = "ScheduledDesiredCapacity";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceTransition {
    pub instance_id: String,
    pub previous_state: String,
    pub current_state: String,
}

/// The parts of an auto-scaling group the scheduler reads.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingGroup {
    pub desired_capacity: i64,
    pub saved_capacity: Option<String>,
}

#[async_trait]
pub trait InstanceControl: Send + Sync {
    async fn start(&self, instance_ids: &[String]) -> Result<Vec<InstanceTransition>, SweeperError>;
    async fn stop(&self, instance_ids: &[String]) -> Result<Vec<InstanceTransition>, SweeperError>;
}

#[async_trait]
pub trait DatabaseControl: Send + Sync {
    async fn scope(&self, identifier: &str) -> Result<DatabaseScope, SweeperError>;
    async fn start(&self, identifier: &str, scope: DatabaseScope) -> Result<(), SweeperError>;
    async fn stop(&self, identifier: &str, scope: DatabaseScope) -> Result<(), SweeperError>;
}

#[async_trait]
pub trait ScalingGroupControl: Send + Sync {
    async fn describe(&self, name: &str) -> Result<Option<ScalingGroup>, SweeperError>;
    async fn save_capacity(&self, name: &str, capacity: i64) -> Result<(), SweeperError>;
    async fn resize(&self, name: &str, min_size: i64, desired_capacity: i64)
        -> Result<(), SweeperError>;
}

fn transition(change: InstanceStateChange) -> Result<InstanceTransition, SweeperError> {
    let state_name = |state: Option<rusoto_ec2::InstanceState>| {
        state.and_then(|state| state.name).unwrap_or_default()
    };
    Ok(InstanceTransition {
        instance_id: change
            .instance_id
            .ok_or(SweeperError::MissingField("instanceId"))?,
        previous_state: state_name(change.previous_state),
        current_state: state_name(change.current_state),
    })
}

pub struct Ec2InstanceControl {
    client: Ec2Client,
}

impl Ec2InstanceControl {
    pub fn new_with_client(client: Ec2Client) -> Self {
        Ec2InstanceControl { client }
    }
}

#[async_trait]
impl InstanceControl for Ec2InstanceControl {
    async fn start(&self, instance_ids: &[String]) -> Result<Vec<InstanceTransition>, SweeperError> {
        let result = self
            .client
            .start_instances(StartInstancesRequest {
                instance_ids: instance_ids.to_vec(),
                ..Default::default()
            })
            .await
            .map_err(|error| SweeperError::provider("StartInstances", error))?;
        result
            .starting_instances
            .unwrap_or_default()
            .into_iter()
            .map(transition)
            .collect()
    }

    async fn stop(&self, instance_ids: &[String]) -> Result<Vec<InstanceTransition>, SweeperError> {
        let result = self
            .client
            .stop_instances(StopInstancesRequest {
                instance_ids: instance_ids.to_vec(),
                ..Default::default()
            })
            .await
            .map_err(|error| SweeperError::provider("StopInstances", error))?;
        result
            .stopping_instances
            .unwrap_or_default()
            .into_iter()
            .map(transition)
            .collect()
    }
}

pub struct RdsDatabaseControl {
    client: RdsClient,
}

impl RdsDatabaseControl {
    pub fn new_with_client(client: RdsClient) -> Self {
        RdsDatabaseControl { client }
    }
}

#[async_trait]
impl DatabaseControl for RdsDatabaseControl {
    /// A filtered describe answers with an empty list instead of a not-found fault.
    async fn scope(&self, identifier: &str) -> Result<DatabaseScope, SweeperError> {
        let result = self
            .client
            .describe_db_clusters(DescribeDBClustersMessage {
                filters: Some(vec![Filter {
                    name: "db-cluster-id".to_string(),
                    values: vec![identifier.to_string()],
                }]),
                ..Default::default()
            })
            .await
            .map_err(|error| SweeperError::provider("DescribeDBClusters", error))?;
        if result.db_clusters.map_or(false, |clusters| !clusters.is_empty()) {
            Ok(DatabaseScope::Cluster)
        } else {
            Ok(DatabaseScope::Instance)
        }
    }

    async fn start(&self, identifier: &str, scope: DatabaseScope) -> Result<(), SweeperError> {
        match scope {
            DatabaseScope::Cluster => self
                .client
                .start_db_cluster(StartDBClusterMessage {
                    db_cluster_identifier: identifier.to_string(),
                    ..Default::default()
                })
                .await
                .map(|_| ())
                .map_err(|error| SweeperError::provider("StartDBCluster", error)),
            DatabaseScope::Instance => self
                .client
                .start_db_instance(StartDBInstanceMessage {
                    db_instance_identifier: identifier.to_string(),
                    ..Default::default()
                })
                .await
                .map(|_| ())
                .map_err(|error| SweeperError::provider("StartDBInstance", error)),
        }
    }

    async fn stop(&self, identifier: &str, scope: DatabaseScope) -> Result<(), SweeperError> {
        match scope {
            DatabaseScope::Cluster => self
                .client
                .stop_db_cluster(StopDBClusterMessage {
                    db_cluster_identifier: identifier.to_string(),
                    ..Default::default()
                })
                .await
                .map(|_| ())
                .map_err(|error| SweeperError::provider("StopDBCluster", error)),
            DatabaseScope::Instance => self
                .client
                .stop_db_instance(StopDBInstanceMessage {
                    db_instance_identifier: identifier.to_string(),
                    ..Default::default()
                })
                .await
                .map(|_| ())
                .map_err(|error| SweeperError::provider("StopDBInstance", error)),
        }
    }
}

pub struct ScalingGroupClient {
    client: AutoscalingClient,
}

impl ScalingGroupClient {
    pub fn new_with_client(client: AutoscalingClient) -> Self {
        ScalingGroupClient { client }
    }
}

#[async_trait]
impl ScalingGroupControl for ScalingGroupClient {
    async fn describe(&self, name: &str) -> Result<Option<ScalingGroup>, SweeperError> {
        let result = self
            .client
            .describe_auto_scaling_groups(AutoScalingGroupNamesType {
                auto_scaling_group_names: Some(vec![name.to_string()]),
                ..Default::default()
            })
            .await
            .map_err(|error| SweeperError::provider("DescribeAutoScalingGroups", error))?;

        Ok(result.auto_scaling_groups.into_iter().next().map(|group| {
            let saved_capacity = group
                .tags
                .unwrap_or_default()
                .into_iter()
                .find(|tag| tag.key.as_deref() == Some(SAVED_CAPACITY_TAG))
                .and_then(|tag| tag.value);
            ScalingGroup {
                desired_capacity: group.desired_capacity,
                saved_capacity,
            }
        }))
    }

    async fn save_capacity(&self, name: &str, capacity: i64) -> Result<(), SweeperError> {
        self.client
            .create_or_update_tags(CreateOrUpdateTagsType {
                tags: vec![Tag {
                    key: SAVED_CAPACITY_TAG.to_string(),
                    value: Some(capacity.to_string()),
                    resource_id: Some(name.to_string()),
                    resource_type: Some("auto-scaling-group".to_string()),
                    propagate_at_launch: Some(false),
                }],
                ..Default::default()
            })
            .await
            .map_err(|error| SweeperError::provider("CreateOrUpdateTags", error))
    }

    async fn resize(
        &self,
        name: &str,
        min_size: i64,
        desired_capacity: i64,
    ) -> Result<(), SweeperError> {
        self.client
            .update_auto_scaling_group(UpdateAutoScalingGroupType {
                auto_scaling_group_name: name.to_string(),
                min_size: Some(min_size),
                desired_capacity: Some(desired_capacity),
                ..Default::default()
            })
            .await
            .map_err(|error| SweeperError::provider("UpdateAutoScalingGroup", error))
    }
}
