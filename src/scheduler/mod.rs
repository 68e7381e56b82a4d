//! Office-hours scheduling: starts or stops a fixed set of compute
//! instances, databases and auto-scaling groups.

use std::env;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::SweeperError;
use crate::resource::DatabaseScope;

pub mod control;

use control::{DatabaseControl, InstanceControl, InstanceTransition, ScalingGroupControl};

pub const DEFAULT_DESIRED_CAPACITY: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleAction {
    Start,
    Stop,
}

impl ScheduleAction {
    /// Anything other than `start` stops.
    pub fn from_event(event: &Value) -> Self {
        match event.get("action").and_then(Value::as_str) {
            Some(action) if action.eq_ignore_ascii_case("start") => ScheduleAction::Start,
            _ => ScheduleAction::Stop,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleTargets {
    pub instances: Vec<String>,
    pub databases: Vec<String>,
    pub scaling_groups: Vec<String>,
}

fn parse_targets(key: &str, raw: Option<String>) -> Result<Vec<String>, SweeperError> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => serde_json::from_str::<Vec<String>>(&raw)
            .map_err(|_| SweeperError::invalid_config(key, &raw)),
        _ => Ok(vec![]),
    }
}

impl ScheduleTargets {
    pub fn from_env() -> Result<Self, SweeperError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, SweeperError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(ScheduleTargets {
            instances: parse_targets("EC2_INSTANCES", lookup("EC2_INSTANCES"))?,
            databases: parse_targets("RDS_INSTANCES", lookup("RDS_INSTANCES"))?,
            scaling_groups: parse_targets("ASG_NAMES", lookup("ASG_NAMES"))?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InstanceOutcome {
    Changed(InstanceTransition),
    Failed { error: String, instances: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DatabaseOutcome {
    Cluster { db_cluster: String, status: &'static str },
    Instance { db_instance: String, status: &'static str },
    Failed { error: String, db_identifier: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScalingOutcome {
    Started {
        asg_name: String,
        action: &'static str,
        desired_capacity: i64,
    },
    Stopped {
        asg_name: String,
        action: &'static str,
        previous_capacity: i64,
    },
    Failed { error: String, asg_name: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScheduleResults {
    pub ec2: Vec<InstanceOutcome>,
    pub rds: Vec<DatabaseOutcome>,
    pub asg: Vec<ScalingOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleReport {
    pub timestamp: DateTime<Utc>,
    pub action: ScheduleAction,
    pub results: ScheduleResults,
}

async fn schedule_instances(
    action: ScheduleAction,
    instance_ids: &[String],
    control: &dyn InstanceControl,
) -> Vec<InstanceOutcome> {
    if instance_ids.is_empty() {
        return vec![];
    }
    let result = match action {
        ScheduleAction::Start => control.start(instance_ids).await,
        ScheduleAction::Stop => control.stop(instance_ids).await,
    };
    match result {
        Ok(transitions) => transitions.into_iter().map(InstanceOutcome::Changed).collect(),
        Err(error) => {
            warn!(event = "schedule.instances.failed", error = %error);
            vec![InstanceOutcome::Failed {
                error: error.to_string(),
                instances: instance_ids.to_vec(),
            }]
        }
    }
}

async fn schedule_database(
    action: ScheduleAction,
    identifier: &str,
    control: &dyn DatabaseControl,
) -> Result<DatabaseOutcome, SweeperError> {
    let scope = control.scope(identifier).await?;
    let status = match action {
        ScheduleAction::Start => {
            control.start(identifier, scope).await?;
            "starting"
        }
        ScheduleAction::Stop => {
            control.stop(identifier, scope).await?;
            "stopping"
        }
    };
    Ok(match scope {
        DatabaseScope::Cluster => DatabaseOutcome::Cluster {
            db_cluster: identifier.to_string(),
            status,
        },
        DatabaseScope::Instance => DatabaseOutcome::Instance {
            db_instance: identifier.to_string(),
            status,
        },
    })
}

async fn schedule_scaling_group(
    action: ScheduleAction,
    name: &str,
    control: &dyn ScalingGroupControl,
) -> Result<ScalingOutcome, SweeperError> {
    let group = match control.describe(name).await? {
        Some(group) => group,
        None => {
            return Ok(ScalingOutcome::Failed {
                error: "ASG not found".to_string(),
                asg_name: name.to_string(),
            })
        }
    };

    match action {
        ScheduleAction::Start => {
            let desired_capacity = group
                .saved_capacity
                .and_then(|saved| saved.trim().parse::<i64>().ok())
                .unwrap_or(DEFAULT_DESIRED_CAPACITY);
            control.resize(name, 1, desired_capacity).await?;
            Ok(ScalingOutcome::Started {
                asg_name: name.to_string(),
                action: "started",
                desired_capacity,
            })
        }
        ScheduleAction::Stop => {
            control.save_capacity(name, group.desired_capacity).await?;
            control.resize(name, 0, 0).await?;
            Ok(ScalingOutcome::Stopped {
                asg_name: name.to_string(),
                action: "stopped",
                previous_capacity: group.desired_capacity,
            })
        }
    }
}

pub async fn run_schedule(
    action: ScheduleAction,
    targets: &ScheduleTargets,
    instances: &dyn InstanceControl,
    databases: &dyn DatabaseControl,
    scaling_groups: &dyn ScalingGroupControl,
    now: DateTime<Utc>,
) -> ScheduleReport {
    let mut results = ScheduleResults {
        ec2: schedule_instances(action, &targets.instances, instances).await,
        ..ScheduleResults::default()
    };

    for identifier in &targets.databases {
        let outcome = schedule_database(action, identifier, databases)
            .await
            .unwrap_or_else(|error| {
                warn!(event = "schedule.database.failed", id = %identifier, error = %error);
                DatabaseOutcome::Failed {
                    error: error.to_string(),
                    db_identifier: identifier.clone(),
                }
            });
        results.rds.push(outcome);
    }

    for name in &targets.scaling_groups {
        let outcome = schedule_scaling_group(action, name, scaling_groups)
            .await
            .unwrap_or_else(|error| {
                warn!(event = "schedule.scaling_group.failed", name = %name, error = %error);
                ScalingOutcome::Failed {
                    error: error.to_string(),
                    asg_name: name.clone(),
                }
            });
        results.asg.push(outcome);
    }

    let report = ScheduleReport {
        timestamp: now,
        action,
        results,
    };
    match serde_json::to_string(&report) {
        Ok(serialized) => info!(event = "schedule.completed", report = %serialized),
        Err(error) => warn!(event = "schedule.completed", error = %error),
    }
    report
}
