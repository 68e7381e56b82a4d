use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use rusoto_core::Region;
use serde_json::Value;
use tracing::info;

use resource_sweeper::clients::ProviderClients;
use resource_sweeper::logging::init_logging;
use resource_sweeper::scheduler::control::{
    Ec2InstanceControl, RdsDatabaseControl, ScalingGroupClient,
};
use resource_sweeper::scheduler::{run_schedule, ScheduleAction, ScheduleTargets};

struct Scheduler {
    targets: ScheduleTargets,
    instances: Ec2InstanceControl,
    databases: RdsDatabaseControl,
    scaling_groups: ScalingGroupClient,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_logging();

    let targets = ScheduleTargets::from_env().context("failed to load the schedule targets")?;
    let clients = ProviderClients::new(Region::default());
    let scheduler = Arc::new(Scheduler {
        targets,
        instances: clients.instance_control(),
        databases: clients.database_control(),
        scaling_groups: clients.scaling_group_control(),
    });

    info!(
        event = "schedule.initialised",
        instances = scheduler.targets.instances.len(),
        databases = scheduler.targets.databases.len(),
        scaling_groups = scheduler.targets.scaling_groups.len()
    );
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let scheduler = Arc::clone(&scheduler);
        async move { schedule_handler(&scheduler, event).await }
    }))
    .await
}

async fn schedule_handler(scheduler: &Scheduler, event: LambdaEvent<Value>) -> Result<Value, Error> {
    let action = ScheduleAction::from_event(&event.payload);
    info!(event = "schedule.invoked", action = ?action, request_id = %event.context.request_id);
    let report = run_schedule(
        action,
        &scheduler.targets,
        &scheduler.instances,
        &scheduler.databases,
        &scheduler.scaling_groups,
        Utc::now(),
    )
    .await;
    let output = serde_json::to_value(&report).context("failed to serialise the schedule report")?;
    Ok(output)
}
