use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use tracing::info;

use resource_sweeper::clients::ProviderClients;
use resource_sweeper::config::SweepConfig;
use resource_sweeper::logging::init_logging;
use resource_sweeper::notifier::{Notifier, SnsNotifier};
use resource_sweeper::sources::ResourceSource;
use resource_sweeper::sweep::run_sweep;

struct Cleanup {
    config: SweepConfig,
    sources: Vec<Box<dyn ResourceSource>>,
    notifier: Option<SnsNotifier>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_logging();

    let config = SweepConfig::from_env().context("failed to load the sweep configuration")?;
    let clients = ProviderClients::new(config.region.clone());
    let notifier = config
        .notification_topic
        .as_deref()
        .map(|topic| clients.notifier(topic));
    let cleanup = Arc::new(Cleanup {
        sources: clients.sources(),
        notifier,
        config,
    });

    info!(event = "cleanup.initialised", region = cleanup.config.region.name());
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let cleanup = Arc::clone(&cleanup);
        async move { cleanup_handler(&cleanup, event).await }
    }))
    .await
}

async fn cleanup_handler(cleanup: &Cleanup, event: LambdaEvent<Value>) -> Result<Value, Error> {
    info!(event = "cleanup.invoked", request_id = %event.context.request_id);
    let notifier = cleanup.notifier.as_ref().map(|notifier| notifier as &dyn Notifier);
    let summary = run_sweep(&cleanup.config, &cleanup.sources, notifier, Utc::now()).await;
    let output = serde_json::to_value(&summary).context("failed to serialise the sweep summary")?;
    Ok(output)
}
