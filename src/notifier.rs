use async_trait::async_trait;
use rusoto_sns::{PublishInput, Sns, SnsClient};

use crate::error::SweeperError;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, subject: &str, message: &str) -> Result<(), SweeperError>;
}

pub struct SnsNotifier {
    client: SnsClient,
    topic_arn: String,
}

#[async_trait]
impl Notifier for SnsNotifier {
    async fn publish(&self, subject: &str, message: &str) -> Result<(), SweeperError> {
        self.client
            .publish(PublishInput {
                topic_arn: Some(self.topic_arn.clone()),
                subject: Some(subject.to_string()),
                message: message.to_string(),
                ..Default::default()
            })
            .await
            .map_err(|error| SweeperError::provider("Publish", error))?;
        Ok(())
    }
}

impl SnsNotifier {
    pub fn new_with_client(client: SnsClient, topic_arn: impl Into<String>) -> Self {
        SnsNotifier {
            client,
            topic_arn: topic_arn.into(),
        }
    }
}
