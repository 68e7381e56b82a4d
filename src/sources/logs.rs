use async_trait::async_trait;
use rusoto_logs::{
    CloudWatchLogs, CloudWatchLogsClient, DeleteLogGroupRequest, DescribeLogGroupsRequest,
    DescribeLogStreamsRequest,
};

use crate::error::SweeperError;
use crate::resource::{from_epoch_millis, Listing, ResourceDetail, ResourceKind, ResourceRecord};
use crate::sources::{mismatched, ResourceSource};

pub struct LogGroupSource {
    client: CloudWatchLogsClient,
}

impl LogGroupSource {
    pub fn new_with_client(client: CloudWatchLogsClient) -> Self {
        LogGroupSource { client }
    }

    /// One stream is enough to prove the group is not empty.
    async fn stream_count(&self, log_group_name: &str) -> Result<usize, SweeperError> {
        let result = self
            .client
            .describe_log_streams(DescribeLogStreamsRequest {
                log_group_name: log_group_name.to_string(),
                limit: Some(1),
                ..Default::default()
            })
            .await
            .map_err(|error| SweeperError::provider("DescribeLogStreams", error))?;
        Ok(result.log_streams.map_or(0, |streams| streams.len()))
    }
}

#[async_trait]
impl ResourceSource for LogGroupSource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::LogGroup
    }

    async fn list(&self) -> Result<Vec<Listing>, SweeperError> {
        let mut listings = Vec::new();
        let mut next_token = None;
        loop {
            let result = self
                .client
                .describe_log_groups(DescribeLogGroupsRequest {
                    next_token: next_token.take(),
                    ..Default::default()
                })
                .await
                .map_err(|error| SweeperError::provider("DescribeLogGroups", error))?;

            for log_group in result.log_groups.unwrap_or_default() {
                let name = log_group
                    .log_group_name
                    .ok_or(SweeperError::MissingField("logGroupName"))?;
                let stream_count = match self.stream_count(&name).await {
                    Ok(count) => count,
                    Err(error) => {
                        listings.push(Listing::Skipped {
                            id: name,
                            reason: error.to_string(),
                        });
                        continue;
                    }
                };
                listings.push(Listing::Record(
                    ResourceRecord::new(name, ResourceDetail::LogGroup { stream_count })
                        .created_at(log_group.creation_time.and_then(from_epoch_millis)),
                ));
            }

            next_token = result.next_token;
            if next_token.is_none() {
                return Ok(listings);
            }
        }
    }

    async fn reclaim(&self, record: &ResourceRecord) -> Result<(), SweeperError> {
        if record.kind() != ResourceKind::LogGroup {
            return Err(mismatched(ResourceKind::LogGroup, record));
        }
        self.client
            .delete_log_group(DeleteLogGroupRequest {
                log_group_name: record.id.clone(),
            })
            .await
            .map_err(|error| SweeperError::provider("DeleteLogGroup", error))
    }
}

#[cfg(test)]
mod tests {
    use crate::sources::logs::LogGroupSource;
    use rusoto_logs::CloudWatchLogsClient;
    use rusoto_mock::{
        MockCredentialsProvider, MockRequestDispatcher, MockResponseReader, ReadMockResponse,
    };

    fn mock_client(file: &str) -> CloudWatchLogsClient {
        CloudWatchLogsClient::new_with(
            MockRequestDispatcher::default().with_body(&*MockResponseReader::read_response(
                "test_resources/valid",
                file,
            )),
            MockCredentialsProvider,
            Default::default(),
        )
    }

    #[tokio::test]
    async fn test_stream_count_of_busy_group() {
        let source = LogGroupSource::new_with_client(mock_client("describe_log_streams.json"));
        assert_eq!(source.stream_count("/aws/lambda/worker").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stream_count_of_empty_group() {
        let source = LogGroupSource::new_with_client(CloudWatchLogsClient::new_with(
            MockRequestDispatcher::default().with_body(r#"{"logStreams": []}"#),
            MockCredentialsProvider,
            Default::default(),
        ));
        assert_eq!(source.stream_count("/aws/lambda/retired").await.unwrap(), 0);
    }
}
