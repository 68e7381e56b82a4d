use async_trait::async_trait;
use rusoto_elbv2::{
    DeleteLoadBalancerInput, DescribeLoadBalancersInput, DescribeTargetGroupsInput,
    DescribeTargetHealthInput, Elb, ElbClient,
};

use crate::error::SweeperError;
use crate::resource::{parse_timestamp, Listing, ResourceDetail, ResourceKind, ResourceRecord};
use crate::sources::{mismatched, ResourceSource};

pub struct LoadBalancerSource {
    client: ElbClient,
}

impl LoadBalancerSource {
    pub fn new_with_client(client: ElbClient) -> Self {
        LoadBalancerSource { client }
    }

    /// Counts targets registered behind any of the balancer's target groups,
    /// whatever their health state.
    async fn registered_targets(&self, load_balancer_arn: &str) -> Result<usize, SweeperError> {
        let target_groups = self
            .client
            .describe_target_groups(DescribeTargetGroupsInput {
                load_balancer_arn: Some(load_balancer_arn.to_string()),
                ..Default::default()
            })
            .await
            .map_err(|error| SweeperError::provider("DescribeTargetGroups", error))?;

        for target_group in target_groups.target_groups.unwrap_or_default() {
            let target_group_arn = match target_group.target_group_arn {
                Some(arn) => arn,
                None => continue,
            };
            let health = self
                .client
                .describe_target_health(DescribeTargetHealthInput {
                    target_group_arn,
                    ..Default::default()
                })
                .await
                .map_err(|error| SweeperError::provider("DescribeTargetHealth", error))?;
            let registered = health.target_health_descriptions.map_or(0, |targets| targets.len());
            if registered > 0 {
                return Ok(registered);
            }
        }
        Ok(0)
    }
}

#[async_trait]
impl ResourceSource for LoadBalancerSource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::LoadBalancer
    }

    async fn list(&self) -> Result<Vec<Listing>, SweeperError> {
        let mut listings = Vec::new();
        let mut marker = None;
        loop {
            let result = self
                .client
                .describe_load_balancers(DescribeLoadBalancersInput {
                    marker: marker.take(),
                    ..Default::default()
                })
                .await
                .map_err(|error| SweeperError::provider("DescribeLoadBalancers", error))?;

            for load_balancer in result.load_balancers.unwrap_or_default() {
                let arn = load_balancer
                    .load_balancer_arn
                    .ok_or(SweeperError::MissingField("LoadBalancerArn"))?;
                let registered_targets = match self.registered_targets(&arn).await {
                    Ok(count) => count,
                    Err(error) => {
                        listings.push(Listing::Skipped {
                            id: arn,
                            reason: error.to_string(),
                        });
                        continue;
                    }
                };
                listings.push(Listing::Record(
                    ResourceRecord::new(arn, ResourceDetail::LoadBalancer { registered_targets })
                        .named(load_balancer.load_balancer_name.unwrap_or_default())
                        .created_at(load_balancer.created_time.as_deref().and_then(parse_timestamp)),
                ));
            }

            marker = result.next_marker;
            if marker.is_none() {
                return Ok(listings);
            }
        }
    }

    async fn reclaim(&self, record: &ResourceRecord) -> Result<(), SweeperError> {
        if record.kind() != ResourceKind::LoadBalancer {
            return Err(mismatched(ResourceKind::LoadBalancer, record));
        }
        self.client
            .delete_load_balancer(DeleteLoadBalancerInput {
                load_balancer_arn: record.id.clone(),
                ..Default::default()
            })
            .await
            .map_err(|error| SweeperError::provider("DeleteLoadBalancer", error))?;
        Ok(())
    }
}
