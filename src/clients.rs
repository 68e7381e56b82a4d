use rusoto_autoscaling::AutoscalingClient;
use rusoto_core::Region;
use rusoto_ec2::Ec2Client;
use rusoto_ecr::EcrClient;
use rusoto_elbv2::ElbClient;
use rusoto_lambda::LambdaClient;
use rusoto_logs::CloudWatchLogsClient;
use rusoto_rds::RdsClient;
use rusoto_s3::S3Client;
use rusoto_sns::SnsClient;

use crate::notifier::SnsNotifier;
use crate::scheduler::control::{
    Ec2InstanceControl, RdsDatabaseControl, ScalingGroupClient,
};
use crate::sources::ec2::{
    AddressSource, ImageSource, NatGatewaySource, SecurityGroupSource, SnapshotSource,
    VolumeSource,
};
use crate::sources::ecr::RegistryImageSource;
use crate::sources::elb::LoadBalancerSource;
use crate::sources::lambda::FunctionVersionSource;
use crate::sources::logs::LogGroupSource;
use crate::sources::rds::DatabaseSnapshotSource;
use crate::sources::s3::BucketSource;
use crate::sources::ResourceSource;

/// Provider clients for one region, built once per cold start.
pub struct ProviderClients {
    region: Region,
}

impl ProviderClients {
    pub fn new(region: Region) -> Self {
        ProviderClients { region }
    }

    fn ec2(&self) -> Ec2Client {
        Ec2Client::new(self.region.clone())
    }

    /// One adapter per kind, in reporting order.
    pub fn sources(&self) -> Vec<Box<dyn ResourceSource>> {
        vec![
            Box::new(VolumeSource::new_with_client(self.ec2())),
            Box::new(SnapshotSource::new_with_client(self.ec2())),
            Box::new(AddressSource::new_with_client(self.ec2())),
            Box::new(LoadBalancerSource::new_with_client(ElbClient::new(
                self.region.clone(),
            ))),
            Box::new(NatGatewaySource::new_with_client(self.ec2())),
            Box::new(DatabaseSnapshotSource::new_with_client(RdsClient::new(
                self.region.clone(),
            ))),
            Box::new(ImageSource::new_with_client(self.ec2())),
            Box::new(RegistryImageSource::new_with_client(EcrClient::new(
                self.region.clone(),
            ))),
            Box::new(LogGroupSource::new_with_client(CloudWatchLogsClient::new(
                self.region.clone(),
            ))),
            Box::new(BucketSource::new_with_client(S3Client::new(self.region.clone()))),
            Box::new(SecurityGroupSource::new_with_client(self.ec2())),
            Box::new(FunctionVersionSource::new_with_client(LambdaClient::new(
                self.region.clone(),
            ))),
        ]
    }

    pub fn notifier(&self, topic_arn: &str) -> SnsNotifier {
        SnsNotifier::new_with_client(SnsClient::new(self.region.clone()), topic_arn)
    }

    pub fn instance_control(&self) -> Ec2InstanceControl {
        Ec2InstanceControl::new_with_client(self.ec2())
    }

    pub fn database_control(&self) -> RdsDatabaseControl {
        RdsDatabaseControl::new_with_client(RdsClient::new(self.region.clone()))
    }

    pub fn scaling_group_control(&self) -> ScalingGroupClient {
        ScalingGroupClient::new_with_client(AutoscalingClient::new(self.region.clone()))
    }
}

#[cfg(test)]
mod tests {
    use crate::clients::ProviderClients;
    use crate::resource::ResourceKind;
    use rusoto_core::Region;

    #[tokio::test]
    async fn test_sources_cover_every_kind_once() {
        let clients = ProviderClients::new(Region::ApNortheast2);
        let kinds: Vec<ResourceKind> = clients.sources().iter().map(|source| source.kind()).collect();
        assert_eq!(kinds, ResourceKind::ALL.to_vec());
    }
}
