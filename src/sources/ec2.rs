use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use rusoto_ec2::{
    DeleteNatGatewayRequest, DeleteSecurityGroupRequest, DeleteSnapshotRequest,
    DeleteVolumeRequest, DeregisterImageRequest, DescribeAddressesRequest, DescribeImagesRequest,
    DescribeNatGatewaysRequest, DescribeNetworkInterfacesRequest, DescribeSecurityGroupsRequest,
    DescribeSnapshotsRequest, DescribeVolumesRequest, Ec2, Ec2Client, Filter, ReleaseAddressRequest,
    Tag,
};
use tracing::{info, warn};

use crate::error::SweeperError;
use crate::resource::{
    parse_timestamp, tag_map, Listing, ResourceDetail, ResourceKind, ResourceRecord,
};
use crate::sources::{mismatched, ResourceSource};

const IMAGE_SNAPSHOT_DESCRIPTION: &str = "Created by CreateImage";
const DEFAULT_SECURITY_GROUP: &str = "default";

fn ec2_tags(tags: Option<Vec<Tag>>) -> HashMap<String, String> {
    tag_map(
        tags.unwrap_or_default()
            .into_iter()
            .map(|tag| (tag.key, tag.value)),
    )
}

fn filter(name: &str, value: &str) -> Filter {
    Filter {
        name: Some(name.to_string()),
        values: Some(vec![value.to_string()]),
    }
}

pub struct VolumeSource {
    client: Ec2Client,
}

impl VolumeSource {
    pub fn new_with_client(client: Ec2Client) -> Self {
        VolumeSource { client }
    }
}

#[async_trait]
impl ResourceSource for VolumeSource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::BlockVolume
    }

    async fn list(&self) -> Result<Vec<Listing>, SweeperError> {
        let mut listings = Vec::new();
        let mut next_token = None;
        loop {
            let result = self
                .client
                .describe_volumes(DescribeVolumesRequest {
                    filters: Some(vec![filter("status", "available")]),
                    next_token: next_token.take(),
                    ..Default::default()
                })
                .await
                .map_err(|error| SweeperError::provider("DescribeVolumes", error))?;

            for volume in result.volumes.unwrap_or_default() {
                let volume_id = volume.volume_id.ok_or(SweeperError::MissingField("VolumeId"))?;
                let attached = volume
                    .attachments
                    .map_or(false, |attachments| !attachments.is_empty());
                listings.push(Listing::Record(
                    ResourceRecord::new(volume_id, ResourceDetail::BlockVolume { attached })
                        .created_at(volume.create_time.as_deref().and_then(parse_timestamp))
                        .tagged(ec2_tags(volume.tags))
                        .sized(volume.size.unwrap_or(0)),
                ));
            }

            next_token = result.next_token;
            if next_token.is_none() {
                return Ok(listings);
            }
        }
    }

    async fn reclaim(&self, record: &ResourceRecord) -> Result<(), SweeperError> {
        if record.kind() != ResourceKind::BlockVolume {
            return Err(mismatched(ResourceKind::BlockVolume, record));
        }
        self.client
            .delete_volume(DeleteVolumeRequest {
                volume_id: record.id.clone(),
                ..Default::default()
            })
            .await
            .map_err(|error| SweeperError::provider("DeleteVolume", error))
    }
}

pub struct SnapshotSource {
    client: Ec2Client,
}

impl SnapshotSource {
    pub fn new_with_client(client: Ec2Client) -> Self {
        SnapshotSource { client }
    }
}

#[async_trait]
impl ResourceSource for SnapshotSource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::BlockSnapshot
    }

    async fn list(&self) -> Result<Vec<Listing>, SweeperError> {
        let mut listings = Vec::new();
        let mut next_token = None;
        loop {
            let result = self
                .client
                .describe_snapshots(DescribeSnapshotsRequest {
                    owner_ids: Some(vec!["self".to_string()]),
                    next_token: next_token.take(),
                    ..Default::default()
                })
                .await
                .map_err(|error| SweeperError::provider("DescribeSnapshots", error))?;

            for snapshot in result.snapshots.unwrap_or_default() {
                let snapshot_id = snapshot
                    .snapshot_id
                    .ok_or(SweeperError::MissingField("SnapshotId"))?;
                let image_backing = snapshot
                    .description
                    .as_deref()
                    .map_or(false, |description| description.starts_with(IMAGE_SNAPSHOT_DESCRIPTION));
                listings.push(Listing::Record(
                    ResourceRecord::new(snapshot_id, ResourceDetail::BlockSnapshot { image_backing })
                        .created_at(snapshot.start_time.as_deref().and_then(parse_timestamp))
                        .tagged(ec2_tags(snapshot.tags))
                        .sized(snapshot.volume_size.unwrap_or(0)),
                ));
            }

            next_token = result.next_token;
            if next_token.is_none() {
                return Ok(listings);
            }
        }
    }

    async fn reclaim(&self, record: &ResourceRecord) -> Result<(), SweeperError> {
        if record.kind() != ResourceKind::BlockSnapshot {
            return Err(mismatched(ResourceKind::BlockSnapshot, record));
        }
        delete_snapshot(&self.client, &record.id).await
    }
}

async fn delete_snapshot(client: &Ec2Client, snapshot_id: &str) -> Result<(), SweeperError> {
    client
        .delete_snapshot(DeleteSnapshotRequest {
            snapshot_id: snapshot_id.to_string(),
            ..Default::default()
        })
        .await
        .map_err(|error| SweeperError::provider("DeleteSnapshot", error))
}

pub struct AddressSource {
    client: Ec2Client,
}

impl AddressSource {
    pub fn new_with_client(client: Ec2Client) -> Self {
        AddressSource { client }
    }
}

#[async_trait]
impl ResourceSource for AddressSource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::StaticAddress
    }

    async fn list(&self) -> Result<Vec<Listing>, SweeperError> {
        let result = self
            .client
            .describe_addresses(DescribeAddressesRequest::default())
            .await
            .map_err(|error| SweeperError::provider("DescribeAddresses", error))?;

        let mut listings = Vec::new();
        for address in result.addresses.unwrap_or_default() {
            let associated = address.instance_id.is_some() || address.network_interface_id.is_some();
            let id = address
                .allocation_id
                .clone()
                .or_else(|| address.public_ip.clone())
                .ok_or(SweeperError::MissingField("AllocationId"))?;
            let name = address.public_ip.clone().unwrap_or_else(|| id.clone());
            listings.push(Listing::Record(
                ResourceRecord::new(
                    id,
                    ResourceDetail::StaticAddress {
                        allocation_id: address.allocation_id,
                        public_ip: address.public_ip,
                        associated,
                    },
                )
                .named(name)
                .tagged(ec2_tags(address.tags)),
            ));
        }
        Ok(listings)
    }

    async fn reclaim(&self, record: &ResourceRecord) -> Result<(), SweeperError> {
        let (allocation_id, public_ip) = match &record.detail {
            ResourceDetail::StaticAddress {
                allocation_id,
                public_ip,
                ..
            } => (allocation_id.clone(), public_ip.clone()),
            _ => return Err(mismatched(ResourceKind::StaticAddress, record)),
        };
        // VPC addresses are released by allocation id, EC2-Classic ones by ip
        let request = match allocation_id {
            Some(allocation_id) => ReleaseAddressRequest {
                allocation_id: Some(allocation_id),
                ..Default::default()
            },
            None => ReleaseAddressRequest {
                public_ip,
                ..Default::default()
            },
        };
        self.client
            .release_address(request)
            .await
            .map_err(|error| SweeperError::provider("ReleaseAddress", error))
    }
}

pub struct NatGatewaySource {
    client: Ec2Client,
}

impl NatGatewaySource {
    pub fn new_with_client(client: Ec2Client) -> Self {
        NatGatewaySource { client }
    }
}

#[async_trait]
impl ResourceSource for NatGatewaySource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::NatGateway
    }

    async fn list(&self) -> Result<Vec<Listing>, SweeperError> {
        let mut listings = Vec::new();
        let mut next_token = None;
        loop {
            let result = self
                .client
                .describe_nat_gateways(DescribeNatGatewaysRequest {
                    filter: Some(vec![filter("state", "available")]),
                    next_token: next_token.take(),
                    ..Default::default()
                })
                .await
                .map_err(|error| SweeperError::provider("DescribeNatGateways", error))?;

            for gateway in result.nat_gateways.unwrap_or_default() {
                let gateway_id = gateway
                    .nat_gateway_id
                    .ok_or(SweeperError::MissingField("NatGatewayId"))?;
                listings.push(Listing::Record(
                    ResourceRecord::new(
                        gateway_id,
                        ResourceDetail::NatGateway {
                            state: gateway.state.unwrap_or_default(),
                        },
                    )
                    .created_at(gateway.create_time.as_deref().and_then(parse_timestamp))
                    .tagged(ec2_tags(gateway.tags)),
                ));
            }

            next_token = result.next_token;
            if next_token.is_none() {
                return Ok(listings);
            }
        }
    }

    async fn reclaim(&self, record: &ResourceRecord) -> Result<(), SweeperError> {
        if record.kind() != ResourceKind::NatGateway {
            return Err(mismatched(ResourceKind::NatGateway, record));
        }
        self.client
            .delete_nat_gateway(DeleteNatGatewayRequest {
                nat_gateway_id: record.id.clone(),
                ..Default::default()
            })
            .await
            .map_err(|error| SweeperError::provider("DeleteNatGateway", error))?;
        Ok(())
    }
}

pub struct ImageSource {
    client: Ec2Client,
}

impl ImageSource {
    pub fn new_with_client(client: Ec2Client) -> Self {
        ImageSource { client }
    }
}

#[async_trait]
impl ResourceSource for ImageSource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::MachineImage
    }

    async fn list(&self) -> Result<Vec<Listing>, SweeperError> {
        let result = self
            .client
            .describe_images(DescribeImagesRequest {
                owners: Some(vec!["self".to_string()]),
                ..Default::default()
            })
            .await
            .map_err(|error| SweeperError::provider("DescribeImages", error))?;

        let mut listings = Vec::new();
        for image in result.images.unwrap_or_default() {
            let image_id = image.image_id.ok_or(SweeperError::MissingField("ImageId"))?;
            let backing_snapshots = image
                .block_device_mappings
                .unwrap_or_default()
                .into_iter()
                .filter_map(|mapping| mapping.ebs.and_then(|ebs| ebs.snapshot_id))
                .collect();
            listings.push(Listing::Record(
                ResourceRecord::new(image_id, ResourceDetail::MachineImage { backing_snapshots })
                    .named(image.name.unwrap_or_default())
                    .created_at(image.creation_date.as_deref().and_then(parse_timestamp))
                    .tagged(ec2_tags(image.tags)),
            ));
        }
        Ok(listings)
    }

    async fn reclaim(&self, record: &ResourceRecord) -> Result<(), SweeperError> {
        let backing_snapshots = match &record.detail {
            ResourceDetail::MachineImage { backing_snapshots } => backing_snapshots,
            _ => return Err(mismatched(ResourceKind::MachineImage, record)),
        };
        self.client
            .deregister_image(DeregisterImageRequest {
                image_id: record.id.clone(),
                ..Default::default()
            })
            .await
            .map_err(|error| SweeperError::provider("DeregisterImage", error))?;

        // the image is already gone, so a leftover snapshot is not an error
        for snapshot_id in backing_snapshots {
            match delete_snapshot(&self.client, snapshot_id).await {
                Ok(()) => info!(
                    event = "sweep.ami.snapshot_deleted",
                    image_id = %record.id,
                    snapshot_id = %snapshot_id
                ),
                Err(error) => warn!(
                    event = "sweep.ami.snapshot_delete_failed",
                    image_id = %record.id,
                    snapshot_id = %snapshot_id,
                    error = %error
                ),
            }
        }
        Ok(())
    }
}

pub struct SecurityGroupSource {
    client: Ec2Client,
}

impl SecurityGroupSource {
    pub fn new_with_client(client: Ec2Client) -> Self {
        SecurityGroupSource { client }
    }

    async fn groups_in_use(&self) -> Result<HashSet<String>, SweeperError> {
        let mut in_use = HashSet::new();
        let mut next_token = None;
        loop {
            let result = self
                .client
                .describe_network_interfaces(DescribeNetworkInterfacesRequest {
                    next_token: next_token.take(),
                    ..Default::default()
                })
                .await
                .map_err(|error| SweeperError::provider("DescribeNetworkInterfaces", error))?;

            for interface in result.network_interfaces.unwrap_or_default() {
                in_use.extend(
                    interface
                        .groups
                        .unwrap_or_default()
                        .into_iter()
                        .filter_map(|group| group.group_id),
                );
            }

            next_token = result.next_token;
            if next_token.is_none() {
                return Ok(in_use);
            }
        }
    }
}

#[async_trait]
impl ResourceSource for SecurityGroupSource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::SecurityGroup
    }

    async fn list(&self) -> Result<Vec<Listing>, SweeperError> {
        let in_use = self.groups_in_use().await?;

        let mut listings = Vec::new();
        let mut next_token = None;
        loop {
            let result = self
                .client
                .describe_security_groups(DescribeSecurityGroupsRequest {
                    next_token: next_token.take(),
                    ..Default::default()
                })
                .await
                .map_err(|error| SweeperError::provider("DescribeSecurityGroups", error))?;

            for group in result.security_groups.unwrap_or_default() {
                let group_id = group.group_id.ok_or(SweeperError::MissingField("GroupId"))?;
                let group_name = group.group_name.unwrap_or_default();
                let detail = ResourceDetail::SecurityGroup {
                    attached: in_use.contains(&group_id),
                    is_default: group_name == DEFAULT_SECURITY_GROUP,
                };
                listings.push(Listing::Record(
                    ResourceRecord::new(group_id, detail)
                        .named(group_name)
                        .tagged(ec2_tags(group.tags)),
                ));
            }

            next_token = result.next_token;
            if next_token.is_none() {
                return Ok(listings);
            }
        }
    }

    async fn reclaim(&self, record: &ResourceRecord) -> Result<(), SweeperError> {
        if record.kind() != ResourceKind::SecurityGroup {
            return Err(mismatched(ResourceKind::SecurityGroup, record));
        }
        self.client
            .delete_security_group(DeleteSecurityGroupRequest {
                group_id: Some(record.id.clone()),
                ..Default::default()
            })
            .await
            .map_err(|error| SweeperError::provider("DeleteSecurityGroup", error))
    }
}

#[cfg(test)]
mod tests {
    use crate::error::SweeperError;
    use crate::resource::{Listing, ResourceDetail, ResourceRecord};
    use crate::sources::ec2::{ImageSource, SnapshotSource, VolumeSource};
    use crate::sources::ResourceSource;
    use chrono::{TimeZone, Utc};
    use rusoto_ec2::Ec2Client;
    use rusoto_mock::{
        MockCredentialsProvider, MockRequestDispatcher, MockResponseReader,
        MultipleMockRequestDispatcher, ReadMockResponse,
    };

    fn mock_client(directory: &str, file: &str, status: u16) -> Ec2Client {
        Ec2Client::new_with(
            MockRequestDispatcher::with_status(status)
                .with_body(&*MockResponseReader::read_response(directory, file)),
            MockCredentialsProvider,
            Default::default(),
        )
    }

    #[tokio::test]
    async fn test_list_volumes() {
        let source = VolumeSource::new_with_client(mock_client(
            "test_resources/valid",
            "describe_volumes.xml",
            200,
        ));
        let listings = source.list().await.unwrap();

        assert_eq!(listings.len(), 1);
        match &listings[0] {
            Listing::Record(record) => {
                assert_eq!(record.id, "vol-1234567890abcdef0");
                assert_eq!(record.size_gb, 80);
                assert_eq!(record.tags["Name"], "keep-me");
                assert_eq!(
                    record.created_at,
                    Some(Utc.ymd(2019, 6, 1).and_hms(9, 30, 0))
                );
                assert_eq!(record.detail, ResourceDetail::BlockVolume { attached: false });
            }
            other => panic!("unexpected listing {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_volumes_error() {
        let source = VolumeSource::new_with_client(mock_client(
            "test_resources/error",
            "ec2_error.xml",
            400,
        ));
        let result = source.list().await;

        match result.err().unwrap() {
            SweeperError::Provider { operation, .. } => assert_eq!(operation, "DescribeVolumes"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reclaim_image_with_backing_snapshots() {
        let source = ImageSource::new_with_client(Ec2Client::new_with(
            MockRequestDispatcher::default(),
            MockCredentialsProvider,
            Default::default(),
        ));
        let image = ResourceRecord::new(
            "ami-0abcdef1234567890",
            ResourceDetail::MachineImage {
                backing_snapshots: vec!["snap-1".to_string(), "snap-2".to_string()],
            },
        );

        assert!(source.reclaim(&image).await.is_ok());
    }

    fn image_source(responses: Vec<MockRequestDispatcher>) -> ImageSource {
        ImageSource::new_with_client(Ec2Client::new_with(
            MultipleMockRequestDispatcher::new(responses),
            MockCredentialsProvider,
            Default::default(),
        ))
    }

    fn ec2_error() -> MockRequestDispatcher {
        MockRequestDispatcher::with_status(400).with_body(&*MockResponseReader::read_response(
            "test_resources/error",
            "ec2_error.xml",
        ))
    }

    fn image_with_snapshots() -> ResourceRecord {
        ResourceRecord::new(
            "ami-0abcdef1234567890",
            ResourceDetail::MachineImage {
                backing_snapshots: vec!["snap-1".to_string(), "snap-2".to_string()],
            },
        )
    }

    #[tokio::test]
    async fn test_reclaim_image_ignores_snapshot_failure() {
        let source = image_source(vec![
            MockRequestDispatcher::with_status(200),
            ec2_error(),
            MockRequestDispatcher::with_status(200),
        ]);

        assert_eq!(source.reclaim(&image_with_snapshots()).await, Ok(()));
    }

    #[tokio::test]
    async fn test_reclaim_image_surfaces_deregister_failure() {
        let source = image_source(vec![ec2_error()]);

        match source.reclaim(&image_with_snapshots()).await.err().unwrap() {
            SweeperError::Provider { operation, .. } => assert_eq!(operation, "DeregisterImage"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reclaim_rejects_foreign_record() {
        let source = SnapshotSource::new_with_client(Ec2Client::new_with(
            MockRequestDispatcher::default(),
            MockCredentialsProvider,
            Default::default(),
        ));
        let volume = ResourceRecord::new("vol-1", ResourceDetail::BlockVolume { attached: false });

        assert_eq!(
            source.reclaim(&volume).await.err().unwrap(),
            SweeperError::UnexpectedRecord {
                id: "vol-1".to_string(),
                expected: "ebs_snapshots",
            }
        );
    }
}
