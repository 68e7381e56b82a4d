use async_trait::async_trait;
use rusoto_rds::{
    DeleteDBClusterSnapshotMessage, DeleteDBSnapshotMessage, DescribeDBClusterSnapshotsMessage,
    DescribeDBSnapshotsMessage, Rds, RdsClient,
};

use crate::error::SweeperError;
use crate::resource::{
    parse_timestamp, DatabaseScope, Listing, ResourceDetail, ResourceKind, ResourceRecord,
};
use crate::sources::{mismatched, ResourceSource};

const MANUAL_SNAPSHOTS: &str = "manual";

/// Manual instance and cluster snapshots, reported under one kind.
pub struct DatabaseSnapshotSource {
    client: RdsClient,
}

impl DatabaseSnapshotSource {
    pub fn new_with_client(client: RdsClient) -> Self {
        DatabaseSnapshotSource { client }
    }

    async fn instance_snapshots(&self, listings: &mut Vec<Listing>) -> Result<(), SweeperError> {
        let mut marker = None;
        loop {
            let result = self
                .client
                .describe_db_snapshots(DescribeDBSnapshotsMessage {
                    snapshot_type: Some(MANUAL_SNAPSHOTS.to_string()),
                    marker: marker.take(),
                    ..Default::default()
                })
                .await
                .map_err(|error| SweeperError::provider("DescribeDBSnapshots", error))?;

            for snapshot in result.db_snapshots.unwrap_or_default() {
                let identifier = snapshot
                    .db_snapshot_identifier
                    .ok_or(SweeperError::MissingField("DBSnapshotIdentifier"))?;
                listings.push(Listing::Record(
                    ResourceRecord::new(
                        identifier,
                        ResourceDetail::DatabaseSnapshot {
                            scope: DatabaseScope::Instance,
                        },
                    )
                    .created_at(snapshot.snapshot_create_time.as_deref().and_then(parse_timestamp)),
                ));
            }

            marker = result.marker;
            if marker.is_none() {
                return Ok(());
            }
        }
    }

    async fn cluster_snapshots(&self, listings: &mut Vec<Listing>) -> Result<(), SweeperError> {
        let mut marker = None;
        loop {
            let result = self
                .client
                .describe_db_cluster_snapshots(DescribeDBClusterSnapshotsMessage {
                    snapshot_type: Some(MANUAL_SNAPSHOTS.to_string()),
                    marker: marker.take(),
                    ..Default::default()
                })
                .await
                .map_err(|error| SweeperError::provider("DescribeDBClusterSnapshots", error))?;

            for snapshot in result.db_cluster_snapshots.unwrap_or_default() {
                let identifier = snapshot
                    .db_cluster_snapshot_identifier
                    .ok_or(SweeperError::MissingField("DBClusterSnapshotIdentifier"))?;
                listings.push(Listing::Record(
                    ResourceRecord::new(
                        identifier,
                        ResourceDetail::DatabaseSnapshot {
                            scope: DatabaseScope::Cluster,
                        },
                    )
                    .created_at(snapshot.snapshot_create_time.as_deref().and_then(parse_timestamp)),
                ));
            }

            marker = result.marker;
            if marker.is_none() {
                return Ok(());
            }
        }
    }
}

#[async_trait]
impl ResourceSource for DatabaseSnapshotSource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::DatabaseSnapshot
    }

    async fn list(&self) -> Result<Vec<Listing>, SweeperError> {
        let mut listings = Vec::new();
        self.instance_snapshots(&mut listings).await?;
        self.cluster_snapshots(&mut listings).await?;
        Ok(listings)
    }

    async fn reclaim(&self, record: &ResourceRecord) -> Result<(), SweeperError> {
        match record.detail {
            ResourceDetail::DatabaseSnapshot {
                scope: DatabaseScope::Instance,
            } => {
                self.client
                    .delete_db_snapshot(DeleteDBSnapshotMessage {
                        db_snapshot_identifier: record.id.clone(),
                        ..Default::default()
                    })
                    .await
                    .map_err(|error| SweeperError::provider("DeleteDBSnapshot", error))?;
            }
            ResourceDetail::DatabaseSnapshot {
                scope: DatabaseScope::Cluster,
            } => {
                self.client
                    .delete_db_cluster_snapshot(DeleteDBClusterSnapshotMessage {
                        db_cluster_snapshot_identifier: record.id.clone(),
                        ..Default::default()
                    })
                    .await
                    .map_err(|error| SweeperError::provider("DeleteDBClusterSnapshot", error))?;
            }
            _ => return Err(mismatched(ResourceKind::DatabaseSnapshot, record)),
        }
        Ok(())
    }
}
