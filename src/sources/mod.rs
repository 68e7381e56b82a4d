//! Provider adapters, one per [`ResourceKind`].
//!
//! Each adapter lists every record of its kind, resolving the derived state
//! the occupancy check needs, and knows how to reclaim a single record.

use async_trait::async_trait;

use crate::error::SweeperError;
use crate::resource::{Listing, ResourceKind, ResourceRecord};

pub mod ec2;
pub mod ecr;
pub mod elb;
pub mod lambda;
pub mod logs;
pub mod rds;
pub mod s3;

#[async_trait]
pub trait ResourceSource: Send + Sync {
    fn kind(&self) -> ResourceKind;

    async fn list(&self) -> Result<Vec<Listing>, SweeperError>;

    async fn reclaim(&self, record: &ResourceRecord) -> Result<(), SweeperError>;
}

/// Fails when a record of another kind is handed to an adapter.
pub(crate) fn mismatched(expected: ResourceKind, record: &ResourceRecord) -> SweeperError {
    SweeperError::UnexpectedRecord {
        id: record.id.clone(),
        expected: expected.key(),
    }
}
