use async_trait::async_trait;
use rusoto_s3::{DeleteBucketRequest, ListObjectsV2Request, S3Client, S3};

use crate::error::SweeperError;
use crate::resource::{parse_timestamp, Listing, ResourceDetail, ResourceKind, ResourceRecord};
use crate::sources::{mismatched, ResourceSource};

pub struct BucketSource {
    client: S3Client,
}

impl BucketSource {
    pub fn new_with_client(client: S3Client) -> Self {
        BucketSource { client }
    }

    async fn object_count(&self, bucket: &str) -> Result<usize, SweeperError> {
        let result = self
            .client
            .list_objects_v2(ListObjectsV2Request {
                bucket: bucket.to_string(),
                max_keys: Some(1),
                ..Default::default()
            })
            .await
            .map_err(|error| SweeperError::provider("ListObjectsV2", error))?;
        Ok(result.contents.map_or(0, |objects| objects.len()))
    }
}

#[async_trait]
impl ResourceSource for BucketSource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Bucket
    }

    async fn list(&self) -> Result<Vec<Listing>, SweeperError> {
        let result = self
            .client
            .list_buckets()
            .await
            .map_err(|error| SweeperError::provider("ListBuckets", error))?;

        let mut listings = Vec::new();
        for bucket in result.buckets.unwrap_or_default() {
            let name = bucket.name.ok_or(SweeperError::MissingField("Name"))?;
            // buckets in other regions or with restrictive policies refuse the listing
            let object_count = match self.object_count(&name).await {
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
                ResourceRecord::new(name, ResourceDetail::Bucket { object_count })
                    .created_at(bucket.creation_date.as_deref().and_then(parse_timestamp)),
            ));
        }
        Ok(listings)
    }

    async fn reclaim(&self, record: &ResourceRecord) -> Result<(), SweeperError> {
        if record.kind() != ResourceKind::Bucket {
            return Err(mismatched(ResourceKind::Bucket, record));
        }
        self.client
            .delete_bucket(DeleteBucketRequest {
                bucket: record.id.clone(),
                ..Default::default()
            })
            .await
            .map_err(|error| SweeperError::provider("DeleteBucket", error))
    }
}
