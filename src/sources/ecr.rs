use std::cmp::Ordering;

use async_trait::async_trait;
use rusoto_ecr::{
    BatchDeleteImageRequest, DescribeImagesRequest, DescribeRepositoriesRequest, Ecr, EcrClient,
    ImageDetail, ImageIdentifier,
};

use crate::error::SweeperError;
use crate::resource::{
    from_epoch_seconds, Listing, ResourceDetail, ResourceKind, ResourceRecord,
    PROTECTED_IMAGE_TAGS,
};
use crate::sources::{mismatched, ResourceSource};

pub struct RegistryImageSource {
    client: EcrClient,
}

fn is_protected(image: &ImageDetail) -> bool {
    image.image_tags.as_ref().map_or(false, |tags| {
        tags.iter().any(|tag| PROTECTED_IMAGE_TAGS.contains(&tag.as_str()))
    })
}

/// Ranks a repository's unprotected images by push time, newest first.
/// Images without a push time rank after every dated one.
pub fn registry_listings(repository: &str, images: Vec<ImageDetail>) -> Vec<Listing> {
    let (protected, mut candidates): (Vec<ImageDetail>, Vec<ImageDetail>) =
        images.into_iter().partition(is_protected);
    candidates.sort_by(|left, right| {
        right
            .image_pushed_at
            .partial_cmp(&left.image_pushed_at)
            .unwrap_or(Ordering::Equal)
    });

    let ranked = protected
        .into_iter()
        .map(|image| (0, image))
        .chain(candidates.into_iter().enumerate());

    ranked
        .map(|(recency_rank, image)| match image.image_digest {
            Some(digest) => Listing::Record(
                ResourceRecord::new(
                    format!("{}@{}", repository, digest),
                    ResourceDetail::RegistryImage {
                        repository: repository.to_string(),
                        digest,
                        tags: image.image_tags.unwrap_or_default(),
                        recency_rank,
                    },
                )
                .named(repository)
                .created_at(image.image_pushed_at.and_then(from_epoch_seconds)),
            ),
            None => Listing::Skipped {
                id: repository.to_string(),
                reason: "image without digest".to_string(),
            },
        })
        .collect()
}

impl RegistryImageSource {
    pub fn new_with_client(client: EcrClient) -> Self {
        RegistryImageSource { client }
    }

    async fn repositories(&self) -> Result<Vec<String>, SweeperError> {
        let mut repositories = Vec::new();
        let mut next_token = None;
        loop {
            let result = self
                .client
                .describe_repositories(DescribeRepositoriesRequest {
                    next_token: next_token.take(),
                    ..Default::default()
                })
                .await
                .map_err(|error| SweeperError::provider("DescribeRepositories", error))?;

            repositories.extend(
                result
                    .repositories
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|repository| repository.repository_name),
            );

            next_token = result.next_token;
            if next_token.is_none() {
                return Ok(repositories);
            }
        }
    }

    async fn images(&self, repository: &str) -> Result<Vec<ImageDetail>, SweeperError> {
        let mut images = Vec::new();
        let mut next_token = None;
        loop {
            let result = self
                .client
                .describe_images(DescribeImagesRequest {
                    repository_name: repository.to_string(),
                    next_token: next_token.take(),
                    ..Default::default()
                })
                .await
                .map_err(|error| SweeperError::provider("DescribeImages", error))?;

            images.extend(result.image_details.unwrap_or_default());

            next_token = result.next_token;
            if next_token.is_none() {
                return Ok(images);
            }
        }
    }
}

#[async_trait]
impl ResourceSource for RegistryImageSource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::RegistryImage
    }

    async fn list(&self) -> Result<Vec<Listing>, SweeperError> {
        let mut listings = Vec::new();
        for repository in self.repositories().await? {
            match self.images(&repository).await {
                Ok(images) => listings.extend(registry_listings(&repository, images)),
                Err(error) => listings.push(Listing::Skipped {
                    id: repository,
                    reason: error.to_string(),
                }),
            }
        }
        Ok(listings)
    }

    async fn reclaim(&self, record: &ResourceRecord) -> Result<(), SweeperError> {
        let (repository, digest) = match &record.detail {
            ResourceDetail::RegistryImage {
                repository, digest, ..
            } => (repository, digest),
            _ => return Err(mismatched(ResourceKind::RegistryImage, record)),
        };
        let result = self
            .client
            .batch_delete_image(BatchDeleteImageRequest {
                repository_name: repository.clone(),
                image_ids: vec![ImageIdentifier {
                    image_digest: Some(digest.clone()),
                    image_tag: None,
                }],
                ..Default::default()
            })
            .await
            .map_err(|error| SweeperError::provider("BatchDeleteImage", error))?;

        match result.failures.unwrap_or_default().into_iter().next() {
            Some(failure) => Err(SweeperError::PartialFailure {
                operation: "BatchDeleteImage",
                message: failure
                    .failure_reason
                    .unwrap_or_else(|| "image was not deleted".to_string()),
            }),
            None => Ok(()),
        }
    }
}
