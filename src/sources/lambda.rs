use async_trait::async_trait;
use rusoto_lambda::{
    DeleteFunctionRequest, FunctionConfiguration, Lambda, LambdaClient, ListFunctionsRequest,
    ListVersionsByFunctionRequest,
};

use crate::error::SweeperError;
use crate::resource::{
    parse_timestamp, Listing, ResourceDetail, ResourceKind, ResourceRecord,
    CURRENT_FUNCTION_VERSION,
};
use crate::sources::{mismatched, ResourceSource};

pub struct FunctionVersionSource {
    client: LambdaClient,
}

/// Published versions ranked by number, newest first. `$LATEST` keeps the
/// rank after every published version and is retained by its name.
pub fn version_listings(function: &str, versions: Vec<FunctionConfiguration>) -> Vec<Listing> {
    let mut numbered: Vec<(u64, FunctionConfiguration)> = Vec::new();
    let mut listings = Vec::new();
    for configuration in versions {
        let version = configuration.version.clone().unwrap_or_default();
        match version.parse::<u64>() {
            Ok(number) => numbered.push((number, configuration)),
            Err(_) if version == CURRENT_FUNCTION_VERSION => {
                listings.push(version_record(function, version, usize::MAX, &configuration))
            }
            Err(_) => listings.push(Listing::Skipped {
                id: format!("{}:{}", function, version),
                reason: "unrecognised version".to_string(),
            }),
        }
    }

    numbered.sort_by(|left, right| right.0.cmp(&left.0));
    for (recency_rank, (number, configuration)) in numbered.into_iter().enumerate() {
        listings.push(version_record(function, number.to_string(), recency_rank, &configuration));
    }
    listings
}

fn version_record(
    function: &str,
    version: String,
    recency_rank: usize,
    configuration: &FunctionConfiguration,
) -> Listing {
    Listing::Record(
        ResourceRecord::new(
            format!("{}:{}", function, version),
            ResourceDetail::FunctionVersion {
                function: function.to_string(),
                version,
                recency_rank,
            },
        )
        .named(function)
        .created_at(configuration.last_modified.as_deref().and_then(parse_timestamp)),
    )
}

impl FunctionVersionSource {
    pub fn new_with_client(client: LambdaClient) -> Self {
        FunctionVersionSource { client }
    }

    async fn functions(&self) -> Result<Vec<String>, SweeperError> {
        let mut functions = Vec::new();
        let mut marker = None;
        loop {
            let result = self
                .client
                .list_functions(ListFunctionsRequest {
                    marker: marker.take(),
                    ..Default::default()
                })
                .await
                .map_err(|error| SweeperError::provider("ListFunctions", error))?;

            functions.extend(
                result
                    .functions
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|function| function.function_name),
            );

            marker = result.next_marker;
            if marker.is_none() {
                return Ok(functions);
            }
        }
    }

    async fn versions(&self, function: &str) -> Result<Vec<FunctionConfiguration>, SweeperError> {
        let mut versions = Vec::new();
        let mut marker = None;
        loop {
            let result = self
                .client
                .list_versions_by_function(ListVersionsByFunctionRequest {
                    function_name: function.to_string(),
                    marker: marker.take(),
                    ..Default::default()
                })
                .await
                .map_err(|error| SweeperError::provider("ListVersionsByFunction", error))?;

            versions.extend(result.versions.unwrap_or_default());

            marker = result.next_marker;
            if marker.is_none() {
                return Ok(versions);
            }
        }
    }
}

#[async_trait]
impl ResourceSource for FunctionVersionSource {
    fn kind(&self) -> ResourceKind {
        ResourceKind::FunctionVersion
    }

    async fn list(&self) -> Result<Vec<Listing>, SweeperError> {
        let mut listings = Vec::new();
        for function in self.functions().await? {
            match self.versions(&function).await {
                Ok(versions) => listings.extend(version_listings(&function, versions)),
                Err(error) => listings.push(Listing::Skipped {
                    id: function,
                    reason: error.to_string(),
                }),
            }
        }
        Ok(listings)
    }

    async fn reclaim(&self, record: &ResourceRecord) -> Result<(), SweeperError> {
        let (function, version) = match &record.detail {
            ResourceDetail::FunctionVersion {
                function, version, ..
            } => (function, version),
            _ => return Err(mismatched(ResourceKind::FunctionVersion, record)),
        };
        self.client
            .delete_function(DeleteFunctionRequest {
                function_name: function.clone(),
                qualifier: Some(version.clone()),
                ..Default::default()
            })
            .await
            .map_err(|error| SweeperError::provider("DeleteFunction", error))
    }
}
