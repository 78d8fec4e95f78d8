//! Published data sources of a Tableau project
//!
//! Lists data sources via `GET sites/{site}/datasources` and downloads them
//! with `GET sites/{site}/datasources/{id}/content?includeExtract=true`.

use super::response::{DatasourcesResponse, ProjectsResponse};
use crate::client::TableauClient;
use crate::error::EtlError;
use crate::etl::ExtractSource;
use crate::model::{ArtifactKind, ExtractDescriptor, LocalArtifact};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use std::collections::HashSet;
use std::path::Path;
use tokio::io::AsyncWriteExt;

const PAGE_SIZE: usize = 100;

/// Extract source backed by a signed-in [`TableauClient`]
///
/// # Example
/// ```no_run
/// use admin_insights_etl::client::{PersonalAccessToken, TableauClient};
/// use admin_insights_etl::etl::ExtractSource;
/// use admin_insights_etl::tableau::TableauSource;
/// use std::time::Duration;
/// use url::Url;
///
/// # async fn example() -> eyre::Result<()> {
/// let url = Url::parse("https://prod-useast-a.online.tableau.com")?;
/// let client = TableauClient::try_new(url, Duration::from_secs(60))?
///     .sign_in(&PersonalAccessToken::new("etl", "secret"), "acme")
///     .await?;
///
/// let source = TableauSource::new(client);
/// for extract in source.locate("Admin Insights").await? {
///     println!("{}", extract);
/// }
/// # Ok(())
/// # }
/// ```
pub struct TableauSource {
    client: TableauClient,
}

impl TableauSource {
    pub fn new(client: TableauClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &TableauClient {
        &self.client
    }

    /// Ids of every project named `project`
    ///
    /// Nested projects may share a name, so there can be more than one.
    async fn project_ids(&self, project: &str) -> Result<HashSet<String>, EtlError> {
        let filter = format!("name:eq:{}", project);
        let response = self
            .client
            .site_get("projects", &[("filter", filter.as_str())])
            .await
            .map_err(|e| EtlError::Platform(e.to_string()))?;
        let response = check_listing(response, "projects").await?;

        let projects: ProjectsResponse = response
            .json()
            .await
            .map_err(|e| EtlError::Platform(format!("Invalid projects response: {}", e)))?;

        let ids: HashSet<String> = projects
            .projects
            .project
            .into_iter()
            .filter(|p| p.name == project)
            .map(|p| p.id)
            .collect();
        if ids.is_empty() {
            return Err(EtlError::NotFound(format!("Project '{}'", project)));
        }
        log::debug!("Project '{}' resolved to {:?}", project, ids);
        Ok(ids)
    }

    async fn datasource_page(
        &self,
        project: &str,
        page: usize,
    ) -> Result<DatasourcesResponse, EtlError> {
        let filter = format!("projectName:eq:{}", project);
        let page_size = PAGE_SIZE.to_string();
        let page_number = page.to_string();
        let response = self
            .client
            .site_get(
                "datasources",
                &[
                    ("filter", filter.as_str()),
                    ("sort", "name:asc"),
                    ("pageSize", page_size.as_str()),
                    ("pageNumber", page_number.as_str()),
                ],
            )
            .await
            .map_err(|e| EtlError::Platform(e.to_string()))?;
        let response = check_listing(response, "data sources").await?;

        response
            .json()
            .await
            .map_err(|e| EtlError::Platform(format!("Invalid data sources response: {}", e)))
    }
}

/// Map a failed listing response to the matching error
async fn check_listing(response: Response, what: &str) -> Result<Response, EtlError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            EtlError::Authentication(format!("Listing {} rejected ({}): {}", what, status, body))
        }
        StatusCode::NOT_FOUND => EtlError::NotFound(format!("{} ({})", what, body)),
        _ => EtlError::Platform(format!("Failed to list {} ({}): {}", what, status, body)),
    })
}

#[async_trait]
impl ExtractSource for TableauSource {
    async fn locate(&self, project: &str) -> Result<Vec<ExtractDescriptor>, EtlError> {
        let project_ids = self.project_ids(project).await?;

        let mut extracts = Vec::new();
        let mut page = 1;
        loop {
            let response = self.datasource_page(project, page).await?;
            let found = response.datasources.datasource.len();
            extracts.extend(
                response
                    .datasources
                    .datasource
                    .into_iter()
                    .filter(|ds| {
                        ds.project
                            .as_ref()
                            .is_some_and(|p| project_ids.contains(&p.id))
                    })
                    .map(|ds| ExtractDescriptor::new(ds.id, ds.name, project)),
            );
            if found == 0 || !response.pagination.has_more() {
                break;
            }
            page += 1;
        }

        log::debug!("Listed {} data source(s) in '{}'", extracts.len(), project);
        Ok(extracts)
    }

    async fn fetch(
        &self,
        extract: &ExtractDescriptor,
        destination: &Path,
    ) -> Result<LocalArtifact, EtlError> {
        let download_error = |reason: String| EtlError::Download {
            extract_id: extract.id.clone(),
            reason,
        };

        let path = format!("datasources/{}/content", extract.id);
        let mut response = self
            .client
            .site_get(&path, &[("includeExtract", "true")])
            .await
            .map_err(|e| download_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => EtlError::Authentication(
                    format!("Download of {} rejected ({}): {}", extract, status, body),
                ),
                StatusCode::NOT_FOUND => download_error(format!("extract unavailable: {}", body)),
                _ => download_error(format!("HTTP {}: {}", status, body)),
            });
        }

        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(|e| download_error(format!("cannot create {}: {}", destination.display(), e)))?;

        let mut written: u64 = 0;
        let copied: Result<(), EtlError> = async {
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| download_error(format!("transfer interrupted: {}", e)))?
            {
                file.write_all(&chunk)
                    .await
                    .map_err(|e| download_error(e.to_string()))?;
                written += chunk.len() as u64;
            }
            file.flush().await.map_err(|e| download_error(e.to_string()))
        }
        .await;

        if let Err(e) = copied {
            drop(file);
            let _ = tokio::fs::remove_file(destination).await;
            return Err(e);
        }

        log::debug!("Downloaded {} byte(s) to {}", written, destination.display());
        Ok(LocalArtifact::new(
            extract.id.clone(),
            destination,
            ArtifactKind::Archive,
        ))
    }
}
