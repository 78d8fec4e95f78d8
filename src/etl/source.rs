//! Extract source trait: locating and downloading published extracts

use crate::error::EtlError;
use crate::model::{ExtractDescriptor, LocalArtifact};
use async_trait::async_trait;
use std::path::Path;

/// A platform that publishes data extracts
///
/// Implementors answer two questions: which extracts exist in a project,
/// and how to get one of them onto local disk.
///
/// # Example
/// ```no_run
/// use admin_insights_etl::etl::ExtractSource;
/// use admin_insights_etl::model::{ArtifactKind, ExtractDescriptor, LocalArtifact};
/// use admin_insights_etl::EtlError;
/// use async_trait::async_trait;
/// use std::path::Path;
///
/// struct FixtureSource;
///
/// #[async_trait]
/// impl ExtractSource for FixtureSource {
///     async fn locate(&self, project: &str) -> Result<Vec<ExtractDescriptor>, EtlError> {
///         Ok(vec![ExtractDescriptor::new("ds-1", "Sales Insights", project)])
///     }
///
///     async fn fetch(
///         &self,
///         extract: &ExtractDescriptor,
///         destination: &Path,
///     ) -> Result<LocalArtifact, EtlError> {
///         std::fs::copy("fixtures/sales.tdsx", destination)?;
///         Ok(LocalArtifact::new(extract.id.clone(), destination, ArtifactKind::Archive))
///     }
/// }
/// ```
#[async_trait]
pub trait ExtractSource: Send + Sync {
    /// List every published extract of `project`, in a stable order
    ///
    /// # Errors
    /// `Authentication` for rejected credentials, `NotFound` if the project
    /// does not exist. An empty project is not an error.
    async fn locate(&self, project: &str) -> Result<Vec<ExtractDescriptor>, EtlError>;

    /// Download one extract's archive to `destination`
    ///
    /// The destination belongs to this extract for the whole run, so a
    /// retried download overwrites the earlier attempt.
    ///
    /// # Errors
    /// `Download` on network or IO failure, or if the extract is unavailable.
    async fn fetch(
        &self,
        extract: &ExtractDescriptor,
        destination: &Path,
    ) -> Result<LocalArtifact, EtlError>;
}
