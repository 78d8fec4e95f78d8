//! Run orchestration
//!
//! Every discovered extract goes through
//! `discovered → fetched → unpacked → converted → loaded` on its own. A
//! failure stops that extract only; the run carries on with the others and
//! reports overall failure at the end.

use super::report::{ExtractReport, Outcome, RunReport};
use super::{ExtractSource, FormatConverter, WarehouseLoader};
use crate::error::EtlError;
use crate::model::{ArtifactKind, ExtractDescriptor, LocalArtifact, Stage};
use crate::naming::TableNamer;
use crate::retry::RetryPolicy;
use crate::storage::{ArchiveUnpacker, Workspace};
use owo_colors::OwoColorize;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Stages shared by every extract of a run
#[derive(Clone)]
struct ExtractPipeline {
    source: Arc<dyn ExtractSource>,
    unpacker: ArchiveUnpacker,
    converter: FormatConverter,
    loader: WarehouseLoader,
    namer: TableNamer,
    fetch_retry: RetryPolicy,
}

/// Bookkeeping for one extract while it moves through the stages
struct Progress {
    extract: ExtractDescriptor,
    reached: Stage,
    table: Option<String>,
    artifacts: Vec<LocalArtifact>,
}

impl Progress {
    fn new(extract: ExtractDescriptor) -> Self {
        Self {
            extract,
            reached: Stage::Discovered,
            table: None,
            artifacts: Vec::new(),
        }
    }

    fn advance(&mut self, stage: Stage, artifact: Option<&LocalArtifact>) {
        log::debug!("{} reached {}", self.extract, stage);
        self.reached = stage;
        if let Some(artifact) = artifact {
            self.artifacts.push(artifact.clone());
        }
    }

    fn finish(self, result: Result<u64, EtlError>) -> ExtractReport {
        let outcome = match result {
            Ok(rows) => Outcome::Loaded { rows },
            Err(error) => {
                let at = self.reached.next().unwrap_or(Stage::Loaded);
                log::error!("{} failed at {}: {}", self.extract, at, error);
                Outcome::Failed { at, error }
            }
        };
        ExtractReport {
            extract: self.extract,
            reached: self.reached,
            table: self.table,
            artifacts: self.artifacts,
            outcome,
        }
    }
}

impl ExtractPipeline {
    async fn process(
        &self,
        extract: ExtractDescriptor,
        table: Result<String, EtlError>,
        workspace: &Arc<Workspace>,
    ) -> ExtractReport {
        let mut progress = Progress::new(extract);
        let table = match table {
            Ok(table) => table,
            Err(e) => return progress.finish(Err(e)),
        };
        progress.table = Some(format!("{}.{}", self.namer.schema(), table));

        let result = self.run_stages(&mut progress, table, workspace).await;
        progress.finish(result)
    }

    async fn run_stages(
        &self,
        progress: &mut Progress,
        table: String,
        workspace: &Arc<Workspace>,
    ) -> Result<u64, EtlError> {
        let extract = progress.extract.clone();

        log::info!("Downloading {}", extract.cyan());
        let destination = workspace.claim(&extract.id, ArtifactKind::Archive)?;
        let source = &self.source;
        let extract_ref = &extract;
        let destination_ref = destination.as_path();
        let archive = self
            .fetch_retry
            .run("download", move || source.fetch(extract_ref, destination_ref))
            .await?;
        progress.advance(Stage::Fetched, Some(&archive));

        log::info!("Extracting hyper file from {}", archive.path.display().bright_black());
        let unpacked = {
            let unpacker = self.unpacker.clone();
            let input = archive.clone();
            let workspace = Arc::clone(workspace);
            tokio::task::spawn_blocking(move || unpacker.unpack(&input, &workspace))
                .await
                .map_err(|e| EtlError::Format {
                    path: archive.path.clone(),
                    reason: format!("unpack task failed: {}", e),
                })??
        };
        workspace.discard(&archive.path);
        progress.advance(Stage::Unpacked, Some(&unpacked));

        log::info!(
            "Converting {} to parquet",
            unpacked.path.display().bright_black()
        );
        let conversion = self.converter.convert(&unpacked, workspace).await?;
        workspace.discard(&unpacked.path);
        progress.advance(Stage::Converted, Some(&conversion.artifact));

        let target = self
            .namer
            .target(&table, &conversion.artifact.path, workspace.run_id());
        self.loader.load(&target).await?;
        workspace.discard(&conversion.artifact.path);
        progress.advance(Stage::Loaded, None);

        log::info!(
            "✓ Loaded {} row(s) of {} into {}",
            conversion.rows,
            extract,
            target.qualified_name().green()
        );
        Ok(conversion.rows)
    }
}

/// Sequences discovery, the per-extract stages, and the run report
///
/// # Example
/// ```no_run
/// use admin_insights_etl::etl::{ExtractSource, FormatConverter, RunOrchestrator, WarehouseLoader};
/// use admin_insights_etl::naming::TableNamer;
/// use admin_insights_etl::storage::Workspace;
/// use std::sync::Arc;
///
/// # async fn example(
/// #     source: Arc<dyn ExtractSource>,
/// #     converter: FormatConverter,
/// #     loader: WarehouseLoader,
/// # ) -> eyre::Result<()> {
/// let orchestrator = RunOrchestrator::new(
///     source,
///     converter,
///     loader,
///     TableNamer::new("TABLEAU_CLOUD", None),
///     "Admin Insights",
/// );
/// let workspace = Arc::new(Workspace::create(".", &Workspace::new_run_id(), false)?);
/// let report = orchestrator.run(workspace).await?;
/// println!("{}", report);
/// # Ok(())
/// # }
/// ```
pub struct RunOrchestrator {
    pipeline: ExtractPipeline,
    project: String,
    concurrency: usize,
}

impl RunOrchestrator {
    pub fn new(
        source: Arc<dyn ExtractSource>,
        converter: FormatConverter,
        loader: WarehouseLoader,
        namer: TableNamer,
        project: impl Into<String>,
    ) -> Self {
        Self {
            pipeline: ExtractPipeline {
                source,
                unpacker: ArchiveUnpacker::default(),
                converter,
                loader,
                namer,
                fetch_retry: RetryPolicy::single_attempt(),
            },
            project: project.into(),
            concurrency: 1,
        }
    }

    /// Process up to `concurrency` extracts at the same time (default 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Retry policy for downloads
    pub fn with_fetch_retry(mut self, retry: RetryPolicy) -> Self {
        self.pipeline.fetch_retry = retry;
        self
    }

    /// Discover the project's extracts and run each through every stage
    ///
    /// # Errors
    /// Only errors that make the run pointless are returned: the warehouse
    /// session cannot be opened, the platform rejects the credentials, or
    /// the project does not exist. Per-extract failures end up in the
    /// report instead.
    pub async fn run(&self, workspace: Arc<Workspace>) -> Result<RunReport, EtlError> {
        log::info!(
            "Starting run {} in {}",
            workspace.run_id().cyan(),
            workspace.root().display().bright_black()
        );

        self.pipeline
            .loader
            .prepare(self.pipeline.namer.schema())
            .await?;

        let extracts = self.pipeline.source.locate(&self.project).await?;
        log::info!(
            "Found {} data source(s) in project {}",
            extracts.len(),
            self.project.cyan()
        );

        let plan = self.pipeline.namer.plan(&extracts);
        let jobs: Vec<_> = extracts.into_iter().zip(plan).collect();

        let mut report = RunReport::new(workspace.run_id());
        if self.concurrency <= 1 {
            for (extract, table) in jobs {
                report.push(self.pipeline.process(extract, table, &workspace).await);
            }
        } else {
            for entry in self.run_parallel(jobs, &workspace).await {
                report.push(entry);
            }
        }

        if report.is_success() {
            // Every table is loaded; a leftover directory does not change that
            if let Err(e) = workspace.cleanup() {
                log::warn!(
                    "Failed to remove run directory {}: {}",
                    workspace.root().display(),
                    e
                );
            }
        } else {
            log::warn!(
                "Keeping run directory {} for inspection",
                workspace.root().display()
            );
        }

        log::info!(
            "Run complete: {} loaded, {} failed",
            report.loaded(),
            report.failed()
        );
        Ok(report)
    }

    /// Spawn one task per extract, bounded by a semaphore
    ///
    /// Tasks hand their entry back through their join handle and are
    /// collected in discovery order, so only this function writes the report.
    async fn run_parallel(
        &self,
        jobs: Vec<(ExtractDescriptor, Result<String, EtlError>)>,
        workspace: &Arc<Workspace>,
    ) -> Vec<ExtractReport> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(jobs.len());

        for (extract, table) in jobs {
            let pipeline = self.pipeline.clone();
            let workspace = Arc::clone(workspace);
            let semaphore = Arc::clone(&semaphore);
            let descriptor = extract.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                pipeline.process(extract, table, &workspace).await
            });
            handles.push((descriptor, handle));
        }

        let mut entries = Vec::with_capacity(handles.len());
        for (extract, handle) in handles {
            match handle.await {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    let error = EtlError::Io(std::io::Error::other(format!(
                        "extract task aborted: {}",
                        e
                    )));
                    entries.push(Progress::new(extract).finish(Err(error)));
                }
            }
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::{ExtractEngine, StagingArea, TableRef, Warehouse};
    use crate::model::LoadTarget;
    use async_trait::async_trait;
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;

    struct ZipSource {
        extracts: Vec<ExtractDescriptor>,
    }

    #[async_trait]
    impl ExtractSource for ZipSource {
        async fn locate(&self, _project: &str) -> Result<Vec<ExtractDescriptor>, EtlError> {
            Ok(self.extracts.clone())
        }

        async fn fetch(
            &self,
            extract: &ExtractDescriptor,
            destination: &Path,
        ) -> Result<LocalArtifact, EtlError> {
            let mut writer = zip::ZipWriter::new(std::fs::File::create(destination)?);
            writer
                .start_file("Data/Extracts/e.hyper", zip::write::SimpleFileOptions::default())
                .map_err(|e| EtlError::Download {
                    extract_id: extract.id.clone(),
                    reason: e.to_string(),
                })?;
            writer.write_all(b"5")?;
            writer.finish().map_err(|e| EtlError::Download {
                extract_id: extract.id.clone(),
                reason: e.to_string(),
            })?;
            Ok(LocalArtifact::new(extract.id.clone(), destination, ArtifactKind::Archive))
        }
    }

    struct CopyEngine;

    #[async_trait]
    impl ExtractEngine for CopyEngine {
        async fn export(&self, database: &Path, _table: &TableRef, output: &Path) -> eyre::Result<u64> {
            let rows: u64 = std::fs::read_to_string(database)?.trim().parse()?;
            std::fs::write(output, rows.to_string())?;
            Ok(rows)
        }
    }

    struct NullWarehouse;

    #[async_trait]
    impl Warehouse for NullWarehouse {
        async fn prepare(&self, _schema: &str) -> eyre::Result<()> {
            Ok(())
        }
        async fn stage_file(&self, _t: &LoadTarget, _a: &StagingArea) -> eyre::Result<()> {
            Ok(())
        }
        async fn create_table(&self, _t: &LoadTarget, _a: &StagingArea) -> eyre::Result<()> {
            Ok(())
        }
        async fn copy_into(&self, _t: &LoadTarget, _a: &StagingArea) -> eyre::Result<()> {
            Ok(())
        }
        async fn drop_stage(&self, _a: &StagingArea) -> eyre::Result<()> {
            Ok(())
        }
    }

    fn orchestrator(extracts: Vec<ExtractDescriptor>) -> RunOrchestrator {
        RunOrchestrator::new(
            Arc::new(ZipSource { extracts }),
            FormatConverter::new(Arc::new(CopyEngine), TableRef::new("public", "Extract")),
            WarehouseLoader::new(Arc::new(NullWarehouse)),
            TableNamer::new("TABLEAU_CLOUD", None),
            "Admin Insights",
        )
    }

    #[tokio::test]
    async fn test_sequential_run() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = Arc::new(Workspace::create(temp_dir.path(), "run-1", false).unwrap());
        let extracts = vec![
            ExtractDescriptor::new("ds-1", "Site Content", "Admin Insights"),
            ExtractDescriptor::new("ds-2", "TS Users", "Admin Insights"),
        ];

        let report = orchestrator(extracts).run(workspace.clone()).await.unwrap();
        assert_eq!(report.len(), 2);
        assert!(report.is_success());
        assert_eq!(report.entries[0].extract.id, "ds-1");
        assert_eq!(
            report.entries[1].table.as_deref(),
            Some("TABLEAU_CLOUD.TS_USERS")
        );
        assert_eq!(report.entries[0].artifacts.len(), 3);
        assert!(!workspace.root().exists());
    }

    #[tokio::test]
    async fn test_parallel_run_keeps_discovery_order() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = Arc::new(Workspace::create(temp_dir.path(), "run-1", false).unwrap());
        let extracts: Vec<_> = (0..6)
            .map(|i| ExtractDescriptor::new(format!("ds-{}", i), format!("Source {}", i), "Admin Insights"))
            .collect();

        let report = orchestrator(extracts)
            .with_concurrency(3)
            .run(workspace)
            .await
            .unwrap();
        assert_eq!(report.len(), 6);
        assert_eq!(report.loaded(), 6);
        let ids: Vec<_> = report.entries.iter().map(|e| e.extract.id.as_str()).collect();
        assert_eq!(ids, vec!["ds-0", "ds-1", "ds-2", "ds-3", "ds-4", "ds-5"]);
    }

    /// Empty project whose run directory disappears during discovery
    struct VanishingDirSource {
        root: std::path::PathBuf,
    }

    #[async_trait]
    impl ExtractSource for VanishingDirSource {
        async fn locate(&self, _project: &str) -> Result<Vec<ExtractDescriptor>, EtlError> {
            std::fs::remove_dir_all(&self.root)?;
            Ok(Vec::new())
        }

        async fn fetch(
            &self,
            extract: &ExtractDescriptor,
            _destination: &Path,
        ) -> Result<LocalArtifact, EtlError> {
            Err(EtlError::Download {
                extract_id: extract.id.clone(),
                reason: "not expected".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_cleanup_failure_keeps_the_report() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = Arc::new(Workspace::create(temp_dir.path(), "run-1", false).unwrap());
        let orchestrator = RunOrchestrator::new(
            Arc::new(VanishingDirSource {
                root: workspace.root().to_path_buf(),
            }),
            FormatConverter::new(Arc::new(CopyEngine), TableRef::new("public", "Extract")),
            WarehouseLoader::new(Arc::new(NullWarehouse)),
            TableNamer::new("TABLEAU_CLOUD", None),
            "Admin Insights",
        );

        let report = orchestrator.run(workspace).await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.len(), 0);
        assert_eq!(report.run_id, "run-1");
    }

    #[test]
    fn test_progress_failure_records_next_stage() {
        let mut progress = Progress::new(ExtractDescriptor::new("ds-1", "A", "P"));
        progress.advance(Stage::Fetched, None);
        let entry = progress.finish(Err(EtlError::Format {
            path: "ds-1.tdsx".into(),
            reason: "no .hyper file inside".to_string(),
        }));
        assert_eq!(entry.reached, Stage::Fetched);
        assert_eq!(entry.failed_at(), Some(Stage::Unpacked));
    }
}
