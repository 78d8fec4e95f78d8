//! Warehouse loading: stage, infer, replace

use crate::error::{EtlError, chain};
use crate::model::LoadTarget;
use crate::naming::sanitize_identifier;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use eyre::Result;
use owo_colors::OwoColorize;
use std::sync::Arc;

/// Names of the warehouse objects used while loading one table
///
/// Both names carry the run id, so concurrent runs never share a stage and a
/// stage kept after a failure survives later runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingArea {
    /// Internal stage receiving the uploaded file, `SCHEMA.STAGE_TABLE_RUN`
    pub stage: String,
    /// Parquet file format, `SCHEMA.TABLE_RUN_PARQUET_FMT`
    pub file_format: String,
}

impl StagingArea {
    pub fn for_target(target: &LoadTarget) -> Self {
        let run = sanitize_identifier(&target.run_id);
        Self {
            stage: format!("{}.STAGE_{}_{}", target.schema, target.table, run),
            file_format: format!("{}.{}_{}_PARQUET_FMT", target.schema, target.table, run),
        }
    }
}

/// A cloud warehouse able to bulk-load Parquet files
///
/// Each method is one sub-step of a table load. The [`WarehouseLoader`]
/// sequences them and classifies their failures.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Open the session and make sure `schema` exists
    async fn prepare(&self, schema: &str) -> Result<()>;

    /// Upload `target.source` into a fresh stage
    async fn stage_file(&self, target: &LoadTarget, area: &StagingArea) -> Result<()>;

    /// Create or replace the table from the schema inferred on the staged file
    async fn create_table(&self, target: &LoadTarget, area: &StagingArea) -> Result<()>;

    /// Copy the staged data into the table
    async fn copy_into(&self, target: &LoadTarget, area: &StagingArea) -> Result<()>;

    /// Remove the stage after a successful load
    async fn drop_stage(&self, area: &StagingArea) -> Result<()>;
}

/// Loads converted files into warehouse tables, replacing prior contents
#[derive(Clone)]
pub struct WarehouseLoader {
    warehouse: Arc<dyn Warehouse>,
    retry: RetryPolicy,
}

impl WarehouseLoader {
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        Self {
            warehouse,
            retry: RetryPolicy::single_attempt(),
        }
    }

    /// Retry policy for the upload sub-step
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Open the warehouse session before any extract is processed
    pub async fn prepare(&self, schema: &str) -> Result<(), EtlError> {
        self.warehouse.prepare(schema).await.map_err(|e| {
            EtlError::Authentication(format!("warehouse session failed: {}", chain(&e)))
        })
    }

    /// Stage, infer and replace one table
    ///
    /// # Errors
    /// `Staging`, `SchemaInference` or `Load` depending on the sub-step that
    /// failed. After a failed inference or load the stage is kept so the
    /// staged file can be inspected.
    pub async fn load(&self, target: &LoadTarget) -> Result<(), EtlError> {
        let area = StagingArea::for_target(target);
        let table = target.qualified_name();

        log::info!(
            "Staging {} into {}",
            target.source.display().bright_black(),
            area.stage.cyan()
        );
        let staging = &area;
        self.retry
            .run("stage upload", || async move {
                self.warehouse
                    .stage_file(target, staging)
                    .await
                    .map_err(|e| EtlError::Staging {
                        stage: staging.stage.clone(),
                        reason: chain(&e),
                    })
            })
            .await?;

        log::info!("Creating structured data table: {}", table.cyan());
        if let Err(e) = self.warehouse.create_table(target, &area).await {
            log::warn!("Leaving staged file in {} for inspection", area.stage);
            return Err(EtlError::SchemaInference {
                table,
                reason: chain(&e),
            });
        }

        log::info!("Copying parquet data to {}", table.cyan());
        if let Err(e) = self.warehouse.copy_into(target, &area).await {
            log::warn!("Leaving staged file in {} for inspection", area.stage);
            return Err(EtlError::Load {
                table,
                reason: chain(&e),
            });
        }

        if let Err(e) = self.warehouse.drop_stage(&area).await {
            log::warn!("Failed to drop stage {}: {}", area.stage, chain(&e));
        }

        Ok(())
    }
}
