//! Statements issued while loading one table
//!
//! Schema and table names come out of the table namer already upper-cased
//! and restricted to `[A-Z0-9_]`, so they are used unquoted.

use crate::etl::StagingArea;
use crate::model::LoadTarget;
use std::path::Path;

pub fn create_schema(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", schema)
}

/// Session-scoped Parquet format with logical types
pub fn create_file_format(area: &StagingArea) -> String {
    format!(
        "CREATE OR REPLACE TEMPORARY FILE FORMAT {} TYPE = PARQUET USE_LOGICAL_TYPE = TRUE BINARY_AS_TEXT = FALSE",
        area.file_format
    )
}

/// Permanent stage, so a failed load leaves its file behind
pub fn create_stage(area: &StagingArea) -> String {
    format!("CREATE OR REPLACE STAGE {}", area.stage)
}

pub fn put_file(source: &Path, area: &StagingArea) -> String {
    format!(
        "PUT file://{} @{} AUTO_COMPRESS = FALSE OVERWRITE = TRUE",
        source.display(),
        area.stage
    )
}

/// Table whose columns are inferred from the staged Parquet file
///
/// The old table survives a failed inference.
pub fn create_table_from_stage(target: &LoadTarget, area: &StagingArea) -> String {
    format!(
        "CREATE OR REPLACE TRANSIENT TABLE {} USING TEMPLATE (\
         SELECT ARRAY_AGG(OBJECT_CONSTRUCT(*)) FROM TABLE(INFER_SCHEMA(\
         LOCATION => '@{}', FILE_FORMAT => '{}', IGNORE_CASE => TRUE)))",
        target.qualified_name(),
        area.stage,
        area.file_format
    )
}

pub fn copy_into(target: &LoadTarget, area: &StagingArea) -> String {
    format!(
        "COPY INTO {} FROM @{} FILE_FORMAT = (FORMAT_NAME = '{}') \
         MATCH_BY_COLUMN_NAME = CASE_INSENSITIVE PURGE = TRUE",
        target.qualified_name(),
        area.stage,
        area.file_format
    )
}

pub fn drop_stage(area: &StagingArea) -> String {
    format!("DROP STAGE IF EXISTS {}", area.stage)
}
