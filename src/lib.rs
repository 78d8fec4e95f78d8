//! Admin Insights ETL
//!
//! Full-refresh loader for Tableau Cloud "Admin Insights" extracts: every
//! published data source of a project is downloaded, its `.hyper` database
//! exported to Parquet, and the result loaded into a Snowflake table.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod etl;
pub mod hyperd;
pub mod model;
pub mod naming;
pub mod retry;
pub mod snowflake;
pub mod storage;
pub mod tableau;

// Re-exports for convenience
pub use client::{PersonalAccessToken, TableauClient};
pub use config::Config;
pub use error::EtlError;
pub use etl::{
    ExtractEngine, ExtractSource, FormatConverter, RunOrchestrator, RunReport, Warehouse,
    WarehouseLoader,
};
pub use storage::{ArchiveUnpacker, Workspace};
