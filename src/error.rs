//! Error taxonomy for the extract pipeline
//!
//! Stage errors are recorded against the extract that raised them; only
//! authentication and discovery errors end a run.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by pipeline stages
#[derive(Error, Debug)]
pub enum EtlError {
    /// Platform or warehouse rejected the credentials
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The requested project (or other remote object) does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The platform answered with something the client did not expect
    #[error("Platform request failed: {0}")]
    Platform(String),

    /// Downloading an extract archive failed
    #[error("Download of extract '{extract_id}' failed: {reason}")]
    Download { extract_id: String, reason: String },

    /// The archive does not hold exactly one database file
    #[error("Malformed archive {}: {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    /// The engine could not open the database or rejected the export
    #[error("Conversion of {} failed: {reason}", path.display())]
    Conversion { path: PathBuf, reason: String },

    /// Uploading the converted file to the warehouse stage failed
    #[error("Staging into {stage} failed: {reason}")]
    Staging { stage: String, reason: String },

    /// The warehouse could not infer a table definition from the staged file
    #[error("Schema inference for {table} failed: {reason}")]
    SchemaInference { table: String, reason: String },

    /// Copying the staged data into the table failed
    #[error("Load into {table} failed: {reason}")]
    Load { table: String, reason: String },

    /// Two extracts map to the same warehouse table
    #[error("Table {table} is already targeted by extract '{owner_id}'")]
    TableNameCollision { table: String, owner_id: String },

    /// Invalid or missing configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EtlError {
    /// Whether another attempt could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Download { .. } | Self::Staging { .. })
    }
}

/// Render an eyre report with its causes on one line
pub(crate) fn chain(report: &eyre::Report) -> String {
    report
        .chain()
        .map(|cause| cause.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}
