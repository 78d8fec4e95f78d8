//! Extract pipeline stages
//!
//! This module defines the seams between the pipeline and the outside
//! world ([`ExtractSource`], [`ExtractEngine`], [`Warehouse`]), the stage
//! drivers built on them, and the [`RunOrchestrator`] that runs every
//! extract through the stages.

mod convert;
mod load;
mod pipeline;
mod report;
mod source;

pub use convert::{Conversion, ExtractEngine, FormatConverter, TableRef};
pub use load::{StagingArea, Warehouse, WarehouseLoader};
pub use pipeline::RunOrchestrator;
pub use report::{ExtractReport, Outcome, RunReport};
pub use source::ExtractSource;
