//! Local file handling
//!
//! This module owns everything the pipeline writes to disk:
//! - The run-scoped working directory and its artifact paths
//! - Unpacking `.tdsx` archives

mod archive;
mod workspace;

pub use archive::ArchiveUnpacker;
pub use workspace::Workspace;
