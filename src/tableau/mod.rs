//! Tableau Cloud as an extract source
//!
//! Provides [`TableauSource`], which finds the published data sources of a
//! project and downloads them with their extracts.

mod datasources;
mod response;

pub use datasources::TableauSource;
