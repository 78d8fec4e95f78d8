//! Data carried between pipeline stages
//!
//! An [`ExtractDescriptor`] is discovered once per run. Each stage turns the
//! previous [`LocalArtifact`] into the next one, and the loader consumes a
//! [`LoadTarget`] built from the last artifact.

use std::fmt;
use std::path::PathBuf;

/// A published data source discovered on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractDescriptor {
    /// Platform-assigned identifier, unique within the site
    pub id: String,
    /// Display name, the input of table naming
    pub name: String,
    /// Name of the project the data source was found in
    pub project: String,
}

impl ExtractDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            project: project.into(),
        }
    }
}

impl fmt::Display for ExtractDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Which stage produced a local artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// `.tdsx` archive as downloaded
    Archive,
    /// `.hyper` database taken out of the archive
    Unpacked,
    /// `.parquet` export of the database
    Converted,
}

impl ArtifactKind {
    /// File extension used for artifacts of this kind
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Archive => "tdsx",
            Self::Unpacked => "hyper",
            Self::Converted => "parquet",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Archive => write!(f, "archive"),
            Self::Unpacked => write!(f, "unpacked"),
            Self::Converted => write!(f, "converted"),
        }
    }
}

/// A file on disk derived from one extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArtifact {
    pub extract_id: String,
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

impl LocalArtifact {
    pub fn new(extract_id: impl Into<String>, path: impl Into<PathBuf>, kind: ArtifactKind) -> Self {
        Self {
            extract_id: extract_id.into(),
            path: path.into(),
            kind,
        }
    }
}

/// Where a converted artifact ends up in the warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTarget {
    pub schema: String,
    pub table: String,
    pub source: PathBuf,
    /// Run the load belongs to; warehouse staging objects are named after it
    pub run_id: String,
}

impl LoadTarget {
    /// `SCHEMA.TABLE`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

/// Per-extract pipeline states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Discovered,
    Fetched,
    Unpacked,
    Converted,
    Loaded,
}

impl Stage {
    /// The stage that follows this one, if any
    pub fn next(&self) -> Option<Stage> {
        match self {
            Self::Discovered => Some(Self::Fetched),
            Self::Fetched => Some(Self::Unpacked),
            Self::Unpacked => Some(Self::Converted),
            Self::Converted => Some(Self::Loaded),
            Self::Loaded => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Discovered => "discovered",
            Self::Fetched => "fetched",
            Self::Unpacked => "unpacked",
            Self::Converted => "converted",
            Self::Loaded => "loaded",
        };
        write!(f, "{}", name)
    }
}
