//! Run-scoped working directory
//!
//! Every run gets its own directory under the configured work dir, and every
//! stage writes into it through [`Workspace::claim`]. A path can be claimed
//! once per extract and artifact kind, so two stages never write the same
//! file within a run.

use crate::error::EtlError;
use crate::model::ArtifactKind;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Working directory owned by a single run
#[derive(Debug)]
pub struct Workspace {
    run_id: String,
    root: PathBuf,
    retain: bool,
    claimed: Mutex<HashSet<(String, ArtifactKind)>>,
}

impl Workspace {
    /// Create `<parent>/<run_id>/`
    ///
    /// Fails if the directory already exists: artifacts are never reused
    /// across runs.
    pub fn create(parent: impl AsRef<Path>, run_id: &str, retain: bool) -> Result<Self, EtlError> {
        let parent = parent.as_ref();
        std::fs::create_dir_all(parent)?;
        let root = parent.join(run_id);
        std::fs::create_dir(&root)?;
        log::debug!("Created run directory {}", root.display());
        Ok(Self {
            run_id: run_id.to_string(),
            root,
            retain,
            claimed: Mutex::new(HashSet::new()),
        })
    }

    /// A fresh run id: `run-<UTC timestamp>-<pid>`
    pub fn new_run_id() -> String {
        format!(
            "run-{}-{}",
            chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ"),
            std::process::id()
        )
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether intermediate files are kept after use
    pub fn retains_artifacts(&self) -> bool {
        self.retain
    }

    /// Reserve the path for an extract's artifact of the given kind
    pub fn claim(&self, extract_id: &str, kind: ArtifactKind) -> Result<PathBuf, EtlError> {
        let mut claimed = self
            .claimed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !claimed.insert((extract_id.to_string(), kind)) {
            return Err(EtlError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} artifact for '{}' already produced in this run", kind, extract_id),
            )));
        }
        Ok(self.path_for(extract_id, kind))
    }

    /// `<root>/<extract_id>.<ext>`, with path separators replaced
    pub fn path_for(&self, extract_id: &str, kind: ArtifactKind) -> PathBuf {
        let stem: String = extract_id
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' => '_',
                c => c,
            })
            .collect();
        let stem = if stem.starts_with('.') {
            format!("_{}", stem)
        } else {
            stem
        };
        self.root.join(format!("{}.{}", stem, kind.extension()))
    }

    /// Remove an artifact that the next stage has consumed
    pub fn discard(&self, path: &Path) {
        if self.retain {
            log::debug!("Keeping {}", path.display());
            return;
        }
        if let Err(e) = std::fs::remove_file(path) {
            log::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }

    /// Remove the run directory after a fully successful run
    pub fn cleanup(&self) -> Result<(), EtlError> {
        if self.retain {
            log::info!("Keeping run directory {}", self.root.display());
            return Ok(());
        }
        std::fs::remove_dir_all(&self.root)?;
        log::debug!("Removed run directory {}", self.root.display());
        Ok(())
    }
}
