//! `.tdsx` archive unpacking
//!
//! A packaged data source is a zip container holding the `.tds` definition
//! and, for extracts, one `.hyper` database under `Data/Extracts/`.

use super::Workspace;
use crate::error::EtlError;
use crate::model::{ArtifactKind, LocalArtifact};
use std::fs::File;
use std::path::Path;

/// Takes the single database file out of a downloaded archive
#[derive(Debug, Clone)]
pub struct ArchiveUnpacker {
    extension: String,
}

impl Default for ArchiveUnpacker {
    fn default() -> Self {
        Self::new("hyper")
    }
}

impl ArchiveUnpacker {
    /// Match archive entries ending in `.<extension>` (case-insensitive)
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: format!(".{}", extension.into().trim_start_matches('.').to_lowercase()),
        }
    }

    /// Names of the archive entries that match the expected extension
    fn matching_entries(&self, archive: &zip::ZipArchive<File>) -> Vec<String> {
        archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .filter(|name| name.to_lowercase().ends_with(&self.extension))
            .map(|name| name.to_string())
            .collect()
    }

    /// Extract the database file of an `archive` artifact into the workspace
    ///
    /// # Errors
    /// Returns `EtlError::Format` if the file is not a zip archive or does
    /// not contain exactly one matching entry. No artifact is produced then.
    pub fn unpack(
        &self,
        archive: &LocalArtifact,
        workspace: &Workspace,
    ) -> Result<LocalArtifact, EtlError> {
        if archive.kind != ArtifactKind::Archive {
            return Err(format_error(
                &archive.path,
                format!("expected an archive artifact, got {}", archive.kind),
            ));
        }

        let file = File::open(&archive.path).map_err(|e| format_error(&archive.path, e))?;
        let mut zip = zip::ZipArchive::new(file).map_err(|e| format_error(&archive.path, e))?;

        let entries = self.matching_entries(&zip);
        let entry_name = match entries.as_slice() {
            [single] => single.clone(),
            [] => {
                return Err(format_error(
                    &archive.path,
                    format!("no {} file inside", self.extension),
                ));
            }
            many => {
                return Err(format_error(
                    &archive.path,
                    format!(
                        "{} {} files inside: {}",
                        many.len(),
                        self.extension,
                        many.join(", ")
                    ),
                ));
            }
        };

        let target = workspace.claim(&archive.extract_id, ArtifactKind::Unpacked)?;
        log::debug!("Extracting {} to {}", entry_name, target.display());

        let mut entry = zip
            .by_name(&entry_name)
            .map_err(|e| format_error(&archive.path, e))?;
        let mut output = File::create(&target)?;
        if let Err(e) = std::io::copy(&mut entry, &mut output) {
            drop(output);
            let _ = std::fs::remove_file(&target);
            return Err(format_error(
                &archive.path,
                format!("failed to extract {}: {}", entry_name, e),
            ));
        }

        Ok(LocalArtifact::new(
            archive.extract_id.clone(),
            target,
            ArtifactKind::Unpacked,
        ))
    }
}

fn format_error(path: &Path, reason: impl std::fmt::Display) -> EtlError {
    EtlError::Format {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_archive(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    fn archive_artifact(workspace: &Workspace, id: &str, entries: &[(&str, &str)]) -> LocalArtifact {
        let path = workspace.claim(id, ArtifactKind::Archive).unwrap();
        write_archive(&path, entries);
        LocalArtifact::new(id, path, ArtifactKind::Archive)
    }

    #[test]
    fn test_unpack_single_hyper() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = Workspace::create(temp_dir.path(), "run", false).unwrap();
        let archive = archive_artifact(
            &workspace,
            "ds-1",
            &[
                ("Sales Insights.tds", "<datasource/>"),
                ("Data/Extracts/sales_insights.hyper", "hyper-bytes"),
            ],
        );

        let unpacked = ArchiveUnpacker::default().unpack(&archive, &workspace).unwrap();
        assert_eq!(unpacked.kind, ArtifactKind::Unpacked);
        assert_eq!(unpacked.extract_id, "ds-1");
        assert_eq!(unpacked.path, workspace.root().join("ds-1.hyper"));
        assert_eq!(std::fs::read(&unpacked.path).unwrap(), b"hyper-bytes");
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = Workspace::create(temp_dir.path(), "run", false).unwrap();
        let archive = archive_artifact(&workspace, "ds-1", &[("Data/EXTRACT.HYPER", "x")]);
        assert!(ArchiveUnpacker::new(".hyper").unpack(&archive, &workspace).is_ok());
    }

    #[test]
    fn test_rejects_non_archive_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = Workspace::create(temp_dir.path(), "run", false).unwrap();
        let artifact = LocalArtifact::new("ds-1", workspace.root().join("x"), ArtifactKind::Unpacked);
        let err = ArchiveUnpacker::default().unpack(&artifact, &workspace).unwrap_err();
        assert!(matches!(err, EtlError::Format { .. }));
    }

    #[test]
    fn test_not_a_zip() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = Workspace::create(temp_dir.path(), "run", false).unwrap();
        let path = workspace.claim("ds-1", ArtifactKind::Archive).unwrap();
        std::fs::write(&path, b"<html>Service unavailable</html>").unwrap();
        let archive = LocalArtifact::new("ds-1", path, ArtifactKind::Archive);

        let err = ArchiveUnpacker::default().unpack(&archive, &workspace).unwrap_err();
        assert!(matches!(err, EtlError::Format { .. }));
        assert!(!workspace.path_for("ds-1", ArtifactKind::Unpacked).exists());
    }
}
