//! Format conversion: `.hyper` database to Parquet

use crate::error::{EtlError, chain};
use crate::model::{ArtifactKind, LocalArtifact};
use crate::storage::Workspace;
use async_trait::async_trait;
use eyre::Result;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// A `schema.table` relation inside an extract database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Parse `schema.table` or `table` (schema `public`)
    ///
    /// Surrounding double quotes on either part are stripped.
    pub fn parse(value: &str) -> Result<Self> {
        let parts: Vec<&str> = value
            .split('.')
            .map(|part| part.trim().trim_matches('"'))
            .collect();
        match parts.as_slice() {
            [name] if !name.is_empty() => Ok(Self::new("public", *name)),
            [schema, name] if !schema.is_empty() && !name.is_empty() => {
                Ok(Self::new(*schema, *name))
            }
            _ => eyre::bail!("Expected a table as 'schema.table', got '{}'", value),
        }
    }
}

fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Renders as a quoted SQL name, `"public"."Extract"`
impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}",
            quote_identifier(&self.schema),
            quote_identifier(&self.name)
        )
    }
}

/// An embedded analytical engine able to export a relation as Parquet
#[async_trait]
pub trait ExtractEngine: Send + Sync {
    /// Export `table` of the database at `database` into `output`
    ///
    /// The database is only read. Returns the number of exported rows.
    async fn export(&self, database: &Path, table: &TableRef, output: &Path) -> Result<u64>;
}

/// Result of converting one extract
#[derive(Debug, Clone)]
pub struct Conversion {
    pub artifact: LocalArtifact,
    pub rows: u64,
}

/// Turns `unpacked` artifacts into `converted` ones through an engine
#[derive(Clone)]
pub struct FormatConverter {
    engine: Arc<dyn ExtractEngine>,
    table: TableRef,
}

impl FormatConverter {
    pub fn new(engine: Arc<dyn ExtractEngine>, table: TableRef) -> Self {
        Self { engine, table }
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    /// Export the configured table of an unpacked database to Parquet
    ///
    /// # Errors
    /// Returns `EtlError::Conversion` if the engine cannot open the file or
    /// rejects the export. A partially written output is removed.
    pub async fn convert(
        &self,
        unpacked: &LocalArtifact,
        workspace: &Workspace,
    ) -> Result<Conversion, EtlError> {
        if unpacked.kind != ArtifactKind::Unpacked {
            return Err(EtlError::Conversion {
                path: unpacked.path.clone(),
                reason: format!("expected an unpacked artifact, got {}", unpacked.kind),
            });
        }
        if !unpacked.path.is_file() {
            return Err(EtlError::Conversion {
                path: unpacked.path.clone(),
                reason: "database file does not exist".to_string(),
            });
        }

        let output = workspace.claim(&unpacked.extract_id, ArtifactKind::Converted)?;
        log::debug!(
            "Exporting {} from {} to {}",
            self.table,
            unpacked.path.display(),
            output.display()
        );

        match self.engine.export(&unpacked.path, &self.table, &output).await {
            Ok(rows) => Ok(Conversion {
                artifact: LocalArtifact::new(
                    unpacked.extract_id.clone(),
                    output,
                    ArtifactKind::Converted,
                ),
                rows,
            }),
            Err(e) => {
                if output.exists() {
                    let _ = std::fs::remove_file(&output);
                }
                Err(EtlError::Conversion {
                    path: unpacked.path.clone(),
                    reason: chain(&e),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct StubEngine {
        fail: bool,
    }

    #[async_trait]
    impl ExtractEngine for StubEngine {
        async fn export(&self, _database: &Path, table: &TableRef, output: &Path) -> Result<u64> {
            std::fs::write(output, b"PAR1")?;
            if self.fail {
                eyre::bail!("table {} does not exist", table);
            }
            Ok(7)
        }
    }

    fn unpacked(workspace: &Workspace) -> LocalArtifact {
        let path = workspace.claim("ds-1", ArtifactKind::Unpacked).unwrap();
        std::fs::write(&path, b"hyper").unwrap();
        LocalArtifact::new("ds-1", path, ArtifactKind::Unpacked)
    }

    #[test]
    fn test_table_ref_parse() {
        assert_eq!(
            TableRef::parse("public.Extract").unwrap(),
            TableRef::new("public", "Extract")
        );
        assert_eq!(
            TableRef::parse("\"Extract\".\"Extract\"").unwrap(),
            TableRef::new("Extract", "Extract")
        );
        assert_eq!(TableRef::parse("Extract").unwrap(), TableRef::new("public", "Extract"));
        assert!(TableRef::parse("").is_err());
        assert!(TableRef::parse("a.b.c").is_err());
        assert!(TableRef::parse(".b").is_err());
    }

    #[test]
    fn test_table_ref_display_quotes() {
        assert_eq!(
            TableRef::new("public", "Extract").to_string(),
            "\"public\".\"Extract\""
        );
        assert_eq!(TableRef::new("s", "we\"ird").to_string(), "\"s\".\"we\"\"ird\"");
    }

    #[tokio::test]
    async fn test_convert_success() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = Workspace::create(temp_dir.path(), "run", false).unwrap();
        let converter = FormatConverter::new(
            Arc::new(StubEngine { fail: false }),
            TableRef::new("public", "Extract"),
        );

        let conversion = converter.convert(&unpacked(&workspace), &workspace).await.unwrap();
        assert_eq!(conversion.rows, 7);
        assert_eq!(conversion.artifact.kind, ArtifactKind::Converted);
        assert_eq!(conversion.artifact.path, workspace.root().join("ds-1.parquet"));
    }

    #[tokio::test]
    async fn test_convert_failure_removes_output() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = Workspace::create(temp_dir.path(), "run", false).unwrap();
        let converter = FormatConverter::new(
            Arc::new(StubEngine { fail: true }),
            TableRef::new("public", "Missing"),
        );

        let err = converter
            .convert(&unpacked(&workspace), &workspace)
            .await
            .unwrap_err();
        match err {
            EtlError::Conversion { reason, .. } => assert!(reason.contains("does not exist")),
            other => panic!("expected conversion error, got {:?}", other),
        }
        assert!(!workspace.root().join("ds-1.parquet").exists());
    }

    #[tokio::test]
    async fn test_convert_missing_database() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = Workspace::create(temp_dir.path(), "run", false).unwrap();
        let converter = FormatConverter::new(
            Arc::new(StubEngine { fail: false }),
            TableRef::new("public", "Extract"),
        );
        let artifact = LocalArtifact::new(
            "ds-1",
            workspace.root().join("ds-1.hyper"),
            ArtifactKind::Unpacked,
        );

        let err = converter.convert(&artifact, &workspace).await.unwrap_err();
        assert!(matches!(err, EtlError::Conversion { .. }));
    }
}
