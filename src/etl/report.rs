//! Run report: where each extract got to

use crate::error::EtlError;
use crate::model::{ExtractDescriptor, LocalArtifact, Stage};
use owo_colors::OwoColorize;
use std::fmt;

/// Terminal status of one extract
#[derive(Debug)]
pub enum Outcome {
    /// Table replaced with `rows` rows
    Loaded { rows: u64 },
    /// Pipeline stopped while trying to reach `at`
    Failed { at: Stage, error: EtlError },
}

/// Report entry for a single extract
#[derive(Debug)]
pub struct ExtractReport {
    pub extract: ExtractDescriptor,
    /// Last stage completed successfully
    pub reached: Stage,
    /// `SCHEMA.TABLE`, when a table name was assigned
    pub table: Option<String>,
    /// Every artifact produced, in stage order
    pub artifacts: Vec<LocalArtifact>,
    pub outcome: Outcome,
}

impl ExtractReport {
    pub fn is_loaded(&self) -> bool {
        matches!(self.outcome, Outcome::Loaded { .. })
    }

    /// Stage the extract failed at, if it failed
    pub fn failed_at(&self) -> Option<Stage> {
        match &self.outcome {
            Outcome::Failed { at, .. } => Some(*at),
            Outcome::Loaded { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&EtlError> {
        match &self.outcome {
            Outcome::Failed { error, .. } => Some(error),
            Outcome::Loaded { .. } => None,
        }
    }
}

impl fmt::Display for ExtractReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.as_deref().unwrap_or("-");
        match &self.outcome {
            Outcome::Loaded { rows } => write!(
                f,
                "{} {} → {} ({} rows)",
                "✓".green(),
                self.extract,
                table,
                rows
            ),
            Outcome::Failed { at, error } => write!(
                f,
                "{} {} failed at {}: {}",
                "✗".red(),
                self.extract,
                at.yellow(),
                error
            ),
        }
    }
}

/// In-memory report of one run, in discovery order
#[derive(Debug, Default)]
pub struct RunReport {
    pub run_id: String,
    pub entries: Vec<ExtractReport>,
}

impl RunReport {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: ExtractReport) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn loaded(&self) -> usize {
        self.entries.iter().filter(|e| e.is_loaded()).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.loaded()
    }

    /// True when every discovered extract was loaded (vacuously for none)
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn entry(&self, extract_id: &str) -> Option<&ExtractReport> {
        self.entries.iter().find(|e| e.extract.id == extract_id)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExtractReport> {
        self.entries.iter().filter(|e| !e.is_loaded())
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Run {}: {} extract(s), {} loaded, {} failed",
            self.run_id,
            self.len(),
            self.loaded(),
            self.failed()
        )?;
        for entry in &self.entries {
            writeln!(f, "  {}", entry)?;
        }
        Ok(())
    }
}
