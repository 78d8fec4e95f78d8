//! Warehouse object naming
//!
//! Data source display names become unquoted Snowflake identifiers:
//! uppercase, with anything outside `[A-Z0-9_]` replaced by `_`.

use crate::error::EtlError;
use crate::model::{ExtractDescriptor, LoadTarget};
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::LazyLock;

static INVALID_IDENTIFIER_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_]").expect("valid identifier regex"));

/// Turn a display name into an unquoted identifier
///
/// `"Sales Insights"` becomes `SALES_INSIGHTS`. Names starting with a digit
/// get a leading underscore.
pub fn sanitize_identifier(name: &str) -> String {
    let replaced = INVALID_IDENTIFIER_CHARS
        .replace_all(name.trim(), "_")
        .to_uppercase();
    match replaced.chars().next() {
        Some(c) if c.is_ascii_digit() => format!("_{}", replaced),
        Some(_) => replaced,
        None => "_".to_string(),
    }
}

/// Builds load targets for a run's extracts
#[derive(Debug, Clone)]
pub struct TableNamer {
    schema: String,
    prefix: Option<String>,
}

impl TableNamer {
    pub fn new(schema: &str, prefix: Option<&str>) -> Self {
        let prefix = prefix
            .map(|p| sanitize_identifier(p).trim_end_matches('_').to_string())
            .filter(|p| !p.is_empty());
        Self {
            schema: sanitize_identifier(schema),
            prefix,
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Table name for one extract, `PREFIX_NAME` or `NAME`
    pub fn table_name(&self, extract: &ExtractDescriptor) -> String {
        let name = sanitize_identifier(&extract.name);
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, name),
            None => name,
        }
    }

    /// Target for a table assigned by [`TableNamer::plan`]
    pub fn target(&self, table: &str, source: impl Into<PathBuf>, run_id: &str) -> LoadTarget {
        LoadTarget {
            schema: self.schema.clone(),
            table: table.to_string(),
            source: source.into(),
            run_id: run_id.to_string(),
        }
    }

    /// Assign table names for every extract, in discovery order
    ///
    /// The first extract to claim a name keeps it. Later extracts with the
    /// same name get a `TableNameCollision` error instead of a name.
    pub fn plan(&self, extracts: &[ExtractDescriptor]) -> Vec<Result<String, EtlError>> {
        let mut owners: HashMap<String, &str> = HashMap::new();
        extracts
            .iter()
            .map(|extract| {
                let table = self.table_name(extract);
                match owners.get(&table) {
                    Some(owner_id) => Err(EtlError::TableNameCollision {
                        table: format!("{}.{}", self.schema, table),
                        owner_id: owner_id.to_string(),
                    }),
                    None => {
                        owners.insert(table.clone(), &extract.id);
                        Ok(table)
                    }
                }
            })
            .collect()
    }
}
