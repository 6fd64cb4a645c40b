// ==============================================================================
// parsers/mod.rs - File parser modules
// ==============================================================================
// Description: Parsers for clustering tables and network graph documents
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

pub mod external_clusters;
pub mod graphml;
pub mod network_summary;

pub use external_clusters::ExternalClusterTable;
pub use graphml::{GraphDocument, GraphNode};
pub use network_summary::NetworkSummary;

use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::path::Path;

use crate::error::{ClusterError, Result};

/// Read the first two columns of a delimited table, skipping the header row
pub(crate) fn read_key_value_rows(path: &Path) -> Result<Vec<(String, String)>> {
    let file = File::open(path).map_err(|e| ClusterError::storage(path, e))?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(file);

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        match (record.get(0), record.get(1)) {
            (Some(key), Some(value)) if !key.is_empty() => {
                rows.push((key.trim_matches('"').to_string(), value.trim_matches('"').to_string()));
            }
            _ => {
                return Err(ClusterError::InvalidInput(format!(
                    "{:?} row {} has fewer than two columns",
                    path,
                    idx + 2
                )));
            }
        }
    }

    Ok(rows)
}
