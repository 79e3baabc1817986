// Copyright 2026 Authrecon Contributors
// SPDX-License-Identifier: Apache-2.0

//! Reconciliation and merge engine.
//!
//! Reads the downloaded spreadsheet, queries the subscriber directory
//! once per row identifier, and writes an enriched copy. Per-row failures
//! are absorbed (fail-open): the dataset legitimately contains
//! identifiers with no directory record, and aborting the batch on the
//! first miss would make the tool useless on real inputs.

pub mod client;
pub mod model;

use crate::config::EnrichConfig;
use crate::sheet::{self, DEFAULT_HEADER_ROW};
use crate::types::{DataLoadError, EnrichmentSummary};
use client::DirectoryClient;
use futures::stream::{self, StreamExt};
use model::{Connection, ENRICHMENT_COLUMNS};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Column that keys spreadsheet rows to directory records.
pub const IDENTIFIER_COLUMN: &str = "username";

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Bounded worker pool for per-row directory queries.
    pub concurrency: usize,
    /// Zero-based header row index of the input spreadsheet.
    pub header_row: usize,
    /// Per-request timeout against the directory.
    pub request_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            header_row: DEFAULT_HEADER_ROW,
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct Engine {
    client: DirectoryClient,
    opts: EngineOptions,
}

impl Engine {
    pub fn new(cfg: &EnrichConfig, opts: EngineOptions) -> Self {
        Self {
            client: DirectoryClient::new(cfg, opts.request_timeout),
            opts,
        }
    }

    /// Enrich `input` into `output` and return the output path with a run
    /// summary. Fails only when the input cannot be loaded, lacks the
    /// identifier column, or the output cannot be written — never because
    /// of individual rows.
    pub async fn process(
        &self,
        input: &Path,
        output: &Path,
        cancel: Arc<Notify>,
    ) -> Result<(PathBuf, EnrichmentSummary), DataLoadError> {
        let mut table = sheet::load(input, self.opts.header_row)?;
        let id_col = table
            .column_index(IDENTIFIER_COLUMN)
            .ok_or_else(|| DataLoadError::MissingColumn(IDENTIFIER_COLUMN.into()))?;

        // Output schema is stable even when zero rows match.
        let base_width = table.headers.len();
        table.add_columns(&ENRICHMENT_COLUMNS);

        let identifiers: Vec<(usize, String)> = table
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| (i, row[id_col].trim().to_string()))
            .collect();

        let mut summary = EnrichmentSummary {
            rows: identifiers.len(),
            ..Default::default()
        };

        let client = &self.client;
        let mut lookups = stream::iter(identifiers)
            .map(|(i, id)| async move {
                if id.is_empty() {
                    return (i, id, Ok(Vec::new()));
                }
                let result = client.lookup(&id).await;
                (i, id, result)
            })
            .buffer_unordered(self.opts.concurrency.max(1));

        loop {
            let next = tokio::select! {
                _ = cancel.notified() => return Err(DataLoadError::Cancelled),
                next = lookups.next() => next,
            };
            let Some((row, identifier, result)) = next else {
                break;
            };

            match result {
                Ok(connections) => {
                    match accept_connection(&connections, &identifier) {
                        Some(connection) => {
                            let values = connection.project().into_values();
                            for (offset, value) in values.into_iter().enumerate() {
                                table.set(row, base_width + offset, value);
                            }
                            summary.matched += 1;
                        }
                        None => {
                            debug!(identifier = %identifier, "no directory match");
                            summary.unmatched += 1;
                        }
                    }
                }
                Err(e) => {
                    // Fail-open: the row keeps its default empty columns.
                    let cause = format!("{e:#}");
                    warn!(identifier = %identifier, cause = %cause, "enrichment failed for row");
                    summary.failed += 1;
                }
            }
        }

        sheet::write(&table, output)?;
        info!(
            rows = summary.rows,
            matched = summary.matched,
            unmatched = summary.unmatched,
            failed = summary.failed,
            output = %output.display(),
            "reconciliation finished"
        );
        Ok((output.to_path_buf(), summary))
    }
}

/// Accept only a connection whose returned identifier equals the row's.
/// The filter upstream is supposed to guarantee this; the merge step does
/// not assume it silently. First match wins.
fn accept_connection<'a>(connections: &'a [Connection], identifier: &str) -> Option<&'a Connection> {
    connections
        .iter()
        .find(|c| c.username.as_deref() == Some(identifier))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(username: Option<&str>) -> Connection {
        Connection {
            username: username.map(str::to_string),
            person: None,
            street: None,
        }
    }

    #[test]
    fn accepts_only_the_matching_identifier() {
        let conns = vec![named(Some("other")), named(Some("alice")), named(None)];
        let hit = accept_connection(&conns, "alice").unwrap();
        assert_eq!(hit.username.as_deref(), Some("alice"));
        assert!(accept_connection(&conns, "carol").is_none());
    }

    #[test]
    fn first_match_wins_among_duplicates() {
        let mut first = named(Some("alice"));
        first.person = Some(model::Person {
            name: Some("First".into()),
            ..Default::default()
        });
        let mut second = named(Some("alice"));
        second.person = Some(model::Person {
            name: Some("Second".into()),
            ..Default::default()
        });

        let conns = vec![first, second];
        let hit = accept_connection(&conns, "alice").unwrap();
        assert_eq!(hit.project().name, "First");
    }
}
