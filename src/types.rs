//! Core data types and the error taxonomy shared by the driver and the
//! reconciliation engine.

use std::fmt;

/// Immutable input for one portal search.
///
/// Values are passed to the portal form exactly as given; callers are
/// responsible for format correctness (`YYYY-MM-DD`, `HH:MM:SS`, and an
/// IPv6 prefix such as `2804:145c:86f7:fc00::/56`).
#[derive(Debug, Clone)]
pub struct QueryParams {
    pub date: String,
    pub time: String,
    pub address: String,
}

impl QueryParams {
    pub fn new(date: impl Into<String>, time: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            time: time.into(),
            address: address.into(),
        }
    }
}

/// A named step in the driver's linear state machine.
///
/// The driver moves `Login → Navigate → Submit → AwaitResponse → Download`;
/// any failure aborts the whole sequence tagged with the stage it died in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Login,
    Navigate,
    Submit,
    AwaitResponse,
    Download,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Login => "login",
            Stage::Navigate => "navigate",
            Stage::Submit => "submit",
            Stage::AwaitResponse => "await-response",
            Stage::Download => "download",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A driver run failed. Fatal to the run; no artifact is exposed.
///
/// Retry policy, if any, belongs to the caller — the driver never retries
/// internally.
#[derive(thiserror::Error, Debug)]
#[error("automation failed at stage '{stage}': {source:#}")]
pub struct AutomationError {
    pub stage: Stage,
    #[source]
    pub source: anyhow::Error,
}

impl AutomationError {
    pub fn new(stage: Stage, source: impl Into<anyhow::Error>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}

/// The input spreadsheet could not be loaded or does not match the
/// expected schema. Fatal to a reconciliation run.
#[derive(thiserror::Error, Debug)]
pub enum DataLoadError {
    #[error("cannot open spreadsheet: {0}")]
    Open(String),

    #[error("spreadsheet has no usable sheet or rows")]
    EmptySheet,

    #[error("required column '{0}' not found in spreadsheet header")]
    MissingColumn(String),

    #[error("cannot write enriched spreadsheet: {0}")]
    Write(String),

    #[error("run cancelled")]
    Cancelled,
}

/// Summary of one reconciliation run.
///
/// Per-row failures are absorbed inside the engine and only counted here;
/// the run itself succeeds as long as the input could be read and the
/// output written.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentSummary {
    pub rows: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub failed: usize,
}
