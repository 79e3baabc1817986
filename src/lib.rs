// Copyright 2026 Authrecon Contributors
// SPDX-License-Identifier: Apache-2.0

//! Authrecon library — portal record extraction and subscriber enrichment.
//!
//! Two components run in sequence: the [`driver`] logs into a web portal,
//! submits a search and captures the exported spreadsheet; the [`enrich`]
//! engine looks each exported row up in a subscriber directory and writes
//! an enriched spreadsheet next to the original.

pub mod cli;
pub mod config;
pub mod driver;
pub mod enrich;
pub mod rest;
pub mod sheet;
pub mod types;
