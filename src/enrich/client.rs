//! HTTP client for the subscriber directory.
//!
//! The directory accepts a structured query document with exactly one
//! identifier filter per call, authenticated by bearer token, and answers
//! with a JSON body.

use super::model::{connection_query, Connection, QueryResponse};
use crate::config::EnrichConfig;
use anyhow::{bail, Context, Result};
use std::time::Duration;

#[derive(Clone)]
pub struct DirectoryClient {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl DirectoryClient {
    pub fn new(cfg: &EnrichConfig, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: cfg.url.clone(),
            token: cfg.token.clone(),
        }
    }

    /// Query the directory for one identifier. Returns the connections
    /// reachable through the expected response path; an unreachable path
    /// is an empty list, not an error.
    pub async fn lookup(&self, username: &str) -> Result<Vec<Connection>> {
        let body = serde_json::json!({ "query": connection_query(username) });

        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("directory request failed for '{username}'"))?;

        let status = resp.status();
        if !status.is_success() {
            bail!("directory returned status {status} for '{username}'");
        }

        let parsed: QueryResponse = resp
            .json()
            .await
            .with_context(|| format!("directory response for '{username}' is not valid JSON"))?;
        Ok(parsed.into_connections())
    }
}
