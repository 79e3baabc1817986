//! Process configuration, read once at startup from the environment.
//!
//! Required variables:
//! - `LOGIN_URL` — portal login page
//! - `LOGIN_USER` / `LOGIN_PASSWORD` — portal credentials
//! - `API_URL` — enrichment service endpoint
//! - `API_AUTH_TOKEN` — bearer token for the enrichment service
//!
//! Optional overrides:
//! - `PORTAL_DASHBOARD_URL` / `PORTAL_QUERY_URL` — default to well-known
//!   paths on the login URL's origin
//! - `AUTHRECON_WORK_DIR` — artifact directory, default `~/.authrecon/work`
//! - `AUTHRECON_HEADLESS` — `0`/`false` to show the browser window
//! - `AUTHRECON_CHROMIUM_PATH` — explicit browser binary
//! - `AUTHRECON_RESPONSE_TIMEOUT_SECS` / `AUTHRECON_QUIESCENCE_TIMEOUT_SECS`
//! - `AUTHRECON_HTTP_PORT` — REST listen port, default 8700

use crate::driver::DriverOptions;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Authenticated dashboard path on the portal origin.
const DASHBOARD_PATH: &str = "/painel/dashboard";
/// Query endpoint the search form posts to; the driver correlates the
/// network response against this URL.
const QUERY_PATH: &str = "/painel/ncsyslog_v6/consultar";

/// Default REST listen port.
pub const DEFAULT_HTTP_PORT: u16 = 8700;

/// Portal-side settings for the automation driver.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub login_url: String,
    pub dashboard_url: String,
    pub query_url: String,
    pub username: String,
    pub password: String,
}

/// Enrichment-service settings for the reconciliation engine.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    pub url: String,
    pub token: String,
}

/// Everything the pipeline needs, resolved once at process start.
#[derive(Debug, Clone)]
pub struct Settings {
    pub portal: PortalConfig,
    pub enrich: EnrichConfig,
    pub work_dir: PathBuf,
    pub driver: DriverOptions,
    pub http_port: u16,
}

impl Settings {
    /// Load settings from the environment. Fails with a named variable in
    /// the error when a required one is missing.
    pub fn from_env() -> Result<Self> {
        let login_url = require("LOGIN_URL")?;
        let (default_dashboard, default_query) = portal_urls(&login_url)?;

        let portal = PortalConfig {
            dashboard_url: std::env::var("PORTAL_DASHBOARD_URL").unwrap_or(default_dashboard),
            query_url: std::env::var("PORTAL_QUERY_URL").unwrap_or(default_query),
            login_url,
            username: require("LOGIN_USER")?,
            password: require("LOGIN_PASSWORD")?,
        };

        let enrich = EnrichConfig {
            url: require("API_URL")?,
            token: require("API_AUTH_TOKEN")?,
        };

        let work_dir = match std::env::var("AUTHRECON_WORK_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".authrecon/work"),
        };

        let mut driver = DriverOptions::default();
        driver.headless = !matches!(
            std::env::var("AUTHRECON_HEADLESS").as_deref(),
            Ok("0") | Ok("false")
        );
        if let Some(secs) = env_secs("AUTHRECON_RESPONSE_TIMEOUT_SECS") {
            driver.response_timeout = secs;
        }
        if let Some(secs) = env_secs("AUTHRECON_QUIESCENCE_TIMEOUT_SECS") {
            driver.quiescence_timeout = secs;
        }

        let http_port = std::env::var("AUTHRECON_HTTP_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_HTTP_PORT);

        Ok(Self {
            portal,
            enrich,
            work_dir,
            driver,
            http_port,
        })
    }

    /// Deterministic path of the as-downloaded portal export.
    pub fn export_path(&self) -> PathBuf {
        self.work_dir.join("records.xlsx")
    }

    /// Deterministic path of the enriched output.
    pub fn enriched_path(&self) -> PathBuf {
        self.work_dir.join("records_enriched.xlsx")
    }
}

fn require(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("required environment variable {name} is not set"))
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Derive the dashboard and query endpoint URLs from the login URL's
/// origin. Overridable via `PORTAL_DASHBOARD_URL` / `PORTAL_QUERY_URL`.
fn portal_urls(login_url: &str) -> Result<(String, String)> {
    let base = Url::parse(login_url)
        .with_context(|| format!("LOGIN_URL is not a valid URL: {login_url}"))?;
    let dashboard = base
        .join(DASHBOARD_PATH)
        .context("cannot derive dashboard URL")?;
    let query = base.join(QUERY_PATH).context("cannot derive query URL")?;
    Ok((dashboard.to_string(), query.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_portal_urls_from_login_origin() {
        let (dashboard, query) = portal_urls("https://portal.example.com/login?next=/").unwrap();
        assert_eq!(dashboard, "https://portal.example.com/painel/dashboard");
        assert_eq!(query, "https://portal.example.com/painel/ncsyslog_v6/consultar");
    }

    #[test]
    fn rejects_malformed_login_url() {
        assert!(portal_urls("not a url").is_err());
    }
}
