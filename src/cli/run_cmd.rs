//! `authrecon run` — the full pipeline: fetch, then enrich.
//!
//! The driver finishes and releases the browser before the engine opens
//! the artifact; the two components share the file, not live state.

use crate::cli;
use crate::driver::PortalDriver;
use crate::enrich::{Engine, EngineOptions};
use anyhow::Result;

pub async fn run(date: &str, time: &str, address: &str) -> Result<()> {
    let settings = cli::load_settings()?;
    let cancel = cli::cancel_on_ctrl_c();

    let driver = PortalDriver::new(
        settings.portal.clone(),
        settings.driver.clone(),
        settings.work_dir.clone(),
    );
    let params = crate::types::QueryParams::new(date, time, address);
    let artifact = driver.run(&params, cancel.clone()).await?;
    println!("Downloaded: {}", artifact.display());

    let engine = Engine::new(&settings.enrich, EngineOptions::default());
    let (enriched, summary) = engine
        .process(&artifact, &settings.enriched_path(), cancel)
        .await?;
    println!("Enriched:  {}", enriched.display());
    println!(
        "Rows: {}  matched: {}  unmatched: {}  failed: {}",
        summary.rows, summary.matched, summary.unmatched, summary.failed
    );
    Ok(())
}
