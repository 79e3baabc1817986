//! `authrecon enrich` — reconcile a downloaded spreadsheet against the
//! subscriber directory.

use crate::cli;
use crate::enrich::{Engine, EngineOptions};
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

pub async fn run(input: Option<PathBuf>, concurrency: usize) -> Result<()> {
    let settings = cli::load_settings()?;
    let input = input.unwrap_or_else(|| settings.export_path());
    let output = settings.enriched_path();

    let opts = EngineOptions {
        concurrency,
        ..Default::default()
    };
    let engine = Engine::new(&settings.enrich, opts);

    let spinner = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner} {msg}").expect("static template parses"),
    );
    spinner.set_message(format!("reconciling {}", input.display()));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let cancel = cli::cancel_on_ctrl_c();
    let result = engine.process(&input, &output, cancel).await;
    spinner.finish_and_clear();

    let (path, summary) = result?;
    println!("Enriched:  {}", path.display());
    println!(
        "Rows: {}  matched: {}  unmatched: {}  failed: {}",
        summary.rows, summary.matched, summary.unmatched, summary.failed
    );
    Ok(())
}
