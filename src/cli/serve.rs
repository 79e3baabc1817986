//! `authrecon serve` — host the REST adapter.

use crate::cli;
use crate::rest::{self, AppState};
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

pub async fn run(port: Option<u16>) -> Result<()> {
    let mut settings = cli::load_settings()?;
    if let Some(port) = port {
        settings.http_port = port;
    }

    info!(
        "starting authrecon v{} (work dir {})",
        env!("CARGO_PKG_VERSION"),
        settings.work_dir.display()
    );

    let shutdown = cli::cancel_on_ctrl_c();
    let state = Arc::new(AppState::new(settings, Arc::clone(&shutdown)));
    rest::start(state, shutdown).await?;

    info!("authrecon stopped");
    Ok(())
}
