//! CLI subcommand implementations for the authrecon binary.

pub mod doctor;
pub mod enrich_cmd;
pub mod fetch_cmd;
pub mod run_cmd;
pub mod serve;

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Notify;

/// Initialize structured logging once per process.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "authrecon=debug" } else { "authrecon=info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default.parse().expect("static directive parses")),
        )
        .try_init();
}

/// A cancellation handle wired to ctrl-c. A second ctrl-c exits hard.
pub fn cancel_on_ctrl_c() -> Arc<Notify> {
    let cancel = Arc::new(Notify::new());
    let handle = Arc::clone(&cancel);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("cancellation requested");
        handle.notify_waiters();
        handle.notify_one();
        let _ = tokio::signal::ctrl_c().await;
        std::process::exit(130);
    });
    cancel
}

/// Load settings, creating the working directory if needed.
pub fn load_settings() -> Result<crate::config::Settings> {
    let settings = crate::config::Settings::from_env()?;
    std::fs::create_dir_all(&settings.work_dir)?;
    Ok(settings)
}
