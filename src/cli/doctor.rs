//! Environment readiness check.

use crate::driver::browser::find_chromium;
use anyhow::Result;

const REQUIRED_VARS: [&str; 5] = [
    "LOGIN_URL",
    "LOGIN_USER",
    "LOGIN_PASSWORD",
    "API_URL",
    "API_AUTH_TOKEN",
];

/// Check Chromium availability and configuration completeness.
pub async fn run() -> Result<()> {
    println!("Authrecon Doctor");
    println!("================");
    println!();

    let chromium = find_chromium();
    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Set AUTHRECON_CHROMIUM_PATH or install a system chrome."
        ),
    }

    let mut missing = Vec::new();
    for var in REQUIRED_VARS {
        if std::env::var(var).map(|v| !v.is_empty()).unwrap_or(false) {
            println!("[OK] {var} is set");
        } else {
            println!("[!!] {var} is not set");
            missing.push(var);
        }
    }

    match crate::config::Settings::from_env() {
        Ok(settings) => {
            println!("[OK] work dir: {}", settings.work_dir.display());
            println!("[OK] query endpoint: {}", settings.portal.query_url);
        }
        Err(e) => println!("[!!] configuration incomplete: {e:#}"),
    }

    println!();
    if chromium.is_some() && missing.is_empty() {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }
    Ok(())
}
