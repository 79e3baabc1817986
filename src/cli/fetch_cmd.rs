//! `authrecon fetch` — run the portal automation once and keep the
//! downloaded spreadsheet.

use crate::cli;
use crate::driver::PortalDriver;
use anyhow::Result;

pub async fn run(date: &str, time: &str, address: &str) -> Result<()> {
    let settings = cli::load_settings()?;
    let driver = PortalDriver::new(
        settings.portal.clone(),
        settings.driver.clone(),
        settings.work_dir.clone(),
    );

    let cancel = cli::cancel_on_ctrl_c();
    let params = crate::types::QueryParams::new(date, time, address);
    let artifact = driver.run(&params, cancel).await?;

    println!("Downloaded: {}", artifact.display());
    Ok(())
}
