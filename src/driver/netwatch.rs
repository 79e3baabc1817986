//! Network-response correlation and download capture over CDP events.
//!
//! The portal's search form answers through a known query endpoint; a
//! generic "wait and hope" races a slow server, so the watcher subscribes
//! to response events *before* the submit click and accepts only the
//! response whose URL matches that endpoint. A secondary quiescence wait
//! guards against a page still loading after the response arrived.

use anyhow::{anyhow, bail, Context, Result};
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::browser::{
    DownloadProgressState, EventDownloadProgress, EventDownloadWillBegin,
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    EventResponseReceived,
};
use chromiumoxide::listeners::EventStream;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

/// Watches page network traffic. Must be attached before the action that
/// triggers the traffic of interest.
pub struct NetWatch {
    responses: EventStream<EventResponseReceived>,
    requests: EventStream<EventRequestWillBeSent>,
    finished: EventStream<EventLoadingFinished>,
    failed: EventStream<EventLoadingFailed>,
}

impl NetWatch {
    pub async fn attach(page: &Page) -> Result<Self> {
        page.execute(EnableParams::default())
            .await
            .context("failed to enable network domain")?;
        Ok(Self {
            responses: page
                .event_listener::<EventResponseReceived>()
                .await
                .context("failed to listen for responses")?,
            requests: page
                .event_listener::<EventRequestWillBeSent>()
                .await
                .context("failed to listen for requests")?,
            finished: page
                .event_listener::<EventLoadingFinished>()
                .await
                .context("failed to listen for loads")?,
            failed: page
                .event_listener::<EventLoadingFailed>()
                .await
                .context("failed to listen for load failures")?,
        })
    }

    /// Wait for the response whose URL starts with `endpoint`. Responses
    /// to other URLs are ignored. Returns the HTTP status.
    pub async fn wait_for_response(&mut self, endpoint: &str, ceiling: Duration) -> Result<i64> {
        let deadline = Instant::now() + ceiling;
        loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or_else(|| {
                    anyhow!(
                        "no response from {endpoint} within {}s",
                        ceiling.as_secs()
                    )
                })?;
            match tokio::time::timeout(remaining, self.responses.next()).await {
                Ok(Some(event)) => {
                    if event.response.url.starts_with(endpoint) {
                        debug!(
                            url = %event.response.url,
                            status = event.response.status,
                            "correlated query response"
                        );
                        return Ok(event.response.status);
                    }
                }
                Ok(None) => bail!("network event stream closed"),
                Err(_) => bail!(
                    "no response from {endpoint} within {}s",
                    ceiling.as_secs()
                ),
            }
        }
    }

    /// Wait until no network activity has been observed for `idle`.
    /// Fails if the page never settles within `ceiling`.
    pub async fn wait_for_quiescence(&mut self, idle: Duration, ceiling: Duration) -> Result<()> {
        let deadline = Instant::now() + ceiling;
        loop {
            let activity = tokio::time::timeout(idle, async {
                tokio::select! {
                    e = self.requests.next() => e.is_some(),
                    e = self.responses.next() => e.is_some(),
                    e = self.finished.next() => e.is_some(),
                    e = self.failed.next() => e.is_some(),
                }
            })
            .await;

            match activity {
                // Idle window elapsed with no traffic — quiescent.
                Err(_) => return Ok(()),
                Ok(true) => {
                    if Instant::now() >= deadline {
                        bail!(
                            "page network activity did not settle within {}s",
                            ceiling.as_secs()
                        );
                    }
                }
                // Stream closed — the page is going away; nothing
                // further can arrive.
                Ok(false) => return Ok(()),
            }
        }
    }
}

/// Captures one file download triggered from the page.
pub struct DownloadWatch {
    begins: EventStream<EventDownloadWillBegin>,
    progresses: EventStream<EventDownloadProgress>,
    dir: PathBuf,
}

impl DownloadWatch {
    /// Route downloads into `dir` (named by download GUID) and subscribe
    /// to the transfer events. Must be attached before the export click.
    pub async fn attach(page: &Page, browser: &Browser, dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create download dir {}", dir.display()))?;

        let params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::AllowAndName)
            .download_path(dir.to_string_lossy())
            .events_enabled(true)
            .build()
            .map_err(|e| anyhow!("failed to build download behavior: {e}"))?;
        browser
            .execute(params)
            .await
            .context("failed to set download behavior")?;

        Ok(Self {
            begins: page
                .event_listener::<EventDownloadWillBegin>()
                .await
                .context("failed to listen for download start")?,
            progresses: page
                .event_listener::<EventDownloadProgress>()
                .await
                .context("failed to listen for download progress")?,
            dir: dir.to_path_buf(),
        })
    }

    /// Wait for one download to start and run to completion; returns the
    /// path of the transferred file.
    pub async fn wait_for_download(&mut self, ceiling: Duration) -> Result<PathBuf> {
        let deadline = Instant::now() + ceiling;

        let begin = tokio::time::timeout(ceiling, self.begins.next())
            .await
            .map_err(|_| anyhow!("no download started within {}s", ceiling.as_secs()))?
            .ok_or_else(|| anyhow!("download event stream closed"))?;
        let guid = begin.guid.clone();
        debug!(guid = %guid, filename = %begin.suggested_filename, "download started");

        loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or_else(|| anyhow!("download did not finish within {}s", ceiling.as_secs()))?;
            let event = tokio::time::timeout(remaining, self.progresses.next())
                .await
                .map_err(|_| anyhow!("download did not finish within {}s", ceiling.as_secs()))?
                .ok_or_else(|| anyhow!("download event stream closed"))?;

            if event.guid != guid {
                continue;
            }
            match event.state {
                DownloadProgressState::Completed => return Ok(self.dir.join(&guid)),
                DownloadProgressState::Canceled => bail!("download was canceled by the browser"),
                DownloadProgressState::InProgress => {}
            }
        }
    }
}
