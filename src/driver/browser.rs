//! Chromium launch and page interaction for the portal driver.
//!
//! All element interaction goes through injected JavaScript so the driver
//! can address fields the way the portal renders them (placeholder text,
//! form labels, button captions) without stable ids or classes.

use anyhow::{anyhow, bail, Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. AUTHRECON_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("AUTHRECON_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.authrecon/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".authrecon/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".authrecon/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".authrecon/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".authrecon/chromium/chrome-linux64/chrome"),
                home.join(".authrecon/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// One launched browser with a single page, released as a unit.
///
/// The session must never outlive a driver run: [`BrowserSession::close`]
/// is called on every exit path, success or failure.
pub struct BrowserSession {
    pub browser: Browser,
    pub page: Page,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    /// Launch Chromium and open a blank page.
    pub async fn launch(headless: bool) -> Result<Self> {
        let chrome_path = find_chromium()
            .context("Chromium not found; set AUTHRECON_CHROMIUM_PATH or install a system chrome")?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");
        if headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create page")?;

        Ok(Self {
            browser,
            page,
            handler,
        })
    }

    /// Release the page, the browser process, and the event pump.
    pub async fn close(mut self) {
        let _ = self.page.close().await;
        let _ = self.browser.close().await;
        self.handler.abort();
    }
}

/// Outcome of an injected interaction snippet.
#[derive(Debug, Deserialize)]
struct JsOutcome {
    success: bool,
}

/// Fill the input identified by its placeholder text.
pub async fn fill_by_placeholder(
    page: &Page,
    placeholder: &str,
    value: &str,
    timeout: Duration,
) -> Result<()> {
    let js = format!(
        r#"(() => {{
            const el = document.querySelector('input[placeholder="{}"]');
            if (!el) return {{ success: false }};
            el.focus();
            el.value = '{}';
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return {{ success: true }};
        }})()"#,
        js_escape(placeholder),
        js_escape(value)
    );
    run_until_success(page, &js, timeout)
        .await
        .with_context(|| format!("input with placeholder '{placeholder}' not found"))
}

/// Fill the form control attached to a `<label>` whose text matches.
pub async fn fill_labeled(
    page: &Page,
    label: &str,
    value: &str,
    timeout: Duration,
) -> Result<()> {
    let js = format!(
        r#"(() => {{
            const wanted = '{}';
            const label = [...document.querySelectorAll('label')]
                .find(l => l.textContent.replace(/\s+/g, ' ').trim() === wanted);
            if (!label) return {{ success: false }};
            const el = label.control
                || (label.htmlFor && document.getElementById(label.htmlFor))
                || label.querySelector('input, select, textarea');
            if (!el) return {{ success: false }};
            el.focus();
            el.value = '{}';
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return {{ success: true }};
        }})()"#,
        js_escape(label),
        js_escape(value)
    );
    run_until_success(page, &js, timeout)
        .await
        .with_context(|| format!("labeled field '{label}' not found"))
}

/// Click the button whose visible caption matches.
pub async fn click_button(page: &Page, caption: &str, timeout: Duration) -> Result<()> {
    let js = format!(
        r#"(() => {{
            const wanted = '{}';
            const norm = t => (t || '').replace(/\s+/g, ' ').trim();
            const btn = [...document.querySelectorAll('button, input[type="submit"], [role="button"]')]
                .find(b => norm(b.textContent) === wanted || norm(b.value) === wanted);
            if (!btn) return {{ success: false }};
            btn.click();
            return {{ success: true }};
        }})()"#,
        js_escape(caption)
    );
    run_until_success(page, &js, timeout)
        .await
        .with_context(|| format!("button '{caption}' not found"))
}

/// Click the link whose visible text matches.
pub async fn click_link(page: &Page, text: &str, timeout: Duration) -> Result<()> {
    let js = format!(
        r#"(() => {{
            const wanted = '{}';
            const link = [...document.querySelectorAll('a')]
                .find(a => a.textContent.replace(/\s+/g, ' ').trim() === wanted);
            if (!link) return {{ success: false }};
            link.click();
            return {{ success: true }};
        }})()"#,
        js_escape(text)
    );
    run_until_success(page, &js, timeout)
        .await
        .with_context(|| format!("link '{text}' not found"))
}

/// Poll until the page URL starts with `prefix`.
pub async fn wait_for_url_prefix(page: &Page, prefix: &str, timeout: Duration) -> Result<String> {
    let deadline = Instant::now() + timeout;
    loop {
        let url = page
            .url()
            .await
            .context("failed to read page URL")?
            .map(|u| u.to_string())
            .unwrap_or_default();
        if url.starts_with(prefix) {
            return Ok(url);
        }
        if Instant::now() >= deadline {
            bail!(
                "page did not reach '{prefix}' within {}s (at '{url}')",
                timeout.as_secs()
            );
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

/// Run an interaction snippet until it reports success, polling while the
/// page is still rendering the target element.
async fn run_until_success(page: &Page, js: &str, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        // Evaluation fails transiently while the page is mid-navigation;
        // keep polling until the deadline.
        let success = match page.evaluate(js).await {
            Ok(result) => result
                .into_value::<JsOutcome>()
                .map(|o| o.success)
                .unwrap_or(false),
            Err(_) => false,
        };
        if success {
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("element not found");
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

/// Escape a string for safe injection into a JS string literal.
fn js_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '`' => out.push_str("\\`"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => {}
            '<' => out.push_str("\\x3c"),
            '>' => out.push_str("\\x3e"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_quotes_and_script_tags() {
        assert_eq!(js_escape("it's"), "it\\'s");
        assert_eq!(js_escape("a\"b"), "a\\\"b");
        let sanitized = js_escape("</script><script>alert(1)</script>");
        assert!(!sanitized.contains("</script>"));
    }

    #[test]
    fn escape_strips_null_bytes() {
        assert_eq!(js_escape("ab\0cd"), "abcd");
    }

    #[test]
    fn escape_passes_ipv6_prefixes_through() {
        assert_eq!(
            js_escape("2804:145c:86f7:fc00::/56"),
            "2804:145c:86f7:fc00::/56"
        );
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn launch_fill_and_click() {
        let session = BrowserSession::launch(true).await.expect("launch failed");
        session
            .page
            .goto(
                "data:text/html,<input placeholder=\"user\"><button onclick=\"this.textContent='done'\">Go</button>",
            )
            .await
            .expect("goto failed");

        fill_by_placeholder(&session.page, "user", "alice", Duration::from_secs(2))
            .await
            .expect("fill failed");
        click_button(&session.page, "Go", Duration::from_secs(2))
            .await
            .expect("click failed");

        session.close().await;
    }
}
