//! Chromium over the DevTools protocol, via `chromiumoxide`.

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams as NetworkEnableParams, EventLoadingFailed, EventLoadingFinished,
    EventRequestWillBeSent,
};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, Viewport as ClipRect};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::{FutureExt, StreamExt};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::debug;

use super::page::{BoundingBox, BrowserLauncher, CapturePage, RendererSession};
use crate::{RenderError, Result, Viewport};

/// Default time allowed for the browser process to come up.
pub const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Quiet period with no request in flight after which the page is network idle.
const NETWORK_QUIET: Duration = Duration::from_millis(500);

const NETWORK_POLL: Duration = Duration::from_millis(50);

const LOAD_SCRIPT: &str = r#"
new Promise((resolve) => {
  if (document.readyState === 'complete') {
    resolve(JSON.stringify(true));
  } else {
    window.addEventListener('load', () => resolve(JSON.stringify(true)), { once: true });
  }
})
"#;

/// Configuration options for the launched browser.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Explicit Chrome/Chromium binary; auto-detected when `None`.
    pub executable: Option<PathBuf>,
    /// Whether to run in headless mode.
    pub headless: bool,
    /// Disable the Chromium sandbox (needed in most containers).
    pub no_sandbox: bool,
    pub launch_timeout: Duration,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            no_sandbox: false,
            launch_timeout: DEFAULT_LAUNCH_TIMEOUT,
        }
    }
}

/// Launches one Chromium process with a single blank page.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    options: BrowserOptions,
}

impl ChromiumLauncher {
    pub fn new(options: BrowserOptions) -> Self {
        Self { options }
    }

    fn config(&self) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder();
        if !self.options.headless {
            builder = builder.with_head();
        }
        if self.options.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(path) = &self.options.executable {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(RenderError::Launch)
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    type Page = ChromiumPage;

    async fn launch(&self) -> Result<RendererSession<ChromiumPage>> {
        let config = self.config()?;
        let (browser, mut handler) = timeout(self.options.launch_timeout, Browser::launch(config))
            .await
            .map_err(|_| RenderError::Timeout {
                stage: "launching the browser",
                after: self.options.launch_timeout,
            })?
            .map_err(|err| RenderError::Launch(err.to_string()))?;

        // The handler stream drives the CDP connection; it ends when the browser goes away.
        let connection = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    if matches!(err, CdpError::Ws(_)) {
                        debug!(error = %err, "browser connection closed");
                        break;
                    }
                    debug!(error = %err, "browser handler error");
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        let network = NetworkTracker::attach(&page).await?;
        let disconnected = async move {
            let _ = connection.await;
        }
        .boxed();

        Ok(
            RendererSession::new(ChromiumPage { page, network }, disconnected)
                .with_keepalive(browser),
        )
    }
}

/// In-flight request bookkeeping fed by CDP network events.
#[derive(Debug)]
struct NetworkActivity {
    in_flight: HashSet<String>,
    last_change: Instant,
}

impl NetworkActivity {
    fn new(now: Instant) -> Self {
        Self {
            in_flight: HashSet::new(),
            last_change: now,
        }
    }

    fn started(&mut self, request_id: String, now: Instant) {
        self.in_flight.insert(request_id);
        self.last_change = now;
    }

    fn settled(&mut self, request_id: &str, now: Instant) {
        if self.in_flight.remove(request_id) {
            self.last_change = now;
        }
    }

    /// How long the page has had nothing in flight.
    fn quiet_for(&self, now: Instant) -> Duration {
        if self.in_flight.is_empty() {
            now.saturating_duration_since(self.last_change)
        } else {
            Duration::ZERO
        }
    }
}

#[derive(Debug, Clone)]
struct NetworkTracker {
    activity: Arc<Mutex<NetworkActivity>>,
}

impl NetworkTracker {
    fn new() -> Self {
        Self {
            activity: Arc::new(Mutex::new(NetworkActivity::new(Instant::now()))),
        }
    }

    /// Subscribes to the page's network events. The listener task ends with the page.
    async fn attach(page: &Page) -> Result<Self> {
        page.execute(NetworkEnableParams::default()).await?;
        let mut sent = page.event_listener::<EventRequestWillBeSent>().await?;
        let mut finished = page.event_listener::<EventLoadingFinished>().await?;
        let mut failed = page.event_listener::<EventLoadingFailed>().await?;

        let tracker = Self::new();
        let events = tracker.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(event) = sent.next() => {
                        events.started(event.request_id.inner().clone());
                    }
                    Some(event) = finished.next() => {
                        events.settled(event.request_id.inner());
                    }
                    Some(event) = failed.next() => {
                        events.settled(event.request_id.inner());
                    }
                    else => break,
                }
            }
            debug!("network event streams closed");
        });
        Ok(tracker)
    }

    fn with<T>(&self, f: impl FnOnce(&mut NetworkActivity) -> T) -> T {
        let mut activity = self.activity.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut activity)
    }

    fn started(&self, request_id: String) {
        self.with(|a| a.started(request_id, Instant::now()));
    }

    fn settled(&self, request_id: &str) {
        self.with(|a| a.settled(request_id, Instant::now()));
    }

    /// Forgets requests of the previous document.
    fn reset(&self) {
        self.with(|a| *a = NetworkActivity::new(Instant::now()));
    }

    /// Waits until nothing has been in flight for `quiet`. Returns `false` on `limit`.
    async fn wait_for_quiet(&self, quiet: Duration, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            let now = Instant::now();
            if self.with(|a| a.quiet_for(now)) >= quiet {
                return true;
            }
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(NETWORK_POLL.min(deadline - now)).await;
        }
    }
}

/// Handle onto the pool's Chromium tab.
#[derive(Clone)]
pub struct ChromiumPage {
    page: Page,
    network: NetworkTracker,
}

impl ChromiumPage {
    async fn evaluate_json(&self, expression: String) -> Result<String> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(RenderError::capture)?;
        let result = self.page.evaluate_expression(params).await?;
        Ok(result.into_value::<String>()?)
    }
}

#[async_trait]
impl CapturePage for ChromiumPage {
    async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        self.page
            .execute(SetDeviceMetricsOverrideParams::new(
                i64::from(viewport.width),
                i64::from(viewport.height),
                1.0,
                false,
            ))
            .await?;
        Ok(())
    }

    async fn load_document(&self, html: &str, limit: Duration) -> Result<()> {
        self.network.reset();
        let load = async {
            self.page.set_content(html).await?;
            self.evaluate_json(LOAD_SCRIPT.to_string()).await?;
            Ok::<_, RenderError>(())
        };
        timeout(limit, load).await.map_err(|_| RenderError::Timeout {
            stage: "loading the document",
            after: limit,
        })?
    }

    async fn wait_for_network_idle(&self, limit: Duration) -> Result<bool> {
        Ok(self.network.wait_for_quiet(NETWORK_QUIET, limit).await)
    }

    async fn content_box(&self, selector: &str) -> Result<Option<BoundingBox>> {
        let script = format!(
            r#"
(() => {{
  const el = document.querySelector({selector});
  if (!el) return JSON.stringify(null);
  const rect = el.getBoundingClientRect();
  return JSON.stringify({{
    x: rect.left + window.scrollX,
    y: rect.top + window.scrollY,
    width: rect.width,
    height: rect.height
  }});
}})()
"#,
            selector = serde_json::to_string(selector)?,
        );
        let raw = self.evaluate_json(script).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn screenshot_png(&self, clip: BoundingBox, omit_background: bool) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .clip(ClipRect {
                x: clip.x,
                y: clip.y,
                width: clip.width,
                height: clip.height,
                scale: 1.0,
            })
            .omit_background(omit_background)
            .build();
        Ok(self.page.screenshot(params).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_options_default_values() {
        let opts = BrowserOptions::default();
        assert!(opts.headless);
        assert!(!opts.no_sandbox);
        assert!(opts.executable.is_none());
        assert_eq!(opts.launch_timeout, DEFAULT_LAUNCH_TIMEOUT);
    }

    #[test]
    fn request_in_flight_is_never_quiet() {
        let t0 = Instant::now();
        let mut activity = NetworkActivity::new(t0);
        activity.started("slow".to_string(), t0);

        assert_eq!(activity.quiet_for(t0 + Duration::from_secs(5)), Duration::ZERO);

        activity.settled("slow", t0 + Duration::from_secs(2));
        assert_eq!(
            activity.quiet_for(t0 + Duration::from_secs(5)),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn unknown_request_ids_do_not_reset_quiet_period() {
        let t0 = Instant::now();
        let mut activity = NetworkActivity::new(t0);
        activity.settled("from-previous-document", t0 + Duration::from_secs(1));
        assert_eq!(
            activity.quiet_for(t0 + Duration::from_secs(2)),
            Duration::from_secs(2)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_wait_outlasts_a_slow_request() {
        let tracker = NetworkTracker::new();
        tracker.started("api".to_string());
        let events = tracker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            events.settled("api");
        });

        let start = Instant::now();
        assert!(tracker.wait_for_quiet(NETWORK_QUIET, Duration::from_secs(10)).await);
        assert!(start.elapsed() >= Duration::from_millis(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_wait_gives_up_at_limit() {
        let tracker = NetworkTracker::new();
        tracker.started("long-poll".to_string());

        let start = Instant::now();
        assert!(!tracker.wait_for_quiet(NETWORK_QUIET, Duration::from_secs(3)).await);
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(start.elapsed() < Duration::from_secs(4));

        tracker.reset();
        assert_eq!(tracker.with(|a| a.in_flight.len()), 0);
    }
}
