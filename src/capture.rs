//! The raster capture sequence run against the pool's page.

use image::io::Reader as ImageReader;
use image::ImageFormat;
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, warn};

use crate::browser::{BoundingBox, CapturePage};
use crate::document::CONTENT_WRAPPER_ID;
use crate::viewport::ViewportOptions;
use crate::{RenderError, Result, Viewport};

/// Tall initial viewport so content of unknown height is not clipped before measuring.
pub const DEFAULT_PROVISIONAL_HEIGHT: u32 = 2000;

/// Upper bound on the per-request settle delay.
pub const DEFAULT_MAX_SETTLE: Duration = Duration::from_secs(30);

/// Default timeout for loading the document into the page.
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for waiting for network idle state.
pub const DEFAULT_NETWORK_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub provisional_height: u32,
    pub max_settle: Duration,
    pub navigation_timeout: Duration,
    pub network_idle_timeout: Duration,
    /// Selector of the element whose box becomes the clip.
    pub content_selector: String,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            provisional_height: DEFAULT_PROVISIONAL_HEIGHT,
            max_settle: DEFAULT_MAX_SETTLE,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            network_idle_timeout: DEFAULT_NETWORK_IDLE_TIMEOUT,
            content_selector: format!("#{CONTENT_WRAPPER_ID}"),
        }
    }
}

/// A PNG clipped to the measured content.
#[derive(Debug, Clone)]
pub struct CaptureOutput {
    pub png: Vec<u8>,
    pub clip: BoundingBox,
    /// Pixel width read back from the PNG header.
    pub width: u32,
    /// Pixel height read back from the PNG header.
    pub height: u32,
}

/// Settle delay for a request, clamped to `[0, cap]`.
pub fn settle_delay(timeout_ms: f64, cap: Duration) -> Duration {
    if !timeout_ms.is_finite() || timeout_ms <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(timeout_ms / 1000.0).min(cap)
}

/// Loads `document` into `page`, measures the content wrapper and captures it.
pub async fn capture<P: CapturePage>(
    page: &P,
    document: &str,
    viewport: &ViewportOptions,
    settings: &CaptureSettings,
) -> Result<CaptureOutput> {
    let provisional = Viewport {
        width: viewport.width.max(1),
        height: settings.provisional_height.max(viewport.height).max(1),
    };
    debug!(%provisional, "setting provisional viewport");
    page.set_viewport(provisional).await?;

    page.load_document(document, settings.navigation_timeout)
        .await?;
    if !page
        .wait_for_network_idle(settings.network_idle_timeout)
        .await?
    {
        warn!(
            timeout = ?settings.network_idle_timeout,
            "page still loading resources, capturing anyway"
        );
    }

    let settle = settle_delay(viewport.timeout_ms, settings.max_settle);
    if !settle.is_zero() {
        tokio::time::sleep(settle).await;
    }

    let clip = page
        .content_box(&settings.content_selector)
        .await?
        .ok_or_else(|| {
            RenderError::capture(format!(
                "content element '{}' not found in the rendered document",
                settings.content_selector
            ))
        })?;
    if !clip.is_capturable() {
        return Err(RenderError::capture(format!(
            "content element has no capturable size ({}x{})",
            clip.width, clip.height
        )));
    }

    let fitted = clip.covering_viewport();
    debug!(%fitted, "resizing viewport to content");
    page.set_viewport(fitted).await?;

    let png = page.screenshot_png(clip, viewport.is_transparent()).await?;
    let (width, height) = ImageReader::with_format(Cursor::new(&png), ImageFormat::Png)
        .into_dimensions()?;
    debug!(width, height, "captured screenshot");

    Ok(CaptureOutput {
        png,
        clip,
        width,
        height,
    })
}
