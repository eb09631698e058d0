//! Seams between the pool, the capture sequence and a concrete browser.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::time::Duration;

use crate::{Result, Viewport};

/// Rectangle bounds of an element, in CSS pixels relative to the document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// A box that can serve as a screenshot clip.
    pub fn is_capturable(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width >= 1.0
            && self.height >= 1.0
    }

    /// Smallest viewport that contains the whole box.
    pub fn covering_viewport(&self) -> Viewport {
        Viewport {
            width: (self.x.max(0.0) + self.width).ceil() as u32,
            height: (self.y.max(0.0) + self.height).ceil() as u32,
        }
    }
}

/// Page operations used by the capture sequence.
///
/// Implementations are cheap handles onto one live page; cloning must not
/// open another page.
#[async_trait]
pub trait CapturePage: Clone + Send + Sync + 'static {
    async fn set_viewport(&self, viewport: Viewport) -> Result<()>;

    /// Replaces the page content and waits for the load event.
    async fn load_document(&self, html: &str, timeout: Duration) -> Result<()>;

    /// Waits until no new network requests start for a short window.
    /// Returns `Ok(false)` if the page was still busy when `timeout` elapsed.
    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<bool>;

    /// Bounding box of the first element matching `selector`, if any.
    async fn content_box(&self, selector: &str) -> Result<Option<BoundingBox>>;

    async fn screenshot_png(&self, clip: BoundingBox, omit_background: bool) -> Result<Vec<u8>>;
}

/// A live browser plus the page the pool hands to tasks.
pub struct RendererSession<P> {
    pub page: P,
    /// Completes when the browser connection is gone, for any reason.
    pub disconnected: BoxFuture<'static, ()>,
    /// Keeps the browser process alive for as long as the session is held.
    pub keepalive: Option<Box<dyn Any + Send>>,
}

impl<P> RendererSession<P> {
    pub fn new(page: P, disconnected: BoxFuture<'static, ()>) -> Self {
        Self {
            page,
            disconnected,
            keepalive: None,
        }
    }

    pub fn with_keepalive(mut self, guard: impl Any + Send) -> Self {
        self.keepalive = Some(Box::new(guard));
        self
    }
}

/// Creates browser sessions; called again every time a session is lost.
#[async_trait]
pub trait BrowserLauncher: Send + Sync + 'static {
    type Page: Clone + Send + Sync + 'static;

    async fn launch(&self) -> Result<RendererSession<Self::Page>>;
}
