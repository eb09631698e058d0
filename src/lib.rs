//! Rendershot Library
//!
//! Server-side rendering of named components into either a complete HTML
//! document or a PNG cropped to the rendered content. Raster output runs
//! through a single headless Chromium page owned by a self-healing pool that
//! executes one capture at a time in FIFO order.
//!
//! # Module Overview
//!
//! - [`request`] - Render request parsing (query string and JSON body)
//! - [`viewport`] - Viewport options and lenient numeric parsing
//! - [`components`] - Component lookup and template rendering
//! - [`document`] - Document shell around rendered markup
//! - [`browser`] - Renderer pool and Chromium automation
//! - [`capture`] - Measure-and-clip screenshot sequence
//! - [`pipeline`] - Ties the above into one render call
//! - [`server`] - HTTP routes
//! - [`config`] - Configuration file support
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rendershot_lib::{
//!     BrowserOptions, CaptureSettings, ChromiumLauncher, DocumentShell, RenderPipeline,
//!     RendererPool, RetryPolicy, TemplateLibrary,
//! };
//!
//! # async fn example() -> rendershot_lib::Result<()> {
//! let pool = RendererPool::start(
//!     ChromiumLauncher::new(BrowserOptions::default()),
//!     RetryPolicy::default(),
//! );
//! let pipeline = RenderPipeline::new(
//!     Arc::new(TemplateLibrary::new("components")),
//!     Arc::new(pool),
//!     DocumentShell::default(),
//!     CaptureSettings::default(),
//! );
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod capture;
pub mod components;
pub mod config;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod request;
pub mod server;
pub mod telemetry;
pub mod viewport;

pub use browser::{
    BoundingBox, BrowserLauncher, BrowserOptions, CapturePage, ChromiumLauncher, ChromiumPage,
    PoolStatus, RendererPool, RendererSession, RetryPolicy,
};
pub use capture::{capture, CaptureOutput, CaptureSettings};
pub use components::{ComponentError, ComponentRenderer, TemplateLibrary};
pub use config::Config;
pub use document::DocumentShell;
pub use error::{ErrorCategory, ErrorPayload, RenderError, Result};
pub use pipeline::{RenderOutput, RenderPipeline};
pub use request::{OutputType, RawRenderRequest, RenderBody, RenderRequest};
pub use server::{build_router, AppState};
pub use viewport::{Viewport, ViewportOptions};
