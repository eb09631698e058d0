//! Browser automation for raster output.
//!
//! # Module Structure
//!
//! - [`pool`] - The renderer pool: one page, one task at a time, self-healing
//! - [`page`] - Traits the pool and capture code are written against
//! - [`retry`] - Launch retry policy
//! - [`chromium`] - Chromium implementation of the traits
//!
//! # Example
//!
//! ```no_run
//! use rendershot_lib::{ChromiumLauncher, BrowserOptions, RendererPool, RetryPolicy};
//!
//! # async fn example() -> rendershot_lib::Result<()> {
//! let pool = RendererPool::start(
//!     ChromiumLauncher::new(BrowserOptions::default()),
//!     RetryPolicy::default(),
//! );
//! pool.wait_until_ready().await?;
//! # Ok(())
//! # }
//! ```

mod chromium;
mod page;
mod pool;
mod retry;

pub use chromium::{BrowserOptions, ChromiumLauncher, ChromiumPage, DEFAULT_LAUNCH_TIMEOUT};
pub use page::{BoundingBox, BrowserLauncher, CapturePage, RendererSession};
pub use pool::{Disconnected, PageSlot, PoolStatus, RendererPool};
pub use retry::RetryPolicy;
