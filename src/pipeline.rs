//! Render pipeline: component → document → markup or raster output.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::browser::{CapturePage, RendererPool};
use crate::capture::{capture, CaptureOutput, CaptureSettings};
use crate::components::ComponentRenderer;
use crate::document::DocumentShell;
use crate::request::{OutputType, RenderRequest};
use crate::Result;

/// Result of rendering one request.
#[derive(Debug, Clone)]
pub enum RenderOutput {
    Markup(String),
    Raster(CaptureOutput),
}

/// Shared, per-process render dependencies.
pub struct RenderPipeline<P> {
    components: Arc<dyn ComponentRenderer>,
    pool: Arc<RendererPool<P>>,
    shell: DocumentShell,
    capture: CaptureSettings,
}

impl<P: CapturePage> RenderPipeline<P> {
    pub fn new(
        components: Arc<dyn ComponentRenderer>,
        pool: Arc<RendererPool<P>>,
        shell: DocumentShell,
        capture: CaptureSettings,
    ) -> Self {
        Self {
            components,
            pool,
            shell,
            capture,
        }
    }

    pub fn pool(&self) -> &RendererPool<P> {
        &self.pool
    }

    /// Renders the component and wraps it into a complete document.
    pub async fn build_document(&self, request: &RenderRequest) -> Result<String> {
        let markup = self
            .components
            .render(&request.component, &request.props)
            .await?;
        Ok(self
            .shell
            .assemble(&request.component, &markup, &request.viewport))
    }

    pub async fn render(&self, request: RenderRequest) -> Result<RenderOutput> {
        let start = Instant::now();
        let document = self.build_document(&request).await?;

        let output = match request.output_type {
            OutputType::Markup => RenderOutput::Markup(document),
            OutputType::Raster => {
                let viewport = request.viewport.clone();
                let settings = self.capture.clone();
                debug!(queued = self.pool.queued(), "submitting capture task");
                let shot = self
                    .pool
                    .submit(move |page: P| async move {
                        capture(&page, &document, &viewport, &settings).await
                    })
                    .await?;
                RenderOutput::Raster(shot)
            }
        };

        info!(
            component = %request.component,
            output = %request.output_type,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "rendered component"
        );
        Ok(output)
    }
}
