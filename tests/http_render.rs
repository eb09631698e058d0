use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use futures::FutureExt;
use http_body_util::BodyExt;
use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use rendershot_lib::{
    build_router, AppState, BoundingBox, BrowserLauncher, CapturePage, CaptureSettings,
    DocumentShell, RenderError, RenderPipeline, RendererPool, RendererSession, Result,
    RetryPolicy, TemplateLibrary, Viewport,
};
use serde_json::Value;
use tower::ServiceExt;

const CONTENT_HEIGHT: f64 = 120.0;

/// Page whose content box spans the current viewport width and a fixed height.
#[derive(Clone, Default)]
struct StubPage {
    viewport: Arc<Mutex<Option<Viewport>>>,
    documents: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl CapturePage for StubPage {
    async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        *self.viewport.lock().unwrap() = Some(viewport);
        Ok(())
    }

    async fn load_document(&self, html: &str, _timeout: Duration) -> Result<()> {
        self.documents.lock().unwrap().push(html.to_string());
        Ok(())
    }

    async fn wait_for_network_idle(&self, _timeout: Duration) -> Result<bool> {
        Ok(true)
    }

    async fn content_box(&self, _selector: &str) -> Result<Option<BoundingBox>> {
        let width = self.viewport.lock().unwrap().map(|v| v.width).unwrap_or(0);
        Ok(Some(BoundingBox {
            x: 0.0,
            y: 0.0,
            width: f64::from(width),
            height: CONTENT_HEIGHT,
        }))
    }

    async fn screenshot_png(&self, clip: BoundingBox, _omit_background: bool) -> Result<Vec<u8>> {
        let image = RgbaImage::new(clip.width.ceil() as u32, clip.height.ceil() as u32);
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)?;
        Ok(bytes)
    }
}

struct StubLauncher {
    page: StubPage,
    fail: bool,
}

#[async_trait]
impl BrowserLauncher for StubLauncher {
    type Page = StubPage;

    async fn launch(&self) -> Result<RendererSession<StubPage>> {
        if self.fail {
            return Err(RenderError::Launch("no browser in test".to_string()));
        }
        Ok(RendererSession::new(
            self.page.clone(),
            futures::future::pending::<()>().boxed(),
        ))
    }
}

fn components() -> TemplateLibrary {
    TemplateLibrary::in_memory()
        .with_template("MyView", "<h1>{{ title | Hello }}</h1>")
        .with_template("Counter", "<span>{{ count }}</span>")
}

fn app_with(launcher: StubLauncher, expose_error_detail: bool) -> Router {
    let pool = RendererPool::start(
        launcher,
        RetryPolicy::fixed(Duration::from_secs(1)).with_max_attempts(1),
    );
    let pipeline = RenderPipeline::new(
        Arc::new(components()),
        Arc::new(pool),
        DocumentShell {
            base_url: "http://localhost:3000/".to_string(),
            framework_script: None,
        },
        CaptureSettings::default(),
    );
    build_router(AppState {
        pipeline: Arc::new(pipeline),
        default_component: Arc::from("MyView"),
        expose_error_detail,
    })
}

fn app() -> (Router, StubPage) {
    let page = StubPage::default();
    let launcher = StubLauncher {
        page: page.clone(),
        fail: false,
    };
    (app_with(launcher, false), page)
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/render")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn markup_render_returns_full_document() {
    let (app, page) = app();

    let response = app
        .oneshot(get("/render?props-title=Quarterly%20Report&viewport-width=640"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/html; charset=utf-8"
    );
    let html = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("<h1>Quarterly Report</h1>"));
    assert!(html.contains("width:640px;"));
    assert!(page.documents.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn raster_render_returns_png_cropped_to_content() {
    let (app, page) = app();

    let response = app
        .oneshot(get("/render?type=png&viewport-width=640&viewport-timeoutMs=0"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(response.headers()["x-render-width"], "640");
    assert_eq!(response.headers()["x-render-height"], "120");

    let png = body_bytes(response).await;
    let decoded = image::load_from_memory(&png).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (640, 120));

    let documents = page.documents.lock().unwrap();
    assert_eq!(documents.len(), 1);
    assert!(documents[0].contains("<h1>Hello</h1>"));
}

#[tokio::test(start_paused = true)]
async fn query_and_body_produce_the_same_document() {
    let (app, _page) = app();

    let from_query = app
        .clone()
        .oneshot(get(
            "/render?component=Counter&type=html&props-count=5&viewport-width=300&viewport-padding=8",
        ))
        .await
        .unwrap();
    let from_body = app
        .oneshot(post_json(
            r#"{"component":"Counter","type":"html","props":{"count":5},"viewport":{"width":300,"padding":8}}"#,
        ))
        .await
        .unwrap();

    assert_eq!(from_query.status(), StatusCode::OK);
    assert_eq!(from_body.status(), StatusCode::OK);
    let a = body_bytes(from_query).await;
    let b = body_bytes(from_body).await;
    assert_eq!(a, b);
    assert!(String::from_utf8(a).unwrap().contains("<span>5</span>"));
}

#[tokio::test(start_paused = true)]
async fn malformed_width_falls_back_to_default() {
    let (app, _page) = app();

    let response = app
        .oneshot(get("/render?viewport-width=wide"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(html.contains("width:800px;"));
}

#[tokio::test(start_paused = true)]
async fn unsupported_output_type_is_a_bad_request() {
    let (app, page) = app();

    let response = app.oneshot(get("/render?type=svg")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["category"], "request");
    assert!(body["error"].as_str().unwrap().contains("svg"));
    assert!(body.get("detail").is_none());
    assert!(page.documents.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unknown_component_is_a_bad_request() {
    let (app, _page) = app();

    let response = app
        .oneshot(get("/render?component=Missing"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("Missing"));
}

#[tokio::test(start_paused = true)]
async fn non_object_props_in_body_are_rejected() {
    let (app, _page) = app();

    let response = app
        .oneshot(post_json(r#"{"props":[1,2,3]}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(start_paused = true)]
async fn raster_render_without_browser_is_a_server_error() {
    let launcher = StubLauncher {
        page: StubPage::default(),
        fail: true,
    };
    let app = app_with(launcher, true);

    let response = app
        .oneshot(get("/render?type=png&viewport-timeoutMs=0"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert!(body["detail"].as_array().is_some_and(|chain| !chain.is_empty()));
}

#[tokio::test(start_paused = true)]
async fn health_reflects_renderer_state() {
    let (ready_app, _page) = app();
    // Let the background launch publish the page.
    tokio::time::sleep(Duration::from_millis(10)).await;
    let response = ready_app.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["renderer"], "ready");
    assert_eq!(body["sessions"], 1);

    let failed_app = app_with(
        StubLauncher {
            page: StubPage::default(),
            fail: true,
        },
        false,
    );
    tokio::time::sleep(Duration::from_millis(10)).await;
    let response = failed_app.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["renderer"], "failed");
}
