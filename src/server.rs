//! HTTP surface: `GET /render`, `POST /render` and `GET /healthz`.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::header::{HeaderName, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, warn};

use crate::browser::{CapturePage, PoolStatus};
use crate::error::{error_chain, ErrorCategory};
use crate::pipeline::{RenderOutput, RenderPipeline};
use crate::request::{RawRenderRequest, RenderBody, RenderRequest};
use crate::{RenderError, Result};

pub const X_RENDER_WIDTH: HeaderName = HeaderName::from_static("x-render-width");
pub const X_RENDER_HEIGHT: HeaderName = HeaderName::from_static("x-render-height");

/// Router state shared by every handler.
pub struct AppState<P> {
    pub pipeline: Arc<RenderPipeline<P>>,
    pub default_component: Arc<str>,
    /// Echo the error source chain in error responses.
    pub expose_error_detail: bool,
}

impl<P> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            default_component: Arc::clone(&self.default_component),
            expose_error_detail: self.expose_error_detail,
        }
    }
}

pub fn build_router<P: CapturePage>(state: AppState<P>) -> Router {
    Router::new()
        .route("/render", get(render_query::<P>).post(render_body::<P>))
        .route("/healthz", get(health::<P>))
        .with_state(state)
}

async fn render_query<P: CapturePage>(
    State(state): State<AppState<P>>,
    query: std::result::Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Response {
    let request = query
        .map_err(|rejection| {
            RenderError::invalid_request(format!("malformed query string: {}", rejection.body_text()))
        })
        .and_then(|Query(pairs)| {
            RawRenderRequest::from_query(pairs).normalize(&state.default_component)
        });
    respond(&state, request).await
}

async fn render_body<P: CapturePage>(
    State(state): State<AppState<P>>,
    body: std::result::Result<Json<RenderBody>, JsonRejection>,
) -> Response {
    let request = body
        .map_err(|rejection| {
            RenderError::invalid_request(format!("malformed JSON body: {}", rejection.body_text()))
        })
        .and_then(|Json(body)| RawRenderRequest::from_body(body))
        .and_then(|raw| raw.normalize(&state.default_component));
    respond(&state, request).await
}

async fn respond<P: CapturePage>(state: &AppState<P>, request: Result<RenderRequest>) -> Response {
    let rendered = match request {
        Ok(request) => state.pipeline.render(request).await,
        Err(err) => Err(err),
    };
    match rendered {
        Ok(RenderOutput::Markup(html)) => (
            [(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"))],
            html,
        )
            .into_response(),
        Ok(RenderOutput::Raster(shot)) => (
            [
                (CONTENT_TYPE, HeaderValue::from_static("image/png")),
                (X_RENDER_WIDTH, HeaderValue::from(shot.width)),
                (X_RENDER_HEIGHT, HeaderValue::from(shot.height)),
            ],
            shot.png,
        )
            .into_response(),
        Err(err) => ApiError::new(err, state.expose_error_detail).into_response(),
    }
}

#[derive(Debug, Serialize)]
struct HealthBody {
    renderer: PoolStatus,
    queued: usize,
    sessions: u64,
}

async fn health<P: CapturePage>(State(state): State<AppState<P>>) -> Response {
    let pool = state.pipeline.pool();
    let body = HealthBody {
        renderer: pool.status(),
        queued: pool.queued(),
        sessions: pool.sessions_started(),
    };
    let status = if body.renderer == PoolStatus::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

/// JSON error body returned by the render routes.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub category: ErrorCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
    error: RenderError,
    expose_detail: bool,
}

impl ApiError {
    pub fn new(error: RenderError, expose_detail: bool) -> Self {
        Self {
            error,
            expose_detail,
        }
    }

    pub fn status(&self) -> StatusCode {
        if self.error.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.error, "render request failed");
        } else {
            warn!(error = %self.error, "render request rejected");
        }
        let payload = self.error.to_payload();
        let body = ErrorBody {
            error: payload.message,
            category: payload.category,
            remediation: payload.remediation,
            detail: self.expose_detail.then(|| error_chain(&self.error)),
        };
        (status, Json(body)).into_response()
    }
}
