use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::BackendKind;
use crate::overlay::markup::{self, HtmlCanvas, ImageRef};
use crate::overlay::raster::{self, RasterOptions};
use crate::overlay::{
    LayoutPlan, OutputFormat, OverlayError, OverlayRequest, RenderedArtifact, TextStyle, validate,
};

use super::models::ErrorResponse;
use super::state::ServerState;

#[derive(Debug)]
pub(crate) struct ServerError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
}

impl ServerError {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<OverlayError> for ServerError {
    fn from(err: OverlayError) -> Self {
        Self {
            status: err.status(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Decodes a raw request body into a validated request.
pub(crate) fn parse_body(body: &[u8]) -> Result<OverlayRequest, OverlayError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|err| OverlayError::InvalidBody(err.to_string()))?;
    match value {
        Value::Object(map) => validate(&map),
        other => Err(OverlayError::InvalidBody(format!(
            "got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Runs the configured backend, falling back to the local one when delegation fails.
pub(crate) async fn render_overlay(
    state: Arc<ServerState>,
    request: OverlayRequest,
) -> Result<RenderedArtifact, OverlayError> {
    let primary = state.backends.primary;
    if primary.is_local() {
        return render_local(state, request, primary).await;
    }
    // A malformed source is a client error, not a delegation failure.
    crate::fetch::parse_http_url(&request.image_source)?;
    let delegated = render_delegated(&state, &request).await;
    match delegated {
        Ok(artifact) => Ok(artifact),
        Err(err) => match state.backends.fallback {
            Some(fallback) => {
                warn!(error = %err, fallback = fallback.as_str(), "delegated render failed");
                render_local(state, request, fallback).await
            }
            None => {
                warn!(error = %err, "delegated render failed");
                Err(err)
            }
        },
    }
}

async fn render_delegated(
    state: &ServerState,
    request: &OverlayRequest,
) -> Result<RenderedArtifact, OverlayError> {
    let delegate = state.delegate.as_ref().ok_or_else(|| {
        OverlayError::Delegation("delegated backend is not configured".to_string())
    })?;
    let text = request.display_text();
    let lines = request.plan(None).line_count();
    let image = delegate.render(request, &text).await?;
    Ok(RenderedArtifact {
        bytes: image.bytes,
        mime: image.content_type,
        lines,
        backend: BackendKind::Delegated.as_str(),
    })
}

async fn render_local(
    state: Arc<ServerState>,
    request: OverlayRequest,
    kind: BackendKind,
) -> Result<RenderedArtifact, OverlayError> {
    let format = kind.output_format(request.format);
    let plan = request.plan(state.font.metrics.as_ref());
    let fetched = state.fetcher.fetch(&request.image_source).await?;
    let lines = plan.line_count();

    let bytes = if format.is_raster() {
        let style = request.style(state.raster_families());
        let fontdb = state.fontdb.clone();
        let options = RasterOptions {
            format,
            jpeg_quality: state.settings.jpeg_quality,
        };
        let source = fetched.bytes;
        tokio::task::spawn_blocking(move || {
            let base = raster::decode_image(&source)?;
            raster::render_raster(base, &plan, &style, fontdb, options)
        })
        .await
        .map_err(|err| OverlayError::Render(format!("render task failed: {}", err)))??
    } else {
        let (width, height) = raster::image_dimensions(&fetched.bytes)?;
        let href = if state.settings.embed_image {
            let mime = raster::sniff_mime(&fetched.bytes)
                .map(|mime| mime.to_string())
                .or(fetched.content_type)
                .unwrap_or_else(|| "image/jpeg".to_string());
            format!("data:{};base64,{}", mime, BASE64.encode(&fetched.bytes))
        } else {
            request.image_source.clone()
        };
        let style = request.style(state.document_families());
        let image = ImageRef {
            href,
            width,
            height,
        };
        render_document(&state, format, &image, &plan, &style)?.into_bytes()
    };

    info!(
        backend = kind.as_str(),
        format = format.extension(),
        lines,
        bytes = bytes.len(),
        "rendered overlay"
    );
    Ok(RenderedArtifact {
        bytes,
        mime: format.mime().to_string(),
        lines,
        backend: kind.as_str(),
    })
}

fn render_document(
    state: &ServerState,
    format: OutputFormat,
    image: &ImageRef,
    plan: &LayoutPlan,
    style: &TextStyle,
) -> Result<String, OverlayError> {
    match format {
        OutputFormat::Html => {
            let canvas = HtmlCanvas {
                width: image.width,
                height: image.height,
                image_href: Some(&image.href),
                background: None,
            };
            markup::overlay_html(&canvas, plan, style, state.web_font.as_ref())
        }
        _ => Ok(markup::overlay_svg(image, plan, style, state.web_font.as_ref())),
    }
}

/// File extension for the attachment name of an artifact.
pub(crate) fn extension_for_mime(mime: &str) -> &'static str {
    let essence = mime.split(';').next().unwrap_or(mime).trim();
    match essence {
        "image/png" => "png",
        "image/svg+xml" => "svg",
        "text/html" => "html",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/avif" => "avif",
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_must_be_a_json_object() {
        let err = parse_body(b"[1, 2]").unwrap_err();
        assert_eq!(err.to_string(), "request body must be a JSON object: got an array");
        let err = parse_body(b"{not json").unwrap_err();
        assert!(matches!(err, OverlayError::InvalidBody(_)));
        let err = parse_body(br#"{"text": "hi"}"#).unwrap_err();
        assert!(matches!(err, OverlayError::MissingField("img_url")));
    }

    #[test]
    fn errors_become_json_with_mapped_status() {
        let err = ServerError::from(OverlayError::Delegation("boom".to_string()));
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.message, "delegated rendering failed: boom");
        let err = ServerError::from(OverlayError::Fetch("timeout".to_string()));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn attachment_extensions() {
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("text/html; charset=utf-8"), "html");
        assert_eq!(extension_for_mime("image/png"), "png");
        assert_eq!(extension_for_mime("application/octet-stream"), "jpg");
    }
}
