use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, header};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::info;

use crate::overlay::markup::{self, HtmlCanvas};
use crate::overlay::{
    Align, FontReport, LayoutInput, LayoutPlan, RenderedArtifact, Rgb, TextStyle, VAlign,
    layout_text,
};
use crate::overlay::request::{DEFAULT_FONT_SIZE, DEFAULT_LANGUAGE, MAX_FONT_SIZE};
use crate::settings;

use super::models::{CanvasQuery, EndpointInfo, ServiceDescriptor};
use super::render::{ServerError, extension_for_mime, parse_body, render_overlay};
use super::state::ServerState;

const DEMO_TEXT: &str = "สวัสดีครับ ทดสอบ API\nภาษาไทย Unicode ✅";
const DEFAULT_CANVAS_TEXT: &str = "สวัสดี";
const CANVAS_PADDING: u32 = 40;
const MAX_CANVAS_WIDTH: u32 = 4096;

pub async fn run_server(settings: settings::Settings) -> Result<()> {
    let addr = format!("{}:{}", settings.host, settings.port);
    let state = Arc::new(ServerState::initialize(settings).await?);
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind server address {}", addr))?;
    info!("listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

pub(crate) fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(describe))
        .route("/health", get(health))
        .route("/test", get(test_document))
        .route("/text-on-image", post(text_on_image))
        .route("/layout", post(layout))
        .route("/pure-svg", get(pure_svg))
        .route("/html-canvas", get(html_canvas))
        .with_state(state)
        .layer(axum::middleware::from_fn(cors_middleware))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type"),
    );
    headers.insert(
        "access-control-expose-headers",
        HeaderValue::from_static("content-disposition,x-overlay-lines,x-overlay-backend"),
    );
}

async fn describe(State(state): State<Arc<ServerState>>) -> Json<ServiceDescriptor> {
    Json(ServiceDescriptor {
        status: "API is running!",
        how_to_use: "POST to /text-on-image with JSON data",
        backend: state.backends.primary.as_str(),
        fallback: state.backends.fallback.map(|kind| kind.as_str()),
        font: FontReport::from(&state.font),
        endpoints: endpoints(),
    })
}

fn endpoints() -> Vec<EndpointInfo> {
    let endpoint = |method, path, description| EndpointInfo {
        method,
        path,
        description,
    };
    vec![
        endpoint("GET", "/", "service descriptor"),
        endpoint("GET", "/health", "liveness check"),
        endpoint("GET", "/test", "sample SVG with Thai demo text"),
        endpoint("POST", "/text-on-image", "overlay text on the image at img_url"),
        endpoint("POST", "/layout", "line placement for a /text-on-image body"),
        endpoint("GET", "/pure-svg", "standalone SVG (text, font_size, bg, color, width)"),
        endpoint("GET", "/html-canvas", "standalone HTML (text, font_size, bg, color, width)"),
    ]
}

async fn text_on_image(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<Response<Body>, ServerError> {
    let request = parse_body(&body)?;
    let artifact = render_overlay(state, request).await?;
    artifact_response(artifact)
}

async fn layout(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<Json<LayoutPlan>, ServerError> {
    let request = parse_body(&body)?;
    Ok(Json(request.plan(state.font.metrics.as_ref())))
}

fn artifact_response(artifact: RenderedArtifact) -> Result<Response<Body>, ServerError> {
    let disposition = format!(
        "attachment; filename=\"text-on-image.{}\"",
        extension_for_mime(&artifact.mime)
    );
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, artifact.mime.as_str())
        .header(header::CONTENT_DISPOSITION, disposition)
        .header("x-overlay-lines", artifact.lines.to_string())
        .header("x-overlay-backend", artifact.backend)
        .body(Body::from(artifact.bytes))
        .map_err(|err| ServerError::internal(format!("failed to build response: {}", err)))
}

struct Canvas {
    width: u32,
    height: u32,
    background: Rgb,
    plan: LayoutPlan,
    style: TextStyle,
}

/// Centers the query text on a solid canvas sized to fit it unless `width` is given.
fn canvas_from_query(state: &ServerState, query: &CanvasQuery) -> Canvas {
    let text = query
        .text
        .as_deref()
        .filter(|text| !text.is_empty())
        .unwrap_or(DEFAULT_CANVAS_TEXT);
    let font_size = parse_u32(query.font_size.as_deref())
        .unwrap_or(DEFAULT_FONT_SIZE)
        .clamp(1, MAX_FONT_SIZE);
    let background = Rgb::parse_or(query.bg.as_deref(), Rgb::WHITE);
    let fill = Rgb::parse_or(query.color.as_deref(), Rgb::BLACK);
    let metrics = state.font.metrics.as_ref();

    let measured = layout_text(&LayoutInput {
        text,
        x: 0,
        y: 0,
        font_size,
        align: Align::Center,
        valign: VAlign::Top,
        font: metrics,
    });
    let fitted = (measured.max_width().ceil() as u32).saturating_add(2 * CANVAS_PADDING);
    let width = parse_u32(query.width.as_deref())
        .unwrap_or(fitted)
        .clamp(1, MAX_CANVAS_WIDTH);
    let height = measured.block_height().saturating_add(2 * CANVAS_PADDING);
    let plan = layout_text(&LayoutInput {
        text,
        x: (width / 2) as i32,
        y: CANVAS_PADDING as i32,
        font_size,
        align: Align::Center,
        valign: VAlign::Top,
        font: metrics,
    });
    Canvas {
        width,
        height,
        background,
        plan,
        style: TextStyle {
            families: state.document_families(),
            fill,
            stroke: None,
            language: DEFAULT_LANGUAGE.to_string(),
        },
    }
}

fn parse_u32(value: Option<&str>) -> Option<u32> {
    let value = value?.trim();
    value.parse::<u32>().ok().or_else(|| {
        value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v as u32)
    })
}

fn svg_response(svg: String) -> Response<Body> {
    ([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response()
}

async fn test_document(State(state): State<Arc<ServerState>>) -> Response<Body> {
    let query = CanvasQuery {
        text: Some(DEMO_TEXT.to_string()),
        ..CanvasQuery::default()
    };
    pure_svg(State(state), Query(query)).await
}

async fn pure_svg(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<CanvasQuery>,
) -> Response<Body> {
    let canvas = canvas_from_query(&state, &query);
    svg_response(markup::standalone_svg(
        canvas.width,
        canvas.height,
        canvas.background,
        &canvas.plan,
        &canvas.style,
        state.web_font.as_ref(),
    ))
}

async fn html_canvas(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<CanvasQuery>,
) -> Result<Response<Body>, ServerError> {
    let canvas = canvas_from_query(&state, &query);
    let html = markup::overlay_html(
        &HtmlCanvas {
            width: canvas.width,
            height: canvas.height,
            image_href: None,
            background: Some(canvas.background),
        },
        &canvas.plan,
        &canvas.style,
        state.web_font.as_ref(),
    )?;
    Ok(([(header::CONTENT_TYPE, "text/html; charset=utf-8")], html).into_response())
}
