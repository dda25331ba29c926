use std::time::Duration;
use tracing::debug;
use url::form_urlencoded::byte_serialize;

use crate::overlay::{Align, OverlayError, OverlayRequest};
use crate::settings::Settings;

/// Renders through Cloudinary's fetch API: the overlay is encoded into the transformation path and
/// Cloudinary downloads the base image itself.
#[derive(Debug, Clone)]
pub struct Cloudinary {
    client: reqwest::Client,
    base_url: String,
    cloud_name: String,
    font_family: String,
    max_bytes: usize,
}

#[derive(Debug)]
pub struct DelegatedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl Cloudinary {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.fetch_timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            base_url: settings.cloudinary_base_url.trim_end_matches('/').to_string(),
            cloud_name: settings.cloudinary_cloud_name.clone(),
            font_family: settings.cloudinary_font_family.clone(),
            max_bytes: settings.max_image_bytes,
        })
    }

    pub fn build_fetch_url(&self, request: &OverlayRequest, text: &str) -> String {
        let mut font = format!("{}_{}", encode_component(&self.font_family), request.font_size);
        match request.align {
            Align::Left => {}
            Align::Center => font.push_str("_center"),
            Align::Right => font.push_str("_right"),
        }
        if request.stroke_width > 0 {
            font.push_str("_stroke");
        }
        let mut layer = format!(
            "l_text:{}:{},co_rgb:{}",
            font,
            encode_text(text),
            request.font_color.hex_digits()
        );
        if request.stroke_width > 0 {
            layer.push_str(&format!(
                ",bo_{}px_solid_rgb:{}",
                request.stroke_width,
                request.stroke_color.hex_digits()
            ));
        }
        format!(
            "{}/{}/image/fetch/{}/fl_layer_apply,g_north_west,x_{},y_{}/{}",
            self.base_url,
            encode_component(&self.cloud_name),
            layer,
            request.x,
            request.y,
            encode_component(&request.image_source)
        )
    }

    pub async fn render(
        &self,
        request: &OverlayRequest,
        text: &str,
    ) -> Result<DelegatedImage, OverlayError> {
        let url = self.build_fetch_url(request, text);
        debug!(url = %url, "delegating overlay");
        let mut response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| OverlayError::Delegation(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let reason = response
                .headers()
                .get("x-cld-error")
                .and_then(|value| value.to_str().ok())
                .map(|value| format!(" ({})", value))
                .unwrap_or_default();
            let message = format!("cloudinary returned {}{}", status, reason);
            return Err(OverlayError::Delegation(message));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        if response
            .content_length()
            .is_some_and(|length| length > self.max_bytes as u64)
        {
            return Err(self.too_large());
        }
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| OverlayError::Delegation(err.to_string()))?
        {
            if bytes.len().saturating_add(chunk.len()) > self.max_bytes {
                return Err(self.too_large());
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(DelegatedImage {
            bytes,
            content_type,
        })
    }

    fn too_large(&self) -> OverlayError {
        OverlayError::Delegation(format!("response exceeds {} bytes", self.max_bytes))
    }
}

fn encode_component(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect::<String>().replace('+', "%20")
}

/// Layer text is decoded twice by Cloudinary, so commas and slashes need a second escape.
fn encode_text(text: &str) -> String {
    encode_component(text)
        .replace("%2C", "%252C")
        .replace("%2F", "%252F")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::validate;
    use axum::Router;
    use axum::http::{StatusCode, header};
    use axum::routing::get;
    use serde_json::json;

    fn cloudinary() -> Cloudinary {
        let mut settings = Settings::default();
        settings.cloudinary_cloud_name = "demo".to_string();
        settings.cloudinary_font_family = "Sarabun".to_string();
        settings.cloudinary_base_url = "https://res.cloudinary.com/".to_string();
        Cloudinary::new(&settings).unwrap()
    }

    fn request(body: serde_json::Value) -> OverlayRequest {
        validate(body.as_object().unwrap()).unwrap()
    }

    #[test]
    fn builds_fetch_url_with_stroke_and_position() {
        let req = request(json!({
            "img_url": "https://picsum.photos/800/600?random=2",
            "text": "สวัสดี, world/2",
            "x": 50,
            "y": 200,
            "font_size": 36,
            "font_color": "#FFFF00",
            "align": "center"
        }));
        let url = cloudinary().build_fetch_url(&req, &req.text);
        insta::assert_snapshot!(url, @"https://res.cloudinary.com/demo/image/fetch/l_text:Sarabun_36_center_stroke:%E0%B8%AA%E0%B8%A7%E0%B8%B1%E0%B8%AA%E0%B8%94%E0%B8%B5%252C%20world%252F2,co_rgb:FFFF00,bo_2px_solid_rgb:000000/fl_layer_apply,g_north_west,x_50,y_200/https%3A%2F%2Fpicsum.photos%2F800%2F600%3Frandom%3D2");
    }

    #[test]
    fn zero_stroke_omits_border() {
        let req = request(json!({
            "img_url": "https://example.com/a.jpg",
            "text": "Hi",
            "stroke_width": 0,
            "align": "right"
        }));
        let url = cloudinary().build_fetch_url(&req, &req.text);
        assert!(url.contains("l_text:Sarabun_48_right:Hi,co_rgb:FFFFFF/"));
        assert!(!url.contains("bo_"));
    }

    #[test]
    fn newlines_are_kept_as_encoded_breaks() {
        assert_eq!(encode_text("a\nb c"), "a%0Ab%20c");
    }

    /// Serves a fake Cloudinary on a local port and returns a client pointed at it.
    async fn local_cloudinary(max_bytes: usize) -> Cloudinary {
        let app = Router::new()
            .route(
                "/ok/image/fetch/*rest",
                get(|| async { ([(header::CONTENT_TYPE, "image/png")], vec![9u8; 256]) }),
            )
            .route(
                "/broken/image/fetch/*rest",
                get(|| async {
                    (
                        StatusCode::BAD_REQUEST,
                        [("x-cld-error", "Invalid transformation")],
                        "",
                    )
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let mut settings = Settings::default();
        settings.cloudinary_base_url = format!("http://{}", addr);
        settings.max_image_bytes = max_bytes;
        Cloudinary::new(&settings).unwrap()
    }

    fn simple_request() -> OverlayRequest {
        request(json!({"img_url": "https://example.com/a.jpg", "text": "Hi"}))
    }

    #[tokio::test]
    async fn relays_image_bytes_and_content_type() {
        let mut cloudinary = local_cloudinary(1024).await;
        cloudinary.cloud_name = "ok".to_string();
        let req = simple_request();
        let image = cloudinary.render(&req, &req.text).await.unwrap();
        assert_eq!(image.bytes, vec![9u8; 256]);
        assert_eq!(image.content_type, "image/png");
    }

    #[tokio::test]
    async fn error_header_is_part_of_the_failure() {
        let mut cloudinary = local_cloudinary(1024).await;
        cloudinary.cloud_name = "broken".to_string();
        let req = simple_request();
        let err = cloudinary.render(&req, &req.text).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            err.to_string(),
            "delegated rendering failed: cloudinary returned 400 Bad Request (Invalid transformation)"
        );
    }

    #[tokio::test]
    async fn oversized_response_is_rejected() {
        let mut cloudinary = local_cloudinary(100).await;
        cloudinary.cloud_name = "ok".to_string();
        let req = simple_request();
        let err = cloudinary.render(&req, &req.text).await.unwrap_err();
        assert_eq!(err.to_string(), "delegated rendering failed: response exceeds 100 bytes");
    }
}
