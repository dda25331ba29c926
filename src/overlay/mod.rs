pub mod color;
pub mod error;
pub mod font;
pub mod layout;
pub mod markup;
pub mod raster;
pub mod request;
pub mod transliterate;

pub use color::Rgb;
pub use error::OverlayError;
pub use font::{FontCandidate, FontLoader, FontReport, ResolvedFont, resolve_font};
pub use layout::{LINE_GAP, LayoutInput, LayoutPlan, PlacedLine, layout_text};
pub use markup::{Stroke, TextStyle, WebFont};
pub use request::{Align, OutputFormat, OverlayRequest, VAlign, validate};

/// Bytes produced for one request, ready to be sent back.
#[derive(Debug, Clone)]
pub struct RenderedArtifact {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub lines: usize,
    pub backend: &'static str,
}

impl OverlayRequest {
    /// Text as it will be drawn, romanized when the request opted in.
    pub fn display_text(&self) -> String {
        if self.transliterate {
            transliterate::transliterate_thai(&self.text)
        } else {
            self.text.clone()
        }
    }

    pub fn plan(&self, font: Option<&font::FontMetrics>) -> LayoutPlan {
        let text = self.display_text();
        layout_text(&LayoutInput {
            text: &text,
            x: self.x,
            y: self.y,
            font_size: self.font_size,
            align: self.align,
            valign: self.valign,
            font,
        })
    }

    pub fn style(&self, families: Vec<String>) -> TextStyle {
        TextStyle {
            families,
            fill: self.font_color,
            stroke: Some(Stroke {
                color: self.stroke_color,
                width: self.stroke_width,
            }),
            language: self.language.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: serde_json::Value) -> OverlayRequest {
        validate(body.as_object().unwrap()).unwrap()
    }

    #[test]
    fn transliteration_is_opt_in() {
        let plain = request(json!({"img_url": "https://example.com/a.jpg", "text": "ไป"}));
        assert_eq!(plain.display_text(), "ไป");
        let romanized = request(json!({
            "img_url": "https://example.com/a.jpg",
            "text": "ไป\nเกม",
            "transliterate": true
        }));
        let plan = romanized.plan(None);
        let texts = plan.lines.iter().map(|line| line.text.as_str()).collect::<Vec<_>>();
        assert_eq!(texts, vec!["pai", "kem"]);
    }

    #[test]
    fn end_to_end_example_places_second_line_at_one_hundred() {
        let req = request(json!({
            "img_url": "https://example.com/800x600.jpg",
            "text": "Hello\nWorld",
            "x": 50,
            "y": 50,
            "font_size": 40,
            "font_color": "#FFFFFF"
        }));
        let plan = req.plan(None);
        assert_eq!(plan.lines.iter().map(|line| line.y).collect::<Vec<_>>(), vec![50, 100]);
        let style = req.style(vec!["Sarabun".to_string()]);
        assert_eq!(style.fill, Rgb::WHITE);
        assert_eq!(style.stroke.map(|stroke| stroke.width), Some(2));
    }
}
