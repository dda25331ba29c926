use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, ImageReader, RgbImage, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use tiny_skia::{IntSize, Pixmap};
use usvg::{Options, Tree, fontdb};

use super::error::OverlayError;
use super::layout::LayoutPlan;
use super::markup::{TextStyle, push_line, svg_open};
use super::request::OutputFormat;

#[derive(Debug, Clone, Copy)]
pub struct RasterOptions {
    pub format: OutputFormat,
    pub jpeg_quality: u8,
}

/// Decodes fetched bytes and normalizes them to 8-bit RGB.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, OverlayError> {
    let image =
        image::load_from_memory(bytes).map_err(|err| OverlayError::Decode(err.to_string()))?;
    Ok(image.to_rgb8())
}

pub fn image_dimensions(bytes: &[u8]) -> Result<(u32, u32), OverlayError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| OverlayError::Decode(err.to_string()))?
        .into_dimensions()
        .map_err(|err| OverlayError::Decode(err.to_string()))
}

pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type())
}

/// Every `(dx, dy)` in `[-w, w] x [-w, w]` except the origin.
pub fn stroke_offsets(width: u32) -> Vec<(i32, i32)> {
    let w = width as i32;
    let mut offsets = Vec::with_capacity(((2 * w + 1) * (2 * w + 1)).max(1) as usize - 1);
    for dy in -w..=w {
        for dx in -w..=w {
            if dx != 0 || dy != 0 {
                offsets.push((dx, dy));
            }
        }
    }
    offsets
}

/// Transparent SVG layer holding only the text. Outlines are painted as offset copies in the
/// stroke color under a single fill copy.
pub fn text_layer_svg(width: u32, height: u32, plan: &LayoutPlan, style: &TextStyle) -> String {
    let mut svg = String::new();
    svg_open(&mut svg, width, height, &style.language);
    let stroke = style.stroke.filter(|stroke| stroke.width > 0);
    let offsets = stroke
        .map(|stroke| stroke_offsets(stroke.width))
        .unwrap_or_default();
    for line in plan.drawable_lines() {
        if let Some(stroke) = stroke {
            svg.push_str("<g>");
            for offset in &offsets {
                push_line(&mut svg, line, plan, style, *offset, stroke.color, None);
            }
            svg.push_str("</g>");
        }
        push_line(&mut svg, line, plan, style, (0, 0), style.fill, None);
    }
    svg.push_str("</svg>");
    svg
}

/// Paints the plan onto `base` and encodes the result.
pub fn render_raster(
    base: RgbImage,
    plan: &LayoutPlan,
    style: &TextStyle,
    fontdb: Arc<fontdb::Database>,
    options: RasterOptions,
) -> Result<Vec<u8>, OverlayError> {
    let (width, height) = base.dimensions();
    let size = IntSize::from_wh(width, height)
        .ok_or_else(|| OverlayError::Render("image has no pixels".to_string()))?;
    let svg = text_layer_svg(width, height, plan, style);
    let tree_options = Options {
        fontdb,
        ..Options::default()
    };
    let tree = Tree::from_str(&svg, &tree_options)
        .map_err(|err| OverlayError::Render(format!("failed to parse text layer: {}", err)))?;

    // opaque pixels are identical in premultiplied and straight alpha
    let rgba = DynamicImage::ImageRgb8(base).into_rgba8();
    let mut pixmap = Pixmap::from_vec(rgba.into_raw(), size)
        .ok_or_else(|| OverlayError::Render("failed to build pixmap".to_string()))?;
    resvg::render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());
    let painted = RgbaImage::from_raw(width, height, pixmap.take())
        .ok_or_else(|| OverlayError::Render("failed to read back pixmap".to_string()))?;
    encode(DynamicImage::ImageRgba8(painted).into_rgb8(), options)
}

fn encode(image: RgbImage, options: RasterOptions) -> Result<Vec<u8>, OverlayError> {
    let mut bytes = Vec::new();
    let image = DynamicImage::ImageRgb8(image);
    let result = match options.format {
        OutputFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut bytes, options.jpeg_quality);
            image.write_with_encoder(encoder)
        }
        OutputFormat::Png => image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png),
        other => {
            return Err(OverlayError::Render(format!(
                "{} is not a raster format",
                other.extension()
            )));
        }
    };
    result.map_err(|err| OverlayError::Render(format!("failed to encode image: {}", err)))?;
    Ok(bytes)
}
