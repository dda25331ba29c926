use serde::Serialize;
use serde_json::{Map, Value};

use super::color::Rgb;
use super::error::OverlayError;

pub const DEFAULT_TEXT: &str = "Hello";
pub const DEFAULT_POSITION: i32 = 50;
pub const DEFAULT_FONT_SIZE: u32 = 48;
pub const MAX_FONT_SIZE: u32 = 512;
pub const DEFAULT_STROKE_WIDTH: u32 = 2;
pub const MAX_STROKE_WIDTH: u32 = 8;
pub const DEFAULT_LANGUAGE: &str = "th";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

impl Align {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "left" => Some(Align::Left),
            "center" => Some(Align::Center),
            "right" => Some(Align::Right),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VAlign {
    #[default]
    Top,
    Middle,
    Bottom,
}

impl VAlign {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "top" => Some(VAlign::Top),
            "middle" => Some(VAlign::Middle),
            "bottom" => Some(VAlign::Bottom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    Svg,
    Html,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "jpeg" | "jpg" => Some(OutputFormat::Jpeg),
            "png" => Some(OutputFormat::Png),
            "svg" => Some(OutputFormat::Svg),
            "html" => Some(OutputFormat::Html),
            _ => None,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Svg => "image/svg+xml",
            OutputFormat::Html => "text/html; charset=utf-8",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Svg => "svg",
            OutputFormat::Html => "html",
        }
    }

    pub fn is_raster(self) -> bool {
        matches!(self, OutputFormat::Jpeg | OutputFormat::Png)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayRequest {
    pub image_source: String,
    pub text: String,
    pub x: i32,
    pub y: i32,
    pub font_size: u32,
    pub font_color: Rgb,
    pub stroke_width: u32,
    pub stroke_color: Rgb,
    pub align: Align,
    pub valign: VAlign,
    pub language: String,
    pub format: Option<OutputFormat>,
    pub transliterate: bool,
}

/// Normalizes a decoded request body. Only `img_url` is required; unknown enumeration values and
/// unparseable colors fall back to their defaults.
pub fn validate(body: &Map<String, Value>) -> Result<OverlayRequest, OverlayError> {
    let image_source = match body.get("img_url") {
        Some(Value::String(url)) if !url.trim().is_empty() => url.trim().to_string(),
        Some(Value::String(_)) | Some(Value::Null) | None => {
            return Err(OverlayError::MissingField("img_url"));
        }
        Some(_) => return Err(OverlayError::invalid("img_url", "expected a string")),
    };

    let text = match body.get("text") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Null) | None => DEFAULT_TEXT.to_string(),
        Some(_) => return Err(OverlayError::invalid("text", "expected a string")),
    };

    let x = int_field(body, "x", DEFAULT_POSITION as i64)?;
    let y = int_field(body, "y", DEFAULT_POSITION as i64)?;
    let font_size = int_field(body, "font_size", DEFAULT_FONT_SIZE as i64)?;
    if font_size <= 0 {
        return Err(OverlayError::invalid("font_size", "must be positive"));
    }
    let stroke_width = int_field(body, "stroke_width", DEFAULT_STROKE_WIDTH as i64)?;

    Ok(OverlayRequest {
        image_source,
        text,
        x: clamp_i32(x),
        y: clamp_i32(y),
        font_size: (font_size as u64).min(MAX_FONT_SIZE as u64) as u32,
        font_color: Rgb::parse_or(str_field(body, "font_color"), Rgb::WHITE),
        stroke_width: stroke_width.clamp(0, MAX_STROKE_WIDTH as i64) as u32,
        stroke_color: Rgb::parse_or(str_field(body, "stroke_color"), Rgb::BLACK),
        align: str_field(body, "align")
            .and_then(Align::parse)
            .unwrap_or_default(),
        valign: str_field(body, "valign")
            .and_then(VAlign::parse)
            .unwrap_or_default(),
        language: str_field(body, "language")
            .map(str::trim)
            .filter(|lang| is_language_tag(lang))
            .unwrap_or(DEFAULT_LANGUAGE)
            .to_string(),
        format: str_field(body, "format").and_then(OutputFormat::parse),
        transliterate: matches!(body.get("transliterate"), Some(Value::Bool(true))),
    })
}

fn str_field<'a>(body: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    body.get(key).and_then(Value::as_str)
}

fn int_field(
    body: &Map<String, Value>,
    key: &'static str,
    default: i64,
) -> Result<i64, OverlayError> {
    match body.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|value| value.is_finite()).map(|value| value as i64))
            .ok_or_else(|| OverlayError::invalid(key, format!("'{}' is not an integer", number))),
        Some(Value::String(raw)) => parse_int(raw)
            .ok_or_else(|| OverlayError::invalid(key, format!("'{}' is not an integer", raw))),
        Some(_) => Err(OverlayError::invalid(key, "expected a number")),
    }
}

fn parse_int(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .map(|value| value as i64)
}

fn clamp_i32(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

fn is_language_tag(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 35
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
}
