use quick_xml::escape::escape;
use serde::Serialize;
use tera::{Context as TeraContext, Tera};

use super::color::Rgb;
use super::error::OverlayError;
use super::layout::{LayoutPlan, PlacedLine};
use super::request::{Align, VAlign};

const HTML_TEMPLATE: &str = include_str!("templates/overlay.html.tera");

const GENERIC_FAMILIES: [&str; 5] = ["sans-serif", "serif", "monospace", "cursive", "fantasy"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stroke {
    pub color: Rgb,
    pub width: u32,
}

#[derive(Debug, Clone)]
pub struct TextStyle {
    /// Preferred families in order; a generic family is appended when missing.
    pub families: Vec<String>,
    pub fill: Rgb,
    pub stroke: Option<Stroke>,
    pub language: String,
}

impl TextStyle {
    pub fn font_stack(&self) -> String {
        font_stack(&self.families)
    }

    fn active_stroke(&self) -> Option<Stroke> {
        self.stroke.filter(|stroke| stroke.width > 0)
    }
}

#[derive(Debug, Clone)]
pub struct WebFont {
    pub family: String,
    pub css_url: String,
}

/// Base image as referenced from markup: a URL or a data URI.
#[derive(Debug, Clone)]
pub struct ImageRef {
    pub href: String,
    pub width: u32,
    pub height: u32,
}

pub(crate) fn text_anchor(align: Align) -> &'static str {
    match align {
        Align::Left => "start",
        Align::Center => "middle",
        Align::Right => "end",
    }
}

pub(crate) fn dominant_baseline(valign: VAlign) -> &'static str {
    match valign {
        VAlign::Top => "text-before-edge",
        VAlign::Middle => "central",
        VAlign::Bottom => "text-after-edge",
    }
}

/// CSS font-family list with sanitized, quoted names and a trailing generic family.
pub fn font_stack(families: &[String]) -> String {
    let mut names: Vec<String> = Vec::new();
    for family in families {
        let cleaned: String = family
            .chars()
            .filter(|ch| !matches!(ch, '"' | '\'' | '<' | '>' | '&' | ';' | '{' | '}' | '\\'))
            .collect();
        let cleaned = cleaned.trim().to_string();
        if cleaned.is_empty() || names.iter().any(|name| name.eq_ignore_ascii_case(&cleaned)) {
            continue;
        }
        names.push(cleaned);
    }
    if !names
        .iter()
        .any(|name| GENERIC_FAMILIES.contains(&name.as_str()))
    {
        names.push("sans-serif".to_string());
    }
    names
        .iter()
        .map(|name| {
            if GENERIC_FAMILIES.contains(&name.as_str()) {
                name.clone()
            } else {
                format!("'{}'", name)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn svg_open(svg: &mut String, width: u32, height: u32, language: &str) {
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}" xml:lang="{lang}">"#,
        w = width,
        h = height,
        lang = escape(language)
    ));
}

fn push_web_font(svg: &mut String, web_font: Option<&WebFont>) {
    if let Some(font) = web_font {
        svg.push_str(&format!(
            "<defs><style>@import url('{}');</style></defs>",
            escape(font.css_url.replace('\'', "%27").as_str())
        ));
    }
}

/// One `<text>` element for `line`, shifted by `(dx, dy)`.
pub(crate) fn push_line(
    svg: &mut String,
    line: &PlacedLine,
    plan: &LayoutPlan,
    style: &TextStyle,
    offset: (i32, i32),
    fill: Rgb,
    stroke: Option<Stroke>,
) {
    let stroke_attrs = stroke
        .map(|stroke| {
            format!(
                r#" stroke="{color}" stroke-width="{width}" stroke-linejoin="round" paint-order="stroke fill""#,
                color = stroke.color,
                width = stroke.width * 2
            )
        })
        .unwrap_or_default();
    svg.push_str(&format!(
        r#"<text x="{x}" y="{y}" font-family="{family}" font-size="{size}" fill="{fill}" text-anchor="{anchor}" dominant-baseline="{baseline}" xml:space="preserve"{stroke}>{text}</text>"#,
        x = line.x as i64 + offset.0 as i64,
        y = line.y.saturating_add(offset.1 as i64),
        family = style.font_stack(),
        size = plan.font_size,
        fill = fill,
        anchor = text_anchor(plan.align),
        baseline = dominant_baseline(plan.valign),
        stroke = stroke_attrs,
        text = escape(line.text.as_str())
    ));
}

fn push_lines(svg: &mut String, plan: &LayoutPlan, style: &TextStyle) {
    for line in plan.drawable_lines() {
        push_line(svg, line, plan, style, (0, 0), style.fill, style.active_stroke());
    }
}

/// SVG document with the base image as background and one `<text>` per drawable line.
pub fn overlay_svg(
    image: &ImageRef,
    plan: &LayoutPlan,
    style: &TextStyle,
    web_font: Option<&WebFont>,
) -> String {
    let mut svg = String::new();
    svg_open(&mut svg, image.width, image.height, &style.language);
    push_web_font(&mut svg, web_font);
    let href = escape(image.href.as_str());
    svg.push_str(&format!(
        r#"<image href="{uri}" xlink:href="{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
        uri = href,
        w = image.width,
        h = image.height
    ));
    push_lines(&mut svg, plan, style);
    svg.push_str("</svg>");
    svg
}

/// SVG document over a solid background.
pub fn standalone_svg(
    width: u32,
    height: u32,
    background: Rgb,
    plan: &LayoutPlan,
    style: &TextStyle,
    web_font: Option<&WebFont>,
) -> String {
    let mut svg = String::new();
    svg_open(&mut svg, width, height, &style.language);
    push_web_font(&mut svg, web_font);
    svg.push_str(&format!(
        r#"<rect x="0" y="0" width="{w}" height="{h}" fill="{bg}"/>"#,
        w = width,
        h = height,
        bg = background
    ));
    push_lines(&mut svg, plan, style);
    svg.push_str("</svg>");
    svg
}

pub struct HtmlCanvas<'a> {
    pub width: u32,
    pub height: u32,
    pub image_href: Option<&'a str>,
    pub background: Option<Rgb>,
}

#[derive(Serialize)]
struct HtmlLine<'a> {
    text: &'a str,
    x: i32,
    y: i64,
}

/// HTML document with absolutely positioned lines. User text is escaped by the template engine.
pub fn overlay_html(
    canvas: &HtmlCanvas<'_>,
    plan: &LayoutPlan,
    style: &TextStyle,
    web_font: Option<&WebFont>,
) -> Result<String, OverlayError> {
    let (shift_x, shift_y) = html_shift(plan.align, plan.valign);
    let lines = plan
        .drawable_lines()
        .map(|line| HtmlLine {
            text: &line.text,
            x: line.x,
            y: line.y,
        })
        .collect::<Vec<_>>();
    let mut context = TeraContext::new();
    context.insert("language", &style.language);
    context.insert("width", &canvas.width);
    context.insert("height", &canvas.height);
    context.insert("image_href", &canvas.image_href);
    context.insert("background", &canvas.background.map(|bg| bg.to_hex()));
    context.insert("web_css_url", &web_font.map(|font| font.css_url.as_str()));
    context.insert("font_stack", &style.font_stack());
    context.insert("font_size", &plan.font_size);
    context.insert("color", &style.fill.to_hex());
    let stroke = style.active_stroke();
    context.insert("stroke", &stroke.map(|stroke| stroke.color.to_hex()));
    context.insert("stroke_width", &stroke.map(|stroke| stroke.width * 2).unwrap_or(0));
    context.insert("shift_x", shift_x);
    context.insert("shift_y", shift_y);
    context.insert("lines", &lines);
    Tera::one_off(HTML_TEMPLATE, &context, true)
        .map_err(|err| OverlayError::Render(format!("failed to render html template: {}", err)))
}

fn html_shift(align: Align, valign: VAlign) -> (&'static str, &'static str) {
    let x = match align {
        Align::Left => "0",
        Align::Center => "-50%",
        Align::Right => "-100%",
    };
    let y = match valign {
        VAlign::Top => "0",
        VAlign::Middle => "-50%",
        VAlign::Bottom => "-100%",
    };
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::layout::{LayoutInput, layout_text};
    use quick_xml::Reader;
    use quick_xml::events::Event;

    fn plan(text: &str, align: Align, valign: VAlign) -> LayoutPlan {
        layout_text(&LayoutInput {
            text,
            x: 50,
            y: 50,
            font_size: 40,
            align,
            valign,
            font: None,
        })
    }

    fn style() -> TextStyle {
        TextStyle {
            families: vec!["Sarabun".to_string()],
            fill: Rgb::WHITE,
            stroke: None,
            language: "th".to_string(),
        }
    }

    fn image() -> ImageRef {
        ImageRef {
            href: "https://example.com/800x600.jpg?a=1&b=2".to_string(),
            width: 800,
            height: 600,
        }
    }

    /// Decoded contents and `y` attributes of every `<text>` element.
    fn text_elements(svg: &str) -> Vec<(String, i64)> {
        let mut reader = Reader::from_str(svg);
        let mut found = Vec::new();
        let mut current_y = None;
        loop {
            match reader.read_event().expect("well-formed svg") {
                Event::Start(start) if start.name().as_ref() == b"text" => {
                    let y = start
                        .attributes()
                        .flatten()
                        .find(|attr| attr.key.as_ref() == b"y")
                        .map(|attr| {
                            String::from_utf8_lossy(&attr.value)
                                .parse::<i64>()
                                .expect("numeric y")
                        });
                    current_y = y;
                }
                Event::Text(text) => {
                    if let Some(y) = current_y.take() {
                        found.push((text.unescape().expect("text").into_owned(), y));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        found
    }

    #[test]
    fn one_text_element_per_line_with_fixed_step() {
        let plan = plan("Hello\nWorld", Align::Left, VAlign::Top);
        let svg = overlay_svg(&image(), &plan, &style(), None);
        assert_eq!(
            text_elements(&svg),
            vec![("Hello".to_string(), 50), ("World".to_string(), 100)]
        );
    }

    #[test]
    fn lines_past_the_i32_range_stay_one_step_apart() {
        let plan = layout_text(&LayoutInput {
            text: "a\nb\nc",
            x: 0,
            y: i32::MAX - 20,
            font_size: 40,
            align: Align::Left,
            valign: VAlign::Top,
            font: None,
        });
        let svg = overlay_svg(&image(), &plan, &style(), None);
        let anchor = (i32::MAX - 20) as i64;
        let ys = text_elements(&svg).into_iter().map(|(_, y)| y).collect::<Vec<_>>();
        assert_eq!(ys, vec![anchor, anchor + 50, anchor + 100]);
    }

    #[test]
    fn user_text_is_escaped() {
        let text = r#"<script>alert("x")</script> & ทดสอบ"#;
        let plan = plan(text, Align::Center, VAlign::Top);
        let svg = standalone_svg(800, 200, Rgb::BLACK, &plan, &style(), None);
        assert!(!svg.contains("<script>"));
        assert!(svg.contains("&lt;script&gt;"));
        assert!(svg.contains("&amp; ทดสอบ"));
        assert_eq!(text_elements(&svg)[0].0, text);
    }

    #[test]
    fn image_href_is_escaped() {
        let svg = overlay_svg(&image(), &plan("a", Align::Left, VAlign::Top), &style(), None);
        assert!(svg.contains("800x600.jpg?a=1&amp;b=2"));
    }

    #[test]
    fn alignment_maps_to_anchor_and_baseline() {
        let svg = overlay_svg(&image(), &plan("a", Align::Right, VAlign::Middle), &style(), None);
        assert!(svg.contains(r#"text-anchor="end""#));
        assert!(svg.contains(r#"dominant-baseline="central""#));
    }

    #[test]
    fn blank_lines_keep_their_slot_but_are_not_emitted() {
        let plan = plan("top\n\nbottom", Align::Left, VAlign::Top);
        let svg = overlay_svg(&image(), &plan, &style(), None);
        assert_eq!(
            text_elements(&svg),
            vec![("top".to_string(), 50), ("bottom".to_string(), 150)]
        );
    }

    #[test]
    fn stroke_uses_native_outline_in_documents() {
        let mut styled = style();
        styled.stroke = Some(Stroke {
            color: Rgb::BLACK,
            width: 3,
        });
        let svg = overlay_svg(&image(), &plan("a", Align::Left, VAlign::Top), &styled, None);
        assert!(svg.contains(r##"stroke="#000000" stroke-width="6""##));
        assert_eq!(text_elements(&svg).len(), 1);
    }

    #[test]
    fn font_stack_sanitizes_and_appends_generic() {
        let families = vec![
            "Sarabun".to_string(),
            "Noto Sans Thai\"; }".to_string(),
            "sarabun".to_string(),
        ];
        assert_eq!(font_stack(&families), "'Sarabun', 'Noto Sans Thai', sans-serif");
        assert_eq!(font_stack(&["serif".to_string()]), "serif");
    }

    #[test]
    fn web_font_is_imported() {
        let font = WebFont {
            family: "Sarabun".to_string(),
            css_url: "https://fonts.googleapis.com/css2?family=Sarabun&display=swap".to_string(),
        };
        let plan = plan("a", Align::Left, VAlign::Top);
        let svg = standalone_svg(100, 100, Rgb::WHITE, &plan, &style(), Some(&font));
        let import = "@import url('https://fonts.googleapis.com/css2?family=Sarabun&amp;display=swap')";
        assert!(svg.contains(import));
    }

    #[test]
    fn html_escapes_text_and_positions_lines() {
        let canvas = HtmlCanvas {
            width: 800,
            height: 600,
            image_href: Some("https://example.com/a.jpg"),
            background: None,
        };
        let html = overlay_html(
            &canvas,
            &plan("<b>bold</b>\nสวัสดี", Align::Center, VAlign::Bottom),
            &style(),
            None,
        )
        .unwrap();
        assert!(!html.contains("<b>bold</b>"));
        assert!(html.contains("&lt;b&gt;bold&lt;&#x2F;b&gt;"));
        assert!(html.contains("สวัสดี"));
        assert!(html.contains("left: 50px; top: 50px;"));
        assert!(html.contains("left: 50px; top: 100px;"));
        assert!(html.contains("translate(-50%, -100%)"));
        assert!(html.contains("font-family: 'Sarabun', sans-serif;"));
        assert_eq!(html.matches(r#"<div class="line""#).count(), 2);
    }
}
