use serde::Serialize;

use super::font::{FontMetrics, measure_text_width_px};
use super::request::{Align, VAlign};

/// Fixed gap between consecutive lines, in pixels.
pub const LINE_GAP: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedLine {
    pub index: usize,
    pub text: String,
    pub x: i32,
    pub y: i64,
    pub width: f32,
}

impl PlacedLine {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutPlan {
    pub font_size: u32,
    pub line_step: u32,
    pub align: Align,
    pub valign: VAlign,
    pub lines: Vec<PlacedLine>,
}

impl LayoutPlan {
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Lines that produce visible output; blank lines keep their slot but are not drawn.
    pub fn drawable_lines(&self) -> impl Iterator<Item = &PlacedLine> {
        self.lines.iter().filter(|line| !line.is_blank())
    }

    pub fn max_width(&self) -> f32 {
        self.lines.iter().map(|line| line.width).fold(0.0, f32::max)
    }

    /// Vertical extent from the anchor of the first line to the bottom of the last one.
    pub fn block_height(&self) -> u32 {
        let count = self.lines.len().max(1) as u32;
        (count - 1) * self.line_step + self.font_size
    }
}

pub struct LayoutInput<'a> {
    pub text: &'a str,
    pub x: i32,
    pub y: i32,
    pub font_size: u32,
    pub align: Align,
    pub valign: VAlign,
    pub font: Option<&'a FontMetrics>,
}

pub fn split_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    for segment in text.split('\n') {
        let segment = segment.strip_suffix('\r').unwrap_or(segment);
        lines.extend(segment.split('\r'));
    }
    lines
}

/// Places every line of `input.text` at `y + i * (font_size + LINE_GAP)`. Alignment only
/// changes how renderers interpret the anchor, never the order or offsets of lines.
/// Offsets are `i64` so lines below an anchor near `i32::MAX` stay distinct.
pub fn layout_text(input: &LayoutInput<'_>) -> LayoutPlan {
    let font_size = input.font_size.max(1);
    let line_step = font_size + LINE_GAP;
    let lines = split_lines(input.text)
        .into_iter()
        .enumerate()
        .map(|(index, text)| PlacedLine {
            index,
            text: text.to_string(),
            x: input.x,
            y: line_offset(input.y, index, line_step),
            width: measure_text_width_px(text, font_size as f32, input.font),
        })
        .collect();
    LayoutPlan {
        font_size,
        line_step,
        align: input.align,
        valign: input.valign,
        lines,
    }
}

fn line_offset(anchor: i32, index: usize, line_step: u32) -> i64 {
    (anchor as i64).saturating_add((index as i64).saturating_mul(line_step as i64))
}
