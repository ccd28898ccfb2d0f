//! Annotation overlays drawn onto copied pages.
//!
//! Everything is emitted as raw content-stream operations in the standard
//! Helvetica fonts: a centered "VERIFIED" stamp, a score badge, a bottom
//! panel with the per-question breakdown, and a corner role tag.

use lopdf::content::Operation;
use lopdf::Object;

use crate::models::{PaperRole, Question, StudentRecord};
use crate::text::{to_pdf_ascii, wrap_hard};

use super::selection::PackRole;

/// Panel lines are hard wrapped at this many characters.
pub const PANEL_WRAP_WIDTH: usize = 95;

/// Resource names under which the overlay fonts are registered on each page.
pub const FONT_REGULAR: &str = "QmHelv";
pub const FONT_BOLD: &str = "QmHelvB";

const PANEL_FONT_SIZE: f32 = 8.0;
const PANEL_LEADING: f32 = 10.0;
const PANEL_PADDING: f32 = 8.0;
const MARGIN: f32 = 18.0;
/// Panel may cover at most this share of the page height.
const PANEL_MAX_SHARE: f32 = 0.45;
/// Smallest text scale the panel shrinks to before dropping lines.
const PANEL_MIN_SCALE: f32 = 0.6;
const BADGE_RADIUS: f32 = 30.0;
/// Bezier control distance for a quarter circle.
const KAPPA: f32 = 0.552_284_8;

type Rgb = (f32, f32, f32);

const INK: Rgb = (0.1, 0.1, 0.1);
const STAMP_GREEN: Rgb = (0.12, 0.55, 0.25);
const BADGE_RED: Rgb = (0.8, 0.1, 0.1);
const PANEL_FILL: Rgb = (1.0, 1.0, 0.94);
const TAG_FILL: Rgb = (0.15, 0.3, 0.65);

/// What to draw on one page.
#[derive(Debug, Clone, Copy)]
pub struct Overlay<'a> {
    pub record: &'a StudentRecord,
    /// Corner tag; omitted in the roster document.
    pub role: Option<PackRole>,
    /// Draw the centered stamp.
    pub stamp: bool,
}

impl<'a> Overlay<'a> {
    /// Overlay for a pack page.
    pub fn pack(record: &'a StudentRecord, role: PackRole) -> Self {
        Self {
            record,
            role: Some(role),
            stamp: true,
        }
    }

    /// Overlay for the first page of a block in the roster document.
    pub fn roster(record: &'a StudentRecord) -> Self {
        Self {
            record,
            role: None,
            stamp: false,
        }
    }

    fn is_solution(&self) -> bool {
        self.role == Some(PackRole::Solution)
            || (self.role.is_none() && self.record.effective_role() == PaperRole::Solution)
    }
}

/// Format marks without a trailing `.0`.
pub fn format_marks(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    format!("{}", rounded)
}

/// Rough Helvetica text width, good enough for centering.
fn text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.5
}

fn op(operator: &str, operands: Vec<Object>) -> Operation {
    Operation::new(operator, operands)
}

fn fill_color((r, g, b): Rgb) -> Operation {
    op("rg", vec![r.into(), g.into(), b.into()])
}

fn stroke_color((r, g, b): Rgb) -> Operation {
    op("RG", vec![r.into(), g.into(), b.into()])
}

fn text(font: &str, size: f32, x: f32, y: f32, content: &str) -> Vec<Operation> {
    vec![
        op("BT", vec![]),
        op("Tf", vec![Object::Name(font.as_bytes().to_vec()), size.into()]),
        op("Td", vec![x.into(), y.into()]),
        op("Tj", vec![Object::string_literal(to_pdf_ascii(content))]),
        op("ET", vec![]),
    ]
}

fn centered_text(font: &str, size: f32, cx: f32, y: f32, content: &str) -> Vec<Operation> {
    text(font, size, cx - text_width(content, size) / 2.0, y, content)
}

/// Closed circle path built from four Bezier curves.
fn circle(cx: f32, cy: f32, r: f32) -> Vec<Operation> {
    let k = r * KAPPA;
    vec![
        op("m", vec![(cx + r).into(), cy.into()]),
        op(
            "c",
            vec![
                (cx + r).into(),
                (cy + k).into(),
                (cx + k).into(),
                (cy + r).into(),
                cx.into(),
                (cy + r).into(),
            ],
        ),
        op(
            "c",
            vec![
                (cx - k).into(),
                (cy + r).into(),
                (cx - r).into(),
                (cy + k).into(),
                (cx - r).into(),
                cy.into(),
            ],
        ),
        op(
            "c",
            vec![
                (cx - r).into(),
                (cy - k).into(),
                (cx - k).into(),
                (cy - r).into(),
                cx.into(),
                (cy - r).into(),
            ],
        ),
        op(
            "c",
            vec![
                (cx + k).into(),
                (cy - r).into(),
                (cx + r).into(),
                (cy - k).into(),
                (cx + r).into(),
                cy.into(),
            ],
        ),
        op("h", vec![]),
    ]
}

fn rect(x: f32, y: f32, w: f32, h: f32) -> Operation {
    op("re", vec![x.into(), y.into(), w.into(), h.into()])
}

fn stamp(width: f32, height: f32) -> Vec<Operation> {
    let (cx, cy) = (width / 2.0, height / 2.0);
    let mut ops = vec![op("q", vec![]), stroke_color(STAMP_GREEN), op("w", vec![2.5_f32.into()])];
    ops.extend(circle(cx, cy, 55.0));
    ops.push(op("S", vec![]));
    ops.push(op("w", vec![1.0_f32.into()]));
    ops.extend(circle(cx, cy, 48.0));
    ops.push(op("S", vec![]));
    ops.push(fill_color(STAMP_GREEN));
    ops.extend(centered_text(FONT_BOLD, 14.0, cx, cy - 5.0, "VERIFIED"));
    ops.push(op("Q", vec![]));
    ops
}

fn badge(record: &StudentRecord, width: f32, height: f32) -> Vec<Operation> {
    let cx = width - MARGIN - BADGE_RADIUS;
    let cy = height - MARGIN - BADGE_RADIUS;
    let score = format!(
        "{}/{}",
        format_marks(record.total_score),
        format_marks(record.max_score)
    );

    let mut ops = vec![
        op("q", vec![]),
        fill_color((1.0, 1.0, 1.0)),
        stroke_color(BADGE_RED),
        op("w", vec![2.0_f32.into()]),
    ];
    ops.extend(circle(cx, cy, BADGE_RADIUS));
    ops.push(op("B", vec![]));
    ops.push(fill_color(BADGE_RED));
    ops.extend(centered_text(FONT_BOLD, 12.0, cx, cy + 1.0, &score));
    ops.extend(centered_text(FONT_REGULAR, 8.0, cx, cy - 12.0, "Marks"));
    ops.push(op("Q", vec![]));
    ops
}

fn role_tag(role: PackRole, height: f32) -> Vec<Operation> {
    let label = role.as_str();
    let size = 11.0;
    let w = text_width(label, size) + 16.0;
    let h = 18.0;
    let (x, y) = (MARGIN, height - MARGIN - h);

    let mut ops = vec![op("q", vec![]), fill_color(TAG_FILL), rect(x, y, w, h), op("f", vec![])];
    ops.push(fill_color((1.0, 1.0, 1.0)));
    ops.extend(text(FONT_BOLD, size, x + 8.0, y + 5.0, label));
    ops.push(op("Q", vec![]));
    ops
}

fn question_lines(question: &Question) -> Vec<String> {
    let mut head = format!(
        "Q{}: {}/{}",
        question.number,
        format_marks(question.marks),
        format_marks(question.max_marks)
    );
    if let Some(topic) = question.topic.as_deref().filter(|t| !t.trim().is_empty()) {
        head.push_str(&format!(" [{}]", topic.trim()));
    }
    if !question.remarks.trim().is_empty() {
        head.push_str(&format!(" - {}", question.remarks.trim()));
    }

    let mut lines = wrap_hard(&head, PANEL_WRAP_WIDTH);
    for sub in &question.subparts {
        let mut line = format!(
            "  ({}) {}/{}",
            sub.label,
            format_marks(sub.marks),
            format_marks(sub.max_marks)
        );
        if !sub.remarks.trim().is_empty() {
            line.push_str(&format!(" - {}", sub.remarks.trim()));
        }
        lines.extend(
            wrap_hard(&line, PANEL_WRAP_WIDTH - 4)
                .into_iter()
                .enumerate()
                .map(|(i, l)| if i == 0 { format!("  {}", l) } else { format!("    {}", l) }),
        );
    }
    lines
}

/// Text lines of the bottom panel; the first line is the header.
pub fn panel_lines(record: &StudentRecord, solution: bool) -> Vec<String> {
    let prefix = if solution { "SOLUTION KEY - " } else { "" };
    let header = format!(
        "{}Name: {} | Roll: {} | Score: {}/{}",
        prefix,
        record.display_name(),
        record.display_roll(),
        format_marks(record.total_score),
        format_marks(record.max_score)
    );

    let mut lines = wrap_hard(&header, PANEL_WRAP_WIDTH);
    for question in &record.questions {
        lines.extend(question_lines(question));
    }
    if !record.remarks.trim().is_empty() {
        lines.extend(wrap_hard(
            &format!("Remarks: {}", record.remarks.trim()),
            PANEL_WRAP_WIDTH,
        ));
    }
    lines
}

/// Bottom panel listing every line. Text shrinks to fit the panel's share of
/// the page; lines are cut (ending in "...") only below the minimum scale.
fn panel(lines: &[String], width: f32, height: f32) -> Vec<Operation> {
    let available = height * PANEL_MAX_SHARE - 2.0 * PANEL_PADDING;
    let needed = lines.len().max(1) as f32 * PANEL_LEADING;
    let scale = (available / needed).clamp(PANEL_MIN_SCALE, 1.0);
    let (font_size, leading) = (PANEL_FONT_SIZE * scale, PANEL_LEADING * scale);

    let max_lines = ((available / leading) + 1e-3).floor().max(1.0) as usize;
    let mut shown: Vec<&str> = lines.iter().map(String::as_str).collect();
    if shown.len() > max_lines {
        shown.truncate(max_lines.saturating_sub(1));
        shown.push("...");
    }

    let panel_h = shown.len() as f32 * leading + 2.0 * PANEL_PADDING;
    let (x, y, w) = (MARGIN, MARGIN, width - 2.0 * MARGIN);

    let mut ops = vec![
        op("q", vec![]),
        fill_color(PANEL_FILL),
        stroke_color(INK),
        op("w", vec![0.75_f32.into()]),
        rect(x, y, w, panel_h),
        op("B", vec![]),
        fill_color(INK),
    ];
    let mut line_y = y + panel_h - PANEL_PADDING - font_size;
    for (i, line) in shown.iter().enumerate() {
        let font = if i == 0 { FONT_BOLD } else { FONT_REGULAR };
        ops.extend(text(font, font_size, x + PANEL_PADDING, line_y, line));
        line_y -= leading;
    }
    ops.push(op("Q", vec![]));
    ops
}

/// Drawing operations for one page of the given size.
pub fn overlay_operations(overlay: &Overlay<'_>, width: f32, height: f32) -> Vec<Operation> {
    let mut ops = Vec::new();
    if overlay.stamp {
        ops.extend(stamp(width, height));
    }
    ops.extend(badge(overlay.record, width, height));
    ops.extend(panel(
        &panel_lines(overlay.record, overlay.is_solution()),
        width,
        height,
    ));
    if let Some(role) = overlay.role {
        ops.extend(role_tag(role, height));
    }
    ops
}
