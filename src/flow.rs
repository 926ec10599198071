//! Column flow: word wrapping into a fixed-width column and page breaking on overflow.
//!
//! Input is a sequence of [`FlowLine`]s (one per manuscript line or render tree block).  Lines
//! are wrapped greedily into [`Row`]s using a [`TextMeasure`], and rows are then packed onto
//! pages: a row is placed only if its full height fits into what remains of the current page.
//!
//! Units are whatever the measure reports.  The paged export measures in millimetres with real
//! font metrics, the viewer estimates in pixels.

use std::ops::Range;

use crate::markup::HeadingLevel;
use crate::richtext::Span;

/// The typographic role of a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LineKind {
    /// A heading of the given rank.
    Heading(HeadingLevel),
    /// Body prose.
    Body,
    /// Vertical whitespace between blocks.
    Spacer,
    /// A block-level image with a fixed height.
    Figure,
}

/// A logical line before wrapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowLine {
    kind: LineKind,
    spans: Vec<Span>,
}

impl FlowLine {
    /// Creates a heading line.
    pub fn heading(level: HeadingLevel, spans: Vec<Span>) -> Self {
        Self {
            kind: LineKind::Heading(level),
            spans,
        }
    }

    /// Creates a body line.
    pub fn body(spans: Vec<Span>) -> Self {
        Self {
            kind: LineKind::Body,
            spans,
        }
    }

    /// Creates a spacer line.
    pub fn spacer() -> Self {
        Self {
            kind: LineKind::Spacer,
            spans: Vec::new(),
        }
    }

    /// Creates a figure placeholder.
    pub fn figure() -> Self {
        Self {
            kind: LineKind::Figure,
            spans: Vec::new(),
        }
    }

    /// Returns the line kind.
    pub fn kind(&self) -> LineKind {
        self.kind
    }

    /// Returns the inline content.
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }
}

/// A wrapped row ready to be placed on a page.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    kind: LineKind,
    spans: Vec<Span>,
    height: f64,
    /// Whether this is the first row of its logical line.
    leading: bool,
}

impl Row {
    /// Returns the kind of the line this row was wrapped from.
    pub fn kind(&self) -> LineKind {
        self.kind
    }

    /// Returns the row's styled text.
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Returns the vertical extent of the row.
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Returns whether the row starts a logical line.
    pub fn is_leading(&self) -> bool {
        self.leading
    }
}

/// Font metrics used by the flow.
pub trait TextMeasure {
    /// Height of one row of the given kind.  Spacers and figures use this as their full height.
    fn line_height(&self, kind: LineKind) -> f64;

    /// Advance width of a span when set in a line of the given kind.
    fn span_width(&self, kind: LineKind, span: &Span) -> f64;
}

/// Wraps all lines into rows no wider than `width`.
pub fn layout_rows<M: TextMeasure + ?Sized>(
    lines: &[FlowLine],
    width: f64,
    measure: &M,
) -> Vec<Row> {
    let mut rows = Vec::new();
    for line in lines {
        let height = measure.line_height(line.kind);
        match line.kind {
            LineKind::Spacer | LineKind::Figure => rows.push(Row {
                kind: line.kind,
                spans: Vec::new(),
                height,
                leading: true,
            }),
            LineKind::Heading(_) | LineKind::Body => {
                for (index, spans) in wrap(&line.spans, line.kind, width, measure)
                    .into_iter()
                    .enumerate()
                {
                    rows.push(Row {
                        kind: line.kind,
                        spans,
                        height,
                        leading: index == 0,
                    });
                }
            }
        }
    }
    rows
}

/// Greedy word wrap of styled text.  Always yields at least one row.
pub fn wrap<M: TextMeasure + ?Sized>(
    spans: &[Span],
    kind: LineKind,
    width: f64,
    measure: &M,
) -> Vec<Vec<Span>> {
    let space_width = measure.span_width(kind, &Span::new(" "));
    let mut rows: Vec<Vec<Span>> = Vec::new();
    let mut current: Vec<Span> = Vec::new();
    let mut current_width = 0.0;

    for word in words(spans) {
        let word_width: f64 = word.iter().map(|piece| measure.span_width(kind, piece)).sum();

        if !current.is_empty() && current_width + space_width + word_width <= width {
            let space = word[0].restyle(" ");
            push_piece(&mut current, space);
            current_width += space_width;
            for piece in word {
                push_piece(&mut current, piece);
            }
            current_width += word_width;
            continue;
        }

        if !current.is_empty() {
            rows.push(std::mem::take(&mut current));
            current_width = 0.0;
        }

        if word_width <= width {
            for piece in word {
                push_piece(&mut current, piece);
            }
            current_width = word_width;
        } else {
            let mut chunks = split_word(word, kind, width, measure);
            if let Some((last, last_width)) = chunks.pop() {
                rows.extend(chunks.into_iter().map(|(chunk, _)| chunk));
                current = last;
                current_width = last_width;
            }
        }
    }

    if !current.is_empty() || rows.is_empty() {
        rows.push(current);
    }
    rows
}

/// Splits spans into words; a word may consist of several differently styled pieces.
fn words(spans: &[Span]) -> Vec<Vec<Span>> {
    let mut words: Vec<Vec<Span>> = Vec::new();
    let mut current: Vec<Span> = Vec::new();

    for span in spans {
        let mut piece = String::new();
        for ch in span.text().chars() {
            if ch.is_whitespace() {
                if !piece.is_empty() {
                    current.push(span.restyle(std::mem::take(&mut piece)));
                }
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            } else {
                piece.push(ch);
            }
        }
        if !piece.is_empty() {
            current.push(span.restyle(piece));
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Breaks an over-long word into chunks that each fit `width`, one character minimum.
fn split_word<M: TextMeasure + ?Sized>(
    word: Vec<Span>,
    kind: LineKind,
    width: f64,
    measure: &M,
) -> Vec<(Vec<Span>, f64)> {
    let mut chunks = Vec::new();
    let mut current: Vec<Span> = Vec::new();
    let mut current_width = 0.0;

    for piece in word {
        for ch in piece.text().chars() {
            let glyph = piece.restyle(ch.to_string());
            let glyph_width = measure.span_width(kind, &glyph);
            if !current.is_empty() && current_width + glyph_width > width {
                chunks.push((std::mem::take(&mut current), current_width));
                current_width = 0.0;
            }
            push_piece(&mut current, glyph);
            current_width += glyph_width;
        }
    }
    if !current.is_empty() {
        chunks.push((current, current_width));
    }
    chunks
}

fn push_piece(row: &mut Vec<Span>, piece: Span) {
    match row.last_mut() {
        Some(last) if last.same_style(&piece) => {
            let merged = format!("{}{}", last.text(), piece.text());
            *last = last.restyle(merged);
        }
        _ => row.push(piece),
    }
}

/// Number of leading rows that fit completely into `available` height.
pub fn fill_page(rows: &[Row], available: f64) -> usize {
    let mut used = 0.0;
    let mut count = 0;
    for row in rows {
        if used + row.height > available {
            break;
        }
        used += row.height;
        count += 1;
    }
    count
}

/// Splits rows into pages of at most `page_height`.
///
/// Every page receives at least one row, so a row taller than a page gets a page to itself
/// instead of stalling the flow.
pub fn paginate(rows: &[Row], page_height: f64) -> Vec<Range<usize>> {
    let mut pages = Vec::new();
    let mut start = 0;
    while start < rows.len() {
        let count = fill_page(&rows[start..], page_height).max(1);
        pages.push(start..start + count);
        start += count;
    }
    pages
}

/// Total vertical extent of the rows.
pub fn extent(rows: &[Row]) -> f64 {
    rows.iter().map(Row::height).sum()
}

/// Estimated metrics for laying out rendered content without a font rasterizer.
///
/// Widths assume an average glyph advance of `glyph_ratio × font size`; heights are
/// `font size × line_spacing`, scaled per heading rank.
#[derive(Clone, Debug, PartialEq)]
pub struct EstimatedMetrics {
    font_size: f64,
    glyph_ratio: f64,
    line_spacing: f64,
    heading_scales: [f64; 3],
    figure_height: f64,
}

impl Default for EstimatedMetrics {
    fn default() -> Self {
        Self {
            font_size: 16.0,
            glyph_ratio: 0.5,
            line_spacing: 1.6,
            heading_scales: [2.0, 1.5, 1.25],
            figure_height: 320.0,
        }
    }
}

impl EstimatedMetrics {
    /// Creates metrics with the default proportions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the body font size.
    pub fn with_font_size(mut self, font_size: f64) -> Self {
        self.font_size = font_size;
        self
    }

    /// Sets the average glyph advance as a fraction of the font size.
    pub fn with_glyph_ratio(mut self, glyph_ratio: f64) -> Self {
        self.glyph_ratio = glyph_ratio;
        self
    }

    /// Sets the line height as a multiple of the font size.
    pub fn with_line_spacing(mut self, line_spacing: f64) -> Self {
        self.line_spacing = line_spacing;
        self
    }

    /// Sets the font size multipliers for heading levels one to three.
    pub fn with_heading_scales(mut self, heading_scales: [f64; 3]) -> Self {
        self.heading_scales = heading_scales;
        self
    }

    /// Sets the height reserved for block images.
    pub fn with_figure_height(mut self, figure_height: f64) -> Self {
        self.figure_height = figure_height;
        self
    }

    fn size_for(&self, kind: LineKind) -> f64 {
        match kind {
            LineKind::Heading(level) => {
                self.font_size * self.heading_scales[usize::from(level.rank() - 1)]
            }
            LineKind::Body | LineKind::Spacer | LineKind::Figure => self.font_size,
        }
    }
}

impl TextMeasure for EstimatedMetrics {
    fn line_height(&self, kind: LineKind) -> f64 {
        match kind {
            LineKind::Spacer => self.font_size * self.line_spacing / 2.0,
            LineKind::Figure => self.figure_height,
            LineKind::Heading(_) | LineKind::Body => self.size_for(kind) * self.line_spacing,
        }
    }

    fn span_width(&self, kind: LineKind, span: &Span) -> f64 {
        let mut advance = self.size_for(kind) * self.glyph_ratio;
        if span.is_bold() {
            advance *= 1.1;
        }
        advance * span.text().chars().count() as f64
    }
}
