//! Custom `genpdf` elements used by the paged export.
//!
//! [`ColumnText`] flows manuscript lines into the page column using the document's real font
//! metrics and breaks pages whenever the next row would overflow.  [`fitted_image`] decodes
//! cover art and scales it into a bounding box.

use std::cell::RefCell;
use std::rc::Rc;

use image::GenericImageView;

use genpdf::elements::Image;
use genpdf::error::{Context as _, Error};
use genpdf::fonts::FontCache;
use genpdf::style::{Style, StyledString};
use genpdf::{render, Alignment, Element, Mm, Position, RenderResult, Scale, Size};

use crate::flow::{self, FlowLine, LineKind, Row, TextMeasure};
use crate::markup::HeadingLevel;
use crate::richtext::{plain_text, Span};

const DEFAULT_IMAGE_DPI: f64 = 300.0;
const MM_PER_INCH: f64 = 25.4;

pub(crate) fn mm_from_f64(value: f64) -> Mm {
    Mm::from(printpdf::Mm(value))
}

pub(crate) fn mm_to_f64(value: Mm) -> f64 {
    let mm: printpdf::Mm = value.into();
    mm.0
}

fn estimated_image_size(image: &image::DynamicImage, dpi: f64) -> Size {
    let (px_width, px_height) = image.dimensions();
    let width_mm = MM_PER_INCH * (px_width as f64) / dpi;
    let height_mm = MM_PER_INCH * (px_height as f64) / dpi;
    Size::new(mm_from_f64(width_mm), mm_from_f64(height_mm))
}

/// Loads an image from in-memory bytes using the [`image`] crate with descriptive errors.
pub fn decode_image_from_bytes(bytes: impl AsRef<[u8]>) -> Result<image::DynamicImage, Error> {
    image::load_from_memory(bytes.as_ref()).context("Failed to decode image from provided bytes")
}

/// Scale factor that fits `natural` into `max_width × max_height` while keeping the aspect ratio.
pub fn fit_scale(natural: Size, max_width: Mm, max_height: Mm) -> f64 {
    let width = mm_to_f64(natural.width);
    let height = mm_to_f64(natural.height);
    if width <= f64::EPSILON || height <= f64::EPSILON {
        return 1.0;
    }
    let horizontal = mm_to_f64(max_width) / width;
    let vertical = mm_to_f64(max_height) / height;
    horizontal.min(vertical)
}

/// Decodes `bytes` and returns a centered image scaled to fit the given box.
pub fn fitted_image(bytes: impl AsRef<[u8]>, max_width: Mm, max_height: Mm) -> Result<Image, Error> {
    let dynamic = decode_image_from_bytes(bytes)?;
    let natural = estimated_image_size(&dynamic, DEFAULT_IMAGE_DPI);
    let scale = fit_scale(natural, max_width, max_height);
    Ok(Image::from_dynamic_image(dynamic)?
        .with_alignment(Alignment::Center)
        .with_scale(Scale::new(scale, scale)))
}

/// Font sizes (in points) for each line kind of the content column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnFonts {
    /// Body text size.
    pub body: u8,
    /// Sizes for heading levels one to three.
    pub headings: [u8; 3],
}

impl Default for ColumnFonts {
    fn default() -> Self {
        Self {
            body: 11,
            headings: [20, 16, 13],
        }
    }
}

impl ColumnFonts {
    fn style_for(&self, kind: LineKind) -> Style {
        match kind {
            LineKind::Heading(level) => Style::new()
                .bold()
                .with_font_size(self.headings[usize::from(level.rank() - 1)]),
            LineKind::Body | LineKind::Spacer | LineKind::Figure => {
                Style::new().with_font_size(self.body)
            }
        }
    }
}

/// Real font metrics from the document's font cache.
struct FontMetrics<'a> {
    font_cache: &'a FontCache,
    base: Style,
    fonts: ColumnFonts,
}

impl FontMetrics<'_> {
    fn style_for(&self, kind: LineKind) -> Style {
        self.base.and(self.fonts.style_for(kind))
    }
}

impl TextMeasure for FontMetrics<'_> {
    fn line_height(&self, kind: LineKind) -> f64 {
        let height = mm_to_f64(self.style_for(kind).line_height(self.font_cache));
        match kind {
            LineKind::Spacer => height / 2.0,
            LineKind::Figure => 0.0,
            LineKind::Heading(_) | LineKind::Body => height,
        }
    }

    fn span_width(&self, kind: LineKind, span: &Span) -> f64 {
        let string: StyledString = span.to_styled_string(self.style_for(kind));
        mm_to_f64(string.width(self.font_cache))
    }
}

/// Page on which a heading was placed, counted from the first page of the column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadingMark {
    /// Heading rank.
    pub level: HeadingLevel,
    /// Heading text without styling.
    pub title: String,
    /// Zero-based page index relative to the column's first page.
    pub page: usize,
}

/// Shared record of heading placements, readable after the document has been rendered.
pub type HeadingMarks = Rc<RefCell<Vec<HeadingMark>>>;

/// A flowing text column spanning as many pages as needed.
///
/// Rows are wrapped once, on the first render call, against the width of the area genpdf
/// hands out.  Each render call then places the rows that fit the remaining height, and
/// reports `has_more` so genpdf continues on a fresh page.
pub struct ColumnText {
    lines: Vec<FlowLine>,
    fonts: ColumnFonts,
    rows: Option<Vec<Row>>,
    next_row: usize,
    pages: usize,
    marks: HeadingMarks,
}

impl ColumnText {
    /// Creates a column from flow lines.
    pub fn new(lines: Vec<FlowLine>, fonts: ColumnFonts) -> Self {
        Self {
            lines,
            fonts,
            rows: None,
            next_row: 0,
            pages: 0,
            marks: Rc::default(),
        }
    }

    /// Returns a handle to the heading placements recorded during rendering.
    pub fn heading_marks(&self) -> HeadingMarks {
        Rc::clone(&self.marks)
    }
}

impl Element for ColumnText {
    fn render(
        &mut self,
        context: &genpdf::Context,
        area: render::Area<'_>,
        style: Style,
    ) -> Result<RenderResult, Error> {
        let metrics = FontMetrics {
            font_cache: &context.font_cache,
            base: style,
            fonts: self.fonts,
        };
        let rows = self.rows.get_or_insert_with(|| {
            flow::layout_rows(&self.lines, mm_to_f64(area.size().width), &metrics)
        });

        let remaining = &rows[self.next_row..];
        let mut count = flow::fill_page(remaining, mm_to_f64(area.size().height));
        if count == 0 && !remaining.is_empty() {
            // A row taller than the whole page still has to go somewhere.
            count = 1;
        }

        let mut offset = 0.0;
        for (index, row) in remaining[..count].iter().enumerate() {
            if let (LineKind::Heading(level), true) = (row.kind(), row.is_leading()) {
                self.marks.borrow_mut().push(HeadingMark {
                    level,
                    title: line_text(&remaining[index..]),
                    page: self.pages,
                });
            }

            if !row.spans().is_empty() {
                let row_style = metrics.style_for(row.kind());
                let position = Position::new(0, mm_from_f64(offset));
                if let Some(mut section) =
                    area.text_section(&context.font_cache, position, row_style)
                {
                    for span in row.spans() {
                        let string = span.to_styled_string(row_style);
                        section.print_str(&string.s, string.style)?;
                    }
                }
            }
            offset += row.height();
        }

        self.next_row += count;
        self.pages += 1;

        let mut result = RenderResult::default();
        result.size = Size::new(area.size().width, mm_from_f64(offset));
        result.has_more = self.next_row < rows.len();
        Ok(result)
    }
}

/// Text of the logical line starting at `rows[0]`, rejoining its wrapped continuation rows.
fn line_text(rows: &[Row]) -> String {
    rows.iter()
        .enumerate()
        .take_while(|(index, row)| *index == 0 || !row.is_leading())
        .map(|(_, row)| plain_text(row.spans()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_scale_preserves_aspect_ratio() {
        let natural = Size::new(mm_from_f64(100.0), mm_from_f64(200.0));
        let scale = fit_scale(natural, mm_from_f64(50.0), mm_from_f64(50.0));
        assert!((scale - 0.25).abs() < 1e-9);

        let wide = Size::new(mm_from_f64(300.0), mm_from_f64(100.0));
        let scale = fit_scale(wide, mm_from_f64(150.0), mm_from_f64(100.0));
        assert!((scale - 0.5).abs() < 1e-9);
    }

    #[test]
    fn heading_sizes_decrease_with_rank() {
        let fonts = ColumnFonts::default();
        let sizes: Vec<u8> = [HeadingLevel::One, HeadingLevel::Two, HeadingLevel::Three]
            .into_iter()
            .map(|level| fonts.style_for(LineKind::Heading(level)).font_size())
            .collect();
        assert_eq!(sizes, vec![20, 16, 13]);
        assert!(fonts.style_for(LineKind::Heading(HeadingLevel::One)).is_bold());
        assert_eq!(fonts.style_for(LineKind::Body).font_size(), 11);
    }

    #[test]
    fn undecodable_cover_bytes_are_reported() {
        let err = fitted_image(b"not an image", mm_from_f64(10.0), mm_from_f64(10.0));
        assert!(err.is_err());
    }
}
