//! Paged document export.
//!
//! Page 1 is the cover (art, title, subtitle, byline).  The body follows as a single flowing
//! column that breaks onto a new page whenever the next row would not fit.  Content pages carry
//! a running head with the book title and a centered page number.

use genpdf::elements::{Break, PageBreak, Paragraph};
use genpdf::error::Error;
use genpdf::style::Style;
use genpdf::{Alignment, Element as _, Margins, Mm, Size};
use log::warn;

use crate::builder::DocumentBuilder;
use crate::elements::{fitted_image, mm_from_f64, mm_to_f64, ColumnFonts, ColumnText};
use crate::flow::FlowLine;
use crate::manuscript::Manuscript;
use crate::markup::{classify_line, HeadingLevel, MarkupLine};
use crate::richtext::parse_inline;

const COVER_PAGES: usize = 1;

/// Page geometry and typography of the paged export.
#[derive(Clone, Debug, PartialEq)]
pub struct PageSetup {
    /// Page width in millimetres.
    pub page_width_mm: f64,
    /// Page height in millimetres.
    pub page_height_mm: f64,
    /// Margin on every side, in millimetres.
    pub margin_mm: f64,
    /// Content column font sizes.
    pub fonts: ColumnFonts,
    /// Share of the cover's content height reserved for the cover image.
    pub cover_image_ratio: f64,
    /// Cover title size in points.
    pub title_size: u8,
    /// Cover subtitle size in points.
    pub subtitle_size: u8,
    /// Cover byline size in points.
    pub byline_size: u8,
    /// Whether content pages show the book title on top.
    pub running_head: bool,
    /// Whether content pages show a page number at the bottom.
    pub page_numbers: bool,
}

impl Default for PageSetup {
    fn default() -> Self {
        Self {
            page_width_mm: 148.0,
            page_height_mm: 210.0,
            margin_mm: 15.0,
            fonts: ColumnFonts::default(),
            cover_image_ratio: 0.6,
            title_size: 22,
            subtitle_size: 14,
            byline_size: 12,
            running_head: true,
            page_numbers: true,
        }
    }
}

impl PageSetup {
    /// Sets the page size in millimetres.
    pub fn with_page_size(mut self, width_mm: f64, height_mm: f64) -> Self {
        self.page_width_mm = width_mm;
        self.page_height_mm = height_mm;
        self
    }

    /// Sets the uniform margin in millimetres.
    pub fn with_margin(mut self, margin_mm: f64) -> Self {
        self.margin_mm = margin_mm;
        self
    }

    /// Sets the column font sizes.
    pub fn with_fonts(mut self, fonts: ColumnFonts) -> Self {
        self.fonts = fonts;
        self
    }

    /// Enables or disables the running head.
    pub fn with_running_head(mut self, enabled: bool) -> Self {
        self.running_head = enabled;
        self
    }

    /// Enables or disables page numbers.
    pub fn with_page_numbers(mut self, enabled: bool) -> Self {
        self.page_numbers = enabled;
        self
    }

    fn paper_size(&self) -> Size {
        Size::new(
            mm_from_f64(self.page_width_mm),
            mm_from_f64(self.page_height_mm),
        )
    }

    fn content_width(&self) -> Mm {
        mm_from_f64((self.page_width_mm - 2.0 * self.margin_mm).max(1.0))
    }

    fn content_height(&self) -> Mm {
        mm_from_f64((self.page_height_mm - 2.0 * self.margin_mm).max(1.0))
    }

    fn cover_image_height(&self) -> Mm {
        let content = mm_to_f64(self.content_height());
        mm_from_f64(content * self.cover_image_ratio.clamp(0.0, 1.0))
    }
}

/// A chapter heading and the page it landed on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChapterPage {
    /// Heading rank.
    pub level: HeadingLevel,
    /// Heading text.
    pub title: String,
    /// 1-indexed page number in the rendered document.
    pub page_number: usize,
}

/// The rendered PDF together with where its headings ended up.
#[derive(Clone, Debug)]
pub struct PagedDocument {
    /// Encoded PDF bytes.
    pub bytes: Vec<u8>,
    /// Headings in reading order.
    pub chapters: Vec<ChapterPage>,
}

/// Lowers the body markup into column lines.
///
/// The embedded cover image line is skipped; the cover page shows the art instead.
pub fn column_lines(body_markup: &str) -> Vec<FlowLine> {
    body_markup
        .lines()
        .filter_map(|line| match classify_line(line) {
            MarkupLine::Image { .. } => None,
            MarkupLine::Heading(level, text) => Some(FlowLine::heading(level, parse_inline(text))),
            MarkupLine::Blank | MarkupLine::Rule => Some(FlowLine::spacer()),
            MarkupLine::Body(text) => Some(FlowLine::body(parse_inline(text))),
        })
        .collect()
}

fn push_cover(document: &mut genpdf::Document, manuscript: &Manuscript, setup: &PageSetup) {
    match manuscript.cover_image() {
        Some(bytes) => {
            match fitted_image(bytes, setup.content_width(), setup.cover_image_height()) {
                Ok(image) => {
                    document.push(image);
                    document.push(Break::new(1.5));
                }
                Err(err) => warn!("Skipping cover image: {}", err),
            }
        }
        None => warn!("Skipping cover image: manuscript has none"),
    }

    document.push(
        Paragraph::new(manuscript.title())
            .aligned(Alignment::Center)
            .styled(Style::new().bold().with_font_size(setup.title_size)),
    );
    if !manuscript.subtitle().trim().is_empty() {
        document.push(Break::new(0.5));
        document.push(
            Paragraph::new(manuscript.subtitle())
                .aligned(Alignment::Center)
                .styled(Style::new().italic().with_font_size(setup.subtitle_size)),
        );
    }
    document.push(Break::new(1.0));
    document.push(
        Paragraph::new(format!("by {}", manuscript.author()))
            .aligned(Alignment::Center)
            .styled(Style::new().with_font_size(setup.byline_size)),
    );
}

fn document_builder(manuscript: &Manuscript, setup: &PageSetup) -> DocumentBuilder {
    let mut builder = DocumentBuilder::new()
        .with_title(manuscript.title())
        .with_paper_size(setup.paper_size())
        .with_margins(Margins::all(mm_from_f64(setup.margin_mm)))
        .with_undecorated_pages(COVER_PAGES);

    if setup.running_head {
        let head = manuscript.title().to_owned();
        builder = builder.with_header(move |_page| {
            Paragraph::new(head.clone())
                .aligned(Alignment::Center)
                .styled(Style::new().italic().with_font_size(8))
                .padded(Margins::trbl(0, 0, 4, 0))
        });
    }

    if setup.page_numbers {
        builder = builder.with_footer(mm_from_f64(8.0), |page| {
            Paragraph::new((page - COVER_PAGES).to_string())
                .aligned(Alignment::Center)
                .styled(Style::new().with_font_size(9))
        });
    }

    builder
}

/// Renders the manuscript as a PDF.
pub fn render_pdf(manuscript: &Manuscript, setup: &PageSetup) -> Result<PagedDocument, Error> {
    let mut document = document_builder(manuscript, setup).build()?;
    document.set_font_size(setup.fonts.body);

    push_cover(&mut document, manuscript, setup);
    document.push(PageBreak::new());

    let column = ColumnText::new(column_lines(manuscript.body_markup()), setup.fonts);
    let marks = column.heading_marks();
    document.push(column);

    let mut bytes = Vec::new();
    document.render(&mut bytes)?;

    let chapters = marks
        .borrow()
        .iter()
        .map(|mark| ChapterPage {
            level: mark.level,
            title: mark.title.clone(),
            page_number: mark.page + COVER_PAGES + 1,
        })
        .collect();

    Ok(PagedDocument { bytes, chapters })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::LineKind;

    #[test]
    fn column_lines_skip_cover_and_keep_heading_ranks() {
        let body = "# Echoes\n![Cover](data:image/png;base64,AAAA)\n\n## Chapter 1\nThe *wind*.\n---\n";
        let kinds: Vec<LineKind> = column_lines(body).iter().map(FlowLine::kind).collect();
        assert_eq!(
            kinds,
            vec![
                LineKind::Heading(HeadingLevel::One),
                LineKind::Spacer,
                LineKind::Heading(HeadingLevel::Two),
                LineKind::Body,
                LineKind::Spacer,
            ]
        );
    }

    #[test]
    fn default_setup_is_a5_with_cover_box() {
        let setup = PageSetup::default();
        assert!((mm_to_f64(setup.content_width()) - 118.0).abs() < 1e-9);
        assert!((mm_to_f64(setup.content_height()) - 180.0).abs() < 1e-9);
        assert!((mm_to_f64(setup.cover_image_height()) - 108.0).abs() < 1e-9);
    }
}
