//! Styled document export.
//!
//! The manuscript is converted into a [`StyledDocument`] (a sequence of ranked paragraphs) and
//! handed to a [`DocumentConstructor`] obtained through the shared capability loader.  The
//! bundled constructor packages WordprocessingML into a DOCX container.

use std::io::{self, Cursor, Write};

use quick_xml::escape::escape;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::manuscript::Manuscript;
use crate::markup::{classify_line, HeadingLevel, MarkupLine};
use crate::richtext::{parse_inline, Span};

/// Paragraph rank in the styled document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParagraphRank {
    /// A heading of the given level.
    Heading(HeadingLevel),
    /// Body prose.
    Body,
    /// An empty paragraph used as vertical space.
    Spacer,
}

/// One paragraph with its rank and styled runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StyledParagraph {
    rank: ParagraphRank,
    runs: Vec<Span>,
}

impl StyledParagraph {
    /// Creates a paragraph.
    pub fn new(rank: ParagraphRank, runs: Vec<Span>) -> Self {
        Self { rank, runs }
    }

    /// Creates an empty spacer paragraph.
    pub fn spacer() -> Self {
        Self::new(ParagraphRank::Spacer, Vec::new())
    }

    /// Returns the paragraph rank.
    pub fn rank(&self) -> ParagraphRank {
        self.rank
    }

    /// Returns the styled runs.
    pub fn runs(&self) -> &[Span] {
        &self.runs
    }
}

/// Input of a [`DocumentConstructor`]: metadata plus sections of paragraphs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StyledDocument {
    title: String,
    author: String,
    sections: Vec<Vec<StyledParagraph>>,
}

impl StyledDocument {
    /// Creates an empty document.
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            sections: Vec::new(),
        }
    }

    /// Appends a section and returns the updated document.
    pub fn with_section(mut self, paragraphs: Vec<StyledParagraph>) -> Self {
        self.sections.push(paragraphs);
        self
    }

    /// Returns the document title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the document author.
    pub fn author(&self) -> &str {
        &self.author
    }

    /// Returns the sections in order.
    pub fn sections(&self) -> &[Vec<StyledParagraph>] {
        &self.sections
    }
}

/// Converts a manuscript into a single-section styled document.
///
/// The embedded cover image line is dropped first; the target format cannot use the inline
/// image data.  Heading lines keep their rank, blank lines become spacers, and everything else
/// becomes a body paragraph.  Inline emphasis is preserved in headings and body alike.
pub fn styled_document(manuscript: &Manuscript) -> StyledDocument {
    let paragraphs = manuscript
        .body_markup()
        .lines()
        .filter_map(|line| match classify_line(line) {
            MarkupLine::Image { .. } => None,
            MarkupLine::Heading(level, text) => Some(StyledParagraph::new(
                ParagraphRank::Heading(level),
                parse_inline(text),
            )),
            MarkupLine::Blank => Some(StyledParagraph::spacer()),
            MarkupLine::Rule | MarkupLine::Body(_) => Some(StyledParagraph::new(
                ParagraphRank::Body,
                parse_inline(line.trim()),
            )),
        })
        .collect();

    StyledDocument::new(manuscript.title(), manuscript.author()).with_section(paragraphs)
}

/// Errors raised while packaging a styled document.
#[derive(Debug, thiserror::Error)]
pub enum ConstructError {
    /// Writing to the output buffer failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The ZIP container could not be written.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// The document-construction capability.
pub trait DocumentConstructor: Send + Sync {
    /// Packages `document` into the target binary format.
    fn construct(&self, document: &StyledDocument) -> Result<Vec<u8>, ConstructError>;
}

/// Builds DOCX (Office Open XML) packages.
#[derive(Clone, Debug)]
pub struct DocxConstructor {
    compression_level: i64,
}

impl Default for DocxConstructor {
    fn default() -> Self {
        Self {
            compression_level: 6,
        }
    }
}

impl DocxConstructor {
    /// Sets the deflate level (0-9).
    pub fn with_compression_level(mut self, level: i64) -> Self {
        self.compression_level = level.clamp(0, 9);
        self
    }
}

impl DocumentConstructor for DocxConstructor {
    fn construct(&self, document: &StyledDocument) -> Result<Vec<u8>, ConstructError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(self.compression_level));

        let parts = [
            ("[Content_Types].xml", CONTENT_TYPES_XML.to_owned()),
            ("_rels/.rels", PACKAGE_RELS_XML.to_owned()),
            ("docProps/core.xml", core_properties(document)),
            ("word/_rels/document.xml.rels", DOCUMENT_RELS_XML.to_owned()),
            ("word/styles.xml", STYLES_XML.to_owned()),
            ("word/document.xml", document_xml(document)),
        ];
        for (name, contents) in parts {
            zip.start_file(name, options)?;
            zip.write_all(contents.as_bytes())?;
        }

        Ok(zip.finish()?.into_inner())
    }
}

fn core_properties(document: &StyledDocument) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>{}</dc:title><dc:creator>{}</dc:creator></cp:coreProperties>"#,
        escape(document.title()),
        escape(document.author())
    )
}

fn document_xml(document: &StyledDocument) -> String {
    let mut body = String::new();
    for (index, section) in document.sections().iter().enumerate() {
        if index > 0 {
            body.push_str(r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#);
        }
        for paragraph in section {
            push_paragraph(&mut body, paragraph);
        }
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}<w:sectPr><w:pgSz w:w="11906" w:h="16838"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="708" w:footer="708" w:gutter="0"/></w:sectPr></w:body></w:document>"#
    )
}

fn push_paragraph(body: &mut String, paragraph: &StyledParagraph) {
    match paragraph.rank() {
        ParagraphRank::Spacer => {
            body.push_str("<w:p/>");
            return;
        }
        ParagraphRank::Heading(level) => {
            body.push_str(&format!(
                r#"<w:p><w:pPr><w:pStyle w:val="Heading{}"/></w:pPr>"#,
                level.rank()
            ));
        }
        ParagraphRank::Body => body.push_str("<w:p>"),
    }

    for run in paragraph.runs() {
        body.push_str("<w:r>");
        if run.is_bold() || run.is_italic() {
            body.push_str("<w:rPr>");
            if run.is_bold() {
                body.push_str("<w:b/>");
            }
            if run.is_italic() {
                body.push_str("<w:i/>");
            }
            body.push_str("</w:rPr>");
        }
        body.push_str(&format!(
            r#"<w:t xml:space="preserve">{}</w:t></w:r>"#,
            escape(run.text())
        ));
    }
    body.push_str("</w:p>");
}

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/></Types>"#;

const PACKAGE_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/></Relationships>"#;

const DOCUMENT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:pPr><w:spacing w:after="120" w:line="300" w:lineRule="auto"/></w:pPr><w:rPr><w:sz w:val="24"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:pPr><w:keepNext/><w:spacing w:before="360" w:after="240"/><w:jc w:val="center"/><w:outlineLvl w:val="0"/></w:pPr><w:rPr><w:b/><w:sz w:val="40"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Heading2"><w:name w:val="heading 2"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:pPr><w:keepNext/><w:spacing w:before="240" w:after="120"/><w:outlineLvl w:val="1"/></w:pPr><w:rPr><w:b/><w:sz w:val="32"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Heading3"><w:name w:val="heading 3"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:pPr><w:keepNext/><w:spacing w:before="200" w:after="80"/><w:outlineLvl w:val="2"/></w:pPr><w:rPr><w:b/><w:sz w:val="26"/></w:rPr></w:style></w:styles>"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn sample() -> Manuscript {
        Manuscript::new(
            "Echoes",
            "",
            "Ada",
            "# Echoes\n![Cover](data:image/png;base64,AAAA)\n\n## Chapter 1\nThe *wind* & the sea.\n### Aside",
        )
    }

    #[test]
    fn conversion_drops_cover_and_ranks_headings() {
        let document = styled_document(&sample());
        let section = &document.sections()[0];
        let ranks: Vec<_> = section.iter().map(StyledParagraph::rank).collect();
        assert_eq!(
            ranks,
            vec![
                ParagraphRank::Heading(HeadingLevel::One),
                ParagraphRank::Spacer,
                ParagraphRank::Heading(HeadingLevel::Two),
                ParagraphRank::Body,
                ParagraphRank::Heading(HeadingLevel::Three),
            ]
        );
        assert!(section[3].runs()[1].is_italic());
        assert_eq!(document.title(), "Echoes");
    }

    #[test]
    fn heading_emphasis_becomes_styled_runs() {
        let manuscript = Manuscript::new("Storm", "", "Ada", "## The *Storm*");
        let document = styled_document(&manuscript);
        let runs = document.sections()[0][0].runs();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].text(), "The ");
        assert_eq!(runs[1].text(), "Storm");
        assert!(runs[1].is_italic());
    }

    #[test]
    fn docx_package_contains_styled_paragraphs() {
        let bytes = DocxConstructor::default()
            .construct(&styled_document(&sample()))
            .expect("construct docx");

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .expect("document part")
            .read_to_string(&mut xml)
            .expect("utf-8 document part");

        assert!(xml.contains(r#"<w:pStyle w:val="Heading2"/>"#));
        assert!(xml.contains("The "));
        assert!(xml.contains("<w:i/>"));
        assert!(xml.contains("&amp; the sea."));
        assert!(!xml.contains("base64"));
        assert!(archive.by_name("[Content_Types].xml").is_ok());
        assert!(archive.by_name("word/styles.xml").is_ok());
    }

    #[test]
    fn sections_are_separated_by_page_breaks() {
        let document = StyledDocument::new("T", "A")
            .with_section(vec![StyledParagraph::spacer()])
            .with_section(vec![StyledParagraph::spacer()]);
        let xml = document_xml(&document);
        assert_eq!(xml.matches(r#"<w:br w:type="page"/>"#).count(), 1);
    }
}
