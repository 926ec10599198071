//! Markup rendering for manuscript bodies.
//!
//! The generation service emits a small markdown dialect: `#`, `##` and `###` headings, blank
//! line separated paragraphs with inline emphasis, and a single image line that embeds the
//! cover art.  Rendering is best effort; anything that does not match a known construct is
//! treated as body text.

use std::borrow::Cow;

use quick_xml::escape::escape;

use crate::flow::FlowLine;
use crate::richtext::{parse_inline, plain_text, Span};

/// Heading ranks recognised by the line-prefix convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HeadingLevel {
    /// `# ` headings, used for the book title.
    One,
    /// `## ` headings, used for subtitles and chapters.
    Two,
    /// `### ` headings.
    Three,
}

impl HeadingLevel {
    /// Maps the number of leading `#` characters onto a level.
    pub fn from_marker_len(len: usize) -> Option<Self> {
        match len {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            3 => Some(Self::Three),
            _ => None,
        }
    }

    /// Returns the numeric rank, 1 being the most prominent.
    pub fn rank(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
        }
    }
}

/// Classification of a single markup line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkupLine<'a> {
    /// A heading with the marker and surrounding whitespace removed.
    Heading(HeadingLevel, &'a str),
    /// An empty or whitespace-only line.
    Blank,
    /// A line consisting solely of an image reference.
    Image {
        /// Alternative text between the brackets.
        alt: &'a str,
        /// Image location, usually a `data:` URI.
        source: &'a str,
    },
    /// A thematic break (`---`, `***` or `___`).
    Rule,
    /// Anything else.
    Body(&'a str),
}

/// Classifies a single line of markup.
pub fn classify_line(line: &str) -> MarkupLine<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return MarkupLine::Blank;
    }

    // Heading markers must start the line; indented ones stay body text.
    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    if hashes > 0 {
        let rest = &line[hashes..];
        let separated = rest.is_empty() || rest.starts_with(char::is_whitespace);
        if let (Some(level), true) = (HeadingLevel::from_marker_len(hashes), separated) {
            return MarkupLine::Heading(level, rest.trim());
        }
    }

    if let Some((alt, source)) = image_reference(trimmed) {
        return MarkupLine::Image { alt, source };
    }

    if is_rule(trimmed) {
        return MarkupLine::Rule;
    }

    MarkupLine::Body(trimmed)
}

/// Returns whether the line is solely an embedded image reference.
pub fn is_image_line(line: &str) -> bool {
    matches!(classify_line(line), MarkupLine::Image { .. })
}

fn image_reference(line: &str) -> Option<(&str, &str)> {
    let inner = line.strip_prefix("![")?.strip_suffix(')')?;
    let (alt, source) = inner.split_once("](")?;
    if alt.contains(']') || source.contains(char::is_whitespace) {
        return None;
    }
    Some((alt, source))
}

fn is_rule(line: &str) -> bool {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    compact.len() >= 3
        && ['-', '*', '_']
            .iter()
            .any(|marker| compact.chars().all(|c| c == *marker))
}

/// Block-level nodes of a rendered manuscript.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    /// A heading with inline content.
    Heading {
        /// Heading rank.
        level: HeadingLevel,
        /// Inline content.
        spans: Vec<Span>,
    },
    /// A paragraph built from consecutive body lines.
    Paragraph {
        /// Inline content.
        spans: Vec<Span>,
    },
    /// A standalone image.
    Image {
        /// Alternative text.
        alt: String,
        /// Image location.
        source: String,
    },
    /// A thematic break.
    Rule,
}

/// Render tree derived from a manuscript body.
///
/// Trees are replaced wholesale whenever the markup changes; there is no incremental update.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderTree {
    nodes: Vec<Node>,
}

impl RenderTree {
    /// Creates a tree from already rendered nodes.
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Returns the block nodes in document order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns whether the tree contains no content.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Serializes the tree into an HTML fragment.
    pub fn to_html(&self) -> String {
        let mut html = String::new();
        for node in &self.nodes {
            match node {
                Node::Heading { level, spans } => {
                    let rank = level.rank();
                    html.push_str(&format!("<h{rank}>"));
                    push_inline_html(&mut html, spans);
                    html.push_str(&format!("</h{rank}>\n"));
                }
                Node::Paragraph { spans } => {
                    html.push_str("<p>");
                    push_inline_html(&mut html, spans);
                    html.push_str("</p>\n");
                }
                Node::Image { alt, source } => {
                    html.push_str(&format!(
                        "<img src=\"{}\" alt=\"{}\">\n",
                        escape(source.as_str()),
                        escape(alt.as_str())
                    ));
                }
                Node::Rule => html.push_str("<hr>\n"),
            }
        }
        html
    }

    /// Lowers the tree into lines for the column flow, separating blocks with spacers.
    pub fn flow_lines(&self) -> Vec<FlowLine> {
        let mut lines = Vec::with_capacity(self.nodes.len() * 2);
        for (index, node) in self.nodes.iter().enumerate() {
            if index > 0 {
                lines.push(FlowLine::spacer());
            }
            match node {
                Node::Heading { level, spans } => {
                    lines.push(FlowLine::heading(*level, spans.clone()))
                }
                Node::Paragraph { spans } => lines.push(FlowLine::body(spans.clone())),
                Node::Image { .. } => lines.push(FlowLine::figure()),
                Node::Rule => {}
            }
        }
        lines
    }

    /// Returns the text of all headings, in order.
    pub fn headings(&self) -> impl Iterator<Item = (HeadingLevel, String)> + '_ {
        self.nodes.iter().filter_map(|node| match node {
            Node::Heading { level, spans } => Some((*level, plain_text(spans))),
            _ => None,
        })
    }
}

fn push_inline_html(html: &mut String, spans: &[Span]) {
    for span in spans {
        let text: Cow<'_, str> = escape(span.text());
        match (span.is_bold(), span.is_italic()) {
            (true, true) => html.push_str(&format!("<strong><em>{text}</em></strong>")),
            (true, false) => html.push_str(&format!("<strong>{text}</strong>")),
            (false, true) => html.push_str(&format!("<em>{text}</em>")),
            (false, false) => html.push_str(&text),
        }
    }
}

/// Converts markup text into a [`RenderTree`].
///
/// Implementations must be pure and must not fail; unknown constructs degrade to text.
pub trait MarkupRenderer: Send + Sync {
    /// Renders the given markup.
    fn render(&self, markup: &str) -> RenderTree;
}

/// Renderer for the generation service's markdown dialect.
#[derive(Clone, Copy, Debug, Default)]
pub struct MarkdownRenderer;

impl MarkupRenderer for MarkdownRenderer {
    fn render(&self, markup: &str) -> RenderTree {
        let mut nodes = Vec::new();
        let mut paragraph: Vec<&str> = Vec::new();

        for line in markup.lines() {
            let classified = classify_line(line);
            if let MarkupLine::Body(text) = classified {
                paragraph.push(text);
                continue;
            }

            flush_paragraph(&mut paragraph, &mut nodes);
            match classified {
                MarkupLine::Heading(level, text) => nodes.push(Node::Heading {
                    level,
                    spans: parse_inline(text),
                }),
                MarkupLine::Image { alt, source } => nodes.push(Node::Image {
                    alt: alt.to_owned(),
                    source: source.to_owned(),
                }),
                MarkupLine::Rule => nodes.push(Node::Rule),
                MarkupLine::Blank | MarkupLine::Body(_) => {}
            }
        }
        flush_paragraph(&mut paragraph, &mut nodes);

        RenderTree::new(nodes)
    }
}

fn flush_paragraph(paragraph: &mut Vec<&str>, nodes: &mut Vec<Node>) {
    if paragraph.is_empty() {
        return;
    }
    let joined = paragraph.join(" ");
    paragraph.clear();
    nodes.push(Node::Paragraph {
        spans: parse_inline(&joined),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_three_heading_levels() {
        assert_eq!(
            classify_line("# Echoes"),
            MarkupLine::Heading(HeadingLevel::One, "Echoes")
        );
        assert_eq!(
            classify_line("## Chapter 1"),
            MarkupLine::Heading(HeadingLevel::Two, "Chapter 1")
        );
        assert_eq!(
            classify_line("###   Aside  "),
            MarkupLine::Heading(HeadingLevel::Three, "Aside")
        );
    }

    #[test]
    fn unmatched_prefixes_are_body_text() {
        assert_eq!(classify_line("#### Deep"), MarkupLine::Body("#### Deep"));
        assert_eq!(classify_line("#hashtag"), MarkupLine::Body("#hashtag"));
    }

    #[test]
    fn indented_markers_are_body_text() {
        assert_eq!(classify_line("   # Aside"), MarkupLine::Body("# Aside"));
        assert_eq!(
            classify_line("## Trailing  "),
            MarkupLine::Heading(HeadingLevel::Two, "Trailing")
        );
    }

    #[test]
    fn detects_cover_image_lines() {
        assert!(is_image_line("![Cover](data:image/png;base64,AAAA)"));
        assert!(!is_image_line("See ![Cover](x.png) here"));
        assert!(!is_image_line("![broken](no closing"));
    }

    #[test]
    fn renders_headings_paragraphs_and_images() {
        let tree = MarkdownRenderer.render(
            "# Echoes\n\n![Cover](cover.png)\n\n## Chapter 1\nThe wind\nwas *cold*.\n\n---\nEnd",
        );
        let nodes = tree.nodes();
        assert_eq!(nodes.len(), 6);
        assert!(matches!(nodes[0], Node::Heading { level: HeadingLevel::One, .. }));
        assert!(matches!(nodes[1], Node::Image { .. }));
        match &nodes[3] {
            Node::Paragraph { spans } => {
                assert_eq!(plain_text(spans), "The wind was cold.");
                assert!(spans[1].is_italic());
            }
            other => panic!("expected paragraph, got {other:?}"),
        }
        assert_eq!(nodes[4], Node::Rule);
    }

    #[test]
    fn html_escapes_text_and_attributes() {
        let tree = MarkdownRenderer.render("Fish & <chips> **\"now\"**");
        assert_eq!(
            tree.to_html(),
            "<p>Fish &amp; &lt;chips&gt; <strong>&quot;now&quot;</strong></p>\n"
        );
    }

    #[test]
    fn empty_markup_renders_empty_tree() {
        let tree = MarkdownRenderer.render("");
        assert!(tree.is_empty());
        assert_eq!(tree.to_html(), "");
        assert!(tree.flow_lines().is_empty());
    }

    #[test]
    fn flow_lines_separate_blocks_with_spacers() {
        let tree = MarkdownRenderer.render("## One\n\nText");
        let lines = tree.flow_lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], FlowLine::spacer());
    }
}
