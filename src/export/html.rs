//! Flat HTML export: one self-contained page with a header and the rendered body.

use quick_xml::escape::escape;

use crate::manuscript::Manuscript;
use crate::markup::MarkupRenderer;

const STYLESHEET: &str = "\
body { margin: 0 auto; max-width: 42rem; padding: 2rem 1.5rem; font-family: Georgia, 'Times New Roman', serif; line-height: 1.6; color: #2b2118; background: #fdf8f0; }
.book-header { text-align: center; margin-bottom: 3rem; }
.book-header h1 { font-size: 2.4rem; margin-bottom: 0.25rem; }
.book-header .subtitle { font-style: italic; font-size: 1.25rem; margin: 0.25rem 0; }
.book-header .byline { font-size: 1rem; }
.book-body h1, .book-body h2, .book-body h3 { line-height: 1.25; margin-top: 2rem; }
.book-body img { display: block; max-width: 100%; margin: 1.5rem auto; }
.book-body hr { border: none; border-top: 1px solid #c9b79c; margin: 2rem 0; }
";

/// Renders the manuscript as a standalone HTML5 document.
pub fn render_html(manuscript: &Manuscript, renderer: &dyn MarkupRenderer) -> String {
    let title = escape(manuscript.title());
    let body = renderer.render(manuscript.body_markup()).to_html();

    let mut html = String::with_capacity(STYLESHEET.len() + body.len() + 512);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!("<title>{title}</title>\n"));
    html.push_str(&format!("<style>\n{STYLESHEET}</style>\n"));
    html.push_str("</head>\n<body>\n<header class=\"book-header\">\n");
    html.push_str(&format!("<h1>{title}</h1>\n"));
    if !manuscript.subtitle().trim().is_empty() {
        html.push_str(&format!(
            "<p class=\"subtitle\">{}</p>\n",
            escape(manuscript.subtitle())
        ));
    }
    html.push_str(&format!(
        "<p class=\"byline\">by {}</p>\n",
        escape(manuscript.author())
    ));
    html.push_str("</header>\n<main class=\"book-body\">");
    if !body.is_empty() {
        html.push('\n');
        html.push_str(&body);
    }
    html.push_str("</main>\n</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::MarkdownRenderer;

    #[test]
    fn empty_body_yields_header_and_empty_main() {
        let manuscript = Manuscript::new("Echoes", "", "Ada", "");
        let html = render_html(&manuscript, &MarkdownRenderer);
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Echoes</title>"));
        assert!(html.contains("<h1>Echoes</h1>"));
        assert!(html.contains("<p class=\"byline\">by Ada</p>"));
        assert!(html.contains("<main class=\"book-body\"></main>"));
        assert!(!html.contains("class=\"subtitle\""));
    }

    #[test]
    fn metadata_and_body_are_escaped() {
        let manuscript = Manuscript::new("Salt & <Sea>", "\"Tides\"", "O'Neil", "A < B & *C*");
        let html = render_html(&manuscript, &MarkdownRenderer);
        assert!(html.contains("<title>Salt &amp; &lt;Sea&gt;</title>"));
        assert!(html.contains("<p class=\"subtitle\">&quot;Tides&quot;</p>"));
        assert!(html.contains("by O&apos;Neil"));
        assert!(html.contains("<p>A &lt; B &amp; <em>C</em></p>"));
    }

    #[test]
    fn headings_keep_their_rank() {
        let manuscript = Manuscript::new("T", "", "A", "## Chapter 1: Dawn\n\nLight.\n");
        let html = render_html(&manuscript, &MarkdownRenderer);
        assert!(html.contains("<h2>Chapter 1: Dawn</h2>"));
        assert!(html.contains("<p>Light.</p>"));
    }
}
