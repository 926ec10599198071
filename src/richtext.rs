//! Inline emphasis for manuscript text.
//!
//! The generation service writes prose with markdown-style emphasis.  The types in this module
//! keep that emphasis as a flat list of [`Span`]s so every output format (HTML, the styled
//! document, the paged PDF column) can map it onto its own styling primitives.
//!
//! [`parse_markup`] is strict and reports where the input stops making sense; [`parse_inline`]
//! is the entry point used by the renderers and never fails.

use genpdf::style::{Style, StyledString};
use log::debug;

/// A slice of text together with inline style attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Span {
    text: String,
    bold: bool,
    italic: bool,
}

impl Span {
    /// Creates a new span with the provided text and no styles applied.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Returns the raw text contained in this span.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns whether the span should be rendered in bold.
    pub fn is_bold(&self) -> bool {
        self.bold
    }

    /// Returns whether the span should be rendered in italic.
    pub fn is_italic(&self) -> bool {
        self.italic
    }

    /// Sets the bold flag and returns the updated span.
    pub fn with_bold(mut self, bold: bool) -> Self {
        self.bold = bold;
        self
    }

    /// Sets the italic flag and returns the updated span.
    pub fn with_italic(mut self, italic: bool) -> Self {
        self.italic = italic;
        self
    }

    /// Convenience shorthand that marks the span as bold.
    pub fn bold(self) -> Self {
        self.with_bold(true)
    }

    /// Convenience shorthand that marks the span as italic.
    pub fn italic(self) -> Self {
        self.with_italic(true)
    }

    /// Returns a span with the same styling but different text.
    pub fn restyle(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: self.bold,
            italic: self.italic,
        }
    }

    /// Returns whether two spans carry identical styling.
    pub fn same_style(&self, other: &Span) -> bool {
        self.bold == other.bold && self.italic == other.italic
    }

    /// Builds a `genpdf` [`Style`] carrying the span decorations.
    pub fn to_style(&self) -> Style {
        let mut style = Style::new();
        if self.bold {
            style.set_bold();
        }
        if self.italic {
            style.set_italic();
        }
        style
    }

    /// Converts the span to a [`StyledString`] on top of `base`.
    pub fn to_styled_string(&self, base: Style) -> StyledString {
        StyledString::new(self.text.clone(), base.and(self.to_style()))
    }
}

/// Concatenates the text of all spans, dropping the styling.
pub fn plain_text(spans: &[Span]) -> String {
    spans.iter().map(Span::text).collect()
}

/// Parse errors produced by [`parse_markup`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message} (at byte {index})")]
pub struct ParseError {
    index: usize,
    message: String,
}

impl ParseError {
    fn new(index: usize, message: impl Into<String>) -> Self {
        Self {
            index,
            message: message.into(),
        }
    }

    /// Byte index in the original input string where the error was detected.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Human-readable description of the parsing error.
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct StyleState {
    bold: bool,
    italic: bool,
}

impl StyleState {
    fn to_span(self, text: impl Into<String>) -> Span {
        Span {
            text: text.into(),
            bold: self.bold,
            italic: self.italic,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Marker {
    Bold,
    Star,
    Underscore,
}

impl Marker {
    fn token(self) -> &'static str {
        match self {
            Marker::Bold => "**",
            Marker::Star => "*",
            Marker::Underscore => "_",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Marker::Bold => "bold span",
            Marker::Star | Marker::Underscore => "italic span",
        }
    }
}

/// Parses markdown-style inline emphasis into a list of [`Span`]s.
///
/// The supported constructs are:
///
/// - `**bold**` for bold text
/// - `*italic*` and `_italic_` for italic text
/// - a backslash before `*`, `_` or `\` for the literal character
///
/// Underscores only open emphasis at the start of a word and only close it at the end of one,
/// so identifiers such as `snake_case` stay literal.  Unterminated emphasis is reported as a
/// [`ParseError`].
pub fn parse_markup(input: &str) -> Result<Vec<Span>, ParseError> {
    let (spans, idx) = parse_inner(input, 0, StyleState::default(), None)?;
    debug_assert_eq!(idx, input.len());
    Ok(merge_adjacent(spans))
}

/// Parses inline emphasis, degrading malformed input to a single unstyled span.
pub fn parse_inline(input: &str) -> Vec<Span> {
    match parse_markup(input) {
        Ok(spans) => spans,
        Err(err) => {
            debug!("Rendering inline text literally: {err}");
            if input.is_empty() {
                Vec::new()
            } else {
                vec![Span::new(input)]
            }
        }
    }
}

fn parse_inner(
    input: &str,
    mut index: usize,
    state: StyleState,
    closing_marker: Option<Marker>,
) -> Result<(Vec<Span>, usize), ParseError> {
    let mut spans = Vec::new();
    let mut buffer = String::new();

    while index < input.len() {
        let rest = &input[index..];

        if let Some(marker) = closing_marker {
            if rest.starts_with(marker.token()) && closes_here(input, index, marker) {
                flush_buffer(&mut buffer, &mut spans, state);
                index += marker.token().len();
                return Ok((spans, index));
            }
        }

        if let Some(escaped) = rest.strip_prefix('\\').and_then(|tail| tail.chars().next()) {
            if matches!(escaped, '*' | '_' | '\\') {
                buffer.push(escaped);
                index += 1 + escaped.len_utf8();
                continue;
            }
        }

        let opener = if rest.starts_with("**") {
            Some(Marker::Bold)
        } else if rest.starts_with('*') {
            Some(Marker::Star)
        } else if rest.starts_with('_') && opens_here(input, index) {
            Some(Marker::Underscore)
        } else {
            None
        };

        if let Some(marker) = opener {
            flush_buffer(&mut buffer, &mut spans, state);
            index += marker.token().len();
            let mut nested_state = state;
            match marker {
                Marker::Bold => nested_state.bold = true,
                Marker::Star | Marker::Underscore => nested_state.italic = true,
            }
            let (nested, new_index) = parse_inner(input, index, nested_state, Some(marker))?;
            spans.extend(nested);
            index = new_index;
            continue;
        }

        let Some(ch) = rest.chars().next() else {
            break;
        };
        buffer.push(ch);
        index += ch.len_utf8();
    }

    if let Some(marker) = closing_marker {
        Err(ParseError::new(
            index,
            format!("unterminated {}", marker.description()),
        ))
    } else {
        flush_buffer(&mut buffer, &mut spans, state);
        Ok((spans, index))
    }
}

fn opens_here(input: &str, index: usize) -> bool {
    !input[..index]
        .chars()
        .next_back()
        .is_some_and(char::is_alphanumeric)
}

fn closes_here(input: &str, index: usize, marker: Marker) -> bool {
    if marker != Marker::Underscore {
        return true;
    }
    !input[index + 1..]
        .chars()
        .next()
        .is_some_and(char::is_alphanumeric)
}

fn flush_buffer(buffer: &mut String, spans: &mut Vec<Span>, state: StyleState) {
    if buffer.is_empty() {
        return;
    }
    spans.push(state.to_span(std::mem::take(buffer)));
}

fn merge_adjacent(spans: Vec<Span>) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if last.same_style(&span) => last.text.push_str(&span.text),
            _ => merged.push(span),
        }
    }
    merged
}
