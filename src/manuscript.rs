//! The book being viewed and the assembler that produces its body markup.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::ImageFormat;

/// A finished book, immutable while it is being viewed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Manuscript {
    title: String,
    subtitle: String,
    author: String,
    body_markup: String,
    cover_image: Option<Vec<u8>>,
}

impl Manuscript {
    /// Creates a manuscript without cover art.
    pub fn new(
        title: impl Into<String>,
        subtitle: impl Into<String>,
        author: impl Into<String>,
        body_markup: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            subtitle: subtitle.into(),
            author: author.into(),
            body_markup: body_markup.into(),
            cover_image: None,
        }
    }

    /// Attaches cover art and returns the updated manuscript.
    pub fn with_cover_image(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.cover_image = Some(bytes.into());
        self
    }

    /// Book title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Subtitle, possibly empty.
    pub fn subtitle(&self) -> &str {
        &self.subtitle
    }

    /// Author byline.
    pub fn author(&self) -> &str {
        &self.author
    }

    /// The full body in the markup dialect.
    pub fn body_markup(&self) -> &str {
        &self.body_markup
    }

    /// Raw cover image bytes, if the book has cover art.
    pub fn cover_image(&self) -> Option<&[u8]> {
        self.cover_image.as_deref()
    }
}

/// A chapter as produced by the generation service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chapter {
    /// Chapter title from the table of contents.
    pub title: String,
    /// Generated prose.
    pub body: String,
}

impl Chapter {
    /// Creates a chapter.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Assembles a [`Manuscript`] from its generated parts.
///
/// Chapters keep their insertion order and are numbered from one.
#[derive(Clone, Debug, Default)]
pub struct ManuscriptBuilder {
    title: String,
    subtitle: String,
    author: String,
    chapters: Vec<Chapter>,
    cover_image: Option<Vec<u8>>,
}

impl ManuscriptBuilder {
    /// Starts a builder for the given title and author.
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            ..Self::default()
        }
    }

    /// Sets the subtitle.
    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = subtitle.into();
        self
    }

    /// Attaches cover art.
    pub fn with_cover_image(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.cover_image = Some(bytes.into());
        self
    }

    /// Appends a chapter.
    pub fn with_chapter(mut self, chapter: Chapter) -> Self {
        self.chapters.push(chapter);
        self
    }

    /// Produces the manuscript and its body markup.
    pub fn build(self) -> Manuscript {
        let mut header = vec![format!("# {}", self.title.trim())];
        if !self.subtitle.trim().is_empty() {
            header.push(format!("## {}", self.subtitle.trim()));
        }
        header.push(format!("*by {}*", self.author.trim()));

        let mut blocks = vec![header.join("\n")];
        if let Some(bytes) = &self.cover_image {
            blocks.push(cover_line(bytes));
        }
        for (index, chapter) in self.chapters.iter().enumerate() {
            blocks.push(format!(
                "## Chapter {}: {}\n\n{}",
                index + 1,
                chapter.title.trim(),
                chapter.body.trim()
            ));
        }

        let mut body = blocks.join("\n\n");
        body.push('\n');

        let manuscript = Manuscript::new(self.title, self.subtitle, self.author, body);
        match self.cover_image {
            Some(bytes) => manuscript.with_cover_image(bytes),
            None => manuscript,
        }
    }
}

/// Media type of an encoded image, sniffed from its leading bytes.
pub fn image_media_type(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::WebP) => "image/webp",
        _ => "application/octet-stream",
    }
}

fn cover_line(bytes: &[u8]) -> String {
    format!(
        "![Cover](data:{};base64,{})",
        image_media_type(bytes),
        STANDARD.encode(bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::{classify_line, HeadingLevel, MarkupLine};

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn builder_emits_header_and_numbered_chapters() {
        let manuscript = ManuscriptBuilder::new("Echoes", "Ada")
            .with_subtitle("A Tale")
            .with_chapter(Chapter::new("The Cave", "It was dark."))
            .with_chapter(Chapter::new("The Light", "Then it was not."))
            .build();

        let lines: Vec<_> = manuscript.body_markup().lines().collect();
        assert_eq!(lines[0], "# Echoes");
        assert_eq!(lines[1], "## A Tale");
        assert_eq!(lines[2], "*by Ada*");
        assert!(lines.contains(&"## Chapter 1: The Cave"));
        assert!(lines.contains(&"## Chapter 2: The Light"));
        let first = lines.iter().position(|l| l.contains("Chapter 1")).unwrap();
        let second = lines.iter().position(|l| l.contains("Chapter 2")).unwrap();
        assert!(first < second);
        assert_eq!(manuscript.cover_image(), None);
    }

    #[test]
    fn empty_subtitle_is_omitted() {
        let manuscript = ManuscriptBuilder::new("Echoes", "Ada").build();
        assert_eq!(manuscript.body_markup(), "# Echoes\n*by Ada*\n");
        assert!(matches!(
            classify_line("## Chapter 1: x"),
            MarkupLine::Heading(HeadingLevel::Two, _)
        ));
    }

    #[test]
    fn cover_is_embedded_as_data_uri() {
        let manuscript = ManuscriptBuilder::new("Echoes", "Ada")
            .with_cover_image(PNG_MAGIC)
            .build();
        let cover = manuscript
            .body_markup()
            .lines()
            .find(|line| line.starts_with("![Cover]"))
            .expect("cover line");
        match classify_line(cover) {
            MarkupLine::Image { alt, source } => {
                assert_eq!(alt, "Cover");
                let data = source
                    .strip_prefix("data:image/png;base64,")
                    .expect("png data uri");
                assert_eq!(STANDARD.decode(data).unwrap(), PNG_MAGIC);
            }
            other => panic!("unexpected classification {other:?}"),
        }
        assert_eq!(manuscript.cover_image(), Some(PNG_MAGIC));
    }

    #[test]
    fn unknown_image_bytes_fall_back_to_octet_stream() {
        assert_eq!(image_media_type(b"plain text"), "application/octet-stream");
        assert_eq!(image_media_type(b"\xff\xd8\xff\xe0rest"), "image/jpeg");
        assert_eq!(image_media_type(PNG_MAGIC), "image/png");
    }
}
