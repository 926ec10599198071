//! Export of a manuscript into downloadable artifacts.
//!
//! Four formats are supported: a paged PDF, a styled DOCX document, a flat HTML page and the
//! raw markup.  [`ExportPipeline`] runs one export at a time, exposes which format is in flight
//! and reports failures to the user through a [`Notifier`].

pub mod docx;
pub mod html;
pub mod pdf;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};

use crate::capability::{
    shared_document_loader, CapabilityLoadError, CapabilityLoader, DocumentCapability,
};
use crate::manuscript::Manuscript;
use crate::markup::{MarkdownRenderer, MarkupRenderer};

use self::docx::ConstructError;
use self::pdf::PageSetup;

const MAX_FILE_STEM_CHARS: usize = 200;

/// Supported export formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    /// Paged document.
    Pdf,
    /// Styled word-processing document.
    Docx,
    /// Flat HTML page with a header.
    Html,
    /// The raw body markup.
    Markdown,
}

impl ExportFormat {
    /// Every format, in menu order.
    pub const ALL: [ExportFormat; 4] = [Self::Pdf, Self::Docx, Self::Html, Self::Markdown];

    /// Human readable name used in alerts.
    pub fn label(self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Docx => "DOCX",
            Self::Html => "HTML",
            Self::Markdown => "Markdown",
        }
    }

    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Html => "html",
            Self::Markdown => "md",
        }
    }

    /// Media type of the produced bytes.
    pub fn media_type(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Html => "text/html; charset=utf-8",
            Self::Markdown => "text/markdown; charset=utf-8",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The result of one export.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportArtifact {
    /// Suggested download name, `<sanitized title>.<extension>`.
    pub file_name: String,
    /// Media type of `bytes`.
    pub media_type: &'static str,
    /// Encoded content.
    pub bytes: Vec<u8>,
}

/// Sanitizes a title for use as a file name on every major platform.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim_matches(|c| c == ' ' || c == '.');
    let limited: String = trimmed.chars().take(MAX_FILE_STEM_CHARS).collect();

    if limited.is_empty() {
        return "untitled".to_owned();
    }
    if is_reserved_device_name(&limited) {
        return format!("_{limited}");
    }
    limited
}

fn is_reserved_device_name(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    match upper.as_str() {
        "CON" | "PRN" | "AUX" | "NUL" => true,
        _ => {
            let bytes = upper.as_bytes();
            bytes.len() == 4
                && (upper.starts_with("COM") || upper.starts_with("LPT"))
                && (b'1'..=b'9').contains(&bytes[3])
        }
    }
}

/// Errors produced by the export pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Another export is still running.
    #[error("an export is already in progress ({active})")]
    Busy {
        /// Format of the export in flight.
        active: ExportFormat,
    },
    /// The viewer has no manuscript open.
    #[error("no manuscript is open")]
    NoManuscript,
    /// PDF layout or encoding failed.
    #[error("PDF rendering failed: {0}")]
    Pdf(#[from] genpdf::error::Error),
    /// A capability the format depends on could not be loaded.
    #[error("{format} export is unavailable: {source}")]
    Capability {
        /// Format that needed the capability.
        format: ExportFormat,
        /// Loader failure.
        #[source]
        source: CapabilityLoadError,
    },
    /// The document constructor failed.
    #[error("document construction failed: {0}")]
    Construct(#[from] ConstructError),
    /// The chapter outline could not be written into the PDF.
    #[error("failed to write chapter bookmarks: {0}")]
    Bookmarks(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ExportError {
    /// Label of the format the error belongs to.
    pub fn format_label(&self) -> &'static str {
        match self {
            Self::Busy { active } => active.label(),
            Self::NoManuscript => "Export",
            Self::Pdf(_) | Self::Bookmarks(_) => ExportFormat::Pdf.label(),
            Self::Capability { format, .. } => format.label(),
            Self::Construct(_) => ExportFormat::Docx.label(),
        }
    }
}

/// Receives user-visible alerts about failed exports.
pub trait Notifier: Send + Sync {
    /// Shows `message` for a failed export of `format`.
    fn alert(&self, format: ExportFormat, message: &str);
}

/// Notifier that only writes a warning to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn alert(&self, format: ExportFormat, message: &str) {
        warn!("[{}] {}", format.label(), message);
    }
}

/// Runs exports one at a time.
pub struct ExportPipeline {
    active: Mutex<Option<ExportFormat>>,
    loader: Arc<CapabilityLoader<DocumentCapability>>,
    page_setup: PageSetup,
    renderer: Arc<dyn MarkupRenderer>,
    notifier: Arc<dyn Notifier>,
}

impl Default for ExportPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportPipeline {
    /// Creates a pipeline using the shared DOCX loader, A5 pages and log alerts.
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
            loader: shared_document_loader(),
            page_setup: PageSetup::default(),
            renderer: Arc::new(MarkdownRenderer),
            notifier: Arc::new(LogNotifier),
        }
    }

    /// Uses a different loader for the document construction capability.
    pub fn with_loader(mut self, loader: Arc<CapabilityLoader<DocumentCapability>>) -> Self {
        self.loader = loader;
        self
    }

    /// Sets the page geometry of the PDF export.
    pub fn with_page_setup(mut self, page_setup: PageSetup) -> Self {
        self.page_setup = page_setup;
        self
    }

    /// Sets the markup renderer used by the HTML export.
    pub fn with_renderer(mut self, renderer: Arc<dyn MarkupRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Sets the receiver of failure alerts.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Returns the page setup used for PDF exports.
    pub fn page_setup(&self) -> &PageSetup {
        &self.page_setup
    }

    fn slot(&self) -> MutexGuard<'_, Option<ExportFormat>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the format currently being exported, if any.
    pub fn exporting(&self) -> Option<ExportFormat> {
        *self.slot()
    }

    fn begin(&self, format: ExportFormat) -> Result<ActiveExport<'_>, ExportError> {
        let mut slot = self.slot();
        if let Some(active) = *slot {
            debug!("Rejecting {} export: {} export in progress", format, active);
            return Err(ExportError::Busy { active });
        }
        *slot = Some(format);
        Ok(ActiveExport { pipeline: self })
    }

    /// Exports the manuscript in the given format.
    ///
    /// Fails with [`ExportError::Busy`] while another export runs.  Any other failure is
    /// logged and reported through the notifier before it is returned.
    pub fn export(
        &self,
        manuscript: &Manuscript,
        format: ExportFormat,
    ) -> Result<ExportArtifact, ExportError> {
        let _active = self.begin(format)?;

        match self.produce(manuscript, format) {
            Ok(bytes) => {
                info!("Exported {} ({} bytes)", format, bytes.len());
                Ok(ExportArtifact {
                    file_name: format!(
                        "{}.{}",
                        sanitize_filename(manuscript.title()),
                        format.extension()
                    ),
                    media_type: format.media_type(),
                    bytes,
                })
            }
            Err(err) => Err(self.report(format, err)),
        }
    }

    /// Reports an export requested while no manuscript is open.
    pub fn reject_missing_manuscript(&self, format: ExportFormat) -> ExportError {
        self.report(format, ExportError::NoManuscript)
    }

    fn report(&self, format: ExportFormat, err: ExportError) -> ExportError {
        error!("{} export failed: {}", format, err);
        self.notifier
            .alert(format, &format!("{} export failed: {}", format.label(), err));
        err
    }

    fn produce(&self, manuscript: &Manuscript, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
        match format {
            ExportFormat::Pdf => self.produce_pdf(manuscript),
            ExportFormat::Docx => {
                let constructor = self
                    .loader
                    .get()
                    .map_err(|source| ExportError::Capability { format, source })?;
                let document = docx::styled_document(manuscript);
                Ok(constructor.construct(&document)?)
            }
            ExportFormat::Html => {
                Ok(html::render_html(manuscript, self.renderer.as_ref()).into_bytes())
            }
            ExportFormat::Markdown => Ok(manuscript.body_markup().as_bytes().to_vec()),
        }
    }

    #[cfg(not(feature = "bookmarks"))]
    fn produce_pdf(&self, manuscript: &Manuscript) -> Result<Vec<u8>, ExportError> {
        Ok(pdf::render_pdf(manuscript, &self.page_setup)?.bytes)
    }

    #[cfg(feature = "bookmarks")]
    fn produce_pdf(&self, manuscript: &Manuscript) -> Result<Vec<u8>, ExportError> {
        use crate::bookmarks::{apply_chapter_bookmarks, ChapterBookmark};
        use crate::markup::HeadingLevel;

        let rendered = pdf::render_pdf(manuscript, &self.page_setup)?;
        let bookmarks: Vec<ChapterBookmark> = rendered
            .chapters
            .iter()
            .filter(|chapter| matches!(chapter.level, HeadingLevel::One | HeadingLevel::Two))
            .map(|chapter| ChapterBookmark {
                title: chapter.title.clone(),
                page_number: chapter.page_number,
            })
            .collect();
        apply_chapter_bookmarks(&rendered.bytes, &bookmarks)
            .map_err(|err| ExportError::Bookmarks(Box::new(err)))
    }
}

/// Clears the exporting indicator when an export ends, however it ends.
struct ActiveExport<'a> {
    pipeline: &'a ExportPipeline,
}

impl Drop for ActiveExport<'_> {
    fn drop(&mut self) {
        *self.pipeline.slot() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    use super::docx::DocxConstructor;

    #[derive(Default)]
    struct RecordingNotifier {
        alerts: Mutex<Vec<(ExportFormat, String)>>,
    }

    impl Notifier for RecordingNotifier {
        fn alert(&self, format: ExportFormat, message: &str) {
            self.alerts
                .lock()
                .unwrap()
                .push((format, message.to_owned()));
        }
    }

    fn sample() -> Manuscript {
        Manuscript::new(
            "Echoes: A Tale?",
            "",
            "Ada",
            "# Echoes\n\n## Chapter 1: Dawn\n\nThe *wind* rose.\n",
        )
    }

    #[test]
    fn sanitizes_titles_for_file_names() {
        assert_eq!(sanitize_filename("Normal Book"), "Normal Book");
        assert_eq!(sanitize_filename("Book: A Tale"), "Book_ A Tale");
        assert_eq!(sanitize_filename("a/b\\c|d"), "a_b_c_d");
        assert_eq!(sanitize_filename("  ..Hidden.. "), "Hidden");
        assert_eq!(sanitize_filename("con"), "_con");
        assert_eq!(sanitize_filename("LPT3"), "_LPT3");
        assert_eq!(sanitize_filename("COM10"), "COM10");
        assert_eq!(sanitize_filename(" . "), "untitled");
        assert_eq!(sanitize_filename(&"é".repeat(300)).chars().count(), 200);
    }

    #[test]
    fn markdown_export_is_verbatim() {
        let pipeline = ExportPipeline::new();
        let manuscript = sample();
        let artifact = pipeline
            .export(&manuscript, ExportFormat::Markdown)
            .unwrap();
        assert_eq!(artifact.bytes, manuscript.body_markup().as_bytes());
        assert_eq!(artifact.file_name, "Echoes_ A Tale_.md");
        assert_eq!(artifact.media_type, "text/markdown; charset=utf-8");
        assert_eq!(pipeline.exporting(), None);
    }

    #[test]
    fn html_export_uses_title_for_file_name() {
        let artifact = ExportPipeline::new()
            .export(&sample(), ExportFormat::Html)
            .unwrap();
        assert_eq!(artifact.file_name, "Echoes_ A Tale_.html");
        let html = String::from_utf8(artifact.bytes).unwrap();
        assert!(html.contains("<h2>Chapter 1: Dawn</h2>"));
    }

    #[test]
    fn second_export_while_busy_is_rejected() {
        let (started_tx, started_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let started_tx = Mutex::new(started_tx);
        let release_rx = Mutex::new(release_rx);

        let loader = CapabilityLoader::new(move || -> Result<DocumentCapability, CapabilityLoadError> {
            let _ = started_tx.lock().unwrap().send(());
            let _ = release_rx.lock().unwrap().recv();
            Ok(Arc::new(DocxConstructor::default()) as DocumentCapability)
        });
        let pipeline = ExportPipeline::new().with_loader(Arc::new(loader));
        let manuscript = sample();

        thread::scope(|scope| {
            let first = scope.spawn(|| {
                pipeline
                    .export(&manuscript, ExportFormat::Docx)
                    .map(|artifact| artifact.file_name)
                    .map_err(|err| err.to_string())
            });

            started_rx.recv().unwrap();
            assert_eq!(pipeline.exporting(), Some(ExportFormat::Docx));

            let err = pipeline
                .export(&manuscript, ExportFormat::Markdown)
                .unwrap_err();
            assert!(matches!(
                err,
                ExportError::Busy {
                    active: ExportFormat::Docx
                }
            ));
            assert_eq!(pipeline.exporting(), Some(ExportFormat::Docx));

            release_tx.send(()).unwrap();
            let file_name = first.join().unwrap().unwrap();
            assert_eq!(file_name, "Echoes_ A Tale_.docx");
        });

        assert_eq!(pipeline.exporting(), None);
    }

    #[test]
    fn failures_are_reported_and_clear_the_indicator() {
        let notifier = Arc::new(RecordingNotifier::default());
        let loader = CapabilityLoader::new(|| -> Result<DocumentCapability, CapabilityLoadError> {
            Err(CapabilityLoadError::new("docx", "offline"))
        });
        let pipeline = ExportPipeline::new()
            .with_loader(Arc::new(loader))
            .with_notifier(notifier.clone());

        let err = pipeline.export(&sample(), ExportFormat::Docx).unwrap_err();
        assert!(matches!(
            err,
            ExportError::Capability {
                format: ExportFormat::Docx,
                ..
            }
        ));
        assert_eq!(err.format_label(), "DOCX");
        assert_eq!(pipeline.exporting(), None);

        let alerts = notifier.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].0, ExportFormat::Docx);
        assert!(alerts[0].1.contains("DOCX"));
        assert!(alerts[0].1.contains("offline"));
        drop(alerts);

        assert!(pipeline.export(&sample(), ExportFormat::Markdown).is_ok());
    }

    #[test]
    fn formats_have_distinct_extensions() {
        let extensions: Vec<_> = ExportFormat::ALL.iter().map(|f| f.extension()).collect();
        assert_eq!(extensions, vec!["pdf", "docx", "html", "md"]);
        assert_eq!(ExportFormat::Docx.to_string(), "DOCX");
    }
}
