//! The flip-book viewer.
//!
//! [`StorybookViewer`] ties the pieces together: it renders the open manuscript, keeps the page
//! count in sync with the viewport, navigates spreads and hands exports to the pipeline.  All
//! methods take `&mut self`; the host drives them from its event loop.

use std::sync::Arc;

use log::debug;

use crate::export::{ExportArtifact, ExportError, ExportFormat, ExportPipeline};
use crate::manuscript::Manuscript;
use crate::markup::{MarkdownRenderer, MarkupRenderer, RenderTree};
use crate::navigation::{SpreadNavigator, SpreadPosition, SpreadView};
use crate::pagination::{EstimatedExtent, ExtentMeasure, MeasurementError, PageWindow, Paginator};

/// Content-area size of the viewer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    /// Column width.
    pub width: f64,
    /// Page height.
    pub height: f64,
}

impl Viewport {
    /// Creates a viewport.
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Viewer state for one manuscript at a time.
pub struct StorybookViewer {
    manuscript: Option<Arc<Manuscript>>,
    tree: Option<RenderTree>,
    viewport: Option<Viewport>,
    renderer: Arc<dyn MarkupRenderer>,
    measure: Box<dyn ExtentMeasure>,
    paginator: Paginator,
    navigator: SpreadNavigator,
    exports: Arc<ExportPipeline>,
}

impl Default for StorybookViewer {
    fn default() -> Self {
        Self::new()
    }
}

impl StorybookViewer {
    /// Creates a closed viewer with the default renderer, extent estimate and export pipeline.
    pub fn new() -> Self {
        Self {
            manuscript: None,
            tree: None,
            viewport: None,
            renderer: Arc::new(MarkdownRenderer),
            measure: Box::new(EstimatedExtent::default()),
            paginator: Paginator::new(),
            navigator: SpreadNavigator::default(),
            exports: Arc::new(ExportPipeline::new()),
        }
    }

    /// Uses a different markup renderer.
    pub fn with_renderer(mut self, renderer: Arc<dyn MarkupRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Uses a different content measurement.
    pub fn with_measure(mut self, measure: impl ExtentMeasure + 'static) -> Self {
        self.measure = Box::new(measure);
        self
    }

    /// Uses a different export pipeline.
    pub fn with_exports(mut self, exports: Arc<ExportPipeline>) -> Self {
        self.exports = exports;
        self
    }

    /// Returns the export pipeline, e.g. to run exports on a worker thread.
    pub fn exports(&self) -> Arc<ExportPipeline> {
        Arc::clone(&self.exports)
    }

    /// Opens a manuscript at the cover.
    pub fn open(&mut self, manuscript: Arc<Manuscript>) {
        debug!("Opening '{}'", manuscript.title());
        self.tree = Some(self.renderer.render(manuscript.body_markup()));
        self.manuscript = Some(manuscript);
        self.navigator.reset();
        self.remeasure();
        self.settle_quietly();
    }

    /// Closes the current manuscript.  Exports already running are not affected.
    pub fn close(&mut self) {
        debug!("Closing viewer");
        self.manuscript = None;
        self.tree = None;
        self.paginator.clear_content();
        self.navigator.reset();
        self.settle_quietly();
    }

    /// Returns the open manuscript.
    pub fn manuscript(&self) -> Option<&Arc<Manuscript>> {
        self.manuscript.as_ref()
    }

    /// Returns the render tree of the open manuscript.
    pub fn render_tree(&self) -> Option<&RenderTree> {
        self.tree.as_ref()
    }

    /// Records a new viewport size.
    pub fn resize(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
        self.paginator.viewport_resized(viewport.height);
        self.remeasure();
        self.settle_quietly();
    }

    /// Reports that fonts finished loading, which can change the content height.
    pub fn fonts_settled(&mut self) {
        self.paginator.fonts_settled();
        self.remeasure();
        self.settle_quietly();
    }

    /// Recomputes the page count if anything changed since the last call.
    pub fn settle(&mut self) -> Result<usize, MeasurementError> {
        if !self.paginator.is_dirty() {
            return Ok(self.paginator.page_count());
        }
        let page_count = self.paginator.recompute()?;
        self.navigator.set_page_count(page_count);
        Ok(page_count)
    }

    fn settle_quietly(&mut self) {
        if let Err(err) = self.settle() {
            debug!("Pagination deferred: {}", err);
        }
    }

    fn remeasure(&mut self) {
        let extent = match (&self.tree, self.viewport) {
            (Some(tree), Some(viewport)) => self.measure.measure(tree, viewport.width),
            _ => 0.0,
        };
        self.paginator.content_changed(extent);
    }

    /// Starts turning to the next spread.
    pub fn next(&mut self) -> bool {
        self.manuscript.is_some() && self.navigator.next()
    }

    /// Starts turning to the previous spread.
    pub fn prev(&mut self) -> bool {
        self.manuscript.is_some() && self.navigator.prev()
    }

    /// Completes the page turn in progress.
    pub fn finish_turn(&mut self) -> SpreadPosition {
        self.navigator.finish_turn()
    }

    /// Returns the current spread position.
    pub fn position(&self) -> SpreadPosition {
        self.navigator.position()
    }

    /// Returns what should be on screen.
    pub fn view(&self) -> SpreadView {
        self.navigator.view(self.paginator.page_count())
    }

    /// Returns the number of logical pages, at least one.
    pub fn page_count(&self) -> usize {
        self.paginator.page_count()
    }

    /// Returns the number of spreads after the cover.
    pub fn total_spreads(&self) -> usize {
        self.navigator.total_spreads()
    }

    /// Returns the visible window of the 1-based `page`.
    pub fn page_window(&self, page: usize) -> Option<PageWindow> {
        if page == 0 || page > self.page_count() {
            return None;
        }
        self.paginator.window(page)
    }

    /// Exports the open manuscript.
    pub fn export(&self, format: ExportFormat) -> Result<ExportArtifact, ExportError> {
        match &self.manuscript {
            Some(manuscript) => self.exports.export(manuscript, format),
            None => Err(self.exports.reject_missing_manuscript(format)),
        }
    }

    /// Returns the format currently being exported, if any.
    pub fn exporting(&self) -> Option<ExportFormat> {
        self.exports.exporting()
    }
}
