//! Page counting over a single continuously laid out flow.
//!
//! The viewer does not reflow content per page.  It lays the whole render tree out once in a
//! column of the viewport's width, then shows fixed-height windows of it; page `n` is the
//! window starting at `(n - 1) × page height`.

use log::debug;

use crate::flow::{self, EstimatedMetrics};
use crate::markup::RenderTree;

/// Number of pages needed to show `extent` through windows of `viewport_height`.
///
/// Always at least one, even for empty content or a degenerate viewport.
pub fn page_count(viewport_height: f64, extent: f64) -> usize {
    if !(viewport_height.is_finite() && viewport_height > 0.0) {
        return 1;
    }
    if !(extent.is_finite() && extent > 0.0) {
        return 1;
    }
    ((extent / viewport_height).ceil() as usize).max(1)
}

/// Offset into the flow at which the 1-based `page` starts.
pub fn offset_for(page: usize, page_height: f64) -> f64 {
    page.saturating_sub(1) as f64 * page_height
}

/// The visible window for one page.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageWindow {
    /// Translation applied to the shared flow.
    pub offset: f64,
    /// Height of the window.
    pub height: f64,
}

/// Measurement failures.  None of them reach the user; pagination is retried on the next tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MeasurementError {
    /// The viewport has not been mounted or has no height yet.
    #[error("viewport has no measurable height")]
    ViewportNotMounted,
}

/// Events that invalidate a previous page count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// New content was loaded or re-measured.
    ContentChanged,
    /// The viewport changed size.
    ViewportResized,
    /// Web fonts finished loading after the first layout.
    FontsSettled,
}

/// Dirty-flag page counter.
///
/// Inputs are pushed through the trigger methods; [`Paginator::recompute`] turns them into a
/// page count.  Until a valid viewport exists the previous count stays in effect.
#[derive(Clone, Debug)]
pub struct Paginator {
    page_height: Option<f64>,
    extent: f64,
    fonts_settled: bool,
    dirty: bool,
    page_count: usize,
}

impl Default for Paginator {
    fn default() -> Self {
        Self {
            page_height: None,
            extent: 0.0,
            fonts_settled: false,
            dirty: true,
            page_count: 1,
        }
    }
}

impl Paginator {
    /// Creates a paginator with no viewport and no content.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly measured content extent.
    pub fn content_changed(&mut self, extent: f64) {
        self.extent = extent;
        self.invalidate(Trigger::ContentChanged);
    }

    /// Records a new viewport content-area height.
    pub fn viewport_resized(&mut self, height: f64) {
        self.page_height = Some(height);
        self.invalidate(Trigger::ViewportResized);
    }

    /// Marks fonts as loaded; the next recompute runs even if nothing else changed.
    pub fn fonts_settled(&mut self) {
        self.fonts_settled = true;
        self.invalidate(Trigger::FontsSettled);
    }

    /// Drops content while keeping the viewport.
    pub fn clear_content(&mut self) {
        self.extent = 0.0;
        self.page_count = 1;
        self.invalidate(Trigger::ContentChanged);
    }

    fn invalidate(&mut self, trigger: Trigger) {
        debug!("Pagination invalidated by {trigger:?}");
        self.dirty = true;
    }

    /// Returns whether a recompute is pending.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns whether fonts have been reported as loaded.
    pub fn fonts_ready(&self) -> bool {
        self.fonts_settled
    }

    /// Returns the last computed page count.
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Returns the current viewport height, if one is mounted.
    pub fn page_height(&self) -> Option<f64> {
        self.page_height.filter(|height| height.is_finite() && *height > 0.0)
    }

    /// Returns the last recorded content extent.
    pub fn extent(&self) -> f64 {
        self.extent
    }

    /// Recomputes the page count from the current inputs.
    ///
    /// With an unmounted viewport the paginator stays dirty and keeps its previous count.
    pub fn recompute(&mut self) -> Result<usize, MeasurementError> {
        let Some(page_height) = self.page_height() else {
            debug!("Deferring pagination: viewport not mounted");
            return Err(MeasurementError::ViewportNotMounted);
        };

        self.page_count = page_count(page_height, self.extent);
        self.dirty = false;
        debug!(
            "Paginated extent {:.1} over height {:.1} into {} page(s)",
            self.extent, page_height, self.page_count
        );
        Ok(self.page_count)
    }

    /// Returns the window for `page` under the current viewport.
    pub fn window(&self, page: usize) -> Option<PageWindow> {
        let height = self.page_height()?;
        Some(PageWindow {
            offset: offset_for(page, height),
            height,
        })
    }
}

/// Measures how tall a render tree is when laid out in a column of the given width.
pub trait ExtentMeasure {
    /// Returns the laid out height of `tree`.
    fn measure(&self, tree: &RenderTree, column_width: f64) -> f64;
}

/// Extent estimate based on [`EstimatedMetrics`].
#[derive(Clone, Debug, Default)]
pub struct EstimatedExtent {
    metrics: EstimatedMetrics,
}

impl EstimatedExtent {
    /// Creates an estimator using the provided metrics.
    pub fn new(metrics: EstimatedMetrics) -> Self {
        Self { metrics }
    }
}

impl ExtentMeasure for EstimatedExtent {
    fn measure(&self, tree: &RenderTree, column_width: f64) -> f64 {
        let rows = flow::layout_rows(&tree.flow_lines(), column_width, &self.metrics);
        flow::extent(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::{MarkdownRenderer, MarkupRenderer};

    #[test]
    fn page_count_is_ceiling_with_minimum_one() {
        assert_eq!(page_count(400.0, 600.0), 2);
        assert_eq!(page_count(400.0, 800.0), 2);
        assert_eq!(page_count(400.0, 800.5), 3);
        assert_eq!(page_count(400.0, 1.0), 1);
        assert_eq!(page_count(400.0, 0.0), 1);
        assert_eq!(page_count(0.0, 600.0), 1);
        assert_eq!(page_count(400.0, f64::NAN), 1);
    }

    #[test]
    fn page_count_matches_ceiling_over_a_grid() {
        for viewport in [1.0_f64, 7.0, 333.0, 400.0] {
            for extent in [0.5_f64, 1.0, 99.0, 400.0, 401.0, 12_345.0] {
                let expected = (extent / viewport).ceil() as usize;
                assert_eq!(page_count(viewport, extent), expected.max(1));
            }
        }
    }

    #[test]
    fn offsets_are_page_multiples() {
        assert_eq!(offset_for(1, 400.0), 0.0);
        assert_eq!(offset_for(3, 400.0), 800.0);
        assert_eq!(offset_for(0, 400.0), 0.0);
    }

    #[test]
    fn defers_until_viewport_is_mounted() {
        let mut paginator = Paginator::new();
        paginator.content_changed(900.0);
        assert_eq!(paginator.extent(), 900.0);
        assert_eq!(
            paginator.recompute(),
            Err(MeasurementError::ViewportNotMounted)
        );
        assert!(paginator.is_dirty());
        assert_eq!(paginator.page_count(), 1);

        paginator.viewport_resized(0.0);
        assert!(paginator.recompute().is_err());

        paginator.viewport_resized(400.0);
        assert_eq!(paginator.recompute(), Ok(3));
        assert!(!paginator.is_dirty());
    }

    #[test]
    fn recompute_is_idempotent() {
        let mut paginator = Paginator::new();
        paginator.viewport_resized(400.0);
        paginator.content_changed(600.0);
        let first = paginator.recompute();
        assert!(!paginator.fonts_ready());
        paginator.fonts_settled();
        assert!(paginator.fonts_ready());
        assert!(paginator.is_dirty());
        assert_eq!(paginator.recompute(), first);
        assert_eq!(paginator.recompute(), first);
        assert_eq!(paginator.window(2).map(|w| w.offset), Some(400.0));
    }

    #[test]
    fn estimated_extent_grows_with_content() {
        let measure = EstimatedExtent::default();
        let short = MarkdownRenderer.render("## One\n\nShort.");
        let long = MarkdownRenderer.render(&"## One\n\nA much longer paragraph. ".repeat(40));
        let short_extent = measure.measure(&short, 300.0);
        let long_extent = measure.measure(&long, 300.0);
        assert!(short_extent > 0.0);
        assert!(long_extent > short_extent);
        assert_eq!(measure.measure(&RenderTree::default(), 300.0), 0.0);
    }
}
