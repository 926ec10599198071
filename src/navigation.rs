//! Spread navigation for the flip-book view.
//!
//! Position `Cover` shows the cover; `Spread(k)` shows logical pages `2k - 1` and `2k`.  A page
//! turn happens in two steps: [`SpreadNavigator::next`] or [`SpreadNavigator::prev`] hides the
//! content and records the target, [`SpreadNavigator::finish_turn`] moves there and reveals the
//! content again.  Requests that arrive mid-turn are dropped.

use std::time::Duration;

use log::debug;

/// How long callers keep content hidden before calling [`SpreadNavigator::finish_turn`].
pub const TURN_FADE: Duration = Duration::from_millis(150);

/// Number of spreads needed for `page_count` logical pages.
pub fn total_spreads(page_count: usize) -> usize {
    page_count.div_ceil(2)
}

/// Where the viewer is in the book.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum SpreadPosition {
    /// The cover page.
    #[default]
    Cover,
    /// The `k`-th spread, 1-based.
    Spread(usize),
}

impl SpreadPosition {
    /// Returns the numeric spread index, `0` for the cover.
    pub fn index(self) -> usize {
        match self {
            Self::Cover => 0,
            Self::Spread(k) => k,
        }
    }

    fn from_index(index: usize) -> Self {
        if index == 0 {
            Self::Cover
        } else {
            Self::Spread(index)
        }
    }
}

/// What the viewer should display right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpreadView {
    /// A page turn is in progress and content is hidden.
    Hidden,
    /// The cover page.
    Cover,
    /// Two facing pages; `right` is `None` past the last page.
    Spread {
        /// Left logical page, 1-based.
        left: usize,
        /// Right logical page, if it exists.
        right: Option<usize>,
    },
}

/// State machine over the spread position.
#[derive(Clone, Debug)]
pub struct SpreadNavigator {
    position: SpreadPosition,
    total_spreads: usize,
    pending: Option<SpreadPosition>,
}

impl Default for SpreadNavigator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl SpreadNavigator {
    /// Creates a navigator at the cover for a book of `page_count` pages.
    pub fn new(page_count: usize) -> Self {
        Self {
            position: SpreadPosition::Cover,
            total_spreads: total_spreads(page_count.max(1)),
            pending: None,
        }
    }

    /// Returns to the cover and cancels any turn in progress.
    pub fn reset(&mut self) {
        self.position = SpreadPosition::Cover;
        self.pending = None;
    }

    /// Returns the current position.
    pub fn position(&self) -> SpreadPosition {
        self.position
    }

    /// Returns the number of spreads after the cover.
    pub fn total_spreads(&self) -> usize {
        self.total_spreads
    }

    /// Returns whether a page turn is in progress.
    pub fn is_turning(&self) -> bool {
        self.pending.is_some()
    }

    /// Starts a turn towards the next spread.  Returns `false` when nothing happened.
    pub fn next(&mut self) -> bool {
        let index = self.position.index();
        if index >= self.total_spreads {
            return false;
        }
        self.begin_turn(SpreadPosition::from_index(index + 1))
    }

    /// Starts a turn towards the previous spread.  Returns `false` when nothing happened.
    pub fn prev(&mut self) -> bool {
        match self.position {
            SpreadPosition::Cover => false,
            SpreadPosition::Spread(k) => self.begin_turn(SpreadPosition::from_index(k - 1)),
        }
    }

    fn begin_turn(&mut self, target: SpreadPosition) -> bool {
        if let Some(pending) = self.pending {
            debug!("Ignoring turn to {target:?}: already turning to {pending:?}");
            return false;
        }
        debug!("Turning from {:?} to {target:?}", self.position);
        self.pending = Some(target);
        true
    }

    /// Completes the turn in progress, if any, and returns the resulting position.
    pub fn finish_turn(&mut self) -> SpreadPosition {
        if let Some(target) = self.pending.take() {
            self.position = target;
        }
        self.position
    }

    /// Updates the number of pages, clamping the position onto the last spread.
    pub fn set_page_count(&mut self, page_count: usize) {
        let total = total_spreads(page_count.max(1));
        self.total_spreads = total;
        let clamp =
            |position: SpreadPosition| SpreadPosition::from_index(position.index().min(total));
        self.position = clamp(self.position);
        self.pending = self.pending.map(clamp);
    }

    /// Returns what should be displayed for a book of `page_count` pages.
    pub fn view(&self, page_count: usize) -> SpreadView {
        if self.is_turning() {
            return SpreadView::Hidden;
        }
        match self.position {
            SpreadPosition::Cover => SpreadView::Cover,
            SpreadPosition::Spread(k) => {
                let right = 2 * k;
                SpreadView::Spread {
                    left: right - 1,
                    right: (right <= page_count).then_some(right),
                }
            }
        }
    }
}
