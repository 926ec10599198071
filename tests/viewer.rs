use std::sync::Arc;

use storybook::markup::RenderTree;
use storybook::navigation::{SpreadPosition, SpreadView};
use storybook::pagination::ExtentMeasure;
use storybook::{Chapter, ExportFormat, ManuscriptBuilder, StorybookViewer, Viewport};

/// Reports a fixed content height, standing in for a measured layout.
struct MeasuredHeight(f64);

impl ExtentMeasure for MeasuredHeight {
    fn measure(&self, _tree: &RenderTree, _column_width: f64) -> f64 {
        self.0
    }
}

fn turn(viewer: &mut StorybookViewer, forward: bool) -> SpreadPosition {
    let started = if forward { viewer.next() } else { viewer.prev() };
    assert!(started, "expected a page turn to start");
    viewer.finish_turn()
}

fn book() -> Arc<storybook::Manuscript> {
    Arc::new(
        ManuscriptBuilder::new("Echoes", "Ada Quill")
            .with_chapter(Chapter::new("Low Tide", "The sea pulled back."))
            .with_chapter(Chapter::new("High Tide", "The sea came home."))
            .build(),
    )
}

#[test]
fn echoes_scenario() {
    let mut viewer = StorybookViewer::new().with_measure(MeasuredHeight(600.0));
    viewer.resize(Viewport::new(360.0, 400.0));
    viewer.open(book());

    assert_eq!(viewer.page_count(), 2);
    assert_eq!(viewer.total_spreads(), 1);
    assert_eq!(viewer.view(), SpreadView::Cover);

    assert_eq!(turn(&mut viewer, true), SpreadPosition::Spread(1));
    assert_eq!(
        viewer.view(),
        SpreadView::Spread {
            left: 1,
            right: Some(2)
        }
    );
}

#[test]
fn walking_the_whole_book_and_back() {
    let mut viewer = StorybookViewer::new().with_measure(MeasuredHeight(2000.0));
    viewer.resize(Viewport::new(360.0, 400.0));
    viewer.open(book());

    assert_eq!(viewer.page_count(), 5);
    assert_eq!(viewer.total_spreads(), 3);

    for expected in 1..=3 {
        assert_eq!(turn(&mut viewer, true), SpreadPosition::Spread(expected));
    }
    assert!(!viewer.next());
    assert_eq!(
        viewer.view(),
        SpreadView::Spread {
            left: 5,
            right: None
        }
    );

    for _ in 0..3 {
        turn(&mut viewer, false);
    }
    assert_eq!(viewer.position(), SpreadPosition::Cover);
    assert!(!viewer.prev());
}

#[test]
fn resizing_reclamps_the_current_spread() {
    let mut viewer = StorybookViewer::new().with_measure(MeasuredHeight(2000.0));
    viewer.resize(Viewport::new(360.0, 200.0));
    viewer.open(book());
    assert_eq!(viewer.page_count(), 10);

    for _ in 0..5 {
        turn(&mut viewer, true);
    }
    assert_eq!(viewer.position(), SpreadPosition::Spread(5));

    viewer.resize(Viewport::new(360.0, 1000.0));
    assert_eq!(viewer.page_count(), 2);
    assert_eq!(viewer.position(), SpreadPosition::Spread(1));
}

#[test]
fn turn_requests_during_a_turn_are_ignored() {
    let mut viewer = StorybookViewer::new().with_measure(MeasuredHeight(2000.0));
    viewer.resize(Viewport::new(360.0, 400.0));
    viewer.open(book());

    assert!(viewer.next());
    assert!(!viewer.next());
    assert!(!viewer.prev());
    assert_eq!(viewer.view(), SpreadView::Hidden);
    assert_eq!(viewer.finish_turn(), SpreadPosition::Spread(1));
}

#[test]
fn estimated_layout_grows_with_the_book() {
    let short = Arc::new(ManuscriptBuilder::new("Short", "Ada").build());
    let long = Arc::new(
        ManuscriptBuilder::new("Long", "Ada")
            .with_chapter(Chapter::new("One", "Words and more words. ".repeat(400)))
            .build(),
    );

    let mut viewer = StorybookViewer::new();
    viewer.resize(Viewport::new(360.0, 500.0));
    viewer.fonts_settled();

    viewer.open(short);
    let short_pages = viewer.page_count();
    viewer.open(long);
    let long_pages = viewer.page_count();

    assert_eq!(short_pages, 1);
    assert!(long_pages > short_pages);
    assert!(viewer.render_tree().is_some_and(|tree| !tree.is_empty()));
}

#[test]
fn html_export_from_the_viewer() {
    let mut viewer = StorybookViewer::new();
    viewer.open(book());
    let artifact = viewer.export(ExportFormat::Html).expect("html export");
    let html = String::from_utf8(artifact.bytes).expect("utf-8 html");
    assert!(html.contains("<h2>Chapter 2: High Tide</h2>"));
    assert_eq!(artifact.file_name, "Echoes.html");
}
