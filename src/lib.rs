//! Paginated storybook viewer and multi-format export.
//!
//! A [`Manuscript`](manuscript::Manuscript) is rendered into a
//! [`RenderTree`](markup::RenderTree), paginated against the viewport and browsed spread by
//! spread through [`StorybookViewer`](viewer::StorybookViewer).  The same manuscript can be
//! exported as PDF, DOCX, HTML or raw markdown at any time.

pub mod builder;
pub mod capability;
pub mod elements;
pub mod export;
pub mod flow;
pub mod fonts;
pub mod manuscript;
pub mod markup;
pub mod navigation;
pub mod pagination;
pub mod richtext;
pub mod viewer;

#[cfg(feature = "bookmarks")]
pub mod bookmarks;

pub use export::{ExportArtifact, ExportError, ExportFormat, ExportPipeline};
pub use manuscript::{Chapter, Manuscript, ManuscriptBuilder};
pub use viewer::{StorybookViewer, Viewport};
