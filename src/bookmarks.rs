//! Chapter outline for rendered PDFs, built on top of `lopdf`.

use std::collections::BTreeMap;

use lopdf::{Dictionary, Document, Object, ObjectId};

/// Errors that can occur while embedding bookmarks into a rendered PDF document.
#[derive(Debug, thiserror::Error)]
pub enum BookmarkError {
    /// The PDF bytes could not be parsed or written by `lopdf`.
    #[error("failed to process PDF bytes: {0}")]
    Parse(#[from] lopdf::Error),
    /// Writing the updated document failed.
    #[error("failed to write PDF bytes: {0}")]
    Io(#[from] std::io::Error),
    /// A required catalog entry was missing from the document trailer.
    #[error("PDF catalog entry is missing")]
    MissingCatalog,
    /// The catalog object was not a dictionary, preventing outline injection.
    #[error("PDF catalog entry is not a dictionary")]
    InvalidCatalog,
    /// A bookmark referred to a page the document does not have.
    #[error("bookmark '{title}' refers to missing page {page_number}")]
    MissingPage {
        /// Title of the bookmark.
        title: String,
        /// The requested (1-indexed) page number.
        page_number: usize,
    },
}

/// A chapter heading and the page it starts on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChapterBookmark {
    /// Outline entry title.
    pub title: String,
    /// 1-indexed page number in the rendered document.
    pub page_number: usize,
}

/// Applies a flat outline mapping chapters to their pages.
///
/// Each entry gets a `/Dest [page /Fit]` destination.  Without bookmarks the input is returned
/// unchanged.
pub fn apply_chapter_bookmarks(
    pdf_bytes: &[u8],
    bookmarks: &[ChapterBookmark],
) -> Result<Vec<u8>, BookmarkError> {
    if bookmarks.is_empty() {
        return Ok(pdf_bytes.to_vec());
    }

    let mut document = Document::load_mem(pdf_bytes)?;
    let pages = document.get_pages();
    let entries = collect_outline_entries(&mut document, bookmarks, &pages)?;

    let outlines_id = document.new_object_id();
    link_outline_entries(outlines_id, &mut document, &entries);
    insert_outlines_root(outlines_id, &mut document, &entries)?;

    let mut buffer = Vec::new();
    document.save_to(&mut buffer)?;
    Ok(buffer)
}

struct OutlineEntry {
    object_id: ObjectId,
    page_ref: ObjectId,
    title: String,
}

fn collect_outline_entries(
    document: &mut Document,
    bookmarks: &[ChapterBookmark],
    pages: &BTreeMap<u32, ObjectId>,
) -> Result<Vec<OutlineEntry>, BookmarkError> {
    bookmarks
        .iter()
        .map(|bookmark| {
            let page_ref = u32::try_from(bookmark.page_number)
                .ok()
                .and_then(|number| pages.get(&number).copied())
                .ok_or_else(|| BookmarkError::MissingPage {
                    title: bookmark.title.clone(),
                    page_number: bookmark.page_number,
                })?;
            Ok(OutlineEntry {
                object_id: document.new_object_id(),
                page_ref,
                title: bookmark.title.clone(),
            })
        })
        .collect()
}

fn link_outline_entries(outlines_id: ObjectId, document: &mut Document, entries: &[OutlineEntry]) {
    for (index, entry) in entries.iter().enumerate() {
        let mut dictionary = Dictionary::new();
        dictionary.set("Title", Object::string_literal(entry.title.as_str()));
        dictionary.set(
            "Dest",
            Object::Array(vec![
                Object::Reference(entry.page_ref),
                Object::Name("Fit".into()),
            ]),
        );
        dictionary.set("Parent", Object::Reference(outlines_id));

        if let Some(previous) = index.checked_sub(1).and_then(|i| entries.get(i)) {
            dictionary.set("Prev", Object::Reference(previous.object_id));
        }
        if let Some(next) = entries.get(index + 1) {
            dictionary.set("Next", Object::Reference(next.object_id));
        }

        document
            .objects
            .insert(entry.object_id, Object::Dictionary(dictionary));
    }
}

fn insert_outlines_root(
    outlines_id: ObjectId,
    document: &mut Document,
    entries: &[OutlineEntry],
) -> Result<(), BookmarkError> {
    let catalog_id = document
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| BookmarkError::MissingCatalog)?;

    let mut dictionary = Dictionary::new();
    dictionary.set("Type", Object::Name("Outlines".into()));
    dictionary.set("Count", Object::Integer(entries.len() as i64));
    if let Some(first) = entries.first() {
        dictionary.set("First", Object::Reference(first.object_id));
    }
    if let Some(last) = entries.last() {
        dictionary.set("Last", Object::Reference(last.object_id));
    }
    document
        .objects
        .insert(outlines_id, Object::Dictionary(dictionary));

    let catalog = document
        .objects
        .get_mut(&catalog_id)
        .ok_or(BookmarkError::MissingCatalog)?
        .as_dict_mut()
        .map_err(|_| BookmarkError::InvalidCatalog)?;
    catalog.set("Outlines", Object::Reference(outlines_id));
    catalog.set("PageMode", Object::Name("UseOutlines".into()));

    Ok(())
}
