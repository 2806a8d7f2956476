//! PDF text extraction.
//!
//! The PDF is validated with `lopdf`, then text is pulled page by page with
//! `pdf-extract`. When `pdf-extract` errors or panics on a document that
//! `lopdf` could load, `lopdf`'s own per-page extraction is used instead.

use lopdf::Document;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::ExtractError;
use crate::utils::file::{is_pdf_bytes, text_path_for};

/// Extract the text of `pdf_path` into its sibling `.txt` file.
///
/// Any existing file at that path is overwritten. Returns the text path.
pub fn extract_pdf_text(pdf_path: &Path) -> Result<PathBuf, ExtractError> {
    let pages = extract_pages(pdf_path)?;
    let text = join_pages(&pages);

    let text_path = text_path_for(pdf_path);
    std::fs::write(&text_path, text.as_bytes())?;

    debug!(
        pdf = %pdf_path.display(),
        text = %text_path.display(),
        pages = pages.len(),
        bytes = text.len(),
        "extracted PDF text"
    );
    Ok(text_path)
}

/// Text of every page in document order.
pub fn extract_pages(pdf_path: &Path) -> Result<Vec<String>, ExtractError> {
    let bytes = std::fs::read(pdf_path)?;
    if !is_pdf_bytes(&bytes) {
        return Err(parse_error(pdf_path, "missing %PDF header"));
    }

    let doc = Document::load_mem(&bytes).map_err(|e| parse_error(pdf_path, e))?;
    if doc.get_pages().is_empty() {
        return Err(parse_error(pdf_path, "document has no pages"));
    }

    let extracted = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_by_pages(pdf_path)
    }));

    match extracted {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => {
            warn!(pdf = %pdf_path.display(), "pdf-extract failed, using lopdf: {e}");
            Ok(extract_pages_via_lopdf(&doc))
        }
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!(pdf = %pdf_path.display(), "pdf-extract panicked, using lopdf: {reason}");
            Ok(extract_pages_via_lopdf(&doc))
        }
    }
}

fn extract_pages_via_lopdf(doc: &Document) -> Vec<String> {
    doc.get_pages()
        .keys()
        .map(|&page| doc.extract_text(&[page]).unwrap_or_default())
        .collect()
}

/// Concatenate page texts, each followed by a blank line.
/// Pages with no visible text contribute nothing.
pub fn join_pages<S: AsRef<str>>(pages: &[S]) -> String {
    let mut text = String::new();
    for page in pages {
        let page = page.as_ref();
        if page.trim().is_empty() {
            continue;
        }
        text.push_str(page);
        text.push_str("\n\n");
    }
    text
}

fn parse_error(path: &Path, reason: impl std::fmt::Display) -> ExtractError {
    ExtractError::ParseError {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream, dictionary};
    use std::path::Path;

    /// Write a one-page PDF showing `text` in Courier.
    pub fn write_text_pdf(path: &Path, text: &str) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 48.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }
}
