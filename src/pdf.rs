//! PDF annotation primitive.
//!
//! Attaches a visible text ("sticky note") annotation near the top-left
//! corner of a page. The source file is never touched - output always
//! goes to a separate path.

use std::path::{Path, PathBuf};

use lopdf::{dictionary, Document, Object, StringFormat};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while annotating a PDF.
#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Page {page} does not exist (document has {count} pages)")]
    PageOutOfRange { page: usize, count: usize },
}

/// Add a text annotation to `src` and write the result to `dst`.
///
/// `page_index` is zero-based. The annotation icon sits at fixed
/// coordinates near the page's top-left corner.
pub fn annotate_pdf(
    src: &Path,
    dst: &Path,
    text: &str,
    page_index: usize,
) -> Result<(), AnnotateError> {
    let mut doc = Document::load(src)?;

    let pages = doc.get_pages();
    let page_id = *pages
        .get(&(page_index as u32 + 1))
        .ok_or(AnnotateError::PageOutOfRange {
            page: page_index,
            count: pages.len(),
        })?;

    let annotation_id = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Text",
        "Name" => "Note",
        "Rect" => vec![10.into(), 10.into(), 30.into(), 30.into()],
        "Contents" => text_string(text),
    });

    // /Annots may be an inline array or a reference to one; either way
    // the page ends up with an inline array including the new entry.
    let existing = doc
        .get_object(page_id)?
        .as_dict()?
        .get(b"Annots")
        .ok()
        .cloned();
    let mut annots: Vec<Object> = match existing {
        Some(Object::Array(items)) => items,
        Some(Object::Reference(id)) => doc
            .get_object(id)
            .ok()
            .and_then(|obj| obj.as_array().ok())
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    annots.push(Object::Reference(annotation_id));

    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page.set("Annots", Object::Array(annots));

    doc.save(dst).map_err(lopdf::Error::IO)?;
    Ok(())
}

/// Annotate `src` into a uniquely named temp file and return its path.
pub fn annotate_pdf_to_temp(src: &Path, text: &str) -> Result<PathBuf, AnnotateError> {
    let temp_path = std::env::temp_dir().join(format!("{}.pdf", Uuid::new_v4()));
    annotate_pdf(src, &temp_path, text, 0)?;
    Ok(temp_path)
}

/// Encode annotation text as a PDF text string.
///
/// ASCII passes through as a literal string; anything else is written as
/// UTF-16BE with a byte-order mark, which is what viewers expect for
/// Japanese content.
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        Object::String(text.as_bytes().to_vec(), StringFormat::Literal)
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a single-page PDF for tests.
    fn write_minimal_pdf(path: &Path) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    fn page_annotation_bytes(path: &Path) -> Vec<u8> {
        let doc = Document::load(path).unwrap();
        let pages = doc.get_pages();
        let page = doc.get_object(pages[&1]).unwrap().as_dict().unwrap();
        let annots = page.get(b"Annots").unwrap().as_array().unwrap();
        assert_eq!(annots.len(), 1);
        let annotation = doc
            .get_object(annots[0].as_reference().unwrap())
            .unwrap()
            .as_dict()
            .unwrap();
        assert_eq!(
            annotation.get(b"Subtype").unwrap().as_name().unwrap(),
            b"Text".as_slice()
        );
        match annotation.get(b"Contents").unwrap() {
            Object::String(bytes, _) => bytes.clone(),
            other => panic!("unexpected Contents object: {other:?}"),
        }
    }

    #[test]
    fn test_annotate_ascii() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.pdf");
        let dst = dir.path().join("dst.pdf");
        write_minimal_pdf(&src);

        annotate_pdf(&src, &dst, "hello summary", 0).unwrap();

        assert_eq!(page_annotation_bytes(&dst), b"hello summary");
        // Source untouched
        let original = Document::load(&src).unwrap();
        let page = original
            .get_object(original.get_pages()[&1])
            .unwrap()
            .as_dict()
            .unwrap();
        assert!(page.get(b"Annots").is_err());
    }

    #[test]
    fn test_annotate_japanese_utf16() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.pdf");
        let dst = dir.path().join("dst.pdf");
        write_minimal_pdf(&src);

        annotate_pdf(&src, &dst, "請求書の要約", 0).unwrap();

        let bytes = page_annotation_bytes(&dst);
        assert_eq!(&bytes[..2], &[0xFE, 0xFF]);
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        assert_eq!(String::from_utf16(&units).unwrap(), "請求書の要約");
    }

    #[test]
    fn test_page_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.pdf");
        let dst = dir.path().join("dst.pdf");
        write_minimal_pdf(&src);

        let err = annotate_pdf(&src, &dst, "text", 5).unwrap_err();
        assert!(matches!(err, AnnotateError::PageOutOfRange { page: 5, .. }));
    }

    #[test]
    fn test_annotate_to_temp_creates_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.pdf");
        write_minimal_pdf(&src);

        let temp = annotate_pdf_to_temp(&src, "note").unwrap();
        assert!(temp.exists());
        assert_ne!(temp, src);
        std::fs::remove_file(temp).unwrap();
    }
}
