use std::path::Path;

use crate::error::ConversionError;
use crate::processor::{ensure_file, extension_of, normalize_pages, ConversionBackend};

/// Extracts embedded page text with `lopdf`.
///
/// Scanned PDFs without a text layer yield no text and fail with
/// [`ConversionError::Empty`].
pub struct LopdfConverter;

impl LopdfConverter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LopdfConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionBackend for LopdfConverter {
    fn convert(&self, path: &Path) -> Result<String, ConversionError> {
        let _span = tracing::info_span!("processor.pdf").entered();

        ensure_file(path)?;
        let extension = extension_of(path);
        if extension != "pdf" {
            return Err(ConversionError::UnsupportedFormat {
                path: path.to_path_buf(),
                extension,
            });
        }

        let pdf_bytes = std::fs::read(path).map_err(|e| ConversionError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let doc = lopdf::Document::load_mem(&pdf_bytes)
            .map_err(|e| ConversionError::Pdf(format!("Failed to load PDF: {}", e)))?;

        let text = normalize_pages(extract_pages(&doc));
        if text.is_empty() {
            return Err(ConversionError::Empty(path.to_path_buf()));
        }
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "lopdf"
    }
}

fn extract_pages(doc: &lopdf::Document) -> Vec<String> {
    doc.get_pages()
        .keys()
        .filter_map(|&page_num| match doc.extract_text(&[page_num]) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::debug!("Skipping page {}: {}", page_num, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) fn build_pdf(pages: &[&str]) -> Vec<u8> {
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = format!("BT /F1 12 Tf 50 700 Td ({}) Tj ET", text);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}
