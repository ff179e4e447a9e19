use std::path::Path;

use crate::error::ConversionError;
use crate::processor::{ensure_file, extension_of, normalize_pages, ConversionBackend};

const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

/// Reads UTF-8 text files. Form feeds are treated as page breaks.
pub struct PlainTextConverter;

impl PlainTextConverter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PlainTextConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionBackend for PlainTextConverter {
    fn convert(&self, path: &Path) -> Result<String, ConversionError> {
        ensure_file(path)?;
        let extension = extension_of(path);
        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ConversionError::UnsupportedFormat {
                path: path.to_path_buf(),
                extension,
            });
        }

        let raw = std::fs::read_to_string(path).map_err(|e| ConversionError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let text = normalize_pages(raw.split('\u{c}'));
        if text.is_empty() {
            return Err(ConversionError::Empty(path.to_path_buf()));
        }
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "text"
    }
}
