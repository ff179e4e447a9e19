//! Conversion backends: turn a source file into normalized text.

pub mod pdf;
pub mod text;

use std::path::Path;
use std::str::FromStr;

use crate::error::{ConfigError, ConversionError};

pub use pdf::LopdfConverter;
pub use text::PlainTextConverter;

/// Turns a file path into normalized text.
pub trait ConversionBackend: Send + Sync {
    fn convert(&self, path: &Path) -> Result<String, ConversionError>;

    /// Short backend name used in logs.
    fn name(&self) -> &'static str;
}

/// The conversion backends selectable by name in the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterKind {
    Lopdf,
    PlainText,
}

impl ConverterKind {
    pub fn build(self) -> Box<dyn ConversionBackend> {
        match self {
            ConverterKind::Lopdf => Box::new(LopdfConverter::new()),
            ConverterKind::PlainText => Box::new(PlainTextConverter::new()),
        }
    }
}

impl FromStr for ConverterKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lopdf" | "pdf" => Ok(ConverterKind::Lopdf),
            "text" | "plain" => Ok(ConverterKind::PlainText),
            _ => Err(ConfigError::UnknownBackend {
                kind: "conversion",
                name: s.to_string(),
            }),
        }
    }
}

/// Trims each page, drops empty pages and joins the rest with a blank line.
/// Line endings are unified to `\n` so the content hash is stable.
pub fn normalize_pages<I, S>(pages: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    pages
        .into_iter()
        .map(|page| page.as_ref().replace("\r\n", "\n").replace('\r', "\n"))
        .map(|page| page.trim().to_string())
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Fails with `NotFound` when `path` is not an existing file.
pub(crate) fn ensure_file(path: &Path) -> Result<(), ConversionError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ConversionError::NotFound(path.to_path_buf()))
    }
}

/// Lowercased extension of `path`, or an empty string.
pub(crate) fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converter_kind_from_name() {
        assert_eq!("lopdf".parse::<ConverterKind>().unwrap(), ConverterKind::Lopdf);
        assert_eq!("PDF".parse::<ConverterKind>().unwrap(), ConverterKind::Lopdf);
        assert_eq!("plain".parse::<ConverterKind>().unwrap(), ConverterKind::PlainText);
        assert!(matches!(
            "docling".parse::<ConverterKind>(),
            Err(ConfigError::UnknownBackend { kind: "conversion", .. })
        ));
    }

    #[test]
    fn test_normalize_pages() {
        let text = normalize_pages(["  first page \r\n", "", "   ", "second\rpage"]);
        assert_eq!(text, "first page\n\nsecond\npage");
    }

    #[test]
    fn test_normalize_no_pages() {
        assert_eq!(normalize_pages(Vec::<String>::new()), "");
    }

    #[test]
    fn test_build_reports_name() {
        assert_eq!(ConverterKind::Lopdf.build().name(), "lopdf");
        assert_eq!(ConverterKind::PlainText.build().name(), "text");
    }
}
