//! Helpers for sanitizing paths and names.
//!
//! Span fields carry only file names, never full paths, and client-supplied
//! upload names are reduced to a bare file name before touching disk.

use std::path::Path;

use sha2::{Digest, Sha256};

/// Returns only the filename component of a path (no directory).
///
/// Safe for span fields: reveals file name without exposing the full path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// First 16 hex chars of the SHA-256 of a path. Stable across runs, so it
/// can correlate repeated inline runs without exposing the path.
pub fn path_digest(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Reduces a client-supplied upload name to its final component.
///
/// Both `/` and `\` count as separators. Returns `None` for names that are
/// empty or consist only of dots after stripping.
pub fn upload_file_name(name: &str) -> Option<String> {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base.chars().all(|c| c == '.') {
        return None;
    }
    Some(base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_redact_path_returns_filename() {
        assert_eq!(
            redact_path(&PathBuf::from("/home/user/documents/invoice.pdf")),
            "invoice.pdf"
        );
    }

    #[test]
    fn test_redact_path_no_filename() {
        assert_eq!(redact_path(&PathBuf::from("/")), "<unknown>");
    }

    #[test]
    fn test_path_digest_deterministic() {
        let path = PathBuf::from("/home/user/secret/doc.pdf");
        let digest = path_digest(&path);
        assert_eq!(digest, path_digest(&path));
        assert_eq!(digest.len(), 16);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_path_digest_different_paths_differ() {
        assert_ne!(
            path_digest(&PathBuf::from("/a/doc.pdf")),
            path_digest(&PathBuf::from("/b/doc.pdf"))
        );
    }

    #[test]
    fn test_upload_file_name_strips_directories() {
        assert_eq!(upload_file_name("report.pdf").as_deref(), Some("report.pdf"));
        assert_eq!(
            upload_file_name("../../etc/passwd.pdf").as_deref(),
            Some("passwd.pdf")
        );
        assert_eq!(
            upload_file_name(r"C:\Users\me\scan.pdf").as_deref(),
            Some("scan.pdf")
        );
    }

    #[test]
    fn test_upload_file_name_rejects_empty() {
        assert_eq!(upload_file_name(""), None);
        assert_eq!(upload_file_name("dir/"), None);
        assert_eq!(upload_file_name(".."), None);
    }
}
