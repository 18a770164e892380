//! Input loading: turn a user-supplied path or URL into PDF bytes.
//!
//! pdfium can open documents straight from memory, so unlike a rendering
//! pipeline there is no need to stage downloads on disk. We validate the PDF
//! magic bytes (`%PDF`) before returning so callers get a meaningful error
//! rather than an opaque pdfium failure.

use crate::error::InvoiceError;
use std::path::Path;
use tracing::{debug, info};

/// PDF bytes plus a display name for logs, reports and output file names.
#[derive(Debug, Clone)]
pub struct LoadedPdf {
    pub bytes: Vec<u8>,
    pub source_name: String,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a local file or download a URL.
pub async fn load_input(input: &str, timeout_secs: u64) -> Result<LoadedPdf, InvoiceError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        load_local(Path::new(input)).await
    }
}

async fn load_local(path: &Path) -> Result<LoadedPdf, InvoiceError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => InvoiceError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => InvoiceError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let source_name = display_name(path);
    check_magic(&bytes, &source_name)?;
    debug!("Loaded local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(LoadedPdf { bytes, source_name })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<LoadedPdf, InvoiceError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| InvoiceError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            InvoiceError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            InvoiceError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(InvoiceError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| InvoiceError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?
        .to_vec();

    let source_name = file_name_from_url(url);
    check_magic(&bytes, &source_name)?;
    info!("Downloaded {} ({} bytes)", source_name, bytes.len());
    Ok(LoadedPdf { bytes, source_name })
}

/// Reject anything that does not start with `%PDF`.
pub fn check_magic(bytes: &[u8], source_name: &str) -> Result<(), InvoiceError> {
    if bytes.starts_with(b"%PDF") {
        Ok(())
    } else {
        Err(InvoiceError::NotAPdf {
            source_name: source_name.to_string(),
            magic: bytes.iter().take(4).copied().collect(),
        })
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Last non-empty path segment that looks like a file name.
fn file_name_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name_from_url("https://example.com/a/invoice-42.pdf"),
            "invoice-42.pdf"
        );
        assert_eq!(file_name_from_url("https://example.com/download"), "downloaded.pdf");
    }

    #[test]
    fn test_check_magic() {
        assert!(check_magic(b"%PDF-1.7\n...", "a.pdf").is_ok());
        let err = check_magic(b"PK\x03\x04", "a.zip").unwrap_err();
        assert!(matches!(err, InvoiceError::NotAPdf { .. }));
        assert!(check_magic(b"", "empty").is_err());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = load_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, InvoiceError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_local_non_pdf_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, b"hello").unwrap();
        let err = load_input(path.to_str().unwrap(), 5).await.unwrap_err();
        match err {
            InvoiceError::NotAPdf { source_name, magic } => {
                assert_eq!(source_name, "notes.pdf");
                assert_eq!(magic, b"hell".to_vec());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
