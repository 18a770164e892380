//! Text extraction: pull the embedded text layer out of a PDF via pdfium.
//!
//! pdfium wraps a C++ library with thread-local state, so every call runs
//! inside `tokio::task::spawn_blocking` and binds a fresh `Pdfium` instance.
//!
//! Pages are concatenated in order, each prefixed with a `--- Page N ---`
//! marker so the model can tell where page breaks fall. A page whose text
//! layer cannot be read is logged and skipped; a document with no readable
//! text at all is an [`InvoiceError::UnreadablePdf`].

use crate::error::InvoiceError;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use tracing::{debug, info, warn};

/// Plain text of a document plus the page count it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: usize,
}

/// Extract and clean the text of every page.
pub async fn extract_text(
    bytes: Vec<u8>,
    source_name: &str,
    password: Option<&str>,
) -> Result<ExtractedText, InvoiceError> {
    let name = source_name.to_string();
    let password = password.map(str::to_string);

    tokio::task::spawn_blocking(move || extract_text_blocking(&bytes, &name, password.as_deref()))
        .await
        .map_err(|e| InvoiceError::Internal(format!("Text extraction task panicked: {}", e)))?
}

fn bind_pdfium() -> Result<Pdfium, InvoiceError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(dir) if !dir.is_empty() => {
            debug!("Binding pdfium from PDFIUM_LIB_PATH={}", dir);
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
                .or_else(|_| Pdfium::bind_to_system_library())
        }
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| InvoiceError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

fn extract_text_blocking(
    bytes: &[u8],
    source_name: &str,
    password: Option<&str>,
) -> Result<ExtractedText, InvoiceError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, password)
        .map_err(|e| map_load_error(e, source_name, password.is_some()))?;

    let pages = document.pages();
    let page_count = pages.len() as usize;
    info!("PDF loaded: {} ({} pages)", source_name, page_count);

    if page_count == 0 {
        return Err(InvoiceError::UnreadablePdf {
            source_name: source_name.to_string(),
            detail: "the document has no pages".into(),
        });
    }

    let mut page_texts = Vec::with_capacity(page_count);
    for (idx, page) in pages.iter().enumerate() {
        match page.text() {
            Ok(text) => {
                let content = text.all();
                debug!("Page {}: {} chars", idx + 1, content.chars().count());
                page_texts.push((idx + 1, content));
            }
            Err(e) => warn!("Skipping page {}: no readable text layer ({:?})", idx + 1, e),
        }
    }

    let text = join_pages(&page_texts);
    if text.trim().is_empty() {
        return Err(InvoiceError::UnreadablePdf {
            source_name: source_name.to_string(),
            detail: "no extractable text (scanned image-only PDFs need OCR first)".into(),
        });
    }

    Ok(ExtractedText { text, page_count })
}

fn map_load_error(err: PdfiumError, source_name: &str, had_password: bool) -> InvoiceError {
    let is_password = matches!(
        err,
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError)
    ) || format!("{:?}", err).to_lowercase().contains("password");

    match (is_password, had_password) {
        (true, true) => InvoiceError::WrongPassword {
            source_name: source_name.to_string(),
        },
        (true, false) => InvoiceError::PasswordRequired {
            source_name: source_name.to_string(),
        },
        _ => InvoiceError::UnreadablePdf {
            source_name: source_name.to_string(),
            detail: format!("{:?}", err),
        },
    }
}

/// Concatenate `(page_number, raw_text)` pairs into one cleaned document.
///
/// Pages with nothing but whitespace are dropped.
pub fn join_pages(pages: &[(usize, String)]) -> String {
    pages
        .iter()
        .filter_map(|(n, raw)| {
            let cleaned = clean_text(raw);
            if cleaned.is_empty() {
                None
            } else {
                Some(format!("--- Page {} ---\n{}", n, cleaned))
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

static RE_CONTROL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F\x{200B}\x{FEFF}\x{00AD}]").unwrap());
static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());
static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Normalise raw page text without touching its content.
///
/// CRLF and lone CR become LF, control and invisible characters are dropped
/// (newlines and tabs survive), runs of spaces collapse to one, every line is
/// trimmed and three or more newlines collapse to a single blank line.
pub fn clean_text(raw: &str) -> String {
    let s = raw.replace("\r\n", "\n").replace('\r', "\n");
    let s = RE_CONTROL.replace_all(&s, "");
    let s = s
        .lines()
        .map(|line| RE_SPACES.replace_all(line.trim(), " ").into_owned())
        .collect::<Vec<_>>()
        .join("\n");
    RE_BLANK_LINES
        .replace_all(&s, "\n\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_whitespace() {
        assert_eq!(clean_text("  Total:    $1,234.00  \r\n"), "Total: $1,234.00");
        assert_eq!(clean_text("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(clean_text("a\tb"), "a b");
    }

    #[test]
    fn test_clean_text_drops_control_keeps_unicode() {
        assert_eq!(clean_text("Fa\u{0007}ktura\u{200B} Nr."), "Faktura Nr.");
        assert_eq!(clean_text("Straße 5 — 12 €"), "Straße 5 — 12 €");
    }

    #[test]
    fn test_join_pages_markers_and_order() {
        let pages = vec![
            (1, "Invoice INV-1".to_string()),
            (2, "   \n  ".to_string()),
            (3, "Total 10.00".to_string()),
        ];
        let text = join_pages(&pages);
        assert_eq!(
            text,
            "--- Page 1 ---\nInvoice INV-1\n\n--- Page 3 ---\nTotal 10.00"
        );
    }

    #[test]
    fn test_join_pages_empty() {
        assert_eq!(join_pages(&[]), "");
        assert_eq!(join_pages(&[(1, " ".into())]), "");
    }

    #[test]
    fn test_load_error_mapping() {
        let err = PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError);
        assert!(matches!(
            map_load_error(err, "a.pdf", false),
            InvoiceError::PasswordRequired { .. }
        ));
        let err = PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError);
        assert!(matches!(
            map_load_error(err, "a.pdf", true),
            InvoiceError::WrongPassword { .. }
        ));
        let err = PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::FormatError);
        assert!(matches!(
            map_load_error(err, "a.pdf", false),
            InvoiceError::UnreadablePdf { .. }
        ));
    }
}
