//! Header check and document summary for `pdfkit info`

use lopdf::Document;
use serde::Serialize;

use crate::error::InspectError;

/// What `pdfkit info` reports for one document
#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct PdfInfo {
    pub page_count: u32,
    /// Taken from the `%PDF-x.y` line, "1.4" if unreadable
    pub version: String,
    pub encrypted: bool,
    pub size_bytes: usize,
    /// `/Title` of the trailer's Info dictionary
    pub title: Option<String>,
    /// `/Author` of the trailer's Info dictionary
    pub author: Option<String>,
}

/// Check the header, parse, and summarize
pub fn inspect(bytes: &[u8]) -> Result<PdfInfo, InspectError> {
    check_header(bytes)?;

    let version = extract_version(bytes);

    let document =
        Document::load_mem(bytes).map_err(|e| InspectError::ParseError(e.to_string()))?;

    let page_count = document.get_pages().len() as u32;
    if page_count == 0 {
        return Err(InspectError::NoPages);
    }

    let (title, author) = extract_metadata(&document);

    Ok(PdfInfo {
        page_count,
        version,
        encrypted: document.is_encrypted(),
        size_bytes: bytes.len(),
        title,
        author,
    })
}

/// Size and magic-byte check without parsing
pub fn check_header(bytes: &[u8]) -> Result<(), InspectError> {
    if bytes.len() < 8 {
        return Err(InspectError::TooSmall);
    }
    if !bytes.starts_with(b"%PDF-") {
        return Err(InspectError::MissingHeader);
    }
    Ok(())
}

fn extract_version(bytes: &[u8]) -> String {
    bytes
        .strip_prefix(b"%PDF-")
        .and_then(|rest| rest.get(..3))
        .and_then(|digits| std::str::from_utf8(digits).ok())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "1.4".to_string())
}

fn info_string(info: &lopdf::Dictionary, key: &[u8]) -> Option<String> {
    let bytes = info.get(key).ok()?.as_str().ok()?;
    let decoded = String::from_utf8_lossy(bytes);
    if decoded.is_empty() {
        None
    } else {
        Some(decoded.into_owned())
    }
}

/// Extract title and author from the trailer's Info dictionary
fn extract_metadata(document: &Document) -> (Option<String>, Option<String>) {
    let info = document
        .trailer
        .get(b"Info")
        .and_then(lopdf::Object::as_reference)
        .and_then(|id| document.get_dictionary(id));

    match info {
        Ok(info) => (info_string(info, b"Title"), info_string(info, b"Author")),
        Err(_) => (None, None),
    }
}
