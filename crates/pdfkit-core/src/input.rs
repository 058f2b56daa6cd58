//! Input handles for pipeline batches
//!
//! An [`InputFile`] is what a user selected: a name, a declared size, a MIME
//! type and somewhere to read the bytes from. It is never mutated once it has
//! been handed to the pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::error::ReadError;

pub const PDF_MIME: &str = "application/pdf";
pub const PNG_MIME: &str = "image/png";
pub const JPEG_MIME: &str = "image/jpeg";
pub const JPG_MIME: &str = "image/jpg";
pub const OCTET_STREAM_MIME: &str = "application/octet-stream";

/// MIME types accepted by the create flow
pub const IMAGE_MIMES: [&str; 3] = [PNG_MIME, JPEG_MIME, JPG_MIME];

/// Where the bytes of an input live
#[derive(Debug, Clone)]
pub enum InputSource {
    Memory(Arc<[u8]>),
    Path(PathBuf),
}

#[derive(Debug, Clone)]
pub struct InputFile {
    name: String,
    byte_length: u64,
    mime_type: String,
    source: InputSource,
}

impl InputFile {
    /// Build an input with an explicit declared length
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        byte_length: u64,
        source: InputSource,
    ) -> Self {
        Self {
            name: name.into(),
            byte_length,
            mime_type: mime_type.into(),
            source,
        }
    }

    /// In-memory input whose declared length is the buffer length
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        let bytes = bytes.into();
        let len = bytes.len() as u64;
        Self::new(name, mime_type, len, InputSource::Memory(bytes))
    }

    /// Open a file on disk, taking its size from metadata and its MIME type
    /// from the extension
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ReadError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|source| ReadError::Io {
                name: name.clone(),
                source,
            })?;

        Ok(Self::new(
            name,
            mime_from_path(path),
            metadata.len(),
            InputSource::Path(path.to_path_buf()),
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn byte_length(&self) -> u64 {
        self.byte_length
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn source(&self) -> &InputSource {
        &self.source
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type == PDF_MIME
    }

    /// Size in MiB with two decimals, e.g. "1.50 MB"
    pub fn size_label(&self) -> String {
        format!("{:.2} MB", self.byte_length as f64 / (1024.0 * 1024.0))
    }
}

/// Guess a MIME type from a file extension
pub fn mime_from_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => PDF_MIME,
        "png" => PNG_MIME,
        "jpg" | "jpeg" => JPEG_MIME,
        _ => OCTET_STREAM_MIME,
    }
}

/// Raster formats that can be placed on a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        match mime_type {
            PNG_MIME => Some(ImageFormat::Png),
            JPEG_MIME | JPG_MIME => Some(ImageFormat::Jpeg),
            _ => None,
        }
    }
}

/// Fully-read contents of one input
#[derive(Debug, Clone)]
pub struct LoadedBuffer {
    pub source_name: String,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_mime_from_extension() {
        assert_eq!(mime_from_path(Path::new("a/report.PDF")), PDF_MIME);
        assert_eq!(mime_from_path(Path::new("photo.jpeg")), JPEG_MIME);
        assert_eq!(mime_from_path(Path::new("photo.jpg")), JPEG_MIME);
        assert_eq!(mime_from_path(Path::new("scan.png")), PNG_MIME);
        assert_eq!(mime_from_path(Path::new("notes")), OCTET_STREAM_MIME);
    }

    #[test]
    fn test_image_format_from_mime() {
        assert_eq!(ImageFormat::from_mime("image/jpg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_mime("image/png"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::from_mime("application/pdf"), None);
    }

    #[test]
    fn test_size_label() {
        let file = InputFile::new(
            "big.pdf",
            PDF_MIME,
            3 * 1024 * 1024 / 2,
            InputSource::Memory(Arc::from(Vec::new())),
        );
        assert_eq!(file.size_label(), "1.50 MB");
    }

    #[tokio::test]
    async fn test_open_reads_metadata() {
        let mut tmp = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        tmp.write_all(b"%PDF-1.7 hello").unwrap();

        let file = InputFile::open(tmp.path()).await.unwrap();
        assert_eq!(file.byte_length(), 14);
        assert!(file.is_pdf());
        assert!(matches!(file.source(), InputSource::Path(_)));
    }

    #[tokio::test]
    async fn test_open_missing_file_is_read_error() {
        let err = InputFile::open("/definitely/not/here.pdf").await.unwrap_err();
        assert!(matches!(err, ReadError::Io { .. }));
    }
}
