//! Client for the remote compress/protect endpoints
//!
//! Both endpoints take a multipart upload with a `file` part and answer with
//! the transformed PDF as the response body. Form checks that the web pages
//! performed (type, size limit, password confirmation) run before any request.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use tracing::{info, warn};

use crate::error::{RemoteError, ValidationError};
use crate::input::{InputFile, PDF_MIME};
use crate::loader::{ChunkedLoader, FileByteLoader, ProgressFn};
use crate::package::{package, Artifact};

/// Uploads larger than this are refused before contacting the server
pub const MAX_COMPRESS_UPLOAD: u64 = 100 * 1024 * 1024;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Password pair as entered in the protect form
#[derive(Clone)]
pub struct ProtectRequest {
    password: String,
}

impl ProtectRequest {
    pub fn new(
        password: impl Into<String>,
        confirmation: impl AsRef<str>,
    ) -> Result<Self, ValidationError> {
        let password = password.into();
        if password.is_empty() {
            return Err(ValidationError::EmptyPassword);
        }
        if password != confirmation.as_ref() {
            return Err(ValidationError::PasswordMismatch);
        }
        Ok(Self { password })
    }
}

impl std::fmt::Debug for ProtectRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectRequest")
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Result of a compress call, with the sizes the compress page displays
#[derive(Debug, Clone)]
pub struct CompressOutcome {
    pub artifact: Artifact,
    pub original_size: u64,
    pub compressed_size: u64,
}

impl CompressOutcome {
    /// Size reduction in percent; negative when the output grew
    pub fn reduction_percent(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        (1.0 - self.compressed_size as f64 / self.original_size as f64) * 100.0
    }
}

pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    loader: ChunkedLoader,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            loader: ChunkedLoader::default(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/pdf/{}", self.base_url, path)
    }

    fn require_pdf(file: &InputFile) -> Result<(), ValidationError> {
        if file.is_pdf() {
            Ok(())
        } else {
            Err(ValidationError::UnsupportedType {
                index: 0,
                name: file.name().to_string(),
                mime_type: file.mime_type().to_string(),
            })
        }
    }

    async fn file_part(
        &self,
        file: &InputFile,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<Part, RemoteError> {
        let buffer = self.loader.load(file, on_progress).await?;
        let part = Part::bytes(buffer.bytes)
            .file_name(file.name().to_string())
            .mime_str(PDF_MIME)?;
        Ok(part)
    }

    async fn upload(&self, path: &str, form: Form) -> Result<Vec<u8>, RemoteError> {
        let url = self.endpoint(path);
        info!(%url, "uploading");

        let response = self.http.post(&url).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%url, status = status.as_u16(), "remote processing failed");
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// POST the file to `/pdf/compress`
    pub async fn compress(
        &self,
        file: &InputFile,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<CompressOutcome, RemoteError> {
        Self::require_pdf(file)?;
        if file.byte_length() > MAX_COMPRESS_UPLOAD {
            return Err(ValidationError::TooLarge {
                name: file.name().to_string(),
                limit: MAX_COMPRESS_UPLOAD,
                actual: file.byte_length(),
            }
            .into());
        }

        let form = Form::new().part("file", self.file_part(file, on_progress).await?);
        let bytes = self.upload("compress", form).await?;

        let compressed_size = bytes.len() as u64;
        Ok(CompressOutcome {
            artifact: package(bytes, format!("compressed_{}", file.name()), PDF_MIME),
            original_size: file.byte_length(),
            compressed_size,
        })
    }

    /// POST the file and password to `/pdf/protect`
    pub async fn protect(
        &self,
        file: &InputFile,
        request: &ProtectRequest,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<Artifact, RemoteError> {
        Self::require_pdf(file)?;

        let form = Form::new()
            .part("file", self.file_part(file, on_progress).await?)
            .text("password", request.password.clone());
        let bytes = self.upload("protect", form).await?;

        Ok(package(bytes, format!("encrypted_{}", file.name()), PDF_MIME))
    }
}
