use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{AssemblyError, ErrorKind, RemoteError};
use crate::inspect::PdfInfo;

/// One requested operation, as echoed in reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PdfCommand {
    Merge { files: Vec<PathBuf> },
    Create { images: Vec<PathBuf> },
    Info { file: PathBuf },
    Compress { file: PathBuf },
    /// The password is never part of the command record
    Protect { file: PathBuf },
}

impl PdfCommand {
    pub fn inputs(&self) -> Vec<&PathBuf> {
        match self {
            PdfCommand::Merge { files } => files.iter().collect(),
            PdfCommand::Create { images } => images.iter().collect(),
            PdfCommand::Info { file }
            | PdfCommand::Compress { file }
            | PdfCommand::Protect { file } => vec![file],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub command: PdfCommand,
    pub success: bool,
    /// Where the artifact was written
    pub output: Option<PathBuf>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// 0-based index of the failing input
    pub failed_index: Option<usize>,
    pub metrics: Option<ProcessMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<PdfInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessMetrics {
    pub input_size_bytes: u64,
    pub output_size_bytes: u64,
    /// Absent when the output cannot be parsed, e.g. after encryption
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    pub processing_time_ms: u64,
}

impl ProcessResult {
    pub fn succeeded(command: PdfCommand, output: Option<PathBuf>, metrics: ProcessMetrics) -> Self {
        Self {
            command,
            success: true,
            output,
            error: None,
            error_kind: None,
            failed_index: None,
            metrics: Some(metrics),
            info: None,
        }
    }

    pub fn inspected(command: PdfCommand, info: PdfInfo) -> Self {
        let metrics = ProcessMetrics {
            input_size_bytes: info.size_bytes as u64,
            page_count: Some(info.page_count),
            ..ProcessMetrics::default()
        };
        Self {
            info: Some(info),
            ..Self::succeeded(command, None, metrics)
        }
    }

    /// Failure with no taxonomy attached (config, I/O outside the pipeline)
    pub fn failed(command: PdfCommand, error: impl ToString) -> Self {
        Self {
            command,
            success: false,
            output: None,
            error: Some(error.to_string()),
            error_kind: None,
            failed_index: None,
            metrics: None,
            info: None,
        }
    }

    pub fn from_assembly_error(command: PdfCommand, err: &AssemblyError) -> Self {
        Self {
            error_kind: Some(err.kind()),
            failed_index: err.index(),
            ..Self::failed(command, err)
        }
    }

    pub fn from_remote_error(command: PdfCommand, err: &RemoteError) -> Self {
        let kind = match err {
            RemoteError::Validation(_) => Some(ErrorKind::Validation),
            RemoteError::Read(_) => Some(ErrorKind::Read),
            RemoteError::Http(_) | RemoteError::Status { .. } => None,
        };
        Self {
            error_kind: kind,
            ..Self::failed(command, err)
        }
    }
}
