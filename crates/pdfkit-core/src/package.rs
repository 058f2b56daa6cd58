//! Downloadable artifacts

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Named, typed output ready to hand to whoever saves or serves it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub suggested_file_name: String,
    pub mime_type: String,
}

pub fn package(
    bytes: Vec<u8>,
    suggested_file_name: impl Into<String>,
    mime_type: impl Into<String>,
) -> Artifact {
    Artifact {
        bytes,
        suggested_file_name: suggested_file_name.into(),
        mime_type: mime_type.into(),
    }
}

/// `<prefix>_<unix millis>.pdf`, e.g. `merged_1718000000000.pdf`
pub fn suggested_file_name(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}.pdf", prefix, at.timestamp_millis())
}

impl Artifact {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Save into `dir` under the suggested name. Only the final path
    /// component of the name is used.
    pub async fn write_to(&self, dir: impl AsRef<Path>) -> std::io::Result<PathBuf> {
        let file_name = Path::new(&self.suggested_file_name)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "output.pdf".into());

        let path = dir.as_ref().join(file_name);
        tokio::fs::write(&path, &self.bytes).await?;
        Ok(path)
    }
}
