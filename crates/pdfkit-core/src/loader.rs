//! Byte loading with incremental progress
//!
//! [`FileByteLoader`] reads one [`InputFile`] into memory. Implementations
//! report `(loaded, total)` through the progress callback with non-decreasing
//! `loaded`, ending with `loaded == total` on success.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ReadError;
use crate::input::{InputFile, InputSource, LoadedBuffer};

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Upper bound on the up-front allocation made from a declared length
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

/// Progress callback: `(loaded_bytes, total_bytes)`
pub type ProgressFn<'a> = dyn FnMut(u64, u64) + Send + 'a;

#[async_trait]
pub trait FileByteLoader: Send + Sync {
    async fn load(
        &self,
        file: &InputFile,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<LoadedBuffer, ReadError>;
}

/// Reads sources through `AsyncRead` in fixed-size chunks
#[derive(Debug, Clone)]
pub struct ChunkedLoader {
    chunk_size: usize,
}

impl Default for ChunkedLoader {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl ChunkedLoader {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    async fn read_all<R>(
        &self,
        file: &InputFile,
        mut reader: R,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<LoadedBuffer, ReadError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let total = file.byte_length();
        let mut bytes = Vec::with_capacity(total.min(MAX_PREALLOC) as usize);
        let mut chunk = vec![0u8; self.chunk_size];

        on_progress(0, total);

        loop {
            let n = reader
                .read(&mut chunk)
                .await
                .map_err(|source| ReadError::Io {
                    name: file.name().to_string(),
                    source,
                })?;
            if n == 0 {
                break;
            }

            bytes.extend_from_slice(&chunk[..n]);
            let loaded = bytes.len() as u64;
            if loaded > total {
                return Err(ReadError::LengthMismatch {
                    name: file.name().to_string(),
                    expected: total,
                    actual: loaded,
                });
            }
            on_progress(loaded, total);
        }

        let loaded = bytes.len() as u64;
        if loaded != total {
            return Err(ReadError::LengthMismatch {
                name: file.name().to_string(),
                expected: total,
                actual: loaded,
            });
        }

        Ok(LoadedBuffer {
            source_name: file.name().to_string(),
            bytes,
        })
    }
}

#[async_trait]
impl FileByteLoader for ChunkedLoader {
    async fn load(
        &self,
        file: &InputFile,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<LoadedBuffer, ReadError> {
        match file.source() {
            InputSource::Memory(bytes) => {
                let reader: &[u8] = bytes;
                self.read_all(file, reader, on_progress).await
            }
            InputSource::Path(path) => {
                let handle =
                    tokio::fs::File::open(path)
                        .await
                        .map_err(|source| ReadError::Io {
                            name: file.name().to_string(),
                            source,
                        })?;
                self.read_all(file, handle, on_progress).await
            }
        }
    }
}
