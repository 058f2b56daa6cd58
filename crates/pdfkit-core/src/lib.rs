//! Sequential PDF merge/create pipeline
//!
//! Inputs are read one at a time through a [`FileByteLoader`], appended to a
//! [`DocumentBuilder`] in order, and the finished document is packaged as an
//! [`Artifact`]. Byte-level progress across the whole batch is exposed as a
//! [`ProgressState`] after every loader report.
//!
//! - `merge`: two or more PDFs, all pages copied in input order
//! - `create`: one or more JPEG/PNG images, one page per image
//!
//! Also included: [`inspect`] for basic PDF info and [`RemoteClient`] for the
//! server-side compress/protect endpoints.

pub mod assembler;
pub mod builder;
pub mod command;
pub mod error;
pub mod image;
pub mod input;
pub mod inspect;
pub mod loader;
pub mod package;
pub mod progress;
pub mod remote;

pub use assembler::{
    AssemblerState, AssemblyKind, AssemblyOutput, AssemblyResult, CancelToken,
    SequentialDocumentAssembler,
};
pub use builder::{DocumentBuilder, LopdfBuilder, PageSize};
pub use command::{PdfCommand, ProcessMetrics, ProcessResult};
pub use error::{
    AssemblyError, BuildError, ErrorKind, InspectError, ReadError, RemoteError, ValidationError,
};
pub use input::{ImageFormat, InputFile, InputSource, LoadedBuffer};
pub use inspect::{inspect, PdfInfo};
pub use loader::{ChunkedLoader, FileByteLoader};
pub use package::{package, Artifact};
pub use progress::{AggregateProgressTracker, ProgressState};
pub use remote::{CompressOutcome, ProtectRequest, RemoteClient};

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<u32, BuildError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| BuildError::ParseError(e.to_string()))?;
    Ok(doc.get_pages().len() as u32)
}
