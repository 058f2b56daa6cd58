//! Sequential load-and-append over an ordered batch
//!
//! One run walks `Idle → Validating → Loading(i) → Appending(i) → … →
//! Finalizing → Done`, or stops in `Failed`. Inputs are handled strictly one
//! after the other, so at most one input buffer is alive at a time and the
//! output keeps the order the inputs were given in.

use std::borrow::Cow;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::builder::DocumentBuilder;
use crate::error::{AssemblyError, BuildError, ValidationError};
use crate::input::{mime_from_path, ImageFormat, InputFile, IMAGE_MIMES, PDF_MIME};
use crate::loader::FileByteLoader;
use crate::package::{suggested_file_name, Artifact};
use crate::progress::{AggregateProgressTracker, ProgressState};

/// What a run produces from its inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssemblyKind {
    /// Concatenate the pages of two or more PDFs
    Merge,
    /// One page per image
    Create,
}

impl AssemblyKind {
    pub fn min_inputs(self) -> usize {
        match self {
            AssemblyKind::Merge => 2,
            AssemblyKind::Create => 1,
        }
    }

    pub fn accepts(self, mime_type: &str) -> bool {
        match self {
            AssemblyKind::Merge => mime_type == PDF_MIME,
            AssemblyKind::Create => IMAGE_MIMES.contains(&mime_type),
        }
    }

    /// Prefix of the suggested output file name
    pub fn file_prefix(self) -> &'static str {
        match self {
            AssemblyKind::Merge => "merged",
            AssemblyKind::Create => "generated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    Idle,
    Validating,
    Loading(usize),
    Appending(usize),
    Finalizing,
    Done,
    Failed,
}

/// Cooperative cancellation flag shared between a run and its caller
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Successful outcome of one run
#[derive(Debug, Clone)]
pub struct AssemblyOutput {
    pub output_bytes: Vec<u8>,
    pub suggested_file_name: String,
    pub page_count: usize,
}

impl AssemblyOutput {
    pub fn into_artifact(self) -> Artifact {
        crate::package::package(self.output_bytes, self.suggested_file_name, PDF_MIME)
    }
}

pub type AssemblyResult = Result<AssemblyOutput, AssemblyError>;

/// Check input count and types for a run; performs no I/O
pub fn validate_batch(kind: AssemblyKind, inputs: &[InputFile]) -> Result<(), ValidationError> {
    check_batch(
        kind,
        inputs
            .iter()
            .map(|file| (Cow::Borrowed(file.name()), file.mime_type())),
    )
}

/// [`validate_batch`] for files not opened yet, typed by extension
pub fn validate_paths<P: AsRef<Path>>(
    kind: AssemblyKind,
    paths: &[P],
) -> Result<(), ValidationError> {
    check_batch(
        kind,
        paths.iter().map(|path| {
            let path = path.as_ref();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_else(|| path.to_string_lossy());
            (name, mime_from_path(path))
        }),
    )
}

fn check_batch<'a, 'b, I>(kind: AssemblyKind, entries: I) -> Result<(), ValidationError>
where
    I: ExactSizeIterator<Item = (Cow<'a, str>, &'b str)>,
{
    if entries.len() < kind.min_inputs() {
        return Err(ValidationError::TooFewInputs {
            required: kind.min_inputs(),
            actual: entries.len(),
        });
    }

    for (index, (name, mime_type)) in entries.enumerate() {
        if !kind.accepts(mime_type) {
            return Err(ValidationError::UnsupportedType {
                index,
                name: name.into_owned(),
                mime_type: mime_type.to_string(),
            });
        }
    }

    Ok(())
}

pub struct SequentialDocumentAssembler<L> {
    loader: L,
    state: AssemblerState,
    tracker: AggregateProgressTracker,
}

impl<L: FileByteLoader> SequentialDocumentAssembler<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            state: AssemblerState::Idle,
            tracker: AggregateProgressTracker::new(),
        }
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    /// Progress of the current or most recent run
    pub fn progress(&self) -> &ProgressState {
        self.tracker.state()
    }

    fn transition(&mut self, next: AssemblerState) {
        debug!(from = ?self.state, to = ?next, "assembler transition");
        self.state = next;
    }

    /// Run one batch through `builder`. The observer sees a progress snapshot
    /// after every loader progress report. Partially built output is dropped
    /// on any failure.
    pub async fn run<B, O>(
        &mut self,
        kind: AssemblyKind,
        inputs: &[InputFile],
        builder: B,
        cancel: &CancelToken,
        mut observer: O,
    ) -> AssemblyResult
    where
        B: DocumentBuilder,
        O: FnMut(&ProgressState) + Send,
    {
        let result = self
            .drive(kind, inputs, builder, cancel, &mut observer)
            .await;

        match &result {
            Ok(output) => {
                self.transition(AssemblerState::Done);
                info!(
                    ?kind,
                    inputs = inputs.len(),
                    pages = output.page_count,
                    bytes = output.output_bytes.len(),
                    "assembly complete"
                );
            }
            Err(e) => {
                self.transition(AssemblerState::Failed);
                warn!(?kind, kind_of_error = ?e.kind(), index = ?e.index(), "assembly failed: {}", e);
            }
        }

        result
    }

    async fn drive<B, O>(
        &mut self,
        kind: AssemblyKind,
        inputs: &[InputFile],
        mut builder: B,
        cancel: &CancelToken,
        observer: &mut O,
    ) -> AssemblyResult
    where
        B: DocumentBuilder,
        O: FnMut(&ProgressState) + Send,
    {
        self.transition(AssemblerState::Validating);
        validate_batch(kind, inputs)?;
        self.tracker.begin(inputs);

        for (index, file) in inputs.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(AssemblyError::Cancelled);
            }

            self.transition(AssemblerState::Loading(index));
            let tracker = &mut self.tracker;
            let buffer = self
                .loader
                .load(file, &mut |loaded, _total| {
                    tracker.record(index, loaded);
                    observer(tracker.state());
                })
                .await
                .map_err(|source| AssemblyError::Read { index, source })?;

            if cancel.is_cancelled() {
                return Err(AssemblyError::Cancelled);
            }

            self.transition(AssemblerState::Appending(index));
            let appended = match kind {
                AssemblyKind::Merge => builder.append_as_pages(&buffer.bytes).map(|_| ()),
                AssemblyKind::Create => match ImageFormat::from_mime(file.mime_type()) {
                    Some(format) => builder.append_as_image_page(&buffer.bytes, format),
                    None => Err(BuildError::UnsupportedImage(file.mime_type().to_string())),
                },
            };
            appended.map_err(|source| AssemblyError::Assembly { index, source })?;
            debug!(index, source = %buffer.source_name, pages = builder.page_count(), "input appended");
        }

        if cancel.is_cancelled() {
            return Err(AssemblyError::Cancelled);
        }

        self.transition(AssemblerState::Finalizing);
        let page_count = builder.page_count();
        let output_bytes = builder.serialize().map_err(AssemblyError::Finalize)?;

        Ok(AssemblyOutput {
            output_bytes,
            suggested_file_name: suggested_file_name(kind.file_prefix(), Utc::now()),
            page_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{fixtures as pdfs, LopdfBuilder};
    use crate::error::{ErrorKind, ReadError};
    use crate::image::fixtures as images;
    use crate::input::{InputSource, LoadedBuffer, JPEG_MIME, PNG_MIME};
    use crate::loader::{ChunkedLoader, ProgressFn};
    use async_trait::async_trait;
    use lopdf::Document;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    /// Counts loads and optionally cancels after a number of them
    struct CountingLoader {
        inner: ChunkedLoader,
        loads: Arc<AtomicUsize>,
        cancel_after: Option<(usize, CancelToken)>,
    }

    impl CountingLoader {
        fn new() -> Self {
            Self {
                inner: ChunkedLoader::new(1024),
                loads: Arc::new(AtomicUsize::new(0)),
                cancel_after: None,
            }
        }
    }

    #[async_trait]
    impl FileByteLoader for CountingLoader {
        async fn load(
            &self,
            file: &InputFile,
            on_progress: &mut ProgressFn<'_>,
        ) -> Result<LoadedBuffer, ReadError> {
            let n = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
            let result = self.inner.load(file, on_progress).await;
            if let Some((after, token)) = &self.cancel_after {
                if n >= *after {
                    token.cancel();
                }
            }
            result
        }
    }

    /// Reports a fixed list of byte positions per file
    struct ScriptedLoader {
        steps: Vec<Vec<u64>>,
    }

    #[async_trait]
    impl FileByteLoader for ScriptedLoader {
        async fn load(
            &self,
            file: &InputFile,
            on_progress: &mut ProgressFn<'_>,
        ) -> Result<LoadedBuffer, ReadError> {
            let index: usize = file.name().parse().unwrap();
            for loaded in &self.steps[index] {
                on_progress(*loaded, file.byte_length());
            }
            Ok(LoadedBuffer {
                source_name: file.name().to_string(),
                bytes: vec![0; 4],
            })
        }
    }

    /// Concatenates whatever it is given
    #[derive(Default)]
    struct RecordingBuilder {
        out: Vec<u8>,
        pages: usize,
    }

    impl DocumentBuilder for RecordingBuilder {
        fn append_as_pages(&mut self, bytes: &[u8]) -> Result<usize, BuildError> {
            self.out.extend_from_slice(bytes);
            self.pages += 1;
            Ok(1)
        }

        fn append_as_image_page(
            &mut self,
            bytes: &[u8],
            _format: ImageFormat,
        ) -> Result<(), BuildError> {
            self.out.extend_from_slice(bytes);
            self.pages += 1;
            Ok(())
        }

        fn page_count(&self) -> usize {
            self.pages
        }

        fn serialize(self) -> Result<Vec<u8>, BuildError> {
            Ok(self.out)
        }
    }

    fn pdf_input(name: &str, pages: u32) -> InputFile {
        InputFile::from_bytes(name, PDF_MIME, pdfs::pdf(pages, name))
    }

    #[tokio::test]
    async fn test_merge_three_and_five_pages() {
        let mut assembler = SequentialDocumentAssembler::new(ChunkedLoader::new(256));
        assert_eq!(assembler.state(), AssemblerState::Idle);

        let inputs = vec![pdf_input("A", 3), pdf_input("B", 5)];
        let mut percents = Vec::new();
        let output = assembler
            .run(
                AssemblyKind::Merge,
                &inputs,
                LopdfBuilder::new(),
                &CancelToken::new(),
                |p: &ProgressState| percents.push(p.percent),
            )
            .await
            .unwrap();

        assert_eq!(output.page_count, 8);
        assert!(output.suggested_file_name.starts_with("merged_"));
        assert!(output.suggested_file_name.ends_with(".pdf"));
        assert_eq!(assembler.state(), AssemblerState::Done);

        let doc = Document::load_mem(&output.output_bytes).unwrap();
        let contents = pdfs::page_contents(&doc);
        assert_eq!(contents.len(), 8);
        assert!(contents[0].contains("A-Page-1"));
        assert!(contents[2].contains("A-Page-3"));
        assert!(contents[3].contains("B-Page-1"));
        assert!(contents[7].contains("B-Page-5"));

        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percents.last(), Some(&100));
    }

    #[tokio::test]
    async fn test_create_from_jpeg_and_png() {
        let inputs = vec![
            InputFile::from_bytes("photo.jpg", JPEG_MIME, images::jpeg(800, 600, 3)),
            InputFile::from_bytes("scan.png", PNG_MIME, images::png(30, 60, png::ColorType::Rgb)),
        ];

        let mut assembler = SequentialDocumentAssembler::new(ChunkedLoader::default());
        let output = assembler
            .run(
                AssemblyKind::Create,
                &inputs,
                LopdfBuilder::new(),
                &CancelToken::new(),
                |_: &ProgressState| {},
            )
            .await
            .unwrap();

        assert_eq!(output.page_count, 2);
        assert!(output.suggested_file_name.starts_with("generated_"));
        let doc = Document::load_mem(&output.output_bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[tokio::test]
    async fn test_single_pdf_merge_is_rejected() {
        let loader = CountingLoader::new();
        let loads = loader.loads.clone();
        let mut assembler = SequentialDocumentAssembler::new(loader);

        let err = assembler
            .run(
                AssemblyKind::Merge,
                &[pdf_input("only", 1)],
                LopdfBuilder::new(),
                &CancelToken::new(),
                |_: &ProgressState| {},
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(matches!(
            err,
            AssemblyError::Validation(ValidationError::TooFewInputs {
                required: 2,
                actual: 1
            })
        ));
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert_eq!(assembler.state(), AssemblerState::Failed);
    }

    #[tokio::test]
    async fn test_create_with_no_images_is_rejected() {
        let mut assembler = SequentialDocumentAssembler::new(ChunkedLoader::default());
        let err = assembler
            .run(
                AssemblyKind::Create,
                &[],
                RecordingBuilder::default(),
                &CancelToken::new(),
                |_: &ProgressState| {},
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_wrong_mime_anywhere_is_rejected_without_io() {
        let loader = CountingLoader::new();
        let loads = loader.loads.clone();
        let mut assembler = SequentialDocumentAssembler::new(loader);

        let inputs = vec![
            pdf_input("a", 1),
            pdf_input("b", 1),
            InputFile::from_bytes("c.png", PNG_MIME, images::png(1, 1, png::ColorType::Rgb)),
        ];
        let err = assembler
            .run(
                AssemblyKind::Merge,
                &inputs,
                RecordingBuilder::default(),
                &CancelToken::new(),
                |_: &ProgressState| {},
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.index(), Some(2));
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unreadable_second_input_stops_batch() {
        let loader = CountingLoader::new();
        let loads = loader.loads.clone();
        let mut assembler = SequentialDocumentAssembler::new(loader);

        let inputs = vec![
            pdf_input("a", 2),
            InputFile::new(
                "b.pdf",
                PDF_MIME,
                1000,
                InputSource::Path("/nonexistent/b.pdf".into()),
            ),
            pdf_input("c", 2),
        ];
        let err = assembler
            .run(
                AssemblyKind::Merge,
                &inputs,
                LopdfBuilder::new(),
                &CancelToken::new(),
                |_: &ProgressState| {},
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Read);
        assert_eq!(err.index(), Some(1));
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert_eq!(assembler.state(), AssemblerState::Failed);
    }

    #[tokio::test]
    async fn test_corrupt_pdf_is_assembly_error() {
        let mut assembler = SequentialDocumentAssembler::new(ChunkedLoader::default());
        let inputs = vec![
            pdf_input("a", 1),
            InputFile::from_bytes("broken.pdf", PDF_MIME, b"%PDF-1.4 garbage".to_vec()),
        ];
        let err = assembler
            .run(
                AssemblyKind::Merge,
                &inputs,
                LopdfBuilder::new(),
                &CancelToken::new(),
                |_: &ProgressState| {},
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Assembly);
        assert_eq!(err.index(), Some(1));
    }

    #[tokio::test]
    async fn test_cancel_between_inputs_discards_output() {
        let token = CancelToken::new();
        let mut loader = CountingLoader::new();
        loader.cancel_after = Some((1, token.clone()));
        let loads = loader.loads.clone();
        let mut assembler = SequentialDocumentAssembler::new(loader);

        let inputs = vec![pdf_input("a", 1), pdf_input("b", 1), pdf_input("c", 1)];
        let err = assembler
            .run(
                AssemblyKind::Merge,
                &inputs,
                RecordingBuilder::default(),
                &token,
                |_: &ProgressState| {},
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AssemblyError::Cancelled));
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_loads_nothing() {
        let token = CancelToken::new();
        token.cancel();
        let loader = CountingLoader::new();
        let loads = loader.loads.clone();
        let mut assembler = SequentialDocumentAssembler::new(loader);

        let err = assembler
            .run(
                AssemblyKind::Merge,
                &[pdf_input("a", 1), pdf_input("b", 1)],
                RecordingBuilder::default(),
                &token,
                |_: &ProgressState| {},
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_observer_sees_blended_percentages() {
        const MB: u64 = 1024 * 1024;
        let inputs = vec![
            InputFile::new("0", JPEG_MIME, 2 * MB, InputSource::Memory(Arc::from(vec![]))),
            InputFile::new("1", PNG_MIME, MB, InputSource::Memory(Arc::from(vec![]))),
        ];
        let loader = ScriptedLoader {
            steps: vec![vec![0, MB / 2, MB, 3 * MB / 2], vec![MB / 2, MB]],
        };

        let mut percents = Vec::new();
        let mut assembler = SequentialDocumentAssembler::new(loader);
        let output = assembler
            .run(
                AssemblyKind::Create,
                &inputs,
                RecordingBuilder::default(),
                &CancelToken::new(),
                |p: &ProgressState| percents.push(p.percent),
            )
            .await
            .unwrap();

        assert_eq!(percents, vec![0, 16, 33, 50, 83, 100]);
        assert_eq!(output.page_count, 2);
        assert_eq!(assembler.progress().bytes_loaded_across_batch, 3 * MB);
    }

    #[tokio::test]
    async fn test_inputs_reach_builder_in_order() {
        let inputs: Vec<InputFile> = (0u8..4)
            .map(|i| InputFile::from_bytes(format!("{}.pdf", i), PDF_MIME, vec![i; 3]))
            .collect();

        let mut assembler = SequentialDocumentAssembler::new(ChunkedLoader::new(2));
        let output = assembler
            .run(
                AssemblyKind::Merge,
                &inputs,
                RecordingBuilder::default(),
                &CancelToken::new(),
                |_: &ProgressState| {},
            )
            .await
            .unwrap();

        assert_eq!(
            output.output_bytes,
            vec![0, 0, 0, 1, 1, 1, 2, 2, 2, 3, 3, 3]
        );
    }

    #[test]
    fn test_kind_accepts() {
        assert!(AssemblyKind::Merge.accepts("application/pdf"));
        assert!(!AssemblyKind::Merge.accepts("image/png"));
        assert!(AssemblyKind::Create.accepts("image/jpg"));
        assert!(!AssemblyKind::Create.accepts("image/gif"));
    }

    #[test]
    fn test_validate_paths_uses_extensions() {
        assert_eq!(
            validate_paths(AssemblyKind::Create, &["scans/photo.gif", "missing.png"]),
            Err(ValidationError::UnsupportedType {
                index: 0,
                name: "photo.gif".into(),
                mime_type: "application/octet-stream".into(),
            })
        );
        assert_eq!(
            validate_paths(AssemblyKind::Merge, &["/no/such/only.pdf"]),
            Err(ValidationError::TooFewInputs {
                required: 2,
                actual: 1
            })
        );
        assert!(validate_paths(AssemblyKind::Create, &["a.JPG", "b.jpeg", "c.png"]).is_ok());
    }
}
