//! pdfkit command-line front end
//!
//! Merges PDFs, builds PDFs from images, prints PDF info, and forwards
//! compress/protect requests to the remote PDF service.

mod config;
mod report;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pdfkit_core::assembler::validate_paths;
use pdfkit_core::{
    inspect, Artifact, AssemblyError, AssemblyKind, CancelToken, ChunkedLoader, InputFile,
    LopdfBuilder, PdfCommand, ProcessMetrics, ProcessResult, ProtectRequest, RemoteClient,
    RemoteError, SequentialDocumentAssembler,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::report::ProgressLine;

#[derive(Parser, Debug)]
#[command(name = "pdfkit")]
#[command(version, about = "Merge PDFs, build PDFs from images, compress and protect PDFs")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print the result as a JSON report
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge two or more PDFs in the given order
    Merge {
        files: Vec<PathBuf>,
        /// Output directory (default: from config)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Build a PDF with one page per JPEG/PNG image
    Create {
        images: Vec<PathBuf>,
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Show page count, version and metadata of a PDF
    Info { file: PathBuf },
    /// Compress a PDF on the remote service
    Compress {
        file: PathBuf,
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Password-protect a PDF on the remote service
    Protect {
        file: PathBuf,
        #[arg(long)]
        password: String,
        /// Must repeat the password
        #[arg(long)]
        confirm: String,
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
}

impl Commands {
    fn record(&self) -> PdfCommand {
        match self {
            Commands::Merge { files, .. } => PdfCommand::Merge {
                files: files.clone(),
            },
            Commands::Create { images, .. } => PdfCommand::Create {
                images: images.clone(),
            },
            Commands::Info { file } => PdfCommand::Info { file: file.clone() },
            Commands::Compress { file, .. } => PdfCommand::Compress { file: file.clone() },
            Commands::Protect { file, .. } => PdfCommand::Protect { file: file.clone() },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // stdout is reserved for the report
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "configuration loaded");

    let result = execute(&cli.command, &config, !cli.json).await;
    report::emit(&result, cli.json)?;

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

async fn execute(command: &Commands, config: &Config, show_progress: bool) -> ProcessResult {
    let record = command.record();
    let started = Instant::now();
    let out_dir = |dir: &Option<PathBuf>| dir.clone().unwrap_or_else(|| config.output.dir.clone());

    match command {
        Commands::Merge { files, output_dir } => {
            assemble(AssemblyKind::Merge, files, &out_dir(output_dir), config, show_progress, record)
                .await
        }
        Commands::Create { images, output_dir } => {
            assemble(AssemblyKind::Create, images, &out_dir(output_dir), config, show_progress, record)
                .await
        }
        Commands::Info { file } => match tokio::fs::read(file).await {
            Ok(bytes) => match inspect(&bytes) {
                Ok(info) => ProcessResult::inspected(record, info),
                Err(e) => ProcessResult::failed(record, e),
            },
            Err(e) => ProcessResult::failed(record, format!("Failed to read {}: {}", file.display(), e)),
        },
        Commands::Compress { file, output_dir } => {
            let mut progress = ProgressLine::stderr(show_progress);
            let outcome = async {
                let input = InputFile::open(file).await?;
                let client = remote_client(config)?;
                let outcome = client
                    .compress(&input, &mut |loaded, total| progress.bytes(loaded, total))
                    .await?;
                Ok::<_, RemoteError>(outcome)
            }
            .await;
            progress.finish();

            match outcome {
                Ok(outcome) => {
                    tracing::info!(
                        original = outcome.original_size,
                        compressed = outcome.compressed_size,
                        "size reduced by {:.1}%",
                        outcome.reduction_percent()
                    );
                    // the compressed output is a plain PDF, so its pages can be counted
                    let pages = pdfkit_core::get_page_count(&outcome.artifact.bytes).ok();
                    let measured = (outcome.original_size, pages);
                    finish(record, outcome.artifact, &out_dir(output_dir), measured, started).await
                }
                Err(e) => ProcessResult::from_remote_error(record, &e),
            }
        }
        Commands::Protect {
            file,
            password,
            confirm,
            output_dir,
        } => {
            let mut progress = ProgressLine::stderr(show_progress);
            let outcome = async {
                let request = ProtectRequest::new(password.as_str(), confirm)?;
                let input = InputFile::open(file).await?;
                let client = remote_client(config)?;
                let artifact = client
                    .protect(&input, &request, &mut |loaded, total| progress.bytes(loaded, total))
                    .await?;
                Ok::<_, RemoteError>((artifact, input.byte_length()))
            }
            .await;
            progress.finish();

            match outcome {
                // encrypted output: page count unknown
                Ok((artifact, input_size)) => {
                    finish(record, artifact, &out_dir(output_dir), (input_size, None), started)
                        .await
                }
                Err(e) => ProcessResult::from_remote_error(record, &e),
            }
        }
    }
}

fn remote_client(config: &Config) -> Result<RemoteClient, RemoteError> {
    RemoteClient::new(config.remote.base_url.clone(), config.remote.timeout())
}

async fn assemble(
    kind: AssemblyKind,
    paths: &[PathBuf],
    out_dir: &Path,
    config: &Config,
    show_progress: bool,
    record: PdfCommand,
) -> ProcessResult {
    let started = Instant::now();

    if let Err(e) = validate_paths(kind, paths) {
        return ProcessResult::from_assembly_error(record, &AssemblyError::Validation(e));
    }

    let mut inputs = Vec::with_capacity(paths.len());
    for (index, path) in paths.iter().enumerate() {
        match InputFile::open(path).await {
            Ok(file) => inputs.push(file),
            Err(source) => {
                return ProcessResult::from_assembly_error(
                    record,
                    &AssemblyError::Read { index, source },
                )
            }
        }
    }
    let input_size: u64 = inputs.iter().map(InputFile::byte_length).sum();
    if show_progress {
        eprintln!("{}", report::render_inputs(&inputs));
    }

    let cancel = CancelToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling");
                cancel.cancel();
            }
        })
    };

    let mut assembler =
        SequentialDocumentAssembler::new(ChunkedLoader::new(config.loader.chunk_size));
    let builder = LopdfBuilder::with_page_size(config.output.page_size.page_size());
    let mut progress = ProgressLine::stderr(show_progress);

    let outcome = assembler
        .run(kind, &inputs, builder, &cancel, |state| progress.update(state))
        .await;
    progress.finish();
    interrupt.abort();

    match outcome {
        Ok(output) => {
            let pages = Some(output.page_count as u32);
            finish(record, output.into_artifact(), out_dir, (input_size, pages), started).await
        }
        Err(e) => ProcessResult::from_assembly_error(record, &e),
    }
}

/// Write the artifact and build the success report. `measured` is the input
/// size and the output page count when known.
async fn finish(
    record: PdfCommand,
    artifact: Artifact,
    out_dir: &Path,
    measured: (u64, Option<u32>),
    started: Instant,
) -> ProcessResult {
    let (input_size, page_count) = measured;
    match save(&artifact, out_dir).await {
        Ok(path) => {
            let metrics = ProcessMetrics {
                input_size_bytes: input_size,
                output_size_bytes: artifact.len() as u64,
                page_count,
                processing_time_ms: started.elapsed().as_millis() as u64,
            };
            ProcessResult::succeeded(record, Some(path), metrics)
        }
        Err(e) => ProcessResult::failed(record, format!("{:#}", e)),
    }
}

async fn save(artifact: &Artifact, dir: &Path) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    let path = artifact
        .write_to(dir)
        .await
        .with_context(|| format!("Failed to write {}", artifact.suggested_file_name))?;
    tracing::info!(path = %path.display(), bytes = artifact.len(), "artifact written");
    Ok(path)
}
