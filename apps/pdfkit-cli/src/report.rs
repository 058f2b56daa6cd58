//! Terminal output: progress line on stderr, final report on stdout

use std::io::Write;

use pdfkit_core::progress::percent_of;
use pdfkit_core::{InputFile, ProcessResult, ProgressState};

/// Single-line percentage display, redrawn only when the value changes
pub struct ProgressLine<W: Write> {
    out: Option<W>,
    last: Option<u8>,
}

impl ProgressLine<std::io::Stderr> {
    pub fn stderr(enabled: bool) -> Self {
        Self::new(enabled.then(std::io::stderr))
    }
}

impl<W: Write> ProgressLine<W> {
    pub fn new(out: Option<W>) -> Self {
        Self { out, last: None }
    }

    pub fn update(&mut self, state: &ProgressState) {
        self.show(state.percent);
    }

    pub fn bytes(&mut self, loaded: u64, total: u64) {
        self.show(percent_of(loaded, total));
    }

    fn show(&mut self, percent: u8) {
        if self.last == Some(percent) {
            return;
        }
        self.last = Some(percent);
        if let Some(out) = self.out.as_mut() {
            // progress output is best effort
            let _ = write!(out, "\r{:>3}%", percent);
            let _ = out.flush();
        }
    }

    pub fn finish(&mut self) {
        if let (Some(out), Some(_)) = (self.out.as_mut(), self.last) {
            let _ = writeln!(out);
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> Option<W> {
        self.out
    }
}

/// Human-readable summary of a result
pub fn render(result: &ProcessResult) -> String {
    if !result.success {
        let mut line = format!("Error: {}", result.error.as_deref().unwrap_or("unknown error"));
        if let Some(index) = result.failed_index {
            let inputs = result.command.inputs();
            if let Some(path) = inputs.get(index) {
                line.push_str(&format!(" [input {}: {}]", index, path.display()));
            }
        }
        return line;
    }

    if let Some(info) = &result.info {
        let mut lines = vec![
            format!("Pages:     {}", info.page_count),
            format!("Version:   {}", info.version),
            format!("Encrypted: {}", if info.encrypted { "yes" } else { "no" }),
            format!("Size:      {} bytes", info.size_bytes),
        ];
        if let Some(title) = &info.title {
            lines.push(format!("Title:     {}", title));
        }
        if let Some(author) = &info.author {
            lines.push(format!("Author:    {}", author));
        }
        return lines.join("\n");
    }

    let mut line = match &result.output {
        Some(path) => format!("Wrote {}", path.display()),
        None => "Done".to_string(),
    };
    if let Some(metrics) = &result.metrics {
        let pages = metrics
            .page_count
            .map(|n| format!("{} pages, ", n))
            .unwrap_or_default();
        line.push_str(&format!(
            " ({}{} bytes, {} ms)",
            pages, metrics.output_size_bytes, metrics.processing_time_ms
        ));
    }
    line
}

/// One line per queued input with its size
pub fn render_inputs(inputs: &[InputFile]) -> String {
    inputs
        .iter()
        .enumerate()
        .map(|(i, file)| format!("{:>3}. {} ({})", i + 1, file.name(), file.size_label()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Print the result to stdout, as JSON or as text
pub fn emit(result: &ProcessResult, json: bool) -> anyhow::Result<()> {
    let text = if json {
        serde_json::to_string_pretty(result)?
    } else {
        render(result)
    };
    println!("{}", text);
    Ok(())
}
