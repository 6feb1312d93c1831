//! Office and text documents to PDF through an external converter process.

use super::ConversionStrategy;
use crate::error::ConversionError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

/// Default converter binary, invoked as `<bin> -f pdf -o <output> <input>`.
pub const DEFAULT_CONVERTER_PATH: &str = "/opt/bin/unoconv";

/// Default bound on one converter run.
pub const DEFAULT_CONVERTER_TIMEOUT: Duration = Duration::from_secs(120);

/// Longest slice of converter output carried into an error message.
const MAX_DETAIL_CHARS: usize = 2000;

/// Runs an unoconv-compatible converter in a private temp directory.
///
/// The child is killed if it outlives `timeout`.
pub struct DocumentToPdfConverter {
    program: PathBuf,
    timeout: Duration,
}

impl DocumentToPdfConverter {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl Default for DocumentToPdfConverter {
    fn default() -> Self {
        Self::new(DEFAULT_CONVERTER_PATH, DEFAULT_CONVERTER_TIMEOUT)
    }
}

fn tool_error(detail: impl Into<String>) -> ConversionError {
    ConversionError::ExternalTool(detail.into())
}

/// Prefers stderr, falls back to stdout, trimmed and bounded.
fn failure_detail(stderr: &[u8], stdout: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let stdout = String::from_utf8_lossy(stdout);
    let text = if stderr.trim().is_empty() {
        stdout.trim()
    } else {
        stderr.trim()
    };
    text.chars().take(MAX_DETAIL_CHARS).collect()
}

#[async_trait]
impl ConversionStrategy for DocumentToPdfConverter {
    fn name(&self) -> &'static str {
        "document"
    }

    async fn convert(&self, input: Vec<u8>, extension: &str) -> Result<Vec<u8>, ConversionError> {
        let workdir = tempfile::tempdir()
            .map_err(|e| tool_error(format!("Failed to create work directory: {}", e)))?;
        let input_path = workdir.path().join(format!("input.{}", extension));
        let output_path = workdir.path().join("output.pdf");

        tokio::fs::write(&input_path, &input)
            .await
            .map_err(|e| tool_error(format!("Failed to stage input document: {}", e)))?;

        info!(
            program = %self.program.display(),
            size_bytes = input.len(),
            extension = %extension,
            "Running document converter"
        );

        let child = Command::new(&self.program)
            .arg("-f")
            .arg("pdf")
            .arg("-o")
            .arg(&output_path)
            .arg(&input_path)
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tool_error(format!(
                    "Failed to start {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| tool_error(format!("Failed to wait for converter: {}", e)))?,
            Err(_) => {
                warn!(
                    program = %self.program.display(),
                    timeout_secs = self.timeout.as_secs(),
                    "Document converter timed out"
                );
                return Err(tool_error(format!(
                    "{} timed out after {}s",
                    self.program.display(),
                    self.timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let detail = failure_detail(&output.stderr, &output.stdout);
            return Err(tool_error(if detail.is_empty() {
                format!("{} exited with {}", self.program.display(), output.status)
            } else {
                format!(
                    "{} exited with {}: {}",
                    self.program.display(),
                    output.status,
                    detail
                )
            }));
        }

        let pdf_data = tokio::fs::read(&output_path).await.map_err(|e| {
            tool_error(format!(
                "{} produced no output file: {}",
                self.program.display(),
                e
            ))
        })?;

        info!("Document PDF complete: {} bytes", pdf_data.len());
        Ok(pdf_data)
    }
}
