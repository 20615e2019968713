//! Pipeline invocation
//!
//! One document goes through the pipeline per run: the input file is
//! posted as a multipart upload to the processor's entry endpoint and the
//! response body is streamed to a deterministically named output file
//! next to the stack. Success means the transfer completed and bytes were
//! written; whether the response is good output is the processor's
//! concern, not this layer's.

use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Transfers cover a full pipeline pass over the document, including OCR.
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(300);

/// How much of a rejection body is kept for the error message.
const BODY_SNIPPET_LEN: usize = 1000;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("failed to read input {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transfer failed: {0}")]
    Transfer(#[from] reqwest::Error),

    #[error("pipeline rejected the document ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("failed to write output {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Receipt for a completed transfer.
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    pub output_path: PathBuf,
    pub bytes_written: u64,
    pub status: u16,
}

/// Output file name derived from the input: base name with the extension
/// stripped, spaces replaced by underscores, `.json` appended.
pub fn output_file_name(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    format!("{}.json", stem.replace(' ', "_"))
}

pub struct PipelineInvoker {
    client: reqwest::Client,
    endpoint: String,
}

impl PipelineInvoker {
    pub fn new(endpoint: impl Into<String>) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(TRANSFER_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Posts `input` as the multipart field `file` and streams the
    /// response body into `out_dir`.
    pub async fn submit(&self, input: &Path, out_dir: &Path) -> Result<SubmitReceipt, SubmitError> {
        let payload = tokio::fs::read(input)
            .await
            .map_err(|source| SubmitError::Read {
                path: input.to_path_buf(),
                source,
            })?;
        let file_name = input
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input.pdf".to_string());

        info!(
            endpoint = %self.endpoint,
            input = %input.display(),
            bytes = payload.len(),
            "submitting document to the pipeline"
        );

        let part = reqwest::multipart::Part::bytes(payload).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SubmitError::Rejected {
                status: status.as_u16(),
                body: snippet(&body),
            });
        }

        let output_path = out_dir.join(output_file_name(input));
        let mut file =
            tokio::fs::File::create(&output_path)
                .await
                .map_err(|source| SubmitError::Write {
                    path: output_path.clone(),
                    source,
                })?;

        let mut bytes_written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|source| SubmitError::Write {
                    path: output_path.clone(),
                    source,
                })?;
            bytes_written += chunk.len() as u64;
        }
        file.flush().await.map_err(|source| SubmitError::Write {
            path: output_path.clone(),
            source,
        })?;

        debug!(output = %output_path.display(), bytes = bytes_written, "response saved");
        Ok(SubmitReceipt {
            output_path,
            bytes_written,
            status: status.as_u16(),
        })
    }
}

fn snippet(body: &str) -> String {
    if body.len() <= BODY_SNIPPET_LEN {
        body.to_string()
    } else {
        let mut end = BODY_SNIPPET_LEN;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body[..end].to_string()
    }
}
