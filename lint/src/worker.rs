//! Worker handle: owns one analyzer child process and its stdio.
//!
//! Holding `&mut Worker` is the only way to talk to the process, so at most
//! one exchange is ever in flight per worker.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use lintbridge_types::{Issue, LanguageId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::codec::{FrameReader, FrameWriter};
use crate::error::LintError;
use crate::protocol;
use crate::runtime::Runtime;

const SHUTDOWN_TIMEOUT_SECS: u64 = 2;

pub(crate) struct Worker {
    language: LanguageId,
    child: Child,
    writer: FrameWriter<ChildStdin>,
    reader: FrameReader<ChildStdout>,
}

impl Worker {
    /// Launch `runtime entry_point` with piped stdio.
    pub fn spawn(
        language: &LanguageId,
        runtime: &Runtime,
        entry_point: &Path,
    ) -> Result<Self, LintError> {
        let spawn_err = |source| LintError::WorkerSpawn {
            language: language.clone(),
            source,
        };

        let mut child = Command::new(runtime.executable())
            .arg(entry_point)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        let missing = |stream: &str| {
            spawn_err(std::io::Error::other(format!("no {stream} from child")))
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;

        if let Some(stderr) = child.stderr.take() {
            let stderr_language = language.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(language = %stderr_language, "analyzer stderr: {line}");
                }
            });
        }

        tracing::info!(
            language = %language,
            pid = child.id(),
            entry_point = %entry_point.display(),
            "Analyzer worker started"
        );

        Ok(Self {
            language: language.clone(),
            child,
            writer: FrameWriter::new(stdin),
            reader: FrameReader::new(stdout),
        })
    }

    pub fn language(&self) -> &LanguageId {
        &self.language
    }

    /// Whether the process has already exited (e.g. crashed while idle).
    pub fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    /// Send one request and wait for its response.
    ///
    /// A malformed response is [`LintError::ProtocolDecode`] and leaves the
    /// worker usable: the bad frame has been consumed in full. Any stream
    /// failure, EOF, or timeout is [`LintError::WorkerCrash`].
    pub async fn exchange(&mut self, text: &str, timeout: Duration) -> Result<Vec<Issue>, LintError> {
        let payload = protocol::encode_request(text)?;

        let frame = match tokio::time::timeout(timeout, self.round_trip(&payload)).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => return Err(self.crashed(format!("{e:#}"))),
            Err(_) => {
                return Err(self.crashed(format!(
                    "no response within {}ms",
                    timeout.as_millis()
                )));
            }
        };

        tracing::trace!(language = %self.language, bytes = frame.len(), "Analyzer response frame");
        Ok(protocol::decode_response(&frame)?)
    }

    async fn round_trip(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        self.writer
            .write_frame(payload)
            .await
            .context("writing request")?;
        self.reader
            .read_frame()
            .await
            .context("reading response")?
            .ok_or_else(|| anyhow!("analyzer closed its output stream"))
    }

    fn crashed(&mut self, reason: String) -> LintError {
        let reason = match self.child.try_wait() {
            Ok(Some(status)) => format!("{reason} ({status})"),
            _ => reason,
        };
        LintError::WorkerCrash {
            language: self.language.clone(),
            reason,
        }
    }

    /// Close the input stream so the analyzer exits on EOF; kill it if it lingers.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.writer.close().await {
            tracing::debug!(language = %self.language, "Closing analyzer stdin failed: {e}");
        }

        match tokio::time::timeout(
            Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
            self.child.wait(),
        )
        .await
        {
            Ok(Ok(status)) => {
                tracing::info!(language = %self.language, %status, "Analyzer worker exited");
            }
            Ok(Err(e)) => {
                tracing::debug!(language = %self.language, "Waiting for analyzer failed: {e}");
            }
            Err(_) => {
                tracing::debug!(language = %self.language, "Analyzer didn't exit in time, killing");
                let _ = self.child.kill().await;
            }
        }
    }
}
