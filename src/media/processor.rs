use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tracing::{debug, info, warn};

use crate::config::ToolchainConfig;
use crate::error::{HardsubError, Result};
use super::{EncodeJob, EncodeProcess, MediaCommandBuilder, MediaToolkit, ProcessExit};

/// How long a killed encoder gets to be reaped before we stop waiting
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// ffmpeg/ffprobe backed toolkit
pub struct FfmpegToolkit {
    config: ToolchainConfig,
    command_builder: MediaCommandBuilder,
}

impl FfmpegToolkit {
    pub fn new(config: ToolchainConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(
            &config.ffmpeg_path,
            &config.ffprobe_path,
            &config.video_codec,
        );

        Self {
            config,
            command_builder,
        }
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn check_availability(&self) -> Result<()> {
        for command in self.command_builder.version_checks() {
            command.execute().await.map_err(|e| {
                HardsubError::ToolUnavailable(format!("{} ({})", command.binary_path, e))
            })?;
        }

        info!("Encoder and prober are available");
        Ok(())
    }

    async fn version_info(&self) -> Result<String> {
        let [encoder, _] = self.command_builder.version_checks();
        let banner = encoder.execute().await?;
        // The first line carries the version
        Ok(banner.lines().next().unwrap_or("Unknown version").to_string())
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        let command = self.command_builder.probe_duration(path);
        let timeout = self.config.probe_timeout();

        let stdout = tokio::time::timeout(timeout, command.execute())
            .await
            .map_err(|_| HardsubError::Probe(format!("timed out after {}s", timeout.as_secs())))?
            .map_err(|e| HardsubError::Probe(e.to_string()))?;

        let duration = parse_duration(&stdout)?;
        debug!("Probed {}: {:.2}s", path.display(), duration);
        Ok(duration)
    }

    async fn spawn_encode(&self, job: &EncodeJob) -> Result<Box<dyn EncodeProcess>> {
        let command = self.command_builder.hardsub(job);
        debug!("Spawning encoder: {} {:?}", command.binary_path, command.args);

        let mut child = command
            .to_command()
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| HardsubError::Media(format!("Failed to spawn {}: {}", command.binary_path, e)))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| HardsubError::Media("Encoder stderr was not captured".to_string()))?;

        Ok(Box::new(FfmpegProcess {
            child,
            lines: StatusLines::new(BufReader::new(stderr)),
        }))
    }
}

/// Parse prober output into a positive number of seconds
pub fn parse_duration(stdout: &str) -> Result<f64> {
    let text = stdout.trim();
    let duration: f64 = text
        .parse()
        .map_err(|_| HardsubError::Probe(format!("unexpected prober output '{}'", text)))?;

    if !duration.is_finite() || duration <= 0.0 {
        return Err(HardsubError::Probe(format!("non-positive duration {}", duration)));
    }
    Ok(duration)
}

/// Running ffmpeg encode
pub struct FfmpegProcess {
    child: Child,
    lines: StatusLines<BufReader<ChildStderr>>,
}

#[async_trait]
impl EncodeProcess for FfmpegProcess {
    async fn next_line(&mut self) -> Result<Option<String>> {
        Ok(self.lines.next_line().await?)
    }

    async fn wait(&mut self) -> Result<ProcessExit> {
        let status = self.child.wait().await?;
        Ok(ProcessExit { code: status.code() })
    }

    async fn terminate(&mut self) -> Result<()> {
        if let Err(e) = self.child.start_kill() {
            // Already exited
            debug!("Kill request ignored: {}", e);
        }

        match tokio::time::timeout(TERMINATE_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => debug!("Encoder terminated with {}", status),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => warn!("Encoder did not exit within {}s of kill", TERMINATE_GRACE.as_secs()),
        }
        Ok(())
    }
}

/// Splits a byte stream into lines on `\n` or `\r`.
///
/// ffmpeg redraws its status line with carriage returns, so a plain line
/// reader would only see the progress once the encode is over.
pub struct StatusLines<R> {
    reader: R,
    pending: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> StatusLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
        }
    }

    /// Cancel safe: partial data is kept in `pending` between calls.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            let (consumed, complete) = {
                let buf = self.reader.fill_buf().await?;
                if buf.is_empty() {
                    if self.pending.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(self.take_pending()));
                }

                match buf.iter().position(|b| *b == b'\n' || *b == b'\r') {
                    Some(pos) => {
                        self.pending.extend_from_slice(&buf[..pos]);
                        (pos + 1, true)
                    }
                    None => {
                        self.pending.extend_from_slice(buf);
                        (buf.len(), false)
                    }
                }
            };
            self.reader.consume(consumed);

            // `\r\n` and blank lines produce nothing
            if complete && !self.pending.is_empty() {
                return Ok(Some(self.take_pending()));
            }
        }
    }

    fn take_pending(&mut self) -> String {
        let bytes = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
