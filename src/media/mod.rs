// External media tool abstraction
//
// The batch runner only talks to the encoder through these traits:
// - MediaToolkit: preflight, duration probing and spawning encodes
// - EncodeProcess: one running encode whose status text is read line by line
//
// `processor` holds the ffmpeg/ffprobe implementation, `commands` the argument
// builders it uses.

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

pub use commands::*;
pub use processor::*;

use crate::config::ToolchainConfig;
use crate::error::Result;

/// How an encoder process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A running encode
#[async_trait]
pub trait EncodeProcess: Send {
    /// Next status line, `None` once the stream is closed. Must be cancel safe.
    async fn next_line(&mut self) -> Result<Option<String>>;

    /// Wait for the process to exit
    async fn wait(&mut self) -> Result<ProcessExit>;

    /// Best-effort termination; must not block indefinitely
    async fn terminate(&mut self) -> Result<()>;
}

/// Operations the batch runner needs from the external tool
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Fail if the encoder or prober cannot be executed
    async fn check_availability(&self) -> Result<()>;

    /// First line of the encoder's version banner
    async fn version_info(&self) -> Result<String>;

    /// Media duration in seconds
    async fn probe_duration(&self, path: &Path) -> Result<f64>;

    /// Start an encode without waiting for it
    async fn spawn_encode(&self, job: &EncodeJob) -> Result<Box<dyn EncodeProcess>>;
}

/// Factory for creating toolkit instances
pub struct MediaToolkitFactory;

impl MediaToolkitFactory {
    /// Create the default toolkit implementation (ffmpeg based)
    pub fn create_toolkit(config: ToolchainConfig) -> Arc<dyn MediaToolkit> {
        Arc::new(processor::FfmpegToolkit::new(config))
    }
}
