use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{HardsubError, Result};
use crate::options::OutputLocation;

/// Characters that are illegal in file names on at least one common filesystem
const UNSAFE_FILENAME_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const OUTPUT_SUFFIX: &str = "_subbed";

/// Video file discovered for a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFile {
    path: PathBuf,
    #[serde(skip)]
    size: OnceLock<Option<u64>>,
    /// Duration in seconds, known once probed
    pub duration: Option<f64>,
}

impl MediaFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            size: OnceLock::new(),
            duration: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File name without extension
    pub fn base_name(&self) -> String {
        self.path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Byte size, read from disk on first access
    pub fn size(&self) -> Option<u64> {
        *self
            .size
            .get_or_init(|| std::fs::metadata(&self.path).ok().map(|m| m.len()))
    }
}

/// Subtitle file paired with a video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionFile {
    path: PathBuf,
}

impl CaptionFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Why a pairing failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    ToolExitedWithError { code: Option<i32> },
    DurationUnavailable,
    InvocationException { message: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ToolExitedWithError { .. } => f.write_str("tool exited with error"),
            FailureReason::DurationUnavailable => f.write_str("could not determine duration"),
            FailureReason::InvocationException { message } => write!(f, "invocation exception: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Status {
    Unprocessed,
    NoCaption,
    Queued,
    Processing { percent: u8 },
    Completed { output: PathBuf },
    Failed { reason: FailureReason },
    Skipped,
}

impl Status {
    pub fn can_transition_to(&self, next: &Status) -> bool {
        match (self, next) {
            (Status::Unprocessed, Status::NoCaption | Status::Queued) => true,
            (Status::NoCaption, Status::Unprocessed) => true,
            (Status::Queued, Status::Processing { .. }) => true,
            (Status::Processing { percent: from }, Status::Processing { percent: to }) => to >= from,
            (Status::Processing { .. }, Status::Completed { .. } | Status::Failed { .. } | Status::Skipped) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Unprocessed => f.write_str("unprocessed"),
            Status::NoCaption => f.write_str("no caption"),
            Status::Queued => f.write_str("queued"),
            Status::Processing { percent } => write!(f, "processing {}%", percent),
            Status::Completed { output } => write!(f, "completed -> {}", output.display()),
            Status::Failed { reason } => write!(f, "failed: {}", reason),
            Status::Skipped => f.write_str("skipped"),
        }
    }
}

/// One video plus zero or one caption for a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pairing {
    pub media: MediaFile,
    pub caption: Option<CaptionFile>,
    pub selected: bool,
    status: Status,
}

impl Pairing {
    /// New pairing as produced by a scan; missing captions start as NoCaption
    pub fn new(media: MediaFile, caption: Option<CaptionFile>) -> Self {
        let status = if caption.is_some() {
            Status::Unprocessed
        } else {
            Status::NoCaption
        };

        Self {
            media,
            caption,
            selected: true,
            status,
        }
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Selected and has a caption
    pub fn is_runnable(&self) -> bool {
        self.selected && self.caption.is_some()
    }

    /// Move to `next`, rejecting transitions that would go backwards
    pub fn advance(&mut self, next: Status) -> Result<()> {
        if !self.status.can_transition_to(&next) {
            return Err(HardsubError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Manual caption override
    pub fn assign_caption(&mut self, caption: CaptionFile) {
        self.caption = Some(caption);
        if self.status == Status::NoCaption {
            self.status = Status::Unprocessed;
        }
    }

    /// Copy taken when a batch starts: runnable pairings are queued afresh
    pub(crate) fn snapshot(&self) -> Self {
        let mut copy = self.clone();
        if copy.is_runnable() {
            copy.status = Status::Queued;
        }
        copy
    }

    pub fn output_path(&self, location: &OutputLocation, extension: &str) -> PathBuf {
        output_path_for(self.media.path(), location, extension)
    }
}

/// Replace filesystem-unsafe characters with `_`
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if UNSAFE_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// `<dir>/<sanitized stem>_subbed.<ext>`, where dir is the output directory or
/// the source file's directory
pub fn output_path_for(media_path: &Path, location: &OutputLocation, extension: &str) -> PathBuf {
    let stem = media_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = format!(
        "{}{}.{}",
        sanitize_file_name(&stem),
        OUTPUT_SUFFIX,
        extension.trim_start_matches('.')
    );

    let dir = match location {
        OutputLocation::Directory(dir) => dir.clone(),
        OutputLocation::SameAsSource => media_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };

    dir.join(file_name)
}

/// Normalize separators and escape the characters the filter graph parser
/// treats specially inside a single-quoted argument.
pub fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "'\\''")
}
