use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::MatchingConfig;
use crate::error::{HardsubError, Result};
use crate::matcher::Matcher;
use crate::pairing::{CaptionFile, MediaFile, Pairing};

/// Non-recursive folder scan that pairs each video with its best subtitle
#[derive(Debug, Clone)]
pub struct Scanner {
    matcher: Matcher,
    video_extensions: Vec<String>,
    subtitle_extensions: Vec<String>,
}

impl Scanner {
    pub fn new(config: &MatchingConfig) -> Self {
        Self {
            matcher: Matcher::new(config.threshold),
            video_extensions: normalize_extensions(&config.video_extensions),
            subtitle_extensions: normalize_extensions(&config.subtitle_extensions),
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.matcher = Matcher::new(threshold);
        self
    }

    pub fn is_video(&self, path: &Path) -> bool {
        has_extension(path, &self.video_extensions)
    }

    pub fn is_subtitle(&self, path: &Path) -> bool {
        has_extension(path, &self.subtitle_extensions)
    }

    /// Scan `video_dir` for videos and `subtitle_dir` (or `video_dir`) for
    /// subtitles, returning one pairing per video in file name order.
    pub fn scan(&self, video_dir: &Path, subtitle_dir: Option<&Path>) -> Result<Vec<Pairing>> {
        let subtitle_dir = subtitle_dir.unwrap_or(video_dir);
        info!(
            "Scanning {} for videos (match threshold {:.2})",
            video_dir.display(),
            self.matcher.threshold()
        );

        let videos = list_files(video_dir, |p| self.is_video(p))?;
        let subtitles = SubtitleSet::list(subtitle_dir, self)?;
        info!("Found {} videos and {} subtitle files", videos.len(), subtitles.paths.len());

        Ok(videos
            .into_iter()
            .map(|video| self.pair(MediaFile::new(video), &subtitles))
            .collect())
    }

    /// Pair a single video picked by hand, matched against the subtitles in
    /// its own folder
    pub fn pair_file(&self, video: &Path) -> Result<Pairing> {
        if !video.is_file() {
            return Err(HardsubError::FileNotFound(video.display().to_string()));
        }
        if !self.is_video(video) {
            return Err(HardsubError::InvalidOption(format!(
                "{} does not have a recognized video extension",
                video.display()
            )));
        }

        let folder = match video.parent().filter(|d| !d.as_os_str().is_empty()) {
            Some(dir) => dir.to_path_buf(),
            None => PathBuf::from("."),
        };
        let subtitles = SubtitleSet::list(&folder, self)?;
        Ok(self.pair(MediaFile::new(video), &subtitles))
    }

    fn pair(&self, media: MediaFile, subtitles: &SubtitleSet) -> Pairing {
        let caption = self
            .matcher
            .best_match(&media.base_name(), &subtitles.names)
            .map(|m| {
                debug!("{} -> {} (score {:.2})", media.file_name(), subtitles.names[m.index], m.score);
                CaptionFile::new(subtitles.paths[m.index].clone())
            });
        if caption.is_none() {
            debug!("{} has no matching subtitle", media.file_name());
        }
        Pairing::new(media, caption)
    }
}

/// Subtitle paths of one folder with their file names, index aligned
struct SubtitleSet {
    paths: Vec<PathBuf>,
    names: Vec<String>,
}

impl SubtitleSet {
    fn list(dir: &Path, scanner: &Scanner) -> Result<Self> {
        let paths = list_files(dir, |p| scanner.is_subtitle(p))?;
        let names = paths
            .iter()
            .map(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            })
            .collect();
        Ok(Self { paths, names })
    }
}

fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect()
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|known| known.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Regular files directly inside `dir` accepted by `filter`, sorted by name
fn list_files<F: Fn(&Path) -> bool>(dir: &Path, filter: F) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(HardsubError::FileNotFound(format!("{} is not a directory", dir.display())));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| HardsubError::Io(e.into()))?;
        if entry.path().is_file() && filter(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}
