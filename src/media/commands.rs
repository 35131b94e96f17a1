use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::error::{HardsubError, Result};
use crate::options::{Crf, SpeedPreset, SubtitleStyle};
use crate::pairing::escape_filter_path;

/// Abstract media tool command representation
#[derive(Debug, Clone, PartialEq)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    /// Create a new media tool command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Copy audio stream
    pub fn copy_audio(self) -> Self {
        self.audio_codec("copy")
    }

    /// Add video filter
    pub fn video_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-vf").arg(filter)
    }

    /// Encoder speed preset
    pub fn preset(self, preset: SpeedPreset) -> Self {
        self.arg("-preset").arg(preset.as_str())
    }

    /// Constant quality factor
    pub fn crf(self, crf: Crf) -> Self {
        self.arg("-crf").arg(crf.value().to_string())
    }

    /// Move the moov atom to the front for progressive playback
    pub fn faststart(self) -> Self {
        self.arg("-movflags").arg("+faststart")
    }

    /// Convert into a tokio command with stdin detached
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.binary_path);
        cmd.args(&self.args).stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    /// Run to completion and return stdout
    pub async fn execute(&self) -> Result<String> {
        debug!("Executing media command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let output = self
            .to_command()
            .output()
            .await
            .map_err(|e| HardsubError::Media(format!("Failed to execute {}: {}", self.binary_path, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HardsubError::Media(format!("{} failed: {}", self.description, stderr.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Everything the encoder needs for one pairing
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeJob {
    pub input: PathBuf,
    pub caption: PathBuf,
    pub output: PathBuf,
    pub preset: SpeedPreset,
    pub crf: Option<Crf>,
    pub style: SubtitleStyle,
}

impl EncodeJob {
    /// `subtitles='<path>':force_style='<style>'`
    pub fn subtitle_filter(&self) -> String {
        format!(
            "subtitles='{}':force_style='{}'",
            escape_filter_path(&self.caption),
            self.style.render()
        )
    }
}

/// Builder for the commands the batch needs
#[derive(Debug, Clone)]
pub struct MediaCommandBuilder {
    encoder_path: String,
    prober_path: String,
    video_codec: String,
}

impl MediaCommandBuilder {
    pub fn new<S1: Into<String>, S2: Into<String>, S3: Into<String>>(
        encoder_path: S1,
        prober_path: S2,
        video_codec: S3,
    ) -> Self {
        Self {
            encoder_path: encoder_path.into(),
            prober_path: prober_path.into(),
            video_codec: video_codec.into(),
        }
    }

    /// Build the hard-sub encode command
    pub fn hardsub(&self, job: &EncodeJob) -> MediaCommand {
        let mut cmd = MediaCommand::new(&self.encoder_path, "Subtitle burn-in")
            .overwrite()
            .input(&job.input)
            .video_filter(job.subtitle_filter())
            .video_codec(&self.video_codec)
            .preset(job.preset);

        if let Some(crf) = job.crf {
            cmd = cmd.crf(crf);
        }

        cmd.copy_audio().faststart().output(&job.output)
    }

    /// Build the duration probe command; prints seconds as a bare number
    pub fn probe_duration<P: AsRef<Path>>(&self, input: P) -> MediaCommand {
        MediaCommand::new(&self.prober_path, "Duration probe")
            .args(["-v", "error"])
            .args(["-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(input.as_ref().to_string_lossy().to_string())
    }

    /// Build version check commands for the encoder and the prober
    pub fn version_checks(&self) -> [MediaCommand; 2] {
        [
            MediaCommand::new(&self.encoder_path, "Encoder version check").arg("-version"),
            MediaCommand::new(&self.prober_path, "Prober version check").arg("-version"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{BorderStyle, Color};

    fn builder() -> MediaCommandBuilder {
        MediaCommandBuilder::new("ffmpeg", "ffprobe", "libx264")
    }

    #[test]
    fn test_hardsub_command_layout() {
        let style = SubtitleStyle::default();
        let job = EncodeJob {
            input: PathBuf::from("/v/ep1.mkv"),
            caption: PathBuf::from("/v/ep1.srt"),
            output: PathBuf::from("/out/ep1_subbed.mp4"),
            preset: SpeedPreset::Fast,
            crf: None,
            style,
        };

        let cmd = builder().hardsub(&job);
        assert_eq!(cmd.binary_path, "ffmpeg");
        assert_eq!(
            cmd.args,
            vec![
                "-y",
                "-i",
                "/v/ep1.mkv",
                "-vf",
                "subtitles='/v/ep1.srt':force_style='FontSize=16,BorderStyle=3,Outline=2'",
                "-c:v",
                "libx264",
                "-preset",
                "fast",
                "-c:a",
                "copy",
                "-movflags",
                "+faststart",
                "/out/ep1_subbed.mp4",
            ]
        );
    }

    #[test]
    fn test_hardsub_with_crf_and_style() {
        let style = SubtitleStyle {
            primary_color: Some(Color::WHITE),
            border_style: Some(BorderStyle::Box),
            ..Default::default()
        };
        let job = EncodeJob {
            input: PathBuf::from("in.mp4"),
            caption: PathBuf::from("C:\\subs\\in.srt"),
            output: PathBuf::from("out.mp4"),
            preset: SpeedPreset::Veryslow,
            crf: Some(Crf::try_from(18).unwrap()),
            style,
        };

        let cmd = builder().hardsub(&job);
        let crf_at = cmd.args.iter().position(|a| a == "-crf").unwrap();
        assert_eq!(cmd.args[crf_at + 1], "18");
        assert!(crf_at > cmd.args.iter().position(|a| a == "-preset").unwrap());
        assert_eq!(cmd.args.last().map(String::as_str), Some("out.mp4"));
        assert_eq!(
            job.subtitle_filter(),
            "subtitles='C\\:/subs/in.srt':force_style='PrimaryColour=&H00FFFFFF,BorderStyle=3,Outline=2,Shadow=1'"
        );
    }

    #[test]
    fn test_probe_command() {
        let cmd = builder().probe_duration("/v/ep1.mkv");
        assert_eq!(cmd.binary_path, "ffprobe");
        assert_eq!(
            cmd.args,
            vec![
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
                "/v/ep1.mkv",
            ]
        );
    }

    #[test]
    fn test_version_checks() {
        let [encoder, prober] = builder().version_checks();
        assert_eq!(encoder.args, vec!["-version"]);
        assert_eq!(prober.binary_path, "ffprobe");
    }
}
