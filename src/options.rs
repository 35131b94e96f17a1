use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{HardsubError, Result};

/// Encoder speed/compression trade-off point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SpeedPreset {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    Fast,
    #[default]
    Medium,
    Slow,
    Slower,
    Veryslow,
}

impl SpeedPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeedPreset::Ultrafast => "ultrafast",
            SpeedPreset::Superfast => "superfast",
            SpeedPreset::Veryfast => "veryfast",
            SpeedPreset::Faster => "faster",
            SpeedPreset::Fast => "fast",
            SpeedPreset::Medium => "medium",
            SpeedPreset::Slow => "slow",
            SpeedPreset::Slower => "slower",
            SpeedPreset::Veryslow => "veryslow",
        }
    }
}

impl fmt::Display for SpeedPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Constant rate factor, 0 (lossless) ..= 51 (worst)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Crf(u8);

impl Crf {
    pub const MAX: u8 = 51;

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Human label for the closest well-known quality step
    pub fn describe(&self) -> &'static str {
        const STEPS: [(u8, &str); 6] = [
            (0, "Lossless"),
            (18, "Very High"),
            (23, "High (Default)"),
            (28, "Medium"),
            (35, "Low"),
            (51, "Very Low"),
        ];

        STEPS
            .iter()
            .min_by_key(|(step, _)| step.abs_diff(self.0))
            .map(|(_, label)| *label)
            .unwrap_or("Custom")
    }
}

impl Default for Crf {
    fn default() -> Self {
        Crf(23)
    }
}

impl TryFrom<u8> for Crf {
    type Error = HardsubError;

    fn try_from(value: u8) -> Result<Self> {
        if value > Self::MAX {
            return Err(HardsubError::InvalidOption(format!(
                "CRF must be between 0 and {}, got {}",
                Self::MAX,
                value
            )));
        }
        Ok(Crf(value))
    }
}

impl From<Crf> for u8 {
    fn from(crf: Crf) -> Self {
        crf.0
    }
}

impl FromStr for Crf {
    type Err = HardsubError;

    fn from_str(s: &str) -> Result<Self> {
        let value: u8 = s
            .trim()
            .parse()
            .map_err(|_| HardsubError::InvalidOption(format!("Invalid CRF value '{}'", s)))?;
        Crf::try_from(value)
    }
}

/// RGB text color, written as `#RRGGBB`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color { r: 0xFF, g: 0xFF, b: 0xFF };

    /// ASS colour literal: alpha, blue, green, red
    pub fn to_ass(&self) -> String {
        format!("&H00{:02X}{:02X}{:02X}", self.b, self.g, self.r)
    }
}

impl FromStr for Color {
    type Err = HardsubError;

    fn from_str(s: &str) -> Result<Self> {
        let hex = s.trim().trim_start_matches('#');
        let invalid = || HardsubError::InvalidOption(format!("Invalid color '{}', expected #RRGGBB", s));

        if hex.len() != 6 || !hex.is_ascii() {
            return Err(invalid());
        }

        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).map_err(|_| invalid());
        Ok(Color {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl TryFrom<String> for Color {
    type Error = HardsubError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BorderStyle {
    /// Outline and drop shadow around the glyphs
    Outline,
    /// Opaque box behind the text
    Box,
}

impl BorderStyle {
    pub fn ass_value(&self) -> u8 {
        match self {
            BorderStyle::Outline => 1,
            BorderStyle::Box => 3,
        }
    }
}

/// Caption style overrides passed to the subtitles filter as `force_style`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleStyle {
    pub font_name: Option<String>,
    pub font_size: Option<u32>,
    pub primary_color: Option<Color>,
    pub border_style: Option<BorderStyle>,
}

/// Characters that would end the quoted `force_style` argument or split a directive
const FONT_NAME_RESERVED: [char; 4] = ['\'', ',', '=', '\\'];

impl SubtitleStyle {
    pub const DEFAULT_FONT_NAME: &'static str = "Arial";
    pub const DEFAULT_FONT_SIZE: u32 = 16;

    /// Reject values that cannot be written into the style directive list
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.font_name {
            if name.trim().is_empty() {
                return Err(HardsubError::InvalidOption("Font name is empty".to_string()));
            }
            if let Some(c) = name.chars().find(|c| FONT_NAME_RESERVED.contains(c) || c.is_control()) {
                return Err(HardsubError::InvalidOption(format!(
                    "Font name '{}' contains unsupported character {:?}",
                    name, c
                )));
            }
        }
        if self.font_size == Some(0) {
            return Err(HardsubError::InvalidOption("Font size must be positive".to_string()));
        }
        Ok(())
    }

    fn font_enabled(&self) -> bool {
        self.font_name.is_some() || self.font_size.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.font_enabled() && self.primary_color.is_none() && self.border_style.is_none()
    }

    /// Render the comma separated `force_style` directive list
    pub fn render(&self) -> String {
        if self.is_empty() {
            return format!("FontSize={},BorderStyle=3,Outline=2", Self::DEFAULT_FONT_SIZE);
        }

        let mut parts = Vec::new();

        if self.font_enabled() {
            parts.push(format!("FontSize={}", self.font_size.unwrap_or(Self::DEFAULT_FONT_SIZE)));
            parts.push(format!(
                "FontName={}",
                self.font_name.as_deref().unwrap_or(Self::DEFAULT_FONT_NAME)
            ));
        }

        if let Some(color) = self.primary_color {
            parts.push(format!("PrimaryColour={}", color.to_ass()));
        }

        if let Some(border) = self.border_style {
            parts.push(format!("BorderStyle={}", border.ass_value()));
            parts.push("Outline=2".to_string());
            parts.push("Shadow=1".to_string());
        }

        parts.join(",")
    }
}

/// Where finished outputs are written
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputLocation {
    #[default]
    SameAsSource,
    Directory(PathBuf),
}

impl OutputLocation {
    pub fn from_option(dir: Option<PathBuf>) -> Self {
        dir.map(OutputLocation::Directory).unwrap_or_default()
    }
}

/// Immutable option bundle for one batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeOptions {
    pub preset: SpeedPreset,
    pub crf: Option<Crf>,
    pub style: SubtitleStyle,
    pub output: OutputLocation,
    pub output_extension: String,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            preset: SpeedPreset::default(),
            crf: None,
            style: SubtitleStyle::default(),
            output: OutputLocation::default(),
            output_extension: "mp4".to_string(),
        }
    }
}
