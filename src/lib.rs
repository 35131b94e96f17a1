//! Hardsub - Batch Subtitle Burn-in
//!
//! Pairs video files with their subtitle files by fuzzy file name matching and
//! burns the subtitles into new videos with ffmpeg, one encode at a time, with
//! progress, ETA, skip and cancel.

pub mod cli;
pub mod config;
pub mod error;
pub mod matcher;
pub mod media;
pub mod options;
pub mod pairing;
pub mod progress;
pub mod runner;
pub mod scan;
