// Subtitle-to-video filename matching
//
// Scores are gestalt pattern matching ratios (Ratcliff/Obershelp): the longest
// common substring is taken, then the same search recurses on the pieces to its
// left and right. The ratio is 2*M / (|a| + |b|) where M is the total length of
// all matched blocks. Comparisons are case-insensitive and use the candidate's
// file stem.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default minimum similarity a candidate has to exceed
pub const DEFAULT_THRESHOLD: f64 = 0.4;

/// Winning candidate of a match
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Index into the candidate list
    pub index: usize,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matcher {
    threshold: f64,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl Matcher {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Score every candidate against the media base name and return the first
    /// candidate holding the best score above the threshold.
    pub fn best_match<S: AsRef<str>>(&self, media_base_name: &str, candidates: &[S]) -> Option<MatchResult> {
        let media = media_base_name.to_lowercase();
        let mut best: Option<MatchResult> = None;

        for (index, candidate) in candidates.iter().enumerate() {
            let stem = file_stem(candidate.as_ref()).to_lowercase();
            let score = similarity(&media, &stem);

            let running_best = best.map(|m| m.score).unwrap_or(f64::NEG_INFINITY);
            if score > running_best && score > self.threshold {
                best = Some(MatchResult { index, score });
            }
        }

        best
    }

    /// Convenience wrapper returning the matched candidate itself
    pub fn find<'a, S: AsRef<str>>(&self, media_base_name: &str, candidates: &'a [S]) -> Option<&'a S> {
        self.best_match(media_base_name, candidates)
            .map(|m| &candidates[m.index])
    }
}

/// `match` operation with the default threshold
pub fn find_caption<'a, S: AsRef<str>>(media_base_name: &str, candidates: &'a [S]) -> Option<&'a S> {
    Matcher::default().find(media_base_name, candidates)
}

fn file_stem(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
}

/// Similarity ratio in [0, 1]; two empty strings are identical
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    2.0 * matched_len(&a, &b) as f64 / total as f64
}

fn matched_len(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, k) = longest_common_block(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }

        matched += k;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            pending.push((i + k, ahi, j + k, bhi));
        }
    }

    matched
}

/// Longest block with `a[i..i+k] == b[j..j+k]` inside the given windows.
/// Ties go to the block starting earliest in `a`, then earliest in `b`.
fn longest_common_block(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let width = bhi - blo;
    let mut best = (alo, blo, 0);
    let mut prev = vec![0usize; width + 1];
    let mut curr = vec![0usize; width + 1];

    for i in alo..ahi {
        for j in blo..bhi {
            let col = j - blo;
            curr[col + 1] = if a[i] == b[j] { prev[col] + 1 } else { 0 };

            let k = curr[col + 1];
            if k > best.2 {
                best = (i + 1 - k, j + 1 - k, k);
            }
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    best
}
