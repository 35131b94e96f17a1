use std::time::{Duration, Instant};

/// Highest percent reported while the encoder is still running. The tool can
/// keep finalizing the container after its last reported timestamp.
pub const MAX_RUNNING_PERCENT: u8 = 99;

const TIME_MARKER: &str = "time=";

/// Extract the elapsed output time from an encoder status line such as
/// `frame=  240 fps= 60 q=28.0 size=  512kB time=00:00:10.01 bitrate=...`.
///
/// Returns `None` for lines without a marker, for `time=N/A`, and for the
/// negative timestamps the encoder prints before the first frame.
pub fn parse_elapsed(line: &str) -> Option<f64> {
    let idx = line.find(TIME_MARKER)?;
    let rest = &line[idx + TIME_MARKER.len()..];
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let stamp = &rest[..end];

    let mut parts = stamp.split(':');
    let hours = parse_field(parts.next()?)?;
    let minutes = parse_field(parts.next()?)?;
    let seconds = parse_field(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }

    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn parse_field(field: &str) -> Option<f64> {
    if field.is_empty() || !field.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    field.parse().ok()
}

/// Completion percent of one encode, capped below 100 until the process exits
pub fn percent_complete(elapsed: f64, duration: f64) -> u8 {
    if duration <= 0.0 || !elapsed.is_finite() {
        return 0;
    }

    let percent = (100.0 * elapsed / duration).floor().clamp(0.0, MAX_RUNNING_PERCENT as f64);
    percent as u8
}

/// Batch ETA from wall clock time and fractional completed items
#[derive(Debug, Clone)]
pub struct EtaEstimator {
    started: Instant,
    total: usize,
    finished: usize,
}

impl EtaEstimator {
    pub fn new(total: usize) -> Self {
        Self::starting_at(Instant::now(), total)
    }

    pub fn starting_at(started: Instant, total: usize) -> Self {
        Self {
            started,
            total,
            finished: 0,
        }
    }

    /// Record one item reaching a terminal status
    pub fn item_finished(&mut self) {
        self.finished = (self.finished + 1).min(self.total);
    }

    pub fn finished(&self) -> usize {
        self.finished
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Remaining time given the current item's percent; `None` until any
    /// progress has been made.
    pub fn estimate(&self, current_percent: u8) -> Option<Duration> {
        self.estimate_at(self.elapsed(), current_percent)
    }

    fn estimate_at(&self, elapsed: Duration, current_percent: u8) -> Option<Duration> {
        let completed = self.finished as f64 + current_percent as f64 / 100.0;
        if completed <= 0.0 {
            return None;
        }

        let per_item = elapsed.as_secs_f64() / completed;
        let remaining = (self.total as f64 - completed).max(0.0);
        Some(Duration::from_secs_f64(per_item * remaining))
    }
}

/// Format seconds as `1h 02m`, `3m 04s` or `12s`
pub fn format_eta(eta: Duration) -> String {
    let seconds = eta.as_secs();
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {:02}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {:02}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
