//! Hardsub - Batch Subtitle Burn-in
//!
//! Command line front end: scans a folder, pairs videos with subtitles and
//! drives the batch runner, rendering its events as a progress bar or JSON.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::BufRead;
use std::path::Path;
use std::time::Duration;
use tracing::{Level, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use hardsub::cli::{Args, Commands, ConfigAction, RunArgs, SourceArgs, parse_pair};
use hardsub::config::{Config, DEFAULT_CONFIG_FILE};
use hardsub::error::HardsubError;
use hardsub::matcher::Matcher;
use hardsub::media::MediaToolkitFactory;
use hardsub::options::OutputLocation;
use hardsub::pairing::{CaptionFile, Pairing, Status};
use hardsub::progress::format_eta;
use hardsub::runner::{BatchControl, BatchEvent, BatchReport, JobRunner};
use hardsub::scan::Scanner;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Console and file logging; the guard flushes the file writer on exit
    let _log_guard = setup_logging(args.verbose)?;

    let mut config = Config::load(args.config.as_deref())?;

    match args.command {
        Commands::Check => {
            let toolkit = MediaToolkitFactory::create_toolkit(config.toolchain.clone());
            toolkit.check_availability().await?;
            println!("{}", toolkit.version_info().await?);
            println!("ffprobe: {}", config.toolchain.ffprobe_path);
            println!("Toolchain OK");
        }
        Commands::Match {
            name,
            candidates,
            threshold,
        } => {
            let matcher = Matcher::new(threshold.unwrap_or(config.matching.threshold));
            match matcher.best_match(&name, &candidates) {
                Some(result) => println!("{} (score {:.3})", candidates[result.index], result.score),
                None => println!("no match"),
            }
        }
        Commands::Scan(source) => {
            let pairings = collect_pairings(&config, &source)?;
            print_pairings(&pairings);
        }
        Commands::Run(run) => {
            run_batch(&mut config, args.config.as_deref(), run).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                print!("{}", config.to_toml()?);
            }
            ConfigAction::Init { path, force } => {
                if path.exists() && !force {
                    anyhow::bail!("{} already exists, use --force to overwrite", path.display());
                }
                Config::default().save_to_file(&path)?;
                println!("Wrote default configuration to {}", path.display());
            }
        },
    }

    Ok(())
}

async fn run_batch(config: &mut Config, config_path: Option<&Path>, run: RunArgs) -> Result<()> {
    let mut pairings = collect_pairings(config, &run.source)?;
    apply_overrides(&mut pairings, &run.pairs, &run.excludes)?;

    // Flags override the configured encode defaults
    let encode = &mut config.encode;
    if let Some(preset) = run.preset {
        encode.preset = preset;
    }
    if run.crf.is_some() {
        encode.crf = run.crf;
    }
    if run.font_name.is_some() {
        encode.style.font_name = run.font_name.clone();
    }
    if run.font_size.is_some() {
        encode.style.font_size = run.font_size;
    }
    if run.color.is_some() {
        encode.style.primary_color = run.color;
    }
    if run.border_style.is_some() {
        encode.style.border_style = run.border_style;
    }
    let options = encode.to_options(OutputLocation::from_option(run.output_dir.clone()));

    if run.remember {
        let path = config_path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
        config.save_to_file(path)?;
        info!("Saved encode settings to {}", path.display());
    }

    if !run.json {
        print_pairings(&pairings);
        println!(
            "\nPreset: {}, CRF: {}, style: {}",
            options.preset,
            options
                .crf
                .map(|c| format!("{} ({})", c.value(), c.describe()))
                .unwrap_or_else(|| "encoder default".to_string()),
            options.style.render()
        );
    }

    let toolkit = MediaToolkitFactory::create_toolkit(config.toolchain.clone());
    let runner = JobRunner::new(toolkit);
    let mut handle = runner.start(&pairings, options).await?;
    info!("Batch {} running", handle.batch_id());

    spawn_keyboard_listener(handle.control(), run.json);

    let mut renderer = if run.json { None } else { Some(ConsoleRenderer::new()) };
    let mut cancel_sent = false;

    loop {
        tokio::select! {
            event = handle.next_event() => {
                let Some(event) = event else { break };
                match renderer.as_mut() {
                    Some(renderer) => renderer.render(&event),
                    None => println!("{}", serde_json::to_string(&event)?),
                }
            }
            _ = tokio::signal::ctrl_c(), if !cancel_sent => {
                warn!("Interrupted, cancelling batch");
                handle.cancel();
                cancel_sent = true;
            }
        }
    }

    if let Some(renderer) = renderer {
        renderer.finish();
    }

    let report = handle.finish().await?;
    if !run.json {
        print_summary(&report);
    }
    Ok(())
}

/// Folder scan first, then videos added by hand; a video already present is
/// not added twice
fn collect_pairings(config: &Config, source: &SourceArgs) -> Result<Vec<Pairing>> {
    let mut scanner = Scanner::new(&config.matching);
    if let Some(threshold) = source.threshold {
        scanner = scanner.with_threshold(threshold);
    }

    let mut pairings = match &source.input_dir {
        Some(dir) => scanner.scan(dir, source.subtitle_dir.as_deref())?,
        None => Vec::new(),
    };

    for video in &source.add {
        if pairings.iter().any(|p| p.media.path() == video.as_path()) {
            warn!("{} is already in the batch", video.display());
            continue;
        }
        let pairing = scanner.pair_file(video)?;
        info!("Added {}", pairing.media.file_name());
        pairings.push(pairing);
    }

    Ok(pairings)
}

/// Apply `--pair VIDEO=SUBTITLE` and `--exclude VIDEO` to scanned pairings
fn apply_overrides(pairings: &mut [Pairing], pairs: &[String], excludes: &[String]) -> Result<()> {
    for pair in pairs {
        let (video, subtitle) = parse_pair(pair)
            .ok_or_else(|| HardsubError::InvalidOption(format!("Expected VIDEO=SUBTITLE, got '{}'", pair)))?;

        if !subtitle.is_file() {
            return Err(HardsubError::FileNotFound(subtitle.display().to_string()).into());
        }

        let pairing = pairings
            .iter_mut()
            .find(|p| p.media.file_name() == video)
            .with_context(|| format!("No video named '{}' in the batch", video))?;
        info!("Manual pairing: {} -> {}", video, subtitle.display());
        pairing.assign_caption(CaptionFile::new(subtitle));
    }

    for video in excludes {
        match pairings.iter_mut().find(|p| &p.media.file_name() == video) {
            Some(pairing) => pairing.selected = false,
            None => warn!("Cannot exclude '{}': no such video", video),
        }
    }

    Ok(())
}

/// `s` + Enter skips the current video, `q` + Enter cancels the batch.
///
/// Runs on a plain thread so a blocked stdin read never holds up shutdown.
fn spawn_keyboard_listener(control: BatchControl, quiet: bool) {
    if !quiet {
        println!("\nType 's' + Enter to skip the current video, 'q' + Enter to cancel\n");
    }

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match line.trim() {
                "s" => control.skip(),
                "q" => {
                    control.cancel();
                    break;
                }
                _ => {}
            }
        }
    });
}

struct ConsoleRenderer {
    bar: ProgressBar,
    position: usize,
    total: usize,
}

impl ConsoleRenderer {
    fn new() -> Self {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template("{prefix} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(250));

        Self {
            bar,
            position: 0,
            total: 0,
        }
    }

    fn render(&mut self, event: &BatchEvent) {
        match event {
            BatchEvent::Started { total, .. } => {
                self.total = *total;
            }
            BatchEvent::ItemStarted { media, .. } => {
                self.position += 1;
                let name = media
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.bar.set_prefix(format!("[{}/{}] {}", self.position, self.total, name));
                self.bar.set_position(0);
                self.bar.set_message("");
            }
            BatchEvent::Progress {
                percent,
                eta_secs,
                output_bytes,
                ..
            } => {
                self.bar.set_position(u64::from(*percent));
                let eta = eta_secs
                    .map(|s| format!("ETA {}", format_eta(Duration::from_secs(s))))
                    .unwrap_or_else(|| "ETA --".to_string());
                let size = output_bytes
                    .map(|b| format!(", {:.1} MB written", b as f64 / 1024.0 / 1024.0))
                    .unwrap_or_default();
                self.bar.set_message(format!("{}{}", eta, size));
            }
            BatchEvent::ItemDone { status, .. } => {
                let label = self.bar.prefix();
                self.bar.println(format!("{} {}", label, status));
            }
            BatchEvent::BatchDone { .. } | BatchEvent::Cancelled { .. } => {}
        }
    }

    fn finish(self) {
        self.bar.finish_and_clear();
    }
}

fn print_pairings(pairings: &[Pairing]) {
    println!("\nPairings:");
    println!("{:<4} {:<40} {:<40} {:<10} {:<8}", "#", "Video", "Subtitle", "Size (MB)", "Run");
    println!("{}", "-".repeat(106));

    for (index, pairing) in pairings.iter().enumerate() {
        let caption = pairing
            .caption
            .as_ref()
            .map(|c| c.file_name())
            .unwrap_or_else(|| "-".to_string());
        let size = pairing
            .media
            .size()
            .map(|b| format!("{:.1}", b as f64 / 1024.0 / 1024.0))
            .unwrap_or_else(|| "?".to_string());
        let run = if pairing.is_runnable() {
            "yes"
        } else if pairing.status() == &Status::NoCaption {
            "no sub"
        } else {
            "excluded"
        };

        println!(
            "{:<4} {:<40} {:<40} {:<10} {:<8}",
            index + 1,
            pairing.media.file_name(),
            caption,
            size,
            run
        );
    }
}

fn print_summary(report: &BatchReport) {
    let elapsed = (report.finished_at - report.started_at).num_seconds().max(0) as u64;

    if report.cancelled {
        println!("\nBatch cancelled");
    } else {
        println!("\nBatch complete");
    }
    println!("Succeeded: {}/{}", report.succeeded, report.total);
    println!("Elapsed: {}", format_eta(Duration::from_secs(elapsed)));

    for pairing in &report.pairings {
        if let Status::Failed { reason } = pairing.status() {
            println!("  {} failed: {}", pairing.media.file_name(), reason);
        }
    }
}

fn setup_logging(verbose: bool) -> Result<WorkerGuard> {
    let log_dir = std::env::current_dir()?.join(".hardsub").join("log");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, "hardsub.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Console output goes to stderr so `--json` stdout stays machine readable
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("hardsub.log").display()
    );

    Ok(guard)
}
