//! Shared logging utilities for Tagwatch binaries.
//!
//! Logs go to two sinks: a size-rotated file under `<home>/logs` and stderr.
//! The file sink always records at the configured filter level; stderr only
//! shows warnings unless the caller asked for verbose output.
//!
//! File writes happen on a `tracing-appender` worker thread. Keep the returned
//! [`WorkerGuard`] alive for the life of the process; dropping it flushes
//! whatever is still queued.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use tracing_appender::non_blocking::WorkerGuard;

const DEFAULT_LOG_FILTER: &str = "tagwatch=info,tagwatch_db=info";

/// How many log files are kept and how large each may grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Files kept, the live one included
    pub max_files: usize,
    pub max_file_bytes: u64,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_files: 5,
            max_file_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Logging configuration shared by Tagwatch binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
    pub rotation: RotationPolicy,
}

/// Initialize tracing with a rotating file sink and stderr output.
pub fn init_logging(config: LogConfig<'_>) -> Result<WorkerGuard> {
    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
    let log_file = LogFile::open(&log_dir, config.app_name, config.rotation)
        .with_context(|| format!("Failed to open log file for {}", config.app_name))?;
    let (file_writer, guard) = tracing_appender::non_blocking(log_file);

    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let console_filter = if config.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(guard)
}

/// Get the Tagwatch home directory: `$TAGWATCH_HOME` or `~/.tagwatch`
pub fn tagwatch_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("TAGWATCH_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tagwatch")
}

/// Get the logs directory: `<home>/logs`
pub fn logs_dir() -> PathBuf {
    tagwatch_home().join("logs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// `<app>.log` plus older generations `<app>.log.1` (newest) to `<app>.log.N`.
struct LogFile {
    stem: PathBuf,
    policy: RotationPolicy,
    file: File,
    written: u64,
}

impl LogFile {
    fn open(dir: &Path, app_name: &str, policy: RotationPolicy) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let policy = RotationPolicy {
            max_files: policy.max_files.max(1),
            ..policy
        };
        let stem = dir.join(format!("{}.log", file_stem(app_name)));
        let (file, written) = open_append(&stem)?;

        let mut log = Self {
            stem,
            policy,
            file,
            written,
        };
        if log.written > log.policy.max_file_bytes {
            log.roll()?;
        }
        Ok(log)
    }

    /// Generation 0 is the live file.
    fn generation(&self, n: usize) -> PathBuf {
        if n == 0 {
            return self.stem.clone();
        }
        let mut name = self.stem.clone().into_os_string();
        name.push(format!(".{}", n));
        PathBuf::from(name)
    }

    fn roll(&mut self) -> io::Result<()> {
        self.file.flush()?;

        let oldest = self.policy.max_files - 1;
        discard(&self.generation(oldest))?;
        for n in (0..oldest).rev() {
            let from = self.generation(n);
            if from.exists() {
                fs::rename(&from, self.generation(n + 1))?;
            }
        }

        let (file, written) = open_append(&self.stem)?;
        self.file = file;
        self.written = written;
        Ok(())
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.policy.max_file_bytes {
            self.roll()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<(File, u64)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let len = file.metadata()?.len();
    Ok((file, len))
}

fn discard(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Keep only characters that are safe in a file name.
fn file_stem(app_name: &str) -> String {
    app_name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}
