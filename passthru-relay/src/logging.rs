//! Logging setup.
//!
//! Logs go to stderr, or to a size-rotated file when one is configured:
//! once the file passes `max_bytes` it becomes `<file>.1`, the previous
//! `<file>.1` becomes `<file>.2`, and so on up to `keep_files` generations.

use crate::config::LoggingConfig;
use anyhow::Context;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .context("invalid log filter")?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match &config.file {
        Some(path) => {
            let file = RotatingFile::open(path, config.max_bytes, config.keep_files)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(io::stderr).try_init(),
    };

    installed.map_err(|e| anyhow::anyhow!(e))
}

/// Append-only log file rotated by size.
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    keep_files: usize,
    file: Option<File>,
}

impl RotatingFile {
    /// Open (or create) the log file at `path`.
    pub fn open(path: impl AsRef<Path>, max_bytes: u64, keep_files: usize) -> io::Result<Self> {
        let mut rotating = Self {
            path: path.as_ref().to_path_buf(),
            max_bytes,
            keep_files,
            file: None,
        };
        rotating.current()?;
        Ok(rotating)
    }

    /// Path of rotated generation `n` (1 is the most recent).
    pub fn generation(&self, n: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn open_base(&self) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
    }

    /// The file to write to, rotating first if it grew past the limit.
    fn current(&mut self) -> io::Result<&mut File> {
        let full = match &self.file {
            Some(file) => file.metadata()?.len() > self.max_bytes,
            None => false,
        };
        if full {
            self.file = None;
            self.rotate()?;
        }

        let file = match self.file.take() {
            Some(file) => file,
            None => self.open_base()?,
        };
        Ok(self.file.insert(file))
    }

    fn rotate(&self) -> io::Result<()> {
        if self.keep_files == 0 {
            return fs::remove_file(&self.path);
        }

        for n in (1..=self.keep_files).rev() {
            let older = if n == 1 {
                self.path.clone()
            } else {
                self.generation(n - 1)
            };
            if older.exists() {
                fs::rename(&older, self.generation(n))?;
            }
        }
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.current()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}
