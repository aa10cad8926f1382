//! Leveled, tagged log sinks.
//!
//! Components never reach for an ambient logger; they receive a
//! `&dyn LogSink` and write `LEVEL [tag] message` events to it. The binary
//! fans those out to the console and the run log file with a [`MultiSink`].
//! Low-level HTTP diagnostics go through `tracing` instead.

use anyhow::Context as _;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination for run events.
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, tag: &str, message: &str);

    fn debug(&self, tag: &str, message: &str) {
        self.log(Level::Debug, tag, message);
    }

    fn info(&self, tag: &str, message: &str) {
        self.log(Level::Info, tag, message);
    }

    fn warn(&self, tag: &str, message: &str) {
        self.log(Level::Warn, tag, message);
    }

    fn error(&self, tag: &str, message: &str) {
        self.log(Level::Error, tag, message);
    }
}

/// Formats one event as a log line (without the trailing newline).
pub fn format_line(level: Level, tag: &str, message: &str) -> String {
    format!("{} [{}] {}", level, tag, message)
}

/// Append-only run log.
///
/// The file is truncated when the sink is opened, so it always holds the
/// events of the latest run.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
    min_level: Level,
}

impl FileSink {
    pub fn create(path: &Path, verbose: bool) -> std::io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            min_level: if verbose { Level::Debug } else { Level::Info },
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn log(&self, level: Level, tag: &str, message: &str) {
        if level < self.min_level {
            return;
        }
        if let Ok(mut file) = self.file.lock() {
            // A failing log write must not take the run down with it.
            let _ = writeln!(file, "{}", format_line(level, tag, message));
        }
    }
}

/// Fans every event out to several sinks.
#[derive(Default, Clone)]
pub struct MultiSink {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl LogSink for MultiSink {
    fn log(&self, level: Level, tag: &str, message: &str) {
        for sink in &self.sinks {
            sink.log(level, tag, message);
        }
    }
}

/// Keeps events in memory. Useful for asserting on what a run reported.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<(Level, String, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events.
    pub fn events(&self) -> Vec<(Level, String, String)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Messages recorded at `level`.
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|(l, _, _)| *l == level)
            .map(|(_, _, message)| message)
            .collect()
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: Level, tag: &str, message: &str) {
        if let Ok(mut events) = self.events.lock() {
            events.push((level, tag.to_string(), message.to_string()));
        }
    }
}

/// Installs the `tracing` subscriber used for HTTP diagnostics.
///
/// Defaults to `warn`; `RUST_LOG` overrides it.
pub fn init_tracing() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("warn"))
        .context("build log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}
