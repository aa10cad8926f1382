//! Kao - manga and webtoon chapter downloader.
//!
//! This library provides functionality for:
//! - Recognizing series and chapter links of supported sites (and local folders)
//! - Downloading, validating and repairing chapter page images
//! - Tracking completed chapters so reruns skip them
//! - Packaging chapters into PDF, zip or cbz artifacts

pub mod collect;
pub mod completion;
pub mod config;
pub mod console;
pub mod dispatcher;
pub mod error;
pub mod fetcher;
pub mod imaging;
pub mod logging;
pub mod model;
pub mod naming;
pub mod packager;
pub mod pipeline;
pub mod sources;
pub mod utils;

// Re-export commonly used types
pub use completion::CompletionRecord;
pub use config::Config;
pub use console::Console;
pub use dispatcher::{Dispatcher, Resolution, RunSummary, WorkItem, resolve};
pub use error::{ChapterError, ConfigError, FetchError, ImageError, PackageError, ScraperError};
pub use fetcher::{Fetcher, ImageOrigin};
pub use logging::{FileSink, Level, LogSink, MemorySink, MultiSink};
pub use model::{Chapter, Layout, Series};
pub use packager::{ArtifactFormat, Packager};
pub use pipeline::{ChapterFailure, ChapterOutcome, Pipeline, SeriesReport};
pub use sources::{LinkKind, SourceAdapter, SourceRegistry};
