//! Error types for kao.
//!
//! Uses `thiserror` for structured error definitions that provide
//! clear context about what went wrong.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for source adapter operations.
#[derive(Error, Debug)]
pub enum ScraperError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// Failed to parse page content
    #[error("Failed to parse page: {0}")]
    ParseError(String),

    /// The required element isn't found in HTML
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// URL parsing or validation failed
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Reading a local source failed
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error type for image inspection and repair.
#[derive(Error, Debug)]
pub enum ImageError {
    /// Bytes are not a decodable raster image
    #[error("Undecodable image: {0}")]
    Decode(#[source] image::ImageError),

    /// Bytes don't start with any known image signature
    #[error("Unrecognized image format")]
    UnknownFormat,

    /// Re-encoding a repaired image failed
    #[error("Failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
}

/// Error type for persisting fetched images.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Writing an image into the chapter directory failed
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error type for one chapter attempt.
#[derive(Error, Debug)]
pub enum ChapterError {
    /// The chapter working directory could not be created or cleared
    #[error("Failed to prepare chapter directory {path}: {source}")]
    Setup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source adapter failed
    #[error(transparent)]
    Source(#[from] ScraperError),

    /// Persisting images failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The page listed no images, or none of them could be stored
    #[error("No images could be saved from {0}")]
    NoImages(String),

    /// Reading or appending the completion record failed
    #[error("Completion record {path}: {source}")]
    Record {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error type for artifact assembly.
#[derive(Error, Debug)]
pub enum PackageError {
    /// Filesystem operation failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The chapter directory holds no image files
    #[error("No images found in {0}")]
    NoImages(PathBuf),

    /// Building or serializing the PDF document failed
    #[error("PDF error: {0}")]
    Pdf(String),

    /// Writing the archive failed
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Re-encoding a page failed
    #[error(transparent)]
    Image(#[from] ImageError),
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}
