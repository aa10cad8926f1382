//! Image fetching and persistence for one chapter.
//!
//! Every URL is fetched (over HTTP for web sources, from disk for local
//! ones), validated and written as `<stem>.<ext>`, where the stem is the
//! URL's zero-padded position. Pages are fetched concurrently up to the
//! worker limit but handled strictly in URL order.
//!
//! Pages replaced by the placeholder are listed in
//! [`PLACEHOLDER_PAGES_FILE`] so the packager can mark the artifact.

use crate::config::ImageBoundsConfig;
use crate::error::FetchError;
use crate::imaging::{self, StoredImage};
use crate::logging::LogSink;
use crate::model::PLACEHOLDER_PAGES_FILE;
use crate::naming::page_stem;
use futures::stream::{self, StreamExt};
use image::ImageFormat;
use reqwest::header::{COOKIE, REFERER};
use std::path::Path;
use thiserror::Error;

const TAG: &str = "Fetcher";

/// Bodies this short are checked for error pages served with status 200.
const FAKE_BODY_MAX_LEN: usize = 4096;

/// Where the image URLs of a chapter point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOrigin<'a> {
    /// `http(s)` URLs, requested with the source's referer and cookies.
    Web {
        referer: &'a str,
        cookies: Option<&'a str>,
    },
    /// Paths of files on the local disk.
    Disk,
}

/// Why a page was not retrieved.
#[derive(Error, Debug)]
enum PageError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("server returned an error page instead of an image")]
    FakeBody,

    #[error("not an http(s) URL")]
    NotHttp,

    #[error("read failed: {0}")]
    Read(#[from] std::io::Error),
}

/// What to do with a retrieved payload.
enum Page {
    Store(StoredImage),
    /// Undecodable payload, replaced by the placeholder.
    Corrupt(StoredImage),
    /// Dimensions outside the accepted bounds.
    OutOfBounds { width: u32, height: u32 },
}

/// Downloads and stores chapter images.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    workers: usize,
    bounds: ImageBoundsConfig,
}

impl Fetcher {
    pub fn new(client: reqwest::Client, workers: usize, bounds: ImageBoundsConfig) -> Self {
        Self {
            client,
            workers: workers.max(1),
            bounds,
        }
    }

    /// Fetches `urls` into `dest_dir` and returns how many images were written.
    ///
    /// Failed requests and out-of-bounds images are skipped; their position
    /// is left unused so the remaining names still follow URL order.
    pub async fn fetch_chapter_images(
        &self,
        urls: &[String],
        dest_dir: &Path,
        origin: ImageOrigin<'_>,
        log: &dyn LogSink,
    ) -> Result<usize, FetchError> {
        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|source| FetchError::Write {
                path: dest_dir.to_path_buf(),
                source,
            })?;

        let total = urls.len();
        let mut pages = stream::iter(urls.iter().enumerate())
            .map(|(index, url)| async move { (index, url, self.retrieve(url, origin).await) })
            .buffered(self.workers);

        let mut saved = 0;
        let mut placeholders = Vec::new();
        while let Some((index, url, result)) = pages.next().await {
            let stem = page_stem(index + 1, total);

            let bytes = match result {
                Ok(bytes) => bytes,
                Err(e) => {
                    log.warn(TAG, &format!("Page {} skipped ({}): {}", stem, url, e));
                    continue;
                }
            };

            let (stored, corrupt) = match self.classify(&bytes) {
                Page::Store(stored) => (stored, false),
                Page::Corrupt(stored) => {
                    log.warn(
                        TAG,
                        &format!("Page {} is corrupted, using placeholder ({})", stem, url),
                    );
                    (stored, true)
                }
                Page::OutOfBounds { width, height } => {
                    log.warn(
                        TAG,
                        &format!("Page {} dropped, {}x{} is out of bounds ({})", stem, width, height, url),
                    );
                    continue;
                }
            };

            let file_name = format!("{}.{}", stem, stored.extension());
            let path = dest_dir.join(&file_name);
            write(&path, &stored.bytes).await?;

            log.debug(TAG, &format!("Saved {}", path.display()));
            if corrupt {
                placeholders.push(file_name);
            }
            saved += 1;
        }

        if !placeholders.is_empty() {
            let mut listing = placeholders.join("\n");
            listing.push('\n');
            write(&dest_dir.join(PLACEHOLDER_PAGES_FILE), listing.as_bytes()).await?;
        }

        Ok(saved)
    }

    async fn retrieve(&self, url: &str, origin: ImageOrigin<'_>) -> Result<Vec<u8>, PageError> {
        let (referer, cookies) = match origin {
            ImageOrigin::Disk => return Ok(tokio::fs::read(url).await?),
            ImageOrigin::Web { referer, cookies } => (referer, cookies),
        };
        if !is_http(url) {
            return Err(PageError::NotHttp);
        }

        let mut request = self.client.get(url);
        if !referer.is_empty() {
            request = request.header(REFERER, referer);
        }
        if let Some(cookies) = cookies {
            request = request.header(COOKIE, cookies);
        }

        let response = request.send().await?;
        let status = response.status();
        tracing::debug!(url, %status, "image response");
        if !status.is_success() {
            return Err(PageError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        if is_fake_payload(&bytes) {
            return Err(PageError::FakeBody);
        }

        Ok(bytes.to_vec())
    }

    fn classify(&self, bytes: &[u8]) -> Page {
        let info = match imaging::probe(bytes) {
            Ok(info) => info,
            Err(_) => return Page::Corrupt(placeholder()),
        };

        if !info.fits(&self.bounds) {
            return Page::OutOfBounds {
                width: info.width,
                height: info.height,
            };
        }

        match imaging::decode(bytes).and_then(|decoded| imaging::coerce_to_opaque(bytes, &decoded)) {
            Ok(stored) => Page::Store(stored),
            Err(_) => Page::Corrupt(placeholder()),
        }
    }
}

async fn write(path: &Path, bytes: &[u8]) -> Result<(), FetchError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| FetchError::Write {
            path: path.to_path_buf(),
            source,
        })
}

fn placeholder() -> StoredImage {
    StoredImage {
        bytes: imaging::placeholder().to_vec(),
        format: ImageFormat::Jpeg,
    }
}

fn is_http(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Some hosts answer 200 with a text body instead of the image.
fn is_fake_payload(bytes: &[u8]) -> bool {
    if bytes.trim_ascii() == b"OK" {
        return true;
    }
    bytes.len() <= FAKE_BODY_MAX_LEN && bytes.windows(11).any(|w| w == b"Bad Request")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::tests::{png, rgba_png};
    use crate::logging::{Level, MemorySink};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn fetcher() -> Fetcher {
        Fetcher::new(reqwest::Client::new(), 3, ImageBoundsConfig::default())
    }

    fn write_sources(dir: &Path, payloads: &[Vec<u8>]) -> Vec<String> {
        let src = dir.join("src");
        std::fs::create_dir_all(&src).unwrap();
        payloads
            .iter()
            .enumerate()
            .map(|(i, bytes)| {
                let path = src.join(format!("page-{}.bin", i));
                std::fs::write(&path, bytes).unwrap();
                path.to_string_lossy().into_owned()
            })
            .collect()
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_fake_payloads() {
        assert!(is_fake_payload(b"OK"));
        assert!(is_fake_payload(b"<html>400 Bad Request</html>"));
        assert!(!is_fake_payload(&png(12, 12)));
    }

    #[tokio::test]
    async fn test_names_follow_url_order() {
        let dir = TempDir::new().unwrap();
        let payloads: Vec<Vec<u8>> = (0..3).map(|i| png(20 + i, 20)).collect();
        let urls = write_sources(dir.path(), &payloads);
        let dest = dir.path().join("chapter");
        let log = MemorySink::new();

        let saved = fetcher()
            .fetch_chapter_images(&urls, &dest, ImageOrigin::Disk, &log)
            .await
            .unwrap();

        assert_eq!(saved, 3);
        assert_eq!(names(&dest), vec!["1.png", "2.png", "3.png"]);
        assert!(!dest.join(PLACEHOLDER_PAGES_FILE).exists());
        for (i, name) in names(&dest).iter().enumerate() {
            let info = imaging::inspect(&std::fs::read(dest.join(name)).unwrap()).unwrap();
            assert_eq!(info.width, 20 + i as u32);
        }
    }

    #[tokio::test]
    async fn test_width_grows_with_page_count() {
        let dir = TempDir::new().unwrap();
        let payloads: Vec<Vec<u8>> = (0..12).map(|_| png(16, 16)).collect();
        let urls = write_sources(dir.path(), &payloads);
        let dest = dir.path().join("chapter");

        fetcher()
            .fetch_chapter_images(&urls, &dest, ImageOrigin::Disk, &MemorySink::new())
            .await
            .unwrap();

        let expected: Vec<String> = (1..=12).map(|i| format!("{:02}.png", i)).collect();
        assert_eq!(names(&dest), expected);
    }

    #[tokio::test]
    async fn test_skips_and_repairs() {
        let dir = TempDir::new().unwrap();
        let payloads = vec![
            png(40, 40),
            png(4, 40),
            b"not an image at all".to_vec(),
            rgba_png(30, 30),
        ];
        let mut urls = write_sources(dir.path(), &payloads);
        urls.push(dir.path().join("missing.png").to_string_lossy().into_owned());
        let dest = dir.path().join("chapter");
        let log = MemorySink::new();

        let saved = fetcher()
            .fetch_chapter_images(&urls, &dest, ImageOrigin::Disk, &log)
            .await
            .unwrap();

        assert_eq!(saved, 3);
        assert_eq!(
            names(&dest),
            vec![PLACEHOLDER_PAGES_FILE, "1.png", "3.jpg", "4.png"]
        );
        assert_eq!(std::fs::read(dest.join("3.jpg")).unwrap(), imaging::placeholder());
        assert_eq!(
            std::fs::read_to_string(dest.join(PLACEHOLDER_PAGES_FILE)).unwrap(),
            "3.jpg\n"
        );
        assert_eq!(log.messages(Level::Warn).len(), 3);

        let bounds = ImageBoundsConfig::default();
        for name in ["1.png", "3.jpg", "4.png"] {
            let info = imaging::inspect(&std::fs::read(dest.join(&name)).unwrap()).unwrap();
            assert!(info.fits(&bounds), "{} out of bounds", name);
            assert!(!info.has_alpha(), "{} has alpha", name);
        }
    }

    #[tokio::test]
    async fn test_web_origin_never_reads_disk() {
        let dir = TempDir::new().unwrap();
        let urls = write_sources(dir.path(), &[png(20, 20)]);
        let dest = dir.path().join("chapter");
        let log = MemorySink::new();
        let origin = ImageOrigin::Web {
            referer: "https://example.com",
            cookies: None,
        };

        let saved = fetcher()
            .fetch_chapter_images(&urls, &dest, origin, &log)
            .await
            .unwrap();

        assert_eq!(saved, 0);
        assert!(names(&dest).is_empty());
        assert!(log.messages(Level::Warn)[0].contains("not an http(s) URL"));
    }

    #[tokio::test]
    async fn test_empty_url_list() {
        let dir = TempDir::new().unwrap();
        let dest: PathBuf = dir.path().join("chapter");

        let saved = fetcher()
            .fetch_chapter_images(&[], &dest, ImageOrigin::Disk, &MemorySink::new())
            .await
            .unwrap();

        assert_eq!(saved, 0);
        assert!(dest.is_dir());
    }
}
