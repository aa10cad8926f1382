//! Chapter artifact assembly.
//!
//! Turns a chapter directory of page images into one PDF, zip or cbz file
//! next to the images. Pages are the directory's image files sorted by
//! name. Undecodable pages are replaced by the placeholder image and the
//! artifact name gets the [`CORRUPTED_PREFIX`] marker. So do pages the
//! fetcher already replaced, as listed in [`PLACEHOLDER_PAGES_FILE`].
//!
//! PDF pages embed JPEG sources as-is and every other format as
//! Flate-compressed RGB, so no page is degraded by a lossy re-encode.

use crate::error::PackageError;
use crate::imaging::{self, has_image_extension};
use crate::logging::LogSink;
use crate::model::PLACEHOLDER_PAGES_FILE;
use image::ImageFormat;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, dictionary};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;

const TAG: &str = "Packager";

/// Prefix of artifacts containing at least one placeholder page.
pub const CORRUPTED_PREFIX: &str = "[has_corrupted_images] ";

/// Largest page side expressible without `UserUnit` scaling.
const PDF_MAX_UNITS: u32 = 14_400;

/// Artifact container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    Pdf,
    Zip,
    Cbz,
}

impl ArtifactFormat {
    pub const ALL: [ArtifactFormat; 3] = [ArtifactFormat::Pdf, ArtifactFormat::Zip, ArtifactFormat::Cbz];

    pub fn extension(self) -> &'static str {
        match self {
            ArtifactFormat::Pdf => "pdf",
            ArtifactFormat::Zip => "zip",
            ArtifactFormat::Cbz => "cbz",
        }
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// One page ready to be serialized.
struct PageImage {
    /// Entry name inside archives.
    name: String,
    bytes: Vec<u8>,
}

/// Builds chapter artifacts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Packager {
    force: bool,
}

impl Packager {
    pub fn new(force: bool) -> Self {
        Self { force }
    }

    /// Path of the artifact for `output_name` without the corruption marker.
    pub fn artifact_path(chapter_dir: &Path, output_name: &str, format: ArtifactFormat) -> PathBuf {
        chapter_dir.join(format!("{}.{}", output_name, format.extension()))
    }

    fn corrupted_path(chapter_dir: &Path, output_name: &str, format: ArtifactFormat) -> PathBuf {
        chapter_dir.join(format!(
            "{}{}.{}",
            CORRUPTED_PREFIX,
            output_name,
            format.extension()
        ))
    }

    /// Returns an already built artifact, with or without the corruption marker.
    pub fn existing_artifact(
        chapter_dir: &Path,
        output_name: &str,
        format: ArtifactFormat,
    ) -> Option<PathBuf> {
        [
            Self::artifact_path(chapter_dir, output_name, format),
            Self::corrupted_path(chapter_dir, output_name, format),
        ]
        .into_iter()
        .find(|path| path.is_file())
    }

    /// Returns true if `chapter_dir` holds at least one page image.
    pub fn has_pages(chapter_dir: &Path) -> bool {
        page_files(chapter_dir).is_ok_and(|files| !files.is_empty())
    }

    /// Builds the artifact of `chapter_dir` and returns its path.
    ///
    /// An existing artifact is returned untouched unless the packager was
    /// created with `force`.
    pub fn package(
        &self,
        chapter_dir: &Path,
        output_name: &str,
        format: ArtifactFormat,
        log: &dyn LogSink,
    ) -> Result<PathBuf, PackageError> {
        if let Some(existing) = Self::existing_artifact(chapter_dir, output_name, format) {
            if !self.force {
                log.info(
                    TAG,
                    &format!("{} already exists, skipping", existing.display()),
                );
                return Ok(existing);
            }
            remove_file(&existing)?;
        }

        let (pages, corrupted) = load_pages(chapter_dir, log)?;

        let target = if corrupted {
            Self::corrupted_path(chapter_dir, output_name, format)
        } else {
            Self::artifact_path(chapter_dir, output_name, format)
        };
        let partial = chapter_dir.join(format!(".{}.part", output_name));

        let written = match format {
            ArtifactFormat::Pdf => write_pdf(&pages, &partial),
            ArtifactFormat::Zip | ArtifactFormat::Cbz => write_archive(&pages, &partial),
        };
        if let Err(e) = written {
            let _ = std::fs::remove_file(&partial);
            return Err(e);
        }

        std::fs::rename(&partial, &target).map_err(|source| PackageError::Io {
            path: target.clone(),
            source,
        })?;

        log.info(
            TAG,
            &format!("Built {} ({} pages)", target.display(), pages.len()),
        );
        Ok(target)
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PackageError + '_ {
    move |source| PackageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn remove_file(path: &Path) -> Result<(), PackageError> {
    std::fs::remove_file(path).map_err(io_error(path))
}

/// Image files of `dir`, sorted by file name.
fn page_files(dir: &Path) -> Result<Vec<PathBuf>, PackageError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_error(dir))? {
        let path = entry.map_err(io_error(dir))?.path();
        if path.is_file() && has_image_extension(&path) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Page files the fetcher filled with the placeholder.
fn placeholder_pages(dir: &Path) -> Result<Vec<String>, PackageError> {
    let path = dir.join(PLACEHOLDER_PAGES_FILE);
    match std::fs::read_to_string(&path) {
        Ok(listing) => Ok(listing
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(io_error(&path)(e)),
    }
}

/// Reads every page, substituting the placeholder for undecodable ones.
///
/// Returns the pages and whether any page is a placeholder, substituted
/// now or at download time.
fn load_pages(dir: &Path, log: &dyn LogSink) -> Result<(Vec<PageImage>, bool), PackageError> {
    let files = page_files(dir)?;
    if files.is_empty() {
        return Err(PackageError::NoImages(dir.to_path_buf()));
    }

    let placeholders = placeholder_pages(dir)?;
    let mut corrupted = false;
    let mut pages = Vec::with_capacity(files.len());

    for path in files {
        let bytes = std::fs::read(&path).map_err(io_error(&path))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match imaging::inspect(&bytes) {
            Ok(_) => {
                if placeholders.contains(&name) {
                    log.warn(
                        TAG,
                        &format!("{} was replaced by the placeholder on download", path.display()),
                    );
                    corrupted = true;
                }
                pages.push(PageImage { name, bytes });
            }
            Err(e) => {
                log.warn(
                    TAG,
                    &format!("{} is corrupted ({}), using placeholder", path.display(), e),
                );
                corrupted = true;
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                pages.push(PageImage {
                    name: format!("{}.jpg", stem),
                    bytes: imaging::placeholder().to_vec(),
                });
            }
        }
    }

    Ok((pages, corrupted))
}

/// Stores every page verbatim at the archive root.
fn write_archive(pages: &[PageImage], path: &Path) -> Result<(), PackageError> {
    let file = File::create(path).map_err(io_error(path))?;
    let mut zip = zip::ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    for page in pages {
        zip.start_file(page.name.as_str(), options)?;
        zip.write_all(&page.bytes).map_err(io_error(path))?;
    }

    let mut writer = zip.finish()?;
    writer.flush().map_err(io_error(path))?;
    Ok(())
}

/// Page size in PDF units and the `UserUnit` needed to express it.
fn pdf_page_size(width: u32, height: u32) -> (i64, i64, Option<i64>) {
    let longest = width.max(height);
    if longest <= PDF_MAX_UNITS {
        return (i64::from(width), i64::from(height), None);
    }
    let unit = longest.div_ceil(PDF_MAX_UNITS);
    (
        i64::from(width.div_ceil(unit)),
        i64::from(height.div_ceil(unit)),
        Some(i64::from(unit)),
    )
}

/// PDF colour space of an 8-bit gray or three-component JPEG.
///
/// Reads the component count from the frame header. CMYK, 12-bit and
/// malformed streams yield `None`.
fn jpeg_color_space(bytes: &[u8]) -> Option<&'static str> {
    if bytes.get(..2)? != [0xFF, 0xD8] {
        return None;
    }

    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        if marker == 0xFF {
            pos += 1;
            continue;
        }

        let is_frame = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame {
            if *bytes.get(pos + 4)? != 8 {
                return None;
            }
            return match *bytes.get(pos + 9)? {
                1 => Some("DeviceGray"),
                3 => Some("DeviceRGB"),
                _ => None,
            };
        }

        let length = usize::from(u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]));
        pos += 2 + length;
    }
    None
}

/// Image XObject for `bytes` and its pixel dimensions.
fn image_xobject(bytes: &[u8]) -> Result<(Stream, u32, u32), PackageError> {
    let info = imaging::probe(bytes)?;
    let (width, height) = (info.width, info.height);
    let dict = |color_space: &str| {
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(width),
            "Height" => i64::from(height),
            "ColorSpace" => color_space,
            "BitsPerComponent" => 8_i64,
        }
    };

    if info.format == ImageFormat::Jpeg
        && let Some(color_space) = jpeg_color_space(bytes)
    {
        let mut dict = dict(color_space);
        dict.set("Filter", "DCTDecode");
        return Ok((Stream::new(dict, bytes.to_vec()).with_compression(false), width, height));
    }

    let rgb = imaging::decode(bytes)?.pixels.to_rgb8();
    let mut stream = Stream::new(dict("DeviceRGB"), rgb.into_raw());
    stream.compress().map_err(pdf_error)?;
    Ok((stream, width, height))
}

fn pdf_error(e: impl fmt::Display) -> PackageError {
    PackageError::Pdf(e.to_string())
}

/// One page per image, each page sized to the image's pixel dimensions.
fn write_pdf(pages: &[PageImage], path: &Path) -> Result<(), PackageError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());

    for page in pages {
        let (image, width, height) = image_xobject(&page.bytes)?;
        let image_id = doc.add_object(image);

        let (page_w, page_h, user_unit) = pdf_page_size(width, height);
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        page_w.into(),
                        Object::Integer(0),
                        Object::Integer(0),
                        page_h.into(),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            content.encode().map_err(pdf_error)?,
        ));

        let mut page_dict = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![Object::Integer(0), Object::Integer(0), page_w.into(), page_h.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im0" => image_id,
                },
            },
        };
        if let Some(unit) = user_unit {
            page_dict.set("UserUnit", unit);
        }

        kids.push(doc.add_object(page_dict).into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut writer = BufWriter::new(File::create(path).map_err(io_error(path))?);
    doc.save_to(&mut writer).map_err(pdf_error)?;
    writer.flush().map_err(io_error(path))?;
    Ok(())
}
