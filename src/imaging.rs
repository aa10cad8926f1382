//! Image validation and repair.
//!
//! | Operation | `image` crate call |
//! |---|---|
//! | Format + dimensions + colour type (header only) | `ImageReader::into_decoder` |
//! | Integrity check | full decode via `ImageReader::decode` |
//! | Alpha flattening | `to_rgba8` composited onto white, re-encoded |
//! | Placeholder | generated once, stored as JPEG |

use crate::config::ImageBoundsConfig;
use crate::error::ImageError;
use image::{ColorType, DynamicImage, ImageDecoder, ImageFormat, ImageReader, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::LazyLock;

/// Header-level facts about an image payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub color: ColorType,
}

impl ImageInfo {
    /// Returns true if the dimensions sit inside `bounds` (inclusive).
    pub fn fits(&self, bounds: &ImageBoundsConfig) -> bool {
        self.width >= bounds.min_width
            && self.height >= bounds.min_height
            && self.width <= bounds.max_width
            && self.height <= bounds.max_height
    }

    /// Returns true if the pixels carry an alpha channel.
    pub fn has_alpha(&self) -> bool {
        self.color.has_alpha()
    }

    /// File extension matching the detected format.
    pub fn extension(&self) -> &'static str {
        extension_for(self.format)
    }
}

/// A fully decoded image together with its header facts.
pub struct DecodedImage {
    pub info: ImageInfo,
    pub pixels: DynamicImage,
}

/// Bytes ready to be written to disk.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl StoredImage {
    pub fn extension(&self) -> &'static str {
        extension_for(self.format)
    }
}

/// Reader over `bytes` with the decoder's allocation limit lifted.
///
/// Dimensions are policed by [`ImageInfo::fits`] before any full decode, so
/// a page inside the configured bounds always gets decoded.
fn reader(bytes: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, ImageError> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::Decode(image::ImageError::IoError(e)))?;
    reader.no_limits();
    Ok(reader)
}

/// Reads format, dimensions and colour type without decoding pixels.
pub fn probe(bytes: &[u8]) -> Result<ImageInfo, ImageError> {
    let reader = reader(bytes)?;
    let format = reader.format().ok_or(ImageError::UnknownFormat)?;
    let decoder = reader.into_decoder().map_err(ImageError::Decode)?;
    let (width, height) = decoder.dimensions();

    Ok(ImageInfo {
        width,
        height,
        format,
        color: decoder.color_type(),
    })
}

/// Decodes the whole payload.
pub fn decode(bytes: &[u8]) -> Result<DecodedImage, ImageError> {
    let info = probe(bytes)?;
    let pixels = reader(bytes)?.decode().map_err(ImageError::Decode)?;
    Ok(DecodedImage { info, pixels })
}

/// Decodes the payload to prove it is intact and returns its header facts.
pub fn inspect(bytes: &[u8]) -> Result<ImageInfo, ImageError> {
    decode(bytes).map(|decoded| decoded.info)
}

/// Returns true if the image is smaller or larger than `bounds` allow.
pub fn is_out_of_bounds(bytes: &[u8], bounds: &ImageBoundsConfig) -> Result<bool, ImageError> {
    probe(bytes).map(|info| !info.fits(bounds))
}

pub fn has_alpha(bytes: &[u8]) -> Result<bool, ImageError> {
    probe(bytes).map(|info| info.has_alpha())
}

/// Produces an opaque encoding of `image`.
///
/// Images without alpha are returned untouched. Otherwise the pixels are
/// composited onto white and re-encoded, keeping the source format when it
/// has an RGB encoder and falling back to PNG.
pub fn coerce_to_opaque(bytes: &[u8], image: &DecodedImage) -> Result<StoredImage, ImageError> {
    if !image.info.has_alpha() {
        return Ok(StoredImage {
            bytes: bytes.to_vec(),
            format: image.info.format,
        });
    }

    let target = match image.info.format {
        ImageFormat::Png | ImageFormat::Tiff | ImageFormat::Bmp | ImageFormat::WebP => {
            image.info.format
        }
        _ => ImageFormat::Png,
    };

    let flattened = DynamicImage::ImageRgb8(flatten_onto_white(&image.pixels));
    Ok(StoredImage {
        bytes: encode(&flattened, target)?,
        format: target,
    })
}

fn flatten_onto_white(pixels: &DynamicImage) -> RgbImage {
    let rgba = pixels.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());

    for (dst, src) in rgb.pixels_mut().zip(rgba.pixels()) {
        let alpha = u32::from(src[3]);
        for channel in 0..3 {
            let value = u32::from(src[channel]) * alpha + 255 * (255 - alpha);
            dst[channel] = ((value + 127) / 255) as u8;
        }
    }

    rgb
}

/// Encodes `image` in `format`.
pub fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, ImageError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), format)
        .map_err(ImageError::Encode)?;
    Ok(bytes)
}

/// Preferred file extension for `format`.
pub fn extension_for(format: ImageFormat) -> &'static str {
    format.extensions_str().first().copied().unwrap_or("img")
}

/// Returns true if the path carries an image file extension.
pub fn has_image_extension(path: &std::path::Path) -> bool {
    ImageFormat::from_path(path).is_ok()
}

static PLACEHOLDER: LazyLock<Vec<u8>> = LazyLock::new(|| {
    const WIDTH: u32 = 400;
    const HEIGHT: u32 = 600;
    const BAND: i64 = 6;

    let canvas = RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
        let (x, y) = (i64::from(x), i64::from(y));
        let diagonal = x * i64::from(HEIGHT) - y * i64::from(WIDTH);
        let anti = x * i64::from(HEIGHT) + y * i64::from(WIDTH) - i64::from(WIDTH * HEIGHT);
        let span = BAND * i64::from(HEIGHT.max(WIDTH));
        if diagonal.abs() < span || anti.abs() < span {
            Rgb([170, 30, 30])
        } else {
            Rgb([215, 215, 215])
        }
    });

    encode(&DynamicImage::ImageRgb8(canvas), ImageFormat::Jpeg)
        .expect("placeholder image encodes")
});

/// The bundled image substituted for undecodable pages.
pub fn placeholder() -> &'static [u8] {
    &PLACEHOLDER
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    pub(crate) fn png(width: u32, height: u32) -> Vec<u8> {
        let canvas = RgbImage::from_pixel(width, height, Rgb([10, 120, 200]));
        encode(&DynamicImage::ImageRgb8(canvas), ImageFormat::Png).unwrap()
    }

    pub(crate) fn rgba_png(width: u32, height: u32) -> Vec<u8> {
        let canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
        encode(&DynamicImage::ImageRgba8(canvas), ImageFormat::Png).unwrap()
    }

    #[test]
    fn test_inspect_reports_dimensions_and_format() {
        let info = inspect(&png(32, 48)).unwrap();
        assert_eq!((info.width, info.height), (32, 48));
        assert_eq!(info.format, ImageFormat::Png);
        assert!(!info.has_alpha());
        assert_eq!(info.extension(), "png");
    }

    #[test]
    fn test_inspect_rejects_garbage() {
        assert!(inspect(b"<html>not an image</html>").is_err());
        assert!(inspect(&[]).is_err());
    }

    #[test]
    fn test_inspect_rejects_truncated_png() {
        let bytes = png(64, 64);
        assert!(inspect(&bytes[..bytes.len() / 2]).is_err());
    }

    fn crc32(bytes: &[u8]) -> u32 {
        let mut crc = 0xFFFF_FFFF_u32;
        for &byte in bytes {
            crc ^= u32::from(byte);
            for _ in 0..8 {
                crc = if crc & 1 != 0 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
            }
        }
        !crc
    }

    /// A PNG declaring `width`x`height` RGBA pixels with an empty image stream.
    fn png_header_only(width: u32, height: u32) -> Vec<u8> {
        let mut ihdr = Vec::new();
        ihdr.extend_from_slice(&width.to_be_bytes());
        ihdr.extend_from_slice(&height.to_be_bytes());
        ihdr.extend_from_slice(&[8, 6, 0, 0, 0]);
        let idat = [0x78, 0x9C, 0x03, 0x00, 0x00, 0x00, 0x00, 0x01];

        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        for (kind, data) in [(b"IHDR", &ihdr[..]), (b"IDAT", &idat[..]), (b"IEND", &[][..])] {
            bytes.extend_from_slice(&(data.len() as u32).to_be_bytes());
            let start = bytes.len();
            bytes.extend_from_slice(kind);
            bytes.extend_from_slice(data);
            let crc = crc32(&bytes[start..]);
            bytes.extend_from_slice(&crc.to_be_bytes());
        }
        bytes
    }

    #[test]
    fn test_large_pages_are_not_refused_by_allocation_limits() {
        // 12000x12000 RGBA needs more than the decoder's default 512 MiB.
        let bytes = png_header_only(12_000, 12_000);

        let info = probe(&bytes).unwrap();
        assert_eq!((info.width, info.height), (12_000, 12_000));

        match decode(&bytes) {
            Err(ImageError::Decode(image::ImageError::Limits(e))) => {
                panic!("decode refused by limits: {}", e)
            }
            Err(_) => {}
            Ok(_) => panic!("empty image data decoded"),
        }
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let bounds = ImageBoundsConfig::default();
        assert!(!is_out_of_bounds(&png(10, 10), &bounds).unwrap());
        assert!(is_out_of_bounds(&png(9, 200), &bounds).unwrap());
        assert!(is_out_of_bounds(&png(200, 9), &bounds).unwrap());

        let tight = ImageBoundsConfig {
            max_width: 100,
            max_height: 100,
            ..ImageBoundsConfig::default()
        };
        assert!(is_out_of_bounds(&png(101, 50), &tight).unwrap());
    }

    #[test]
    fn test_alpha_detection() {
        assert!(has_alpha(&rgba_png(12, 12)).unwrap());
        assert!(!has_alpha(&png(12, 12)).unwrap());
    }

    #[test]
    fn test_opaque_image_is_left_alone() {
        let bytes = png(20, 20);
        let decoded = decode(&bytes).unwrap();
        let stored = coerce_to_opaque(&bytes, &decoded).unwrap();
        assert_eq!(stored.bytes, bytes);
        assert_eq!(stored.format, ImageFormat::Png);
    }

    #[test]
    fn test_transparent_pixels_become_white() {
        let bytes = rgba_png(16, 16);
        let decoded = decode(&bytes).unwrap();
        let stored = coerce_to_opaque(&bytes, &decoded).unwrap();

        assert_eq!(stored.format, ImageFormat::Png);
        let repaired = decode(&stored.bytes).unwrap();
        assert!(!repaired.info.has_alpha());
        assert_eq!(repaired.pixels.to_rgb8().get_pixel(3, 3), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_placeholder_is_a_valid_opaque_jpeg() {
        let info = inspect(placeholder()).unwrap();
        assert_eq!(info.format, ImageFormat::Jpeg);
        assert!(!info.has_alpha());
        assert!(info.fits(&ImageBoundsConfig::default()));
    }

    #[test]
    fn test_image_extension_detection() {
        assert!(has_image_extension(std::path::Path::new("01.jpg")));
        assert!(has_image_extension(std::path::Path::new("page.WEBP")));
        assert!(!has_image_extension(std::path::Path::new("notes.txt")));
        assert!(!has_image_extension(std::path::Path::new("chapter.pdf")));
    }
}
