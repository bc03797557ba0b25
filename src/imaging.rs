//! Image and file helpers used to prepare uploads and handle annotated frames.
//!
//! Images travel to and from the backend as data URLs
//! (`data:image/jpeg;base64,...`).

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops::FilterType, GenericImageView, ImageEncoder, ImageFormat};
use std::path::Path;

pub const DEFAULT_ALLOWED_TYPES: &[&str] = &["image/jpeg", "image/png", "image/jpg"];
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_WIDTH: u32 = 1920;
pub const DEFAULT_MAX_HEIGHT: u32 = 1080;
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Compression settings for outgoing images.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompressOptions {
    pub max_width: u32,
    pub max_height: u32,
    /// JPEG quality, 1..=100.
    pub quality: u8,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Read a file and return it as a data URL. The MIME type is sniffed from the
/// content and falls back to the file extension.
pub fn file_to_data_url(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read image file {}", path.display()))?;
    let mime = mime_type(&bytes, path).unwrap_or("application/octet-stream");
    Ok(encode_data_url(mime, &bytes))
}

/// Content-sniffed MIME type, falling back to the path's extension.
pub fn mime_type(bytes: &[u8], path: &Path) -> Option<&'static str> {
    sniff_mime(bytes).or_else(|| mime_from_extension(path))
}

pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Decode a data URL, or a bare base64 payload, into bytes.
pub fn decode_data_url(data: &str) -> Result<Vec<u8>> {
    let payload = match data.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| anyhow!("data url has no payload separator"))?;
            if !header.ends_with(";base64") {
                return Err(anyhow!("data url is not base64 encoded"));
            }
            payload
        }
        None => data,
    };
    STANDARD
        .decode(payload.trim())
        .context("decode base64 image payload")
}

/// MIME type named in a data URL header, if any.
pub fn data_url_mime(data: &str) -> Option<&str> {
    let rest = data.strip_prefix("data:")?;
    let (header, _) = rest.split_once(',')?;
    header.split(';').next().filter(|mime| !mime.is_empty())
}

pub fn validate_file_type(mime: &str, allowed: &[&str]) -> bool {
    !mime.is_empty() && allowed.contains(&mime)
}

/// Empty files are rejected.
pub fn validate_file_size(size: u64, max_bytes: u64) -> bool {
    size > 0 && size <= max_bytes
}

/// Human-readable 1024-based size with up to two decimals, e.g. `1.5 KB`.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, SIZE_UNITS[unit])
}

/// Downscale to fit within the bounds (aspect ratio kept, never upscaled) and
/// re-encode as JPEG. Returns a JPEG data URL.
pub fn compress_image(bytes: &[u8], options: CompressOptions) -> Result<String> {
    let jpeg = compress_to_jpeg(bytes, options)?;
    Ok(encode_data_url("image/jpeg", &jpeg))
}

pub fn compress_to_jpeg(bytes: &[u8], options: CompressOptions) -> Result<Vec<u8>> {
    if !(1..=100).contains(&options.quality) {
        return Err(anyhow!(
            "jpeg quality must be between 1 and 100, got {}",
            options.quality
        ));
    }
    let mut image = image::load_from_memory(bytes).context("decode image")?;
    let (width, height) = image.dimensions();
    if width > options.max_width || height > options.max_height {
        image = image.resize(options.max_width, options.max_height, FilterType::Triangle);
        log::debug!(
            "resized image {}x{} -> {}x{}",
            width,
            height,
            image.width(),
            image.height()
        );
    }
    let rgb = image.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, options.quality)
        .write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .context("encode jpeg")?;
    Ok(out)
}

/// Decode a data URL and write the image to `path`.
pub fn save_data_url(data: &str, path: &Path) -> Result<()> {
    let bytes = decode_data_url(data)?;
    std::fs::write(path, bytes).with_context(|| format!("write image to {}", path.display()))
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Bmp => Some("image/bmp"),
        _ => None,
    }
}

/// MIME type implied by a path's extension.
pub fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).expect("encode png");
        out.into_inner()
    }

    #[test]
    fn formats_sizes_like_a_file_browser() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(10 * 1024 * 1024), "10 MB");
        assert_eq!(format_file_size(1_234_567_890), "1.15 GB");
        assert_eq!(format_file_size(3 * 1024u64.pow(5)), "3072 TB");
    }

    #[test]
    fn validates_type_and_size() {
        assert!(validate_file_type("image/png", DEFAULT_ALLOWED_TYPES));
        assert!(!validate_file_type("image/gif", DEFAULT_ALLOWED_TYPES));
        assert!(!validate_file_type("", DEFAULT_ALLOWED_TYPES));
        assert!(validate_file_size(1, DEFAULT_MAX_FILE_BYTES));
        assert!(validate_file_size(DEFAULT_MAX_FILE_BYTES, DEFAULT_MAX_FILE_BYTES));
        assert!(!validate_file_size(DEFAULT_MAX_FILE_BYTES + 1, DEFAULT_MAX_FILE_BYTES));
        assert!(!validate_file_size(0, DEFAULT_MAX_FILE_BYTES));
    }

    #[test]
    fn data_url_codec() {
        let url = encode_data_url("image/png", b"hello");
        assert_eq!(url, "data:image/png;base64,aGVsbG8=");
        assert_eq!(data_url_mime(&url), Some("image/png"));
        assert_eq!(decode_data_url(&url).unwrap(), b"hello");
        assert_eq!(decode_data_url("aGVsbG8=").unwrap(), b"hello");
        assert!(decode_data_url("data:image/png,hello").is_err());
        assert!(decode_data_url("data:image/png;base64").is_err());
        assert!(data_url_mime("aGVsbG8=").is_none());
    }

    #[test]
    fn large_images_are_scaled_into_bounds() {
        let source = png(400, 100);
        let options = CompressOptions {
            max_width: 200,
            max_height: 200,
            quality: 70,
        };
        let jpeg = compress_to_jpeg(&source, options).expect("compress");
        let decoded = image::load_from_memory(&jpeg).expect("decode jpeg");
        assert_eq!(decoded.dimensions(), (200, 50));
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn small_images_keep_their_size() {
        let data_url = compress_image(&png(64, 48), CompressOptions::default()).expect("compress");
        assert_eq!(data_url_mime(&data_url), Some("image/jpeg"));
        let decoded = image::load_from_memory(&decode_data_url(&data_url).unwrap()).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
    }

    #[test]
    fn bad_quality_and_garbage_are_rejected() {
        let options = CompressOptions {
            quality: 0,
            ..CompressOptions::default()
        };
        assert!(compress_to_jpeg(&png(8, 8), options).is_err());
        assert!(compress_to_jpeg(b"not an image", CompressOptions::default()).is_err());
    }

    #[test]
    fn file_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.bin");
        std::fs::write(&path, png(4, 4)).unwrap();
        let url = file_to_data_url(&path).expect("data url");
        assert_eq!(data_url_mime(&url), Some("image/png"));

        let out = dir.path().join("copy.png");
        save_data_url(&url, &out).expect("save");
        assert_eq!(std::fs::read(&out).unwrap(), png(4, 4));
    }

    #[test]
    fn extension_fallback() {
        assert_eq!(mime_from_extension(Path::new("a/b/photo.JPG")), Some("image/jpeg"));
        assert_eq!(mime_from_extension(Path::new("notes.txt")), None);
    }
}
