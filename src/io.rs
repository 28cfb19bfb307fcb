use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder, ImageOutputFormat, RgbaImage};
use regex::Regex;
use reqwest::blocking::Client;
use std::io::Cursor;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use crate::canvas::Bitmap;
use crate::error::{EditorError, Result};

// ============================================================================
// BITMAP SOURCE
// ============================================================================

/// Resolves an external identifier to encoded image bytes.
pub trait BitmapSource: Send + Sync {
    fn fetch(&self, video_id: &str) -> Result<Vec<u8>>;
}

fn video_id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"^(?:https?://)?(?:(?:www|m|music)\.)?(?:youtube\.com/(?:watch\?(?:[^#]*&)?v=|embed/|v/|shorts/)|youtu\.be/)([A-Za-z0-9_-]{11})(?:[?&#/].*)?$",
            )
            .ok()
        })
        .as_ref()
}

/// Pull the 11-character video id out of a watch, short, embed or shorts URL.
/// Anything else is `InvalidInput`, before any network activity.
pub fn extract_video_id(url: &str) -> Result<String> {
    video_id_pattern()
        .and_then(|re| re.captures(url.trim()))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| EditorError::invalid(format!("not a recognised video URL: {}", url.trim())))
}

/// Thumbnail fetcher for the public image CDN. Tries the full-resolution
/// variant first and falls back to the always-present high-quality one.
pub struct YoutubeThumbnailSource {
    client: Client,
    base_url: String,
}

impl YoutubeThumbnailSource {
    pub const DEFAULT_BASE_URL: &'static str = "https://i.ytimg.com/vi";
    const VARIANTS: [&'static str; 2] = ["maxresdefault.jpg", "hqdefault.jpg"];

    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(Self::DEFAULT_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent("thumbfe thumbnail fetcher")
            .timeout(timeout)
            .build()
            .map_err(|e| EditorError::unavailable(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }
}

impl BitmapSource for YoutubeThumbnailSource {
    fn fetch(&self, video_id: &str) -> Result<Vec<u8>> {
        let mut last_error = String::from("no thumbnail variants tried");
        for variant in Self::VARIANTS {
            let url = format!("{}/{}/{}", self.base_url, video_id, variant);
            match self.client.get(&url).send() {
                Ok(resp) if resp.status().is_success() => {
                    let bytes = resp
                        .bytes()
                        .map_err(|e| EditorError::unavailable(format!("reading {} failed: {}", url, e)))?;
                    return Ok(bytes.to_vec());
                }
                Ok(resp) => {
                    crate::log_warn!("thumbnail {} returned {}", url, resp.status());
                    last_error = format!("thumbnail request returned {}", resp.status());
                }
                Err(e) => {
                    crate::log_warn!("thumbnail {} failed: {}", url, e);
                    last_error = format!("thumbnail request failed: {}", e);
                }
            }
        }
        Err(EditorError::ResourceUnavailable(last_error))
    }
}

/// Fully decode encoded bytes into a bitmap. Undecodable data is
/// `ResourceUnavailable`, reported at load time rather than during render.
pub fn decode_bitmap(bytes: &[u8]) -> Result<Bitmap> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| EditorError::unavailable(format!("image could not be decoded: {}", e)))?;
    let rgba = img.to_rgba8();
    if rgba.width() == 0 || rgba.height() == 0 {
        return Err(EditorError::unavailable("image has no pixels"));
    }
    Ok(Bitmap::new(rgba))
}

// ============================================================================
// EXPORT ENCODING
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
    /// Lossy; alpha is dropped. Quality 1-100.
    Jpeg { quality: u8 },
    /// Lossless.
    Webp,
}

impl ExportFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Png => "image/png",
            ExportFormat::Jpeg { .. } => "image/jpeg",
            ExportFormat::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg { .. } => "jpg",
            ExportFormat::Webp => "webp",
        }
    }

    /// `png`, `jpg`/`jpeg`, `webp` (case-insensitive).
    pub fn from_name(name: &str, quality: u8) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "png" => Some(ExportFormat::Png),
            "jpg" | "jpeg" => Some(ExportFormat::Jpeg { quality: quality.clamp(1, 100) }),
            "webp" => Some(ExportFormat::Webp),
            _ => None,
        }
    }

    pub fn from_path(path: &Path, quality: u8) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::from_name(ext, quality)
    }
}

/// Encoded export result handed back to the caller.
#[derive(Clone, Debug)]
pub struct ExportedImage {
    pub format: ExportFormat,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl ExportedImage {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

/// Encode into memory. Standalone so it can run on the rayon pool.
pub fn encode_image(image: &RgbaImage, format: ExportFormat) -> Result<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();
    match format {
        ExportFormat::Png => {
            PngEncoder::new(&mut buf).write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        ExportFormat::Jpeg { quality } => {
            // JPEG doesn't support alpha, convert to RGB
            let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
            encoder.encode(
                rgb_image.as_raw(),
                rgb_image.width(),
                rgb_image.height(),
                image::ColorType::Rgb8,
            )?;
        }
        ExportFormat::Webp => {
            let mut cursor = Cursor::new(&mut buf);
            DynamicImage::ImageRgba8(image.clone()).write_to(&mut cursor, ImageOutputFormat::WebP)?;
        }
    }
    Ok(buf)
}

pub fn write_export(exported: &ExportedImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &exported.bytes)?;
    Ok(())
}
