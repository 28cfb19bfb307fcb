use ab_glyph::{point, Font, FontArc, GlyphId, ScaleFont};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use image::RgbaImage;

use crate::error::{EditorError, Result};

/// Face used for `FontFamily::Sans` and as the fallback for anything the
/// system cannot resolve. Always available, so layout is reproducible.
static BUNDLED_SANS: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

/// Overlay font choice: a fixed set of generic families plus free text.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum FontFamily {
    #[default]
    Sans,
    Serif,
    Monospace,
    Impact,
    Custom(String),
}

impl FontFamily {
    pub fn all_presets() -> &'static [FontFamily] {
        &[FontFamily::Sans, FontFamily::Serif, FontFamily::Monospace, FontFamily::Impact]
    }

    /// Parse a user-facing name. Unknown names become `Custom`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "" | "sans" | "sans-serif" => FontFamily::Sans,
            "serif" => FontFamily::Serif,
            "mono" | "monospace" => FontFamily::Monospace,
            "impact" => FontFamily::Impact,
            _ => FontFamily::Custom(name.trim().to_string()),
        }
    }
}

impl fmt::Display for FontFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FontFamily::Sans => write!(f, "sans"),
            FontFamily::Serif => write!(f, "serif"),
            FontFamily::Monospace => write!(f, "monospace"),
            FontFamily::Impact => write!(f, "impact"),
            FontFamily::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Font request at an already-scaled pixel size.
#[derive(Clone, Copy, Debug)]
pub struct FontSpec<'a> {
    pub family: &'a FontFamily,
    pub size_px: f32,
}

/// Narrow text-measurement capability shared by hit-testing and the
/// compositor's outline drawing.
pub trait TextMeasure {
    /// Advance width of a single line of `text`, in pixels.
    fn measure_text(&self, text: &str, font: &FontSpec<'_>) -> f32;
}

// ============================================================================
// FONT BOOK
// ============================================================================

/// Resolves `FontFamily` values to parsed faces, caching each resolution.
pub struct FontBook {
    fallback: FontArc,
    use_system_fonts: bool,
    cache: RwLock<HashMap<FontFamily, FontArc>>,
}

impl FontBook {
    /// Font book that consults installed system fonts for non-default families.
    pub fn new() -> Result<Self> {
        Self::build(true)
    }

    /// Font book that only knows the bundled face. Fully deterministic.
    pub fn bundled_only() -> Result<Self> {
        Self::build(false)
    }

    fn build(use_system_fonts: bool) -> Result<Self> {
        let fallback = FontArc::try_from_slice(BUNDLED_SANS)
            .map_err(|e| EditorError::unavailable(format!("bundled font unreadable: {}", e)))?;
        Ok(Self { fallback, use_system_fonts, cache: RwLock::new(HashMap::new()) })
    }

    pub fn font_for(&self, family: &FontFamily) -> FontArc {
        if *family == FontFamily::Sans || !self.use_system_fonts {
            return self.fallback.clone();
        }
        if let Ok(cache) = self.cache.read()
            && let Some(font) = cache.get(family)
        {
            return font.clone();
        }

        let font = match load_system_font(family) {
            Some(f) => f,
            None => {
                crate::log_warn!("font '{}' not found, using bundled sans", family);
                self.fallback.clone()
            }
        };
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(family.clone(), font.clone());
        }
        font
    }
}

impl TextMeasure for FontBook {
    fn measure_text(&self, text: &str, font: &FontSpec<'_>) -> f32 {
        let face = self.font_for(font.family);
        layout_line(&face, text, font.size_px).width
    }
}

/// Load a family from the system via font-kit.
fn load_system_font(family: &FontFamily) -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::Properties;
    use font_kit::source::SystemSource;

    let name = match family {
        FontFamily::Sans => FamilyName::SansSerif,
        FontFamily::Serif => FamilyName::Serif,
        FontFamily::Monospace => FamilyName::Monospace,
        FontFamily::Impact => FamilyName::Title("Impact".to_string()),
        FontFamily::Custom(name) => FamilyName::Title(name.clone()),
    };

    let handle = SystemSource::new()
        .select_best_match(&[name], &Properties::new())
        .ok()?;
    let font_data = handle.load().ok()?;
    let bytes: Vec<u8> = (*font_data.copy_font_data()?).clone();
    FontArc::try_from_vec(bytes).ok()
}

// ============================================================================
// LAYOUT + RASTERIZATION
// ============================================================================

/// Single line laid out centred on x = 0, with the line box's top at y = 0.
pub struct LineLayout {
    /// (glyph, pen x, baseline y)
    pub glyphs: Vec<(GlyphId, f32, f32)>,
    pub width: f32,
    /// ascent - descent
    pub height: f32,
}

pub fn layout_line(font: &FontArc, text: &str, font_size: f32) -> LineLayout {
    let scaled = font.as_scaled(font_size);
    let ascent = scaled.ascent();
    let descent = scaled.descent();

    let mut glyphs = Vec::new();
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;

    for ch in text.chars().filter(|c| !c.is_control()) {
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, cursor_x, ascent));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }

    let width = cursor_x;
    let offset = -width * 0.5;
    for glyph in &mut glyphs {
        glyph.1 += offset;
    }

    LineLayout { glyphs, width, height: ascent - descent }
}

/// Draw one line of text centred at (`center_x`, `center_y`), blending
/// `color` over the image (source-over). Glyphs and pixels outside the image
/// are skipped, so the anchor may lie anywhere.
pub fn draw_text_centered(
    image: &mut RgbaImage,
    font: &FontArc,
    text: &str,
    font_size: f32,
    center_x: f32,
    center_y: f32,
    color: [u8; 4],
) {
    let finite = font_size.is_finite() && center_x.is_finite() && center_y.is_finite();
    if !finite || font_size <= 0.0 || text.is_empty() {
        return;
    }
    let layout = layout_line(font, text, font_size);
    let origin_x = center_x;
    let origin_y = center_y - layout.height * 0.5;
    let (w, h) = (image.width() as i64, image.height() as i64);

    for &(glyph_id, gx, gy) in &layout.glyphs {
        let glyph = glyph_id.with_scale_and_position(font_size, point(origin_x + gx, origin_y + gy));
        let Some(outlined) = font.outline_glyph(glyph) else { continue };
        let bounds = outlined.px_bounds();
        if bounds.max.x <= 0.0 || bounds.max.y <= 0.0 || bounds.min.x >= w as f32 || bounds.min.y >= h as f32 {
            continue;
        }
        let bx = bounds.min.x as i64;
        let by = bounds.min.y as i64;
        outlined.draw(|px, py, cov| {
            let x = bx + i64::from(px);
            let y = by + i64::from(py);
            if x < 0 || y < 0 || x >= w || y >= h {
                return;
            }
            blend_pixel(image, x as u32, y as u32, color, cov);
        });
    }
}

/// Source-over blend of `color` at coverage `cov` into one pixel.
pub fn blend_pixel(image: &mut RgbaImage, x: u32, y: u32, color: [u8; 4], cov: f32) {
    let a = (color[3] as f32 / 255.0) * cov.clamp(0.0, 1.0);
    if a <= 0.0 {
        return;
    }
    let dst = image.get_pixel_mut(x, y);
    let da = dst[3] as f32 / 255.0;
    let out_a = a + da * (1.0 - a);
    for c in 0..3 {
        let s = color[c] as f32;
        let d = dst[c] as f32;
        let v = if out_a > 0.0 { (s * a + d * da * (1.0 - a)) / out_a } else { 0.0 };
        dst[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn bundled_font_measures_text() {
        let book = FontBook::bundled_only().expect("font book");
        let spec = FontSpec { family: &FontFamily::Sans, size_px: 40.0 };
        let short = book.measure_text("HI", &spec);
        let long = book.measure_text("HELLO WORLD", &spec);
        assert!(short > 0.0);
        assert!(long > short);
        assert_eq!(book.measure_text("", &spec), 0.0);
    }

    #[test]
    fn measurement_scales_with_size() {
        let book = FontBook::bundled_only().expect("font book");
        let a = book.measure_text("Scale", &FontSpec { family: &FontFamily::Sans, size_px: 20.0 });
        let b = book.measure_text("Scale", &FontSpec { family: &FontFamily::Sans, size_px: 40.0 });
        assert!((b / a - 2.0).abs() < 0.01);
    }

    #[test]
    fn draw_paints_inside_centre_only() {
        let book = FontBook::bundled_only().expect("font book");
        let font = book.font_for(&FontFamily::Sans);
        let mut img = RgbaImage::from_pixel(200, 100, Rgba([0, 0, 0, 255]));
        draw_text_centered(&mut img, &font, "MMM", 40.0, 100.0, 50.0, [255, 255, 255, 255]);
        let painted: Vec<(u32, u32)> = img
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] > 0)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!painted.is_empty());
        let width = book.measure_text("MMM", &FontSpec { family: &FontFamily::Sans, size_px: 40.0 });
        for (x, y) in painted {
            assert!((x as f32 - 100.0).abs() <= width / 2.0 + 2.0);
            assert!((y as f32 - 50.0).abs() <= 30.0);
        }
    }

    #[test]
    fn far_off_image_anchor_draws_nothing() {
        let book = FontBook::bundled_only().expect("font book");
        let font = book.font_for(&FontFamily::Sans);
        let blank = RgbaImage::from_pixel(64, 32, Rgba([0, 0, 0, 255]));
        let mut img = blank.clone();
        for (cx, cy) in [(3.0e9, 16.0), (-3.0e9, 16.0), (32.0, 5.0e9), (f32::INFINITY, 16.0)] {
            draw_text_centered(&mut img, &font, "FAR", 24.0, cx, cy, [255, 255, 255, 255]);
        }
        assert_eq!(img, blank);
    }

    #[test]
    fn family_names_parse() {
        assert_eq!(FontFamily::from_name("Monospace"), FontFamily::Monospace);
        assert_eq!(FontFamily::from_name(""), FontFamily::Sans);
        assert_eq!(FontFamily::from_name("Comic Neue"), FontFamily::Custom("Comic Neue".into()));
        for preset in FontFamily::all_presets() {
            assert_eq!(&FontFamily::from_name(&preset.to_string()), preset);
        }
    }
}
