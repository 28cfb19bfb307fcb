// ============================================================================
// ADJUSTMENT PIPELINE: photographic knobs → ordered render transform
// ============================================================================
//
// `RenderTransform::from_settings` is pure: it only describes the stages.
// The compositor calls `apply_to` to paint the base bitmap, so the preview
// and the export share one definition of every stage.
//
// Stage order is fixed: brightness, contrast, saturation, grayscale, sepia,
// blur. Stages sitting at their neutral value are omitted entirely, which
// makes the default transform an exact passthrough.
// ============================================================================

use image::RgbaImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ops::filters::parallel_gaussian_blur;

/// The six adjustment knobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AdjustmentKind {
    Brightness,
    Contrast,
    Saturation,
    Grayscale,
    Sepia,
    Blur,
}

impl AdjustmentKind {
    pub fn all() -> &'static [AdjustmentKind] {
        &[
            AdjustmentKind::Brightness,
            AdjustmentKind::Contrast,
            AdjustmentKind::Saturation,
            AdjustmentKind::Grayscale,
            AdjustmentKind::Sepia,
            AdjustmentKind::Blur,
        ]
    }

    /// Inclusive valid range.
    pub fn range(&self) -> (f32, f32) {
        match self {
            AdjustmentKind::Brightness | AdjustmentKind::Contrast | AdjustmentKind::Saturation => {
                (0.0, 200.0)
            }
            AdjustmentKind::Grayscale | AdjustmentKind::Sepia => (0.0, 100.0),
            AdjustmentKind::Blur => (0.0, 20.0),
        }
    }

    pub fn default_value(&self) -> f32 {
        match self {
            AdjustmentKind::Brightness | AdjustmentKind::Contrast | AdjustmentKind::Saturation => {
                100.0
            }
            AdjustmentKind::Grayscale | AdjustmentKind::Sepia | AdjustmentKind::Blur => 0.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AdjustmentKind::Brightness => "Brightness",
            AdjustmentKind::Contrast => "Contrast",
            AdjustmentKind::Saturation => "Saturation",
            AdjustmentKind::Grayscale => "Grayscale",
            AdjustmentKind::Sepia => "Sepia",
            AdjustmentKind::Blur => "Blur",
        }
    }

    /// Clamp to range. NaN/∞ fall back to the neutral value.
    pub fn clamp(&self, value: f32) -> f32 {
        if !value.is_finite() {
            return self.default_value();
        }
        let (lo, hi) = self.range();
        value.clamp(lo, hi)
    }
}

/// Current adjustment values. Percentages for the first five knobs, pixels
/// for blur.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjustmentSettings {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub grayscale: f32,
    pub sepia: f32,
    pub blur: f32,
}

impl Default for AdjustmentSettings {
    fn default() -> Self {
        Self {
            brightness: 100.0,
            contrast: 100.0,
            saturation: 100.0,
            grayscale: 0.0,
            sepia: 0.0,
            blur: 0.0,
        }
    }
}

impl AdjustmentSettings {
    pub fn get(&self, kind: AdjustmentKind) -> f32 {
        match kind {
            AdjustmentKind::Brightness => self.brightness,
            AdjustmentKind::Contrast => self.contrast,
            AdjustmentKind::Saturation => self.saturation,
            AdjustmentKind::Grayscale => self.grayscale,
            AdjustmentKind::Sepia => self.sepia,
            AdjustmentKind::Blur => self.blur,
        }
    }

    /// Set one knob, clamped to its range. Returns the stored value.
    pub fn set(&mut self, kind: AdjustmentKind, value: f32) -> f32 {
        let v = kind.clamp(value);
        match kind {
            AdjustmentKind::Brightness => self.brightness = v,
            AdjustmentKind::Contrast => self.contrast = v,
            AdjustmentKind::Saturation => self.saturation = v,
            AdjustmentKind::Grayscale => self.grayscale = v,
            AdjustmentKind::Sepia => self.sepia = v,
            AdjustmentKind::Blur => self.blur = v,
        }
        v
    }

    /// Copy with every knob clamped into range.
    pub fn clamped(&self) -> Self {
        let mut out = *self;
        for &kind in AdjustmentKind::all() {
            out.set(kind, self.get(kind));
        }
        out
    }

    pub fn is_neutral(&self) -> bool {
        AdjustmentKind::all()
            .iter()
            .all(|k| self.get(*k) == k.default_value())
    }
}

// ============================================================================
// RENDER TRANSFORM
// ============================================================================

/// One compositing stage. Amounts are normalized (1.0 = 100 %).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Stage {
    Brightness(f32),
    Contrast(f32),
    Saturation(f32),
    Grayscale(f32),
    Sepia(f32),
    /// Gaussian standard deviation in pixels.
    Blur(f32),
}

/// Ordered stage list produced from [`AdjustmentSettings`].
#[derive(Clone, Debug, PartialEq, Default)]
pub struct RenderTransform {
    stages: Vec<Stage>,
}

impl RenderTransform {
    pub fn from_settings(settings: &AdjustmentSettings) -> Self {
        let s = settings.clamped();
        let mut stages = Vec::new();
        if s.brightness != 100.0 {
            stages.push(Stage::Brightness(s.brightness / 100.0));
        }
        if s.contrast != 100.0 {
            stages.push(Stage::Contrast(s.contrast / 100.0));
        }
        if s.saturation != 100.0 {
            stages.push(Stage::Saturation(s.saturation / 100.0));
        }
        if s.grayscale != 0.0 {
            stages.push(Stage::Grayscale(s.grayscale / 100.0));
        }
        if s.sepia != 0.0 {
            stages.push(Stage::Sepia(s.sepia / 100.0));
        }
        if s.blur > 0.0 {
            stages.push(Stage::Blur(s.blur));
        }
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_identity(&self) -> bool {
        self.stages.is_empty()
    }

    /// Paint `src` through every stage into a new image of the same size.
    pub fn apply_to(&self, src: &RgbaImage) -> RgbaImage {
        if self.is_identity() {
            return src.clone();
        }

        let colour: Vec<Stage> = self
            .stages
            .iter()
            .copied()
            .filter(|s| !matches!(s, Stage::Blur(_)))
            .collect();

        let mut out = if colour.is_empty() {
            src.clone()
        } else {
            apply_colour_stages(src, &colour)
        };

        for stage in &self.stages {
            if let Stage::Blur(sigma) = *stage {
                out = parallel_gaussian_blur(&out, sigma);
            }
        }
        out
    }
}

/// Row-parallel per-pixel pass over all colour stages. Alpha is preserved.
fn apply_colour_stages(src: &RgbaImage, stages: &[Stage]) -> RgbaImage {
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 {
        return src.clone();
    }

    let src_raw = src.as_raw();
    let stride = w * 4;
    let mut dst_raw = vec![0u8; w * h * 4];

    dst_raw.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let row_in = &src_raw[y * stride..(y + 1) * stride];
        for x in 0..w {
            let pi = x * 4;
            let mut rgb = [
                row_in[pi] as f32,
                row_in[pi + 1] as f32,
                row_in[pi + 2] as f32,
            ];
            for stage in stages {
                rgb = apply_stage(*stage, rgb);
            }
            row_out[pi] = rgb[0].round().clamp(0.0, 255.0) as u8;
            row_out[pi + 1] = rgb[1].round().clamp(0.0, 255.0) as u8;
            row_out[pi + 2] = rgb[2].round().clamp(0.0, 255.0) as u8;
            row_out[pi + 3] = row_in[pi + 3];
        }
    });

    RgbaImage::from_raw(w as u32, h as u32, dst_raw).unwrap_or_else(|| src.clone())
}

fn apply_stage(stage: Stage, [r, g, b]: [f32; 3]) -> [f32; 3] {
    let out = match stage {
        Stage::Brightness(k) => [r * k, g * k, b * k],
        Stage::Contrast(k) => [
            (r - 127.5) * k + 127.5,
            (g - 127.5) * k + 127.5,
            (b - 127.5) * k + 127.5,
        ],
        Stage::Saturation(s) => mul_matrix(&saturate_matrix(s), [r, g, b]),
        Stage::Grayscale(a) => mul_matrix(&grayscale_matrix(a), [r, g, b]),
        Stage::Sepia(a) => mul_matrix(&sepia_matrix(a), [r, g, b]),
        Stage::Blur(_) => [r, g, b],
    };
    [
        out[0].clamp(0.0, 255.0),
        out[1].clamp(0.0, 255.0),
        out[2].clamp(0.0, 255.0),
    ]
}

fn mul_matrix(m: &[[f32; 3]; 3], v: [f32; 3]) -> [f32; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

fn saturate_matrix(s: f32) -> [[f32; 3]; 3] {
    [
        [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
    ]
}

/// `amount` 1.0 = fully grey. BT.709 luma weights.
fn grayscale_matrix(amount: f32) -> [[f32; 3]; 3] {
    let s = 1.0 - amount.clamp(0.0, 1.0);
    [
        [0.2126 + 0.7874 * s, 0.7152 - 0.7152 * s, 0.0722 - 0.0722 * s],
        [0.2126 - 0.2126 * s, 0.7152 + 0.2848 * s, 0.0722 - 0.0722 * s],
        [0.2126 - 0.2126 * s, 0.7152 - 0.7152 * s, 0.0722 + 0.9278 * s],
    ]
}

fn sepia_matrix(amount: f32) -> [[f32; 3]; 3] {
    let s = 1.0 - amount.clamp(0.0, 1.0);
    [
        [0.393 + 0.607 * s, 0.769 - 0.769 * s, 0.189 - 0.189 * s],
        [0.349 - 0.349 * s, 0.686 + 0.314 * s, 0.168 - 0.168 * s],
        [0.272 - 0.272 * s, 0.534 - 0.534 * s, 0.131 + 0.869 * s],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x * 17 % 256) as u8, (y * 29 % 256) as u8, ((x + y) * 7 % 256) as u8, 255])
        })
    }

    #[test]
    fn defaults_are_identity() {
        let t = RenderTransform::from_settings(&AdjustmentSettings::default());
        assert!(t.is_identity());
        let src = gradient(16, 9);
        assert_eq!(t.apply_to(&src), src);
    }

    #[test]
    fn any_non_default_knob_adds_a_stage() {
        for &kind in AdjustmentKind::all() {
            let mut s = AdjustmentSettings::default();
            let (lo, hi) = kind.range();
            let v = if kind.default_value() == lo { hi } else { lo };
            s.set(kind, v);
            let t = RenderTransform::from_settings(&s);
            assert_eq!(t.stages().len(), 1, "{}", kind.label());
        }
    }

    #[test]
    fn stages_keep_fixed_order() {
        let s = AdjustmentSettings {
            brightness: 120.0,
            contrast: 80.0,
            saturation: 150.0,
            grayscale: 10.0,
            sepia: 20.0,
            blur: 2.0,
        };
        let t = RenderTransform::from_settings(&s);
        let names: Vec<&str> = t
            .stages()
            .iter()
            .map(|s| match s {
                Stage::Brightness(_) => "b",
                Stage::Contrast(_) => "c",
                Stage::Saturation(_) => "s",
                Stage::Grayscale(_) => "g",
                Stage::Sepia(_) => "p",
                Stage::Blur(_) => "x",
            })
            .collect();
        assert_eq!(names, ["b", "c", "s", "g", "p", "x"]);
    }

    #[test]
    fn set_clamps_out_of_range() {
        let mut s = AdjustmentSettings::default();
        assert_eq!(s.set(AdjustmentKind::Brightness, 500.0), 200.0);
        assert_eq!(s.set(AdjustmentKind::Blur, -3.0), 0.0);
        assert_eq!(s.set(AdjustmentKind::Sepia, f32::NAN), 0.0);
        let wild = AdjustmentSettings { grayscale: 300.0, ..Default::default() };
        assert_eq!(wild.clamped().grayscale, 100.0);
    }

    #[test]
    fn zero_contrast_flattens_even_at_full_brightness() {
        let s = AdjustmentSettings { brightness: 200.0, contrast: 0.0, ..Default::default() };
        let out = RenderTransform::from_settings(&s).apply_to(&gradient(32, 32));
        let first = *out.get_pixel(0, 0);
        assert!(out.pixels().all(|p| *p == first));
        assert_eq!(first[0], 128);
    }

    #[test]
    fn full_grayscale_equalizes_channels() {
        let s = AdjustmentSettings { grayscale: 100.0, ..Default::default() };
        let out = RenderTransform::from_settings(&s).apply_to(&gradient(8, 8));
        for p in out.pixels() {
            assert!((p[0] as i32 - p[1] as i32).abs() <= 1);
            assert!((p[1] as i32 - p[2] as i32).abs() <= 1);
        }
    }

    #[test]
    fn colour_stages_preserve_alpha() {
        let src = RgbaImage::from_pixel(4, 4, Rgba([200, 100, 50, 77]));
        let s = AdjustmentSettings { sepia: 100.0, saturation: 0.0, ..Default::default() };
        let out = RenderTransform::from_settings(&s).apply_to(&src);
        assert!(out.pixels().all(|p| p[3] == 77));
    }
}
