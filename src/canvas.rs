use std::ops::{Add, Sub};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use image::RgbaImage;

use crate::components::tools::{overlay_bounds, BoundingBox};
use crate::ops::adjustments::{AdjustmentSettings, RenderTransform};
use crate::ops::text::{blend_pixel, draw_text_centered, FontBook};
use crate::overlay::{OverlayId, TextOverlay};

/// Bitmap width at which an overlay's `font_size` is drawn 1:1.
pub const REFERENCE_WIDTH: f32 = 1280.0;

/// Drop-shadow offset (pixels, right and down).
pub const SHADOW_OFFSET: f32 = 3.0;
const SHADOW_COLOR: [u8; 4] = [0, 0, 0, 160];

// Selection outline: dark underlay + bright dash, like a marching-ants frame.
const DASH_LEN: f32 = 8.0;
const GAP_LEN: f32 = 4.0;
const OUTLINE_COLOR: [u8; 4] = [0, 0, 0, 140];
const DASH_COLOR: [u8; 4] = [0, 200, 220, 255];
const OUTLINE_WIDTH: f32 = 4.0;
const DASH_WIDTH: f32 = 2.0;

// ============================================================================
// COORDINATES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Maps pointer positions on a scaled-for-display surface back to the
/// bitmap's native pixel grid. Hit-testing and drag math must only ever see
/// bitmap-pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoordinateMapper {
    pub bitmap_width: u32,
    pub bitmap_height: u32,
    /// Size the surface is shown at, in display units (CSS px / points).
    pub display_width: f32,
    pub display_height: f32,
}

impl CoordinateMapper {
    /// `None` when either size is degenerate.
    pub fn new(bitmap: (u32, u32), display: (f32, f32)) -> Option<Self> {
        if bitmap.0 == 0 || bitmap.1 == 0 || !(display.0 > 0.0) || !(display.1 > 0.0) {
            return None;
        }
        Some(Self {
            bitmap_width: bitmap.0,
            bitmap_height: bitmap.1,
            display_width: display.0,
            display_height: display.1,
        })
    }

    /// `p` is relative to the displayed surface's top-left corner.
    pub fn display_to_bitmap(&self, p: Point) -> Point {
        Point::new(
            p.x * self.bitmap_width as f32 / self.display_width,
            p.y * self.bitmap_height as f32 / self.display_height,
        )
    }

    pub fn bitmap_to_display(&self, p: Point) -> Point {
        Point::new(
            p.x * self.display_width / self.bitmap_width as f32,
            p.y * self.display_height / self.bitmap_height as f32,
        )
    }
}

pub fn pixel_to_percent(p: Point, width: u32, height: u32) -> Point {
    let w = (width as f32).max(1.0);
    let h = (height as f32).max(1.0);
    Point::new(p.x / w * 100.0, p.y / h * 100.0)
}

pub fn percent_to_pixel(p: Point, width: u32, height: u32) -> Point {
    Point::new(p.x / 100.0 * width as f32, p.y / 100.0 * height as f32)
}

/// Overlay anchor in bitmap pixels.
pub fn overlay_anchor(overlay: &TextOverlay, width: u32, height: u32) -> Point {
    percent_to_pixel(Point::new(overlay.x, overlay.y), width, height)
}

/// Font size actually drawn on a bitmap of `bitmap_width` pixels, keeping the
/// text's share of the image width independent of resolution.
pub fn effective_font_size(font_size: f32, bitmap_width: u32) -> f32 {
    font_size * bitmap_width as f32 / REFERENCE_WIDTH
}

// ============================================================================
// BITMAP + SURFACES
// ============================================================================

static NEXT_BITMAP_ID: AtomicU64 = AtomicU64::new(1);

/// A fully decoded source bitmap. Cloning shares the pixels.
#[derive(Clone, Debug)]
pub struct Bitmap {
    id: u64,
    pixels: Arc<RgbaImage>,
}

impl Bitmap {
    pub fn new(pixels: RgbaImage) -> Self {
        Self { id: NEXT_BITMAP_ID.fetch_add(1, Ordering::Relaxed), pixels: Arc::new(pixels) }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceKind {
    /// Interactive view; may show the selection outline.
    Preview,
    /// Off-screen target for export and AI edits; never decorated.
    Export,
}

/// Render target. Always sized to the bitmap's native resolution; display
/// scaling is the presenter's business.
#[derive(Clone, Debug)]
pub struct Surface {
    kind: SurfaceKind,
    image: RgbaImage,
}

impl Surface {
    pub fn new(kind: SurfaceKind) -> Self {
        Self { kind, image: RgbaImage::new(0, 0) }
    }

    pub fn preview() -> Self {
        Self::new(SurfaceKind::Preview)
    }

    pub fn export() -> Self {
        Self::new(SurfaceKind::Export)
    }

    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

// ============================================================================
// COMPOSITOR
// ============================================================================

struct BaseCache {
    bitmap_id: u64,
    adjustments: AdjustmentSettings,
    image: RgbaImage,
}

/// Merges base bitmap, adjustment transform and overlays into a surface.
/// The same code path serves preview and export; only the selection outline
/// depends on the surface kind.
pub struct Compositor {
    fonts: Arc<FontBook>,
    base_cache: Option<BaseCache>,
}

impl Compositor {
    pub fn new(fonts: Arc<FontBook>) -> Self {
        Self { fonts, base_cache: None }
    }

    pub fn fonts(&self) -> &FontBook {
        &self.fonts
    }

    pub fn render(
        &mut self,
        surface: &mut Surface,
        bitmap: &Bitmap,
        adjustments: &AdjustmentSettings,
        overlays: &[TextOverlay],
        selected: Option<OverlayId>,
    ) {
        let (w, h) = bitmap.dimensions();

        // 1. Native resolution target.
        if surface.image.dimensions() != (w, h) {
            surface.image = RgbaImage::new(w, h);
        }

        // 2. Base layer through the adjustment transform.
        let base = self.adjusted_base(bitmap, adjustments);
        surface.image.copy_from_slice(base.as_raw());

        // 3-4. Overlays, unfiltered, in insertion order.
        for overlay in overlays {
            self.draw_overlay(&mut surface.image, overlay);
        }

        // 5. Selection outline, preview only.
        if surface.kind == SurfaceKind::Preview
            && let Some(id) = selected
            && let Some(overlay) = overlays.iter().find(|o| o.id == id)
        {
            let bounds = overlay_bounds(overlay, w, h, self.fonts.as_ref());
            draw_dashed_rect(&mut surface.image, &bounds);
        }
    }

    /// One-shot render onto a fresh export surface.
    pub fn render_export(
        &mut self,
        bitmap: &Bitmap,
        adjustments: &AdjustmentSettings,
        overlays: &[TextOverlay],
    ) -> RgbaImage {
        let mut surface = Surface::export();
        self.render(&mut surface, bitmap, adjustments, overlays, None);
        surface.into_image()
    }

    fn adjusted_base<'a>(
        &'a mut self,
        bitmap: &'a Bitmap,
        adjustments: &AdjustmentSettings,
    ) -> &'a RgbaImage {
        let adjustments = adjustments.clamped();
        let stale = match &self.base_cache {
            Some(c) => c.bitmap_id != bitmap.id() || c.adjustments != adjustments,
            None => true,
        };
        if stale {
            let image = RenderTransform::from_settings(&adjustments).apply_to(bitmap.pixels());
            self.base_cache = Some(BaseCache { bitmap_id: bitmap.id(), adjustments, image });
        }
        match &self.base_cache {
            Some(c) => &c.image,
            None => bitmap.pixels(),
        }
    }

    fn draw_overlay(&self, image: &mut RgbaImage, overlay: &TextOverlay) {
        let (w, h) = image.dimensions();
        let size = effective_font_size(overlay.font_size, w);
        let anchor = overlay_anchor(overlay, w, h);
        let font = self.fonts.font_for(&overlay.font_family);
        let [r, g, b] = overlay.color;

        draw_text_centered(
            image,
            &font,
            &overlay.text,
            size,
            anchor.x + SHADOW_OFFSET,
            anchor.y + SHADOW_OFFSET,
            SHADOW_COLOR,
        );
        draw_text_centered(image, &font, &overlay.text, size, anchor.x, anchor.y, [r, g, b, 255]);
    }
}

// ============================================================================
// SELECTION OUTLINE
// ============================================================================

fn draw_dashed_rect(image: &mut RgbaImage, b: &BoundingBox) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    let pad = OUTLINE_WIDTH.max(DASH_WIDTH);
    let finite = [b.min_x, b.min_y, b.max_x, b.max_y].iter().all(|v| v.is_finite());
    if !finite || b.max_x < -pad || b.max_y < -pad || b.min_x > w + pad || b.min_y > h + pad {
        return;
    }
    for (width, color, dashed) in [(OUTLINE_WIDTH, OUTLINE_COLOR, false), (DASH_WIDTH, DASH_COLOR, true)] {
        let half = width * 0.5;
        // top, bottom
        for y in [b.min_y, b.max_y] {
            for (x0, x1) in dash_spans(b.min_x, b.max_x, (-half, w + half), dashed) {
                fill_rect(image, x0 - half, y - half, x1 + half, y + half, color);
            }
        }
        // left, right
        for x in [b.min_x, b.max_x] {
            for (y0, y1) in dash_spans(b.min_y, b.max_y, (-half, h + half), dashed) {
                fill_rect(image, x - half, y0 - half, x + half, y1 + half, color);
            }
        }
    }
}

/// Dash intervals along `start..end` that fall inside `window`. The pattern
/// is phased from `start`, so clipping does not shift it.
fn dash_spans(start: f32, end: f32, window: (f32, f32), dashed: bool) -> Vec<(f32, f32)> {
    let (lo, hi) = (start.max(window.0), end.min(window.1));
    if lo >= hi {
        return Vec::new();
    }
    if !dashed {
        return vec![(lo, hi)];
    }
    let period = f64::from(DASH_LEN + GAP_LEN);
    let (lo, hi) = (f64::from(lo), f64::from(hi));
    let first = lo - (lo - f64::from(start)).rem_euclid(period);
    let count = ((hi - first) / period).ceil() as usize;
    (0..count)
        .filter_map(|i| {
            let t = first + i as f64 * period;
            let (a, b) = (t.max(lo), (t + f64::from(DASH_LEN)).min(hi));
            (a < b).then_some((a as f32, b as f32))
        })
        .collect()
}

fn fill_rect(image: &mut RgbaImage, x0: f32, y0: f32, x1: f32, y1: f32, color: [u8; 4]) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    let xa = x0.round().clamp(0.0, w) as u32;
    let xb = x1.round().clamp(0.0, w) as u32;
    let ya = y0.round().clamp(0.0, h) as u32;
    let yb = y1.round().clamp(0.0, h) as u32;
    for y in ya..yb {
        for x in xa..xb {
            blend_pixel(image, x, y, color, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::{OverlayEdit, OverlayModel};
    use image::Rgba;

    fn fonts() -> Arc<FontBook> {
        Arc::new(FontBook::bundled_only().expect("font book"))
    }

    fn checker(w: u32, h: u32) -> Bitmap {
        Bitmap::new(RgbaImage::from_fn(w, h, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 { Rgba([40, 90, 160, 255]) } else { Rgba([220, 200, 30, 255]) }
        }))
    }

    #[test]
    fn display_mapping_scales_per_axis() {
        let m = CoordinateMapper::new((1920, 1080), (960.0, 270.0)).expect("mapper");
        let p = m.display_to_bitmap(Point::new(480.0, 135.0));
        assert_eq!(p, Point::new(960.0, 540.0));
        assert_eq!(m.bitmap_to_display(p), Point::new(480.0, 135.0));
        assert!(CoordinateMapper::new((0, 10), (10.0, 10.0)).is_none());
        assert!(CoordinateMapper::new((10, 10), (0.0, 10.0)).is_none());
    }

    #[test]
    fn percent_round_trip() {
        for &(w, h) in &[(1920u32, 1080u32), (7, 3), (640, 480)] {
            for &(x, y) in &[(0.0f32, 0.0f32), (13.7, 99.1), (-40.0, 2000.0), (w as f32, h as f32)] {
                let p = Point::new(x, y);
                let back = percent_to_pixel(pixel_to_percent(p, w, h), w, h);
                assert!((back.x - p.x).abs() < 1e-3 && (back.y - p.y).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn surface_takes_native_resolution() {
        let mut compositor = Compositor::new(fonts());
        let bitmap = checker(64, 48);
        let mut surface = Surface::preview();
        compositor.render(&mut surface, &bitmap, &AdjustmentSettings::default(), &[], None);
        assert_eq!(surface.dimensions(), (64, 48));
        assert_eq!(surface.image(), bitmap.pixels());
    }

    #[test]
    fn preview_and_export_match_without_selection() {
        let mut compositor = Compositor::new(fonts());
        let bitmap = checker(320, 180);
        let mut model = OverlayModel::default();
        model.add("TOP").expect("added");
        let b = model.add("Bottom").expect("added");
        model.update(b, OverlayEdit::Y(80.0)).expect("present");
        let adj = AdjustmentSettings { contrast: 140.0, blur: 1.0, ..Default::default() };

        let mut preview = Surface::preview();
        compositor.render(&mut preview, &bitmap, &adj, model.list(), None);
        let export = compositor.render_export(&bitmap, &adj, model.list());
        assert_eq!(preview.image(), &export);
    }

    #[test]
    fn selection_outline_only_on_preview() {
        let mut compositor = Compositor::new(fonts());
        let bitmap = checker(320, 180);
        let mut model = OverlayModel::default();
        let id = model.add("SELECTED").expect("added");
        let adj = AdjustmentSettings::default();

        let mut plain = Surface::preview();
        compositor.render(&mut plain, &bitmap, &adj, model.list(), None);
        let mut outlined = Surface::preview();
        compositor.render(&mut outlined, &bitmap, &adj, model.list(), Some(id));
        let mut export = Surface::export();
        compositor.render(&mut export, &bitmap, &adj, model.list(), Some(id));

        assert_ne!(plain.image(), outlined.image());
        assert_eq!(plain.image(), export.image());
    }

    #[test]
    fn overlays_ignore_adjustments() {
        let mut compositor = Compositor::new(fonts());
        let bitmap = Bitmap::new(RgbaImage::from_pixel(400, 200, Rgba([0, 0, 0, 255])));
        let mut model = OverlayModel::default();
        model.add("WWWW").expect("added");
        let adj = AdjustmentSettings { grayscale: 100.0, ..Default::default() };
        model.style.color = [255, 0, 0];
        let id = model.add("RED").expect("added");
        model.update(id, OverlayEdit::Y(20.0)).expect("present");
        let out = compositor.render_export(&bitmap, &adj, model.list());
        // Pure red survives because overlays are drawn after the filter stage.
        assert!(out.pixels().any(|p| p[0] == 255 && p[1] == 0 && p[2] == 0));
    }

    #[test]
    fn selected_overlay_far_off_canvas_renders() {
        let mut compositor = Compositor::new(fonts());
        let bitmap = checker(1280, 720);
        let adj = AdjustmentSettings::default();
        let mut model = OverlayModel::default();
        let id = model.add("FAR AWAY").expect("added");

        for edit in [OverlayEdit::X(1e8), OverlayEdit::X(-1e8), OverlayEdit::X(2.5e7), OverlayEdit::Y(-3e9)] {
            model.update(id, OverlayEdit::X(50.0)).expect("present");
            model.update(id, OverlayEdit::Y(50.0)).expect("present");
            model.update(id, edit.clone()).expect("present");
            let mut preview = Surface::preview();
            compositor.render(&mut preview, &bitmap, &adj, model.list(), Some(id));
            assert_eq!(preview.image(), bitmap.pixels(), "{:?}", edit);
        }
    }

    #[test]
    fn oversized_font_request_still_renders() {
        let mut compositor = Compositor::new(fonts());
        let bitmap = checker(320, 180);
        let adj = AdjustmentSettings::default();
        let mut model = OverlayModel::default();
        let id = model.add("BIG").expect("added");
        model.update(id, OverlayEdit::FontSize(f32::INFINITY)).expect("present");
        let mut preview = Surface::preview();
        compositor.render(&mut preview, &bitmap, &adj, model.list(), Some(id));
        assert_ne!(preview.image(), bitmap.pixels());
    }

    #[test]
    fn dashes_keep_phase_when_clipped() {
        let spans = dash_spans(-1e9, 1e9, (0.0, 120.0), true);
        assert_eq!(spans.len(), 11);
        assert_eq!(spans[0], (0.0, 4.0));
        assert_eq!(spans[10], (116.0, 120.0));
        assert!(dash_spans(3.2e8, 3.2e8 + 120.0, (-1.0, 1281.0), true).is_empty());
        assert_eq!(dash_spans(10.0, 50.0, (0.0, 100.0), false), vec![(10.0, 50.0)]);
        assert_eq!(dash_spans(0.0, 30.0, (-1.0, 100.0), true), vec![(0.0, 8.0), (12.0, 20.0), (24.0, 30.0)]);
    }

    #[test]
    fn effective_size_tracks_bitmap_width() {
        assert_eq!(effective_font_size(64.0, 1280), 64.0);
        assert_eq!(effective_font_size(64.0, 2560), 128.0);
    }
}
