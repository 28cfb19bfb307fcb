use crate::canvas::{effective_font_size, overlay_anchor, pixel_to_percent, Point};
use crate::ops::text::{FontSpec, TextMeasure};
use crate::overlay::{OverlayEdit, OverlayId, OverlayModel, TextOverlay};

// ============================================================================
// HIT TESTING
// ============================================================================

/// Axis-aligned box in bitmap pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl BoundingBox {
    pub fn centered(center: Point, width: f32, height: f32) -> Self {
        Self {
            min_x: center.x - width * 0.5,
            min_y: center.y - height * 0.5,
            max_x: center.x + width * 0.5,
            max_y: center.y + height * 0.5,
        }
    }

    /// Edges count as inside.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }
}

/// Rendered box of an overlay: measured text width by effective font size,
/// centred on the overlay's anchor. The height is the font size itself, not
/// the glyphs' true ascent/descent.
pub fn overlay_bounds(
    overlay: &TextOverlay,
    bitmap_width: u32,
    bitmap_height: u32,
    measure: &dyn TextMeasure,
) -> BoundingBox {
    let size = effective_font_size(overlay.font_size, bitmap_width);
    let width = measure.measure_text(&overlay.text, &FontSpec { family: &overlay.font_family, size_px: size });
    let anchor = overlay_anchor(overlay, bitmap_width, bitmap_height);
    BoundingBox::centered(anchor, width, size)
}

/// Topmost overlay whose box contains `point` (bitmap pixels), scanning from
/// the last inserted overlay down.
pub fn hit_test(
    point: Point,
    overlays: &[TextOverlay],
    bitmap: (u32, u32),
    measure: &dyn TextMeasure,
) -> Option<OverlayId> {
    overlays
        .iter()
        .rev()
        .find(|o| overlay_bounds(o, bitmap.0, bitmap.1, measure).contains(point))
        .map(|o| o.id)
}

// ============================================================================
// DRAG CONTROLLER
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DragState {
    Idle,
    Selected(OverlayId),
    Dragging(OverlayId),
}

/// Transient state of an active drag; dropped on pointer-up.
#[derive(Clone, Copy, Debug, PartialEq)]
struct ActiveDrag {
    id: OverlayId,
    /// pointer − anchor at pointer-down, in bitmap pixels
    offset: Point,
}

/// Pointer-driven select-and-drag for overlays. All points are bitmap pixels;
/// map display coordinates through `CoordinateMapper` first.
#[derive(Clone, Debug, Default)]
pub struct DragController {
    active: Option<ActiveDrag>,
}

impl DragController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, model: &OverlayModel) -> DragState {
        match (self.active, model.selected()) {
            (Some(drag), _) => DragState::Dragging(drag.id),
            (None, Some(id)) => DragState::Selected(id),
            (None, None) => DragState::Idle,
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.active.is_some()
    }

    /// Hit-test and start dragging the struck overlay, or clear the selection
    /// on a miss. Returns the overlay now being dragged.
    pub fn pointer_down(
        &mut self,
        point: Point,
        model: &mut OverlayModel,
        bitmap: (u32, u32),
        measure: &dyn TextMeasure,
    ) -> Option<OverlayId> {
        match hit_test(point, model.list(), bitmap, measure) {
            Some(id) => {
                let anchor = model
                    .get(id)
                    .map(|o| overlay_anchor(o, bitmap.0, bitmap.1))
                    .unwrap_or(point);
                model.select(Some(id)).ok()?;
                self.active = Some(ActiveDrag { id, offset: point - anchor });
                Some(id)
            }
            None => {
                model.deselect();
                self.active = None;
                None
            }
        }
    }

    /// Move the dragged overlay so its anchor stays `offset` away from the
    /// pointer. Returns true when the model changed. A drag whose overlay has
    /// vanished ends quietly.
    pub fn pointer_move(&mut self, point: Point, model: &mut OverlayModel, bitmap: (u32, u32)) -> bool {
        let Some(drag) = self.active else { return false };
        if !model.contains(drag.id) {
            self.active = None;
            return false;
        }
        let anchor = point - drag.offset;
        let pct = pixel_to_percent(anchor, bitmap.0, bitmap.1);
        let moved_x = model.update(drag.id, OverlayEdit::X(pct.x)).is_ok();
        let moved_y = model.update(drag.id, OverlayEdit::Y(pct.y)).is_ok();
        moved_x || moved_y
    }

    /// End the drag. The selection is kept and the last position stands.
    pub fn pointer_up(&mut self) {
        self.active = None;
    }

    /// Pointer left the surface; same as releasing.
    pub fn pointer_leave(&mut self) {
        self.pointer_up();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::percent_to_pixel;
    use crate::ops::text::FontFamily;

    /// Fixed advance per character, independent of font.
    struct MonoMeasure(f32);

    impl TextMeasure for MonoMeasure {
        fn measure_text(&self, text: &str, font: &FontSpec<'_>) -> f32 {
            text.chars().count() as f32 * self.0 * font.size_px
        }
    }

    const BITMAP: (u32, u32) = (1280, 720);

    fn model_with(texts: &[&str]) -> (OverlayModel, Vec<OverlayId>) {
        let mut model = OverlayModel::default();
        model.style.font_size = 40.0;
        model.style.font_family = FontFamily::Sans;
        let ids = texts.iter().map(|t| model.add(t).expect("added")).collect();
        (model, ids)
    }

    #[test]
    fn box_is_centred_on_anchor() {
        let (model, ids) = model_with(&["ABCD"]);
        let o = model.get(ids[0]).expect("present");
        let b = overlay_bounds(o, BITMAP.0, BITMAP.1, &MonoMeasure(0.5));
        assert_eq!(b.width(), 80.0);
        assert_eq!(b.height(), 40.0);
        assert_eq!((b.min_x + b.max_x) / 2.0, 640.0);
        assert_eq!((b.min_y + b.max_y) / 2.0, 360.0);
    }

    #[test]
    fn box_scales_with_bitmap_width() {
        let (model, ids) = model_with(&["ABCD"]);
        let o = model.get(ids[0]).expect("present");
        let small = overlay_bounds(o, 640, 360, &MonoMeasure(0.5));
        let large = overlay_bounds(o, 2560, 1440, &MonoMeasure(0.5));
        assert_eq!(large.width() / small.width(), 4.0);
        assert_eq!(large.height() / small.height(), 4.0);
    }

    #[test]
    fn topmost_overlay_wins() {
        let (model, ids) = model_with(&["AAAA", "BBBB"]);
        let hit = hit_test(Point::new(640.0, 360.0), model.list(), BITMAP, &MonoMeasure(0.5));
        assert_eq!(hit, Some(ids[1]));
    }

    #[test]
    fn miss_returns_none() {
        let (model, _) = model_with(&["AAAA"]);
        let hit = hit_test(Point::new(10.0, 10.0), model.list(), BITMAP, &MonoMeasure(0.5));
        assert_eq!(hit, None);
        assert_eq!(hit_test(Point::new(1.0, 1.0), &[], BITMAP, &MonoMeasure(0.5)), None);
    }

    #[test]
    fn lower_overlay_reachable_outside_upper_box() {
        let (mut model, ids) = model_with(&["AAAAAAAAAA", "B"]);
        model.update(ids[1], OverlayEdit::X(50.0)).expect("present");
        // Wide bottom label extends 100px each side; the short top one only 10px.
        let hit = hit_test(Point::new(700.0, 360.0), model.list(), BITMAP, &MonoMeasure(0.5));
        assert_eq!(hit, Some(ids[0]));
    }

    #[test]
    fn drag_preserves_grab_offset() {
        let (mut model, ids) = model_with(&["DRAG"]);
        let measure = MonoMeasure(0.5);
        let mut drag = DragController::new();
        let down = Point::new(660.0, 370.0);
        assert_eq!(drag.pointer_down(down, &mut model, BITMAP, &measure), Some(ids[0]));
        assert_eq!(drag.state(&model), DragState::Dragging(ids[0]));

        let delta = Point::new(-200.0, 95.0);
        assert!(drag.pointer_move(down + delta, &mut model, BITMAP));
        let o = model.get(ids[0]).expect("present");
        let anchor = percent_to_pixel(Point::new(o.x, o.y), BITMAP.0, BITMAP.1);
        assert!((anchor.x - (640.0 + delta.x)).abs() < 1e-3);
        assert!((anchor.y - (360.0 + delta.y)).abs() < 1e-3);

        drag.pointer_up();
        assert_eq!(drag.state(&model), DragState::Selected(ids[0]));
        assert!(!drag.pointer_move(Point::new(0.0, 0.0), &mut model, BITMAP));
    }

    #[test]
    fn pointer_down_on_empty_space_clears_selection() {
        let (mut model, _) = model_with(&["X"]);
        let mut drag = DragController::new();
        assert!(model.selected().is_some());
        assert_eq!(drag.pointer_down(Point::new(5.0, 5.0), &mut model, BITMAP, &MonoMeasure(0.5)), None);
        assert_eq!(model.selected(), None);
        assert_eq!(drag.state(&model), DragState::Idle);
    }

    #[test]
    fn drag_can_leave_the_canvas() {
        let (mut model, ids) = model_with(&["EDGE"]);
        let mut drag = DragController::new();
        drag.pointer_down(Point::new(640.0, 360.0), &mut model, BITMAP, &MonoMeasure(0.5));
        drag.pointer_move(Point::new(-100.0, 900.0), &mut model, BITMAP);
        drag.pointer_leave();
        let o = model.get(ids[0]).expect("present");
        assert!(o.x < 0.0 && o.y > 100.0);
        assert!(!drag.is_dragging());
    }

    #[test]
    fn drag_of_deleted_overlay_ends_quietly() {
        let (mut model, ids) = model_with(&["GONE"]);
        let mut drag = DragController::new();
        drag.pointer_down(Point::new(640.0, 360.0), &mut model, BITMAP, &MonoMeasure(0.5));
        model.remove(ids[0]).expect("present");
        assert!(!drag.pointer_move(Point::new(700.0, 400.0), &mut model, BITMAP));
        assert_eq!(drag.state(&model), DragState::Idle);
    }
}
