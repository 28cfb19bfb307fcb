// ============================================================================
// OVERLAY MODEL: ordered text labels + the single selection
// ============================================================================
//
// Insertion order is paint order (later = on top) and reverse hit-test order.
// Positions are percentages of the bitmap's width/height and are not
// clamped, so a label can be dragged partly or wholly off the canvas.
// Non-finite positions are ignored. Font sizes are clamped to
// MIN_FONT_SIZE..=MAX_FONT_SIZE.
// ============================================================================

use std::fmt;
use uuid::Uuid;

use crate::error::{EditorError, Result};
use crate::ops::text::FontFamily;

pub const DEFAULT_FONT_SIZE: f32 = 64.0;
pub const MIN_FONT_SIZE: f32 = 1.0;
pub const MAX_FONT_SIZE: f32 = 1000.0;

/// Clamp a logical font size into range. A non-finite `size` takes
/// `fallback` instead (or the default, if that is non-finite too).
pub fn clamp_font_size(size: f32, fallback: f32) -> f32 {
    [size, fallback]
        .into_iter()
        .find(|s| s.is_finite())
        .unwrap_or(DEFAULT_FONT_SIZE)
        .clamp(MIN_FONT_SIZE, MAX_FONT_SIZE)
}

/// Opaque overlay identifier. Never reused within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OverlayId(Uuid);

impl OverlayId {
    fn fresh() -> Self {
        OverlayId(Uuid::new_v4())
    }
}

impl fmt::Display for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Appearance given to newly added overlays.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayStyle {
    pub color: [u8; 3],
    /// Logical size; scaled to the bitmap width at render time.
    pub font_size: f32,
    pub font_family: FontFamily,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self { color: [255, 255, 255], font_size: DEFAULT_FONT_SIZE, font_family: FontFamily::Sans }
    }
}

impl OverlayStyle {
    /// Same style with the font size brought into range.
    pub fn clamped(&self) -> Self {
        Self { font_size: clamp_font_size(self.font_size, DEFAULT_FONT_SIZE), ..self.clone() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextOverlay {
    pub id: OverlayId,
    pub text: String,
    /// Percent of bitmap width.
    pub x: f32,
    /// Percent of bitmap height.
    pub y: f32,
    pub color: [u8; 3],
    pub font_size: f32,
    pub font_family: FontFamily,
}

/// A single-field replacement for `OverlayModel::update`.
#[derive(Clone, Debug, PartialEq)]
pub enum OverlayEdit {
    Text(String),
    X(f32),
    Y(f32),
    Color([u8; 3]),
    FontSize(f32),
    FontFamily(FontFamily),
}

#[derive(Clone, Debug, Default)]
pub struct OverlayModel {
    overlays: Vec<TextOverlay>,
    selected: Option<OverlayId>,
    /// Appearance for `add`.
    pub style: OverlayStyle,
}

impl OverlayModel {
    pub fn new(style: OverlayStyle) -> Self {
        Self { overlays: Vec::new(), selected: None, style }
    }

    /// Append a centred overlay and select it. Blank text (after trimming)
    /// is refused and leaves the model untouched.
    pub fn add(&mut self, text: &str) -> Option<OverlayId> {
        if text.trim().is_empty() {
            return None;
        }
        let id = OverlayId::fresh();
        self.overlays.push(TextOverlay {
            id,
            text: text.to_string(),
            x: 50.0,
            y: 50.0,
            color: self.style.color,
            font_size: clamp_font_size(self.style.font_size, DEFAULT_FONT_SIZE),
            font_family: self.style.font_family.clone(),
        });
        self.selected = Some(id);
        Some(id)
    }

    /// Replace exactly one field.
    pub fn update(&mut self, id: OverlayId, edit: OverlayEdit) -> Result<()> {
        let style_size = self.style.font_size;
        let overlay = self
            .overlays
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(EditorError::NotFound)?;
        match edit {
            OverlayEdit::Text(text) => overlay.text = text,
            OverlayEdit::X(x) if x.is_finite() => overlay.x = x,
            OverlayEdit::Y(y) if y.is_finite() => overlay.y = y,
            OverlayEdit::X(_) | OverlayEdit::Y(_) => {}
            OverlayEdit::Color(color) => overlay.color = color,
            OverlayEdit::FontSize(size) => overlay.font_size = clamp_font_size(size, style_size),
            OverlayEdit::FontFamily(family) => overlay.font_family = family,
        }
        Ok(())
    }

    /// Remove an overlay, clearing the selection in the same step if it
    /// pointed at it.
    pub fn remove(&mut self, id: OverlayId) -> Result<()> {
        let index = self.overlays.iter().position(|o| o.id == id).ok_or(EditorError::NotFound)?;
        self.overlays.remove(index);
        if self.selected == Some(id) {
            self.selected = None;
        }
        Ok(())
    }

    pub fn list(&self) -> &[TextOverlay] {
        &self.overlays
    }

    pub fn get(&self, id: OverlayId) -> Option<&TextOverlay> {
        self.overlays.iter().find(|o| o.id == id)
    }

    pub fn contains(&self, id: OverlayId) -> bool {
        self.get(id).is_some()
    }

    pub fn selected(&self) -> Option<OverlayId> {
        self.selected
    }

    /// Select an existing overlay, or clear with `None`. Unknown ids leave
    /// the selection alone, so it always references a live overlay.
    pub fn select(&mut self, id: Option<OverlayId>) -> Result<()> {
        match id {
            Some(id) if !self.contains(id) => Err(EditorError::NotFound),
            other => {
                self.selected = other;
                Ok(())
            }
        }
    }

    pub fn deselect(&mut self) {
        self.selected = None;
    }

    /// Drop every overlay and the selection.
    pub fn clear(&mut self) {
        self.overlays.clear();
        self.selected = None;
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }
}

/// Parse `#rrggbb` / `rrggbb` into RGB.
pub fn parse_hex_color(s: &str) -> Option<[u8; 3]> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some([r, g, b])
}

pub fn format_hex_color(c: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", c[0], c[1], c[2])
}
