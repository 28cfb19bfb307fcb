//! ThumbFE: thumbnail compositing engine.
//!
//! A bitmap goes through an adjustment pipeline, gets draggable text
//! overlays composited on top, and is exported (optionally after an AI
//! edit). `EditorSession` is the entry point; the CLI in `cli` drives it
//! headlessly.

#![allow(clippy::too_many_arguments)]

#[macro_use]
pub mod logger;

pub mod canvas;
pub mod cli;
pub mod components;
pub mod error;
pub mod io;
pub mod ops;
pub mod overlay;
pub mod session;
pub mod settings;

pub use canvas::{Bitmap, Compositor, CoordinateMapper, Point, Surface, SurfaceKind};
pub use components::tools::{hit_test, BoundingBox, DragController, DragState};
pub use error::{EditorError, Result};
pub use io::{BitmapSource, ExportFormat, ExportedImage};
pub use ops::adjustments::{AdjustmentKind, AdjustmentSettings, RenderTransform};
pub use ops::ai::ImageEditor;
pub use ops::text::{FontBook, FontFamily, TextMeasure};
pub use overlay::{OverlayEdit, OverlayId, OverlayModel, OverlayStyle, TextOverlay};
pub use session::{EditorSession, JobKind, SessionEvent};
pub use settings::EditorSettings;
