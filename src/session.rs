// ============================================================================
// EDITOR SESSION: canonical state, busy gate, background jobs
// ============================================================================
//
// The session lives on one owning thread (the UI thread, or main in the
// CLI). Fetch, export and AI edit do their slow part on the rayon pool and
// report back through an mpsc channel; the owner drains it with `poll()`
// every tick, or blocks in `wait()`. Exactly one such job can be in flight.
//
// Every mutation ends with a full preview re-render.
// ============================================================================

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use crate::canvas::{Bitmap, Compositor, CoordinateMapper, Point, Surface};
use crate::components::tools::{DragController, DragState};
use crate::error::{EditorError, Result};
use crate::io::{decode_bitmap, encode_image, extract_video_id, BitmapSource, ExportFormat, ExportedImage, YoutubeThumbnailSource};
use crate::ops::adjustments::{AdjustmentKind, AdjustmentSettings};
use crate::ops::ai::{GeminiImageEditor, ImageEditor};
use crate::ops::text::FontBook;
use crate::overlay::{OverlayEdit, OverlayId, OverlayModel, OverlayStyle, TextOverlay};
use crate::settings::EditorSettings;

/// The mutually exclusive long-running operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobKind {
    Fetch,
    Export,
    AiEdit,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Fetch => write!(f, "fetch"),
            JobKind::Export => write!(f, "export"),
            JobKind::AiEdit => write!(f, "AI edit"),
        }
    }
}

/// Completion notices returned from `poll` / `wait`.
#[derive(Debug)]
pub enum SessionEvent {
    /// A fetched or AI-edited bitmap replaced the current one.
    ImageLoaded { width: u32, height: u32 },
    ExportReady(ExportedImage),
    /// The job ended in error; state is as it was before the job started.
    JobFailed { job: JobKind, error: EditorError },
}

enum JobOutcome {
    Fetched(Result<Bitmap>),
    Exported(Result<ExportedImage>),
    Edited(Result<Bitmap>),
}

impl JobOutcome {
    fn kind(&self) -> JobKind {
        match self {
            JobOutcome::Fetched(_) => JobKind::Fetch,
            JobOutcome::Exported(_) => JobKind::Export,
            JobOutcome::Edited(_) => JobKind::AiEdit,
        }
    }
}

pub struct EditorSession {
    bitmap: Option<Bitmap>,
    adjustments: AdjustmentSettings,
    overlays: OverlayModel,
    drag: DragController,
    compositor: Compositor,
    preview: Surface,
    busy: Option<JobKind>,

    source: Arc<dyn BitmapSource>,
    editor: Arc<dyn ImageEditor>,
    job_tx: mpsc::Sender<JobOutcome>,
    job_rx: mpsc::Receiver<JobOutcome>,
}

impl EditorSession {
    pub fn new(fonts: Arc<FontBook>, source: Arc<dyn BitmapSource>, editor: Arc<dyn ImageEditor>) -> Self {
        let (job_tx, job_rx) = mpsc::channel();
        Self {
            bitmap: None,
            adjustments: AdjustmentSettings::default(),
            overlays: OverlayModel::default(),
            drag: DragController::new(),
            compositor: Compositor::new(fonts),
            preview: Surface::preview(),
            busy: None,
            source,
            editor,
            job_tx,
            job_rx,
        }
    }

    /// Session wired to the real thumbnail CDN and AI service.
    pub fn from_settings(settings: &EditorSettings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.request_timeout_secs);
        let source: Arc<dyn BitmapSource> = Arc::new(YoutubeThumbnailSource::new(timeout)?);
        let editor: Arc<dyn ImageEditor> = Arc::new(GeminiImageEditor::from_settings(settings)?);
        let mut session = Self::new(Arc::new(FontBook::new()?), source, editor);
        session.set_overlay_style(settings.overlay_style());
        Ok(session)
    }

    // ---- accessors ----

    pub fn bitmap(&self) -> Option<&Bitmap> {
        self.bitmap.as_ref()
    }

    pub fn adjustments(&self) -> &AdjustmentSettings {
        &self.adjustments
    }

    pub fn overlays(&self) -> &[TextOverlay] {
        self.overlays.list()
    }

    pub fn overlay(&self, id: OverlayId) -> Option<&TextOverlay> {
        self.overlays.get(id)
    }

    pub fn selected(&self) -> Option<OverlayId> {
        self.overlays.selected()
    }

    pub fn drag_state(&self) -> DragState {
        self.drag.state(&self.overlays)
    }

    /// Current interactive render. Empty until a bitmap is loaded.
    pub fn preview(&self) -> &Surface {
        &self.preview
    }

    pub fn busy(&self) -> Option<JobKind> {
        self.busy
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_some()
    }

    pub fn overlay_style(&self) -> &OverlayStyle {
        &self.overlays.style
    }

    /// Appearance used by later `add_overlay` calls. The font size is
    /// clamped into range.
    pub fn set_overlay_style(&mut self, style: OverlayStyle) {
        self.overlays.style = style.clamped();
    }

    // ---- gates ----

    fn ensure_idle(&self) -> Result<()> {
        match self.busy {
            Some(running) => {
                crate::log_warn!("rejected: {} is still in progress", running);
                Err(EditorError::ConcurrencyViolation { running })
            }
            None => Ok(()),
        }
    }

    /// Idle and holding a bitmap.
    fn ensure_ready(&self) -> Result<&Bitmap> {
        self.ensure_idle()?;
        self.bitmap.as_ref().ok_or(EditorError::NoImageLoaded)
    }

    // ---- image load / reset ----

    /// Decode and install local image bytes. Same reset rules as a fetch.
    pub fn load_image_bytes(&mut self, bytes: &[u8]) -> Result<(u32, u32)> {
        self.ensure_idle()?;
        let bitmap = decode_bitmap(bytes)?;
        Ok(self.install_bitmap(bitmap))
    }

    /// Install an already-decoded image.
    pub fn load_image(&mut self, pixels: image::RgbaImage) -> Result<(u32, u32)> {
        self.ensure_idle()?;
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(EditorError::invalid("image has no pixels"));
        }
        Ok(self.install_bitmap(Bitmap::new(pixels)))
    }

    fn install_bitmap(&mut self, bitmap: Bitmap) -> (u32, u32) {
        let dims = bitmap.dimensions();
        crate::log_info!("image loaded: {}x{}", dims.0, dims.1);
        self.bitmap = Some(bitmap);
        self.adjustments = AdjustmentSettings::default();
        self.overlays.clear();
        self.drag = DragController::new();
        self.refresh_preview();
        dims
    }

    /// Neutral adjustments, no overlays, same bitmap.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.adjustments = AdjustmentSettings::default();
        self.overlays.clear();
        self.drag = DragController::new();
        self.refresh_preview();
        Ok(())
    }

    // ---- adjustments ----

    /// Set one knob, clamped into range. Returns the stored value.
    pub fn set_adjustment(&mut self, kind: AdjustmentKind, value: f32) -> Result<f32> {
        self.ensure_ready()?;
        let stored = self.adjustments.set(kind, value);
        self.refresh_preview();
        Ok(stored)
    }

    /// Replace every knob at once (clamped).
    pub fn set_adjustments(&mut self, adjustments: AdjustmentSettings) -> Result<()> {
        self.ensure_ready()?;
        self.adjustments = adjustments.clamped();
        self.refresh_preview();
        Ok(())
    }

    // ---- overlays ----

    /// Add a centred overlay with the current style and select it.
    pub fn add_overlay(&mut self, text: &str) -> Result<OverlayId> {
        self.ensure_ready()?;
        let id = self
            .overlays
            .add(text)
            .ok_or_else(|| EditorError::invalid("overlay text is empty"))?;
        self.refresh_preview();
        Ok(id)
    }

    /// Returns whether anything changed. The model reports stale ids as
    /// `NotFound`; here they are a silent no-op.
    pub fn update_overlay(&mut self, id: OverlayId, edit: OverlayEdit) -> bool {
        let changed = self.overlays.update(id, edit).is_ok();
        if changed {
            self.refresh_preview();
        }
        changed
    }

    pub fn remove_overlay(&mut self, id: OverlayId) -> bool {
        let removed = self.overlays.remove(id).is_ok();
        if removed {
            self.refresh_preview();
        }
        removed
    }

    pub fn select_overlay(&mut self, id: Option<OverlayId>) -> bool {
        let changed = self.overlays.selected() != id && self.overlays.select(id).is_ok();
        if changed {
            self.refresh_preview();
        }
        changed
    }

    // ---- pointer input (display coordinates) ----

    fn mapper(&self, display_size: (f32, f32)) -> Option<CoordinateMapper> {
        let bitmap = self.bitmap.as_ref()?;
        CoordinateMapper::new(bitmap.dimensions(), display_size)
    }

    /// Press at `point`, given relative to the displayed preview of size
    /// `display_size`. Returns the overlay now being dragged.
    pub fn pointer_down(&mut self, point: Point, display_size: (f32, f32)) -> Option<OverlayId> {
        let mapper = self.mapper(display_size)?;
        let before = self.overlays.selected();
        let hit = self.drag.pointer_down(
            mapper.display_to_bitmap(point),
            &mut self.overlays,
            (mapper.bitmap_width, mapper.bitmap_height),
            self.compositor.fonts(),
        );
        if self.overlays.selected() != before {
            self.refresh_preview();
        }
        hit
    }

    pub fn pointer_move(&mut self, point: Point, display_size: (f32, f32)) -> bool {
        let Some(mapper) = self.mapper(display_size) else { return false };
        let moved = self.drag.pointer_move(
            mapper.display_to_bitmap(point),
            &mut self.overlays,
            (mapper.bitmap_width, mapper.bitmap_height),
        );
        if moved {
            self.refresh_preview();
        }
        moved
    }

    pub fn pointer_up(&mut self) {
        self.drag.pointer_up();
    }

    pub fn pointer_leave(&mut self) {
        self.drag.pointer_leave();
    }

    // ---- rendering ----

    fn refresh_preview(&mut self) {
        if let Some(bitmap) = &self.bitmap {
            self.compositor.render(
                &mut self.preview,
                bitmap,
                &self.adjustments,
                self.overlays.list(),
                self.overlays.selected(),
            );
        }
    }

    /// Export-surface render of the current state (never outlined).
    pub fn render_export(&mut self) -> Result<image::RgbaImage> {
        let bitmap = self.bitmap.as_ref().ok_or(EditorError::NoImageLoaded)?;
        Ok(self.compositor.render_export(bitmap, &self.adjustments, self.overlays.list()))
    }

    // ---- long-running jobs ----

    fn spawn_job<F>(&mut self, kind: JobKind, job: F)
    where
        F: FnOnce() -> JobOutcome + Send + 'static,
    {
        self.busy = Some(kind);
        crate::log_info!("{} started", kind);
        let tx = self.job_tx.clone();
        rayon::spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|_| {
                let error = EditorError::unavailable(format!("{} job panicked", kind));
                match kind {
                    JobKind::Fetch => JobOutcome::Fetched(Err(error)),
                    JobKind::Export => JobOutcome::Exported(Err(error)),
                    JobKind::AiEdit => JobOutcome::Edited(Err(error)),
                }
            });
            let _ = tx.send(outcome);
        });
    }

    /// Fetch the thumbnail for a video URL. Malformed URLs fail here, before
    /// any network activity.
    pub fn start_fetch(&mut self, url: &str) -> Result<()> {
        self.ensure_idle()?;
        let video_id = extract_video_id(url)?;
        let source = Arc::clone(&self.source);
        self.spawn_job(JobKind::Fetch, move || {
            JobOutcome::Fetched(source.fetch(&video_id).and_then(|bytes| decode_bitmap(&bytes)))
        });
        Ok(())
    }

    /// Render the export surface now and encode it in the background.
    pub fn start_export(&mut self, format: ExportFormat) -> Result<()> {
        let bitmap = self.ensure_ready()?.clone();
        let image = self.compositor.render_export(&bitmap, &self.adjustments, self.overlays.list());
        self.spawn_job(JobKind::Export, move || {
            let (width, height) = image.dimensions();
            JobOutcome::Exported(
                encode_image(&image, format).map(|bytes| ExportedImage { format, width, height, bytes }),
            )
        });
        Ok(())
    }

    /// Send the composited image through the AI editor. On success the
    /// answer becomes the new bitmap (adjustments and overlays reset, since
    /// they are baked into it).
    pub fn start_ai_edit(&mut self, instruction: &str) -> Result<()> {
        let bitmap = self.ensure_ready()?.clone();
        let instruction = instruction.trim().to_string();
        if instruction.is_empty() {
            return Err(EditorError::invalid("AI instruction is empty"));
        }
        let image = self.compositor.render_export(&bitmap, &self.adjustments, self.overlays.list());
        let editor = Arc::clone(&self.editor);
        self.spawn_job(JobKind::AiEdit, move || {
            let format = ExportFormat::Png;
            let result = encode_image(&image, format)
                .and_then(|png| editor.edit(&png, format.mime_type(), &instruction))
                .and_then(|bytes| decode_bitmap(&bytes));
            JobOutcome::Edited(result)
        });
        Ok(())
    }

    /// Apply every finished job. Call once per UI tick.
    pub fn poll(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(outcome) = self.job_rx.try_recv() {
            events.push(self.finish(outcome));
        }
        events
    }

    /// Block until the running job (if any) finishes, then apply it.
    pub fn wait(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while self.busy.is_some() {
            match self.job_rx.recv() {
                Ok(outcome) => events.push(self.finish(outcome)),
                Err(_) => {
                    self.busy = None;
                }
            }
        }
        events.extend(self.poll());
        events
    }

    fn finish(&mut self, outcome: JobOutcome) -> SessionEvent {
        let job = outcome.kind();
        self.busy = None;
        let event = match outcome {
            JobOutcome::Fetched(Ok(bitmap)) | JobOutcome::Edited(Ok(bitmap)) => {
                let (width, height) = self.install_bitmap(bitmap);
                SessionEvent::ImageLoaded { width, height }
            }
            JobOutcome::Exported(Ok(exported)) => {
                crate::log_info!(
                    "export ready: {}x{} {} ({} bytes)",
                    exported.width,
                    exported.height,
                    exported.mime_type(),
                    exported.bytes.len()
                );
                SessionEvent::ExportReady(exported)
            }
            JobOutcome::Fetched(Err(error))
            | JobOutcome::Exported(Err(error))
            | JobOutcome::Edited(Err(error)) => {
                crate::log_err!("{} failed: {}", job, error);
                SessionEvent::JobFailed { job, error }
            }
        };
        crate::log_info!("{} finished", job);
        event
    }
}
