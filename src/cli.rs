// ============================================================================
// ThumbFE CLI: headless thumbnail composition
// ============================================================================
//
// Usage examples:
//   thumbfe --url https://youtu.be/dQw4w9WgXcQ --text "NEW VIDEO" -o out.jpg
//   thumbfe -i frame.png --contrast 130 --saturation 140 --text "PART 2@50,85" -o out.png
//   thumbfe -i frame.png --recipe look.json --ai "make the sky dramatic" -o out.webp
//
// Runs the same session, compositor and export path as an interactive
// front end; jobs are awaited with `EditorSession::wait`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{ArgGroup, Parser};
use serde::Deserialize;

use crate::error::EditorError;
use crate::io::{write_export, ExportFormat, ExportedImage};
use crate::ops::adjustments::{AdjustmentKind, AdjustmentSettings};
use crate::ops::text::FontFamily;
use crate::overlay::{clamp_font_size, parse_hex_color, OverlayEdit};
use crate::session::{EditorSession, JobKind, SessionEvent};
use crate::settings::EditorSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// ThumbFE headless thumbnail editor.
#[derive(Parser, Debug)]
#[command(
    name = "thumbfe",
    about = "Fetch or load an image, adjust it, add text overlays and export",
    group(ArgGroup::new("source").required(true).args(["url", "input"]))
)]
pub struct CliArgs {
    /// Video URL whose thumbnail is fetched.
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Local image file (PNG, JPEG, WEBP).
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Brightness, 0-200 (100 = unchanged).
    #[arg(long)]
    pub brightness: Option<f32>,

    /// Contrast, 0-200 (100 = unchanged).
    #[arg(long)]
    pub contrast: Option<f32>,

    /// Saturation, 0-200 (100 = unchanged).
    #[arg(long)]
    pub saturation: Option<f32>,

    /// Grayscale, 0-100.
    #[arg(long)]
    pub grayscale: Option<f32>,

    /// Sepia, 0-100.
    #[arg(long)]
    pub sepia: Option<f32>,

    /// Blur radius in pixels, 0-20.
    #[arg(long)]
    pub blur: Option<f32>,

    /// Overlay text, optionally positioned as "TEXT@X,Y" in percent.
    /// Repeat for several overlays; later ones paint on top.
    #[arg(short, long = "text", value_name = "TEXT[@X,Y]")]
    pub texts: Vec<String>,

    /// Overlay colour as #rrggbb.
    #[arg(long, value_name = "HEX")]
    pub color: Option<String>,

    /// Overlay font size (at 1280 px image width).
    #[arg(long)]
    pub font_size: Option<f32>,

    /// Overlay font: sans, serif, monospace, impact or an installed family name.
    #[arg(long, value_name = "FAMILY")]
    pub font: Option<String>,

    /// JSON recipe with "adjustments" and "overlays", applied before the flags above.
    #[arg(long, value_name = "FILE.json")]
    pub recipe: Option<PathBuf>,

    /// Send the composited image through the AI editor with this instruction.
    #[arg(long, value_name = "INSTRUCTION")]
    pub ai: Option<String>,

    /// Output file.
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Output format: png, jpeg, webp. Inferred from --output when omitted.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality, 1-100 (default from settings).
    #[arg(short, long, value_name = "1-100")]
    pub quality: Option<u8>,

    /// Print progress and mirror the log to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Recipe file
// ============================================================================

/// Saved edit: adjustments plus overlays, as JSON.
#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct EditRecipe {
    pub adjustments: AdjustmentSettings,
    pub overlays: Vec<RecipeOverlay>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct RecipeOverlay {
    pub text: String,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub color: Option<String>,
    pub font_size: Option<f32>,
    pub font_family: Option<String>,
}

impl EditRecipe {
    pub fn load(path: &Path) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("could not read recipe '{}': {}", path.display(), e))?;
        serde_json::from_str(&raw).map_err(|e| format!("recipe '{}' is invalid: {}", path.display(), e))
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the CLI and return an OS exit code: `0` on success, `1` on failure.
pub fn run(args: CliArgs) -> ExitCode {
    if args.verbose {
        crate::logger::set_echo(true);
    }
    let settings = EditorSettings::load();
    let mut session = match EditorSession::from_settings(&settings) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run_with_session(&args, &settings, &mut session) {
        Ok(path) => {
            if args.verbose {
                println!("  → {}", path.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Drive an existing session through the whole pipeline and write the
/// export. Returns the written path.
pub fn run_with_session(
    args: &CliArgs,
    settings: &EditorSettings,
    session: &mut EditorSession,
) -> Result<PathBuf, String> {
    let started = Instant::now();
    let format = parse_format(args, settings)?;

    // -- Step 1: Load ----------------------------------------------------
    if let Some(url) = &args.url {
        session.start_fetch(url).map_err(|e| e.to_string())?;
        await_job(session, JobKind::Fetch)?;
    } else if let Some(input) = &args.input {
        let bytes = std::fs::read(input).map_err(|e| format!("could not read '{}': {}", input.display(), e))?;
        session.load_image_bytes(&bytes).map_err(|e| e.to_string())?;
    }
    if args.verbose
        && let Some(bitmap) = session.bitmap()
    {
        println!("  loaded {}x{} ({:.0}ms)", bitmap.width(), bitmap.height(), elapsed_ms(started));
    }

    // -- Step 2: Recipe, then flags ----------------------------------------
    if let Some(path) = &args.recipe {
        apply_recipe(session, &EditRecipe::load(path)?)?;
    }
    apply_adjustment_flags(session, args)?;
    apply_style_flags(session, args)?;
    for spec in &args.texts {
        let (text, position) = parse_text_spec(spec);
        let id = session.add_overlay(text).map_err(|e| format!("--text '{}': {}", spec, e))?;
        if let Some((x, y)) = position {
            session.update_overlay(id, OverlayEdit::X(x));
            session.update_overlay(id, OverlayEdit::Y(y));
        }
    }

    // -- Step 3: AI edit (optional) ------------------------------------------
    if let Some(instruction) = &args.ai {
        session.start_ai_edit(instruction).map_err(|e| e.to_string())?;
        await_job(session, JobKind::AiEdit)?;
        if args.verbose {
            println!("  AI edit applied ({:.0}ms)", elapsed_ms(started));
        }
    }

    // -- Step 4: Export ----------------------------------------------------
    session.start_export(format).map_err(|e| e.to_string())?;
    let exported = await_job(session, JobKind::Export)?
        .ok_or_else(|| "export produced no image".to_string())?;
    write_export(&exported, &args.output).map_err(|e| format!("save failed: {}", e))?;
    if args.verbose {
        println!(
            "  exported {}x{} {} ({:.0}ms)",
            exported.width,
            exported.height,
            exported.mime_type(),
            elapsed_ms(started)
        );
    }
    Ok(args.output.clone())
}

// ============================================================================
// Helpers
// ============================================================================

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

/// Wait for the running job and turn its event into a result.
fn await_job(session: &mut EditorSession, job: JobKind) -> Result<Option<ExportedImage>, String> {
    let mut exported = None;
    for event in session.wait() {
        match event {
            SessionEvent::JobFailed { job: failed, error } => {
                return Err(format!("{} failed: {}", failed, error));
            }
            SessionEvent::ExportReady(image) if job == JobKind::Export => exported = Some(image),
            _ => {}
        }
    }
    Ok(exported)
}

fn apply_recipe(session: &mut EditorSession, recipe: &EditRecipe) -> Result<(), String> {
    session.set_adjustments(recipe.adjustments).map_err(|e| e.to_string())?;
    for overlay in &recipe.overlays {
        let id = session.add_overlay(&overlay.text).map_err(|e| format!("recipe overlay: {}", e))?;
        let mut edits = Vec::new();
        if let Some(x) = overlay.x {
            edits.push(OverlayEdit::X(x));
        }
        if let Some(y) = overlay.y {
            edits.push(OverlayEdit::Y(y));
        }
        if let Some(hex) = &overlay.color {
            let color = parse_hex_color(hex).ok_or_else(|| format!("recipe colour '{}' is not #rrggbb", hex))?;
            edits.push(OverlayEdit::Color(color));
        }
        if let Some(size) = overlay.font_size {
            edits.push(OverlayEdit::FontSize(size));
        }
        if let Some(family) = &overlay.font_family {
            edits.push(OverlayEdit::FontFamily(FontFamily::from_name(family)));
        }
        for edit in edits {
            session.update_overlay(id, edit);
        }
    }
    Ok(())
}

fn apply_adjustment_flags(session: &mut EditorSession, args: &CliArgs) -> Result<(), String> {
    let flags = [
        (AdjustmentKind::Brightness, args.brightness),
        (AdjustmentKind::Contrast, args.contrast),
        (AdjustmentKind::Saturation, args.saturation),
        (AdjustmentKind::Grayscale, args.grayscale),
        (AdjustmentKind::Sepia, args.sepia),
        (AdjustmentKind::Blur, args.blur),
    ];
    for (kind, value) in flags {
        let Some(value) = value else { continue };
        let stored = session.set_adjustment(kind, value).map_err(|e| e.to_string())?;
        if stored != value {
            crate::log_warn!("{} {} out of range, clamped to {}", kind.label(), value, stored);
        }
    }
    Ok(())
}

fn apply_style_flags(session: &mut EditorSession, args: &CliArgs) -> Result<(), String> {
    let mut style = session.overlay_style().clone();
    if let Some(hex) = &args.color {
        style.color = parse_hex_color(hex).ok_or_else(|| {
            EditorError::invalid(format!("--color '{}' is not #rrggbb", hex)).to_string()
        })?;
    }
    if let Some(size) = args.font_size {
        if !(size.is_finite() && size > 0.0) {
            return Err(EditorError::invalid(format!("--font-size {} must be positive", size)).to_string());
        }
        let clamped = clamp_font_size(size, style.font_size);
        if clamped != size {
            crate::log_warn!("font size {} out of range, clamped to {}", size, clamped);
        }
        style.font_size = clamped;
    }
    if let Some(name) = &args.font {
        style.font_family = FontFamily::from_name(name);
    }
    session.set_overlay_style(style);
    Ok(())
}

/// Split "TEXT@X,Y" into the text and an optional percent position. A
/// suffix that does not parse as two numbers stays part of the text.
pub fn parse_text_spec(spec: &str) -> (&str, Option<(f32, f32)>) {
    if let Some((text, pos)) = spec.rsplit_once('@')
        && let Some((x, y)) = pos.split_once(',')
        && let (Ok(x), Ok(y)) = (x.trim().parse::<f32>(), y.trim().parse::<f32>())
        && x.is_finite()
        && y.is_finite()
    {
        return (text, Some((x, y)));
    }
    (spec, None)
}

/// `--format`, else the output extension, else the settings default (JPEG).
fn parse_format(args: &CliArgs, settings: &EditorSettings) -> Result<ExportFormat, String> {
    let quality = args.quality.unwrap_or(settings.export_quality).clamp(1, 100);
    if let Some(name) = &args.format {
        return ExportFormat::from_name(name, quality)
            .ok_or_else(|| format!("unsupported format '{}' (png, jpeg, webp)", name));
    }
    Ok(ExportFormat::from_path(&args.output, quality).unwrap_or(match settings.default_export_format() {
        ExportFormat::Jpeg { .. } => ExportFormat::Jpeg { quality },
        other => other,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_spec_with_and_without_position() {
        assert_eq!(parse_text_spec("HELLO@25,80"), ("HELLO", Some((25.0, 80.0))));
        assert_eq!(parse_text_spec("HELLO"), ("HELLO", None));
        assert_eq!(parse_text_spec("me@example.com"), ("me@example.com", None));
        assert_eq!(parse_text_spec("a@b@10, 20"), ("a@b", Some((10.0, 20.0))));
    }

    #[test]
    fn source_is_required_and_exclusive() {
        assert!(CliArgs::try_parse_from(["thumbfe", "-o", "x.png"]).is_err());
        assert!(
            CliArgs::try_parse_from(["thumbfe", "-i", "a.png", "--url", "https://youtu.be/x", "-o", "x.png"])
                .is_err()
        );
        let args = CliArgs::try_parse_from(["thumbfe", "-i", "a.png", "-t", "ONE", "-t", "TWO", "-o", "x.png"])
            .expect("parse");
        assert_eq!(args.texts, vec!["ONE", "TWO"]);
    }

    #[test]
    fn format_resolution() {
        let settings = EditorSettings::default();
        let args = CliArgs::try_parse_from(["thumbfe", "-i", "a.png", "-o", "out.webp"]).expect("parse");
        assert_eq!(parse_format(&args, &settings), Ok(ExportFormat::Webp));
        let args = CliArgs::try_parse_from(["thumbfe", "-i", "a.png", "-o", "out", "-q", "40"]).expect("parse");
        assert_eq!(parse_format(&args, &settings), Ok(ExportFormat::Jpeg { quality: 40 }));
        let args = CliArgs::try_parse_from(["thumbfe", "-i", "a.png", "-o", "o.png", "-f", "bmp"]).expect("parse");
        assert!(parse_format(&args, &settings).is_err());
    }

    #[test]
    fn recipe_json_parses_partially() {
        let recipe: EditRecipe = serde_json::from_str(
            r##"{"adjustments":{"contrast":150},"overlays":[{"text":"HI","y":80,"color":"#ff0000"}]}"##,
        )
        .expect("recipe");
        assert_eq!(recipe.adjustments.contrast, 150.0);
        assert_eq!(recipe.adjustments.brightness, 100.0);
        assert_eq!(recipe.overlays[0].y, Some(80.0));
        assert_eq!(recipe.overlays[0].x, None);
    }
}
