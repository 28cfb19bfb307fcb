use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use image::{Rgba, RgbaImage};
use thumbfe::cli::{self, CliArgs};
use thumbfe::io::{decode_bitmap, encode_image};
use thumbfe::{BitmapSource, EditorError, EditorSession, EditorSettings, ExportFormat, FontBook, ImageEditor, Result};

struct OfflineSource;

impl BitmapSource for OfflineSource {
    fn fetch(&self, _video_id: &str) -> Result<Vec<u8>> {
        Err(EditorError::unavailable("offline"))
    }
}

/// Answers every edit with a solid red image of the same size it was sent.
struct RedEditor;

impl ImageEditor for RedEditor {
    fn edit(&self, image: &[u8], _mime: &str, _instruction: &str) -> Result<Vec<u8>> {
        let (w, h) = decode_bitmap(image)?.dimensions();
        encode_image(&RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255])), ExportFormat::Png)
    }
}

fn session() -> EditorSession {
    let fonts = Arc::new(FontBook::bundled_only().expect("font book"));
    EditorSession::new(fonts, Arc::new(OfflineSource), Arc::new(RedEditor))
}

fn write_input(dir: &std::path::Path, w: u32, h: u32) -> std::path::PathBuf {
    let path = dir.join("frame.png");
    let img = RgbaImage::from_fn(w, h, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 120, 255]));
    std::fs::write(&path, encode_image(&img, ExportFormat::Png).expect("encode")).expect("write input");
    path
}

fn args(list: &[&str]) -> CliArgs {
    let mut full = vec!["thumbfe"];
    full.extend_from_slice(list);
    CliArgs::try_parse_from(full).expect("args")
}

#[test]
fn composes_and_writes_png() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_input(dir.path(), 320, 180);
    let output = dir.path().join("out").join("thumb.png");
    let a = args(&[
        "-i",
        input.to_str().expect("utf8"),
        "--contrast",
        "140",
        "-t",
        "BIG NEWS@50,20",
        "-t",
        "part 2",
        "--color",
        "#ffcc00",
        "-o",
        output.to_str().expect("utf8"),
    ]);

    let mut s = session();
    let written = cli::run_with_session(&a, &EditorSettings::default(), &mut s).expect("run");
    assert_eq!(written, output);

    let out = decode_bitmap(&std::fs::read(&output).expect("read output")).expect("decode");
    assert_eq!(out.dimensions(), (320, 180));
    assert_eq!(s.overlays().len(), 2);
    assert_eq!(s.overlays()[0].y, 20.0);
    assert_eq!(s.overlays()[1].color, [0xff, 0xcc, 0x00]);
    assert_eq!(s.adjustments().contrast, 140.0);
}

#[test]
fn recipe_and_ai_edit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_input(dir.path(), 200, 100);
    let recipe = dir.path().join("look.json");
    std::fs::write(
        &recipe,
        r##"{"adjustments":{"sepia":60},"overlays":[{"text":"FROM RECIPE","x":30,"color":"#00ff00"}]}"##,
    )
    .expect("write recipe");
    let output = dir.path().join("thumb.jpg");
    let a = args(&[
        "-i",
        input.to_str().expect("utf8"),
        "--recipe",
        recipe.to_str().expect("utf8"),
        "--ai",
        "paint it red",
        "-o",
        output.to_str().expect("utf8"),
    ]);

    let mut s = session();
    cli::run_with_session(&a, &EditorSettings::default(), &mut s).expect("run");
    let bytes = std::fs::read(&output).expect("read");
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    let out = decode_bitmap(&bytes).expect("decode");
    assert_eq!(out.dimensions(), (200, 100));
    let p = out.pixels().get_pixel(100, 50);
    assert!(p[0] > 240 && p[1] < 20 && p[2] < 20, "{:?}", p);
    // The AI answer replaced the bitmap; recipe state was baked in and reset.
    assert!(s.overlays().is_empty());
    assert!(s.adjustments().is_neutral());
}

#[test]
fn oversized_recipe_font_is_clamped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_input(dir.path(), 160, 90);
    let recipe = dir.path().join("huge.json");
    std::fs::write(&recipe, r#"{"overlays":[{"text":"HUGE","x":1e9,"font_size":1e6}]}"#).expect("write recipe");
    let output = dir.path().join("huge.png");
    let a = args(&[
        "-i",
        input.to_str().expect("utf8"),
        "--recipe",
        recipe.to_str().expect("utf8"),
        "--font-size",
        "5000",
        "-t",
        "STYLED",
        "-o",
        output.to_str().expect("utf8"),
    ]);

    let mut s = session();
    cli::run_with_session(&a, &EditorSettings::default(), &mut s).expect("run");
    assert_eq!(s.overlays()[0].font_size, thumbfe::overlay::MAX_FONT_SIZE);
    assert_eq!(s.overlays()[1].font_size, thumbfe::overlay::MAX_FONT_SIZE);
    assert_eq!(decode_bitmap(&std::fs::read(&output).expect("read")).expect("decode").dimensions(), (160, 90));
}

#[test]
fn bad_inputs_fail_cleanly() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_input(dir.path(), 64, 64);
    let output = dir.path().join("never.png");
    let input = input.to_str().expect("utf8");
    let out = output.to_str().expect("utf8");

    for list in [
        vec!["-i", input, "-t", "   ", "-o", out],
        vec!["-i", input, "--color", "yellow", "-o", out],
        vec!["-i", input, "-f", "gif", "-o", out],
        vec!["--url", "https://example.com/video", "-o", out],
        vec!["--url", "https://youtu.be/dQw4w9WgXcQ", "-o", out],
    ] {
        let mut s = session();
        assert!(cli::run_with_session(&args(&list), &EditorSettings::default(), &mut s).is_err(), "{:?}", list);
    }
    assert!(!output.exists());
}

#[test]
fn missing_input_file_exits_with_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let a = args(&[
        "-i",
        dir.path().join("absent.png").to_str().expect("utf8"),
        "-o",
        dir.path().join("out.png").to_str().expect("utf8"),
    ]);
    assert_eq!(cli::run(a), ExitCode::FAILURE);
}
