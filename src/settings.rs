use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::io::ExportFormat;
use crate::ops::text::FontFamily;
use crate::overlay::{clamp_font_size, format_hex_color, parse_hex_color, OverlayStyle};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Persistent editor preferences, stored as `key=value` lines.
#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    /// Stored key; `GEMINI_API_KEY` / `API_KEY` take precedence at runtime.
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_endpoint: String,
    pub request_timeout_secs: u64,
    pub default_text_color: [u8; 3],
    pub default_font_size: f32,
    pub default_font_family: FontFamily,
    /// JPEG quality used when the caller does not pick one (1-100).
    pub export_quality: u8,
}

impl Default for EditorSettings {
    fn default() -> Self {
        let style = OverlayStyle::default();
        Self {
            gemini_api_key: String::new(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            request_timeout_secs: 60,
            default_text_color: style.color,
            default_font_size: style.font_size,
            default_font_family: style.font_family,
            export_quality: 90,
        }
    }
}

impl EditorSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/thumbfe/thumbfe_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\ThumbFE\thumbfe_settings.cfg
    /// On macOS:   ~/Library/Application Support/ThumbFE/thumbfe_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            return Some(PathBuf::from(appdata).join("ThumbFE").join("thumbfe_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("ThumbFE")
                    .join("thumbfe_settings.cfg"),
            );
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
                .ok()?;
            Some(config_dir.join("thumbfe").join("thumbfe_settings.cfg"))
        }
    }

    /// Load from the default location; defaults if missing or unreadable.
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    /// Unknown keys and unparsable values are ignored.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "gemini_api_key" => s.gemini_api_key = val.to_string(),
                "gemini_model" => {
                    if !val.is_empty() {
                        s.gemini_model = val.to_string();
                    }
                }
                "gemini_endpoint" => {
                    if !val.is_empty() {
                        s.gemini_endpoint = val.trim_end_matches('/').to_string();
                    }
                }
                "request_timeout_secs" => {
                    s.request_timeout_secs = val.parse().unwrap_or(s.request_timeout_secs).max(1);
                }
                "default_text_color" => {
                    if let Some(c) = parse_hex_color(val) {
                        s.default_text_color = c;
                    }
                }
                "default_font_size" => {
                    if let Ok(v) = val.parse::<f32>()
                        && v.is_finite()
                        && v > 0.0
                    {
                        s.default_font_size = clamp_font_size(v, s.default_font_size);
                    }
                }
                "default_font_family" => s.default_font_family = FontFamily::from_name(val),
                "export_quality" => {
                    s.export_quality = val.parse::<u8>().unwrap_or(s.export_quality).clamp(1, 100);
                }
                _ => {}
            }
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "gemini_api_key={}\n\
             gemini_model={}\n\
             gemini_endpoint={}\n\
             request_timeout_secs={}\n\
             default_text_color={}\n\
             default_font_size={}\n\
             default_font_family={}\n\
             export_quality={}\n",
            self.gemini_api_key,
            self.gemini_model,
            self.gemini_endpoint,
            self.request_timeout_secs,
            format_hex_color(self.default_text_color),
            self.default_font_size,
            self.default_font_family,
            self.export_quality,
        )
    }

    /// Save to the default location, creating the directory if needed.
    pub fn save(&self) -> Result<()> {
        match Self::settings_path() {
            Some(path) => self.save_to(&path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())?;
        Ok(())
    }

    /// Effective API key: environment first, then the stored value.
    pub fn api_key(&self) -> Option<String> {
        ["GEMINI_API_KEY", "API_KEY"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .chain(std::iter::once(self.gemini_api_key.clone()))
            .map(|k| k.trim().to_string())
            .find(|k| !k.is_empty())
    }

    /// Appearance for overlays created by `add`.
    pub fn overlay_style(&self) -> OverlayStyle {
        OverlayStyle {
            color: self.default_text_color,
            font_size: self.default_font_size,
            font_family: self.default_font_family.clone(),
        }
        .clamped()
    }

    pub fn default_export_format(&self) -> ExportFormat {
        ExportFormat::Jpeg { quality: self.export_quality }
    }
}
