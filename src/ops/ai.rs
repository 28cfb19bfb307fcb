// ============================================================================
// AI EDIT: send the composited image plus an instruction to a generative
// image model and get a new image back
// ============================================================================
//
// The session treats `ImageEditor` as an opaque function. The Gemini client
// below is the stock implementation; tests swap in fakes.

use base64::{engine::general_purpose, Engine as _};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{EditorError, Result};
use crate::settings::EditorSettings;

/// `edit(image, mime, instruction) -> image`, any still-image format out.
pub trait ImageEditor: Send + Sync {
    fn edit(&self, image: &[u8], mime_type: &str, instruction: &str) -> Result<Vec<u8>>;
}

// --- wire types (generateContent) ---

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Image {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: &'a str,
    },
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseModalities")]
    response_modalities: [&'static str; 2],
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize, Debug, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug, Default)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug, Default)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    #[serde(default)]
    inline_data: Option<InlineData>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Gemini `generateContent` client.
pub struct GeminiImageEditor {
    client: Client,
    api_key: Option<String>,
    model: String,
    endpoint: String,
}

impl GeminiImageEditor {
    pub fn new(api_key: Option<String>, model: &str, endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent("thumbfe ai edit")
            .timeout(timeout)
            .build()
            .map_err(|e| EditorError::unavailable(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &EditorSettings) -> Result<Self> {
        Self::new(
            settings.api_key(),
            &settings.gemini_model,
            &settings.gemini_endpoint,
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

impl ImageEditor for GeminiImageEditor {
    fn edit(&self, image: &[u8], mime_type: &str, instruction: &str) -> Result<Vec<u8>> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(EditorError::unavailable("no API key configured for AI edits"));
        };
        let body = build_request(image, mime_type, instruction);

        let resp = self
            .client
            .post(self.url())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .map_err(|e| EditorError::unavailable(format!("AI request failed: {}", e)))?;

        let status = resp.status();
        let text = resp
            .text()
            .map_err(|e| EditorError::unavailable(format!("AI response unreadable: {}", e)))?;
        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or_default();
            return Err(EditorError::unavailable(format!("AI service returned {}: {}", status, detail)));
        }
        parse_response(&text)
    }
}

fn build_request<'a>(image: &[u8], mime_type: &str, instruction: &'a str) -> GenerateRequest<'a> {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![
                RequestPart::Image {
                    inline_data: InlineData {
                        mime_type: mime_type.to_string(),
                        data: general_purpose::STANDARD.encode(image),
                    },
                },
                RequestPart::Text { text: instruction },
            ],
        }],
        generation_config: GenerationConfig { response_modalities: ["IMAGE", "TEXT"] },
    }
}

/// First inline image in the first candidate that has one.
fn parse_response(body: &str) -> Result<Vec<u8>> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| EditorError::unavailable(format!("AI response was not valid JSON: {}", e)))?;

    let parts = parsed
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts);

    let mut refusal: Option<String> = None;
    for part in parts {
        if let Some(data) = part.inline_data {
            return general_purpose::STANDARD
                .decode(data.data.as_bytes())
                .map_err(|e| EditorError::unavailable(format!("AI image payload corrupt: {}", e)));
        }
        if refusal.is_none() {
            refusal = part.text;
        }
    }
    Err(EditorError::unavailable(match refusal {
        Some(text) => format!("AI returned no image: {}", text.trim()),
        None => "AI returned no image".to_string(),
    }))
}
