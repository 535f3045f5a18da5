use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, Rgb, RgbImage};
use nanoheadshot_contracts::dataurl::{decode_data_url, encode_data_url, mime_for_path};
use nanoheadshot_contracts::events::{EventWriter, WorkflowEvent};
use nanoheadshot_contracts::session::{SessionSnapshot, SessionState, SourceImage};
use nanoheadshot_contracts::styles::{compose_instruction, StyleChoice, StyleRegistry};
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

const DEFAULT_EDIT_MODEL: &str = "gemini-2.5-flash-image-preview";
const DEFAULT_UPLOAD_ENDPOINT: &str = "https://collect.nanoheadshot.app/api/uploads";
const UPLOAD_FILENAME_PREFIX: &str = "nanoheadshot";
const FALLBACK_FAILURE_MESSAGE: &str = "Image generation failed. Please try again.";

/// One edit request handed to a backend: the source photo as a data URL,
/// its MIME type, and the fully composed instruction (style prompt plus
/// the identity-preservation suffix).
#[derive(Debug, Clone)]
pub struct EditRequest {
    pub image_data_url: String,
    pub mime_type: String,
    pub instruction: String,
}

/// Seam for the remote generative edit service. A backend either returns
/// exactly one result image as a data URL or fails; there are no retries,
/// no streaming, and no partial results.
pub trait EditBackend: Send + Sync {
    fn name(&self) -> &str;
    fn edit(&self, request: &EditRequest) -> Result<String>;
}

/// Seam for the result collection endpoint. Implementations forward one
/// generated image under the given filename and return the endpoint's
/// JSON body.
pub trait ResultSink: Send + Sync {
    fn forward(&self, result_data_url: &str, filename: &str) -> Result<Value>;
}

pub struct GeminiEditClient {
    api_base: String,
    model: String,
    http: HttpClient,
}

impl GeminiEditClient {
    pub fn new() -> Self {
        Self {
            api_base: env::var("GEMINI_API_BASE")
                .ok()
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            model: non_empty_env("NANOHEADSHOT_EDIT_MODEL")
                .unwrap_or_else(|| DEFAULT_EDIT_MODEL.to_string()),
            http: HttpClient::new(),
        }
    }

    fn api_key() -> Option<String> {
        non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY"))
    }

    fn endpoint(&self) -> String {
        let trimmed = self.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(request: &EditRequest) -> Result<Value> {
        let (mime_type, bytes) = decode_data_url(&request.image_data_url)
            .context("source image is not a valid data URL")?;
        Ok(json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": mime_type,
                            "data": BASE64.encode(bytes),
                        }
                    },
                    { "text": request.instruction },
                ],
            }],
            "generationConfig": {
                "candidateCount": 1,
                "responseModalities": ["IMAGE"],
            },
        }))
    }

    fn extract_result_data_url(response_payload: &Value) -> Result<String> {
        let candidates = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for candidate in candidates {
            let parts = candidate
                .get("content")
                .and_then(Value::as_object)
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for part in parts {
                let inline = part
                    .get("inlineData")
                    .or_else(|| part.get("inline_data"))
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                let data = inline
                    .get("data")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if data.is_empty() {
                    continue;
                }
                BASE64
                    .decode(data.as_bytes())
                    .context("Gemini image base64 decode failed")?;
                let mime_type = inline
                    .get("mimeType")
                    .or_else(|| inline.get("mime_type"))
                    .and_then(Value::as_str)
                    .unwrap_or("image/png");
                return Ok(format!("data:{mime_type};base64,{data}"));
            }
        }

        bail!("Gemini returned no image")
    }
}

impl Default for GeminiEditClient {
    fn default() -> Self {
        Self::new()
    }
}

impl EditBackend for GeminiEditClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn edit(&self, request: &EditRequest) -> Result<String> {
        let Some(api_key) = Self::api_key() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        let endpoint = self.endpoint();
        let payload = Self::build_payload(request)?;
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key.as_str())])
            .json(&payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let response_payload = response_json_or_error("Gemini", response)?;
        Self::extract_result_data_url(&response_payload)
    }
}

/// Offline backend for tests and keyless demo runs: renders a solid-color
/// PNG whose color is derived from the instruction, so identical requests
/// produce identical results.
pub struct DryrunEditClient;

impl EditBackend for DryrunEditClient {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn edit(&self, request: &EditRequest) -> Result<String> {
        let (r, g, b) = color_from_instruction(&request.instruction);
        let mut image = RgbImage::new(64, 64);
        for pixel in image.pixels_mut() {
            *pixel = Rgb([r, g, b]);
        }
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)
            .context("failed encoding dry-run image")?;
        Ok(encode_data_url(&buffer, "image/png"))
    }
}

pub struct HttpUploadClient {
    endpoint: String,
    http: HttpClient,
}

impl HttpUploadClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: HttpClient::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            non_empty_env("NANOHEADSHOT_UPLOAD_URL")
                .unwrap_or_else(|| DEFAULT_UPLOAD_ENDPOINT.to_string()),
        )
    }
}

impl ResultSink for HttpUploadClient {
    fn forward(&self, result_data_url: &str, filename: &str) -> Result<Value> {
        let (mime_type, bytes) = decode_data_url(result_data_url)
            .context("generated result is not a valid data URL")?;
        let part = MultipartPart::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(&mime_type)
            .with_context(|| format!("invalid MIME type for upload ({mime_type})"))?;
        let form = MultipartForm::new().part("file", part);
        let response = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .with_context(|| format!("upload request failed ({})", self.endpoint))?;
        response_json_or_error("Upload", response)
    }
}

/// Owns the session state and drives the whole workflow: select/clear the
/// source photo, pick a style, generate, and forward successful results in
/// the background. All externally produced errors are folded into state
/// here; none escape to the caller.
pub struct HeadshotEngine {
    state: SessionState,
    styles: StyleRegistry,
    backend: Arc<dyn EditBackend>,
    sink: Arc<dyn ResultSink>,
    events: EventWriter,
}

impl HeadshotEngine {
    pub fn new(events_path: impl Into<PathBuf>) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        Self::with_parts(
            Arc::new(GeminiEditClient::new()),
            Arc::new(HttpUploadClient::from_env()),
            EventWriter::new(events_path, session_id),
        )
    }

    pub fn with_parts(
        backend: Arc<dyn EditBackend>,
        sink: Arc<dyn ResultSink>,
        events: EventWriter,
    ) -> Self {
        Self {
            state: SessionState::new(),
            styles: StyleRegistry::default(),
            backend,
            sink,
            events,
        }
    }

    pub fn styles(&self) -> &StyleRegistry {
        &self.styles
    }

    pub fn event_writer(&self) -> EventWriter {
        self.events.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }

    /// Reads and encodes the file at `path`. A read failure is recorded as
    /// a `read_error` on the session, leaving the current source image and
    /// generation status untouched.
    pub fn select_image(&mut self, path: &Path) {
        let Some(mime_type) = mime_for_path(path) else {
            let message = format!("Unsupported image type: {}", path.display());
            self.state.note_read_error(message.clone());
            self.log(WorkflowEvent::ImageReadFailed { error: message });
            return;
        };
        match fs::read(path) {
            Ok(bytes) => self.select_image_bytes(&bytes, mime_type),
            Err(err) => {
                let message = format!("Could not read {}: {err}", path.display());
                self.state.note_read_error(message.clone());
                self.log(WorkflowEvent::ImageReadFailed { error: message });
            }
        }
    }

    pub fn select_image_bytes(&mut self, bytes: &[u8], mime_type: &str) {
        let data_url = encode_data_url(bytes, mime_type);
        self.state.set_source(SourceImage {
            data_url,
            mime_type: mime_type.to_string(),
        });
        self.log(WorkflowEvent::ImageSelected {
            mime_type: mime_type.to_string(),
            bytes: bytes.len(),
        });
    }

    pub fn clear_image(&mut self) {
        self.state.clear_source();
        self.log(WorkflowEvent::ImageCleared);
    }

    pub fn set_style(&mut self, preset_id: &str) {
        self.state
            .set_style(StyleChoice::Preset(preset_id.to_string()));
        self.log(WorkflowEvent::StyleSelected {
            style: format!("preset:{preset_id}"),
        });
    }

    pub fn set_custom_prompt(&mut self, text: &str) {
        self.state.set_style(StyleChoice::Custom(text.to_string()));
        self.log(WorkflowEvent::CustomPromptSet {
            chars: text.chars().count(),
        });
    }

    /// Runs one edit request. A no-op when no source image is selected or
    /// a request is already in flight. On success the result is also
    /// forwarded to the collection endpoint on a detached thread whose
    /// outcome never touches session state.
    pub fn generate(&mut self) {
        let Some(source) = self.state.source_image().cloned() else {
            return;
        };
        if self.state.status().is_in_flight() {
            return;
        }

        let instruction = match compose_instruction(self.state.style(), &self.styles) {
            Ok(instruction) => instruction,
            Err(message) => {
                self.state.fail(message.clone());
                self.log(WorkflowEvent::GenerateRejected { reason: message });
                return;
            }
        };

        self.state.begin_generation();
        self.log(WorkflowEvent::GenerateStarted {
            style: self.state.style().label(),
            backend: self.backend.name().to_string(),
        });

        let request = EditRequest {
            image_data_url: source.data_url,
            mime_type: source.mime_type,
            instruction,
        };
        match self.backend.edit(&request) {
            Ok(result) => {
                self.state.succeed(result.clone());
                self.log(WorkflowEvent::GenerateSucceeded);
                self.spawn_result_forward(result);
            }
            Err(err) => {
                self.log(WorkflowEvent::GenerateFailed {
                    error: error_chain_text(&err, 512),
                });
                self.state.fail(failure_message(&err));
            }
        }
    }

    pub fn reset_result(&mut self) {
        self.state.reset_result();
        self.log(WorkflowEvent::ResultReset);
    }

    fn spawn_result_forward(&self, result_data_url: String) {
        let sink = Arc::clone(&self.sink);
        let events = self.events.clone();
        let filename = format!("{UPLOAD_FILENAME_PREFIX}_{}.png", timestamp_millis());
        thread::spawn(move || match sink.forward(&result_data_url, &filename) {
            Ok(_) => {
                let _ = events.record(&WorkflowEvent::UploadForwarded { filename });
            }
            Err(err) => {
                let _ = events.record(&WorkflowEvent::UploadFailed {
                    filename,
                    error: error_chain_text(&err, 512),
                });
            }
        });
    }

    fn log(&self, event: WorkflowEvent) {
        let _ = self.events.record(&event);
    }
}

fn failure_message(err: &anyhow::Error) -> String {
    let text = err.to_string();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        FALLBACK_FAILURE_MESSAGE.to_string()
    } else {
        trimmed.to_string()
    }
}

fn response_json_or_error(service: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{service} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{service} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{service} returned invalid JSON payload"))?;
    Ok(parsed)
}

fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn color_from_instruction(instruction: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(instruction.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}
