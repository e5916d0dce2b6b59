use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::ImageFormat;
use promptsmith_contracts::config::ProviderConfig;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Map, Value};

use crate::error::{truncate_text, ProviderError, TaskError};
use crate::task::CancelToken;

pub const ASPECT_RATIOS: &[&str] = &[
    "1:1", "2:3", "3:2", "3:4", "4:3", "4:5", "5:4", "9:16", "16:9", "21:9",
];
pub const IMAGE_SIZES: &[&str] = &["1K", "2K", "4K"];
pub const MAX_REFERENCE_IMAGES: usize = 3;

pub const IMAGE_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageGenerateRequest {
    pub prompt_text: String,
    pub reference_images: Vec<PathBuf>,
    pub aspect_ratio: String,
    pub image_size: String,
}

impl ImageGenerateRequest {
    /// Validates the choices against [`ASPECT_RATIOS`] and [`IMAGE_SIZES`].
    /// Repeated reference paths are collapsed before the count is checked.
    pub fn new(
        prompt_text: impl Into<String>,
        reference_images: impl IntoIterator<Item = PathBuf>,
        aspect_ratio: &str,
        image_size: &str,
    ) -> Result<Self, TaskError> {
        let mut references: Vec<PathBuf> = Vec::new();
        for path in reference_images {
            if !references.contains(&path) {
                references.push(path);
            }
        }
        if references.len() > MAX_REFERENCE_IMAGES {
            return Err(TaskError::InvalidRequest(format!(
                "at most {MAX_REFERENCE_IMAGES} reference images are allowed, got {}",
                references.len()
            )));
        }
        let aspect_ratio = aspect_ratio.trim();
        if !ASPECT_RATIOS.contains(&aspect_ratio) {
            return Err(TaskError::InvalidRequest(format!(
                "unsupported aspect ratio '{aspect_ratio}' (expected one of {})",
                ASPECT_RATIOS.join(", ")
            )));
        }
        let image_size = image_size.trim().to_ascii_uppercase();
        if !IMAGE_SIZES.contains(&image_size.as_str()) {
            return Err(TaskError::InvalidRequest(format!(
                "unsupported image size '{image_size}' (expected one of {})",
                IMAGE_SIZES.join(", ")
            )));
        }
        Ok(Self {
            prompt_text: prompt_text.into(),
            reference_images: references,
            aspect_ratio: aspect_ratio.to_string(),
            image_size,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;

    fn is_configured(&self) -> bool {
        true
    }

    fn generate(
        &self,
        request: &ImageGenerateRequest,
        cancel: &CancelToken,
    ) -> Result<GeneratedImage, ProviderError>;
}

pub struct GeminiImageProvider {
    api_base: String,
    api_key: String,
    model: String,
    http: HttpClient,
}

impl GeminiImageProvider {
    pub fn new(api_base: &str, api_key: &str, model: &str) -> Self {
        Self {
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            model: model.trim().to_string(),
            http: HttpClient::new(),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(
            &config.image_base_url,
            &config.image_api_key,
            &config.image_model,
        )
    }

    pub fn endpoint(&self) -> String {
        let model_path = if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    pub fn build_payload(request: &ImageGenerateRequest) -> anyhow::Result<Value> {
        let mut parts = Vec::new();
        for reference in &request.reference_images {
            parts.push(image_part_from_path(reference)?);
        }
        parts.push(json!({ "text": request.prompt_text }));

        let mut generation_config = Map::new();
        generation_config.insert(
            "responseModalities".to_string(),
            Value::Array(vec![Value::String("IMAGE".to_string())]),
        );
        generation_config.insert(
            "imageConfig".to_string(),
            json!({
                "aspectRatio": request.aspect_ratio,
                "imageSize": request.image_size,
            }),
        );

        Ok(json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": generation_config,
            "safetySettings": default_safety_settings(),
        }))
    }

    /// First inline image across all candidates.
    pub fn extract_image(response_payload: &Value) -> Result<GeneratedImage, ProviderError> {
        let candidates = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut text_parts = Vec::new();

        for candidate in &candidates {
            let parts = candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for part in parts {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    text_parts.push(text.trim().to_string());
                }
                let Some(inline) = part
                    .get("inlineData")
                    .or_else(|| part.get("inline_data"))
                    .and_then(Value::as_object)
                else {
                    continue;
                };
                let data = inline
                    .get("data")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if data.is_empty() {
                    continue;
                }
                let bytes = BASE64.decode(data.as_bytes()).map_err(|err| {
                    ProviderError::Provider(format!("Gemini image base64 decode failed: {err}"))
                })?;
                let mime_type = inline
                    .get("mimeType")
                    .or_else(|| inline.get("mime_type"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                return Ok(GeneratedImage { bytes, mime_type });
            }
        }

        let reason = candidates
            .first()
            .and_then(|candidate| candidate.get("finishReason"))
            .and_then(Value::as_str)
            .or_else(|| {
                response_payload
                    .get("promptFeedback")
                    .and_then(|feedback| feedback.get("blockReason"))
                    .and_then(Value::as_str)
            });
        let mut message = "Gemini returned no image".to_string();
        if let Some(reason) = reason {
            message.push_str(&format!(" ({reason})"));
        }
        text_parts.retain(|text| !text.is_empty());
        if !text_parts.is_empty() {
            message.push_str(&format!(": {}", truncate_text(&text_parts.join(" "), 300)));
        }
        Err(ProviderError::Provider(message))
    }
}

impl ImageProvider for GeminiImageProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn generate(
        &self,
        request: &ImageGenerateRequest,
        cancel: &CancelToken,
    ) -> Result<GeneratedImage, ProviderError> {
        let payload = Self::build_payload(request)
            .map_err(|err| ProviderError::Provider(format!("{err:#}")))?;
        if cancel.is_cancelled() {
            return Err(ProviderError::Provider("cancelled before sending".to_string()));
        }
        let endpoint = self.endpoint();
        log::debug!(
            "requesting {} image at {} from {endpoint}",
            request.aspect_ratio,
            request.image_size
        );
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .timeout(IMAGE_TIMEOUT)
            .json(&payload)
            .send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }
        let parsed: Value = serde_json::from_str(&body).map_err(|err| {
            ProviderError::Provider(format!("Gemini returned invalid JSON payload: {err}"))
        })?;
        Self::extract_image(&parsed)
    }
}

fn default_safety_settings() -> Vec<Value> {
    [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
    ]
    .into_iter()
    .map(|category| {
        json!({
            "category": category,
            "threshold": "OFF",
        })
    })
    .collect()
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

fn image_part_from_path(path: &Path) -> anyhow::Result<Value> {
    let bytes = fs::read(path)
        .with_context(|| format!("failed reading reference image {}", path.display()))?;
    let mime = mime_for_path(path).unwrap_or("image/png");
    Ok(json!({
        "inlineData": {
            "mimeType": mime,
            "data": BASE64.encode(bytes),
        }
    }))
}

/// Writes generated bytes to `path`, choosing the container by extension.
///
/// No extension or `.png` writes PNG (appending `.png` when missing); any
/// other extension writes JPEG. Returns the path actually written.
pub fn save_image(bytes: &[u8], path: &Path) -> anyhow::Result<PathBuf> {
    let decoded = image::load_from_memory(bytes).context("generated image could not be decoded")?;
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    let (target, format) = match ext.as_str() {
        "" => (path.with_extension("png"), ImageFormat::Png),
        "png" => (path.to_path_buf(), ImageFormat::Png),
        _ => (path.to_path_buf(), ImageFormat::Jpeg),
    };
    if let Some(parent) = target.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let written = match format {
        ImageFormat::Jpeg => decoded.to_rgb8().save_with_format(&target, format),
        _ => decoded.save_with_format(&target, format),
    };
    written.with_context(|| format!("failed writing {}", target.display()))?;
    Ok(target)
}
