use std::collections::BTreeMap;
use std::io::Cursor;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use mascot_contracts::media::EncodedImage;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::config::EngineConfig;

/// One "generate a single image" call: a text prompt plus an optional image
/// the model should condition on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub reference: Option<EncodedImage>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: Option<EncodedImage>) -> Self {
        self.reference = reference;
        self
    }
}

/// The remote generation seam.
///
/// Failures are plain `anyhow` errors; callers classify them by message, so
/// implementations should keep HTTP status codes and provider error codes in
/// the error text.
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &GenerationRequest) -> Result<EncodedImage>;
}

#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Box<dyn ImageGenerator>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: ImageGenerator + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Box::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<&dyn ImageGenerator> {
        self.providers.get(name).map(|provider| provider.as_ref())
    }

    pub fn take(&mut self, name: &str) -> Option<Box<dyn ImageGenerator>> {
        self.providers.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

pub fn default_provider_registry(config: &EngineConfig) -> ProviderRegistry {
    let mut providers = ProviderRegistry::new();
    providers.register(DryrunProvider::new(256));
    providers.register(GeminiProvider::new(config));
    providers
}

/// Offline generator: a prompt-colored disc with a dark outline on white.
pub struct DryrunProvider {
    size: u32,
}

impl DryrunProvider {
    pub fn new(size: u32) -> Self {
        Self {
            size: size.max(16),
        }
    }
}

impl ImageGenerator for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<EncodedImage> {
        let reference_bytes = request
            .reference
            .as_ref()
            .map(|image| image.bytes.as_slice())
            .unwrap_or_default();
        let (r, g, b) = color_from_prompt(&request.prompt, reference_bytes);
        let size = self.size;
        let center = f64::from(size) / 2.0;
        let radius = f64::from(size) * 0.35;
        let outline = (f64::from(size) * 0.02).max(1.5);

        let mut canvas = RgbaImage::from_pixel(size, size, Rgba([255, 255, 255, 255]));
        for (x, y, pixel) in canvas.enumerate_pixels_mut() {
            let dx = f64::from(x) + 0.5 - center;
            let dy = f64::from(y) + 0.5 - center;
            let distance = (dx * dx + dy * dy).sqrt();
            if distance <= radius - outline {
                *pixel = Rgba([r, g, b, 255]);
            } else if distance <= radius {
                *pixel = Rgba([16, 16, 16, 255]);
            }
        }

        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(canvas)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .context("dryrun image encode failed")?;
        Ok(EncodedImage::png(bytes))
    }
}

fn color_from_prompt(prompt: &str, reference: &[u8]) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(reference);
    let digest = hasher.finalize();
    // keep the fill away from white so it never reads as background
    (digest[0] % 200, digest[1] % 200, digest[2] % 200)
}

const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiProvider {
    api_base: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            api_base: config.gemini_api_base.clone(),
            api_key: config.gemini_api_key.clone(),
            model: config.image_model.clone(),
            timeout: config.request_timeout,
            http: HttpClient::new(),
        }
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

    fn build_payload(request: &GenerationRequest) -> Value {
        let mut parts = Vec::new();
        if let Some(reference) = request.reference.as_ref() {
            parts.push(json!({
                "inlineData": {
                    "mimeType": reference.mime_type,
                    "data": reference.base64(),
                }
            }));
        }
        parts.push(json!({ "text": request.prompt }));

        json!({
            "contents": [{
                "role": "user",
                "parts": parts,
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
            },
            "safetySettings": Self::safety_settings(),
        })
    }

    fn safety_settings() -> Vec<Value> {
        [
            "HARM_CATEGORY_HATE_SPEECH",
            "HARM_CATEGORY_SEXUALLY_EXPLICIT",
            "HARM_CATEGORY_HARASSMENT",
            "HARM_CATEGORY_DANGEROUS_CONTENT",
        ]
        .into_iter()
        .map(|category| {
            json!({
                "category": category,
                "threshold": "BLOCK_ONLY_HIGH",
            })
        })
        .collect()
    }

    fn first_image(response_payload: &Value) -> Result<EncodedImage> {
        let parts = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for part in parts {
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
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            return EncodedImage::from_base64(data, mime_type)
                .context("Gemini image base64 decode failed");
        }
        bail!("No image was generated by the API.")
    }
}

impl ImageGenerator for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<EncodedImage> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("API key is not configured (set GEMINI_API_KEY or GOOGLE_API_KEY)");
        };
        let endpoint = self.endpoint();
        let payload = Self::build_payload(request);

        let response = self
            .http
            .post(&endpoint)
            .header(API_KEY_HEADER, api_key)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let code = response.status().as_u16();
        let body = response
            .text()
            .map_err(reqwest::Error::without_url)
            .context("Gemini response body read failed")?;
        let parsed = json_or_status_error("Gemini", code, &body)?;
        Self::first_image(&parsed)
    }
}

/// Keeps the status code and the provider's error body in the message so
/// retry classification can see markers like `429` or `RESOURCE_EXHAUSTED`.
fn json_or_status_error(provider: &str, code: u16, body: &str) -> Result<Value> {
    if !(200..300).contains(&code) {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(body, 512)
        );
    }
    serde_json::from_str(body).with_context(|| format!("{provider} returned invalid JSON payload"))
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mascot_contracts::media::EncodedImage;
    use serde_json::json;

    use super::{
        default_provider_registry, json_or_status_error, truncate_text, DryrunProvider,
        GeminiProvider, GenerationRequest, ImageGenerator,
    };
    use crate::config::EngineConfig;
    use crate::retry::error_chain_text;

    fn config() -> EngineConfig {
        EngineConfig {
            gemini_api_key: None,
            gemini_api_base: "https://example.test/v1beta".to_string(),
            image_model: "gemini-2.5-flash-image".to_string(),
            request_timeout: Duration::from_secs(30),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn registry_lists_builtin_providers() {
        let registry = default_provider_registry(&config());
        assert_eq!(registry.names(), vec!["dryrun", "gemini"]);
        assert!(registry.get("dryrun").is_some());
        assert!(registry.get("openai").is_none());
    }

    #[test]
    fn dryrun_is_deterministic_png_on_white() -> anyhow::Result<()> {
        let provider = DryrunProvider::new(64);
        let request = GenerationRequest::new("a lazy alligator");
        let first = provider.generate(&request)?;
        let second = provider.generate(&request)?;
        assert_eq!(first, second);
        assert_eq!(first.mime_type, "image/png");

        let raster = image::load_from_memory(&first.bytes)?.to_rgba8();
        assert_eq!(raster.get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert_ne!(raster.get_pixel(32, 32).0, [255, 255, 255, 255]);

        let other = provider.generate(&GenerationRequest::new("a proud pelican"))?;
        assert_ne!(first, other);
        Ok(())
    }

    #[test]
    fn gemini_endpoint_normalizes_model_prefix() {
        let provider = GeminiProvider::new(&config());
        assert_eq!(
            provider.endpoint(),
            "https://example.test/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
    }

    #[test]
    fn gemini_payload_puts_reference_before_text() {
        let request = GenerationRequest::new("wave hello")
            .with_reference(Some(EncodedImage::new(vec![1, 2, 3], "image/jpeg")));
        let payload = GeminiProvider::build_payload(&request);
        let parts = &payload["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], json!("image/jpeg"));
        assert_eq!(parts[0]["inlineData"]["data"], json!("AQID"));
        assert_eq!(parts[1]["text"], json!("wave hello"));
        assert_eq!(
            payload["generationConfig"]["responseModalities"],
            json!(["IMAGE"])
        );
        assert_eq!(payload["safetySettings"][0]["threshold"], json!("BLOCK_ONLY_HIGH"));
    }

    #[test]
    fn gemini_extracts_first_inline_image_with_its_mime() {
        let response = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "here you go" },
                        { "inlineData": { "mimeType": "image/jpeg", "data": "AQID" } },
                        { "inlineData": { "mimeType": "image/png", "data": "BAUG" } }
                    ]
                }
            }]
        });
        let image = GeminiProvider::first_image(&response).unwrap();
        assert_eq!(image, EncodedImage::new(vec![1, 2, 3], "image/jpeg"));
    }

    #[test]
    fn gemini_without_image_parts_fails() {
        let err = GeminiProvider::first_image(&json!({ "candidates": [] })).unwrap_err();
        assert_eq!(err.to_string(), "No image was generated by the API.");
    }

    #[test]
    fn gemini_without_key_fails_before_any_request() {
        let provider = GeminiProvider::new(&config());
        let err = provider
            .generate(&GenerationRequest::new("anything"))
            .unwrap_err();
        assert!(err.to_string().contains("API key is not configured"));
    }

    #[test]
    fn transport_errors_never_carry_the_api_key() {
        let provider = GeminiProvider::new(&EngineConfig {
            gemini_api_key: Some("SECRET123".to_string()),
            gemini_api_base: "http://127.0.0.1:1/v1beta".to_string(),
            request_timeout: Duration::from_secs(5),
            ..config()
        });
        let err = provider
            .generate(&GenerationRequest::new("anything"))
            .unwrap_err();
        let text = error_chain_text(&err, 4_096);
        assert!(text.starts_with("Gemini request failed"));
        assert!(!text.contains("SECRET123"), "{text}");
    }

    #[test]
    fn status_errors_keep_code_and_body() {
        let err = json_or_status_error(
            "Gemini",
            429,
            r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#,
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("(429)"));
        assert!(message.contains("RESOURCE_EXHAUSTED"));
        assert!(json_or_status_error("Gemini", 200, "{}").is_ok());
        assert!(json_or_status_error("Gemini", 200, "not json").is_err());
    }

    #[test]
    fn truncate_appends_ellipsis() {
        assert_eq!(truncate_text("abcdef", 3), "abc…");
        assert_eq!(truncate_text("abc", 3), "abc");
    }
}
