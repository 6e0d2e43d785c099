use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::{Content, ContentProvider, ContentRequest, ContentResponse, Part};
use crate::codec::EncodedImage;
use crate::config::{self, StudioConfig};

/// Sent as a header so the key never appears in request URLs or error text.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// `generateContent` transport for the Gemini REST API.
pub struct GeminiProvider {
    api_base: String,
    http: HttpClient,
    request_timeout: Duration,
    transport_retries: usize,
    retry_backoff: Duration,
}

impl GeminiProvider {
    pub fn new(config: &StudioConfig) -> Self {
        Self {
            api_base: config.api_base.trim().trim_end_matches('/').to_string(),
            http: HttpClient::new(),
            request_timeout: config.request_timeout,
            transport_retries: config.transport_retries,
            retry_backoff: config.retry_backoff,
        }
    }

    fn api_key() -> Result<String> {
        require_api_key(config::api_key())
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(request: &ContentRequest) -> Value {
        let contents: Vec<Value> = request.contents.iter().map(content_to_json).collect();
        let mut payload = Map::new();
        payload.insert("contents".to_string(), Value::Array(contents));
        if let Some(instruction) = request
            .system_instruction
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            payload.insert(
                "systemInstruction".to_string(),
                json!({ "parts": [{ "text": instruction }] }),
            );
        }
        if !request.response_modalities.is_empty() {
            payload.insert(
                "generationConfig".to_string(),
                json!({
                    "responseModalities": request
                        .response_modalities
                        .iter()
                        .map(|modality| modality.as_api_str())
                        .collect::<Vec<_>>(),
                }),
            );
        }
        Value::Object(payload)
    }

    fn post_with_transport_retries(
        &self,
        endpoint: &str,
        api_key: &str,
        payload: &Value,
    ) -> Result<HttpResponse> {
        for attempt in 0..=self.transport_retries {
            let response = self
                .http
                .post(endpoint)
                .header(API_KEY_HEADER, api_key)
                .timeout(self.request_timeout)
                .json(payload)
                .send();

            match response {
                Ok(ok) => return Ok(ok),
                Err(raw) => {
                    let err = anyhow::Error::new(raw.without_url())
                        .context(format!("Gemini request failed ({endpoint})"));
                    if !is_retryable_transport_error(&err) || attempt >= self.transport_retries {
                        return Err(err);
                    }
                    warn!(
                        attempt = attempt + 1,
                        max = self.transport_retries,
                        "Gemini transport retry after transient request failure"
                    );
                    thread::sleep(self.retry_backoff.mul_f64(attempt as f64 + 1.0));
                }
            }
        }

        bail!("Gemini transport retries exhausted ({endpoint})")
    }

    fn generate_with_key(&self, request: &ContentRequest, api_key: &str) -> Result<ContentResponse> {
        let endpoint = self.endpoint_for_model(&request.model);
        let payload = Self::build_payload(request);
        debug!(endpoint = %endpoint, turns = request.contents.len(), "Gemini generateContent");

        let response = self.post_with_transport_retries(&endpoint, api_key, &payload)?;
        let response_payload = response_json_or_error("Gemini", response)?;
        if let Some(reason) = response_payload
            .get("promptFeedback")
            .and_then(|feedback| feedback.get("blockReason"))
            .and_then(Value::as_str)
        {
            bail!("Gemini blocked the prompt ({reason})");
        }
        Ok(Self::parse_response(&response_payload))
    }

    pub(crate) fn parse_response(response_payload: &Value) -> ContentResponse {
        let candidates = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut out = ContentResponse::default();

        for candidate in candidates {
            if out.finish_reason.is_none() {
                out.finish_reason = candidate
                    .get("finishReason")
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
            let parts = candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for part in parts {
                if let Some(inline) = part
                    .get("inlineData")
                    .or_else(|| part.get("inline_data"))
                    .and_then(Value::as_object)
                {
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
                    out.parts
                        .push(Part::InlineImage(EncodedImage::new(data, mime_type)));
                    continue;
                }
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    out.parts.push(Part::text(text));
                }
            }
        }

        out
    }
}

impl ContentProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn check_ready(&self) -> Result<()> {
        Self::api_key().map(|_| ())
    }

    fn generate_content(&self, request: &ContentRequest) -> Result<ContentResponse> {
        let api_key = Self::api_key()?;
        self.generate_with_key(request, &api_key)
    }
}

fn require_api_key(key: Option<String>) -> Result<String> {
    match key {
        Some(key) => Ok(key),
        None => bail!("{} not set", config::API_KEY_VARS.join(" or ")),
    }
}

fn content_to_json(content: &Content) -> Value {
    let parts: Vec<Value> = content
        .parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => json!({ "text": text }),
            Part::InlineImage(image) => json!({
                "inlineData": {
                    "mimeType": image.mime_type,
                    "data": image.data,
                }
            }),
        })
        .collect();
    json!({
        "role": content.role,
        "parts": parts,
    })
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

fn is_retryable_transport_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .map(|reqwest_err| {
                reqwest_err.is_timeout() || reqwest_err.is_connect() || reqwest_err.is_request()
            })
            .unwrap_or(false)
    })
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::JoinHandle;

    use serde_json::json;

    use super::*;
    use crate::error::{StudioError, GENERATION_FAILED};
    use crate::providers::Modality;

    #[test]
    fn endpoint_accepts_bare_and_prefixed_models() {
        let mut config = StudioConfig::default();
        config.api_base = "https://example.test/v1beta/".to_string();
        let provider = GeminiProvider::new(&config);
        assert_eq!(
            provider.endpoint_for_model("gemini-2.5-flash"),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(
            provider.endpoint_for_model(" models/gemini-2.5-flash "),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn payload_places_image_before_instruction() {
        let request = ContentRequest {
            model: "gemini-2.5-flash-image-preview".to_string(),
            system_instruction: None,
            contents: vec![Content::user(vec![
                Part::InlineImage(EncodedImage::new("QUJD", "image/jpeg")),
                Part::text("make it coastal"),
            ])],
            response_modalities: vec![Modality::Image, Modality::Text],
        };
        let payload = GeminiProvider::build_payload(&request);
        assert_eq!(
            payload["contents"][0]["parts"][0]["inlineData"]["mimeType"],
            "image/jpeg"
        );
        assert_eq!(payload["contents"][0]["parts"][0]["inlineData"]["data"], "QUJD");
        assert_eq!(payload["contents"][0]["parts"][1]["text"], "make it coastal");
        assert_eq!(payload["contents"][0]["role"], "user");
        assert_eq!(
            payload["generationConfig"]["responseModalities"],
            json!(["IMAGE", "TEXT"])
        );
        assert!(payload.get("systemInstruction").is_none());
    }

    #[test]
    fn payload_carries_system_instruction_and_history() {
        let request = ContentRequest {
            model: "gemini-2.5-flash".to_string(),
            system_instruction: Some("be helpful".to_string()),
            contents: vec![
                Content::user(vec![Part::text("hi")]),
                Content::model(vec![Part::text("hello")]),
                Content::user(vec![Part::text("lamps?")]),
            ],
            response_modalities: Vec::new(),
        };
        let payload = GeminiProvider::build_payload(&request);
        assert_eq!(payload["systemInstruction"]["parts"][0]["text"], "be helpful");
        assert_eq!(payload["contents"][1]["role"], "model");
        assert_eq!(payload["contents"].as_array().map(Vec::len), Some(3));
        assert!(payload.get("generationConfig").is_none());
    }

    #[test]
    fn parse_response_keeps_part_order_and_both_spellings() {
        let payload = json!({
            "candidates": [
                {
                    "finishReason": "STOP",
                    "content": {
                        "parts": [
                            { "text": "Here is the redesign." },
                            { "inline_data": { "mime_type": "image/jpeg", "data": "AAA" } },
                            { "inlineData": { "mimeType": "image/png", "data": "BBB" } },
                            { "inlineData": { "mimeType": "image/png", "data": "" } }
                        ]
                    }
                },
                {
                    "content": { "parts": [ { "inlineData": { "data": "CCC" } } ] }
                }
            ]
        });
        let response = GeminiProvider::parse_response(&payload);
        assert_eq!(response.parts.len(), 4);
        assert_eq!(response.finish_reason.as_deref(), Some("STOP"));
        assert_eq!(response.parts[0], Part::text("Here is the redesign."));
        let first = response.first_image().cloned();
        assert_eq!(first, Some(EncodedImage::new("AAA", "image/jpeg")));
        assert_eq!(
            response.parts[3],
            Part::InlineImage(EncodedImage::new("CCC", "image/png"))
        );
    }

    #[test]
    fn parse_response_tolerates_empty_payload() {
        let response = GeminiProvider::parse_response(&json!({}));
        assert!(response.parts.is_empty());
        assert!(response.first_image().is_none());
    }

    /// Serves one canned HTTP response and hands back the raw request text.
    fn serve_once(status: &str, body: &str) -> anyhow::Result<(String, JoinHandle<String>)> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let base = format!("http://{}/v1beta", listener.local_addr()?);
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let handle = thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return String::new();
            };
            let request = read_request(&mut stream);
            let _ = stream.write_all(response.as_bytes());
            request
        });
        Ok((base, handle))
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut raw = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let Ok(read) = stream.read(&mut chunk) else {
                break;
            };
            if read == 0 {
                break;
            }
            raw.extend_from_slice(&chunk[..read]);
            let text = String::from_utf8_lossy(&raw).to_string();
            if let Some(split) = text.find("\r\n\r\n") {
                let length = text[..split]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if raw.len() >= split + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&raw).to_string()
    }

    fn provider_at(api_base: &str) -> GeminiProvider {
        let mut config = StudioConfig::default();
        config.api_base = api_base.to_string();
        config.transport_retries = 0;
        GeminiProvider::new(&config)
    }

    fn text_request() -> ContentRequest {
        ContentRequest {
            model: "gemini-2.5-flash".to_string(),
            system_instruction: None,
            contents: vec![Content::user(vec![Part::text("lamps?")])],
            response_modalities: Vec::new(),
        }
    }

    #[test]
    fn missing_key_names_every_variable() {
        let err = require_api_key(None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "GEMINI_API_KEY or GOOGLE_API_KEY or API_KEY not set"
        );
        assert_eq!(require_api_key(Some("k".to_string())).ok().as_deref(), Some("k"));
    }

    #[test]
    fn transport_failure_never_exposes_the_key() {
        let provider = provider_at("http://127.0.0.1:1/v1beta");
        let err = provider
            .generate_with_key(&text_request(), "SECRET-KEY-123")
            .unwrap_err();
        let detail = StudioError::Generation {
            message: GENERATION_FAILED.to_string(),
            source: err,
        }
        .detail();
        assert!(detail.contains("Gemini request failed"));
        assert!(!detail.contains("SECRET-KEY-123"));
    }

    #[test]
    fn key_travels_in_header_not_url() -> anyhow::Result<()> {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": "Try brass sconces." }] } }]
        })
        .to_string();
        let (base, server) = serve_once("200 OK", &body)?;

        let response = provider_at(&base).generate_with_key(&text_request(), "SECRET-KEY-123")?;
        assert_eq!(response.text(), "Try brass sconces.");

        let request = server.join().unwrap_or_default();
        let request_line = request.lines().next().unwrap_or_default();
        assert!(request_line.starts_with("POST /v1beta/models/gemini-2.5-flash:generateContent"));
        assert!(!request_line.contains("SECRET-KEY-123"));
        assert!(request
            .to_ascii_lowercase()
            .contains("x-goog-api-key: secret-key-123"));
        Ok(())
    }

    #[test]
    fn error_status_reports_code_and_body() -> anyhow::Result<()> {
        let (base, server) = serve_once(
            "500 Internal Server Error",
            r#"{"error":{"message":"backend overloaded"}}"#,
        )?;
        let err = provider_at(&base)
            .generate_with_key(&text_request(), "k")
            .unwrap_err();
        let _ = server.join();
        let text = format!("{err:#}");
        assert!(text.contains("Gemini request failed (500)"));
        assert!(text.contains("backend overloaded"));
        Ok(())
    }

    #[test]
    fn blocked_prompt_is_an_error() -> anyhow::Result<()> {
        let body = json!({ "promptFeedback": { "blockReason": "SAFETY" } }).to_string();
        let (base, server) = serve_once("200 OK", &body)?;
        let err = provider_at(&base)
            .generate_with_key(&text_request(), "k")
            .unwrap_err();
        let _ = server.join();
        assert_eq!(err.to_string(), "Gemini blocked the prompt (SAFETY)");
        Ok(())
    }

    #[test]
    fn truncate_text_appends_ellipsis() {
        assert_eq!(truncate_text("abcdef", 3), "abc…");
        assert_eq!(truncate_text("abc", 3), "abc");
    }
}
