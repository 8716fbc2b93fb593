/// Chat and image generation relay
///
/// Talks to an OpenAI-compatible endpoint chosen by the provider
/// identifier. Single-shot calls return parsed JSON when the model
/// produced any (fenced or not), otherwise the raw text. Streaming
/// calls forward deltas as they arrive and treat cancellation as a
/// normal end with partial content.
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::GenerationError;
use crate::registry::RequestRegistry;
use crate::template::{GenerationKind, TemplateLibrary};

const VOLCENGINE_API_BASE: &str = "https://ark.cn-beijing.volces.com/api/v3";
const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Bound on single-shot, image-generation and avatar-download calls.
/// Streaming requests set no timeout; the open stream runs until it
/// ends, fails, or is cancelled.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Relay view of the global settings, rebuilt per call so settings
/// edits apply immediately.
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    pub provider: String,
    pub api_key: String,
    pub text_model: String,
    pub image_model: String,
    pub language: String,
}

impl RelayConfig {
    /// OpenAI-compatible base URL for the configured provider. Unknown
    /// identifiers fall back to the VolcEngine Ark endpoint; an
    /// explicit URL is used as-is.
    pub fn api_base(&self) -> String {
        match self.provider.as_str() {
            "openai" => OPENAI_API_BASE.to_string(),
            p if p.starts_with("http://") || p.starts_with("https://") => {
                p.trim_end_matches('/').to_string()
            }
            _ => VOLCENGINE_API_BASE.to_string(),
        }
    }
}

/// Single-shot result: parsed JSON when the model produced any,
/// otherwise the trimmed raw text. Callers handle both shapes.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum GenerationOutput {
    Json(Value),
    Text(String),
}

/// Push events emitted during a streaming generation.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// One text delta, forwarded as it arrives.
    Chunk(String),
    /// Reasoning-channel delta, when the provider surfaces one.
    Thinking(String),
    /// Stream finished; carries the full concatenated text (partial if
    /// the request was cancelled).
    End(String),
    /// Transport or API failure, distinct from cancellation.
    Error(String),
}

/// Where a generated avatar lands on disk and how to address it.
#[derive(Debug, Clone)]
pub struct AvatarTarget {
    /// Absolute `avatars/` directory of the owning project.
    pub dir: PathBuf,
    /// Project-relative prefix for the returned reference, e.g.
    /// `<project-id>/avatars`.
    pub relative_prefix: String,
    /// Character or shot id the image belongs to.
    pub subject_id: String,
}

pub struct GenerationRelay {
    client: reqwest::Client,
    templates: TemplateLibrary,
    registry: Arc<RequestRegistry>,
}

impl GenerationRelay {
    pub fn new(templates: TemplateLibrary) -> Self {
        Self {
            client: reqwest::Client::new(),
            templates,
            registry: Arc::new(RequestRegistry::new()),
        }
    }

    pub fn registry(&self) -> Arc<RequestRegistry> {
        Arc::clone(&self.registry)
    }

    /// Cancel an in-flight streaming request. Returns whether a live
    /// request was found under that id.
    pub fn cancel(&self, request_id: &str) -> bool {
        self.registry.cancel(request_id)
    }

    fn ensure_chat_configured(config: &RelayConfig) -> Result<(), GenerationError> {
        if config.api_key.trim().is_empty() {
            return Err(GenerationError::NotConfigured(
                "API key is not configured".to_string(),
            ));
        }
        if config.text_model.trim().is_empty() {
            return Err(GenerationError::NotConfigured(
                "text model is not configured".to_string(),
            ));
        }
        Ok(())
    }

    /// Single-shot templated generation.
    pub async fn generate(
        &self,
        config: &RelayConfig,
        kind: GenerationKind,
        params: &Map<String, Value>,
    ) -> Result<GenerationOutput, GenerationError> {
        Self::ensure_chat_configured(config)?;
        let prompt = self.templates.build_prompt(kind, params, &config.language)?;

        info!(kind = kind.as_str(), model = %config.text_model, "generation request");
        let payload = json!({
            "model": config.text_model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let response = self
            .client
            .post(format!("{}/chat/completions", config.api_base()))
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(&config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| GenerationError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Transport(format!("{status}: {body}")));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| GenerationError::InvalidResponse(err.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();

        Ok(parse_output(&content))
    }

    /// Streaming templated generation. Pre-flight failures (missing
    /// credentials, unknown kind, missing params) are returned as an
    /// error before anything is tracked; everything after that is
    /// delivered through `events`, ending with `End` or `Error`. The
    /// registry entry is removed on every exit path.
    pub async fn generate_streaming(
        &self,
        config: &RelayConfig,
        kind: GenerationKind,
        params: &Map<String, Value>,
        request_id: &str,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<(), GenerationError> {
        Self::ensure_chat_configured(config)?;
        let prompt = self.templates.build_prompt(kind, params, &config.language)?;

        let token = self.registry.register(request_id);
        info!(kind = kind.as_str(), request_id, "streaming generation start");
        let outcome = self
            .stream_completion(config, prompt, &token, &events)
            .await;
        self.registry.remove(request_id);

        if let Err(err) = outcome {
            warn!(request_id, %err, "streaming generation failed");
            let _ = events.send(StreamEvent::Error(err.to_string())).await;
        }
        Ok(())
    }

    async fn stream_completion(
        &self,
        config: &RelayConfig,
        prompt: String,
        token: &CancellationToken,
        events: &mpsc::Sender<StreamEvent>,
    ) -> Result<(), GenerationError> {
        let payload = json!({
            "model": config.text_model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": true,
        });
        let response = self
            .client
            .post(format!("{}/chat/completions", config.api_base()))
            .bearer_auth(&config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| GenerationError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Transport(format!("{status}: {body}")));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut full_text = String::new();

        'receive: loop {
            tokio::select! {
                _ = token.cancelled() => {
                    // User abort: surface whatever arrived as a normal
                    // end, not an error.
                    debug!("stream cancelled with {} chars received", full_text.len());
                    break 'receive;
                }
                chunk = stream.next() => {
                    let bytes = match chunk {
                        None => break 'receive,
                        Some(Err(err)) => {
                            return Err(GenerationError::Transport(err.to_string()));
                        }
                        Some(Ok(bytes)) => bytes,
                    };
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    while let Some(line_end) = buffer.find('\n') {
                        let line = buffer[..line_end].trim().to_string();
                        buffer.drain(..=line_end);
                        match parse_sse_line(&line) {
                            SseLine::Done => break 'receive,
                            SseLine::Ignore => {}
                            SseLine::Delta { content, thinking } => {
                                if let Some(text) = thinking {
                                    if events.send(StreamEvent::Thinking(text)).await.is_err() {
                                        break 'receive;
                                    }
                                }
                                if let Some(text) = content {
                                    full_text.push_str(&text);
                                    if events.send(StreamEvent::Chunk(text)).await.is_err() {
                                        break 'receive;
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        let _ = events.send(StreamEvent::End(full_text)).await;
        Ok(())
    }

    /// Non-streaming image generation. Returns the remote URL, or —
    /// when an avatar target is supplied — downloads the bytes into the
    /// project and returns the relative reference, falling back to the
    /// URL if the download or save fails.
    pub async fn generate_image(
        &self,
        config: &RelayConfig,
        prompt: &str,
        target: Option<AvatarTarget>,
    ) -> Result<String, GenerationError> {
        if config.api_key.trim().is_empty() {
            return Err(GenerationError::NotConfigured(
                "API key is not configured".to_string(),
            ));
        }
        if config.image_model.trim().is_empty() {
            return Err(GenerationError::NotConfigured(
                "image model is not configured".to_string(),
            ));
        }

        let payload = json!({
            "model": config.image_model,
            "prompt": prompt,
            "n": 1,
            "size": "1024x1024",
        });
        let response = self
            .client
            .post(format!("{}/images/generations", config.api_base()))
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(&config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| GenerationError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Transport(format!("{status}: {body}")));
        }

        let parsed: ImagesResponse = response
            .json()
            .await
            .map_err(|err| GenerationError::InvalidResponse(err.to_string()))?;
        let url = parsed
            .data
            .into_iter()
            .next()
            .and_then(|d| d.url)
            .ok_or_else(|| {
                GenerationError::InvalidResponse("image response carried no URL".to_string())
            })?;

        let Some(target) = target else {
            return Ok(url);
        };
        match self.download_avatar(&url, &target).await {
            Ok(reference) => Ok(reference),
            Err(err) => {
                // Remote URLs expire, but a failed local save should
                // not fail the generation.
                warn!(%err, "avatar download failed, returning remote URL");
                Ok(url)
            }
        }
    }

    async fn download_avatar(
        &self,
        url: &str,
        target: &AvatarTarget,
    ) -> Result<String, GenerationError> {
        let response = self
            .client
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|err| GenerationError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            return Err(GenerationError::Transport(format!(
                "avatar download failed: {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| GenerationError::Transport(err.to_string()))?;

        tokio::fs::create_dir_all(&target.dir).await?;
        let file_name = format!("{}-{}.png", target.subject_id, Uuid::new_v4());
        tokio::fs::write(target.dir.join(&file_name), &bytes).await?;

        Ok(format!(
            "{}/{file_name}",
            target.relative_prefix.trim_end_matches('/')
        ))
    }
}

/// Strip ```json / ``` fencing the way the legacy relay did (all
/// occurrences), then try JSON.
pub fn parse_output(content: &str) -> GenerationOutput {
    let cleaned = content.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();
    match serde_json::from_str(cleaned) {
        Ok(value) => GenerationOutput::Json(value),
        Err(_) => GenerationOutput::Text(cleaned.to_string()),
    }
}

enum SseLine {
    Delta {
        content: Option<String>,
        thinking: Option<String>,
    },
    Done,
    Ignore,
}

fn parse_sse_line(line: &str) -> SseLine {
    if line.is_empty() {
        return SseLine::Ignore;
    }
    if line == "data: [DONE]" {
        return SseLine::Done;
    }
    let Some(json_str) = line.strip_prefix("data: ") else {
        return SseLine::Ignore;
    };
    let Ok(value) = serde_json::from_str::<Value>(json_str) else {
        return SseLine::Ignore;
    };
    let delta = &value["choices"][0]["delta"];
    SseLine::Delta {
        content: delta["content"].as_str().map(str::to_string),
        thinking: delta["reasoning_content"].as_str().map(str::to_string),
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: Option<ChatCompletionMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn relay() -> GenerationRelay {
        GenerationRelay::new(TemplateLibrary::builtin())
    }

    fn configured() -> RelayConfig {
        RelayConfig {
            provider: "volcengine".to_string(),
            api_key: "sk-test".to_string(),
            text_model: "skylark".to_string(),
            image_model: "seedream".to_string(),
            language: "en".to_string(),
        }
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_any_network() {
        let config = RelayConfig::default();
        let err = relay()
            .generate(&config, GenerationKind::ShotDescription, &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_streaming_preflight_failure_registers_nothing() {
        let relay = relay();
        let (tx, mut rx) = mpsc::channel(8);
        // Required params absent: rejected before the request is tracked.
        let err = relay
            .generate_streaming(
                &configured(),
                GenerationKind::SceneOutline,
                &Map::new(),
                "req-1",
                tx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::MissingParam(_)));
        assert_eq!(relay.registry().tracked(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_api_base_mapping() {
        let mut config = configured();
        assert_eq!(config.api_base(), VOLCENGINE_API_BASE);

        config.provider = "openai".to_string();
        assert_eq!(config.api_base(), OPENAI_API_BASE);

        config.provider = "https://llm.example.com/v1/".to_string();
        assert_eq!(config.api_base(), "https://llm.example.com/v1");

        config.provider = "somethingelse".to_string();
        assert_eq!(config.api_base(), VOLCENGINE_API_BASE);
    }

    #[test]
    fn test_parse_output_strips_fences_and_parses_json() {
        let fenced = "```json\n{\"name\": \"Ada\"}\n```";
        assert_eq!(
            parse_output(fenced),
            GenerationOutput::Json(json!({"name": "Ada"}))
        );
    }

    #[test]
    fn test_parse_output_falls_back_to_trimmed_text() {
        assert_eq!(
            parse_output("  just prose, not JSON \n"),
            GenerationOutput::Text("just prose, not JSON".to_string())
        );
    }

    #[test]
    fn test_parse_sse_lines() {
        let content = r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#;
        match parse_sse_line(content) {
            SseLine::Delta { content, thinking } => {
                assert_eq!(content.as_deref(), Some("Hi"));
                assert!(thinking.is_none());
            }
            _ => panic!("expected delta"),
        }

        let reasoning = r#"data: {"choices":[{"delta":{"reasoning_content":"hmm"}}]}"#;
        match parse_sse_line(reasoning) {
            SseLine::Delta { content, thinking } => {
                assert!(content.is_none());
                assert_eq!(thinking.as_deref(), Some("hmm"));
            }
            _ => panic!("expected delta"),
        }

        assert!(matches!(parse_sse_line("data: [DONE]"), SseLine::Done));
        assert!(matches!(parse_sse_line(""), SseLine::Ignore));
        assert!(matches!(parse_sse_line(": keep-alive"), SseLine::Ignore));
    }
}
