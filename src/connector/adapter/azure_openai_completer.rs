use std::fmt::Display;
use std::pin::pin;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::application::{Completer, TokenSink};
use crate::domain::{ChatRequest, DomainError};

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

const ENV_DEPLOYMENT_NAME: &str = "AZURE_OPENAI_CHAT_DEPLOYMENT_NAME";
const ENV_API_VERSION: &str = "AZURE_OPENAI_CHAT_API_VERSION";
const ENV_API_KEY: &str = "AZURE_OPENAI_CHAT_API_KEY";
const ENV_API_BASE: &str = "AZURE_OPENAI_CHAT_API_BASE";

const DONE_MARKER: &str = "[DONE]";

/// Provider settings, read once at startup and never mutated afterwards.
#[derive(Clone)]
pub struct AzureOpenAiConfig {
    pub deployment_name: String,
    pub api_version: String,
    pub api_key: String,
    pub api_base: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl std::fmt::Debug for AzureOpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureOpenAiConfig")
            .field("deployment_name", &self.deployment_name)
            .field("api_version", &self.api_version)
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl AzureOpenAiConfig {
    /// Read configuration from the environment:
    ///
    /// | Variable                            | Purpose                       |
    /// |-------------------------------------|-------------------------------|
    /// | `AZURE_OPENAI_CHAT_DEPLOYMENT_NAME` | Model deployment to call      |
    /// | `AZURE_OPENAI_CHAT_API_VERSION`     | `api-version` query parameter |
    /// | `AZURE_OPENAI_CHAT_API_KEY`         | Sent as the `api-key` header  |
    /// | `AZURE_OPENAI_CHAT_API_BASE`        | Resource endpoint             |
    ///
    /// All four are required. Every missing or empty variable is named in the
    /// returned [`DomainError::Configuration`].
    pub fn from_env() -> Result<Self, DomainError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DomainError> {
        let mut missing = Vec::new();
        let mut required = |key: &'static str| match lookup(key) {
            Some(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => {
                missing.push(key);
                String::new()
            }
        };

        let deployment_name = required(ENV_DEPLOYMENT_NAME);
        let api_version = required(ENV_API_VERSION);
        let api_key = required(ENV_API_KEY);
        let api_base = required(ENV_API_BASE);

        if !missing.is_empty() {
            return Err(DomainError::configuration(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            deployment_name,
            api_version,
            api_key,
            api_base,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    /// Full chat-completions URL including the `api-version` query.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.api_base.trim_end_matches('/'),
            self.deployment_name,
            self.api_version
        )
    }
}

#[derive(serde::Serialize)]
struct ApiRequest<'a> {
    messages: Vec<ApiMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(serde::Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// One streamed chunk. Azure sends a leading chunk with no choices that only
/// carries content-filter results; defaults cover it.
#[derive(Deserialize)]
struct ApiChunk {
    #[serde(default)]
    id: String,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

/// Streaming client for Azure OpenAI chat deployments.
///
/// Each request is sent with `stream: true` and the server-sent-events body
/// is read as it arrives, so tokens reach the sink while the provider is
/// still generating.
pub struct AzureOpenAiCompleter {
    client: reqwest::Client,
    config: AzureOpenAiConfig,
    url: String,
}

impl AzureOpenAiCompleter {
    pub fn new(config: AzureOpenAiConfig) -> Self {
        let url = config.endpoint();
        Self {
            // No overall timeout: a long completion streams for as long as it needs
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            config,
            url,
        }
    }

    pub fn from_env() -> Result<Self, DomainError> {
        Ok(Self::new(AzureOpenAiConfig::from_env()?))
    }

    pub fn config(&self) -> &AzureOpenAiConfig {
        &self.config
    }

    /// Handle the data of one server-sent event. Returns `Ok(true)` once the
    /// stream's `[DONE]` marker is seen.
    fn handle_data(data: &str, sink: &mut TokenSink) -> Result<bool, DomainError> {
        let payload = data.trim();
        if payload == DONE_MARKER {
            return Ok(true);
        }
        if payload.is_empty() {
            return Ok(false);
        }

        let chunk: ApiChunk = serde_json::from_str(payload).map_err(|e| {
            DomainError::provider(format!("AzureOpenAiCompleter: malformed chunk: {e}"))
        })?;

        if let Some(error) = chunk.error {
            return Err(DomainError::provider(format!(
                "AzureOpenAiCompleter: provider reported: {}",
                error.message
            )));
        }

        if !chunk.id.is_empty() {
            sink.trace(chunk.id);
        }

        for choice in chunk.choices {
            match choice.delta.content {
                Some(content) if !content.is_empty() => sink.token(content),
                _ => {}
            }
        }

        Ok(false)
    }

    fn describe_failure(status: reqwest::StatusCode, body: &str) -> String {
        match serde_json::from_str::<ApiErrorEnvelope>(body) {
            Ok(envelope) if !envelope.error.message.is_empty() => format!(
                "AzureOpenAiCompleter: API returned {status}: {}",
                envelope.error.message
            ),
            _ => format!("AzureOpenAiCompleter: API returned {status}"),
        }
    }

    /// Frame a response body into events and feed them to the sink until
    /// `[DONE]`. A body that ends without it is a failure.
    async fn read_events<S, B, E>(body: S, sink: &mut TokenSink) -> Result<(), DomainError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: Display,
    {
        let mut events = pin!(body.eventsource());

        while let Some(event) = events.next().await {
            let event = event.map_err(|e| {
                DomainError::provider(format!("AzureOpenAiCompleter: stream interrupted: {e}"))
            })?;
            if Self::handle_data(&event.data, sink)? {
                debug!("AzureOpenAiCompleter: stream finished");
                return Ok(());
            }
        }

        Err(DomainError::provider(
            "AzureOpenAiCompleter: stream ended before [DONE]",
        ))
    }
}

#[async_trait]
impl Completer for AzureOpenAiCompleter {
    async fn complete(
        &self,
        request: &ChatRequest,
        sink: &mut TokenSink,
    ) -> Result<(), DomainError> {
        let body = ApiRequest {
            messages: vec![
                ApiMessage {
                    role: "system",
                    content: request.system_message(),
                },
                ApiMessage {
                    role: "user",
                    content: request.human_message(),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: true,
        };

        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                DomainError::provider(format!("AzureOpenAiCompleter: request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("AzureOpenAiCompleter: API returned {status}: {body}");
            return Err(DomainError::provider(Self::describe_failure(status, &body)));
        }

        Self::read_events(response.bytes_stream(), sink).await
    }

    fn model_name(&self) -> &str {
        &self.config.deployment_name
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::application::{Pop, TokenChannel, TokenConsumer};
    use crate::domain::StreamItem;

    fn full_env() -> HashMap<&'static str, String> {
        HashMap::from([
            (ENV_DEPLOYMENT_NAME, "gpt-35-turbo".to_string()),
            (ENV_API_VERSION, "2023-05-15".to_string()),
            (ENV_API_KEY, "secret".to_string()),
            (ENV_API_BASE, "https://example.openai.azure.com/".to_string()),
        ])
    }

    #[test]
    fn test_config_from_lookup() {
        let env = full_env();
        let config = AzureOpenAiConfig::from_lookup(|k| env.get(k).cloned()).unwrap();

        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.max_tokens, 2000);
        assert_eq!(
            config.endpoint(),
            "https://example.openai.azure.com/openai/deployments/gpt-35-turbo/chat/completions?api-version=2023-05-15"
        );
        assert!(!format!("{:?}", config).contains("secret"));
    }

    #[test]
    fn test_config_names_every_missing_variable() {
        let mut env = full_env();
        env.remove(ENV_API_KEY);
        env.insert(ENV_API_BASE, "  ".to_string());

        let err = AzureOpenAiConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert!(err.is_configuration());
        let msg = err.to_string();
        assert!(msg.contains(ENV_API_KEY));
        assert!(msg.contains(ENV_API_BASE));
        assert!(!msg.contains(ENV_DEPLOYMENT_NAME));
    }

    #[tokio::test]
    async fn test_handle_data_pushes_content_and_trace() {
        let (mut producer, mut consumer) = TokenChannel::open();
        let data = r#"{"id":"chatcmpl-1","choices":[{"delta":{"content":"Hi"}}]}"#;

        assert!(!AzureOpenAiCompleter::handle_data(data, producer.sink()).unwrap());
        assert!(!AzureOpenAiCompleter::handle_data(
            r#"{"id":"","choices":[],"prompt_filter_results":[]}"#,
            producer.sink()
        )
        .unwrap());
        assert!(AzureOpenAiCompleter::handle_data("[DONE]", producer.sink()).unwrap());

        let wait = Duration::from_millis(10);
        assert_eq!(
            consumer.pop(wait).await,
            Pop::Item(StreamItem::Trace("chatcmpl-1".to_string()))
        );
        assert_eq!(consumer.pop(wait).await, Pop::Item(StreamItem::Token("Hi".to_string())));
        assert_eq!(consumer.pop(wait).await, Pop::Empty);
    }

    #[test]
    fn test_handle_data_rejects_error_payload() {
        let (mut producer, _consumer) = TokenChannel::open();
        let data = r#"{"error":{"message":"content filtered"}}"#;
        let err = AzureOpenAiCompleter::handle_data(data, producer.sink()).unwrap_err();
        assert!(err.to_string().contains("content filtered"));
    }

    fn chunked(body: &str, cuts: &[usize]) -> Vec<Result<Vec<u8>, std::io::Error>> {
        let bytes = body.as_bytes();
        let mut chunks = Vec::new();
        let mut start = 0;
        for &cut in cuts.iter().chain(std::iter::once(&bytes.len())) {
            chunks.push(Ok(bytes[start..cut].to_vec()));
            start = cut;
        }
        chunks
    }

    async fn drain(consumer: &mut TokenConsumer) -> Vec<String> {
        let mut tokens = Vec::new();
        while let Pop::Item(item) = consumer.pop(Duration::from_millis(10)).await {
            if let StreamItem::Token(token) = item {
                tokens.push(token);
            }
        }
        tokens
    }

    #[tokio::test]
    async fn test_read_events_across_arbitrary_chunk_boundaries() {
        let body = "data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"h\u{e9}llo\"}}]}\r\n\r\n\
                    : keep-alive\n\n\
                    data: [DONE]\n\n";
        // Cut inside the JSON, inside the two-byte 'é', and inside the marker
        let accent = body.find('\u{e9}').unwrap();
        let marker = body.find("[DO").unwrap() + 3;
        let (mut producer, mut consumer) = TokenChannel::open();

        AzureOpenAiCompleter::read_events(
            futures_util::stream::iter(chunked(body, &[12, accent + 1, marker])),
            producer.sink(),
        )
        .await
        .unwrap();
        drop(producer);

        assert_eq!(drain(&mut consumer).await, vec!["h\u{e9}llo"]);
    }

    #[tokio::test]
    async fn test_read_events_requires_done_marker() {
        let body = "data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"cut\"}}]}\n\n";
        let (mut producer, _consumer) = TokenChannel::open();

        let err = AzureOpenAiCompleter::read_events(
            futures_util::stream::iter(chunked(body, &[])),
            producer.sink(),
        )
        .await
        .unwrap_err();

        assert!(err.is_provider());
        assert!(err.to_string().contains("[DONE]"));
    }

    #[test]
    fn test_describe_failure_uses_error_message() {
        let msg = AzureOpenAiCompleter::describe_failure(
            reqwest::StatusCode::UNAUTHORIZED,
            r#"{"error":{"code":"401","message":"Access denied due to invalid subscription key."}}"#,
        );
        assert!(msg.contains("401"));
        assert!(msg.contains("invalid subscription key"));
    }
}
