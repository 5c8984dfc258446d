use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::application::{Completer, TokenSink};
use crate::domain::{ChatRequest, DomainError};

enum Script {
    Fixed(Vec<String>),
    /// Replies with the human message, one word per token.
    Echo,
}

/// Deterministic [`Completer`] for local runs and tests.
pub struct MockCompleter {
    script: Script,
    delay: Option<Duration>,
    failure: Option<String>,
    run_id: Option<String>,
}

impl MockCompleter {
    pub fn new(tokens: Vec<impl Into<String>>) -> Self {
        Self {
            script: Script::Fixed(tokens.into_iter().map(Into::into).collect()),
            delay: None,
            failure: None,
            run_id: None,
        }
    }

    pub fn echo() -> Self {
        Self {
            script: Script::Echo,
            delay: None,
            failure: None,
            run_id: None,
        }
    }

    /// Sleep before each token.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail with a provider error after the scripted tokens.
    pub fn failing_with(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    fn tokens_for(&self, request: &ChatRequest) -> Vec<String> {
        match &self.script {
            Script::Fixed(tokens) => tokens.clone(),
            Script::Echo => {
                let mut tokens = vec!["You said:".to_string()];
                tokens.extend(
                    request
                        .human_message()
                        .split_whitespace()
                        .map(|word| format!(" {}", word)),
                );
                tokens
            }
        }
    }
}

impl Default for MockCompleter {
    fn default() -> Self {
        Self::echo()
    }
}

#[async_trait]
impl Completer for MockCompleter {
    async fn complete(
        &self,
        request: &ChatRequest,
        sink: &mut TokenSink,
    ) -> Result<(), DomainError> {
        let run_id = self
            .run_id
            .clone()
            .unwrap_or_else(|| format!("mock-{}", Uuid::new_v4()));
        sink.trace(run_id);

        let tokens = self.tokens_for(request);
        debug!("MockCompleter emitting {} tokens", tokens.len());

        for token in tokens {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            sink.token(token);
        }

        match &self.failure {
            Some(reason) => Err(DomainError::provider(reason.clone())),
            None => Ok(()),
        }
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
