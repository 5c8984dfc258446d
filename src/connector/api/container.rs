use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::debug;

use crate::{AzureOpenAiCompleter, Completer, MockCompleter, StreamBridge, DEFAULT_POLL_INTERVAL};

const MOCK_TOKEN_DELAY: Duration = Duration::from_millis(50);

const ENV_POLL_INTERVAL_MS: &str = "CHATSTREAM_POLL_INTERVAL_MS";
const ENV_DEADLINE_SECS: &str = "CHATSTREAM_DEADLINE_SECS";

pub struct ContainerConfig {
    /// Use the echoing mock completer instead of Azure OpenAI. No provider
    /// credentials are required in this mode.
    pub mock: bool,
    pub poll_interval: Duration,
    pub deadline: Option<Duration>,
}

impl ContainerConfig {
    /// Resolve bridge timings: explicit CLI values win over
    /// `CHATSTREAM_POLL_INTERVAL_MS` / `CHATSTREAM_DEADLINE_SECS`, which win
    /// over the defaults (1 s poll, no deadline).
    pub fn resolve(mock: bool, poll_interval_ms: Option<u64>, deadline_secs: Option<u64>) -> Self {
        Self::resolve_with(mock, poll_interval_ms, deadline_secs, |key| {
            std::env::var(key).ok()
        })
    }

    pub fn resolve_with(
        mock: bool,
        poll_interval_ms: Option<u64>,
        deadline_secs: Option<u64>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let from_env = |key: &str| {
            lookup(key).and_then(|v| match v.trim().parse::<u64>() {
                Ok(n) => Some(n),
                Err(_) => {
                    tracing::warn!("Ignoring invalid {}={:?}", key, v);
                    None
                }
            })
        };

        let poll_interval = poll_interval_ms
            .or_else(|| from_env(ENV_POLL_INTERVAL_MS))
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        let deadline = deadline_secs
            .or_else(|| from_env(ENV_DEADLINE_SECS))
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Self {
            mock,
            poll_interval,
            deadline,
        }
    }
}

pub struct Container {
    completer: Arc<dyn Completer>,
    bridge: StreamBridge,
    config: ContainerConfig,
}

impl Container {
    /// Wire the completer and bridge. Fails when provider configuration is
    /// missing so the process never starts serving without it.
    pub fn new(config: ContainerConfig) -> Result<Self> {
        let completer: Arc<dyn Completer> = if config.mock {
            debug!("Using mock completer");
            Arc::new(MockCompleter::echo().with_delay(MOCK_TOKEN_DELAY))
        } else {
            let azure = AzureOpenAiCompleter::from_env()?;
            debug!("Using Azure OpenAI deployment {}", azure.config().deployment_name);
            Arc::new(azure)
        };

        Ok(Self::with_completer(completer, config))
    }

    pub fn with_completer(completer: Arc<dyn Completer>, config: ContainerConfig) -> Self {
        let bridge = StreamBridge::new(completer.clone())
            .with_poll_interval(config.poll_interval)
            .with_deadline(config.deadline);
        Self {
            completer,
            bridge,
            config,
        }
    }

    pub fn bridge(&self) -> StreamBridge {
        self.bridge.clone()
    }

    pub fn model_name(&self) -> &str {
        self.completer.model_name()
    }

    pub fn is_mock(&self) -> bool {
        self.config.mock
    }
}
