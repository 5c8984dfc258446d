pub mod application;
pub mod cli;
pub mod connector;
pub mod domain;

pub use application::{
    ChatStream, Completer, Pop, StreamBridge, TokenChannel, TokenConsumer, TokenProducer,
    TokenSink, DEFAULT_POLL_INTERVAL,
};

pub use connector::{
    AskController, AzureOpenAiCompleter, AzureOpenAiConfig, ChatController, Container,
    ContainerConfig, MockCompleter,
};

pub use cli::Commands;

pub use domain::{ChatRequest, DomainError, Outcome, RequestState, RunRecord, StreamItem};
