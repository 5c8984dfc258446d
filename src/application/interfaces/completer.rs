use async_trait::async_trait;

use crate::application::TokenSink;
use crate::domain::{ChatRequest, DomainError};

/// Performs one model invocation and reports generated text incrementally.
///
/// Implementors push every generated fragment into `sink` as soon as it is
/// available and may report run metadata with [`TokenSink::trace`]. Returning
/// (with either `Ok` or `Err`) signals completion; all pushes happen before
/// it. The caller owns the terminal marker, so implementors never end the
/// stream themselves.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, request: &ChatRequest, sink: &mut TokenSink)
        -> Result<(), DomainError>;

    /// Name reported in logs, e.g. the model deployment.
    fn model_name(&self) -> &str;
}
