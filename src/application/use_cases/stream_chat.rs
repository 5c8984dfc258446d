use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, info_span, trace, warn, Instrument};
use uuid::Uuid;

use crate::application::{Completer, Pop, TokenChannel, TokenConsumer};
use crate::domain::{ChatRequest, DomainError, Outcome, RequestState, RunRecord, StreamItem};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Runs chat requests against a [`Completer`], one worker task per request,
/// and exposes each result as a pull-based [`ChatStream`].
#[derive(Clone)]
pub struct StreamBridge {
    completer: Arc<dyn Completer>,
    poll_interval: Duration,
    deadline: Option<Duration>,
}

impl StreamBridge {
    pub fn new(completer: Arc<dyn Completer>) -> Self {
        Self {
            completer,
            poll_interval: DEFAULT_POLL_INTERVAL,
            deadline: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        // A zero timeout would turn the poll loop into a busy spin
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Overall limit on a request. `None` lets a request run until the
    /// provider finishes, however long that takes.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Start the invocation and return immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn run(&self, request: ChatRequest) -> ChatStream {
        let request_id = Uuid::new_v4().to_string();
        let (mut producer, consumer) = TokenChannel::open();
        let mut chat_stream = ChatStream {
            request_id: request_id.clone(),
            consumer,
            worker: None,
            poll_interval: self.poll_interval,
            deadline: self.deadline.map(|limit| (limit, Instant::now() + limit)),
            state: RequestState::Created,
            record: RunRecord::new(),
            empty_polls: 0,
        };

        let completer = Arc::clone(&self.completer);
        let span = info_span!("chat_request", request_id = %request_id, model = completer.model_name());
        info!(parent: &span, "Starting completion ({})", request.summary());

        let worker = tokio::spawn(
            async move {
                let outcome = match completer.complete(&request, producer.sink()).await {
                    Ok(()) => Outcome::Completed,
                    Err(e) => {
                        warn!("Completion failed: {}", e);
                        Outcome::failed(e.to_string())
                    }
                };
                debug!("Worker finished: {}", outcome);
                producer.finish(outcome);
            }
            .instrument(span),
        );

        chat_stream.worker = Some(worker);
        chat_stream.state = RequestState::Running;
        chat_stream
    }
}

/// Lazily drained output of one request.
///
/// Yields tokens in provider order. A failed invocation ends with exactly one
/// `Err`; after that, or after a clean end, every call returns `None`.
pub struct ChatStream {
    request_id: String,
    consumer: TokenConsumer,
    worker: Option<JoinHandle<()>>,
    poll_interval: Duration,
    deadline: Option<(Duration, Instant)>,
    state: RequestState,
    record: RunRecord,
    empty_polls: u64,
}

impl ChatStream {
    pub async fn next_token(&mut self) -> Option<Result<String, DomainError>> {
        loop {
            if self.state.is_terminal() {
                return None;
            }

            let wait = match self.deadline {
                Some((limit, at)) => {
                    let now = Instant::now();
                    if now >= at {
                        if !self.worker_finished() {
                            return Some(Err(self.expire(limit)));
                        }
                        // A finished worker has already queued its End
                        debug!(
                            "Request {} passed its {:?} deadline after the worker finished, draining",
                            self.request_id, limit
                        );
                        self.deadline = None;
                        continue;
                    }
                    self.poll_interval.min(at - now)
                }
                None => self.poll_interval,
            };

            if self.state == RequestState::Running {
                self.state = RequestState::Draining;
            }

            match self.consumer.pop(wait).await {
                Pop::Empty => {
                    self.empty_polls += 1;
                    trace!(
                        "No token within {:?} for request {} ({} empty polls)",
                        wait,
                        self.request_id,
                        self.empty_polls
                    );
                }
                Pop::Item(StreamItem::Token(token)) => {
                    self.record.append_token(&token);
                    return Some(Ok(token));
                }
                Pop::Item(StreamItem::Trace(run_id)) => {
                    if self.record.record_run_id(&run_id) {
                        debug!("Request {} traced as run {}", self.request_id, run_id);
                    }
                }
                Pop::Item(StreamItem::End(Outcome::Completed)) => {
                    self.state = RequestState::Complete;
                    return None;
                }
                Pop::Item(StreamItem::End(Outcome::Failed(reason))) => {
                    self.state = RequestState::Complete;
                    return Some(Err(DomainError::provider(reason)));
                }
                Pop::Closed => {
                    self.state = RequestState::Complete;
                    return Some(Err(DomainError::internal(
                        "token channel closed without an end marker",
                    )));
                }
            }
        }
    }

    fn worker_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, JoinHandle::is_finished)
    }

    fn expire(&mut self, limit: Duration) -> DomainError {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
        self.state = RequestState::Complete;
        warn!(
            "Request {} exceeded its {:?} deadline after {} tokens",
            self.request_id,
            limit,
            self.record.token_count()
        );
        DomainError::timeout(format!("no end of stream within {:?}", limit))
    }

    /// Drain the remaining tokens and return the full text.
    pub async fn collect_text(&mut self) -> Result<String, DomainError> {
        while let Some(token) = self.next_token().await {
            token?;
        }
        Ok(self.record.content().to_string())
    }

    /// Adapt into a `Stream` for transports. Logs a summary once the
    /// sequence ends.
    pub fn into_stream(self) -> BoxStream<'static, Result<String, DomainError>> {
        stream::unfold(self, |mut chat| async move {
            match chat.next_token().await {
                Some(item) => Some((item, chat)),
                None => {
                    chat.log_summary();
                    None
                }
            }
        })
        .boxed()
    }

    pub fn log_summary(&self) {
        info!(
            "Request {} {}: {} tokens, {} chars, run {}",
            self.request_id,
            self.state,
            self.record.token_count(),
            self.record.content().len(),
            self.record.run_id().unwrap_or("-")
        );
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Text assembled so far.
    pub fn content(&self) -> &str {
        self.record.content()
    }

    pub fn run_record(&self) -> &RunRecord {
        &self.record
    }

    pub fn empty_polls(&self) -> u64 {
        self.empty_polls
    }
}
