/// Observability data for a single request.
///
/// Owned by the request's stream, so concurrent requests never share it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRecord {
    run_id: Option<String>,
    token_count: usize,
    content: String,
}

impl RunRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the run id only if none has been recorded yet.
    /// Returns `true` when the id was stored.
    pub fn record_run_id(&mut self, run_id: impl Into<String>) -> bool {
        if self.run_id.is_some() {
            return false;
        }
        self.run_id = Some(run_id.into());
        true
    }

    pub fn append_token(&mut self, token: &str) {
        self.token_count += 1;
        self.content.push_str(token);
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_run_id_wins() {
        let mut record = RunRecord::new();
        assert!(record.record_run_id("chatcmpl-1"));
        assert!(!record.record_run_id("chatcmpl-2"));
        assert_eq!(record.run_id(), Some("chatcmpl-1"));
    }

    #[test]
    fn test_accumulates_tokens() {
        let mut record = RunRecord::new();
        record.append_token("Hello");
        record.append_token(", world");
        assert_eq!(record.token_count(), 2);
        assert_eq!(record.content(), "Hello, world");
    }
}
