/// A single chat turn: the system instruction and the human message.
///
/// Empty strings are accepted; they produce a degenerate prompt rather than
/// an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    system_message: String,
    human_message: String,
}

impl ChatRequest {
    pub fn new(system_message: impl Into<String>, human_message: impl Into<String>) -> Self {
        Self {
            system_message: system_message.into(),
            human_message: human_message.into(),
        }
    }

    pub fn system_message(&self) -> &str {
        &self.system_message
    }

    pub fn human_message(&self) -> &str {
        &self.human_message
    }

    pub fn summary(&self) -> String {
        format!(
            "system={} chars, human={} chars",
            self.system_message.chars().count(),
            self.human_message.chars().count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_empty_messages() {
        let request = ChatRequest::new("", "");
        assert_eq!(request.system_message(), "");
        assert_eq!(request.human_message(), "");
    }

    #[test]
    fn test_summary_counts_chars() {
        let request = ChatRequest::new("Be brief", "héllo");
        assert_eq!(request.summary(), "system=8 chars, human=5 chars");
    }
}
