use std::io::Write;

use anyhow::Result;

use crate::connector::Container;
use crate::ChatRequest;

/// Runs a request in-process and prints tokens as they arrive.
pub struct ChatController<'a> {
    container: &'a Container,
}

impl<'a> ChatController<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self { container }
    }

    pub async fn chat<W: Write>(&self, system: String, message: String, out: &mut W) -> Result<()> {
        let mut stream = self.container.bridge().run(ChatRequest::new(system, message));

        while let Some(token) = stream.next_token().await {
            let token = token?;
            out.write_all(token.as_bytes())?;
            out.flush()?;
        }
        writeln!(out)?;
        stream.log_summary();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{ContainerConfig, MockCompleter};

    fn container(mock: MockCompleter) -> Container {
        Container::with_completer(
            Arc::new(mock),
            ContainerConfig::resolve_with(true, Some(10), None, |_| None),
        )
    }

    #[tokio::test]
    async fn test_writes_tokens_in_order() {
        let container = container(MockCompleter::new(vec!["Hello", ", ", "world", "!"]));
        let mut out = Vec::new();

        ChatController::new(&container)
            .chat("sys".into(), "hi".into(), &mut out)
            .await
            .unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "Hello, world!\n");
    }

    #[tokio::test]
    async fn test_failure_is_returned_after_partial_output() {
        let container = container(MockCompleter::new(vec!["partial"]).failing_with("quota exceeded"));
        let mut out = Vec::new();

        let err = ChatController::new(&container)
            .chat("sys".into(), "hi".into(), &mut out)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("quota exceeded"));
        assert_eq!(String::from_utf8(out).unwrap(), "partial");
    }
}
