use std::io::Write;

use anyhow::{bail, Context, Result};
use futures_util::StreamExt;
use tracing::debug;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

/// Streams a reply from a running `chatstream serve` instance.
pub struct AskController {
    client: reqwest::Client,
    base_url: String,
}

impl AskController {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Post the request and write each chunk as it arrives. Returns the full
    /// reply text.
    ///
    /// A stream the server aborts mid-way is reported as an error, as opposed
    /// to a clean close which ends the reply.
    pub async fn ask<W: Write>(&self, system: String, message: String, out: &mut W) -> Result<String> {
        let url = format!("{}/chat", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .query(&[("system_message", system), ("human_message", message)])
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("server returned {status}: {body}");
        }

        if let Some(id) = response.headers().get("x-request-id") {
            debug!("Request id {:?}", id);
        }

        let mut chunks = response.bytes_stream();
        let mut decoder = Utf8Chunks::default();
        let mut reply = String::new();

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.context("reply stream ended abnormally")?;
            let text = decoder.push(&chunk);
            if !text.is_empty() {
                out.write_all(text.as_bytes())?;
                out.flush()?;
                reply.push_str(&text);
            }
        }

        let rest = decoder.finish();
        if !rest.is_empty() {
            out.write_all(rest.as_bytes())?;
            reply.push_str(&rest);
        }
        writeln!(out)?;

        Ok(reply)
    }
}

/// Decodes UTF-8 from chunks whose boundaries may split a character.
#[derive(Default)]
struct Utf8Chunks {
    pending: Vec<u8>,
}

impl Utf8Chunks {
    fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            // Invalid bytes rather than a truncated char: decode lossily
            Err(_) => self.pending.len(),
        };
        let bytes: Vec<u8> = self.pending.drain(..valid).collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&rest).into_owned()
    }
}
