//! Ollama HTTP client for ChatRelay
//!
//! Implements [`ChatBackend`] against an Ollama server (local or remote):
//! model listing via `/api/tags`, connectivity probing, and streaming chat
//! over `/api/chat`. The chat protocol is newline-delimited JSON carried on
//! a raw byte stream with no framing guarantee, so decoding buffers partial
//! lines (and partial UTF-8 sequences) across reads.

use crate::client::{ChatBackend, ChatMessage, FragmentStream, ModelTag, Role};
use crate::error::{ChatRelayError, Result};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Default timeout for the listing endpoint
const LIST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for a whole chat turn (generation can be slow)
const CHAT_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP client for an Ollama server
///
/// The client holds no conversation state; every call is a pure
/// request/decode function over the inputs given to it.
///
/// # Examples
///
/// ```no_run
/// use chatrelay::client::{ChatBackend, ChatMessage, OllamaClient};
///
/// # async fn example() -> chatrelay::error::Result<()> {
/// let client = OllamaClient::new("http://localhost:11434")?;
/// let models = client.list_models().await;
/// let stream = client
///     .stream_chat("llama3.2:latest", &[ChatMessage::user("Hello!")])
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    list_timeout: Duration,
    chat_timeout: Duration,
}

/// Response from Ollama's /api/tags endpoint
#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

/// Request structure for /api/chat
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

/// Message as serialized on the wire
///
/// The local `model` tag is dropped and empty image lists are omitted, so
/// the upstream sees exactly `{role, content, images?}`.
#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<&'a [String]>,
}

/// One decoded line of the streaming chat response
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

impl OllamaClient {
    /// Create a new Ollama client
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base address of the Ollama server; a trailing slash
    ///   is stripped
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeouts(base_url, LIST_TIMEOUT, CHAT_TIMEOUT)
    }

    /// Create a client with explicit listing and chat timeouts
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn with_timeouts(
        base_url: impl Into<String>,
        list_timeout: Duration,
        chat_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("chatrelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ChatRelayError::Upstream(format!("Failed to create HTTP client: {}", e))
            })?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        tracing::debug!("Initialized Ollama client: base_url={}", base_url);

        Ok(Self {
            client,
            base_url,
            list_timeout,
            chat_timeout,
        })
    }

    /// Get the configured base URL (trailing slash stripped)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    async fn list_models(&self) -> Vec<ModelTag> {
        let url = format!("{}/api/tags", self.base_url);
        tracing::debug!("Fetching models from Ollama: {}", url);

        let response = match self
            .client
            .get(&url)
            .timeout(self.list_timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Failed to fetch Ollama models: {}", e);
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            tracing::warn!("Ollama listing returned HTTP {}", response.status());
            return Vec::new();
        }

        match response.json::<TagsResponse>().await {
            Ok(tags) => {
                tracing::debug!("Fetched {} models from Ollama", tags.models.len());
                tags.models
            }
            Err(e) => {
                tracing::warn!("Failed to parse Ollama tags response: {}", e);
                Vec::new()
            }
        }
    }

    async fn check_connection(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(self.list_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("Connection check failed: {}", e);
                false
            }
        }
    }

    async fn stream_chat(&self, model: &str, messages: &[ChatMessage]) -> Result<FragmentStream> {
        let url = format!("{}/api/chat", self.base_url);
        let request = ChatRequest {
            model,
            messages: to_wire(messages),
            stream: true,
        };

        tracing::debug!(
            "Opening chat stream: model={}, {} messages",
            model,
            request.messages.len()
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .timeout(self.chat_timeout)
            .send()
            .await
            .map_err(|e| ChatRelayError::Upstream(format!("Chat request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Ollama chat returned HTTP {}: {}", status, body);
            return Err(ChatRelayError::UpstreamStatus {
                status: status.as_u16(),
                message: body,
            }
            .into());
        }

        Ok(decode_fragments(response.bytes_stream().boxed()))
    }
}

/// Convert local messages to wire format
///
/// Strips the local `model` tag and omits empty image lists.
fn to_wire(messages: &[ChatMessage]) -> Vec<WireMessage<'_>> {
    messages
        .iter()
        .map(|m| WireMessage {
            role: m.role,
            content: &m.content,
            images: m
                .images
                .as_deref()
                .filter(|imgs| !imgs.is_empty()),
        })
        .collect()
}

/// Turn a raw byte stream into a fragment stream
///
/// Buffers partial lines across chunks, skips malformed lines, and ends
/// when the transport closes or an object carries `done: true`.
fn decode_fragments(body: BoxStream<'static, reqwest::Result<Bytes>>) -> FragmentStream {
    struct StreamState {
        body: BoxStream<'static, reqwest::Result<Bytes>>,
        decoder: NdjsonDecoder,
        pending: VecDeque<String>,
        eof: bool,
    }

    let state = StreamState {
        body,
        decoder: NdjsonDecoder::new(),
        pending: VecDeque::new(),
        eof: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(fragment) = st.pending.pop_front() {
                return Some((Ok(fragment), st));
            }
            if st.eof || st.decoder.is_done() {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    st.pending.extend(st.decoder.feed(&chunk));
                }
                Some(Err(e)) => {
                    st.eof = true;
                    return Some((
                        Err(ChatRelayError::Upstream(format!("Stream read failed: {}", e))
                            .into()),
                        st,
                    ));
                }
                None => {
                    st.eof = true;
                    st.pending.extend(st.decoder.finish());
                }
            }
        }
    })
    .boxed()
}

/// Incremental decoder for newline-delimited JSON chat responses
///
/// Chunk boundaries carry no framing guarantee: a JSON object (or a
/// multi-byte UTF-8 sequence) may straddle two reads, so the decoder
/// retains any trailing partial line and prepends it to the next chunk.
/// Malformed lines are skipped silently.
pub(crate) struct NdjsonDecoder {
    buf: Vec<u8>,
    done: bool,
}

impl NdjsonDecoder {
    pub(crate) fn new() -> Self {
        Self {
            buf: Vec::new(),
            done: false,
        }
    }

    /// Feed one transport chunk, returning fragments decoded from every
    /// complete line it closed
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut fragments = Vec::new();
        while !self.done {
            let Some(newline) = self.buf.iter().position(|&b| b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buf.drain(..=newline).collect();
            if let Some(fragment) = self.decode_line(&line) {
                fragments.push(fragment);
            }
        }
        fragments
    }

    /// Flush the trailing partial line at end-of-stream
    ///
    /// The upstream usually terminates the final object with a newline, but
    /// a well-formed object without one still decodes.
    pub(crate) fn finish(&mut self) -> Vec<String> {
        if self.done {
            self.buf.clear();
            return Vec::new();
        }
        let rest = std::mem::take(&mut self.buf);
        self.decode_line(&rest).into_iter().collect()
    }

    /// True once an object carrying `done: true` has been decoded
    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<String> {
        let text = match std::str::from_utf8(line) {
            Ok(t) => t.trim(),
            // Garbled bytes at a corrupt boundary: skip the line.
            Err(_) => return None,
        };
        if text.is_empty() {
            return None;
        }

        let chunk: ChatChunk = match serde_json::from_str(text) {
            Ok(c) => c,
            Err(_) => return None,
        };

        if chunk.done {
            self.done = true;
        }

        chunk
            .message
            .map(|m| m.content)
            .filter(|content| !content.is_empty())
    }
}
