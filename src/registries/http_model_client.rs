use crate::config::ProviderConfig;
use crate::contexts::{ChunkStream, ExecutionError, Model, ModelClient, Role};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde_json::{Value, json};
use std::collections::{BTreeMap, VecDeque};

type ByteStream = BoxStream<'static, Result<Vec<u8>, ExecutionError>>;

/// Streams chat completions from any OpenAI-compatible endpoint
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    providers: BTreeMap<String, ProviderConfig>,
}

impl OpenAiCompatibleClient {
    pub fn new(providers: BTreeMap<String, ProviderConfig>) -> Self {
        Self {
            client: reqwest::Client::new(),
            providers,
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatibleClient {
    async fn stream_chat(
        &self,
        model: &Model,
        prompt: &str,
        role: Role,
    ) -> Result<ChunkStream, ExecutionError> {
        let provider = self
            .providers
            .get(&model.provider)
            .ok_or_else(|| ExecutionError::UnknownProvider(model.provider.clone()))?;

        let url = format!("{}/chat/completions", provider.base_url.trim_end_matches('/'));
        let payload = json!({
            "model": model.name,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": true
        });

        tracing::debug!("POST {} as {} ({} prompt chars)", url, role, prompt.len());
        let mut request = self.client.post(&url).json(&payload);
        if let Some(key) = provider.api_key() {
            request = request.bearer_auth(key);
        }

        let res = request
            .send()
            .await
            .map_err(|e| ExecutionError::ExecutionFailed(format!("Request to {} failed: {}", url, e)))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ExecutionError::ExecutionFailed(format!(
                "{} returned {}: {}",
                model,
                status,
                body.chars().take(300).collect::<String>()
            )));
        }

        let bytes = res
            .bytes_stream()
            .map(|item| {
                item.map(|bytes| bytes.to_vec())
                    .map_err(|e| ExecutionError::ExecutionFailed(format!("Stream interrupted: {}", e)))
            })
            .boxed();
        Ok(parse_sse_stream(bytes))
    }
}

/// What one server-sent line means for the response
#[derive(Debug, PartialEq)]
enum SseLine {
    Content(String),
    Done,
    Failed(String),
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Skipping malformed stream event: {}", e);
            return SseLine::Skip;
        }
    };

    if let Some(error) = value.get("error") {
        let message = error["message"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return SseLine::Failed(message);
    }

    match value["choices"][0]["delta"]["content"].as_str() {
        Some(content) if !content.is_empty() => SseLine::Content(content.to_string()),
        _ => SseLine::Skip,
    }
}

struct SseState {
    bytes: ByteStream,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String, ExecutionError>>,
    done: bool,
}

impl SseState {
    /// Parses every complete line in the buffer
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            match parse_sse_line(line.trim()) {
                SseLine::Content(content) => self.pending.push_back(Ok(content)),
                SseLine::Done => {
                    self.finish();
                    return;
                }
                SseLine::Failed(message) => {
                    self.pending.push_back(Err(ExecutionError::ExecutionFailed(message)));
                    self.finish();
                    return;
                }
                SseLine::Skip => {}
            }
        }
    }

    fn finish(&mut self) {
        self.done = true;
        self.buffer.clear();
    }
}

/// Turns raw server-sent-event bytes into content chunks.
///
/// Lines may be split across network reads, so bytes are buffered until a
/// newline arrives. The stream ends at `[DONE]`, at the end of the body, or
/// right after the first error.
fn parse_sse_stream(bytes: ByteStream) -> ChunkStream {
    let state = SseState {
        bytes,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(bytes)) => {
                    state.buffer.extend_from_slice(&bytes);
                    state.drain_lines();
                }
                Some(Err(e)) => {
                    state.pending.push_back(Err(e));
                    state.finish();
                }
                None => {
                    state.buffer.push(b'\n');
                    state.drain_lines();
                    state.done = true;
                }
            }
        }
    })
    .boxed()
}
