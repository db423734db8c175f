//! Assistants API access
//!
//! [`AssistantsApi`] is what the run poller needs from the LLM provider.
//! [`OpenAiClient`] implements it over HTTP and also opens streamed runs,
//! decoding the provider's server-sent events.

use super::types::{AssistantStreamEvent, Run, ToolOutput};
use crate::config::LlmConfig;
use crate::core::{ErrorCode, Result, SdkError, ValidationError};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::{Client, Method, RequestBuilder, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

/// Stream of events of one assistant run
pub type EventStream = BoxStream<'static, Result<AssistantStreamEvent>>;

/// Run operations used while driving an assistant run
#[async_trait]
pub trait AssistantsApi: Send + Sync {
    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    /// Submit outputs for a run in `requires_action`; returns the updated run
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        tool_outputs: &[ToolOutput],
    ) -> Result<Run>;
}

/// Body of a run creation request
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateRunRequest {
    pub assistant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<super::types::ChatCompletionTool>>,
}

/// OpenAI-compatible assistants client
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: Url,
    api_key: SecretString,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    /// Build from settings; the LLM API key is required here.
    pub fn new(config: &LlmConfig, timeout: Duration) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ValidationError::single("llm.api_key", "must be set to call the LLM API"))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SdkError::from)?;
        Self::with_client(client, &config.base_url, api_key)
    }

    pub fn with_client(client: Client, base_url: &str, api_key: SecretString) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ValidationError::single("llm.base_url", format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ValidationError::single("llm.base_url", "cannot be used as a base URL").into());
        }
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SdkError::unknown("LLM base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!("llm request: {} {}", method, url);
        self.client
            .request(method, url)
            .bearer_auth(self.api_key.expose_secret())
            .header("OpenAI-Beta", "assistants=v2")
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SdkError::from_status(status.as_u16(), &body));
        }
        response.json().await.map_err(SdkError::from)
    }

    /// Start a run on `thread_id` and stream its events
    pub async fn create_run_stream(
        &self,
        thread_id: &str,
        request: &CreateRunRequest,
    ) -> Result<EventStream> {
        let url = self.url(&["threads", thread_id, "runs"])?;
        let mut body = serde_json::to_value(request)?;
        if let Value::Object(map) = &mut body {
            map.insert("stream".to_string(), json!(true));
        }
        let response = self
            .request(Method::POST, url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SdkError::from_status(status.as_u16(), &body));
        }
        Ok(sse_events(Box::pin(response.bytes_stream())))
    }
}

#[async_trait]
impl AssistantsApi for OpenAiClient {
    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let url = self.url(&["threads", thread_id, "runs", run_id])?;
        self.send(self.request(Method::GET, url)).await
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        tool_outputs: &[ToolOutput],
    ) -> Result<Run> {
        let url = self.url(&["threads", thread_id, "runs", run_id, "submit_tool_outputs"])?;
        self.send(
            self.request(Method::POST, url)
                .json(&json!({ "tool_outputs": tool_outputs })),
        )
        .await
    }
}

/// A decoded server-sent event frame
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    Event(AssistantStreamEvent),
    Done,
}

/// Incremental decoder for `text/event-stream` bodies
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns the frames it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(frame) = self.line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush whatever is left once the body ends
    pub fn finish(&mut self) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let rest = String::from_utf8_lossy(&rest).into_owned();
            if let Some(frame) = self.line(rest.trim_end_matches('\r')) {
                frames.push(frame);
            }
        }
        if let Some(frame) = self.dispatch() {
            frames.push(frame);
        }
        frames
    }

    fn line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        if data == "[DONE]" {
            return Some(SseFrame::Done);
        }
        let event = event.unwrap_or_else(|| "message".to_string());
        let data = match serde_json::from_str::<Value>(&data) {
            Ok(data) => data,
            Err(e) => {
                debug!("{} event data is not JSON ({}), passing it on as a string", event, e);
                Value::String(data)
            }
        };
        Some(SseFrame::Event(AssistantStreamEvent::new(event, data)))
    }
}

struct SseState<S> {
    body: S,
    decoder: SseDecoder,
    pending: VecDeque<AssistantStreamEvent>,
    finished: bool,
}

impl<S> SseState<S> {
    fn take(&mut self, frames: Vec<SseFrame>) {
        for frame in frames {
            match frame {
                SseFrame::Event(event) => self.pending.push_back(event),
                SseFrame::Done => {
                    self.finished = true;
                    break;
                }
            }
        }
    }
}

/// Turn a raw byte stream into assistant events, ending at `[DONE]`
pub fn sse_events<S, B>(body: S) -> EventStream
where
    S: Stream<Item = reqwest::Result<B>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = SseState {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let frames = state.decoder.push(chunk.as_ref());
                    state.take(frames);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    let err = SdkError::upstream(
                        ErrorCode::BackendTransport,
                        None,
                        format!("Failed to read event stream: {}", e),
                    );
                    return Some((Err(err), state));
                }
                None => {
                    let frames = state.decoder.finish();
                    state.take(frames);
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}
