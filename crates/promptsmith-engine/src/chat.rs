use std::io::{BufRead, BufReader};
use std::time::Duration;

use promptsmith_contracts::config::ProviderConfig;
use reqwest::blocking::Client as HttpClient;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::ProviderError;

pub const CHAT_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

/// Text fragments in arrival order.
pub type DeltaStream = Box<dyn Iterator<Item = Result<String, ProviderError>> + Send>;

pub trait TextProvider: Send + Sync {
    fn name(&self) -> &str;

    fn is_configured(&self) -> bool {
        true
    }

    fn model(&self) -> &str;

    fn stream_chat(&self, request: &ChatRequest) -> Result<DeltaStream, ProviderError>;
}

/// Streaming client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChatProvider {
    api_base: String,
    api_key: String,
    model: String,
    http: HttpClient,
}

impl OpenAiChatProvider {
    pub fn new(api_base: &str, api_key: &str, model: &str) -> Self {
        Self {
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            model: model.trim().to_string(),
            http: HttpClient::new(),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(&config.base_url, &config.api_key, &config.model)
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    pub fn build_payload(request: &ChatRequest) -> Value {
        json!({
            "model": request.model,
            "messages": request.messages,
            "stream": true,
        })
    }
}

impl TextProvider for OpenAiChatProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn stream_chat(&self, request: &ChatRequest) -> Result<DeltaStream, ProviderError> {
        let endpoint = self.endpoint();
        log::debug!("streaming chat completion from {endpoint} ({})", request.model);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .timeout(CHAT_TIMEOUT)
            .json(&Self::build_payload(request))
            .send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }
        Ok(Box::new(SseDeltaStream::new(BufReader::new(response))))
    }
}

/// Pulls `choices[0].delta.content` out of a server-sent event stream.
///
/// Comments, blank lines, non-`data` fields and chunks without content are
/// skipped. The stream ends at `data: [DONE]` or EOF.
pub struct SseDeltaStream<R> {
    reader: R,
    done: bool,
}

impl<R: BufRead> SseDeltaStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            done: false,
        }
    }

    fn next_delta(&mut self) -> Option<Result<String, ProviderError>> {
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(err) => return Some(Err(stream_read_error(&err))),
            }
            let Some(data) = line.trim_end_matches(&['\r', '\n'][..]).strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                return None;
            }
            let Ok(chunk) = serde_json::from_str::<Value>(data) else {
                log::debug!("skipping unparseable stream chunk: {data}");
                continue;
            };
            if let Some(message) = chunk
                .get("error")
                .filter(|error| !error.is_null())
                .and_then(|error| error.get("message").or(Some(error)))
            {
                let text = message
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| message.to_string());
                return Some(Err(ProviderError::Provider(text)));
            }
            let content = chunk
                .get("choices")
                .and_then(|choices| choices.get(0))
                .and_then(|choice| choice.get("delta"))
                .and_then(|delta| delta.get("content"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            if content.is_empty() {
                continue;
            }
            return Some(Ok(content.to_string()));
        }
    }
}

impl<R: BufRead> Iterator for SseDeltaStream<R> {
    type Item = Result<String, ProviderError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.next_delta();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}

fn stream_read_error(err: &std::io::Error) -> ProviderError {
    match err.kind() {
        std::io::ErrorKind::TimedOut => ProviderError::Timeout,
        _ => ProviderError::Connection(err.to_string()),
    }
}
