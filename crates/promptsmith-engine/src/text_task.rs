use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use promptsmith_contracts::config::ProviderConfig;
use promptsmith_contracts::document::{parse_document_text, DocumentParseError};
use serde_json::Value;

use crate::chat::{ChatRequest, OpenAiChatProvider, TextProvider};
use crate::error::{ProviderError, TaskError};
use crate::prompts::{build_messages, TextMode};
use crate::task::{CancelToken, TaskEmitter, TaskHandle, DEFAULT_JOIN_TIMEOUT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextTaskEvent {
    Progress(String),
    Chunk(String),
    Completed(String),
    Failed(TaskError),
    Cancelled,
    Finished,
}

/// Holds at most one running AI text task.
///
/// Starting a new task cancels the previous one and waits (bounded) for it.
/// Every task gets its own event receiver, so a superseded task can never
/// talk to the new consumer.
pub struct TextTaskSlot {
    provider: Arc<dyn TextProvider>,
    current: Option<TaskHandle>,
    join_timeout: Duration,
}

impl TextTaskSlot {
    pub fn new(provider: Arc<dyn TextProvider>) -> Self {
        Self {
            provider,
            current: None,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(Arc::new(OpenAiChatProvider::from_config(config)))
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn start_generate(&mut self, description: &str) -> Result<Receiver<TextTaskEvent>, TaskError> {
        self.start(TextMode::Generate, description, "")
    }

    pub fn start_modify(
        &mut self,
        current_document_text: &str,
        instruction: &str,
    ) -> Result<Receiver<TextTaskEvent>, TaskError> {
        self.start(TextMode::Modify, instruction, current_document_text)
    }

    pub fn start(
        &mut self,
        mode: TextMode,
        instruction: &str,
        current_document_text: &str,
    ) -> Result<Receiver<TextTaskEvent>, TaskError> {
        if !self.provider.is_configured() {
            return Err(TaskError::NotConfigured("AI text provider"));
        }
        self.cancel();

        let request = ChatRequest {
            model: self.provider.model().to_string(),
            messages: build_messages(mode, instruction, current_document_text),
        };
        let token = CancelToken::new();
        let (emitter, events) = TaskEmitter::channel(token.clone());
        let in_flight = emitter.in_flight().clone();
        let provider = Arc::clone(&self.provider);
        let handle = TaskHandle::spawn("promptsmith-text-task", token, in_flight, move || {
            run_text_task(provider.as_ref(), &request, mode, &emitter);
            emitter.finish(TextTaskEvent::Finished);
        })
        .map_err(|err| TaskError::Unknown(format!("text task thread spawn failed: {err}")))?;
        log::info!("started {mode:?} text task with {}", self.provider.name());
        self.current = Some(handle);
        Ok(events)
    }

    /// Cancels the running task, if any. Returns `false` only when the worker
    /// did not stop within the join timeout.
    pub fn cancel(&mut self) -> bool {
        match self.current.take() {
            Some(handle) => handle.cancel_and_join(self.join_timeout),
            None => true,
        }
    }

    pub fn is_running(&mut self) -> bool {
        let Some(handle) = self.current.as_mut() else {
            return false;
        };
        handle.reap();
        if handle.is_running() {
            return true;
        }
        self.current = None;
        false
    }
}

fn run_text_task(
    provider: &dyn TextProvider,
    request: &ChatRequest,
    mode: TextMode,
    emitter: &TaskEmitter<TextTaskEvent>,
) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        stream_text(provider, request, mode, emitter)
    }));
    match outcome {
        Ok(Ok(full_text)) => {
            if !emitter.emit(TextTaskEvent::Completed(full_text)) && emitter.is_cancelled() {
                emitter.emit_terminal(TextTaskEvent::Cancelled);
            }
        }
        Ok(Err(_)) if emitter.is_cancelled() => emitter.emit_terminal(TextTaskEvent::Cancelled),
        Ok(Err(err)) => {
            log::warn!("text task failed: {err}");
            emitter.emit_terminal(TextTaskEvent::Failed(TaskError::Provider(err)));
        }
        Err(payload) => {
            emitter.emit_terminal(TextTaskEvent::Failed(TaskError::Unknown(panic_message(
                payload.as_ref(),
            ))));
        }
    }
}

fn stream_text(
    provider: &dyn TextProvider,
    request: &ChatRequest,
    mode: TextMode,
    emitter: &TaskEmitter<TextTaskEvent>,
) -> Result<String, ProviderError> {
    emitter.emit(TextTaskEvent::Progress("Connecting to AI service...".to_string()));
    if emitter.is_cancelled() {
        return Ok(String::new());
    }
    let stream = provider.stream_chat(request)?;
    emitter.emit(TextTaskEvent::Progress(mode.progress_label().to_string()));

    let mut full_text = String::new();
    for delta in stream {
        if emitter.is_cancelled() {
            break;
        }
        let piece = delta?;
        if piece.is_empty() {
            continue;
        }
        full_text.push_str(&piece);
        emitter.emit(TextTaskEvent::Chunk(piece));
    }
    Ok(full_text)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        return (*text).to_string();
    }
    if let Some(text) = payload.downcast_ref::<String>() {
        return text.clone();
    }
    "worker panicked".to_string()
}

/// Consumer-side accumulation of streamed chunks for live display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamTranscript {
    text: String,
}

impl StreamTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns everything received so far.
    pub fn push(&mut self, chunk: &str) -> &str {
        self.text.push_str(chunk);
        &self.text
    }

    /// Replaces the live text with the authoritative full response.
    pub fn finish(&mut self, full_text: &str) -> &str {
        self.text.clear();
        self.text.push_str(full_text);
        &self.text
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }
}

/// Parses a completed AI response, tolerating a surrounding code fence.
pub fn parse_ai_document(full_text: &str) -> Result<Value, DocumentParseError> {
    parse_document_text(full_text)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use promptsmith_contracts::document::DocumentParseError;
    use serde_json::json;

    use super::{parse_ai_document, StreamTranscript, TextTaskEvent, TextTaskSlot};
    use crate::chat::{ChatRequest, DeltaStream, TextProvider};
    use crate::error::{ProviderError, TaskError};

    const WAIT: Duration = Duration::from_secs(5);

    struct ScriptedProvider {
        configured: bool,
        open_error: Option<ProviderError>,
        fragments: Vec<Result<String, ProviderError>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedProvider {
        fn streaming(fragments: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                configured: true,
                open_error: None,
                fragments,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl TextProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        fn model(&self) -> &str {
            "test-model"
        }

        fn stream_chat(&self, request: &ChatRequest) -> Result<DeltaStream, ProviderError> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request.clone());
            }
            if let Some(err) = self.open_error.clone() {
                return Err(err);
            }
            Ok(Box::new(self.fragments.clone().into_iter()))
        }
    }

    /// Each call streams whatever the test pushes into the next queued channel.
    struct GatedProvider {
        gates: Mutex<VecDeque<Receiver<String>>>,
    }

    impl GatedProvider {
        fn new(count: usize) -> (Self, Vec<Sender<String>>) {
            let mut gates = VecDeque::new();
            let mut senders = Vec::new();
            for _ in 0..count {
                let (tx, rx) = mpsc::channel();
                gates.push_back(rx);
                senders.push(tx);
            }
            (
                Self {
                    gates: Mutex::new(gates),
                },
                senders,
            )
        }
    }

    impl TextProvider for GatedProvider {
        fn name(&self) -> &str {
            "gated"
        }

        fn model(&self) -> &str {
            "test-model"
        }

        fn stream_chat(&self, _request: &ChatRequest) -> Result<DeltaStream, ProviderError> {
            let gate = self
                .gates
                .lock()
                .ok()
                .and_then(|mut gates| gates.pop_front())
                .ok_or_else(|| ProviderError::Provider("no gate left".to_string()))?;
            Ok(Box::new(std::iter::from_fn(move || gate.recv().ok().map(Ok))))
        }
    }

    fn without_progress(events: Vec<TextTaskEvent>) -> Vec<TextTaskEvent> {
        events
            .into_iter()
            .filter(|event| !matches!(event, TextTaskEvent::Progress(_)))
            .collect()
    }

    fn wait_for_chunk(events: &Receiver<TextTaskEvent>, expected: &str) -> anyhow::Result<()> {
        loop {
            if events.recv_timeout(WAIT)? == TextTaskEvent::Chunk(expected.to_string()) {
                return Ok(());
            }
        }
    }

    #[test]
    fn chunks_arrive_in_order_then_full_text_once() -> anyhow::Result<()> {
        let provider = Arc::new(ScriptedProvider::streaming(vec![
            Ok("Hel".to_string()),
            Ok(String::new()),
            Ok("lo".to_string()),
        ]));
        let mut slot = TextTaskSlot::new(provider.clone());
        let events: Vec<TextTaskEvent> = slot.start_generate("a greeting")?.iter().collect();

        assert!(matches!(events.first(), Some(TextTaskEvent::Progress(_))));
        assert_eq!(
            without_progress(events),
            vec![
                TextTaskEvent::Chunk("Hel".to_string()),
                TextTaskEvent::Chunk("lo".to_string()),
                TextTaskEvent::Completed("Hello".to_string()),
                TextTaskEvent::Finished,
            ]
        );

        let requests = provider.requests.lock().map_err(|_| anyhow::anyhow!("poisoned"))?;
        assert_eq!(requests[0].model, "test-model");
        assert_eq!(requests[0].messages.len(), 2);
        assert!(requests[0].messages[1].content.contains("a greeting"));
        Ok(())
    }

    #[test]
    fn slot_is_idle_once_finished_arrives() -> anyhow::Result<()> {
        let provider = ScriptedProvider::streaming(vec![Ok("{}".to_string())]);
        let mut slot = TextTaskSlot::new(Arc::new(provider));
        let events = slot.start_generate("x")?;
        while events.recv_timeout(WAIT)? != TextTaskEvent::Finished {}
        assert!(!slot.is_running());
        Ok(())
    }

    #[test]
    fn missing_key_is_rejected_without_starting() {
        let mut provider = ScriptedProvider::streaming(Vec::new());
        provider.configured = false;
        let mut slot = TextTaskSlot::new(Arc::new(provider));
        assert_eq!(
            slot.start_modify("{}", "brighter").err(),
            Some(TaskError::NotConfigured("AI text provider"))
        );
        assert!(!slot.is_running());
    }

    #[test]
    fn request_failure_becomes_one_failed_event() -> anyhow::Result<()> {
        let mut provider = ScriptedProvider::streaming(Vec::new());
        provider.open_error = Some(ProviderError::Unauthorized);
        let mut slot = TextTaskSlot::new(Arc::new(provider));
        let events: Vec<TextTaskEvent> = slot.start_generate("x")?.iter().collect();
        assert_eq!(
            without_progress(events),
            vec![
                TextTaskEvent::Failed(TaskError::Provider(ProviderError::Unauthorized)),
                TextTaskEvent::Finished,
            ]
        );
        Ok(())
    }

    #[test]
    fn mid_stream_failure_keeps_earlier_chunks() -> anyhow::Result<()> {
        let provider = ScriptedProvider::streaming(vec![
            Ok("{\"mood\"".to_string()),
            Err(ProviderError::RateLimited),
            Ok("never".to_string()),
        ]);
        let mut slot = TextTaskSlot::new(Arc::new(provider));
        let events: Vec<TextTaskEvent> = slot.start_generate("x")?.iter().collect();
        assert_eq!(
            without_progress(events),
            vec![
                TextTaskEvent::Chunk("{\"mood\"".to_string()),
                TextTaskEvent::Failed(TaskError::Provider(ProviderError::RateLimited)),
                TextTaskEvent::Finished,
            ]
        );
        Ok(())
    }

    #[test]
    fn cancel_stops_further_chunks() -> anyhow::Result<()> {
        let (provider, mut gates) = GatedProvider::new(1);
        let gate = gates.remove(0);
        let mut slot =
            TextTaskSlot::new(Arc::new(provider)).with_join_timeout(Duration::from_millis(50));
        let events = slot.start_generate("x")?;

        gate.send("a".to_string())?;
        wait_for_chunk(&events, "a")?;

        slot.cancel();
        gate.send("b".to_string())?;
        drop(gate);

        let rest: Vec<TextTaskEvent> = events.iter().collect();
        assert_eq!(rest, vec![TextTaskEvent::Cancelled, TextTaskEvent::Finished]);
        assert!(!slot.is_running());
        Ok(())
    }

    #[test]
    fn new_task_supersedes_running_one() -> anyhow::Result<()> {
        let (provider, mut gates) = GatedProvider::new(2);
        let second_gate = gates.remove(1);
        let first_gate = gates.remove(0);
        let mut slot =
            TextTaskSlot::new(Arc::new(provider)).with_join_timeout(Duration::from_millis(50));

        let first = slot.start_generate("first")?;
        first_gate.send("x".to_string())?;
        wait_for_chunk(&first, "x")?;

        let second = slot.start_modify("{}", "second")?;
        second_gate.send("y".to_string())?;
        drop(second_gate);
        let second_events: Vec<TextTaskEvent> = second.iter().collect();
        assert_eq!(
            without_progress(second_events),
            vec![
                TextTaskEvent::Chunk("y".to_string()),
                TextTaskEvent::Completed("y".to_string()),
                TextTaskEvent::Finished,
            ]
        );

        drop(first_gate);
        let first_rest: Vec<TextTaskEvent> = first.iter().collect();
        assert_eq!(first_rest, vec![TextTaskEvent::Cancelled, TextTaskEvent::Finished]);
        Ok(())
    }

    #[test]
    fn transcript_accumulates_for_display() {
        let mut transcript = StreamTranscript::new();
        assert_eq!(transcript.push("Hel"), "Hel");
        assert_eq!(transcript.push("lo"), "Hello");
        assert_eq!(transcript.finish("Hello!"), "Hello!");
        transcript.clear();
        assert_eq!(transcript.text(), "");
    }

    #[test]
    fn ai_document_parse_is_separate_from_task_outcome() -> anyhow::Result<()> {
        let fenced = "```json\n{\"mood\": \"calm\"}\n```";
        assert_eq!(parse_ai_document(fenced)?, json!({"mood": "calm"}));
        assert!(matches!(
            parse_ai_document("Sure! Here is your prompt."),
            Err(DocumentParseError::InvalidJson(_))
        ));
        assert!(matches!(
            parse_ai_document("[1, 2]"),
            Err(DocumentParseError::NotAnObject)
        ));
        Ok(())
    }
}
