use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use promptsmith_contracts::config::ProviderConfig;
use promptsmith_contracts::document::is_empty_document_text;

use crate::error::TaskError;
use crate::image::{GeminiImageProvider, GeneratedImage, ImageGenerateRequest, ImageProvider};
use crate::task::{CancelToken, TaskEmitter, TaskHandle, DEFAULT_JOIN_TIMEOUT};
use crate::text_task::panic_message;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageTaskEvent {
    Progress(String),
    ImageReady(GeneratedImage),
    Failed(TaskError),
    Cancelled,
    /// Always the last event, whatever the outcome.
    Finished,
}

/// Holds at most one running image generation. A second start while one is
/// active is rejected with [`TaskError::Busy`] rather than queued.
pub struct ImageTaskSlot {
    provider: Arc<dyn ImageProvider>,
    current: Option<TaskHandle>,
    join_timeout: Duration,
}

impl ImageTaskSlot {
    pub fn new(provider: Arc<dyn ImageProvider>) -> Self {
        Self {
            provider,
            current: None,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(Arc::new(GeminiImageProvider::from_config(config)))
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn start(
        &mut self,
        request: ImageGenerateRequest,
    ) -> Result<Receiver<ImageTaskEvent>, TaskError> {
        if self.is_running() {
            return Err(TaskError::Busy);
        }
        if is_empty_document_text(&request.prompt_text) {
            return Err(TaskError::EmptyDocument);
        }
        if !self.provider.is_configured() {
            return Err(TaskError::NotConfigured("image provider"));
        }

        let token = CancelToken::new();
        let (emitter, events) = TaskEmitter::channel(token.clone());
        let in_flight = emitter.in_flight().clone();
        let provider = Arc::clone(&self.provider);
        let handle = TaskHandle::spawn("promptsmith-image-task", token, in_flight, move || {
            run_image_task(provider.as_ref(), &request, &emitter);
            emitter.finish(ImageTaskEvent::Finished);
        })
        .map_err(|err| TaskError::Unknown(format!("image task thread spawn failed: {err}")))?;
        log::info!("started image task with {}", self.provider.name());
        self.current = Some(handle);
        Ok(events)
    }

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

fn run_image_task(
    provider: &dyn ImageProvider,
    request: &ImageGenerateRequest,
    emitter: &TaskEmitter<ImageTaskEvent>,
) {
    emitter.emit(ImageTaskEvent::Progress(format!(
        "Submitting to {} ({}, {})",
        provider.name(),
        request.aspect_ratio,
        request.image_size
    )));
    if emitter.is_cancelled() {
        emitter.emit_terminal(ImageTaskEvent::Cancelled);
        return;
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        provider.generate(request, emitter.token())
    }));
    match outcome {
        Ok(_) if emitter.is_cancelled() => emitter.emit_terminal(ImageTaskEvent::Cancelled),
        Ok(Ok(image)) => {
            if !emitter.emit(ImageTaskEvent::ImageReady(image)) && emitter.is_cancelled() {
                emitter.emit_terminal(ImageTaskEvent::Cancelled);
            }
        }
        Ok(Err(err)) => {
            log::warn!("image task failed: {err}");
            emitter.emit_terminal(ImageTaskEvent::Failed(TaskError::Provider(err)));
        }
        Err(payload) => {
            emitter.emit_terminal(ImageTaskEvent::Failed(TaskError::Unknown(panic_message(
                payload.as_ref(),
            ))));
        }
    }
}
