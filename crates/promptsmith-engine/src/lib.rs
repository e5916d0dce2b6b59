//! Network and worker-thread side of promptsmith: streaming chat for the AI
//! text task, Gemini image generation, and the single-slot task runners that
//! report back over one-way event channels.

pub mod chat;
pub mod error;
pub mod image;
pub mod image_task;
pub mod prompts;
pub mod task;
pub mod text_task;

pub use chat::{ChatMessage, ChatRequest, DeltaStream, OpenAiChatProvider, TextProvider};
pub use error::{ProviderError, TaskError};
pub use image::{
    save_image, GeminiImageProvider, GeneratedImage, ImageGenerateRequest, ImageProvider,
    ASPECT_RATIOS, IMAGE_SIZES,
};
pub use image_task::{ImageTaskEvent, ImageTaskSlot};
pub use prompts::{build_messages, TextMode};
pub use task::{CancelToken, InFlight, TaskEmitter, TaskHandle};
pub use text_task::{parse_ai_document, StreamTranscript, TextTaskEvent, TextTaskSlot};
