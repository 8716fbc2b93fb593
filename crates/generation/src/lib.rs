/// Generation relay for StoryBuilder
///
/// Builds prompts from named templates, calls an OpenAI-compatible
/// chat-completion API in single-shot or streaming mode, and supports
/// cooperative cancellation of in-flight streaming requests.
pub mod error;
pub mod registry;
pub mod relay;
pub mod template;

pub use error::GenerationError;
pub use registry::RequestRegistry;
pub use relay::{
    AvatarTarget, GenerationOutput, GenerationRelay, RelayConfig, StreamEvent,
};
pub use template::{GenerationKind, TemplateLibrary};
