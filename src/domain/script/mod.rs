pub mod model;
pub mod prompts;
pub mod segmenter;

pub use model::{SpeakerRole, SpeakerTurn};
pub use prompts::{
    clean_article_text, ChatMessage, ChatRole, CompletionRequest, PromptBuilder, ScriptSection,
    Speakers,
};
pub use segmenter::{segment, ScriptSegmenter};
