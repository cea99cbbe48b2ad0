mod client;
#[cfg(feature = "openai-client")]
mod openai;
pub mod prompts;
mod scripted;
mod types;

pub use client::{parse_json_content, DynLlmClient, LlmClient};
#[cfg(feature = "openai-client")]
pub use openai::OpenAiClient;
pub use prompts::PromptBuilder;
pub use scripted::ScriptedLlmClient;
pub use types::{LlmRequest, LlmResponse, LlmTracking};
