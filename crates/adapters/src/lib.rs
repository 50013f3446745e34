//! HTTP adapters for the provider chat APIs. The core crate talks to this
//! crate only through its `ModelInvoker` seam.

pub mod base_url;
pub mod error;
pub mod llm;

pub use base_url::check_base_url;
pub use error::AdapterError;
pub use llm::{AnthropicClient, LlmDispatcher, OpenAiCompatibleClient};
