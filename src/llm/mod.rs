//! Generation backend abstraction
//!
//! A trait-based streaming interface so that different backends (GenAI,
//! NDJSON over HTTP, Mock) can be used interchangeably.

mod client;
mod error;
mod genai;
mod http_stream;
mod mock;
mod selector;
mod stream;
mod types;

pub use client::LLMClient;
pub use error::BackendError;
pub use genai::{GenAIClient, BASE_URL_ENV};
pub use http_stream::{decode_stream, HttpStreamClient, NdjsonDecoder};
pub use mock::{MockLLMClient, MockResponse};
pub use selector::{select_llm_client, SelectedClient};
pub use stream::{from_fragments, with_idle_timeout, TextStream};
pub use types::{mime_for_extension, Attachment, ChatMessage, LLMRequest, MessageRole};
