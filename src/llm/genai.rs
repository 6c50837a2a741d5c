//! GenAI-based streaming client
//!
//! Supports the providers the `genai` crate covers (Ollama, OpenAI, Claude,
//! Gemini, Grok, Groq). Fragments are forwarded as they arrive; attachments
//! are sent as base64 binary parts on the last user message.

use super::client::LLMClient;
use super::error::BackendError;
use super::stream::{with_idle_timeout, TextStream};
use super::types::{Attachment, ChatMessage, LLMRequest, MessageRole};
use async_trait::async_trait;
use base64::Engine;
use futures_util::StreamExt;
use genai::adapter::AdapterKind;
use genai::chat::{
    ChatMessage as GenAIChatMessage, ChatOptions, ChatRequest as GenAIChatRequest,
    ChatStreamEvent, ContentPart, MessageContent,
};
use genai::resolver::{AuthData, Endpoint, ServiceTargetResolver};
use genai::{Client, ModelIden, ServiceTarget};
use std::time::Duration;
use tracing::{debug, error};

/// Overrides the provider's default endpoint (e.g. a remote Ollama host)
pub const BASE_URL_ENV: &str = "CONSILIUM_GENAI_BASE_URL";

pub struct GenAIClient {
    client: Client,
    model: String,
    provider: AdapterKind,
    /// Maximum gap between fragments before the stream fails
    timeout: Duration,
}

impl GenAIClient {
    pub fn new(provider: AdapterKind, model: String, timeout: Duration) -> Self {
        let client = match std::env::var(BASE_URL_ENV).ok() {
            Some(endpoint_url) => {
                debug!(
                    "Using custom endpoint for {}: {}",
                    provider.as_str(),
                    endpoint_url
                );
                let model_name = model.clone();
                let resolver = ServiceTargetResolver::from_resolver_fn(
                    move |_target: ServiceTarget| -> Result<ServiceTarget, genai::resolver::Error> {
                        let auth = match provider.default_key_env_name() {
                            Some(api_key_var) => AuthData::from_env(api_key_var),
                            None => AuthData::from_single(""),
                        };
                        Ok(ServiceTarget {
                            endpoint: Endpoint::from_owned(endpoint_url.clone()),
                            auth,
                            model: ModelIden::new(provider, &model_name),
                        })
                    },
                );
                Client::builder()
                    .with_service_target_resolver(resolver)
                    .build()
            }
            None => Client::default(),
        };

        debug!(
            "Creating GenAI client: provider={}, model={}",
            provider.as_str(),
            model
        );

        Self {
            client,
            model,
            provider,
            timeout,
        }
    }

    fn convert_messages(messages: &[ChatMessage], attachments: &[Attachment]) -> Vec<GenAIChatMessage> {
        let last_user = messages
            .iter()
            .rposition(|m| m.role == MessageRole::User);

        messages
            .iter()
            .enumerate()
            .map(|(idx, msg)| match msg.role {
                MessageRole::System => GenAIChatMessage::system(&msg.content),
                MessageRole::Assistant => GenAIChatMessage::assistant(&msg.content),
                MessageRole::User if Some(idx) == last_user && !attachments.is_empty() => {
                    let mut parts = vec![ContentPart::from_text(&msg.content)];
                    parts.extend(attachments.iter().map(Self::convert_attachment));
                    GenAIChatMessage::user(MessageContent::from_parts(parts))
                }
                MessageRole::User => GenAIChatMessage::user(&msg.content),
            })
            .collect()
    }

    fn convert_attachment(attachment: &Attachment) -> ContentPart {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&attachment.data);
        ContentPart::from_binary_base64(
            attachment.mime_type.clone(),
            encoded,
            Some(attachment.name.clone()),
        )
    }
}

#[async_trait]
impl LLMClient for GenAIClient {
    async fn stream_generate(&self, request: LLMRequest) -> Result<TextStream, BackendError> {
        let messages = Self::convert_messages(&request.messages, &request.attachments);
        let genai_request = GenAIChatRequest::new(messages);

        let mut options = ChatOptions::default();
        if let Some(temp) = request.temperature {
            options = options.with_temperature(temp as f64);
        }
        if let Some(max_tokens) = request.max_tokens {
            options = options.with_max_tokens(max_tokens);
        }

        let provider = self.provider.as_str();
        let response = match tokio::time::timeout(
            self.timeout,
            self.client
                .exec_chat_stream(&self.model, genai_request, Some(&options)),
        )
        .await
        {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                error!("{} API error: {}", provider, e);
                return Err(BackendError::ApiError {
                    message: format!("{} request failed: {}", provider, e),
                    status_code: None,
                });
            }
            Err(_) => {
                error!(
                    "{} request timed out after {}s",
                    provider,
                    self.timeout.as_secs()
                );
                return Err(BackendError::TimeoutError {
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        let fragments = response
            .stream
            .filter_map(|event| async move {
                match event {
                    Ok(ChatStreamEvent::Chunk(chunk)) => Some(Ok(chunk.content)),
                    Ok(_) => None,
                    Err(e) => Some(Err(BackendError::NetworkError {
                        message: e.to_string(),
                    })),
                }
            })
            .boxed();

        Ok(with_idle_timeout(fragments, self.timeout))
    }

    fn name(&self) -> &str {
        self.provider.as_str()
    }

    fn model_info(&self) -> Option<String> {
        Some(self.model.clone())
    }
}

impl std::fmt::Debug for GenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenAIClient")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genai_client_creation() {
        let client = GenAIClient::new(
            AdapterKind::Ollama,
            "llama3.2-vision".to_string(),
            Duration::from_secs(30),
        );

        assert_eq!(client.name(), "Ollama");
        assert_eq!(client.model_info(), Some("llama3.2-vision".to_string()));
    }

    #[test]
    fn test_attachments_only_on_last_user_message() {
        let messages = vec![
            ChatMessage::system("rules"),
            ChatMessage::user("first"),
            ChatMessage::assistant("ok"),
            ChatMessage::user("second"),
        ];
        let attachments = vec![Attachment::new("scan.png", "image/png", vec![1, 2, 3])];

        let converted = GenAIClient::convert_messages(&messages, &attachments);
        assert_eq!(converted.len(), 4);
    }

    #[test]
    fn test_debug_impl() {
        fn assert_debug<T: std::fmt::Debug>() {}
        assert_debug::<GenAIClient>();
    }
}
