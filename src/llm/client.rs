use super::error::BackendError;
use super::stream::TextStream;
use super::types::LLMRequest;
use async_trait::async_trait;

/// Streaming generation backend.
///
/// Failing to open the stream and failing mid-stream are equivalent to callers:
/// both are transport failures.
#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn stream_generate(&self, request: LLMRequest) -> Result<TextStream, BackendError>;

    fn name(&self) -> &str;

    fn model_info(&self) -> Option<String> {
        None
    }
}
