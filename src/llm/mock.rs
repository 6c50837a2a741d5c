use super::client::LLMClient;
use super::error::BackendError;
use super::stream::TextStream;
use super::types::LLMRequest;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Scripted backend. Responses are matched first against prompt rules, then
/// taken from the queue in call order.
pub struct MockLLMClient {
    responses: Mutex<VecDeque<MockResponse>>,
    rules: Mutex<Vec<(String, MockResponse)>>,
    requests: Mutex<Vec<LLMRequest>>,
    name: String,
}

#[derive(Debug, Clone, Default)]
pub struct MockResponse {
    pub fragments: Vec<String>,
    /// Yielded after all fragments
    pub error: Option<BackendError>,
    /// Returned instead of a stream
    pub open_error: Option<BackendError>,
    /// Stream never ends after the fragments
    pub hang: bool,
    pub fragment_delay: Option<Duration>,
}

impl MockResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self::fragments(vec![content.into()])
    }

    pub fn fragments<S: Into<String>>(fragments: impl IntoIterator<Item = S>) -> Self {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Fails before any fragment is produced
    pub fn error(error: BackendError) -> Self {
        Self {
            open_error: Some(error),
            ..Default::default()
        }
    }

    /// Produces `fragments`, then fails
    pub fn fail_after<S: Into<String>>(
        fragments: impl IntoIterator<Item = S>,
        error: BackendError,
    ) -> Self {
        Self {
            error: Some(error),
            ..Self::fragments(fragments)
        }
    }

    /// Produces `fragments`, then waits forever
    pub fn hang_after<S: Into<String>>(fragments: impl IntoIterator<Item = S>) -> Self {
        Self {
            hang: true,
            ..Self::fragments(fragments)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = Some(delay);
        self
    }

    fn into_stream(self) -> TextStream {
        let delay = self.fragment_delay;
        let items = self
            .fragments
            .into_iter()
            .map(Ok)
            .chain(self.error.map(Err));

        let body = stream::iter(items)
            .then(move |item| async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                item
            })
            .boxed();

        if self.hang {
            body.chain(stream::pending()).boxed()
        } else {
            body
        }
    }
}

impl MockLLMClient {
    pub fn new() -> Self {
        Self::with_name("MockLLM")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            rules: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            name: name.into(),
        }
    }

    pub fn add_response(&self, response: MockResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn add_responses(&self, responses: impl IntoIterator<Item = MockResponse>) {
        let mut queue = self.responses.lock().unwrap();
        for response in responses {
            queue.push_back(response);
        }
    }

    /// Answers every request whose prompt contains `needle` with `response`
    pub fn add_rule(&self, needle: impl Into<String>, response: MockResponse) {
        self.rules.lock().unwrap().push((needle.into(), response));
    }

    pub fn remaining_responses(&self) -> usize {
        self.responses.lock().unwrap().len()
    }

    /// Requests received so far, in call order
    pub fn requests(&self) -> Vec<LLMRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Flattened prompts received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(LLMRequest::flattened_prompt)
            .collect()
    }
}

impl Default for MockLLMClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn stream_generate(&self, request: LLMRequest) -> Result<TextStream, BackendError> {
        let prompt = request.flattened_prompt();
        self.requests.lock().unwrap().push(request);

        let ruled = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, response)| response.clone());

        let response = match ruled {
            Some(response) => response,
            None => self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| BackendError::Other {
                    message: "MockLLMClient: No more responses in queue".to_string(),
                })?,
        };

        if let Some(error) = response.open_error.clone() {
            return Err(error);
        }

        Ok(response.into_stream())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model_info(&self) -> Option<String> {
        Some("mock-model".to_string())
    }
}

impl std::fmt::Debug for MockLLMClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLLMClient")
            .field("name", &self.name)
            .field("remaining_responses", &self.remaining_responses())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(client: &MockLLMClient, prompt: &str) -> Vec<Result<String, BackendError>> {
        client
            .stream_generate(LLMRequest::prompt(prompt))
            .await
            .unwrap()
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_mock_client_basic() {
        let client = MockLLMClient::new();
        client.add_response(MockResponse::fragments(["Hel", "lo!"]));

        let items = collect(&client, "hi").await;
        assert_eq!(items, vec![Ok("Hel".to_string()), Ok("lo!".to_string())]);
        assert_eq!(client.prompts(), vec!["hi".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_client_open_error() {
        let client = MockLLMClient::new();
        client.add_response(MockResponse::error(BackendError::TimeoutError {
            seconds: 30,
        }));

        let result = client.stream_generate(LLMRequest::prompt("x")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_client_fail_after() {
        let client = MockLLMClient::new();
        client.add_response(MockResponse::fail_after(
            ["partial"],
            BackendError::NetworkError {
                message: "reset".to_string(),
            },
        ));

        let items = collect(&client, "x").await;
        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_mock_client_no_responses() {
        let client = MockLLMClient::new();
        let result = client.stream_generate(LLMRequest::prompt("x")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_rules_take_precedence_and_are_reusable() {
        let client = MockLLMClient::new();
        client.add_rule("cardio", MockResponse::text("heart"));
        client.add_response(MockResponse::text("queued"));

        assert_eq!(collect(&client, "as a cardiologist").await, vec![Ok("heart".to_string())]);
        assert_eq!(collect(&client, "cardio again").await, vec![Ok("heart".to_string())]);
        assert_eq!(collect(&client, "other").await, vec![Ok("queued".to_string())]);
        assert_eq!(client.remaining_responses(), 0);
    }

    #[test]
    fn test_custom_name() {
        let client = MockLLMClient::with_name("TestClient");
        assert_eq!(client.name(), "TestClient");
    }
}
