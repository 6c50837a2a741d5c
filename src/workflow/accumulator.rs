//! Draining one generation call into accumulated text

use crate::llm::{BackendError, LLMClient, LLMRequest, TextStream};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Inline text appended to a step's output when its generation call fails
pub fn failure_marker(error: &BackendError) -> String {
    format!("\n\n[Error: API request failed. {}]", error)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainStatus {
    Complete,
    TransportFailure(BackendError),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drained {
    pub text: String,
    pub status: DrainStatus,
}

impl Drained {
    fn failed(mut text: String, error: BackendError) -> Self {
        text.push_str(&failure_marker(&error));
        Self {
            text,
            status: DrainStatus::TransportFailure(error),
        }
    }
}

/// Consumes a fragment stream in arrival order
pub struct StreamAccumulator {
    stream: TextStream,
    text: String,
}

impl StreamAccumulator {
    pub fn new(stream: TextStream) -> Self {
        Self {
            stream,
            text: String::new(),
        }
    }

    /// Pulls every fragment, calling `on_fragment(delta, text_so_far)` after each
    /// non-empty one. Stops at the first error (partial text plus failure
    /// marker) or when `cancel` fires (partial text, no marker).
    pub async fn drain<F>(mut self, cancel: &CancellationToken, mut on_fragment: F) -> Drained
    where
        F: FnMut(&str, &str),
    {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(chars = self.text.len(), "Stream drain cancelled");
                    return Drained {
                        text: self.text,
                        status: DrainStatus::Cancelled,
                    };
                }
                next = self.stream.next() => next,
            };

            match next {
                Some(Ok(fragment)) => {
                    if fragment.is_empty() {
                        continue;
                    }
                    self.text.push_str(&fragment);
                    on_fragment(&fragment, &self.text);
                }
                Some(Err(error)) => {
                    warn!(error = %error, chars = self.text.len(), "Generation stream failed");
                    return Drained::failed(self.text, error);
                }
                None => {
                    return Drained {
                        text: self.text,
                        status: DrainStatus::Complete,
                    }
                }
            }
        }
    }
}

/// Opens a stream on `client` and drains it. Failing to open is reported
/// exactly like a mid-stream failure.
pub async fn generate<F>(
    client: &dyn LLMClient,
    request: LLMRequest,
    cancel: &CancellationToken,
    on_fragment: F,
) -> Drained
where
    F: FnMut(&str, &str),
{
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Drained {
                text: String::new(),
                status: DrainStatus::Cancelled,
            };
        }
        opened = client.stream_generate(request) => opened,
    };

    match opened {
        Ok(stream) => StreamAccumulator::new(stream).drain(cancel, on_fragment).await,
        Err(error) => {
            warn!(backend = client.name(), error = %error, "Failed to open generation stream");
            Drained::failed(String::new(), error)
        }
    }
}
