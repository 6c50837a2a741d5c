//! Streaming client for an HTTP endpoint that answers with newline-delimited JSON
//!
//! The request is a form with `text` and `conversation_id`. It is urlencoded
//! unless the request carries an attachment, in which case it is multipart and
//! the first attachment goes along as the `file` part. Each response line is a
//! JSON object; lines of `"type": "text"` carry a fragment in `content`, other
//! types are ignored and undecodable lines are skipped.

use super::client::LLMClient;
use super::error::BackendError;
use super::stream::{with_idle_timeout, TextStream};
use super::types::{Attachment, LLMRequest};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct WireLine {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<String>,
}

/// Incremental NDJSON decoder; bytes may split lines at arbitrary points
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes, returning the fragments of every completed line
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(item) = decode_line(&line[..line.len() - 1]) {
                out.push(item);
            }
        }
        out
    }

    /// Decodes a trailing line that was not newline-terminated
    pub fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest).into_iter().collect()
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str::<WireLine>(line) {
        Ok(wire) if wire.kind == "text" => wire.content,
        Ok(_) => None,
        Err(e) => {
            warn!(line = %line, "Skipping undecodable stream line: {}", e);
            None
        }
    }
}

struct DecodeState {
    body: BoxStream<'static, Result<Vec<u8>, BackendError>>,
    decoder: NdjsonDecoder,
    pending: VecDeque<Result<String, BackendError>>,
    finished: bool,
}

/// Turns a byte stream into a fragment stream
pub fn decode_stream(body: BoxStream<'static, Result<Vec<u8>, BackendError>>) -> TextStream {
    let state = DecodeState {
        body,
        decoder: NdjsonDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    let items = st.decoder.push(&chunk);
                    st.pending.extend(items.into_iter().map(Ok));
                }
                Some(Err(e)) => {
                    st.finished = true;
                    st.pending.push_back(Err(e));
                }
                None => {
                    st.finished = true;
                    let items = st.decoder.finish();
                    st.pending.extend(items.into_iter().map(Ok));
                }
            }
        }
    })
    .boxed()
}

fn map_reqwest_error(e: reqwest::Error, timeout: Duration) -> BackendError {
    if e.is_timeout() {
        BackendError::TimeoutError {
            seconds: timeout.as_secs(),
        }
    } else {
        BackendError::NetworkError {
            message: e.to_string(),
        }
    }
}

/// File name the endpoint expects for the attached image
const UPLOAD_FILE_NAME: &str = "image.png";

pub struct HttpStreamClient {
    http: reqwest::Client,
    api_url: String,
    api_token: Option<String>,
    conversation_id: Uuid,
    timeout: Duration,
}

impl HttpStreamClient {
    pub fn new(
        api_url: impl Into<String>,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| BackendError::ConfigurationError {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            api_url: api_url.into(),
            api_token,
            conversation_id: Uuid::new_v4(),
            timeout,
        })
    }

    fn form_fields(&self, request: &LLMRequest) -> [(&'static str, String); 2] {
        [
            ("text", request.flattened_prompt()),
            ("conversation_id", self.conversation_id.to_string()),
        ]
    }

    /// Multipart body carrying the fields plus the image as `file`
    fn multipart_form(
        fields: [(&'static str, String); 2],
        attachment: &Attachment,
    ) -> Result<Form, BackendError> {
        let part = Part::bytes(attachment.data.clone())
            .file_name(UPLOAD_FILE_NAME)
            .mime_str(&attachment.mime_type)
            .map_err(|e| BackendError::ConfigurationError {
                message: format!("invalid attachment type {}: {}", attachment.mime_type, e),
            })?;

        let form = fields
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value));
        Ok(form.part("file", part))
    }
}

#[async_trait]
impl LLMClient for HttpStreamClient {
    async fn stream_generate(&self, request: LLMRequest) -> Result<TextStream, BackendError> {
        let fields = self.form_fields(&request);

        // Urlencoded unless an image goes along, then multipart
        let mut builder = match request.attachments.first() {
            Some(attachment) => self
                .http
                .post(&self.api_url)
                .multipart(Self::multipart_form(fields, attachment)?),
            None => self.http.post(&self.api_url).form(&fields),
        };
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }

        debug!(
            conversation_id = %self.conversation_id,
            with_file = !request.attachments.is_empty(),
            "POST {}",
            self.api_url
        );

        let response = match tokio::time::timeout(self.timeout, builder.send()).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                error!("HTTP stream request failed: {}", e);
                return Err(map_reqwest_error(e, self.timeout));
            }
            Err(_) => {
                return Err(BackendError::TimeoutError {
                    seconds: self.timeout.as_secs(),
                })
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("HTTP stream endpoint returned {}", status);
            return Err(BackendError::from_status(status.as_u16(), body));
        }

        let timeout = self.timeout;
        let body = response
            .bytes_stream()
            .map(move |chunk| {
                chunk
                    .map(|b| b.to_vec())
                    .map_err(|e| map_reqwest_error(e, timeout))
            })
            .boxed();

        Ok(with_idle_timeout(decode_stream(body), self.timeout))
    }

    fn name(&self) -> &str {
        "http"
    }

    fn model_info(&self) -> Option<String> {
        Some(self.api_url.clone())
    }
}

impl std::fmt::Debug for HttpStreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStreamClient")
            .field("api_url", &self.api_url)
            .field("has_token", &self.api_token.is_some())
            .field("conversation_id", &self.conversation_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}
