use async_trait::async_trait;
use futures::{stream, StreamExt};
use map_session::stream::{MessageStream, PositionTransport, TransportError};
use reqwest::{header::ACCEPT, StatusCode, Url};

use crate::{ApiConfig, ApiError};

/// Incremental decoder for a `text/event-stream` body. Yields the data of
/// every complete `message` event.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(end) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(event) = self.line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    fn line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        // comment, used as keep-alive
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_owned()),
            "event" => self.event = Some(value.to_owned()),
            "id" | "retry" => {}
            other => log::debug!("ignoring event stream field {other:?}"),
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        match event.as_deref() {
            None | Some("message") => Some(data),
            Some(other) => {
                log::debug!("ignoring {other:?} event");
                None
            }
        }
    }
}

/// Position feed over server-sent events. The topic is passed as query
/// parameter, the auth token as bearer header.
#[derive(Clone, Debug)]
pub struct SseTransport {
    url: Url,
    client: reqwest::Client,
}

impl SseTransport {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        Ok(Self {
            url: config.stream_url.clone(),
            client: config.http_client()?,
        })
    }
}

#[async_trait]
impl PositionTransport for SseTransport {
    async fn subscribe(
        &self,
        topic: &str,
        auth_token: Option<&str>,
    ) -> Result<MessageStream, TransportError> {
        let request = self
            .client
            .get(self.url.clone())
            .query(&[("topic", topic)])
            .header(ACCEPT, "text/event-stream");
        let request = match auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        log::debug!("Subscribing to '{topic}' at '{}'.", self.url);

        let response = request.send().await.map_err(TransportError::connect)?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(TransportError::UnknownTopic(topic.to_owned())),
            other => {
                return Err(TransportError::Rejected {
                    status: other.as_u16(),
                })
            }
        }

        let mut decoder = SseDecoder::default();
        let messages = response.bytes_stream().flat_map(move |chunk| {
            let messages: Vec<_> = match chunk {
                Ok(bytes) => decoder.feed(&bytes).into_iter().map(Ok).collect(),
                Err(why) => vec![Err(TransportError::io(why))],
            };
            stream::iter(messages)
        });
        Ok(messages.boxed())
    }
}
