//! SSE response wrapper. Grounded on the reference server's streaming route:
//! a channel-backed `Stream` that implements `IntoResponse` directly, rather
//! than going through `axum::response::sse::Sse` (which would add its own
//! framing on top of the already-OpenAI-shaped `data: ...\n\n` lines).

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::IntoResponse;
use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub struct SseResponse {
    rx: ReceiverStream<String>,
    extra_headers: Vec<(&'static str, String)>,
}

impl SseResponse {
    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self {
            rx: ReceiverStream::new(rx),
            extra_headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &'static str, value: String) -> Self {
        self.extra_headers.push((name, value));
        self
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> axum::response::Response {
        let headers = self.extra_headers.clone();
        let body = axum::body::Body::from_stream(self);

        let mut builder = http::Response::builder()
            .header("Content-Type", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .header("Connection", "keep-alive");
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        builder.body(body).expect("sse response always builds")
    }
}

/// Formats one SSE data frame, e.g. `data: {"foo":1}\n\n`.
pub fn frame(payload: &str) -> String {
    format!("data: {payload}\n\n")
}

pub const DONE_FRAME: &str = "data: [DONE]\n\n";
