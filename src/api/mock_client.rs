use crate::api::client::{ByteStream, MockStreamProducer};
use crate::types::{RunRequest, ThreadInfo};
use anyhow::Result;
use bytes::Bytes;
use futures::stream;
use futures::StreamExt;
use std::sync::{Arc, Mutex};

/// Scripted transport for tests: each submission consumes one response, a
/// list of SSE frames delivered as separate chunks. With `hold_open` the
/// stream stays pending after its frames so quiet-window behavior can be
/// exercised; otherwise it closes after the last frame.
#[derive(Clone)]
pub struct MockApiClient {
    responses: Arc<Mutex<Vec<Vec<String>>>>,
    hold_open: bool,
    threads: Arc<Mutex<Vec<ThreadInfo>>>,
}

impl MockApiClient {
    pub fn new(responses: Vec<Vec<String>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            hold_open: false,
            threads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn new_hold_open(responses: Vec<Vec<String>>) -> Self {
        Self {
            hold_open: true,
            ..Self::new(responses)
        }
    }

    pub fn with_threads(mut self, threads: Vec<ThreadInfo>) -> Self {
        self.threads = Arc::new(Mutex::new(threads));
        self
    }

    pub fn push_thread(&self, thread: ThreadInfo) {
        self.threads.lock().unwrap().push(thread);
    }
}

impl MockStreamProducer for MockApiClient {
    fn create_mock_stream(
        &self,
        _thread_id: Option<&str>,
        _request: &RunRequest,
    ) -> Result<ByteStream> {
        let mut responses_guard = self.responses.lock().unwrap();
        if responses_guard.is_empty() {
            return Err(anyhow::anyhow!(
                "MockApiClient: No more responses configured"
            ));
        }
        let current_sse_frames = responses_guard.remove(0);

        let sse_byte_chunks: Vec<Result<Bytes>> = current_sse_frames
            .into_iter()
            .map(|s| {
                let framed = if s.ends_with("\n\n") {
                    s
                } else {
                    format!("{s}\n\n")
                };
                Ok(Bytes::from(framed))
            })
            .collect();

        if self.hold_open {
            Ok(Box::pin(
                stream::iter(sse_byte_chunks).chain(stream::pending()),
            ))
        } else {
            Ok(Box::pin(stream::iter(sse_byte_chunks)))
        }
    }

    fn list_threads(&self) -> Vec<ThreadInfo> {
        self.threads.lock().unwrap().clone()
    }
}
