use super::logging::{debug_payload_enabled, emit_debug_payload};
use crate::config::Config;
use crate::types::{RunRequest, ThreadInfo};
use crate::util::is_local_endpoint_url;
use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::json;
use std::pin::Pin;
#[cfg(test)]
use std::sync::Arc;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

const THREAD_SEARCH_LIMIT: u32 = 100;

#[cfg(test)]
pub trait MockStreamProducer: Send + Sync {
    fn create_mock_stream(
        &self,
        thread_id: Option<&str>,
        request: &RunRequest,
    ) -> Result<ByteStream>;

    fn list_threads(&self) -> Vec<ThreadInfo> {
        Vec::new()
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    assistant_id: String,
    #[cfg(test)]
    mock_stream_producer: Option<Arc<dyn MockStreamProducer>>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            assistant_id: config.assistant_id.clone(),
            #[cfg(test)]
            mock_stream_producer: None,
        })
    }

    #[cfg(test)]
    pub fn new_mock(mock_producer: Arc<dyn MockStreamProducer>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: "http://localhost:2024".to_string(),
            api_key: None,
            assistant_id: "agent".to_string(),
            mock_stream_producer: Some(mock_producer),
        }
    }

    /// Open a streaming run. With a thread id the run continues that thread;
    /// without one the server mints a thread and reports it in the metadata
    /// frame.
    pub async fn create_run_stream(
        &self,
        thread_id: Option<&str>,
        request: &RunRequest,
    ) -> Result<ByteStream> {
        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_stream_producer {
                return producer.create_mock_stream(thread_id, request);
            }
        }

        let request_url = match thread_id {
            Some(id) => format!("{}/threads/{id}/runs/stream", self.api_url),
            None => format!("{}/runs/stream", self.api_url),
        };

        let mut input = json!({ "messages": request.turns });
        if let Some(context) = &request.context {
            input
                .as_object_mut()
                .expect("input payload must be a JSON object")
                .insert("context".to_string(), json!(context));
        }

        let mut payload = json!({
            "assistant_id": self.assistant_id,
            "input": input,
            "stream_mode": ["messages", "values", "custom"],
        });
        if let Some(checkpoint_id) = &request.checkpoint_id {
            let payload_object = payload
                .as_object_mut()
                .expect("payload must be a JSON object");
            payload_object.insert("checkpoint_id".to_string(), json!(checkpoint_id));
            // Regeneration recomputes from the checkpoint; no new input turns.
            payload_object.remove("input");
        }

        if debug_payload_enabled() {
            emit_debug_payload(&request_url, &payload);
        }

        let response = self
            .request(reqwest::Method::POST, &request_url)
            .json(&payload)
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, &request_url))?;

        let request_url_for_stream = request_url.clone();
        let stream = response.bytes_stream().map(move |item| {
            item.map_err(|error| map_api_request_error(error, &request_url_for_stream))
        });
        Ok(Box::pin(stream))
    }

    /// Best-effort server-side cancellation of an in-flight run. The caller
    /// has already reset local state; failures here are not interesting.
    pub async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()> {
        #[cfg(test)]
        {
            if self.mock_stream_producer.is_some() {
                return Ok(());
            }
        }

        let request_url = format!("{}/threads/{thread_id}/runs/{run_id}/cancel", self.api_url);
        self.request(reqwest::Method::POST, &request_url)
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, &request_url))?;
        Ok(())
    }

    /// Liveness probe against the server's info endpoint.
    pub async fn probe_health(&self) -> Result<()> {
        #[cfg(test)]
        {
            if self.mock_stream_producer.is_some() {
                return Ok(());
            }
        }

        let request_url = format!("{}/info", self.api_url);
        self.request(reqwest::Method::GET, &request_url)
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, &request_url))?;
        Ok(())
    }

    pub async fn search_threads(&self) -> Result<Vec<ThreadInfo>> {
        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_stream_producer {
                return Ok(producer.list_threads());
            }
        }

        let request_url = format!("{}/threads/search", self.api_url);
        let threads = self
            .request(reqwest::Method::POST, &request_url)
            .json(&json!({ "limit": THREAD_SEARCH_LIMIT }))
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, &request_url))?
            .json::<Vec<ThreadInfo>>()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?;
        Ok(threads)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(method, url)
            .header("content-type", "application/json");
        if let Some(api_key) = &self.api_key {
            builder = builder.header("x-api-key", api_key);
        }
        builder
    }
}

fn map_api_request_error(error: reqwest::Error, request_url: &str) -> anyhow::Error {
    if error.is_connect() && is_local_endpoint_url(request_url) {
        return anyhow!(
            "cannot reach local agent server '{}': {}. Start the server or update FLOATCHAT_API_URL.",
            request_url,
            error
        );
    }
    if error.is_connect() {
        return anyhow!("cannot reach agent server '{}': {}", request_url, error);
    }
    if error.is_timeout() {
        return anyhow!("request to '{}' timed out: {}", request_url, error);
    }
    if let Some(status) = error.status() {
        return anyhow!(
            "agent server '{}' returned HTTP {}: {}",
            request_url,
            status,
            error
        );
    }
    anyhow!("request to '{}' failed: {}", request_url, error)
}
