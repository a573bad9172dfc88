//! Response cache: memoizes completions keyed on the full request.
//!
//! Repeated runs of the same conversation (common while iterating on prompts)
//! are served from memory instead of hitting the API again.

use async_trait::async_trait;
use llmagent_core::error::ProviderError;
use llmagent_core::provider::*;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// A provider wrapper that caches complete responses by request hash.
pub struct CachedProvider {
    name: String,
    inner: Arc<dyn llmagent_core::Provider>,
    entries: Arc<Mutex<HashMap<String, ProviderResponse>>>,
}

impl CachedProvider {
    pub fn new(inner: Arc<dyn llmagent_core::Provider>) -> Self {
        Self {
            name: format!("cached-{}", inner.name()),
            inner,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Cache key: hex SHA-256 of the request's JSON form.
    ///
    /// Message ids and timestamps are left out, as is the `stream` flag, so a
    /// replayed conversation maps to the same entry however it is sent.
    pub fn cache_key(request: &ProviderRequest) -> Result<String, ProviderError> {
        let messages: Vec<_> = request
            .messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role,
                    "content": m.content,
                    "name": m.name,
                    "function_call": m.function_call,
                })
            })
            .collect();
        let keyed = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "functions": request.functions,
        });
        let json = serde_json::to_vec(&keyed).map_err(|e| ProviderError::ApiError {
            status_code: 0,
            message: format!("Failed to serialize request for caching: {e}"),
        })?;
        Ok(hex::encode(Sha256::digest(&json)))
    }

    /// Number of cached responses.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &str) -> Option<ProviderResponse> {
        match self.entries.lock() {
            Ok(entries) => entries.get(key).cloned(),
            Err(_) => {
                warn!("Response cache lock poisoned, bypassing cache");
                None
            }
        }
    }

    fn store(
        entries: &Mutex<HashMap<String, ProviderResponse>>,
        key: String,
        response: ProviderResponse,
    ) {
        if let Ok(mut entries) = entries.lock() {
            entries.insert(key, response);
        }
    }
}

#[async_trait]
impl llmagent_core::Provider for CachedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let key = Self::cache_key(&request)?;

        if let Some(mut hit) = self.lookup(&key) {
            debug!(key = %&key[..12], "Serving response from cache");
            hit.cached = true;
            return Ok(hit);
        }

        let response = self.inner.complete(request).await?;
        Self::store(&self.entries, key, response.clone());
        Ok(response)
    }

    /// Streams on a cache miss and records the assembled response; a hit is
    /// replayed as a single final chunk.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let key = Self::cache_key(&request)?;

        if let Some(hit) = self.lookup(&key) {
            debug!(key = %&key[..12], "Replaying cached response");
            let (tx, rx) = tokio::sync::mpsc::channel(1);
            let _ = tx
                .send(Ok(StreamChunk {
                    content: Some(hit.message.content),
                    function_call: hit.message.function_call,
                    done: true,
                    usage: hit.usage,
                }))
                .await;
            return Ok(rx);
        }

        let model = request.model.clone();
        let mut upstream = self.inner.stream(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let entries = Arc::clone(&self.entries);

        // Forward chunks while assembling the full response for the cache.
        tokio::spawn(async move {
            let mut content = String::new();
            let mut function_call = None;
            let mut usage = None;
            let mut complete = false;

            while let Some(chunk) = upstream.recv().await {
                match chunk {
                    Ok(chunk) => {
                        if let Some(c) = &chunk.content {
                            content.push_str(c);
                        }
                        if chunk.function_call.is_some() {
                            function_call = chunk.function_call.clone();
                        }
                        if chunk.usage.is_some() {
                            usage = chunk.usage.clone();
                        }
                        complete = chunk.done;
                        if tx.send(Ok(chunk)).await.is_err() || complete {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }

            if complete {
                let mut message = llmagent_core::Message::assistant(content);
                message.function_call = function_call;
                Self::store(
                    &entries,
                    key,
                    ProviderResponse {
                        message,
                        usage,
                        model,
                        cached: false,
                    },
                );
            }
        });

        Ok(rx)
    }
}
