use super::file_cache::{FileCache, hash_key};
use super::model_client::{ChunkStream, ExecutionError, Model, ModelClient, Role, RoleModelRegistry};
use crate::data::Cache;
use futures::StreamExt;
use futures::future;
use futures::stream;

/// Role-based model dispatch shared by every pipeline stage.
///
/// Offers two modes over the same dispatch: `stream` hands chunks through as
/// they arrive, `call` accumulates a whole response.
pub struct GenerationService<C, R>
where
    C: ModelClient,
    R: RoleModelRegistry,
{
    client: C,
    registry: R,
    /// Enables the accumulate-mode response cache when set
    cache_dir: Option<String>,
}

impl<C, R> GenerationService<C, R>
where
    C: ModelClient,
    R: RoleModelRegistry,
{
    pub fn new(client: C, registry: R) -> Self {
        Self {
            client,
            registry,
            cache_dir: None,
        }
    }

    pub fn with_cache_dir(mut self, cache_dir: Option<String>) -> Self {
        self.cache_dir = cache_dir;
        self
    }

    /// Resolves the model bound to `role`
    pub fn model_for(&self, role: Role) -> Result<Model, ExecutionError> {
        self.registry
            .get_model(role)?
            .ok_or(ExecutionError::NoModelForRole(role))
    }

    /// Streams one response for `role`.
    ///
    /// Every failure (no model bound, the call itself, or a failed chunk)
    /// surfaces as exactly one `Err` item, after which the stream ends.
    pub async fn stream(&self, prompt: &str, role: Role) -> ChunkStream {
        let model = match self.model_for(role) {
            Ok(model) => model,
            Err(e) => return single_error(e),
        };

        tracing::debug!("Streaming {} response from {}", role, model);
        match self.client.stream_chat(&model, prompt, role).await {
            Ok(chunks) => end_after_first_error(chunks),
            Err(e) => single_error(e),
        }
    }

    /// Issues one call and returns the full response, or `None` after logging
    /// the failure.
    pub async fn call(&self, prompt: &str, role: Role) -> Option<String> {
        let model = match self.model_for(role) {
            Ok(model) => model,
            Err(e) => {
                tracing::error!("{}", e);
                return None;
            }
        };

        let cache = self.cache_for(role, &model);
        let key = hash_key(&[prompt]);
        if let Some(cached) = cache.as_ref().and_then(|c| c.get(&key)) {
            tracing::debug!("Using cached {} response from {}", role, model);
            return Some(cached);
        }

        let mut chunks = match self.client.stream_chat(&model, prompt, role).await {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::error!("{} call to {} failed: {}", role, model, e);
                return None;
            }
        };

        let mut response = String::new();
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(text) => response.push_str(&text),
                Err(e) => {
                    tracing::error!("{} call to {} failed: {}", role, model, e);
                    return None;
                }
            }
        }

        if let Some(cache) = &cache {
            if !response.trim().is_empty() {
                cache.set(&key, &response);
            }
        }
        Some(response)
    }

    fn cache_for(&self, role: Role, model: &Model) -> Option<FileCache> {
        let folder = self.cache_dir.clone()?;
        let role_model_hash = hash_key(&[role.as_str(), &model.provider, &model.name]);
        Some(FileCache::new(Some(folder), role_model_hash))
    }
}

fn single_error(e: ExecutionError) -> ChunkStream {
    stream::once(future::ready(Err(e))).boxed()
}

fn end_after_first_error(chunks: ChunkStream) -> ChunkStream {
    chunks
        .scan(false, |failed, chunk| {
            if *failed {
                return future::ready(None);
            }
            *failed = chunk.is_err();
            future::ready(Some(chunk))
        })
        .boxed()
}
