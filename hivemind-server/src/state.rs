//! Process-wide application state
//!
//! Every process-wide singleton (embedder, sanitizer, injection scanner,
//! MinHash-LSH index, rate gate, LLM client, notification hub, webhook
//! dispatcher) is built exactly once at startup and shared behind this
//! struct. Nothing request-scoped lives here.

use std::sync::Arc;

use hivemind_core::ingest::IngestContext;
use hivemind_core::{
    Embedder, InjectionScanner, LlmClient, MinHashLshIndex, NotificationHub, PiiSanitizer,
    RateGate, Settings, WebhookDispatcher,
};
use hivemind_storage_turso::TursoStorage;
use tracing::{info, warn};

/// Shared server state; cheap to clone via `Arc`
pub struct AppState {
    pub settings: Settings,
    pub store: Arc<TursoStorage>,
    pub embedder: Embedder,
    pub sanitizer: PiiSanitizer,
    pub scanner: InjectionScanner,
    pub lsh_index: MinHashLshIndex,
    pub gate: RateGate,
    pub llm: Option<LlmClient>,
    pub hub: NotificationHub,
    pub webhooks: WebhookDispatcher,
}

impl AppState {
    /// Borrow the singletons as an ingestion context
    pub fn ingest_context(&self) -> IngestContext<'_> {
        IngestContext {
            store: self.store.as_ref(),
            settings: &self.settings,
            embedder: &self.embedder,
            sanitizer: &self.sanitizer,
            scanner: &self.scanner,
            lsh_index: &self.lsh_index,
            gate: &self.gate,
            llm: self.llm.as_ref(),
            hub: &self.hub,
            webhooks: &self.webhooks,
        }
    }

    /// Pin the embedding model identity into deployment config
    ///
    /// A previously pinned identity that differs from the running one logs a
    /// drift warning but does not block startup.
    pub async fn pin_model_identity(&self) -> hivemind_core::Result<()> {
        let identity = self.embedder.identity();

        if let Some(stored) = self.store.get_config("embedding_model_id").await? {
            if stored != identity.model_id {
                warn!(
                    "embedding model drift: deployment config has '{stored}', \
                     running '{}' - stored vectors may not be comparable",
                    identity.model_id
                );
            }
        }
        if let Some(stored) = self.store.get_config("embedding_model_revision").await? {
            if stored != identity.model_revision {
                warn!(
                    "embedding model revision drift: deployment config has '{stored}', \
                     running '{}'",
                    identity.model_revision
                );
            }
        }

        self.store
            .upsert_config("embedding_model_id", &identity.model_id)
            .await?;
        self.store
            .upsert_config("embedding_model_revision", &identity.model_revision)
            .await?;
        Ok(())
    }

    /// Rebuild the MinHash-LSH index from every current knowledge item
    pub async fn rebuild_lsh_index(&self) -> hivemind_core::Result<usize> {
        self.lsh_index.clear();
        let contents = self.store.current_item_contents().await?;
        let count = contents.len();
        for (id, content) in contents {
            self.lsh_index.insert(id, &content);
        }
        info!("MinHash LSH index rebuilt - {count} items indexed");
        Ok(count)
    }
}
