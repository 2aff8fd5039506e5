//! Server entry point
//!
//! Startup order matters: storage schema first, then the process-wide
//! singletons, the model-identity pin (drift check), the LSH index rebuild,
//! the webhook worker and background jobs, and finally the listener.

use std::sync::Arc;

use anyhow::Context;
use hivemind_core::webhooks::run_delivery_worker;
use hivemind_core::{
    Embedder, InjectionScanner, LlmClient, MinHashLshIndex, NotificationHub, PiiSanitizer,
    RateGate, Settings, WebhookDispatcher,
};
use hivemind_server::{build_router, scheduler, AppState};
use hivemind_storage_turso::TursoStorage;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env();
    info!("starting HiveMind server on {}", settings.bind_addr);

    let store = TursoStorage::open_local(&settings.database_url)
        .await
        .context("opening database")?;
    store.initialize_schema().await.context("initializing schema")?;

    let llm = LlmClient::from_settings(&settings);
    if llm.is_none() {
        info!("no LLM API key configured - dedup confirmation and conflict resolution degrade to ADD");
    }

    let (webhooks, delivery_queue) = WebhookDispatcher::new();

    let state = Arc::new(AppState {
        embedder: Embedder::new(settings.embedding_model.clone(), settings.embedding_dimensions),
        sanitizer: PiiSanitizer::new(settings.pii_rejection_threshold),
        scanner: InjectionScanner::new(settings.injection_threshold),
        lsh_index: MinHashLshIndex::new(settings.minhash_num_perm, settings.minhash_threshold),
        gate: RateGate::new(settings.burst_threshold, settings.burst_window_seconds),
        llm,
        hub: NotificationHub::new(),
        webhooks,
        store: Arc::new(store),
        settings,
    });

    state.pin_model_identity().await.context("pinning model identity")?;
    state.rebuild_lsh_index().await.context("rebuilding LSH index")?;

    tokio::spawn(run_delivery_worker(delivery_queue));
    scheduler::spawn_background_jobs(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(&state.settings.bind_addr)
        .await
        .context("binding listener")?;
    info!("listening on {}", state.settings.bind_addr);

    axum::serve(listener, build_router(state))
        .await
        .context("serving")?;

    Ok(())
}
