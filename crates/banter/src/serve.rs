// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `banter serve` command implementation.
//!
//! Wires the chat.db reader, state database, rate limiter, OpenAI-backed
//! handlers, and the AppleScript transport into the poll loop, then runs
//! it until a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use banter_agent::{shutdown, AgentLoop, ConversationStore, Dispatcher, HandlerRegistry};
use banter_config::model::BanterConfig;
use banter_core::BanterError;
use banter_imessage::IMessageSender;
use banter_openai::{
    AudioHandler, ChatHandler, DocumentHandler, ImageGenHandler, OpenAiClient, VisionHandler,
};
use banter_ratelimit::RateLimiter;
use banter_search::SearchClient;
use banter_store::{expand_tilde, ChatDbReader, StateDb};
use banter_usage::UsageLedger;

/// Runs the `banter serve` command.
pub async fn run_serve(config: BanterConfig) -> Result<(), BanterError> {
    init_tracing(&config.agent.log_level);
    info!(agent_name = config.agent.name.as_str(), "starting banter serve");

    let state_path = expand_tilde(&config.store.state_db_path);
    let state = Arc::new(StateDb::open(&state_path.to_string_lossy()).await?);
    let ledger = Arc::new(UsageLedger::open(&state_path.to_string_lossy()).await?);
    let reader = Arc::new(
        ChatDbReader::open(&config.store.chat_db_path, &config.store.attachments_root).await?,
    );

    let registry = build_handlers(&config)?;
    let store = Arc::new(ConversationStore::new(
        state.clone(),
        config.conversation.history_window,
    ));
    let limiter = Arc::new(RateLimiter::new(config.ratelimit.clone()));
    let sender = Arc::new(IMessageSender::new());

    let dispatcher = Arc::new(Dispatcher::new(
        registry,
        sender,
        store,
        limiter,
        ledger,
        config.dispatch.clone(),
        config.conversation.clone(),
        config.followup.clone(),
    ));

    let agent = AgentLoop::new(reader, dispatcher, state.clone(), config.poller.clone());
    let cancel = shutdown::install_signal_handler();
    agent.run(cancel).await?;

    state.close().await?;
    info!("banter serve shutdown complete");
    Ok(())
}

/// Builds the handler registry from the feature flags. Chat is always on;
/// every other capability registers only when its flag allows, so dispatch
/// answers with a capability notice instead of calling out.
fn build_handlers(config: &BanterConfig) -> Result<HandlerRegistry, BanterError> {
    let api_key = config.openai.api_key.clone().ok_or_else(|| {
        BanterError::Config(
            "openai.api_key is not set; set it in banter.toml or via BANTER_OPENAI_API_KEY"
                .to_string(),
        )
    })?;
    let client = Arc::new(OpenAiClient::new(api_key, config.openai.base_url.clone()));

    let search = if config.features.search && config.search.enabled {
        match (&config.search.api_key, &config.search.engine_id) {
            (Some(key), Some(engine_id)) => Some(Arc::new(SearchClient::new(
                key.clone(),
                engine_id.clone(),
                Duration::from_secs(config.search.cache_ttl_secs),
            ))),
            _ => {
                warn!("search enabled but api_key or engine_id missing, continuing without it");
                None
            }
        }
    } else {
        None
    };

    let openai = &config.openai;
    let mut registry = HandlerRegistry::new(Arc::new(ChatHandler::new(
        client.clone(),
        openai.chat_model.clone(),
        openai.max_tokens,
        search,
    )));
    if config.features.vision {
        registry = registry.with_vision(Arc::new(VisionHandler::new(
            client.clone(),
            openai.vision_model.clone(),
            openai.max_tokens,
        )));
    }
    if config.features.documents {
        registry = registry.with_document(Arc::new(DocumentHandler::new(
            client.clone(),
            openai.chat_model.clone(),
            openai.max_tokens,
        )));
    }
    if config.features.audio {
        registry = registry.with_audio(Arc::new(AudioHandler::new(
            client.clone(),
            openai.transcription_model.clone(),
            openai.chat_model.clone(),
            openai.max_tokens,
        )));
    }
    if config.features.image_generation {
        registry = registry.with_image_generation(Arc::new(ImageGenHandler::new(
            client,
            openai.image_model.clone(),
        )));
    }
    Ok(registry)
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("banter={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
