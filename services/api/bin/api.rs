//! Main Entrypoint for the Companion API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading the prompt set.
//! 3. Building the chat, vision, transcription and speech clients.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use companion_api::{
    config::{CompletionEndpoint, Config},
    router::create_router,
    state::AppState,
    ws::registry::SessionManager,
};
use companion_core::{
    llm_client::{ChatProvider, OpenAICompatibleClient, VisionProvider},
    prompts::Prompts,
    speech::{SpeechToText, TextToSpeech, TranscriptionClient, TtsClient, VoiceParams},
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Listens for `Ctrl+C` or SIGTERM to gracefully shut down the server.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

fn completion_client(
    endpoint: &CompletionEndpoint,
    timeout: Duration,
) -> anyhow::Result<OpenAICompatibleClient> {
    let openai_config = OpenAIConfig::new()
        .with_api_key(&endpoint.api_key)
        .with_api_base(&endpoint.base_url);
    OpenAICompatibleClient::new(openai_config, endpoint.model.clone(), timeout)
        .with_context(|| format!("Failed to build client for {}", endpoint.base_url))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Load Prompts ---
    let prompts = match &config.prompts_path {
        Some(path) => Prompts::load(path)
            .with_context(|| format!("Failed to load prompts from {}", path.display()))?,
        None => Prompts::builtin(),
    };

    // --- 4. Initialize Providers ---
    let timeout = config.provider_timeout;
    let chat: Arc<dyn ChatProvider> = Arc::new(completion_client(&config.chat, timeout)?);

    let vision: Option<Arc<dyn VisionProvider>> = match &config.vision {
        Some(endpoint) => Some(Arc::new(completion_client(endpoint, timeout)?)),
        None => {
            warn!("VISION_API_KEY not set; image messages will be rejected.");
            None
        }
    };

    let transcriber: Option<Arc<dyn SpeechToText>> = match &config.transcription {
        Some(endpoint) => Some(Arc::new(
            TranscriptionClient::new(
                endpoint.base_url.clone(),
                endpoint.api_key.clone(),
                endpoint.model.clone(),
                timeout,
            )
            .context("Failed to build transcription client")?,
        )),
        None => {
            warn!("STT_API_KEY not set; recorded audio cannot be transcribed.");
            None
        }
    };

    let (tts, voice): (Option<Arc<dyn TextToSpeech>>, VoiceParams) = match &config.tts {
        Some(settings) => (
            Some(Arc::new(
                TtsClient::new(settings.api_url.clone(), settings.audio_url.clone(), timeout)
                    .context("Failed to build speech synthesis client")?,
            )),
            VoiceParams::new(settings.voice.clone()),
        ),
        None => (None, VoiceParams::default()),
    };

    let app_state = Arc::new(AppState {
        sessions: Arc::new(SessionManager::new(config.history_max_turns)),
        chat,
        vision,
        transcriber,
        tts,
        voice,
        prompts: Arc::new(prompts),
        config: Arc::new(config.clone()),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        model = %config.chat.model,
        vision = config.vision.is_some(),
        transcription = config.transcription.is_some(),
        tts = config.tts.is_some(),
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
