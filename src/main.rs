use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use whemini::bot::{
    BotState, BridgeClient, ChatPlatform, Engine, EngineConfig, FfmpegTranscoder, GeminiClient, IdentityResolver,
    MediaPreprocessor, ModelFactory,
};
use whemini::config::{API_KEY_VAR, Config};

/// Delay before retrying after a failed event poll.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "whemini", about = "WhatsApp bot backed by Gemini")]
struct Args {
    /// JSON config file. Without it every setting takes its default.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn fatal(msg: impl std::fmt::Display) -> ! {
    eprintln!("whemini: {msg}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    dotenv::dotenv().ok();

    let config = Config::load(args.config.as_deref(), std::env::var(API_KEY_VAR).ok()).unwrap_or_else(|e| fatal(e));

    let bridge = Arc::new(BridgeClient::new(&config.bridge_url).unwrap_or_else(|e| fatal(e)));

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("whemini.log"))
        .unwrap_or_else(|e| fatal(format!("failed to open log file: {e}")));
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting whemini...");
    match config.config_path {
        Some(ref path) => info!("Loaded config from {}", path.display()),
        None => info!("No config file, using defaults"),
    }
    info!("Instructions: {}", config.instructions_path.display());
    if config.debug_mode {
        info!("🔍 DEBUG mode enabled: every message gets a diagnostics report");
    }

    let own_number = match bridge.client_info().await {
        Ok(me) => {
            info!("Bot account: {} ({})", me.wid, me.pushname.as_deref().unwrap_or("?"));
            Some(me.user().to_string()).filter(|n| !n.is_empty())
        }
        Err(e) => {
            warn!("Failed to get client info: {e}");
            None
        }
    }
    .or_else(|| config.bot_number.clone());

    let factory = ModelFactory::new(&config.instructions, config.grounding);
    let state = BotState::new(factory, &config.default_model, config.max_output_tokens)
        .unwrap_or_else(|e| fatal(format!("failed to build model: {e}")));
    let gemini = GeminiClient::new(config.gemini_api_key.clone(), &config.gemini_base_url)
        .unwrap_or_else(|e| fatal(e));
    let transcoder = FfmpegTranscoder::new(config.ffmpeg_path.clone());

    let engine = Arc::new(Engine::new(
        EngineConfig {
            started_at: chrono::Utc::now().timestamp(),
            debug_mode: config.debug_mode,
            sender_context: config.sender_context,
        },
        state,
        bridge.clone(),
        Arc::new(gemini),
        IdentityResolver::new(own_number),
        MediaPreprocessor::new(Arc::new(transcoder)),
    ));

    info!("✅ Whemini is online");

    tokio::select! {
        _ = poll_loop(bridge, engine, config.poll_timeout_secs) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("👋 Shutting down");
        }
    }
}

async fn poll_loop(bridge: Arc<BridgeClient>, engine: Arc<Engine>, timeout_secs: u64) {
    let mut cursor = 0;
    loop {
        match bridge.poll_events(cursor, timeout_secs).await {
            Ok(batch) => {
                cursor = batch.cursor;
                for msg in batch.messages {
                    let engine = engine.clone();
                    tokio::spawn(async move {
                        engine.handle_message(msg).await;
                    });
                }
            }
            Err(e) => {
                error!("Event poll failed: {e}");
                tokio::time::sleep(POLL_RETRY_DELAY).await;
            }
        }
    }
}
