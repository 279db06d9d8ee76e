//! Main Entrypoint for the I Spy game
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment and command line.
//! 2. Initializing logging.
//! 3. Building the guess reasoner (chat model or offline).
//! 4. Connecting to the robot (console or bridge).
//! 5. Playing one session and shutting down on Ctrl+C.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use clap::Parser;
use ispy_core::{
    GameOrchestrator, GuessReasoner, LLMGuessReasoner, OfflineGuessReasoner, RobotGateway,
    ScanMode, SessionUpdate, llm_client::OpenAICompatibleClient,
};
use ispy_service::{
    bridge::BridgeGateway,
    config::{Config, GatewayKind},
    console::{ConsoleGateway, DEFAULT_SCENE},
    prompts::load_prompts,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// How long the bridge gets to confirm a speak, posture or scan request.
const BRIDGE_REPLY_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Parser, Debug)]
#[command(version, about = "Play I Spy with a robot")]
struct Args {
    /// How the robot looks around: 'static' or '360'.
    #[arg(long)]
    scan_mode: Option<ScanMode>,
    /// Where the robot lives.
    #[arg(long, value_enum)]
    gateway: Option<GatewayKind>,
    /// The robot's realm on the bridge.
    #[arg(long)]
    realm: Option<String>,
    #[arg(long)]
    bridge_url: Option<String>,
    /// Use the built-in reasoner instead of a chat model.
    #[arg(long)]
    offline: bool,
}

/// Listens for the `Ctrl+C` signal to stop the game.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Leaving the game...");
}

/// Plays one session on `gateway` until it ends or the process is interrupted.
async fn play<G: RobotGateway>(
    gateway: G,
    reasoner: Arc<dyn GuessReasoner>,
    config: &Config,
    updates: mpsc::Sender<SessionUpdate>,
) -> anyhow::Result<()> {
    let mut game = GameOrchestrator::new(
        gateway,
        reasoner,
        config.scan_mode,
        config.settings.clone(),
    )
    .with_updates(updates);

    tokio::select! {
        result = game.run() => result.context("Session ended without a goodbye")?,
        _ = shutdown_signal() => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let args = Args::parse();
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(scan_mode) = args.scan_mode {
        config.scan_mode = scan_mode;
    }
    if let Some(gateway) = args.gateway {
        config.gateway = gateway;
    }
    if let Some(realm) = args.realm {
        config.robot_realm = Some(realm);
    }
    if let Some(url) = args.bridge_url {
        config.robot_bridge_url = url;
    }
    config.offline |= args.offline;
    config.validate().context("Invalid configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
    info!("Configuration loaded. Preparing the game...");

    // --- 3. Initialize the Reasoner ---
    let reasoner: Arc<dyn GuessReasoner> = if config.offline {
        info!("Playing offline with the built-in reasoner.");
        Arc::new(OfflineGuessReasoner::new())
    } else {
        let prompts = load_prompts(&config.prompts_path)?;
        let api_key = config
            .openai_api_key
            .as_ref()
            .context("OpenAI API key not found")?;
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&config.openai_api_base);
        let client = Arc::new(OpenAICompatibleClient::new(
            openai_config,
            config.chat_model.clone(),
        ));
        Arc::new(LLMGuessReasoner::new(client, prompts))
    };

    let (updates_tx, mut updates_rx) = mpsc::channel::<SessionUpdate>(64);
    tokio::spawn(async move {
        while let Some(update) = updates_rx.recv().await {
            debug!(?update, "Session update");
        }
    });

    // --- 4. Connect to the Robot and Play ---
    info!(
        gateway = ?config.gateway,
        scan_mode = %config.scan_mode,
        model = %config.chat_model,
        offline = config.offline,
        "Game configured. Starting session..."
    );
    match config.gateway {
        GatewayKind::Console => {
            let gateway = ConsoleGateway::stdio(DEFAULT_SCENE);
            play(gateway, reasoner, &config, updates_tx).await?;
        }
        GatewayKind::Bridge => {
            let realm = config
                .robot_realm
                .as_deref()
                .context("Robot realm not found")?;
            let gateway =
                BridgeGateway::connect(&config.robot_bridge_url, realm, BRIDGE_REPLY_TIMEOUT)
                    .await?;
            play(gateway, reasoner, &config, updates_tx).await?;
        }
    }

    info!("Game over.");
    Ok(())
}
