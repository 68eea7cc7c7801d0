use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod storage;
mod ui;
mod voice;

use crate::audio::source::FfmpegOpener;
use crate::bot::ZemoBot;
use crate::config::Config;
use crate::sources::YtDlpLookup;
use crate::storage::ThemeStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("zemo=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Zemo v{}", env!("CARGO_PKG_VERSION"));

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Cargar configuración
    let config = Config::load()?;
    info!("⚙️ {}", config.summary());

    let store = ThemeStore::new(&config.data_dir).await?;
    info!("🎺 {} temas de bienvenida registrados", store.len());
    let themes = Arc::new(tokio::sync::Mutex::new(store));

    let lookup = YtDlpLookup::new();
    match lookup.verify().await {
        Ok(version) => info!("✅ yt-dlp disponible: {}", version),
        Err(e) => warn!("⚠️ yt-dlp no responde, las búsquedas fallarán: {}", e),
    }

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = ZemoBot::new(
        config.clone(),
        themes,
        Arc::new(lookup),
        Arc::new(FfmpegOpener::new()),
    );

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("⚠️ Señal de shutdown recibida, cerrando...");
                shard_manager.shutdown_all().await;
            }
            Err(e) => error!("Error al registrar Ctrl+C: {:?}", e),
        }
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

/// Comprueba que las herramientas externas estén instaladas.
async fn health_check() -> Result<()> {
    let yt_dlp = YtDlpLookup::new().verify().await;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.is_ok() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
