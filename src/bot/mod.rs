//! # Bot Module
//!
//! Integración con Discord: registro de comandos, sesiones de voz por guild
//! y despacho de eventos.
//!
//! Cada guild con el bot conectado tiene una [`Session`]: el [`Player`] que
//! consume la cola en su propio hilo y el [`SongbirdTransport`] que lleva los
//! frames a la llamada.

use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod checks;
pub mod commands;
pub mod events;
pub mod handlers;

use crate::{
    audio::{
        player::{ErrorAction, ErrorHandler, Player, PlayerOptions},
        source::SourceOpener,
        transport::Participant,
    },
    config::Config,
    error::MusicError,
    sources::TrackLookup,
    storage::ThemeStore,
    voice::SongbirdTransport,
};

/// Conexión de voz activa en una guild.
#[derive(Clone)]
pub struct Session {
    pub player: Arc<Player>,
    pub transport: Arc<SongbirdTransport>,
    pub channel_id: ChannelId,
}

/// Handler principal del bot.
pub struct ZemoBot {
    config: Arc<Config>,
    pub themes: Arc<tokio::sync::Mutex<ThemeStore>>,
    pub lookup: Arc<dyn TrackLookup>,
    opener: Arc<dyn SourceOpener>,
    sessions: DashMap<GuildId, Session>,
}

impl ZemoBot {
    pub fn new(
        config: Config,
        themes: Arc<tokio::sync::Mutex<ThemeStore>>,
        lookup: Arc<dyn TrackLookup>,
        opener: Arc<dyn SourceOpener>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            themes,
            lookup,
            opener,
            sessions: DashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registra los comandos slash en las guilds configuradas o globalmente.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        if self.config.guild_ids.is_empty() {
            info!("🌐 Registrando comandos globalmente");
            commands::register_global_commands(ctx).await.map_err(|e| {
                error!("❌ Error registrando comandos globales: {:?}", e);
                anyhow::anyhow!(
                    "No se pudieron registrar comandos globales. Verifica el permiso 'applications.commands'."
                )
            })?;
            info!("✅ Comandos globales registrados");
            return Ok(());
        }

        for &id in &self.config.guild_ids {
            let guild_id = GuildId::new(id);
            match commands::register_guild_commands(ctx, guild_id).await {
                Ok(()) => info!("✅ Comandos de guild registrados para: {}", guild_id),
                Err(e) => error!("❌ Error registrando comandos en {}: {:?}", guild_id, e),
            }
        }

        Ok(())
    }

    /// Sesión viva de una guild. Las sesiones cerradas se descartan.
    pub fn session(&self, guild_id: GuildId) -> Option<Session> {
        let session = self.sessions.get(&guild_id).map(|s| s.clone())?;
        if session.player.is_closed() {
            self.sessions.remove(&guild_id);
            return None;
        }
        Some(session)
    }

    /// Devuelve la sesión existente o conecta al canal indicado.
    pub async fn join(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Session> {
        if let Some(session) = self.session(guild_id) {
            return Ok(session);
        }

        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        let transport = SongbirdTransport::connect(manager, guild_id, channel_id).await?;
        transport.set_members(channel_members(ctx, guild_id, channel_id));

        let player = Player::new(
            transport.clone(),
            self.opener.clone(),
            PlayerOptions {
                idle_timeout: self.config.idle_timeout,
                on_error: Some(error_handler(guild_id)),
            },
        );

        let session = Session {
            player,
            transport,
            channel_id,
        };
        self.sessions.insert(guild_id, session.clone());

        info!("🔊 Conectado al canal {} en guild {}", channel_id, guild_id);
        Ok(session)
    }

    /// Cierra la sesión de la guild. `false` si no había ninguna.
    pub fn leave(&self, guild_id: GuildId) -> bool {
        match self.sessions.remove(&guild_id) {
            Some((_, session)) => {
                session.player.leave();
                true
            }
            None => false,
        }
    }

    /// Apunta la sesión a otro canal tras mover al bot.
    pub fn move_session(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<Session> {
        let mut entry = self.sessions.get_mut(&guild_id)?;
        entry.channel_id = channel_id;
        Some(entry.clone())
    }

    /// Recarga los miembros del canal del bot desde la caché.
    pub fn refresh_members(&self, ctx: &Context, guild_id: GuildId, session: &Session) {
        session
            .transport
            .set_members(channel_members(ctx, guild_id, session.channel_id));
    }
}

/// Los errores de stream saltan a la siguiente canción; el resto detiene la sesión.
fn error_handler(guild_id: GuildId) -> ErrorHandler {
    Arc::new(move |err: &MusicError| match err {
        MusicError::Stream { .. } => {
            warn!("⚠️ Stream fallido en guild {}: {}", guild_id, err);
            ErrorAction::Continue
        }
        _ => {
            error!("❌ Error de reproducción en guild {}: {}", guild_id, err);
            ErrorAction::Halt
        }
    })
}

/// Usuarios en un canal de voz según la caché.
fn channel_members(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> Vec<Participant> {
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return Vec::new();
    };

    guild
        .voice_states
        .values()
        .filter(|state| state.channel_id == Some(channel_id))
        .map(|state| {
            let bot = state
                .member
                .as_ref()
                .map(|member| member.user.bot)
                .or_else(|| guild.members.get(&state.user_id).map(|m| m.user.bot))
                .unwrap_or(false);
            Participant {
                id: state.user_id.get(),
                bot,
            }
        })
        .collect()
}

#[async_trait]
impl EventHandler for ZemoBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await
                {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        events::handle_voice_state_update(self, &ctx, old, new).await;
    }
}
