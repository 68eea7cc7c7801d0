use serenity::{
    model::{
        id::{GuildId, UserId},
        voice::VoiceState,
    },
    prelude::Context,
};
use tracing::{debug, info, warn};

use super::{Session, ZemoBot};

/// Reacciona a los cambios de voz de la guild.
///
/// - Si el bot sale del canal, se cierra su sesión.
/// - Si un usuario entra al canal del bot, suena su tema de bienvenida.
/// - Cualquier cambio reevalúa si el bot se ha quedado solo.
pub async fn handle_voice_state_update(
    bot: &ZemoBot,
    ctx: &Context,
    old: Option<VoiceState>,
    new: VoiceState,
) {
    let Some(guild_id) = new.guild_id else {
        return;
    };

    if new.user_id == ctx.cache.current_user().id {
        handle_own_state(bot, ctx, guild_id, new);
        return;
    }

    let Some(session) = bot.session(guild_id) else {
        return;
    };
    bot.refresh_members(ctx, guild_id, &session);

    let joined = new.channel_id == Some(session.channel_id)
        && old.as_ref().and_then(|state| state.channel_id) != Some(session.channel_id);
    let is_bot = new.member.as_ref().is_some_and(|member| member.user.bot);

    if joined && !is_bot {
        debug!("👤 Usuario {} entró al canal en guild {}", new.user_id, guild_id);
        session.player.on_membership_change();
        play_theme(bot, &session, new.user_id).await;
        return;
    }

    session.player.on_membership_change();
}

fn handle_own_state(bot: &ZemoBot, ctx: &Context, guild_id: GuildId, new: VoiceState) {
    match new.channel_id {
        None => {
            if bot.leave(guild_id) {
                info!("🔌 Bot desconectado del canal de voz en guild {}", guild_id);
            }
        }
        Some(channel_id) => {
            if let Some(session) = bot.move_session(guild_id, channel_id) {
                info!("🚚 Bot movido al canal {} en guild {}", channel_id, guild_id);
                bot.refresh_members(ctx, guild_id, &session);
                session.player.on_membership_change();
            }
        }
    }
}

/// Pone el tema del usuario delante de la cola, una sola vez.
async fn play_theme(bot: &ZemoBot, session: &Session, user_id: UserId) {
    let url = {
        let themes = bot.themes.lock().await;
        themes.get_theme(user_id.get()).map(str::to_string)
    };
    let Some(url) = url else {
        return;
    };

    let item = match bot.lookup.find_by_url(&url).await {
        Ok(item) => item,
        Err(e) => {
            warn!("No se pudo cargar el tema de {}: {}", user_id, e);
            return;
        }
    };

    let queued = session.player.with_queue(|queue| {
        let pending = queue
            .priority_items()
            .iter()
            .any(|queued| queued.page_url() == item.page_url());
        if !pending {
            queue.append_priority(item.clone());
        }
        !pending
    });

    if !queued {
        return;
    }
    info!("🎺 Tema de bienvenida para {}: {}", user_id, item.title());

    if let Err(e) = session.player.play() {
        warn!("No se pudo reproducir el tema de {}: {}", user_id, e);
    }
}
