use anyhow::Result;
use serenity::{
    builder::{
        CreateActionRow, CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandDataOptionValue, CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{player::Player, queue::RepeatMode},
    bot::{
        checks::{self, VoiceRequirement},
        Session, ZemoBot,
    },
    error::MusicError,
    sources::is_url,
    ui::{buttons, embeds},
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &ZemoBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let name = command.data.name.as_str();
    let user_channel = checks::user_voice_channel(ctx, guild_id, command.user.id);
    let bot_channel = bot.session(guild_id).map(|session| session.channel_id);

    if let Err(message) = checks::check_voice(requirement_for(name), user_channel, bot_channel) {
        return reply_error(ctx, &command, message).await;
    }

    match (name, user_channel) {
        ("join", Some(channel_id)) => handle_join(ctx, &command, bot, guild_id, channel_id).await?,
        ("add", Some(channel_id)) => {
            handle_enqueue(ctx, &command, bot, guild_id, channel_id, None).await?
        }
        ("insert", Some(channel_id)) => {
            let position = option_int(&command, "position").unwrap_or(1).max(1) as usize;
            handle_enqueue(ctx, &command, bot, guild_id, channel_id, Some(position - 1)).await?
        }
        ("leave", _) => handle_leave(ctx, &command, bot, guild_id).await?,
        ("theme", _) => handle_theme(ctx, &command, bot).await?,
        _ => {
            let Some(session) = bot.session(guild_id) else {
                return reply_error(ctx, &command, "No estoy conectado a un canal de voz").await;
            };
            handle_session_command(ctx, &command, bot, &session).await?
        }
    }

    Ok(())
}

/// Comandos que actúan sobre la sesión de voz ya abierta.
async fn handle_session_command(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &ZemoBot,
    session: &Session,
) -> Result<()> {
    let player = &session.player;

    match command.data.name.as_str() {
        "loop" => {
            let mode = match option_str(command, "mode").unwrap_or("off").parse::<RepeatMode>() {
                Ok(mode) => mode,
                Err(_) => return reply_error(ctx, command, "Modo de repetición no válido").await,
            };
            let has_items = player.with_queue(|queue| {
                queue.set_repeat(mode);
                !queue.is_empty()
            });
            if has_items {
                player.play()?;
            }
            reply(ctx, command, format!("🔁 Repetición: **{}**", mode.as_str())).await
        }
        "shuffle" => {
            player.with_queue(|queue| queue.shuffle());
            reply(ctx, command, "🔀 Cola mezclada").await
        }
        "queue" => {
            let page = option_int(command, "page").unwrap_or(1).max(1) as usize;
            let owner = command.user.id.get();
            match queue_view(player, owner, page, bot.config().queue_page_size) {
                Some((embed, components)) => {
                    command
                        .create_response(
                            &ctx.http,
                            CreateInteractionResponse::Message(
                                CreateInteractionResponseMessage::new()
                                    .embed(embed)
                                    .components(components),
                            ),
                        )
                        .await?;
                    Ok(())
                }
                None => reply(ctx, command, "📭 La cola está vacía").await,
            }
        }
        "current" => match player.now_playing().or_else(|| player.current()) {
            Some(item) => reply_embed(ctx, command, embeds::song_embed(&item)).await,
            None => reply(ctx, command, "📭 No hay nada en la cola").await,
        },
        "skip" => {
            let offset = option_int(command, "offset").unwrap_or(1) as isize;
            let target = player.with_queue(|queue| {
                queue
                    .skip_by(offset)
                    .map(|index| (index, queue.items()[index].clone()))
            });
            match target {
                Ok((index, item)) => {
                    restart_playback(player.clone()).await?;
                    reply(ctx, command, format!("⏭️ Saltando a **{}.** {}", index + 1, item)).await
                }
                Err(e) => reply_music_error(ctx, command, e).await,
            }
        }
        "jump" => {
            let index = option_int(command, "position").unwrap_or(1).max(1) as usize - 1;
            let target = player.with_queue(|queue| {
                queue.jump(index).map(|()| queue.items()[index].clone())
            });
            match target {
                Ok(item) => {
                    restart_playback(player.clone()).await?;
                    reply(ctx, command, format!("⏩ Saltando a **{}.** {}", index + 1, item)).await
                }
                Err(e) => reply_music_error(ctx, command, e).await,
            }
        }
        "pause" => {
            if !player.is_playing() {
                return reply_error(ctx, command, "No hay nada reproduciéndose").await;
            }
            player.pause();
            reply(ctx, command, "⏸️ Pausado").await
        }
        "resume" => {
            if !player.is_paused() {
                return reply_error(ctx, command, "La reproducción no está en pausa").await;
            }
            player.resume();
            reply(ctx, command, "▶️ Reanudado").await
        }
        "remove" => {
            let position = option_int(command, "position").map(|p| p.max(1) as usize - 1);
            let removed = player.with_queue(|queue| {
                let index = position.unwrap_or_else(|| queue.index());
                queue.remove_at(index)
            });
            match removed {
                Ok(item) => reply(ctx, command, format!("🗑️ Eliminada: {}", item)).await,
                Err(e) => reply_music_error(ctx, command, e).await,
            }
        }
        "clear" => {
            player.with_queue(|queue| queue.clear());
            reply(ctx, command, "🧹 Cola vaciada").await
        }
        other => {
            debug!("Comando desconocido: {}", other);
            reply_error(ctx, command, "Comando no reconocido").await
        }
    }
}

/// Maneja interacciones con componentes (botones, menús, etc.)
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &ZemoBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let Some(button) = buttons::parse_queue_page(&component.data.custom_id) else {
        component
            .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
            .await?;
        return Ok(());
    };

    if !button.is_owner(component.user.id.get()) {
        component
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("❌ Sólo quien pidió la cola puede cambiar de página")
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    }

    let view = bot.session(guild_id).and_then(|session| {
        queue_view(
            &session.player,
            button.owner,
            button.page,
            bot.config().queue_page_size,
        )
    });

    let message = match view {
        Some((embed, components)) => CreateInteractionResponseMessage::new()
            .embed(embed)
            .components(components),
        None => CreateInteractionResponseMessage::new()
            .content("📭 La cola está vacía")
            .embeds(Vec::new())
            .components(Vec::new()),
    };

    component
        .create_response(&ctx.http, CreateInteractionResponse::UpdateMessage(message))
        .await?;
    Ok(())
}

/// Presencia en voz que exige cada comando.
fn requirement_for(command: &str) -> VoiceRequirement {
    match command {
        "join" | "add" | "insert" => VoiceRequirement::User,
        "leave" | "queue" | "current" => VoiceRequirement::Bot,
        "loop" | "shuffle" | "skip" | "jump" | "pause" | "resume" | "remove" | "clear" => {
            VoiceRequirement::UserAndBot
        }
        _ => VoiceRequirement::None,
    }
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &ZemoBot,
    guild_id: GuildId,
    channel_id: ChannelId,
) -> Result<()> {
    if let Some(session) = bot.session(guild_id) {
        let message = if session.channel_id == channel_id {
            "✅ Ya estoy en tu canal".to_string()
        } else {
            format!("⚠️ Ya estoy conectado en <#{}>", session.channel_id)
        };
        return reply(ctx, command, message).await;
    }

    command.defer(&ctx.http).await?;
    match bot.join(ctx, guild_id, channel_id).await {
        Ok(_) => edit(ctx, command, format!("🔊 Conectado a <#{}>", channel_id)).await,
        Err(e) => {
            error!("Error al conectar en guild {}: {:?}", guild_id, e);
            edit_error(ctx, command, "No pude conectarme al canal de voz").await
        }
    }
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &ZemoBot,
    guild_id: GuildId,
) -> Result<()> {
    if bot.leave(guild_id) {
        reply(ctx, command, "👋 ¡Hasta luego!").await
    } else {
        reply_error(ctx, command, "No estoy conectado a un canal de voz").await
    }
}

/// `/add` y `/insert`: busca la canción, la encola y arranca si hace falta.
async fn handle_enqueue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &ZemoBot,
    guild_id: GuildId,
    channel_id: ChannelId,
    insert_at: Option<usize>,
) -> Result<()> {
    let query = option_str(command, "query").unwrap_or_default().to_string();
    command.defer(&ctx.http).await?;

    let session = match bot.join(ctx, guild_id, channel_id).await {
        Ok(session) => session,
        Err(e) => {
            error!("Error al conectar en guild {}: {:?}", guild_id, e);
            return edit_error(ctx, command, "No pude conectarme al canal de voz").await;
        }
    };
    if session.channel_id != channel_id {
        return edit_error(ctx, command, "No estoy conectado a tu canal de voz").await;
    }

    info!("🔍 Buscando: {}", query);
    let item = match bot.lookup.resolve(&query).await {
        Ok(item) => item,
        Err(e) if e.is_user_facing() => return edit_error(ctx, command, e.to_string()).await,
        Err(e) => {
            error!("Error en la búsqueda de '{}': {}", query, e);
            return edit_error(ctx, command, "No se pudo buscar la canción").await;
        }
    };

    let max_queue_size = bot.config().max_queue_size;
    let position = session.player.with_queue(|queue| {
        if queue.len() >= max_queue_size {
            return Ok(None);
        }
        match insert_at {
            None => {
                queue.append(item.clone());
                Ok(Some(queue.len()))
            }
            Some(index) => {
                let index = index.min(queue.len());
                queue.insert(index, item.clone()).map(|()| Some(index + 1))
            }
        }
    });

    let position = match position {
        Ok(Some(position)) => position,
        Ok(None) => {
            let message = format!("La cola está llena ({} canciones)", max_queue_size);
            return edit_error(ctx, command, message).await;
        }
        Err(e) => return edit_error(ctx, command, e.to_string()).await,
    };
    info!("➕ Añadida '{}' en la posición {}", item.title(), position);

    if let Some(fault) = session.player.take_fault() {
        warn!("Reanudando tras un fallo previo en guild {}: {}", guild_id, fault);
    }
    // `play()` es idempotente; el hilo puede estar a punto de quedarse sin cola.
    if let Err(e) = session.player.play() {
        error!("No se pudo iniciar la reproducción: {}", e);
    }

    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new().embed(embeds::song_added_embed(&item, position)),
        )
        .await?;
    Ok(())
}

async fn handle_theme(ctx: &Context, command: &CommandInteraction, bot: &ZemoBot) -> Result<()> {
    let Some(subcommand) = command.data.options.first() else {
        return reply_error(ctx, command, "Falta el subcomando").await;
    };
    let user_id = command.user.id.get();

    match (subcommand.name.as_str(), &subcommand.value) {
        ("set", CommandDataOptionValue::SubCommand(args)) => {
            let url = args
                .iter()
                .find(|option| option.name == "url")
                .and_then(|option| option.value.as_str())
                .unwrap_or_default()
                .trim()
                .to_string();
            if !is_url(&url) {
                return reply_error(ctx, command, "Eso no parece una URL válida").await;
            }

            command.defer_ephemeral(&ctx.http).await?;
            let item = match bot.lookup.find_by_url(&url).await {
                Ok(item) => item,
                Err(e) => {
                    warn!("Tema rechazado para {}: {}", user_id, e);
                    return edit_error(ctx, command, "No pude cargar esa URL").await;
                }
            };

            bot.themes.lock().await.set_theme(user_id, url).await?;
            edit(ctx, command, format!("🎺 Tema guardado: {}", item)).await
        }
        ("clear", _) => {
            if bot.themes.lock().await.clear_theme(user_id).await? {
                reply(ctx, command, "🗑️ Tema eliminado").await
            } else {
                reply_error(ctx, command, "No tenías ningún tema").await
            }
        }
        _ => reply_error(ctx, command, "Subcomando no reconocido").await,
    }
}

/// Corta la canción actual para que el hilo recoja el nuevo destino.
async fn restart_playback(player: Arc<Player>) -> Result<()> {
    if player.now_playing().is_some() {
        let stopping = player.clone();
        tokio::task::spawn_blocking(move || stopping.stop(true)).await?;
    }
    player.play()?;
    Ok(())
}

/// Embed y botones de una página de la cola; `None` si está vacía.
fn queue_view(
    player: &Player,
    owner: u64,
    page: usize,
    per_page: usize,
) -> Option<(CreateEmbed, Vec<CreateActionRow>)> {
    let playing = player.now_playing().is_some();
    player.with_queue(|queue| {
        if queue.is_empty() {
            return None;
        }
        let current = playing.then(|| queue.index());
        let page = queue.page(page, per_page);
        let embed =
            embeds::queue_embed(&page, current, queue.repeat(), queue.priority_items().len());
        Some((
            embed,
            buttons::queue_pagination(owner, page.current_page, page.total_pages),
        ))
    })
}

fn option_str<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_str())
}

fn option_int(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_i64())
}

async fn reply(ctx: &Context, command: &CommandInteraction, content: impl Into<String>) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().content(content),
            ),
        )
        .await?;
    Ok(())
}

async fn reply_embed(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;
    Ok(())
}

async fn reply_error(
    ctx: &Context,
    command: &CommandInteraction,
    message: impl Into<String>,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embeds::error_embed(message))
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

/// Los errores de control se cuentan al usuario; el resto se propaga.
async fn reply_music_error(
    ctx: &Context,
    command: &CommandInteraction,
    err: MusicError,
) -> Result<()> {
    if err.is_user_facing() {
        reply_error(ctx, command, err.to_string()).await
    } else {
        Err(err.into())
    }
}

async fn edit(ctx: &Context, command: &CommandInteraction, content: impl Into<String>) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;
    Ok(())
}

async fn edit_error(
    ctx: &Context,
    command: &CommandInteraction,
    message: impl Into<String>,
) -> Result<()> {
    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new().embed(embeds::error_embed(message)),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_requirements_per_command() {
        assert_eq!(requirement_for("add"), VoiceRequirement::User);
        assert_eq!(requirement_for("join"), VoiceRequirement::User);
        assert_eq!(requirement_for("queue"), VoiceRequirement::Bot);
        assert_eq!(requirement_for("skip"), VoiceRequirement::UserAndBot);
        assert_eq!(requirement_for("clear"), VoiceRequirement::UserAndBot);
        assert_eq!(requirement_for("theme"), VoiceRequirement::None);
    }
}
