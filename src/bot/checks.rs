use serenity::{
    model::id::{ChannelId, GuildId, UserId},
    prelude::Context,
};

/// Presencia en voz que exige un comando antes de ejecutarse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceRequirement {
    None,
    User,
    Bot,
    UserAndBot,
}

const USER_NOT_CONNECTED: &str = "No estás conectado a un canal de voz";
const BOT_NOT_CONNECTED: &str = "No estoy conectado a un canal de voz";
const BOT_ELSEWHERE: &str = "No estoy conectado a tu canal de voz";

/// Comprueba el requisito; el error es el mensaje para el usuario.
pub fn check_voice(
    requirement: VoiceRequirement,
    user_channel: Option<ChannelId>,
    bot_channel: Option<ChannelId>,
) -> Result<(), String> {
    match requirement {
        VoiceRequirement::None => Ok(()),
        VoiceRequirement::User if user_channel.is_none() => Err(USER_NOT_CONNECTED.into()),
        VoiceRequirement::Bot if bot_channel.is_none() => Err(BOT_NOT_CONNECTED.into()),
        VoiceRequirement::UserAndBot => {
            let mut problems = Vec::new();
            if user_channel.is_none() {
                problems.push(USER_NOT_CONNECTED);
            }
            if bot_channel.is_none() || bot_channel != user_channel {
                problems.push(BOT_ELSEWHERE);
            }
            if problems.is_empty() {
                Ok(())
            } else {
                Err(problems.join("\n"))
            }
        }
        _ => Ok(()),
    }
}

/// Canal de voz de un usuario según la caché.
pub fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = ctx.cache.guild(guild_id)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ch(id: u64) -> Option<ChannelId> {
        Some(ChannelId::new(id))
    }

    #[test]
    fn user_requirement() {
        assert_eq!(check_voice(VoiceRequirement::User, ch(1), None), Ok(()));
        assert_eq!(
            check_voice(VoiceRequirement::User, None, ch(1)),
            Err(USER_NOT_CONNECTED.to_string())
        );
    }

    #[test]
    fn bot_requirement() {
        assert_eq!(check_voice(VoiceRequirement::Bot, None, ch(1)), Ok(()));
        assert_eq!(
            check_voice(VoiceRequirement::Bot, ch(1), None),
            Err(BOT_NOT_CONNECTED.to_string())
        );
    }

    #[test]
    fn same_channel_requirement() {
        assert_eq!(check_voice(VoiceRequirement::UserAndBot, ch(1), ch(1)), Ok(()));
        assert_eq!(
            check_voice(VoiceRequirement::UserAndBot, ch(1), ch(2)),
            Err(BOT_ELSEWHERE.to_string())
        );
        assert_eq!(
            check_voice(VoiceRequirement::UserAndBot, None, None),
            Err(format!("{USER_NOT_CONNECTED}\n{BOT_ELSEWHERE}"))
        );
    }

    #[test]
    fn no_requirement() {
        assert_eq!(check_voice(VoiceRequirement::None, None, None), Ok(()));
    }
}
