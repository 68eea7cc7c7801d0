use anyhow::Result;
use serenity::{
    all::Command,
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Todos los comandos slash del bot.
pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        join_command(),
        leave_command(),
        add_command(),
        insert_command(),
        loop_command(),
        shuffle_command(),
        queue_command(),
        current_command(),
        skip_command(),
        jump_command(),
        pause_command(),
        resume_command(),
        remove_command(),
        clear_command(),
        theme_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    Command::set_global_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

// Comandos de conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Conecta el bot a tu canal de voz")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Sale del canal y descarta la cola")
}

// Comandos de cola

fn add_command() -> CreateCommand {
    CreateCommand::new("add")
        .description("Añade una canción a la cola y empieza a reproducir")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
}

fn insert_command() -> CreateCommand {
    CreateCommand::new("insert")
        .description("Inserta una canción en una posición de la cola")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "position", "Posición en la cola")
                .min_int_value(1)
                .required(true),
        )
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Configura el modo de repetición")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "Modo de repetición")
                .add_string_choice("Desactivada", "off")
                .add_string_choice("Canción", "single")
                .add_string_choice("Cola", "all")
                .required(true),
        )
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Mezcla la cola")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Número de página")
                .min_int_value(1),
        )
}

fn current_command() -> CreateCommand {
    CreateCommand::new("current").description("Muestra la canción actual")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip")
        .description("Salta canciones; se admiten valores negativos")
        .add_option(CreateCommandOption::new(
            CommandOptionType::Integer,
            "offset",
            "Cuántas canciones saltar (por defecto 1)",
        ))
}

fn jump_command() -> CreateCommand {
    CreateCommand::new("jump")
        .description("Salta a una posición de la cola")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "position", "Posición en la cola")
                .min_int_value(1)
                .required(true),
        )
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Quita una canción; sin posición quita la actual")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "position", "Posición en la cola")
                .min_int_value(1),
        )
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Vacía la cola de reproducción")
}

// Comandos de control

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

// Temas de bienvenida

fn theme_command() -> CreateCommand {
    CreateCommand::new("theme")
        .description("Tu tema de bienvenida al entrar al canal")
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "set", "Define tu tema")
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::String, "url", "URL del tema")
                        .required(true),
                ),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "clear",
            "Elimina tu tema",
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_every_command() {
        assert_eq!(all_commands().len(), 15);
    }
}
