use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::{
    audio::queue::{QueuePage, RepeatMode},
    sources::PlayableItem,
    ui::format::{to_ordinal, to_readable_time, truncate},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

const STANDARD_FOOTER: &str = "🎵 Zemo";

/// Embed de una canción: título enlazado, autor, duración y miniatura.
pub fn song_embed(item: &PlayableItem) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(item.title())
        .url(item.page_url())
        .description(format!(
            "por {} | {}",
            item.author_name(),
            to_readable_time(item.duration_secs())
        ))
        .color(colors::MUSIC_PURPLE);

    if !item.thumbnail_url().is_empty() {
        embed = embed.thumbnail(item.thumbnail_url());
    }

    embed
}

/// Embed de "añadida a la cola" con la posición asignada (1-based).
pub fn song_added_embed(item: &PlayableItem, position: usize) -> CreateEmbed {
    song_embed(item)
        .color(colors::SUCCESS_GREEN)
        .field("📍 Posición", to_ordinal(position), true)
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente si no hay música sonando",
        ))
}

/// Crea un embed para mostrar la cola de reproducción.
///
/// `current_index` marca con ▶️ la canción que está sonando.
pub fn queue_embed(
    page: &QueuePage<'_, PlayableItem>,
    current_index: Option<usize>,
    repeat: RepeatMode,
    upcoming_priority: usize,
) -> CreateEmbed {
    let lines: Vec<String> = page
        .items
        .iter()
        .enumerate()
        .map(|(offset, item)| {
            let position = page.first_position + offset;
            let marker = if Some(position) == current_index { "▶️ " } else { "" };
            format!(
                "{}**{}.** [{}]({}) por {}",
                marker,
                position + 1,
                truncate(item.title(), 60),
                item.page_url(),
                truncate(item.author_name(), 40)
            )
        })
        .collect();

    let mut description = lines.join("\n");
    if upcoming_priority > 0 {
        description.push_str(&format!(
            "\n\n🎺 {} tema(s) de bienvenida antes de la cola",
            upcoming_priority
        ));
    }

    CreateEmbed::default()
        .title("📋 Cola de reproducción")
        .description(description)
        .color(colors::INFO_BLUE)
        .field("🔁 Repetición", repeat.as_str(), true)
        .field("🎶 Canciones", page.total_items.to_string(), true)
        .footer(CreateEmbedFooter::new(format!(
            "Página {}/{} • {}",
            page.current_page, page.total_pages, STANDARD_FOOTER
        )))
        .timestamp(Timestamp::now())
}

/// Crea un embed de error
pub fn error_embed(message: impl Into<String>) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Error")
        .description(message.into())
        .color(colors::ERROR_RED)
}
