use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

/// Prefijo de los botones de paginación de la cola.
pub const QUEUE_PAGE_PREFIX: &str = "queue_page:";

/// Botón de paginación ya interpretado.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePageButton {
    /// Usuario que pidió la cola; sólo él puede pasar de página.
    pub owner: u64,
    /// Página (1-based) a la que apunta.
    pub page: usize,
}

impl QueuePageButton {
    pub fn is_owner(&self, user_id: u64) -> bool {
        self.owner == user_id
    }
}

/// Discord exige IDs únicos por mensaje, así que cada botón lleva su hueco.
fn page_id(owner: u64, slot: &str, page: usize) -> String {
    format!("{QUEUE_PAGE_PREFIX}{owner}:{slot}:{page}")
}

/// Interpreta el custom id de un botón de la cola.
pub fn parse_queue_page(custom_id: &str) -> Option<QueuePageButton> {
    let mut parts = custom_id.strip_prefix(QUEUE_PAGE_PREFIX)?.split(':');
    let owner = parts.next()?.parse::<u64>().ok()?;
    let _slot = parts.next()?;
    let page = parts.next()?.parse::<usize>().ok().filter(|page| *page >= 1)?;
    if parts.next().is_some() {
        return None;
    }
    Some(QueuePageButton { owner, page })
}

/// Controles de paginación para la cola de `owner`; vacío si sólo hay una página.
pub fn queue_pagination(
    owner: u64,
    current_page: usize,
    total_pages: usize,
) -> Vec<CreateActionRow> {
    if total_pages <= 1 {
        return Vec::new();
    }

    let first_btn = CreateButton::new(page_id(owner, "first", 1))
        .emoji('⏪')
        .style(ButtonStyle::Secondary)
        .disabled(current_page <= 1);

    let prev_btn = CreateButton::new(page_id(owner, "prev", current_page.saturating_sub(1).max(1)))
        .emoji('◀')
        .style(ButtonStyle::Primary)
        .disabled(current_page <= 1);

    let page_btn = CreateButton::new("queue_page_info")
        .label(format!("{}/{}", current_page, total_pages))
        .style(ButtonStyle::Secondary)
        .disabled(true);

    let next_btn = CreateButton::new(page_id(owner, "next", (current_page + 1).min(total_pages)))
        .emoji('▶')
        .style(ButtonStyle::Primary)
        .disabled(current_page >= total_pages);

    let last_btn = CreateButton::new(page_id(owner, "last", total_pages))
        .emoji('⏩')
        .style(ButtonStyle::Secondary)
        .disabled(current_page >= total_pages);

    vec![CreateActionRow::Buttons(vec![
        first_btn, prev_btn, page_btn, next_btn, last_btn,
    ])]
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: u64 = 123456789012345678;

    #[test]
    fn parses_page_ids() {
        assert_eq!(
            parse_queue_page(&page_id(OWNER, "next", 3)),
            Some(QueuePageButton {
                owner: OWNER,
                page: 3
            })
        );
        assert_eq!(parse_queue_page("queue_page:1:prev:0"), None);
        assert_eq!(parse_queue_page("queue_page:1:last:abc"), None);
        assert_eq!(parse_queue_page("queue_page:next:3"), None);
        assert_eq!(parse_queue_page("queue_page:1:next:3:4"), None);
        assert_eq!(parse_queue_page("music_skip"), None);
    }

    #[test]
    fn only_the_requester_may_page() {
        let button = parse_queue_page(&page_id(OWNER, "last", 5)).unwrap();
        assert!(button.is_owner(OWNER));
        assert!(!button.is_owner(OWNER + 1));
    }

    #[test]
    fn single_page_has_no_controls() {
        assert!(queue_pagination(OWNER, 1, 1).is_empty());
        assert_eq!(queue_pagination(OWNER, 2, 3).len(), 1);
    }
}
