/// Segundos a texto compacto: `60 -> "1m"`, `61 -> "1m:1s"`, `3601 -> "1h:1s"`.
///
/// Cero segundos se muestra como `"0s"`.
pub fn to_readable_time(seconds: u64) -> String {
    let (minutes, secs) = (seconds / 60, seconds % 60);
    let (hours, minutes) = (minutes / 60, minutes % 60);

    let parts: Vec<String> = [(hours, 'h'), (minutes, 'm'), (secs, 's')]
        .into_iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| format!("{value}{unit}"))
        .collect();

    if parts.is_empty() {
        "0s".to_string()
    } else {
        parts.join(":")
    }
}

/// Número ordinal abreviado en español (`1.º`, `2.º`, ...).
pub fn to_ordinal(n: usize) -> String {
    format!("{n}.º")
}

/// Recorta `text` a `max` caracteres añadiendo `…`.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{kept}…")
}
