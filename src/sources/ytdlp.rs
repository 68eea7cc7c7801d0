use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{PlayableItem, TrackLookup};
use crate::error::{MusicError, MusicResult};

/// Búsqueda de canciones con `yt-dlp -j`.
pub struct YtDlpLookup {
    program: String,
}

impl YtDlpLookup {
    pub fn new() -> Self {
        Self {
            program: "yt-dlp".to_string(),
        }
    }

    #[allow(dead_code)]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Verifica que el binario esté disponible.
    pub async fn verify(&self) -> MusicResult<String> {
        let output = async_process::Command::new(&self.program)
            .arg("--version")
            .output()
            .await?;

        if !output.status.success() {
            return Err(MusicError::Lookup(format!("{} no disponible", self.program)));
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!("✅ yt-dlp versión: {}", version);
        Ok(version)
    }

    async fn extract(&self, target: &str, original: &str) -> MusicResult<PlayableItem> {
        debug!("🔍 yt-dlp: {}", target);

        let output = async_process::Command::new(&self.program)
            .args([
                "-j",
                "--no-playlist",
                "--quiet",
                "--no-warnings",
                "--socket-timeout",
                "15",
                "-f",
                "bestaudio/best",
                target,
            ])
            .output()
            .await
            .map_err(|e| MusicError::Lookup(format!("no se pudo ejecutar yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp falló para `{}`: {}", original, stderr.trim());
            return Err(MusicError::NotFound(original.to_string()));
        }

        parse_entry(&String::from_utf8_lossy(&output.stdout), original)
    }
}

impl Default for YtDlpLookup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackLookup for YtDlpLookup {
    async fn find_by_query(&self, query: &str) -> MusicResult<PlayableItem> {
        let item = self.extract(&format!("ytsearch1:{query}"), query).await?;
        info!("🎯 `{}` → {}", query, item.title());
        Ok(item)
    }

    async fn find_by_url(&self, url: &str) -> MusicResult<PlayableItem> {
        self.extract(url, url).await
    }
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

/// Campos de `yt-dlp -j` que usamos.
#[derive(Debug, Deserialize)]
struct VideoEntry {
    id: Option<String>,
    title: String,
    uploader: Option<String>,
    channel: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
    webpage_url: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
}

/// Convierte la primera línea JSON de la salida en una canción.
fn parse_entry(stdout: &str, original: &str) -> MusicResult<PlayableItem> {
    let line = stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| MusicError::NotFound(original.to_string()))?;

    let entry: VideoEntry = serde_json::from_str(line)?;

    let Some(stream_url) = entry.url else {
        return Err(MusicError::NotFound(original.to_string()));
    };

    let page_url = entry
        .webpage_url
        .or_else(|| entry.id.as_ref().map(|id| format!("https://www.youtube.com/watch?v={id}")))
        .unwrap_or_else(|| original.to_string());

    let thumbnail_url = entry
        .thumbnail
        .or_else(|| entry.thumbnails.last().map(|thumb| thumb.url.clone()))
        .or_else(|| youtube_video_id(&page_url).map(|id| format!("https://i.ytimg.com/vi/{id}/hqdefault.jpg")))
        .unwrap_or_default();

    let author = entry
        .uploader
        .or(entry.channel)
        .unwrap_or_else(|| "Desconocido".to_string());

    let duration = entry.duration.map_or(0, |secs| secs.max(0.0).round() as u64);

    Ok(PlayableItem::new(
        entry.title,
        author,
        thumbnail_url,
        page_url,
        stream_url,
        duration,
    ))
}

/// Extrae el ID de un enlace de YouTube.
fn youtube_video_id(url: &str) -> Option<String> {
    let regex =
        Regex::new(r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/)([a-zA-Z0-9_-]{11})")
            .ok()?;
    regex
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|id| id.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_full_entry() {
        let stdout = r#"{"id":"dQw4w9WgXcQ","title":"Never Gonna Give You Up","uploader":"Rick Astley","thumbnail":"https://i.ytimg.com/vi/dQw4w9WgXcQ/maxresdefault.jpg","webpage_url":"https://www.youtube.com/watch?v=dQw4w9WgXcQ","url":"https://rr1.googlevideo.com/videoplayback?id=1","duration":212.6}"#;

        let item = parse_entry(stdout, "rick").unwrap();
        assert_eq!(item.title(), "Never Gonna Give You Up");
        assert_eq!(item.author_name(), "Rick Astley");
        assert_eq!(item.page_url(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(item.stream_url(), "https://rr1.googlevideo.com/videoplayback?id=1");
        assert_eq!(item.duration_secs(), 213);
    }

    #[test]
    fn fills_missing_fields() {
        let stdout = "\n{\"id\":\"dQw4w9WgXcQ\",\"title\":\"Song\",\"channel\":\"Channel\",\"url\":\"https://cdn/a\"}\n";

        let item = parse_entry(stdout, "song").unwrap();
        assert_eq!(item.author_name(), "Channel");
        assert_eq!(item.page_url(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(item.thumbnail_url(), "https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg");
        assert_eq!(item.duration_secs(), 0);
    }

    #[test]
    fn empty_output_is_not_found() {
        assert!(matches!(
            parse_entry("  \n", "nada"),
            Err(MusicError::NotFound(ref q)) if q == "nada"
        ));
    }

    #[test]
    fn entry_without_stream_is_not_found() {
        let stdout = r#"{"title":"Live","webpage_url":"https://youtu.be/dQw4w9WgXcQ"}"#;
        assert!(matches!(parse_entry(stdout, "live"), Err(MusicError::NotFound(_))));
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        assert!(matches!(parse_entry("{not json", "x"), Err(MusicError::Json(_))));
    }

    #[test]
    fn extracts_video_ids() {
        assert_eq!(
            youtube_video_id("https://youtu.be/dQw4w9WgXcQ?t=1").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(youtube_video_id("https://example.com/video"), None);
    }

    #[tokio::test]
    async fn missing_binary_is_a_lookup_error() {
        let lookup = YtDlpLookup::with_program("/nonexistent/zemo-yt-dlp");
        assert!(matches!(
            lookup.find_by_query("algo").await,
            Err(MusicError::Lookup(_))
        ));
    }
}
