pub mod ytdlp;

use async_trait::async_trait;
use std::fmt;

use crate::error::MusicResult;

pub use ytdlp::YtDlpLookup;

/// Canción ya resuelta, lista para encolarse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayableItem {
    title: String,
    author_name: String,
    thumbnail_url: String,
    page_url: String,
    stream_url: String,
    duration_secs: u64,
}

impl PlayableItem {
    pub fn new(
        title: impl Into<String>,
        author_name: impl Into<String>,
        thumbnail_url: impl Into<String>,
        page_url: impl Into<String>,
        stream_url: impl Into<String>,
        duration_secs: u64,
    ) -> Self {
        Self {
            title: title.into(),
            author_name: author_name.into(),
            thumbnail_url: thumbnail_url.into(),
            page_url: page_url.into(),
            stream_url: stream_url.into(),
            duration_secs,
        }
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn author_name(&self) -> &str {
        &self.author_name
    }
    pub fn thumbnail_url(&self) -> &str {
        &self.thumbnail_url
    }
    pub fn page_url(&self) -> &str {
        &self.page_url
    }
    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }
}

/// Enlace markdown a la página de la canción.
impl fmt::Display for PlayableItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]({})", self.title, self.page_url)
    }
}

/// Resuelve búsquedas y URLs a canciones reproducibles.
#[async_trait]
pub trait TrackLookup: Send + Sync {
    /// Primer resultado de una búsqueda de texto.
    async fn find_by_query(&self, query: &str) -> MusicResult<PlayableItem>;

    /// Canción de una URL concreta.
    async fn find_by_url(&self, url: &str) -> MusicResult<PlayableItem>;

    /// Decide entre URL y búsqueda según la forma de la entrada.
    async fn resolve(&self, input: &str) -> MusicResult<PlayableItem> {
        let input = input.trim();
        if is_url(input) {
            self.find_by_url(input).await
        } else {
            self.find_by_query(input).await
        }
    }
}

/// `true` si `input` es una URL http(s) válida.
pub fn is_url(input: &str) -> bool {
    match url::Url::parse(input) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}
