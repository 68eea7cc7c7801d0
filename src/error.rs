use thiserror::Error;

use crate::audio::idle::DisconnectReason;

/// Errores del núcleo de reproducción y sus colaboradores.
///
/// `NotFound` y `OutOfRange` son recuperables: el bot los muestra al usuario.
/// Los errores `Stream` nacen en el hilo de reproducción y pasan por el
/// manejador de errores del reproductor. `AlreadyArmed` indica un fallo de
/// programación al gestionar los plazos de inactividad.
#[derive(Debug, Error)]
pub enum MusicError {
    #[error("No se encontró ningún resultado para `{0}`")]
    NotFound(String),

    #[error("La posición {} está fuera del rango de la cola ({len} canciones)", .index + 1)]
    OutOfRange { index: usize, len: usize },

    #[error("Ya existe un temporizador activo para {0}")]
    AlreadyArmed(DisconnectReason),

    #[error("Error de stream en `{title}`: {source}")]
    Stream {
        title: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error del transporte de voz: {0}")]
    Transport(String),

    #[error("Error de búsqueda: {0}")]
    Lookup(String),

    #[error("El reproductor ya se desconectó del canal de voz")]
    Disconnected,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl MusicError {
    /// Envuelve un fallo de E/S de la fuente que reproduce `title`.
    pub fn stream(title: impl Into<String>, source: std::io::Error) -> Self {
        Self::Stream {
            title: title.into(),
            source,
        }
    }

    /// `true` para los errores que se le muestran al usuario en lugar de
    /// registrarse como fallos.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::OutOfRange { .. })
    }
}

pub type MusicResult<T> = std::result::Result<T, MusicError>;
