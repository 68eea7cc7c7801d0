use std::time::Duration;

use crate::error::MusicResult;

/// Duración de un frame de voz (paquetes Opus de 20 ms).
pub const FRAME_DURATION: Duration = Duration::from_millis(20);

/// Miembro del canal de voz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participant {
    pub id: u64,
    pub bot: bool,
}

impl Participant {
    pub fn is_human(&self) -> bool {
        !self.bot
    }
}

/// Destino de los frames de audio.
///
/// Se llama desde el hilo del reproductor y desde los comandos: ningún método
/// puede exigir un contexto async.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    /// Envía un frame. `pre_encoded` indica paquetes Opus; si no, es PCM
    /// crudo que el transporte codifica.
    fn send_frame(&self, frame: &[u8], pre_encoded: bool) -> MusicResult<()>;

    fn is_connected(&self) -> bool;

    /// Espera a la conexión como mucho `timeout`.
    fn wait_for_connection(&self, timeout: Duration) -> bool;

    /// Miembros actuales del canal, bot incluido.
    fn members(&self) -> Vec<Participant>;

    /// Indicador de "hablando".
    fn set_speaking(&self, speaking: bool) -> MusicResult<()>;

    fn disconnect(&self);

    fn frame_duration(&self) -> Duration {
        FRAME_DURATION
    }
}
