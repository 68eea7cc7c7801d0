use bytes::{Buf, Bytes};
use parking_lot::Mutex;
use serenity::{
    async_trait,
    model::id::{ChannelId, GuildId},
};
use songbird::{
    events::CoreEvent,
    input::{Input, RawAdapter},
    tracks::TrackHandle,
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird,
};
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;
use std::time::Duration;
use symphonia::core::io::MediaSource;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::audio::signal::Signal;
use crate::audio::transport::{Participant, Transport};
use crate::error::{MusicError, MusicResult};

const SAMPLE_RATE: u32 = 48_000;
const CHANNELS: u32 = 2;

/// Frames en vuelo entre el reproductor y el mezclador (1 s).
const BUFFERED_FRAMES: usize = 50;

/// Cuánto espera el mezclador un frame antes de rellenar con silencio.
const SILENCE_WAIT: Duration = Duration::from_millis(5);

/// Bytes de un frame de 20 ms en f32 estéreo.
const F32_FRAME_BYTES: usize = 960 * CHANNELS as usize * 4;

const SEND_TIMEOUT: Duration = Duration::from_millis(200);

/// Transporte sobre una llamada de songbird.
///
/// Los frames PCM s16 se convierten a f32 y se encolan en un canal acotado
/// que songbird consume como una entrada `RawAdapter` en vivo.
pub struct SongbirdTransport {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    runtime: Handle,
    frames: Mutex<Option<flume::Sender<Bytes>>>,
    track: Mutex<Option<TrackHandle>>,
    connected: Arc<Signal>,
    members: Mutex<Vec<Participant>>,
}

impl SongbirdTransport {
    /// Se une al canal y deja preparada la pista en vivo.
    pub async fn connect(
        manager: Arc<Songbird>,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> MusicResult<Arc<Self>> {
        let call = manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| MusicError::Transport(format!("no se pudo unir al canal: {e}")))?;

        let (tx, rx) = flume::bounded(BUFFERED_FRAMES);
        let connected = Arc::new(Signal::new(true));

        let track = {
            let mut handler = call.lock().await;

            if let Err(e) = handler.deafen(true).await {
                warn!("No se pudo ensordecer al bot: {:?}", e);
            }

            for event in [
                CoreEvent::DriverConnect,
                CoreEvent::DriverReconnect,
                CoreEvent::DriverDisconnect,
            ] {
                handler.add_global_event(
                    Event::Core(event),
                    ConnectionWatcher {
                        guild_id,
                        connected: connected.clone(),
                    },
                );
            }

            let input: Input = RawAdapter::new(FrameStream::new(rx), SAMPLE_RATE, CHANNELS).into();
            handler.play_input(input)
        };

        info!("🔊 Conectado al canal de voz en guild {}", guild_id);

        Ok(Arc::new(Self {
            guild_id,
            manager,
            runtime: Handle::current(),
            frames: Mutex::new(Some(tx)),
            track: Mutex::new(Some(track)),
            connected,
            members: Mutex::new(Vec::new()),
        }))
    }

    /// Actualiza los miembros del canal a partir de la caché de serenity.
    pub fn set_members(&self, members: Vec<Participant>) {
        *self.members.lock() = members;
    }
}

impl Transport for SongbirdTransport {
    fn send_frame(&self, frame: &[u8], pre_encoded: bool) -> MusicResult<()> {
        if pre_encoded {
            return Err(MusicError::Transport(
                "los frames Opus no están soportados".into(),
            ));
        }

        let Some(tx) = self.frames.lock().clone() else {
            return Err(MusicError::Transport("pista de voz cerrada".into()));
        };

        tx.send_timeout(pcm_s16_to_f32(frame), SEND_TIMEOUT)
            .map_err(|e| match e {
                flume::SendTimeoutError::Timeout(_) => {
                    MusicError::Transport("búfer de voz lleno".into())
                }
                flume::SendTimeoutError::Disconnected(_) => {
                    MusicError::Transport("pista de voz cerrada".into())
                }
            })
    }

    fn is_connected(&self) -> bool {
        self.connected.is_set()
    }

    fn wait_for_connection(&self, timeout: Duration) -> bool {
        self.connected.wait_timeout(timeout)
    }

    fn members(&self) -> Vec<Participant> {
        self.members.lock().clone()
    }

    fn set_speaking(&self, speaking: bool) -> MusicResult<()> {
        // El driver de songbird gestiona el indicador según haya audio.
        debug!("🎙️ speaking={} en guild {}", speaking, self.guild_id);
        Ok(())
    }

    fn disconnect(&self) {
        self.frames.lock().take();
        if let Some(track) = self.track.lock().take() {
            if let Err(e) = track.stop() {
                // La pista ya terminó o el driver se cerró antes.
                debug!("No se pudo detener la pista en guild {}: {:?}", self.guild_id, e);
            }
        }
        self.connected.clear();

        let manager = self.manager.clone();
        let guild_id = self.guild_id;
        self.runtime.spawn(async move {
            if let Err(e) = manager.remove(guild_id).await {
                // Ya desconectado por Discord: no queda llamada que quitar.
                debug!("Sin llamada que cerrar en guild {}: {:?}", guild_id, e);
            }
            info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        });
    }
}

/// Marca la conexión según los eventos del driver.
struct ConnectionWatcher {
    guild_id: GuildId,
    connected: Arc<Signal>,
}

#[async_trait]
impl VoiceEventHandler for ConnectionWatcher {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        match ctx {
            EventContext::DriverConnect(_) | EventContext::DriverReconnect(_) => {
                info!("🔄 Driver de voz conectado en guild {}", self.guild_id);
                self.connected.set();
            }
            EventContext::DriverDisconnect(_) => {
                warn!("🔌 Driver de voz desconectado en guild {}", self.guild_id);
                self.connected.clear();
            }
            _ => {}
        }
        None
    }
}

/// PCM s16le intercalado a f32le intercalado.
fn pcm_s16_to_f32(frame: &[u8]) -> Bytes {
    let mut out = Vec::with_capacity(frame.len() * 2);
    for sample in frame.chunks_exact(2) {
        let value = i16::from_le_bytes([sample[0], sample[1]]) as f32 / 32768.0;
        out.extend_from_slice(&value.to_le_bytes());
    }
    Bytes::from(out)
}

/// Lado lector del canal de frames, visto por songbird como un stream.
struct FrameStream {
    rx: flume::Receiver<Bytes>,
    pending: Bytes,
}

impl FrameStream {
    fn new(rx: flume::Receiver<Bytes>) -> Self {
        Self {
            rx,
            pending: Bytes::new(),
        }
    }
}

impl Read for FrameStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.pending.is_empty() {
            match self.rx.recv_timeout(SILENCE_WAIT) {
                Ok(frame) => self.pending = frame,
                Err(flume::RecvTimeoutError::Timeout) => {
                    // Silencio alineado a muestras completas.
                    let mut len = buf.len().min(F32_FRAME_BYTES);
                    len -= len % (CHANNELS as usize * 4);
                    if len == 0 {
                        len = buf.len();
                    }
                    buf[..len].fill(0);
                    return Ok(len);
                }
                Err(flume::RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }

        let len = buf.len().min(self.pending.len());
        buf[..len].copy_from_slice(&self.pending[..len]);
        self.pending.advance(len);
        Ok(len)
    }
}

impl Seek for FrameStream {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "stream en vivo sin búsqueda",
        ))
    }
}

impl MediaSource for FrameStream {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}
