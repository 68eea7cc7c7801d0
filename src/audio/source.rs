use bytes::Bytes;
use std::io::{self, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::{debug, warn};

use crate::error::{MusicError, MusicResult};
use crate::sources::PlayableItem;

/// Bytes de un frame de 20 ms en PCM s16le estéreo a 48 kHz.
pub const PCM_FRAME_SIZE: usize = 48_000 / 50 * 2 * 2;

/// Secuencia finita de frames de duración fija para una canción.
pub trait FrameSource: Send {
    /// Siguiente frame. `Ok(None)` o un frame vacío terminan la canción.
    fn read_frame(&mut self) -> io::Result<Option<Bytes>>;

    /// `true` si los frames ya vienen en Opus.
    fn is_opus(&self) -> bool {
        false
    }
}

/// Abre un [`FrameSource`] para una canción de la cola.
pub trait SourceOpener: Send + Sync {
    fn open(&self, item: &PlayableItem) -> MusicResult<Box<dyn FrameSource>>;
}

/// Decodifica una canción con un proceso `ffmpeg` hijo que emite PCM crudo.
pub struct FfmpegSource {
    child: Child,
    stdout: ChildStdout,
}

impl FfmpegSource {
    pub fn spawn(program: &str, stream_url: &str) -> io::Result<Self> {
        let mut child = Command::new(program)
            .args([
                "-reconnect",
                "1",
                "-reconnect_streamed",
                "1",
                "-reconnect_delay_max",
                "5",
                "-i",
                stream_url,
                "-vn",
                "-f",
                "s16le",
                "-ar",
                "48000",
                "-ac",
                "2",
                "-loglevel",
                "warning",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("ffmpeg no expuso stdout"))?;

        Ok(Self { child, stdout })
    }
}

impl FrameSource for FfmpegSource {
    fn read_frame(&mut self) -> io::Result<Option<Bytes>> {
        read_pcm_frame(&mut self.stdout)
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            if e.kind() != io::ErrorKind::InvalidInput {
                warn!("No se pudo terminar ffmpeg: {}", e);
            }
        }
        let _ = self.child.wait();
    }
}

/// Lee un frame PCM completo; un frame incompleto al final se descarta.
fn read_pcm_frame(reader: &mut impl Read) -> io::Result<Option<Bytes>> {
    let mut frame = vec![0u8; PCM_FRAME_SIZE];
    let mut filled = 0;

    while filled < PCM_FRAME_SIZE {
        match reader.read(&mut frame[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    if filled < PCM_FRAME_SIZE {
        return Ok(None);
    }
    Ok(Some(Bytes::from(frame)))
}

pub struct FfmpegOpener {
    program: String,
}

impl FfmpegOpener {
    pub fn new() -> Self {
        Self {
            program: "ffmpeg".to_string(),
        }
    }

    #[allow(dead_code)]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfmpegOpener {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceOpener for FfmpegOpener {
    fn open(&self, item: &PlayableItem) -> MusicResult<Box<dyn FrameSource>> {
        debug!("🎛️ Abriendo ffmpeg para: {}", item.title());
        let source = FfmpegSource::spawn(&self.program, item.stream_url())
            .map_err(|e| MusicError::stream(item.title(), e))?;
        Ok(Box::new(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn frame_size_matches_twenty_milliseconds() {
        assert_eq!(PCM_FRAME_SIZE, 3840);
    }

    #[test]
    fn reads_whole_frames_and_drops_the_tail() {
        let data = vec![7u8; PCM_FRAME_SIZE * 2 + 100];
        let mut reader = Cursor::new(data);

        assert_eq!(read_pcm_frame(&mut reader).unwrap().unwrap().len(), PCM_FRAME_SIZE);
        assert_eq!(read_pcm_frame(&mut reader).unwrap().unwrap().len(), PCM_FRAME_SIZE);
        assert!(read_pcm_frame(&mut reader).unwrap().is_none());
    }

    #[test]
    fn missing_binary_is_a_stream_error() {
        let opener = FfmpegOpener::with_program("/nonexistent/zemo-ffmpeg");
        let item = PlayableItem::new(
            "Prueba",
            "Autor",
            "https://example.com/thumb.jpg",
            "https://example.com/watch",
            "https://example.com/audio",
            10,
        );
        match opener.open(&item) {
            Err(MusicError::Stream { title, .. }) => assert_eq!(title, "Prueba"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opening a missing binary should fail"),
        }
    }
}
