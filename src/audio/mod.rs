//! # Audio Module
//!
//! Núcleo de reproducción, independiente de Discord.
//!
//! - [`queue`]: cola con carril prioritario y modos de repetición.
//! - [`player`]: hilo que consume la cola y envía un frame cada 20 ms.
//! - [`idle`]: temporizadores de desconexión por inactividad.
//! - [`source`]: decodificación con ffmpeg a frames PCM.
//! - [`transport`]: contrato con la conexión de voz.
//!
//! ## Formato de audio
//!
//! - **Sample Rate**: 48kHz (estándar de Discord)
//! - **Bit Depth**: 16-bit signed, little endian
//! - **Channels**: Estéreo
//! - **Frame**: 20 ms = 3840 bytes

pub mod idle;
pub mod player;
pub mod queue;
pub mod signal;
pub mod source;
pub mod transport;
