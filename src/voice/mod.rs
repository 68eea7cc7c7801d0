//! Implementación del transporte de voz sobre songbird.

pub mod songbird_transport;

pub use songbird_transport::SongbirdTransport;
