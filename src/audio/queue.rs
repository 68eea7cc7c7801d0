use rand::seq::SliceRandom;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{MusicError, MusicResult};

/// Qué hacer al llegar al final de la lista.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RepeatMode {
    /// La iteración termina al agotar la lista principal.
    #[default]
    Off,
    /// Repite la canción actual sin avanzar.
    Single,
    /// Tras la última vuelve a la primera.
    All,
}

impl RepeatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::Off => "off",
            RepeatMode::Single => "single",
            RepeatMode::All => "all",
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepeatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(RepeatMode::Off),
            "single" => Ok(RepeatMode::Single),
            "all" => Ok(RepeatMode::All),
            other => Err(format!("Modo de repetición desconocido: {}", other)),
        }
    }
}

/// Posición del índice respecto a la próxima extracción.
///
/// `Fresh`: el índice se fijó a mano (creación, jump, skip, clear) y la
/// próxima extracción devuelve ese elemento tal cual.
/// `Advancing`: el elemento del índice ya salió; la próxima extracción avanza
/// salvo en modo `Single`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Positioning {
    Fresh,
    Advancing,
}

/// Carril del que salió un elemento.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Priority,
    Main,
}

/// Cola de reproducción al estilo Spotify.
///
/// La lista principal conserva todas las canciones y un índice actual. El
/// carril prioritario es un FIFO que se vacía antes que la lista principal y
/// no participa en la repetición. La cola guarda su propia posición: iterarla
/// otra vez no la reinicia.
#[derive(Debug, Clone)]
pub struct MusicQueue<T> {
    items: Vec<T>,
    priority: VecDeque<T>,
    current: Option<T>,
    repeat: RepeatMode,
    index: usize,
    positioning: Positioning,
}

impl<T> Default for MusicQueue<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            priority: VecDeque::new(),
            current: None,
            repeat: RepeatMode::Off,
            index: 0,
            positioning: Positioning::Fresh,
        }
    }
}

impl<T: Clone> MusicQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: items.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_repeat(mut self, repeat: RepeatMode) -> Self {
        self.repeat = repeat;
        self
    }

    /// Siguiente elemento junto con su carril.
    ///
    /// `None` si ambos carriles están vacíos o si, en modo `Off`, la lista
    /// principal se agotó. En ese caso el índice queda en el último elemento
    /// y lo que se añada después será lo próximo en salir.
    pub fn next_entry(&mut self) -> Option<(T, Lane)> {
        if let Some(item) = self.priority.pop_front() {
            self.current = Some(item.clone());
            return Some((item, Lane::Priority));
        }

        if self.items.is_empty() {
            return None;
        }

        if self.positioning == Positioning::Advancing && self.repeat != RepeatMode::Single {
            self.index += 1;
        }
        self.positioning = Positioning::Advancing;

        if self.index >= self.items.len() {
            if self.repeat == RepeatMode::Off {
                self.index = self.items.len() - 1;
                debug!("📭 Cola agotada (repetición desactivada)");
                return None;
            }
            self.index %= self.items.len();
        }

        let item = self.items[self.index].clone();
        self.current = Some(item.clone());
        Some((item, Lane::Main))
    }

    /// Siguiente elemento a reproducir.
    pub fn next_item(&mut self) -> Option<T> {
        self.next_entry().map(|(item, _)| item)
    }

    /// La próxima extracción devolverá `items[target]`.
    pub fn jump(&mut self, target: usize) -> MusicResult<()> {
        if target >= self.items.len() {
            return Err(MusicError::OutOfRange {
                index: target,
                len: self.items.len(),
            });
        }

        self.index = target;
        self.positioning = Positioning::Fresh;
        debug!("📍 Salto a la posición {}", target);
        Ok(())
    }

    /// Salto relativo al índice actual, con vuelta por ambos extremos.
    ///
    /// Devuelve el índice que saldrá a continuación.
    pub fn skip_by(&mut self, offset: isize) -> MusicResult<usize> {
        let len = self.items.len();
        if len == 0 {
            return Err(MusicError::OutOfRange { index: 0, len: 0 });
        }

        let target = (self.index as isize + offset).rem_euclid(len as isize) as usize;
        self.jump(target)?;
        Ok(target)
    }

    pub fn set_repeat(&mut self, mode: RepeatMode) {
        self.repeat = mode;
        match mode {
            RepeatMode::Off => info!("➡️ Repetición desactivada"),
            RepeatMode::Single => info!("🔂 Repetir canción activado"),
            RepeatMode::All => info!("🔁 Repetir cola activado"),
        }
    }

    pub fn append(&mut self, item: T) {
        self.items.push(item);
    }

    /// Encola un elemento de un solo uso delante de la lista principal.
    pub fn append_priority(&mut self, item: T) {
        self.priority.push_back(item);
    }

    /// Inserta en la lista principal sin cambiar la canción actual.
    pub fn insert(&mut self, position: usize, item: T) -> MusicResult<()> {
        let len = self.items.len();
        if position > len {
            return Err(MusicError::OutOfRange { index: position, len });
        }

        self.items.insert(position, item);
        if len > 0 && position <= self.index {
            self.index += 1;
        }
        Ok(())
    }

    pub fn remove_at(&mut self, position: usize) -> MusicResult<T> {
        let len = self.items.len();
        if position >= len {
            return Err(MusicError::OutOfRange { index: position, len });
        }

        let removed = self.items.remove(position);

        if position < self.index {
            self.index -= 1;
        } else if position == self.index {
            // El siguiente ocupa el índice y aún no ha salido.
            self.positioning = Positioning::Fresh;
        }

        if self.items.is_empty() {
            self.index = 0;
            self.positioning = Positioning::Fresh;
        } else if self.index >= self.items.len() {
            self.index = self.items.len() - 1;
            self.positioning = Positioning::Advancing;
        }

        debug!("❌ Elemento eliminado en posición {}", position);
        Ok(removed)
    }

    /// Quita la primera aparición de `item`.
    #[allow(dead_code)]
    pub fn remove_first(&mut self, item: &T) -> Option<T>
    where
        T: PartialEq,
    {
        let position = self.items.iter().position(|candidate| candidate == item)?;
        self.remove_at(position).ok()
    }

    /// Mezcla la lista principal y deja la canción actual en primer lugar.
    ///
    /// El carril prioritario no se mezcla.
    pub fn shuffle(&mut self) {
        if self.items.is_empty() {
            return;
        }

        let mut rng = rand::thread_rng();
        self.items.swap(0, self.index);
        self.items[1..].shuffle(&mut rng);
        self.index = 0;
        info!("🔀 Cola mezclada");
    }

    /// Vacía ambos carriles.
    pub fn clear(&mut self) {
        self.items.clear();
        self.priority.clear();
        self.index = 0;
        self.positioning = Positioning::Fresh;
        info!("🗑️ Cola limpiada");
    }

    /// Último elemento entregado.
    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn priority_items(&self) -> &VecDeque<T> {
        &self.priority
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn repeat(&self) -> RepeatMode {
        self.repeat
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// `true` si ambos carriles están vacíos.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.priority.is_empty()
    }

    /// Una página (1-based) de la lista principal.
    pub fn page(&self, page: usize, per_page: usize) -> QueuePage<'_, T> {
        let per_page = per_page.max(1);
        let total_items = self.items.len();
        let total_pages = if total_items == 0 {
            1
        } else {
            total_items.div_ceil(per_page)
        };
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * per_page;
        let end = (start + per_page).min(total_items);

        QueuePage {
            items: &self.items[start..end],
            first_position: start,
            current_page,
            total_pages,
            total_items,
        }
    }
}

impl<T: Clone> Iterator for MusicQueue<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.next_item()
    }
}

/// Ventana de la lista principal para listados paginados.
#[derive(Debug)]
pub struct QueuePage<'a, T> {
    pub items: &'a [T],
    /// Posición (0-based) de `items[0]` en la lista principal.
    pub first_position: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}
